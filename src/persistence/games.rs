use chrono::Utc;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::{
    app::DatabaseError,
    persistence::{DatabaseResult, get_connection, json_from_column, to_json_sql},
    rules::GameRules,
};

pub type GameId = i64;

/// A row of the game catalog. `rules` is stored as tagged JSON so new
/// variants only touch the rules module.
#[derive(Clone, Debug)]
pub struct GameInfo {
    pub id: GameId,
    pub name: String,
    pub display_name: String,
    pub description: String,
    pub rules: GameRules,
}

pub trait GameRepository {
    fn create_game(
        &self,
        name: &str,
        display_name: &str,
        description: &str,
        rules: &GameRules,
    ) -> DatabaseResult<GameId>;
    fn get_game_by_id(&self, id: GameId) -> DatabaseResult<Option<GameInfo>>;
    fn get_game_by_name(&self, name: &str) -> DatabaseResult<Option<GameInfo>>;
    fn get_games(&self) -> DatabaseResult<Vec<GameInfo>>;
}

pub struct GameRepositoryImpl {
    pool: Pool<SqliteConnectionManager>,
}

impl GameRepositoryImpl {
    pub fn new(pool: Pool<SqliteConnectionManager>) -> Self {
        Self { pool }
    }

    fn game_from_row(row: &rusqlite::Row) -> rusqlite::Result<GameInfo> {
        let rules_json: String = row.get("rules")?;
        Ok(GameInfo {
            id: row.get("id")?,
            name: row.get("name")?,
            display_name: row.get("display_name")?,
            description: row.get("description")?,
            rules: json_from_column(4, &rules_json)?,
        })
    }
}

impl GameRepository for GameRepositoryImpl {
    fn create_game(
        &self,
        name: &str,
        display_name: &str,
        description: &str,
        rules: &GameRules,
    ) -> DatabaseResult<GameId> {
        let rules_json = to_json_sql(rules)?;
        let conn = get_connection(&self.pool)?;
        conn.execute(
            "INSERT INTO games (name, display_name, description, rules, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![name, display_name, description, rules_json, Utc::now()],
        )
        .map_err(DatabaseError::QueryError)?;
        Ok(conn.last_insert_rowid())
    }

    fn get_game_by_id(&self, id: GameId) -> DatabaseResult<Option<GameInfo>> {
        let conn = get_connection(&self.pool)?;
        let game = conn.query_row(
            "SELECT * FROM games WHERE id = ?1",
            [id],
            Self::game_from_row,
        );
        match game {
            Ok(game) => Ok(Some(game)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(DatabaseError::QueryError(e)),
        }
    }

    fn get_game_by_name(&self, name: &str) -> DatabaseResult<Option<GameInfo>> {
        let conn = get_connection(&self.pool)?;
        let game = conn.query_row(
            "SELECT * FROM games WHERE name = ?1",
            [name],
            Self::game_from_row,
        );
        match game {
            Ok(game) => Ok(Some(game)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(DatabaseError::QueryError(e)),
        }
    }

    fn get_games(&self) -> DatabaseResult<Vec<GameInfo>> {
        let conn = get_connection(&self.pool)?;
        let mut stmt = conn
            .prepare("SELECT * FROM games ORDER BY id ASC")
            .map_err(DatabaseError::QueryError)?;
        let game_iter = stmt
            .query_map([], Self::game_from_row)
            .map_err(DatabaseError::QueryError)?;

        let mut games = Vec::new();
        for game in game_iter {
            games.push(game.map_err(DatabaseError::QueryError)?);
        }
        Ok(games)
    }
}
