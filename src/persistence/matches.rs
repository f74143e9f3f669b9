use chrono::{DateTime, Utc};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::{
    app::DatabaseError,
    game::MatchId,
    persistence::{DatabaseResult, games::GameId, get_connection, json_from_column, to_json_sql},
    player::PlayerId,
    rules::Board,
};

/// Lifecycle column of a match row. Every row is written as `Active` and
/// flipped to `Completed` exactly once; the readers filter on it, so the
/// value never travels in a record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MatchStatus {
    Active,
    Completed,
}

impl MatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchStatus::Active => "active",
            MatchStatus::Completed => "completed",
        }
    }
}

#[derive(Clone, Debug)]
pub struct MatchRecord {
    pub id: MatchId,
    pub game_id: GameId,
    pub player1_id: PlayerId,
    pub player2_id: PlayerId,
    pub ranked: bool,
    pub winner_id: Option<PlayerId>,
    pub board: Board,
    pub current_turn_id: PlayerId,
    pub created_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

pub trait MatchRepository {
    /// Inserts a fresh match; player one holds the first turn.
    fn create_match(
        &self,
        game_id: GameId,
        player1_id: PlayerId,
        player2_id: PlayerId,
        ranked: bool,
        board: &Board,
    ) -> DatabaseResult<MatchId>;
    fn update_board(
        &self,
        id: MatchId,
        board: &Board,
        current_turn_id: PlayerId,
    ) -> DatabaseResult<()>;
    fn complete_match(
        &self,
        id: MatchId,
        board: &Board,
        winner_id: Option<PlayerId>,
    ) -> DatabaseResult<()>;
    fn get_active_matches(&self) -> DatabaseResult<Vec<MatchRecord>>;
    fn get_completed_matches_for_player(
        &self,
        session_id: PlayerId,
        limit: u32,
    ) -> DatabaseResult<Vec<MatchRecord>>;
}

pub struct MatchRepositoryImpl {
    pool: Pool<SqliteConnectionManager>,
}

impl MatchRepositoryImpl {
    pub fn new(pool: Pool<SqliteConnectionManager>) -> Self {
        Self { pool }
    }

    fn match_from_row(row: &rusqlite::Row) -> rusqlite::Result<MatchRecord> {
        let board_json: String = row.get("board_state")?;
        Ok(MatchRecord {
            id: row.get("id")?,
            game_id: row.get("game_id")?,
            player1_id: row.get("player1_id")?,
            player2_id: row.get("player2_id")?,
            ranked: row.get("ranked")?,
            winner_id: row.get("winner_id")?,
            board: json_from_column(7, &board_json)?,
            current_turn_id: row.get("current_turn_id")?,
            created_at: row.get("created_at")?,
            ended_at: row.get("ended_at")?,
        })
    }
}

impl MatchRepository for MatchRepositoryImpl {
    fn create_match(
        &self,
        game_id: GameId,
        player1_id: PlayerId,
        player2_id: PlayerId,
        ranked: bool,
        board: &Board,
    ) -> DatabaseResult<MatchId> {
        let board_json = to_json_sql(board)?;
        let conn = get_connection(&self.pool)?;
        conn.execute(
            "INSERT INTO matches (game_id, player1_id, player2_id, ranked, status, board_state, current_turn_id, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            rusqlite::params![
                game_id,
                player1_id,
                player2_id,
                ranked,
                MatchStatus::Active.as_str(),
                board_json,
                player1_id,
                Utc::now(),
            ],
        )
        .map_err(DatabaseError::QueryError)?;
        Ok(conn.last_insert_rowid())
    }

    fn update_board(
        &self,
        id: MatchId,
        board: &Board,
        current_turn_id: PlayerId,
    ) -> DatabaseResult<()> {
        let board_json = to_json_sql(board)?;
        let conn = get_connection(&self.pool)?;
        conn.execute(
            "UPDATE matches SET board_state = ?1, current_turn_id = ?2 WHERE id = ?3",
            rusqlite::params![board_json, current_turn_id, id],
        )
        .map_err(DatabaseError::QueryError)?;
        Ok(())
    }

    fn complete_match(
        &self,
        id: MatchId,
        board: &Board,
        winner_id: Option<PlayerId>,
    ) -> DatabaseResult<()> {
        let board_json = to_json_sql(board)?;
        let conn = get_connection(&self.pool)?;
        conn.execute(
            "UPDATE matches SET status = ?1, winner_id = ?2, board_state = ?3, ended_at = ?4 WHERE id = ?5",
            rusqlite::params![
                MatchStatus::Completed.as_str(),
                winner_id,
                board_json,
                Utc::now(),
                id,
            ],
        )
        .map_err(DatabaseError::QueryError)?;
        Ok(())
    }

    fn get_active_matches(&self) -> DatabaseResult<Vec<MatchRecord>> {
        let conn = get_connection(&self.pool)?;
        let mut stmt = conn
            .prepare("SELECT * FROM matches WHERE status = 'active' ORDER BY id ASC")
            .map_err(DatabaseError::QueryError)?;
        let record_iter = stmt
            .query_map([], Self::match_from_row)
            .map_err(DatabaseError::QueryError)?;

        let mut records = Vec::new();
        for record in record_iter {
            records.push(record.map_err(DatabaseError::QueryError)?);
        }
        Ok(records)
    }

    fn get_completed_matches_for_player(
        &self,
        session_id: PlayerId,
        limit: u32,
    ) -> DatabaseResult<Vec<MatchRecord>> {
        let conn = get_connection(&self.pool)?;
        let mut stmt = conn
            .prepare(
                "SELECT * FROM matches WHERE status = 'completed' AND (player1_id = ?1 OR player2_id = ?1) ORDER BY ended_at DESC LIMIT ?2",
            )
            .map_err(DatabaseError::QueryError)?;
        let record_iter = stmt
            .query_map(rusqlite::params![session_id, limit], Self::match_from_row)
            .map_err(DatabaseError::QueryError)?;

        let mut records = Vec::new();
        for record in record_iter {
            records.push(record.map_err(DatabaseError::QueryError)?);
        }
        Ok(records)
    }
}
