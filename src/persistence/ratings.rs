use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::{
    app::DatabaseError,
    persistence::{DatabaseResult, games::GameId, get_connection},
    player::AccountId,
    rating::RatingRecord,
};

pub trait RatingRepository {
    fn get_rating(
        &self,
        account_id: AccountId,
        game_id: GameId,
    ) -> DatabaseResult<Option<RatingRecord>>;
    fn upsert_rating(&self, record: &RatingRecord) -> DatabaseResult<()>;
    /// Leaderboard order: rating desc, wins desc, games played asc.
    /// Returns (display name, record) pairs.
    fn get_leaderboard(
        &self,
        game_id: GameId,
        limit: u32,
    ) -> DatabaseResult<Vec<(String, RatingRecord)>>;
    /// 1-based position the record would hold on the full leaderboard.
    fn get_rank(&self, record: &RatingRecord) -> DatabaseResult<u32>;
}

pub struct RatingRepositoryImpl {
    pool: Pool<SqliteConnectionManager>,
}

impl RatingRepositoryImpl {
    pub fn new(pool: Pool<SqliteConnectionManager>) -> Self {
        Self { pool }
    }

    fn rating_from_row(row: &rusqlite::Row) -> rusqlite::Result<RatingRecord> {
        Ok(RatingRecord {
            account_id: row.get("account_id")?,
            game_id: row.get("game_id")?,
            rating: row.get("rating")?,
            games_played: row.get("games_played")?,
            wins: row.get("wins")?,
            losses: row.get("losses")?,
            draws: row.get("draws")?,
            win_streak: row.get("win_streak")?,
            best_win_streak: row.get("best_win_streak")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

impl RatingRepository for RatingRepositoryImpl {
    fn get_rating(
        &self,
        account_id: AccountId,
        game_id: GameId,
    ) -> DatabaseResult<Option<RatingRecord>> {
        let conn = get_connection(&self.pool)?;
        let record = conn.query_row(
            "SELECT * FROM ratings WHERE account_id = ?1 AND game_id = ?2",
            [account_id, game_id],
            Self::rating_from_row,
        );
        match record {
            Ok(record) => Ok(Some(record)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(DatabaseError::QueryError(e)),
        }
    }

    fn upsert_rating(&self, record: &RatingRecord) -> DatabaseResult<()> {
        let conn = get_connection(&self.pool)?;
        conn.execute(
            "INSERT INTO ratings (account_id, game_id, rating, games_played, wins, losses, draws, win_streak, best_win_streak, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT (account_id, game_id) DO UPDATE SET
                 rating = excluded.rating,
                 games_played = excluded.games_played,
                 wins = excluded.wins,
                 losses = excluded.losses,
                 draws = excluded.draws,
                 win_streak = excluded.win_streak,
                 best_win_streak = excluded.best_win_streak,
                 updated_at = excluded.updated_at",
            rusqlite::params![
                record.account_id,
                record.game_id,
                record.rating,
                record.games_played,
                record.wins,
                record.losses,
                record.draws,
                record.win_streak,
                record.best_win_streak,
                record.updated_at,
            ],
        )
        .map_err(DatabaseError::QueryError)?;
        Ok(())
    }

    fn get_leaderboard(
        &self,
        game_id: GameId,
        limit: u32,
    ) -> DatabaseResult<Vec<(String, RatingRecord)>> {
        let conn = get_connection(&self.pool)?;
        let mut stmt = conn
            .prepare(
                "SELECT r.*, a.display_name FROM ratings r
                 JOIN accounts a ON a.id = r.account_id
                 WHERE r.game_id = ?1
                 ORDER BY r.rating DESC, r.wins DESC, r.games_played ASC
                 LIMIT ?2",
            )
            .map_err(DatabaseError::QueryError)?;
        let row_iter = stmt
            .query_map(rusqlite::params![game_id, limit], |row| {
                let display_name: String = row.get("display_name")?;
                Ok((display_name, Self::rating_from_row(row)?))
            })
            .map_err(DatabaseError::QueryError)?;

        let mut rows = Vec::new();
        for row in row_iter {
            rows.push(row.map_err(DatabaseError::QueryError)?);
        }
        Ok(rows)
    }

    fn get_rank(&self, record: &RatingRecord) -> DatabaseResult<u32> {
        let conn = get_connection(&self.pool)?;
        let better: u32 = conn
            .query_row(
                "SELECT COUNT(*) FROM ratings
                 WHERE game_id = ?1 AND (
                     rating > ?2
                     OR (rating = ?2 AND wins > ?3)
                     OR (rating = ?2 AND wins = ?3 AND games_played < ?4)
                 )",
                rusqlite::params![record.game_id, record.rating, record.wins, record.games_played],
                |row| row.get(0),
            )
            .map_err(DatabaseError::QueryError)?;
        Ok(better + 1)
    }
}
