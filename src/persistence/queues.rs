use chrono::{DateTime, Utc};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::{
    app::DatabaseError,
    persistence::{DatabaseResult, games::GameId, get_connection},
    player::PlayerId,
};

pub type QueueId = i64;

#[derive(Clone, Debug)]
pub struct QueueEntry {
    pub id: QueueId,
    pub session_id: PlayerId,
    pub game_id: GameId,
    pub ranked: bool,
    pub joined_at: DateTime<Utc>,
}

pub trait QueueRepository {
    fn add_entry(
        &self,
        session_id: PlayerId,
        game_id: GameId,
        ranked: bool,
    ) -> DatabaseResult<QueueId>;
    fn get_entry(
        &self,
        session_id: PlayerId,
        game_id: GameId,
    ) -> DatabaseResult<Option<QueueEntry>>;
    fn remove_entry(&self, session_id: PlayerId, game_id: GameId) -> DatabaseResult<bool>;
    fn remove_entry_by_id(&self, id: QueueId) -> DatabaseResult<()>;
    fn remove_entries_for_session(&self, session_id: PlayerId) -> DatabaseResult<usize>;
    fn bucket_count(&self, game_id: GameId, ranked: bool) -> DatabaseResult<u32>;
    fn oldest_entries(
        &self,
        game_id: GameId,
        ranked: bool,
        limit: u32,
    ) -> DatabaseResult<Vec<QueueEntry>>;
}

pub struct QueueRepositoryImpl {
    pool: Pool<SqliteConnectionManager>,
}

impl QueueRepositoryImpl {
    pub fn new(pool: Pool<SqliteConnectionManager>) -> Self {
        Self { pool }
    }

    fn entry_from_row(row: &rusqlite::Row) -> rusqlite::Result<QueueEntry> {
        Ok(QueueEntry {
            id: row.get("id")?,
            session_id: row.get("session_id")?,
            game_id: row.get("game_id")?,
            ranked: row.get("ranked")?,
            joined_at: row.get("joined_at")?,
        })
    }
}

impl QueueRepository for QueueRepositoryImpl {
    fn add_entry(
        &self,
        session_id: PlayerId,
        game_id: GameId,
        ranked: bool,
    ) -> DatabaseResult<QueueId> {
        let conn = get_connection(&self.pool)?;
        conn.execute(
            "INSERT INTO queue_entries (session_id, game_id, ranked, joined_at) VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![session_id, game_id, ranked, Utc::now()],
        )
        .map_err(DatabaseError::QueryError)?;
        Ok(conn.last_insert_rowid())
    }

    fn get_entry(
        &self,
        session_id: PlayerId,
        game_id: GameId,
    ) -> DatabaseResult<Option<QueueEntry>> {
        let conn = get_connection(&self.pool)?;
        let entry = conn.query_row(
            "SELECT * FROM queue_entries WHERE session_id = ?1 AND game_id = ?2",
            [session_id, game_id],
            Self::entry_from_row,
        );
        match entry {
            Ok(entry) => Ok(Some(entry)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(DatabaseError::QueryError(e)),
        }
    }

    fn remove_entry(&self, session_id: PlayerId, game_id: GameId) -> DatabaseResult<bool> {
        let conn = get_connection(&self.pool)?;
        let removed = conn
            .execute(
                "DELETE FROM queue_entries WHERE session_id = ?1 AND game_id = ?2",
                [session_id, game_id],
            )
            .map_err(DatabaseError::QueryError)?;
        Ok(removed > 0)
    }

    fn remove_entry_by_id(&self, id: QueueId) -> DatabaseResult<()> {
        let conn = get_connection(&self.pool)?;
        conn.execute("DELETE FROM queue_entries WHERE id = ?1", [id])
            .map_err(DatabaseError::QueryError)?;
        Ok(())
    }

    fn remove_entries_for_session(&self, session_id: PlayerId) -> DatabaseResult<usize> {
        let conn = get_connection(&self.pool)?;
        let removed = conn
            .execute(
                "DELETE FROM queue_entries WHERE session_id = ?1",
                [session_id],
            )
            .map_err(DatabaseError::QueryError)?;
        Ok(removed)
    }

    fn bucket_count(&self, game_id: GameId, ranked: bool) -> DatabaseResult<u32> {
        let conn = get_connection(&self.pool)?;
        let count = conn
            .query_row(
                "SELECT COUNT(*) FROM queue_entries WHERE game_id = ?1 AND ranked = ?2",
                rusqlite::params![game_id, ranked],
                |row| row.get(0),
            )
            .map_err(DatabaseError::QueryError)?;
        Ok(count)
    }

    fn oldest_entries(
        &self,
        game_id: GameId,
        ranked: bool,
        limit: u32,
    ) -> DatabaseResult<Vec<QueueEntry>> {
        let conn = get_connection(&self.pool)?;
        let mut stmt = conn
            .prepare(
                "SELECT * FROM queue_entries WHERE game_id = ?1 AND ranked = ?2 ORDER BY joined_at ASC, id ASC LIMIT ?3",
            )
            .map_err(DatabaseError::QueryError)?;
        let entry_iter = stmt
            .query_map(
                rusqlite::params![game_id, ranked, limit],
                Self::entry_from_row,
            )
            .map_err(DatabaseError::QueryError)?;

        let mut entries = Vec::new();
        for entry in entry_iter {
            entries.push(entry.map_err(DatabaseError::QueryError)?);
        }
        Ok(entries)
    }
}
