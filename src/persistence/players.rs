use chrono::Utc;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::{
    app::DatabaseError,
    persistence::{DatabaseResult, get_connection},
    player::{Account, AccountId, PlayerId, PlayerSession},
};

pub trait PlayerRepository {
    fn create_account(
        &self,
        username: &str,
        password_hash: &str,
        display_name: &str,
        email: Option<&str>,
    ) -> DatabaseResult<AccountId>;
    fn get_account_by_username(&self, username: &str) -> DatabaseResult<Option<Account>>;
    fn create_session(
        &self,
        account_id: Option<AccountId>,
        pseudo: &str,
        remote_addr: Option<&str>,
        is_guest: bool,
    ) -> DatabaseResult<PlayerId>;
    fn get_session(&self, id: PlayerId) -> DatabaseResult<Option<PlayerSession>>;
}

pub struct PlayerRepositoryImpl {
    pool: Pool<SqliteConnectionManager>,
}

impl PlayerRepositoryImpl {
    pub fn new(pool: Pool<SqliteConnectionManager>) -> Self {
        Self { pool }
    }

    fn account_from_row(row: &rusqlite::Row) -> rusqlite::Result<Account> {
        Ok(Account {
            id: row.get("id")?,
            username: row.get("username")?,
            password_hash: row.get("password_hash")?,
            display_name: row.get("display_name")?,
            email: row.get("email")?,
            created_at: row.get("created_at")?,
        })
    }

    fn session_from_row(row: &rusqlite::Row) -> rusqlite::Result<PlayerSession> {
        Ok(PlayerSession {
            id: row.get("id")?,
            account_id: row.get("account_id")?,
            pseudo: row.get("pseudo")?,
            remote_addr: row.get("remote_addr")?,
            is_guest: row.get("is_guest")?,
        })
    }
}

impl PlayerRepository for PlayerRepositoryImpl {
    fn create_account(
        &self,
        username: &str,
        password_hash: &str,
        display_name: &str,
        email: Option<&str>,
    ) -> DatabaseResult<AccountId> {
        let conn = get_connection(&self.pool)?;
        conn.execute(
            "INSERT INTO accounts (username, password_hash, display_name, email, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![username, password_hash, display_name, email, Utc::now()],
        )
        .map_err(DatabaseError::QueryError)?;
        Ok(conn.last_insert_rowid())
    }

    fn get_account_by_username(&self, username: &str) -> DatabaseResult<Option<Account>> {
        let conn = get_connection(&self.pool)?;
        let account = conn.query_row(
            "SELECT * FROM accounts WHERE username = ?1",
            [username],
            Self::account_from_row,
        );
        match account {
            Ok(account) => Ok(Some(account)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(DatabaseError::QueryError(e)),
        }
    }

    fn create_session(
        &self,
        account_id: Option<AccountId>,
        pseudo: &str,
        remote_addr: Option<&str>,
        is_guest: bool,
    ) -> DatabaseResult<PlayerId> {
        let conn = get_connection(&self.pool)?;
        conn.execute(
            "INSERT INTO sessions (account_id, pseudo, remote_addr, is_guest, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![account_id, pseudo, remote_addr, is_guest, Utc::now()],
        )
        .map_err(DatabaseError::QueryError)?;
        Ok(conn.last_insert_rowid())
    }

    fn get_session(&self, id: PlayerId) -> DatabaseResult<Option<PlayerSession>> {
        let conn = get_connection(&self.pool)?;
        let session = conn.query_row(
            "SELECT * FROM sessions WHERE id = ?1",
            [id],
            Self::session_from_row,
        );
        match session {
            Ok(session) => Ok(Some(session)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(DatabaseError::QueryError(e)),
        }
    }
}
