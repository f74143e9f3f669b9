use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use serde::de::DeserializeOwned;

use crate::{app::DatabaseError, persistence::games::GameRepository, rules::GameRules};

pub mod games;
pub mod matches;
pub mod players;
pub mod queues;
pub mod ratings;

pub type DatabaseResult<T> = Result<T, DatabaseError>;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS accounts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    username TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,
    display_name TEXT NOT NULL,
    email TEXT,
    created_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS sessions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    account_id INTEGER REFERENCES accounts(id),
    pseudo TEXT NOT NULL,
    remote_addr TEXT,
    is_guest INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS games (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    display_name TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    rules TEXT NOT NULL,
    created_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS queue_entries (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id INTEGER NOT NULL REFERENCES sessions(id),
    game_id INTEGER NOT NULL REFERENCES games(id),
    ranked INTEGER NOT NULL DEFAULT 0,
    joined_at TEXT NOT NULL,
    UNIQUE (session_id, game_id)
);
CREATE TABLE IF NOT EXISTS matches (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    game_id INTEGER NOT NULL REFERENCES games(id),
    player1_id INTEGER NOT NULL REFERENCES sessions(id),
    player2_id INTEGER NOT NULL REFERENCES sessions(id),
    ranked INTEGER NOT NULL DEFAULT 0,
    status TEXT NOT NULL DEFAULT 'active',
    winner_id INTEGER REFERENCES sessions(id),
    board_state TEXT NOT NULL,
    current_turn_id INTEGER NOT NULL,
    created_at TEXT NOT NULL,
    ended_at TEXT
);
CREATE TABLE IF NOT EXISTS ratings (
    account_id INTEGER NOT NULL REFERENCES accounts(id),
    game_id INTEGER NOT NULL REFERENCES games(id),
    rating REAL NOT NULL,
    games_played INTEGER NOT NULL DEFAULT 0,
    wins INTEGER NOT NULL DEFAULT 0,
    losses INTEGER NOT NULL DEFAULT 0,
    draws INTEGER NOT NULL DEFAULT 0,
    win_streak INTEGER NOT NULL DEFAULT 0,
    best_win_streak INTEGER NOT NULL DEFAULT 0,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (account_id, game_id)
);
CREATE INDEX IF NOT EXISTS idx_queue_entries_bucket ON queue_entries (game_id, ranked, joined_at);
CREATE INDEX IF NOT EXISTS idx_matches_status ON matches (status);
";

pub fn open_pool(db_path: &str) -> Result<Pool<SqliteConnectionManager>, r2d2::Error> {
    let manager = SqliteConnectionManager::file(db_path);
    Pool::builder().max_size(5).build(manager)
}

pub fn get_connection(
    pool: &Pool<SqliteConnectionManager>,
) -> DatabaseResult<PooledConnection<SqliteConnectionManager>> {
    pool.get().map_err(DatabaseError::ConnectionError)
}

pub fn init_schema(pool: &Pool<SqliteConnectionManager>) -> DatabaseResult<()> {
    let conn = get_connection(pool)?;
    conn.execute_batch(SCHEMA)
        .map_err(DatabaseError::QueryError)?;
    Ok(())
}

/// Inserts the shipped game catalog; games that already exist are left alone.
pub fn seed_default_games(pool: &Pool<SqliteConnectionManager>) -> DatabaseResult<()> {
    let repo = games::GameRepositoryImpl::new(pool.clone());
    let seeds = [
        (
            "tictactoe",
            "Tic-Tac-Toe",
            "Align three marks on a 3x3 grid",
            GameRules::tictactoe(),
        ),
        (
            "connect4",
            "Connect Four",
            "Drop discs and align four on a 6x7 grid",
            GameRules::connect_four(),
        ),
    ];
    for (name, display_name, description, rules) in seeds {
        if repo.get_game_by_name(name)?.is_none() {
            repo.create_game(name, display_name, description, &rules)?;
        }
    }
    Ok(())
}

fn to_json_sql<T: serde::Serialize>(value: &T) -> DatabaseResult<String> {
    serde_json::to_string(value).map_err(|e| {
        DatabaseError::QueryError(rusqlite::Error::ToSqlConversionFailure(Box::new(e)))
    })
}

fn json_from_column<T: DeserializeOwned>(idx: usize, text: &str) -> rusqlite::Result<T> {
    serde_json::from_str(text).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

/// Shared single-connection in-memory database for tests.
#[cfg(test)]
pub fn open_memory_pool() -> Pool<SqliteConnectionManager> {
    let manager = SqliteConnectionManager::memory();
    let pool = Pool::builder()
        .max_size(1)
        .build(manager)
        .expect("Failed to create in-memory DB pool");
    init_schema(&pool).expect("Failed to create schema");
    pool
}
