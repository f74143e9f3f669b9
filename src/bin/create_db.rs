use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

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

fn main() {
    dotenvy::dotenv().ok();

    let db_path = std::env::var("PARLOR_DB_PATH").unwrap_or_else(|_| "parlor.db".to_string());
    if let Some(parent) = std::path::Path::new(&db_path).parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent).expect("Failed to create parent directory for DB");
            println!("Created parent directory for DB at {}", parent.display());
        }
    }

    if std::path::Path::new(&db_path).exists() {
        std::fs::remove_file(&db_path).expect("Failed to remove existing DB");
        println!("Removed existing DB at {}", db_path);
    }

    let manager = SqliteConnectionManager::file(&db_path);
    let pool = Pool::builder()
        .max_size(5)
        .build(manager)
        .expect("Failed to create DB pool");
    let conn = pool.get().expect("Failed to get DB connection");
    conn.execute_batch(SCHEMA).expect("Failed to create schema");

    println!("Created new DB at {}", db_path);

    create_game(
        &conn,
        "tictactoe",
        "Tic-Tac-Toe",
        "Align three marks on a 3x3 grid",
        r#"{"variant":"tic_tac_toe","size":3,"win_length":3}"#,
    );
    create_game(
        &conn,
        "connect4",
        "Connect Four",
        "Drop discs and align four on a 6x7 grid",
        r#"{"variant":"connect_four","rows":6,"cols":7,"win_length":4}"#,
    );

    create_account(&conn, "testuser", "pw");
    create_account(&conn, "testuser2", "pw");
}

fn create_game(
    conn: &rusqlite::Connection,
    name: &str,
    display_name: &str,
    description: &str,
    rules_json: &str,
) {
    conn.execute(
        "INSERT INTO games (name, display_name, description, rules, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![name, display_name, description, rules_json, chrono::Utc::now()],
    )
    .expect("Failed to create game");
    println!("Created game {}", name);
}

fn create_account(conn: &rusqlite::Connection, name: &str, password: &str) {
    let pw_hash = bcrypt::hash(password, bcrypt::DEFAULT_COST).expect("Failed to hash password");
    conn.execute(
        "INSERT INTO accounts (username, password_hash, display_name, email, created_at) VALUES (?1, ?2, ?3, NULL, ?4)",
        rusqlite::params![name, pw_hash, name, chrono::Utc::now()],
    )
    .expect("Failed to create account");
    println!("Created account {}", name);
}
