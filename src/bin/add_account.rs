fn main() {
    dotenvy::dotenv().ok();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 3 || args.len() > 4 {
        eprintln!("Usage: add_account <username> <password> [display_name]");
        std::process::exit(1);
    }

    let db_path = std::env::var("PARLOR_DB_PATH").unwrap_or_else(|_| "parlor.db".to_string());
    if !std::path::Path::new(&db_path).exists() {
        eprintln!("No database at {}, run create_db first", db_path);
        std::process::exit(1);
    }

    let username = &args[1];
    let password = &args[2];
    let display_name = args.get(3).unwrap_or(username);
    let conn = rusqlite::Connection::open(db_path).expect("Failed to open database");
    create_account(&conn, username, password, display_name);
}

fn create_account(conn: &rusqlite::Connection, name: &str, password: &str, display_name: &str) {
    let pw_hash = bcrypt::hash(password, bcrypt::DEFAULT_COST).expect("Failed to hash password");
    conn.execute(
        "INSERT INTO accounts (username, password_hash, display_name, email, created_at) VALUES (?1, ?2, ?3, NULL, ?4)",
        rusqlite::params![name, pw_hash, display_name, chrono::Utc::now()],
    )
    .expect("Failed to create account");
    println!("Created account [{}] with display name [{}]", name, display_name);
}
