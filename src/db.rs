use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

pub async fn connect(url: &str) -> anyhow::Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;
    Ok(pool)
}

// The UNIQUE constraints on accounts.username, tests.name (NOCASE) and
// (student_id, test_id) back the handler-level duplicate checks under
// concurrent writes.
const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS accounts (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        username TEXT NOT NULL UNIQUE,
        email TEXT NOT NULL,
        password_hash TEXT NOT NULL,
        first_name TEXT NOT NULL DEFAULT '',
        last_name TEXT NOT NULL DEFAULT '',
        is_active INTEGER NOT NULL DEFAULT 1,
        created_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS tokens (
        key TEXT PRIMARY KEY,
        account_id INTEGER NOT NULL UNIQUE REFERENCES accounts(id),
        created_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS student_profiles (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        account_id INTEGER NOT NULL REFERENCES accounts(id),
        leetcode TEXT NOT NULL,
        github TEXT NOT NULL,
        date_joined TEXT NOT NULL,
        photo TEXT,
        bio TEXT
    )",
    "CREATE TABLE IF NOT EXISTS mentor_profiles (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        account_id INTEGER NOT NULL REFERENCES accounts(id),
        expertise TEXT NOT NULL,
        github TEXT NOT NULL,
        date_joined TEXT NOT NULL,
        photo TEXT,
        bio TEXT
    )",
    "CREATE TABLE IF NOT EXISTS tests (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        description TEXT NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )",
    "CREATE UNIQUE INDEX IF NOT EXISTS tests_name_nocase
        ON tests (name COLLATE NOCASE)",
    "CREATE TABLE IF NOT EXISTS test_scores (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        student_id INTEGER NOT NULL REFERENCES student_profiles(id),
        test_id INTEGER NOT NULL REFERENCES tests(id),
        score INTEGER NOT NULL,
        date_taken TEXT NOT NULL,
        UNIQUE (student_id, test_id)
    )",
];

pub async fn init_schema(pg: &SqlitePool) -> Result<(), sqlx::Error> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(pg).await?;
    }
    Ok(())
}
