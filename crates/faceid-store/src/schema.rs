//! SQLite schema for users and their face galleries.

/// Bumped whenever the statements below change shape.
pub const SCHEMA_VERSION: i32 = 1;

pub const CREATE_USERS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,
    email TEXT NOT NULL UNIQUE,
    first_name TEXT NOT NULL,
    last_name TEXT NOT NULL,
    password_hash TEXT,
    google_id TEXT,
    profile_picture TEXT,
    auth_provider TEXT NOT NULL,
    created_at TEXT NOT NULL
)
";

/// `name_key` is the trimmed, lowercased name; uniqueness is per owner.
pub const CREATE_PEOPLE_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS people (
    id TEXT PRIMARY KEY,
    owner_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    name_key TEXT NOT NULL,
    info TEXT NOT NULL,
    descriptor BLOB NOT NULL,
    encrypted INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE (owner_id, name_key)
)
";

pub const CREATE_PEOPLE_OWNER_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_people_owner ON people(owner_id, created_at)
";

pub const SCHEMA_STATEMENTS: &[&str] = &[
    CREATE_USERS_TABLE,
    CREATE_PEOPLE_TABLE,
    CREATE_PEOPLE_OWNER_INDEX,
];

/// Apply pragmas and create tables. Idempotent.
pub fn initialize(conn: &rusqlite::Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    for stmt in SCHEMA_STATEMENTS {
        conn.execute(stmt, [])?;
    }
    conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    Ok(())
}
