//! Records persisted by the registration flow.
//!
//! Timestamps are always left to the database: a `SystemTime` field binds as
//! `DEFAULT`, so `created_at` / `updated_at` are filled by the column default.

use rowbind_macros::Record;
use std::time::SystemTime;

/// Salt and encrypted password for one user.
#[derive(Debug, Clone, Record)]
pub struct Credentials {
    #[record(name = "id")]
    pub id: i32,
    #[record(name = "salt")]
    pub salt: String,
    #[record(name = "passhash")]
    pub pass_hash: String,
    #[record(name = "created_at")]
    pub created_at: SystemTime,
    #[record(name = "updated_at")]
    pub updated_at: SystemTime,
}

impl Credentials {
    pub fn new(salt: impl Into<String>, pass_hash: impl Into<String>) -> Self {
        let now = SystemTime::now();
        Self {
            id: 0,
            salt: salt.into(),
            pass_hash: pass_hash.into(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// A registered user. Inserting one also inserts its [`Credentials`].
#[derive(Debug, Clone, Record)]
pub struct Users {
    #[record(name = "id")]
    pub id: i32,
    #[record(name = "username")]
    pub username: String,
    #[record(name = "email")]
    pub email: String,
    #[record(name = "credentials_id", reference = "credentials")]
    pub credentials: Credentials,
    #[record(name = "created_at")]
    pub created_at: SystemTime,
    #[record(name = "updated_at")]
    pub updated_at: SystemTime,
}

impl Users {
    pub fn new(
        username: impl Into<String>,
        email: impl Into<String>,
        credentials: Credentials,
    ) -> Self {
        let now = SystemTime::now();
        Self {
            id: 0,
            username: username.into(),
            email: email.into(),
            credentials,
            created_at: now,
            updated_at: now,
        }
    }
}

/// DDL for the tables above, SQLite flavour.
pub const SQLITE_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS credentials (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        salt TEXT NOT NULL,
        passhash TEXT NOT NULL,
        created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
        updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
    );
    CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        username TEXT NOT NULL UNIQUE,
        email TEXT NOT NULL,
        credentials_id INTEGER NOT NULL REFERENCES credentials(id),
        created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
        updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
    );
";
