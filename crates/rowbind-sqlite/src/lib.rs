//! SQLite driver for rowbind.
//!
// FFI bindings require unsafe code - this is expected for database drivers
#![allow(unsafe_code)]
//!
//! Implements the `Connection` trait from rowbind-core over libsqlite3
//! (bundled through `libsqlite3-sys`), so records can be persisted with the
//! mapper from `rowbind-query`.
//!
//! # Features
//!
//! - `INSERT ... RETURNING id` (bundled SQLite is always >= 3.35)
//! - Transactions that roll back when dropped
//! - Foreign keys enforced by default
//! - Constraint failures reported with their SQLSTATE class 23 code
//!
//! # Example
//!
//! ```rust,ignore
//! use rowbind_sqlite::SqliteConnection;
//! use rowbind_core::{Connection, Value, Cx, Outcome};
//!
//! let conn = SqliteConnection::open_memory()?;
//! conn.execute_raw("CREATE TABLE users (id INTEGER PRIMARY KEY, username TEXT)")?;
//!
//! let cx = Cx::for_testing();
//! let sql = "INSERT INTO users(username) VALUES (?1) RETURNING id";
//! match conn.query_one(&cx, sql, &[Value::Text("alice".into())]).await {
//!     Outcome::Ok(row) => println!("inserted {:?}", row),
//!     Outcome::Err(e) => eprintln!("Error: {}", e),
//!     _ => {}
//! }
//! ```

pub mod connection;
pub mod ffi;
pub mod types;

pub use connection::{OpenFlags, SqliteConfig, SqliteConnection, SqliteTransaction};

/// The SQLite library version.
pub fn sqlite_version() -> &'static str {
    ffi::version()
}
