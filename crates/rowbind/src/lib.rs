//! rowbind - persist tagged Rust structs, and the structs nested in them.
//!
//! A struct derives [`Record`](macro@Record) and tags each field with the
//! column it is stored under. Fields that hold another record carry a
//! `reference` tag; [`Mapper::insert`] writes those nested records first,
//! stores their generated ids in the parent's referencing columns and then
//! writes the parent, all in one transaction.
//!
//! # Quick Start
//!
//! ```ignore
//! use rowbind::prelude::*;
//!
//! #[derive(Record)]
//! struct Credentials {
//!     #[record(name = "id")]
//!     id: i32,
//!     #[record(name = "salt")]
//!     salt: String,
//! }
//!
//! #[derive(Record)]
//! struct Users {
//!     #[record(name = "id")]
//!     id: i32,
//!     #[record(name = "username")]
//!     username: String,
//!     #[record(name = "credentials_id", reference = "credentials")]
//!     credentials: Credentials,
//! }
//!
//! async fn register(cx: &Cx, mapper: &Mapper<SqliteConnection>) -> Outcome<i64, Error> {
//!     let user = Users {
//!         id: 0,
//!         username: "alice".to_string(),
//!         credentials: Credentials { id: 0, salt: "s4lt".to_string() },
//!     };
//!     mapper.insert(cx, &user).await
//! }
//! ```
//!
//! # Zero values
//!
//! An empty string or a zero integer means "use the column default": the
//! column is written as `DEFAULT` (or left out on SQLite), never as `''` or
//! `0`.
//!
//! # Errors
//!
//! Every failure is classified. [`Error::fault`] says whether the request
//! ([`Fault::Client`], e.g. a unique violation) or the server
//! ([`Fault::Server`]) is to blame, looking through every wrapper added on the
//! way up.

pub use rowbind_core::{
    // asupersync re-exports
    Cx,
    Outcome,
    // Records
    ColumnValue,
    FieldDescriptor,
    Record,
    RecordDescriptor,
    // Connections
    Connection,
    Dialect,
    IsolationLevel,
    TransactionOps,
    Row,
    Value,
    // Errors
    Error,
    ErrorIdSource,
    Fault,
    FixedErrorIds,
    PersistError,
    PersistErrorKind,
    Result,
    SequentialErrorIds,
    UuidErrorIds,
};

pub use rowbind_macros::Record;

pub use rowbind_query::{InsertBuilder, Mapper, RecordMeta, classify, is_constraint_violation};

#[cfg(feature = "sqlite")]
pub use rowbind_sqlite::{SqliteConfig, SqliteConnection};

/// User registration service (feature `auth`).
#[cfg(feature = "auth")]
pub use rowbind_auth as auth;

/// Everything needed to declare and insert records.
///
/// ```ignore
/// use rowbind::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        Connection, Cx, Error, Fault, Mapper, Outcome, Record, Result, Row, TransactionOps,
        Value,
    };

    #[cfg(feature = "sqlite")]
    pub use crate::{SqliteConfig, SqliteConnection};
}
