//! Error types for rowbind operations.
//!
//! Driver-level failures ([`QueryError`], [`ConnectionError`], ...) describe
//! what the database reported. Once a failure passes through the mapper it is
//! classified into a [`PersistError`], which carries an operation name, an
//! error identifier and the [`Fault`] that tells a caller whether the request
//! or the server is to blame.

use crate::ids::ErrorIdSource;
use std::fmt;

/// The primary error type for all rowbind operations.
#[derive(Debug)]
pub enum Error {
    /// Connection-related errors (open, lost connection)
    Connection(ConnectionError),
    /// Query execution errors reported by a driver
    Query(QueryError),
    /// Type conversion errors
    Type(TypeError),
    /// Transaction state errors
    Transaction(TransactionError),
    /// Configuration errors
    Config(ConfigError),
    /// Request validation errors
    Validation(ValidationError),
    /// Classified persistence errors produced by the mapper and its callers
    Persist(PersistError),
    /// I/O errors
    Io(std::io::Error),
    /// Operation was cancelled via asupersync
    Cancelled,
    /// Custom error with message
    Custom(String),
}

#[derive(Debug)]
pub struct ConnectionError {
    pub kind: ConnectionErrorKind,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionErrorKind {
    /// Failed to establish connection
    Connect,
    /// Connection lost during operation
    Disconnected,
    /// Connection state is unusable (poisoned lock, closed handle)
    Unavailable,
}

#[derive(Debug)]
pub struct QueryError {
    pub kind: QueryErrorKind,
    pub sql: Option<String>,
    pub sqlstate: Option<String>,
    pub message: String,
    pub detail: Option<String>,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryErrorKind {
    /// Syntax error in SQL
    Syntax,
    /// Constraint violation (unique, foreign key, etc.)
    Constraint,
    /// Table or column not found
    NotFound,
    /// Permission denied
    Permission,
    /// Data too large for column
    DataTruncation,
    /// Database is busy or locked
    Busy,
    /// Cancelled
    Cancelled,
    /// Other database error
    Database,
}

#[derive(Debug)]
pub struct TypeError {
    pub expected: &'static str,
    pub actual: String,
    pub column: Option<String>,
}

#[derive(Debug)]
pub struct TransactionError {
    pub kind: TransactionErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionErrorKind {
    /// A transaction is already open on this connection
    AlreadyOpen,
    /// No transaction is open
    NotOpen,
}

#[derive(Debug)]
pub struct ConfigError {
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

/// Validation error for request-level checks.
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// One entry per failed check, in the order they were found
    pub errors: Vec<FieldValidationError>,
}

/// A single validation failure for a field.
#[derive(Debug, Clone)]
pub struct FieldValidationError {
    pub field: String,
    pub kind: ValidationErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationErrorKind {
    /// String is shorter than minimum length
    MinLength,
    /// String is longer than maximum length
    MaxLength,
    /// Value doesn't match the expected format
    Pattern,
    /// Required character class is missing
    Required,
    /// Value contains a forbidden character
    Forbidden,
}

impl ValidationError {
    pub fn new() -> Self {
        Self { errors: Vec::new() }
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add(
        &mut self,
        field: impl Into<String>,
        kind: ValidationErrorKind,
        message: impl Into<String>,
    ) {
        self.errors.push(FieldValidationError {
            field: field.into(),
            kind,
            message: message.into(),
        });
    }

    /// Message of the first recorded failure, if any.
    pub fn first_message(&self) -> Option<&str> {
        self.errors.first().map(|e| e.message.as_str())
    }

    /// Convert to Result, returning Ok(()) if no errors, Err(self) otherwise.
    pub fn into_result(self) -> std::result::Result<(), Self> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl Default for ValidationError {
    fn default() -> Self {
        Self::new()
    }
}

/// Who is responsible for a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// The request was invalid (bad input, duplicate key, ...)
    Client,
    /// The server or the database misbehaved
    Server,
}

impl Fault {
    /// HTTP status code conventionally associated with this fault.
    pub const fn status_code(self) -> u16 {
        match self {
            Fault::Client => 400,
            Fault::Server => 500,
        }
    }

    /// Canonical reason phrase for [`status_code`](Self::status_code).
    pub const fn as_str(self) -> &'static str {
        match self {
            Fault::Client => "Bad Request",
            Fault::Server => "Internal Server Error",
        }
    }

    /// Log level used when an error of this fault is reported.
    pub const fn severity(self) -> tracing::Level {
        match self {
            Fault::Client => tracing::Level::WARN,
            Fault::Server => tracing::Level::ERROR,
        }
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failure classified by the persistence layer.
#[derive(Debug)]
pub struct PersistError {
    pub kind: PersistErrorKind,
    /// Name of the operation that produced the error, e.g. `"mapper.insert"`
    pub op: &'static str,
    pub message: String,
    /// Identifier shared by every wrapper of the same root failure
    pub id: String,
    pub source: Option<Box<Error>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistErrorKind {
    /// The record could not be turned into a statement
    MalformedQuery,
    /// An integrity constraint rejected the row
    Constraint,
    /// Any other database failure
    Database,
    /// A nested record failed while resolving relations
    Relation,
    /// Context added by a caller of the mapper
    Context,
}

impl PersistErrorKind {
    /// Whether this kind is a root classification rather than a wrapper.
    pub const fn is_classification(self) -> bool {
        matches!(
            self,
            PersistErrorKind::MalformedQuery
                | PersistErrorKind::Constraint
                | PersistErrorKind::Database
        )
    }
}

impl PersistError {
    /// Build a root classification with a fresh identifier.
    pub fn classified(
        kind: PersistErrorKind,
        op: &'static str,
        message: impl Into<String>,
        source: Option<Error>,
        ids: &dyn ErrorIdSource,
    ) -> Self {
        Self {
            kind,
            op,
            message: message.into(),
            id: ids.next_id(),
            source: source.map(Box::new),
        }
    }

    /// Wrap an existing error, keeping its identifier when it has one.
    pub fn wrap(
        kind: PersistErrorKind,
        op: &'static str,
        message: impl Into<String>,
        source: Error,
        ids: &dyn ErrorIdSource,
    ) -> Self {
        let id = source
            .error_id()
            .map_or_else(|| ids.next_id(), str::to_string);
        Self {
            kind,
            op,
            message: message.into(),
            id,
            source: Some(Box::new(source)),
        }
    }

    /// The deepest persistence error in this chain.
    pub fn innermost(&self) -> &PersistError {
        let mut current = self;
        while let Some(Error::Persist(inner)) = current.source.as_deref() {
            current = inner;
        }
        current
    }

    pub fn fault(&self) -> Fault {
        match self.kind {
            PersistErrorKind::MalformedQuery | PersistErrorKind::Constraint => Fault::Client,
            PersistErrorKind::Database => Fault::Server,
            PersistErrorKind::Relation | PersistErrorKind::Context => self
                .source
                .as_deref()
                .map_or(Fault::Server, Error::fault),
        }
    }
}

impl Error {
    /// Classify who is at fault, looking through every wrapper.
    pub fn fault(&self) -> Fault {
        match self {
            Error::Persist(p) => p.fault(),
            Error::Validation(_) => Fault::Client,
            _ => Fault::Server,
        }
    }

    /// Identifier of a classified error, if this is one.
    pub fn error_id(&self) -> Option<&str> {
        match self {
            Error::Persist(p) => Some(p.id.as_str()),
            _ => None,
        }
    }

    /// The innermost classified persistence error, if any.
    pub fn persist(&self) -> Option<&PersistError> {
        match self {
            Error::Persist(p) => Some(p.innermost()),
            _ => None,
        }
    }

    /// Get SQLSTATE if available (e.g., "23505" for unique violation)
    pub fn sqlstate(&self) -> Option<&str> {
        match self {
            Error::Query(q) => q.sqlstate.as_deref(),
            Error::Persist(p) => p.source.as_deref().and_then(Error::sqlstate),
            _ => None,
        }
    }

    /// Get the SQL that caused this error, if available
    pub fn sql(&self) -> Option<&str> {
        match self {
            Error::Query(q) => q.sql.as_deref(),
            Error::Persist(p) => p.source.as_deref().and_then(Error::sql),
            _ => None,
        }
    }

    /// Is this a connection error that likely requires reconnection?
    pub fn is_connection_error(&self) -> bool {
        match self {
            Error::Connection(c) => matches!(
                c.kind,
                ConnectionErrorKind::Connect | ConnectionErrorKind::Disconnected
            ),
            Error::Io(_) => true,
            _ => false,
        }
    }
}

impl QueryError {
    /// Is this an integrity-constraint violation (SQLSTATE class 23)?
    pub fn is_integrity_violation(&self) -> bool {
        self.kind == QueryErrorKind::Constraint
            || self.sqlstate.as_deref().is_some_and(|s| s.starts_with("23"))
    }

    /// Is this a unique constraint violation?
    pub fn is_unique_violation(&self) -> bool {
        self.sqlstate.as_deref() == Some("23505")
    }

    /// Is this a foreign key violation?
    pub fn is_foreign_key_violation(&self) -> bool {
        self.sqlstate.as_deref() == Some("23503")
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Connection(e) => write!(f, "Connection error: {}", e.message),
            Error::Query(e) => {
                if let Some(sqlstate) = &e.sqlstate {
                    write!(f, "Query error (SQLSTATE {}): {}", sqlstate, e.message)
                } else {
                    write!(f, "Query error: {}", e.message)
                }
            }
            Error::Type(e) => write!(f, "Type error: {}", e),
            Error::Transaction(e) => write!(f, "Transaction error: {}", e.message),
            Error::Config(e) => write!(f, "Configuration error: {}", e.message),
            Error::Validation(e) => write!(f, "Validation error: {}", e),
            Error::Persist(e) => write!(f, "{}", e),
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Cancelled => write!(f, "Operation cancelled"),
            Error::Custom(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Connection(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Query(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Config(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Persist(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for PersistError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.op, self.message)?;
        if let Some(source) = &self.source {
            write!(f, ": {}", source)?;
        }
        Ok(())
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(sqlstate) = &self.sqlstate {
            write!(f, "{} (SQLSTATE {})", self.message, sqlstate)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl fmt::Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(col) = &self.column {
            write!(
                f,
                "expected {} for column '{}', found {}",
                self.expected, col, self.actual
            )
        } else {
            write!(f, "expected {}, found {}", self.expected, self.actual)
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.errors.as_slice() {
            [] => write!(f, "validation passed"),
            [err] => write!(f, "validation error on '{}': {}", err.field, err.message),
            errs => {
                writeln!(f, "validation errors:")?;
                for err in errs {
                    writeln!(f, "  - {}: {}", err.field, err.message)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ValidationError {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<ConnectionError> for Error {
    fn from(err: ConnectionError) -> Self {
        Error::Connection(err)
    }
}

impl From<QueryError> for Error {
    fn from(err: QueryError) -> Self {
        Error::Query(err)
    }
}

impl From<TypeError> for Error {
    fn from(err: TypeError) -> Self {
        Error::Type(err)
    }
}

impl From<TransactionError> for Error {
    fn from(err: TransactionError) -> Self {
        Error::Transaction(err)
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Error::Config(err)
    }
}

impl From<ValidationError> for Error {
    fn from(err: ValidationError) -> Self {
        Error::Validation(err)
    }
}

impl From<PersistError> for Error {
    fn from(err: PersistError) -> Self {
        Error::Persist(err)
    }
}

/// Result type alias for rowbind operations.
pub type Result<T> = std::result::Result<T, Error>;
