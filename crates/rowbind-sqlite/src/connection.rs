//! SQLite connection implementation.
//!
//! Safe wrappers around SQLite's C API implementing the
//! [`Connection`](rowbind_core::Connection) trait.

// Allow casts in FFI code where we need to match C types exactly
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::borrow_as_ptr)]
#![allow(clippy::if_not_else)]

use crate::ffi;
use crate::types;
use rowbind_core::{
    Connection, Cx, Dialect, Error, IsolationLevel, Outcome, Row, TransactionOps, Value,
    error::{
        ConnectionError, ConnectionErrorKind, QueryError, QueryErrorKind, TransactionError,
        TransactionErrorKind,
    },
    row::ColumnInfo,
};
use std::ffi::{CStr, CString, c_int};
use std::future::Future;
use std::ptr;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, ThreadId};
use std::time::Duration;

/// Configuration for opening SQLite connections.
#[derive(Debug, Clone)]
pub struct SqliteConfig {
    /// Path to the database file, or ":memory:" for in-memory database.
    pub path: String,
    /// Open flags (read-only, read-write, create, etc.)
    pub flags: OpenFlags,
    /// Busy timeout in milliseconds.
    pub busy_timeout_ms: u32,
    /// Enforce `REFERENCES` clauses (`PRAGMA foreign_keys = ON`).
    pub foreign_keys: bool,
}

/// Flags controlling how the database is opened.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenFlags {
    /// Open for reading only.
    pub read_only: bool,
    /// Open for reading and writing.
    pub read_write: bool,
    /// Create the database if it doesn't exist.
    pub create: bool,
    /// Enable URI filename interpretation.
    pub uri: bool,
    /// Open in serialized mode.
    pub full_mutex: bool,
}

impl OpenFlags {
    /// Create flags for read-only access.
    pub fn read_only() -> Self {
        Self {
            read_only: true,
            ..Default::default()
        }
    }

    /// Create flags for read-write access (database must exist).
    pub fn read_write() -> Self {
        Self {
            read_write: true,
            ..Default::default()
        }
    }

    /// Create flags for read-write access with creation if needed.
    pub fn create_read_write() -> Self {
        Self {
            read_write: true,
            create: true,
            ..Default::default()
        }
    }

    fn to_sqlite_flags(self) -> c_int {
        let mut flags = 0;

        if self.read_only {
            flags |= ffi::SQLITE_OPEN_READONLY;
        }
        if self.read_write {
            flags |= ffi::SQLITE_OPEN_READWRITE;
        }
        if self.create {
            flags |= ffi::SQLITE_OPEN_CREATE;
        }
        if self.uri {
            flags |= ffi::SQLITE_OPEN_URI;
        }
        if self.full_mutex {
            flags |= ffi::SQLITE_OPEN_FULLMUTEX;
        }

        // Default to read-write if no mode specified
        if flags & (ffi::SQLITE_OPEN_READONLY | ffi::SQLITE_OPEN_READWRITE) == 0 {
            flags |= ffi::SQLITE_OPEN_READWRITE | ffi::SQLITE_OPEN_CREATE;
        }

        flags
    }
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            path: ":memory:".to_string(),
            flags: OpenFlags::create_read_write(),
            busy_timeout_ms: 5000,
            foreign_keys: true,
        }
    }
}

impl SqliteConfig {
    /// Create a new config for a file-based database.
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Create a new config for an in-memory database.
    pub fn memory() -> Self {
        Self::default()
    }

    /// Set open flags.
    pub fn flags(mut self, flags: OpenFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Set busy timeout.
    pub fn busy_timeout(mut self, ms: u32) -> Self {
        self.busy_timeout_ms = ms;
        self
    }

    /// Enable or disable foreign key enforcement.
    pub fn foreign_keys(mut self, enabled: bool) -> Self {
        self.foreign_keys = enabled;
        self
    }
}

/// Inner state of the SQLite connection, protected by a mutex.
struct SqliteInner {
    db: *mut ffi::sqlite3,
    /// Thread that opened the current transaction, if one is open.
    tx_owner: Option<ThreadId>,
}

// SAFETY: the handle is only touched while the owning Mutex is held.
unsafe impl Send for SqliteInner {}

/// A connection to a SQLite database.
///
/// One connection can be shared by several tasks. Statements run one at a
/// time, and an open transaction belongs to its [`SqliteTransaction`]
/// handle: while it is open, statements and `begin` issued on the
/// connection from other threads wait until it is committed or rolled back,
/// for at most the configured busy timeout. The thread that opened the
/// transaction must use the handle; going through the connection instead
/// fails with [`TransactionErrorKind::AlreadyOpen`].
pub struct SqliteConnection {
    inner: Mutex<SqliteInner>,
    /// Signalled whenever a transaction finishes.
    tx_done: Condvar,
    /// How long to wait for another caller's transaction; `None` waits forever.
    tx_wait: Option<Duration>,
    path: String,
}

impl SqliteConnection {
    /// Open a new SQLite connection with the given configuration.
    pub fn open(config: &SqliteConfig) -> Result<Self, Error> {
        let c_path = CString::new(config.path.as_str()).map_err(|_| {
            Error::Connection(ConnectionError {
                kind: ConnectionErrorKind::Connect,
                message: "Invalid path: contains null byte".to_string(),
                source: None,
            })
        })?;

        let mut db: *mut ffi::sqlite3 = ptr::null_mut();
        let flags = config.flags.to_sqlite_flags();

        // SAFETY: We pass valid pointers and check the return value
        let rc = unsafe { ffi::sqlite3_open_v2(c_path.as_ptr(), &mut db, flags, ptr::null()) };

        if rc != ffi::SQLITE_OK {
            let msg = if !db.is_null() {
                // SAFETY: db is non-null and must be closed even on failure
                unsafe {
                    let msg = ffi::errmsg(db);
                    ffi::sqlite3_close(db);
                    msg
                }
            } else {
                ffi::error_string(rc).to_string()
            };

            return Err(Error::Connection(ConnectionError {
                kind: ConnectionErrorKind::Connect,
                message: format!("Failed to open database {}: {}", config.path, msg),
                source: None,
            }));
        }

        if config.busy_timeout_ms > 0 {
            // SAFETY: db is valid
            unsafe {
                ffi::sqlite3_busy_timeout(db, config.busy_timeout_ms as c_int);
            }
        }

        let conn = Self {
            inner: Mutex::new(SqliteInner { db, tx_owner: None }),
            tx_done: Condvar::new(),
            tx_wait: (config.busy_timeout_ms > 0)
                .then(|| Duration::from_millis(u64::from(config.busy_timeout_ms))),
            path: config.path.clone(),
        };

        // Set both ways: the library default depends on compile options.
        if config.foreign_keys {
            conn.execute_raw("PRAGMA foreign_keys = ON")?;
        } else {
            conn.execute_raw("PRAGMA foreign_keys = OFF")?;
        }

        tracing::debug!(
            path = %conn.path,
            busy_timeout_ms = config.busy_timeout_ms,
            foreign_keys = config.foreign_keys,
            version = ffi::version(),
            "opened sqlite database"
        );
        Ok(conn)
    }

    /// Open an in-memory database.
    pub fn open_memory() -> Result<Self, Error> {
        Self::open(&SqliteConfig::memory())
    }

    /// Open a file-based database.
    pub fn open_file(path: impl Into<String>) -> Result<Self, Error> {
        Self::open(&SqliteConfig::file(path))
    }

    /// Get the database path.
    pub fn path(&self) -> &str {
        &self.path
    }

    fn lock(&self) -> Result<MutexGuard<'_, SqliteInner>, Error> {
        self.inner.lock().map_err(|_| poisoned())
    }

    /// Lock the connection once no transaction is open on it.
    ///
    /// Used for everything issued through the connection rather than a
    /// transaction handle.
    fn lock_idle(&self, sql: &str) -> Result<MutexGuard<'_, SqliteInner>, Error> {
        let inner = self.lock()?;
        let owner = inner.tx_owner;
        match owner {
            None => return Ok(inner),
            Some(owner) if owner == thread::current().id() => {
                return Err(Error::Transaction(TransactionError {
                    kind: TransactionErrorKind::AlreadyOpen,
                    message: "Already in a transaction; use the transaction handle".to_string(),
                }));
            }
            Some(_) => {}
        }

        tracing::trace!(path = %self.path, "waiting for open transaction");
        let Some(wait) = self.tx_wait else {
            return self
                .tx_done
                .wait_while(inner, |i| i.tx_owner.is_some())
                .map_err(|_| poisoned());
        };
        let (inner, waited) = self
            .tx_done
            .wait_timeout_while(inner, wait, |i| i.tx_owner.is_some())
            .map_err(|_| poisoned())?;
        if waited.timed_out() {
            return Err(Error::Query(QueryError {
                kind: QueryErrorKind::Busy,
                sql: Some(sql.to_string()),
                sqlstate: None,
                message: format!(
                    "Timed out after {}ms waiting for another transaction to finish",
                    wait.as_millis()
                ),
                detail: None,
                source: None,
            }));
        }
        Ok(inner)
    }

    /// Execute SQL directly without preparing (for DDL, etc.)
    pub fn execute_raw(&self, sql: &str) -> Result<(), Error> {
        let inner = self.lock_idle(sql)?;
        exec(inner.db, sql)
    }

    /// Get the number of rows changed by the last statement.
    pub fn changes(&self) -> Result<u64, Error> {
        let inner = self.lock_idle("changes()")?;
        // SAFETY: db is valid
        Ok(unsafe { ffi::sqlite3_changes(inner.db) } as u64)
    }

    /// Prepare and execute a query outside any transaction, returning all rows.
    fn query_sync(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, Error> {
        let inner = self.lock_idle(sql)?;
        run_query(inner.db, sql, params)
    }

    /// Prepare and execute a statement outside any transaction, returning rows affected.
    fn execute_sync(&self, sql: &str, params: &[Value]) -> Result<u64, Error> {
        let inner = self.lock_idle(sql)?;
        run_execute(inner.db, sql, params)
    }

    /// Run a query inside the open transaction.
    fn query_in_tx(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, Error> {
        let inner = self.lock()?;
        run_query(inner.db, sql, params)
    }

    /// Run a statement inside the open transaction.
    fn execute_in_tx(&self, sql: &str, params: &[Value]) -> Result<u64, Error> {
        let inner = self.lock()?;
        run_execute(inner.db, sql, params)
    }

    /// Begin a transaction, waiting for one opened elsewhere to finish.
    fn begin_sync(&self, isolation: IsolationLevel) -> Result<(), Error> {
        // SQLite has no isolation levels; approximate with the lock taken up front.
        let begin_sql = match isolation {
            IsolationLevel::Serializable => "BEGIN EXCLUSIVE",
            IsolationLevel::RepeatableRead | IsolationLevel::ReadCommitted => "BEGIN IMMEDIATE",
            IsolationLevel::ReadUncommitted => "BEGIN DEFERRED",
        };

        let mut inner = self.lock_idle(begin_sql)?;
        exec(inner.db, begin_sql)?;
        inner.tx_owner = Some(thread::current().id());
        tracing::debug!(path = %self.path, statement = begin_sql, "transaction state");
        Ok(())
    }

    /// Commit the current transaction.
    fn commit_sync(&self) -> Result<(), Error> {
        self.finish_sync("COMMIT")
    }

    /// Rollback the current transaction.
    fn rollback_sync(&self) -> Result<(), Error> {
        self.finish_sync("ROLLBACK")
    }

    fn finish_sync(&self, statement: &str) -> Result<(), Error> {
        let mut inner = self.lock()?;
        if inner.tx_owner.is_none() {
            return Err(Error::Transaction(TransactionError {
                kind: TransactionErrorKind::NotOpen,
                message: "Not in a transaction".to_string(),
            }));
        }

        let result = exec(inner.db, statement);
        // SAFETY: db is valid
        if unsafe { ffi::sqlite3_get_autocommit(inner.db) } != 0 {
            inner.tx_owner = None;
            self.tx_done.notify_all();
        }
        tracing::debug!(path = %self.path, statement, ok = result.is_ok(), "transaction state");
        result
    }
}

impl Drop for SqliteConnection {
    fn drop(&mut self) {
        if let Ok(inner) = self.inner.lock() {
            if !inner.db.is_null() {
                // SAFETY: db is valid and never used again
                unsafe {
                    ffi::sqlite3_close(inner.db);
                }
            }
        }
    }
}

/// A SQLite transaction.
///
/// Rolled back on drop unless committed or rolled back explicitly.
pub struct SqliteTransaction<'conn> {
    conn: &'conn SqliteConnection,
    finished: bool,
}

impl<'conn> SqliteTransaction<'conn> {
    fn new(conn: &'conn SqliteConnection) -> Self {
        Self {
            conn,
            finished: false,
        }
    }
}

impl Drop for SqliteTransaction<'_> {
    fn drop(&mut self) {
        if !self.finished {
            if let Err(e) = self.conn.rollback_sync() {
                tracing::warn!(error = %e, "rollback on drop failed");
            }
        }
    }
}

impl Connection for SqliteConnection {
    type Tx<'conn>
        = SqliteTransaction<'conn>
    where
        Self: 'conn;

    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn query(
        &self,
        _cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Vec<Row>, Error>> + Send {
        let result = self.query_sync(sql, params);
        async move { result.map_or_else(Outcome::Err, Outcome::Ok) }
    }

    fn query_one(
        &self,
        _cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Option<Row>, Error>> + Send {
        let result = self
            .query_sync(sql, params)
            .map(|rows| rows.into_iter().next());
        async move { result.map_or_else(Outcome::Err, Outcome::Ok) }
    }

    fn execute(
        &self,
        _cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<u64, Error>> + Send {
        let result = self.execute_sync(sql, params);
        async move { result.map_or_else(Outcome::Err, Outcome::Ok) }
    }

    fn begin_with(
        &self,
        _cx: &Cx,
        isolation: IsolationLevel,
    ) -> impl Future<Output = Outcome<Self::Tx<'_>, Error>> + Send {
        let result = self
            .begin_sync(isolation)
            .map(|()| SqliteTransaction::new(self));
        async move { result.map_or_else(Outcome::Err, Outcome::Ok) }
    }
}

impl TransactionOps for SqliteTransaction<'_> {
    fn query(
        &self,
        _cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Vec<Row>, Error>> + Send {
        let result = self.conn.query_in_tx(sql, params);
        async move { result.map_or_else(Outcome::Err, Outcome::Ok) }
    }

    fn query_one(
        &self,
        _cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Option<Row>, Error>> + Send {
        let result = self
            .conn
            .query_in_tx(sql, params)
            .map(|rows| rows.into_iter().next());
        async move { result.map_or_else(Outcome::Err, Outcome::Ok) }
    }

    fn execute(
        &self,
        _cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<u64, Error>> + Send {
        let result = self.conn.execute_in_tx(sql, params);
        async move { result.map_or_else(Outcome::Err, Outcome::Ok) }
    }

    async fn commit(mut self, _cx: &Cx) -> Outcome<(), Error> {
        let result = self.conn.commit_sync();
        // A failed COMMIT may leave the transaction open; drop rolls it back.
        self.finished = result.is_ok();
        result.map_or_else(Outcome::Err, Outcome::Ok)
    }

    async fn rollback(mut self, _cx: &Cx) -> Outcome<(), Error> {
        self.finished = true;
        self.conn
            .rollback_sync()
            .map_or_else(Outcome::Err, Outcome::Ok)
    }
}

// Helper functions

fn poisoned() -> Error {
    Error::Connection(ConnectionError {
        kind: ConnectionErrorKind::Unavailable,
        message: "SQLite connection lock poisoned".to_string(),
        source: None,
    })
}

fn run_query(db: *mut ffi::sqlite3, sql: &str, params: &[Value]) -> Result<Vec<Row>, Error> {
    tracing::trace!(sql, params = params.len(), "sqlite query");
    let stmt = prepare_stmt(db, sql)?;

    if let Err(e) = bind_params(db, stmt, sql, params) {
        // SAFETY: stmt is valid
        unsafe { ffi::sqlite3_finalize(stmt) };
        return Err(e);
    }

    // SAFETY: stmt is valid
    let col_count = unsafe { ffi::sqlite3_column_count(stmt) };
    let mut col_names = Vec::with_capacity(col_count as usize);
    for i in 0..col_count {
        // SAFETY: stmt is valid, i < col_count
        let name = unsafe { types::column_name(stmt, i) }.unwrap_or_else(|| format!("col{}", i));
        col_names.push(name);
    }
    let columns = Arc::new(ColumnInfo::new(col_names));

    let mut rows = Vec::new();
    loop {
        // SAFETY: stmt is valid
        let rc = unsafe { ffi::sqlite3_step(stmt) };
        match rc {
            ffi::SQLITE_ROW => {
                let mut values = Vec::with_capacity(col_count as usize);
                for i in 0..col_count {
                    // SAFETY: stmt is valid, we just got SQLITE_ROW
                    values.push(unsafe { types::read_column(stmt, i) });
                }
                rows.push(Row::with_columns(Arc::clone(&columns), values));
            }
            ffi::SQLITE_DONE => break,
            _ => {
                let err = db_error(db, sql);
                // SAFETY: stmt is valid
                unsafe { ffi::sqlite3_finalize(stmt) };
                return Err(err);
            }
        }
    }

    // SAFETY: stmt is valid
    unsafe { ffi::sqlite3_finalize(stmt) };
    Ok(rows)
}

fn run_execute(db: *mut ffi::sqlite3, sql: &str, params: &[Value]) -> Result<u64, Error> {
    tracing::trace!(sql, params = params.len(), "sqlite execute");
    let stmt = prepare_stmt(db, sql)?;

    if let Err(e) = bind_params(db, stmt, sql, params) {
        // SAFETY: stmt is valid
        unsafe { ffi::sqlite3_finalize(stmt) };
        return Err(e);
    }

    // SAFETY: stmt is valid
    let rc = unsafe { ffi::sqlite3_step(stmt) };
    let result = match rc {
        // SAFETY: db is valid
        ffi::SQLITE_DONE | ffi::SQLITE_ROW => Ok(unsafe { ffi::sqlite3_changes(db) } as u64),
        _ => Err(db_error(db, sql)),
    };

    // SAFETY: stmt is valid
    unsafe { ffi::sqlite3_finalize(stmt) };
    result
}

fn exec(db: *mut ffi::sqlite3, sql: &str) -> Result<(), Error> {
    let c_sql = CString::new(sql).map_err(|_| null_byte(sql))?;
    let mut errmsg: *mut std::ffi::c_char = ptr::null_mut();

    // SAFETY: All pointers are valid
    let rc = unsafe { ffi::sqlite3_exec(db, c_sql.as_ptr(), None, ptr::null_mut(), &mut errmsg) };

    if rc != ffi::SQLITE_OK {
        // SAFETY: db is valid
        let code = unsafe { ffi::sqlite3_extended_errcode(db) };
        let msg = if !errmsg.is_null() {
            // SAFETY: errmsg was allocated by sqlite and is freed exactly once
            unsafe {
                let msg = CStr::from_ptr(errmsg).to_string_lossy().into_owned();
                ffi::sqlite3_free(errmsg.cast());
                msg
            }
        } else {
            ffi::error_string(rc).to_string()
        };
        return Err(query_error(code, sql, msg));
    }

    Ok(())
}

fn prepare_stmt(db: *mut ffi::sqlite3, sql: &str) -> Result<*mut ffi::sqlite3_stmt, Error> {
    let c_sql = CString::new(sql).map_err(|_| null_byte(sql))?;
    let mut stmt: *mut ffi::sqlite3_stmt = ptr::null_mut();

    // SAFETY: All pointers are valid
    let rc = unsafe {
        ffi::sqlite3_prepare_v2(
            db,
            c_sql.as_ptr(),
            c_sql.as_bytes().len() as c_int,
            &mut stmt,
            ptr::null_mut(),
        )
    };

    if rc != ffi::SQLITE_OK {
        return Err(db_error(db, sql));
    }

    Ok(stmt)
}

fn bind_params(
    db: *mut ffi::sqlite3,
    stmt: *mut ffi::sqlite3_stmt,
    sql: &str,
    params: &[Value],
) -> Result<(), Error> {
    for (i, param) in params.iter().enumerate() {
        if param.is_default() {
            return Err(Error::Query(QueryError {
                kind: QueryErrorKind::Syntax,
                sql: Some(sql.to_string()),
                sqlstate: None,
                message: format!("Parameter {} is DEFAULT, which cannot be bound", i + 1),
                detail: None,
                source: None,
            }));
        }
        // SAFETY: stmt is valid, index is 1-based
        let rc = unsafe { types::bind_value(stmt, (i + 1) as c_int, param) };
        if rc != ffi::SQLITE_OK {
            // SAFETY: db is valid
            let msg = unsafe { ffi::errmsg(db) };
            return Err(Error::Query(QueryError {
                kind: QueryErrorKind::Database,
                sql: Some(sql.to_string()),
                sqlstate: None,
                message: format!("Failed to bind parameter {}: {}", i + 1, msg),
                detail: None,
                source: None,
            }));
        }
    }
    Ok(())
}

fn db_error(db: *mut ffi::sqlite3, sql: &str) -> Error {
    // SAFETY: db is valid
    let (code, msg) = unsafe { (ffi::sqlite3_extended_errcode(db), ffi::errmsg(db)) };
    query_error(code, sql, msg)
}

fn query_error(extended_code: c_int, sql: &str, message: String) -> Error {
    Error::Query(QueryError {
        kind: error_code_to_kind(extended_code),
        sql: Some(sql.to_string()),
        sqlstate: ffi::sqlstate(extended_code).map(str::to_string),
        message,
        detail: Some(format!("sqlite error code {}", extended_code)),
        source: None,
    })
}

fn null_byte(sql: &str) -> Error {
    Error::Query(QueryError {
        kind: QueryErrorKind::Syntax,
        sql: Some(sql.to_string()),
        sqlstate: None,
        message: "SQL contains null byte".to_string(),
        detail: None,
        source: None,
    })
}

fn error_code_to_kind(extended_code: c_int) -> QueryErrorKind {
    match extended_code & 0xff {
        ffi::SQLITE_CONSTRAINT => QueryErrorKind::Constraint,
        ffi::SQLITE_BUSY | ffi::SQLITE_LOCKED => QueryErrorKind::Busy,
        ffi::SQLITE_PERM | ffi::SQLITE_AUTH | ffi::SQLITE_READONLY => QueryErrorKind::Permission,
        ffi::SQLITE_NOTFOUND => QueryErrorKind::NotFound,
        ffi::SQLITE_TOOBIG => QueryErrorKind::DataTruncation,
        ffi::SQLITE_INTERRUPT => QueryErrorKind::Cancelled,
        _ => QueryErrorKind::Database,
    }
}
