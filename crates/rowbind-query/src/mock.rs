//! In-memory connection that records every statement it is given.

use asupersync::{CancelKind, Cx, Outcome};
use rowbind_core::error::{ConnectionError, ConnectionErrorKind};
use rowbind_core::{Connection, Dialect, Error, IsolationLevel, Row, TransactionOps, Value};
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::{Arc, Mutex};

pub(crate) fn unwrap_outcome<T>(outcome: Outcome<T, Error>) -> T {
    match outcome {
        Outcome::Ok(v) => v,
        Outcome::Err(e) => panic!("unexpected error: {e}"),
        Outcome::Cancelled(r) => panic!("cancelled: {r:?}"),
        Outcome::Panicked(p) => panic!("panicked: {p:?}"),
    }
}

#[derive(Debug, Default, Clone)]
pub(crate) struct MockLog {
    pub statements: Vec<(String, Vec<Value>)>,
    pub begins: usize,
    pub commits: usize,
    pub rollbacks: usize,
}

#[derive(Debug, Default)]
struct MockState {
    log: MockLog,
    ids: VecDeque<i64>,
    failures: HashMap<usize, Error>,
    fail_begin: bool,
    fail_commit: bool,
    cancel_after: Option<usize>,
}

#[derive(Debug, Clone)]
pub(crate) struct MockConnection {
    state: Arc<Mutex<MockState>>,
    dialect: Dialect,
}

impl MockConnection {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState::default())),
            dialect: Dialect::Postgres,
        }
    }

    /// Ids returned, in order, by successful statements.
    pub fn with_ids(self, ids: Vec<i64>) -> Self {
        self.state.lock().expect("lock poisoned").ids = ids.into();
        self
    }

    /// Fail the `index`-th statement (zero-based) with `err`.
    pub fn fail_statement(self, index: usize, err: Error) -> Self {
        self.state
            .lock()
            .expect("lock poisoned")
            .failures
            .insert(index, err);
        self
    }

    /// Cancel the caller's context once the `index`-th statement has run.
    pub fn cancel_after_statement(self, index: usize) -> Self {
        self.state.lock().expect("lock poisoned").cancel_after = Some(index);
        self
    }

    pub fn fail_begin(self) -> Self {
        self.state.lock().expect("lock poisoned").fail_begin = true;
        self
    }

    pub fn fail_commit(self) -> Self {
        self.state.lock().expect("lock poisoned").fail_commit = true;
        self
    }

    pub fn log(&self) -> MockLog {
        self.state.lock().expect("lock poisoned").log.clone()
    }
}

fn dropped() -> Error {
    Error::Connection(ConnectionError {
        kind: ConnectionErrorKind::Disconnected,
        message: "connection dropped".to_string(),
        source: None,
    })
}

fn run_statement(
    state: &Mutex<MockState>,
    cx: &Cx,
    sql: &str,
    params: &[Value],
) -> Outcome<Option<Row>, Error> {
    let mut guard = state.lock().expect("lock poisoned");
    let index = guard.log.statements.len();
    guard.log.statements.push((sql.to_string(), params.to_vec()));
    if let Some(err) = guard.failures.remove(&index) {
        return Outcome::Err(err);
    }
    if guard.cancel_after == Some(index) {
        cx.cancel_with(CancelKind::User, Some("caller went away"));
    }
    let row = guard
        .ids
        .pop_front()
        .map(|id| Row::new(vec!["id".to_string()], vec![Value::BigInt(id)]));
    Outcome::Ok(row)
}

impl Connection for MockConnection {
    type Tx<'conn>
        = MockTransaction
    where
        Self: 'conn;

    fn dialect(&self) -> Dialect {
        self.dialect
    }

    fn query(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Vec<Row>, Error>> + Send {
        let outcome = run_statement(&self.state, cx, sql, params);
        async move {
            match outcome {
                Outcome::Ok(row) => Outcome::Ok(row.into_iter().collect()),
                Outcome::Err(e) => Outcome::Err(e),
                Outcome::Cancelled(r) => Outcome::Cancelled(r),
                Outcome::Panicked(p) => Outcome::Panicked(p),
            }
        }
    }

    fn query_one(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Option<Row>, Error>> + Send {
        let outcome = run_statement(&self.state, cx, sql, params);
        async move { outcome }
    }

    fn execute(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<u64, Error>> + Send {
        let outcome = run_statement(&self.state, cx, sql, params);
        async move {
            match outcome {
                Outcome::Ok(_) => Outcome::Ok(1),
                Outcome::Err(e) => Outcome::Err(e),
                Outcome::Cancelled(r) => Outcome::Cancelled(r),
                Outcome::Panicked(p) => Outcome::Panicked(p),
            }
        }
    }

    fn begin_with(
        &self,
        _cx: &Cx,
        _isolation: IsolationLevel,
    ) -> impl Future<Output = Outcome<Self::Tx<'_>, Error>> + Send {
        let outcome = {
            let mut guard = self.state.lock().expect("lock poisoned");
            if guard.fail_begin {
                Outcome::Err(dropped())
            } else {
                guard.log.begins += 1;
                Outcome::Ok(MockTransaction {
                    state: Arc::clone(&self.state),
                })
            }
        };
        async move { outcome }
    }

}

pub(crate) struct MockTransaction {
    state: Arc<Mutex<MockState>>,
}

impl TransactionOps for MockTransaction {
    fn query(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Vec<Row>, Error>> + Send {
        let outcome = run_statement(&self.state, cx, sql, params);
        async move {
            match outcome {
                Outcome::Ok(row) => Outcome::Ok(row.into_iter().collect()),
                Outcome::Err(e) => Outcome::Err(e),
                Outcome::Cancelled(r) => Outcome::Cancelled(r),
                Outcome::Panicked(p) => Outcome::Panicked(p),
            }
        }
    }

    fn query_one(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Option<Row>, Error>> + Send {
        let outcome = run_statement(&self.state, cx, sql, params);
        async move { outcome }
    }

    fn execute(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<u64, Error>> + Send {
        let outcome = run_statement(&self.state, cx, sql, params);
        async move {
            match outcome {
                Outcome::Ok(_) => Outcome::Ok(1),
                Outcome::Err(e) => Outcome::Err(e),
                Outcome::Cancelled(r) => Outcome::Cancelled(r),
                Outcome::Panicked(p) => Outcome::Panicked(p),
            }
        }
    }

    fn commit(self, _cx: &Cx) -> impl Future<Output = Outcome<(), Error>> + Send {
        let outcome = {
            let mut guard = self.state.lock().expect("lock poisoned");
            if guard.fail_commit {
                Outcome::Err(dropped())
            } else {
                guard.log.commits += 1;
                Outcome::Ok(())
            }
        };
        async move { outcome }
    }

    fn rollback(self, _cx: &Cx) -> impl Future<Output = Outcome<(), Error>> + Send {
        self.state.lock().expect("lock poisoned").log.rollbacks += 1;
        async { Outcome::Ok(()) }
    }
}
