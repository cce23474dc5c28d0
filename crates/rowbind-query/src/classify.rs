//! Classification of database failures.
//!
//! Integrity-constraint violations are the client's fault (duplicate key,
//! missing required value, dangling reference). Every other failure is the
//! server's.

use rowbind_core::{Error, ErrorIdSource, Fault, PersistError, PersistErrorKind};

pub const CONSTRAINT_MESSAGE: &str = "Constraint violation: failed to insert entry";
pub const INSERT_FAILED_MESSAGE: &str = "Failed to insert entry";

/// True when `err` reports an integrity-constraint violation.
pub fn is_constraint_violation(err: &Error) -> bool {
    match err {
        Error::Query(q) => q.is_integrity_violation(),
        Error::Persist(p) => p.innermost().kind == PersistErrorKind::Constraint,
        _ => err.sqlstate().is_some_and(|s| s.starts_with("23")),
    }
}

/// Wrap a raw driver error into a classified persistence error.
///
/// Errors that are already classified pass through untouched so a failure is
/// never classified twice.
pub fn classify(err: Error, op: &'static str, ids: &dyn ErrorIdSource) -> Error {
    if matches!(err, Error::Persist(_)) {
        return err;
    }

    let classified = if is_constraint_violation(&err) {
        PersistError::classified(
            PersistErrorKind::Constraint,
            op,
            CONSTRAINT_MESSAGE,
            Some(err),
            ids,
        )
    } else {
        PersistError::classified(
            PersistErrorKind::Database,
            op,
            INSERT_FAILED_MESSAGE,
            Some(err),
            ids,
        )
    };
    report(&classified);
    Error::Persist(classified)
}

/// Classify `err` as a server-side database failure regardless of its
/// SQLSTATE. Used for transaction control (begin, commit).
pub fn database(
    err: Error,
    op: &'static str,
    message: impl Into<String>,
    ids: &dyn ErrorIdSource,
) -> Error {
    let classified =
        PersistError::classified(PersistErrorKind::Database, op, message, Some(err), ids);
    report(&classified);
    Error::Persist(classified)
}

/// A statement could not be built from the record.
pub fn malformed(op: &'static str, message: impl Into<String>, ids: &dyn ErrorIdSource) -> Error {
    let err = PersistError::classified(PersistErrorKind::MalformedQuery, op, message, None, ids);
    report(&err);
    Error::Persist(err)
}

/// Log a classified error at the severity of its fault.
fn report(err: &PersistError) {
    let cause = err
        .source
        .as_deref()
        .map(ToString::to_string)
        .unwrap_or_default();
    let sqlstate = err.source.as_deref().and_then(Error::sqlstate);
    match err.fault() {
        Fault::Client => tracing::warn!(
            op = err.op,
            id = %err.id,
            kind = ?err.kind,
            sqlstate,
            cause = %cause,
            "{}",
            err.message
        ),
        Fault::Server => tracing::error!(
            op = err.op,
            id = %err.id,
            kind = ?err.kind,
            sqlstate,
            cause = %cause,
            "{}",
            err.message
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rowbind_core::FixedErrorIds;
    use rowbind_core::error::{ConnectionError, ConnectionErrorKind, QueryError, QueryErrorKind};

    fn query_error(kind: QueryErrorKind, sqlstate: Option<&str>, message: &str) -> Error {
        Error::Query(QueryError {
            kind,
            sql: Some("INSERT INTO users(username) VALUES (?1) RETURNING id".to_string()),
            sqlstate: sqlstate.map(str::to_string),
            message: message.to_string(),
            detail: None,
            source: None,
        })
    }

    #[test]
    fn unique_violation_is_client_fault() {
        let ids = FixedErrorIds::new("id-1");
        let err = classify(
            query_error(
                QueryErrorKind::Constraint,
                Some("23505"),
                "UNIQUE constraint failed: users.username",
            ),
            "mapper.insert_without_relations",
            &ids,
        );

        assert_eq!(err.fault(), Fault::Client);
        let persist = err.persist().expect("classified");
        assert_eq!(persist.kind, PersistErrorKind::Constraint);
        assert_eq!(persist.message, CONSTRAINT_MESSAGE);
        assert_eq!(persist.id, "id-1");
        assert_eq!(err.sqlstate(), Some("23505"));
        assert!(err.to_string().contains("UNIQUE constraint failed"));
    }

    #[test]
    fn sqlstate_class_23_without_constraint_kind_is_client_fault() {
        let ids = FixedErrorIds::new("id-2");
        let err = classify(
            query_error(QueryErrorKind::Database, Some("23502"), "null value"),
            "mapper.insert_within_transaction",
            &ids,
        );
        assert_eq!(err.fault(), Fault::Client);
    }

    #[test]
    fn constraint_kind_without_sqlstate_is_client_fault() {
        let raw = query_error(QueryErrorKind::Constraint, None, "CHECK constraint failed");
        assert!(is_constraint_violation(&raw));
        let err = classify(raw, "mapper.insert", &FixedErrorIds::new("id-3"));
        assert_eq!(err.fault(), Fault::Client);
    }

    #[test]
    fn dropped_connection_is_server_fault() {
        let err = classify(
            Error::Connection(ConnectionError {
                kind: ConnectionErrorKind::Disconnected,
                message: "connection reset by peer".to_string(),
                source: None,
            }),
            "mapper.insert_without_relations",
            &FixedErrorIds::new("id-4"),
        );
        assert_eq!(err.fault(), Fault::Server);
        let persist = err.persist().expect("classified");
        assert_eq!(persist.kind, PersistErrorKind::Database);
        assert_eq!(persist.message, INSERT_FAILED_MESSAGE);
    }

    #[test]
    fn syntax_errors_are_server_faults() {
        let err = classify(
            query_error(QueryErrorKind::Syntax, Some("42601"), "syntax error"),
            "mapper.insert",
            &FixedErrorIds::new("id-5"),
        );
        assert_eq!(err.fault(), Fault::Server);
    }

    #[test]
    fn classified_errors_pass_through() {
        let first = classify(
            query_error(QueryErrorKind::Constraint, Some("23505"), "dup"),
            "mapper.insert_within_transaction",
            &FixedErrorIds::new("first"),
        );
        let second = classify(first, "mapper.insert", &FixedErrorIds::new("second"));
        assert_eq!(second.error_id(), Some("first"));
    }

    #[test]
    fn transaction_control_failures_are_server_faults() {
        let err = database(
            query_error(QueryErrorKind::Constraint, Some("23503"), "deferred FK"),
            "mapper.commit",
            "Failed to commit entry",
            &FixedErrorIds::new("id-7"),
        );
        assert_eq!(err.fault(), Fault::Server);
        assert_eq!(err.sqlstate(), Some("23503"));
    }

    #[test]
    fn malformed_queries_are_client_faults() {
        let err = malformed(
            "mapper.insert_without_relations",
            "record has no persisted columns",
            &FixedErrorIds::new("id-6"),
        );
        assert_eq!(err.fault(), Fault::Client);
        assert_eq!(
            err.persist().map(|p| p.kind),
            Some(PersistErrorKind::MalformedQuery)
        );
    }
}
