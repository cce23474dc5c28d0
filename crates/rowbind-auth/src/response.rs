//! Client-facing error bodies.
//!
//! An [`ErrorResponse`] describes the root cause of a failure, not the
//! outermost wrapper: for a duplicate username the client sees the
//! constraint message, with the status derived from the fault of the whole
//! chain.

use chrono::{DateTime, Utc};
use rowbind_core::{Error, ErrorIdSource, Fault};
use serde::Serialize;

/// Message used when the root cause carries nothing fit for a client.
pub const UNEXPECTED_ERROR_MESSAGE: &str = "Unexpected error";

/// Source of response timestamps.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Always the same instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorResponse {
    /// Reason phrase of `status`
    pub error: String,
    pub id: String,
    pub message: String,
    /// Route the failing request was sent to
    pub path: String,
    pub status: u16,
    pub timestamp: DateTime<Utc>,
}

impl ErrorResponse {
    /// Build the body for `err`.
    ///
    /// The id is the error's own when it has one; otherwise a fresh one is
    /// drawn from `ids`.
    pub fn from_error(
        err: &Error,
        path: impl Into<String>,
        clock: &dyn Clock,
        ids: &dyn ErrorIdSource,
    ) -> Self {
        let fault = err.fault();
        let id = err
            .error_id()
            .map_or_else(|| ids.next_id(), str::to_string);

        Self {
            error: fault.as_str().to_string(),
            id,
            message: root_message(err),
            path: path.into(),
            status: fault.status_code(),
            timestamp: clock.now(),
        }
    }

    pub fn to_json(&self) -> String {
        // Only strings, integers and a timestamp; serialization cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Follow wrappers down to the deepest error with a client-facing message.
fn root_cause(err: &Error) -> &Error {
    let mut current = err;
    while let Error::Persist(p) = current {
        match p.source.as_deref() {
            Some(inner @ (Error::Persist(_) | Error::Validation(_))) => current = inner,
            _ => break,
        }
    }
    current
}

fn root_message(err: &Error) -> String {
    match root_cause(err) {
        Error::Persist(p) => p.message.clone(),
        Error::Validation(v) => v
            .first_message()
            .unwrap_or(UNEXPECTED_ERROR_MESSAGE)
            .to_string(),
        _ => UNEXPECTED_ERROR_MESSAGE.to_string(),
    }
}

/// Log `err` at the severity of its fault.
pub fn log_error(err: &Error, path: &str) {
    let id = err.error_id().unwrap_or("-");
    match err.fault() {
        Fault::Client => tracing::warn!(error = %err, id, path, "request rejected"),
        Fault::Server => tracing::error!(error = %err, id, path, "request failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rowbind_core::error::{QueryError, QueryErrorKind};
    use rowbind_core::{
        FixedErrorIds, PersistError, PersistErrorKind, ValidationError, ValidationErrorKind,
    };

    fn clock() -> FixedClock {
        FixedClock(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap())
    }

    fn unique_violation() -> Error {
        Error::Query(QueryError {
            kind: QueryErrorKind::Constraint,
            sql: None,
            sqlstate: Some("23505".to_string()),
            message: "UNIQUE constraint failed: users.username".to_string(),
            detail: None,
            source: None,
        })
    }

    fn wrapped_constraint() -> Error {
        let ids = FixedErrorIds::new("abc");
        let root = PersistError::classified(
            PersistErrorKind::Constraint,
            "mapper.insert_within_transaction",
            "Constraint violation: failed to insert entry",
            Some(unique_violation()),
            &ids,
        );
        let relation = PersistError::wrap(
            PersistErrorKind::Relation,
            "mapper.insert",
            "Failed to insert entry",
            root.into(),
            &ids,
        );
        PersistError::wrap(
            PersistErrorKind::Context,
            "services.add_user",
            "Failed to register user",
            relation.into(),
            &FixedErrorIds::new("unused"),
        )
        .into()
    }

    #[test]
    fn reports_the_root_classification() {
        let resp = ErrorResponse::from_error(
            &wrapped_constraint(),
            "/register",
            &clock(),
            &FixedErrorIds::new("fresh"),
        );
        assert_eq!(resp.status, 400);
        assert_eq!(resp.error, "Bad Request");
        assert_eq!(resp.id, "abc");
        assert_eq!(resp.message, "Constraint violation: failed to insert entry");
        assert_eq!(resp.path, "/register");
        assert_eq!(resp.timestamp, clock().0);
    }

    #[test]
    fn validation_message_reaches_the_client() {
        let mut v = ValidationError::new();
        v.add("email", ValidationErrorKind::Pattern, "Invalid email");
        let err: Error = v.into();

        let resp =
            ErrorResponse::from_error(&err, "/register", &clock(), &FixedErrorIds::new("fresh"));
        assert_eq!(resp.status, 400);
        assert_eq!(resp.id, "fresh");
        assert_eq!(resp.message, "Invalid email");
    }

    #[test]
    fn unclassified_errors_are_server_faults() {
        let err = Error::Custom("disk on fire".to_string());
        let resp = ErrorResponse::from_error(&err, "/register", &clock(), &FixedErrorIds::new("x"));
        assert_eq!(resp.status, 500);
        assert_eq!(resp.error, "Internal Server Error");
        assert_eq!(resp.message, UNEXPECTED_ERROR_MESSAGE);
    }

    #[test]
    fn serializes_every_field() {
        let resp = ErrorResponse::from_error(
            &wrapped_constraint(),
            "/register",
            &clock(),
            &FixedErrorIds::new("fresh"),
        );
        let json: serde_json::Value = serde_json::from_str(&resp.to_json()).unwrap();
        assert_eq!(json["error"], "Bad Request");
        assert_eq!(json["id"], "abc");
        assert_eq!(json["status"], 400);
        assert_eq!(json["path"], "/register");
        assert_eq!(json["timestamp"], "2024-05-01T12:00:00Z");
    }
}
