//! Helpers over the libsqlite3 bindings.
//!
//! The raw API comes from `libsqlite3-sys`; this module adds the few safe
//! wrappers and result-code tables the driver needs.

pub use libsqlite3_sys::*;

use std::ffi::{CStr, c_int};

// Extended constraint result codes (primary code | subcode << 8).
pub const CONSTRAINT_CHECK: c_int = SQLITE_CONSTRAINT | (1 << 8);
pub const CONSTRAINT_FOREIGNKEY: c_int = SQLITE_CONSTRAINT | (3 << 8);
pub const CONSTRAINT_NOTNULL: c_int = SQLITE_CONSTRAINT | (5 << 8);
pub const CONSTRAINT_PRIMARYKEY: c_int = SQLITE_CONSTRAINT | (6 << 8);
pub const CONSTRAINT_UNIQUE: c_int = SQLITE_CONSTRAINT | (8 << 8);

/// Get the SQLite library version as a string.
pub fn version() -> &'static str {
    // SAFETY: sqlite3_libversion returns a static string
    unsafe {
        let ptr = sqlite3_libversion();
        CStr::from_ptr(ptr).to_str().unwrap_or("unknown")
    }
}

/// Get the SQLite library version as a number.
pub fn version_number() -> i32 {
    // SAFETY: sqlite3_libversion_number is always safe to call
    unsafe { sqlite3_libversion_number() }
}

/// Convert an SQLite result code to a human-readable string.
pub fn error_string(code: c_int) -> &'static str {
    // SAFETY: sqlite3_errstr returns a static string
    unsafe {
        let ptr = sqlite3_errstr(code);
        CStr::from_ptr(ptr).to_str().unwrap_or("unknown error")
    }
}

/// Most recent error message on `db`.
///
/// # Safety
/// `db` must be a valid, open connection handle.
pub unsafe fn errmsg(db: *mut sqlite3) -> String {
    // SAFETY: caller guarantees db is valid; errmsg never returns null for a
    // valid handle
    unsafe {
        let ptr = sqlite3_errmsg(db);
        if ptr.is_null() {
            return String::new();
        }
        CStr::from_ptr(ptr).to_string_lossy().into_owned()
    }
}

/// SQLSTATE equivalent of an extended result code, when one exists.
pub fn sqlstate(extended_code: c_int) -> Option<&'static str> {
    match extended_code {
        CONSTRAINT_UNIQUE | CONSTRAINT_PRIMARYKEY => Some("23505"),
        CONSTRAINT_NOTNULL => Some("23502"),
        CONSTRAINT_FOREIGNKEY => Some("23503"),
        CONSTRAINT_CHECK => Some("23514"),
        code if code & 0xff == SQLITE_CONSTRAINT => Some("23000"),
        _ => None,
    }
}
