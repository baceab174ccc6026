//! CLI output: error mapping from domain errors to stable CLI surface.

use crate::error::{ApiError, ErrorClass};

/// Map domain errors to a one-line message for stderr.
pub fn map_error(e: &ApiError) -> String {
    match e.class() {
        ErrorClass::Transient => format!("{} (safe to retry)", e),
        _ => e.to_string(),
    }
}

/// Process exit code per error class.
pub fn exit_code(e: &ApiError) -> i32 {
    match e.class() {
        ErrorClass::Environment => 1,
        ErrorClass::Input => 2,
        ErrorClass::Consistency => 3,
        ErrorClass::Transient => 4,
    }
}
