//! Shared Diesel error classification for the loyalty adapters.
//!
//! Every adapter funnels Diesel and pool failures through
//! [`classify_diesel_error`] so write races are recognised the same way
//! everywhere.

use diesel::result::{DatabaseErrorKind, Error as DieselError};
use tracing::debug;

use super::pool::PoolError;

/// Coarse category of a Diesel failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DieselFailure {
    /// A concurrent transaction won a race; the unit of work may be retried.
    Conflict(&'static str),
    /// The connection was lost.
    Connection(&'static str),
    /// Any other failure.
    Query(&'static str),
}

/// Extract the message of a pool error.
pub(crate) fn pool_error_message(error: PoolError) -> String {
    match error {
        PoolError::Checkout { message } | PoolError::Build { message } => message,
    }
}

/// Classify a Diesel error and emit debug context.
pub(crate) fn classify_diesel_error(error: &DieselError) -> DieselFailure {
    match error {
        DieselError::DatabaseError(kind, info) => {
            debug!(?kind, message = info.message(), "diesel operation failed");
        }
        _ => debug!(
            error_type = %std::any::type_name_of_val(error),
            "diesel operation failed"
        ),
    }

    match error {
        DieselError::NotFound => DieselFailure::Query("record not found"),
        DieselError::QueryBuilderError(_) => DieselFailure::Query("database query error"),
        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
            DieselFailure::Conflict("concurrent insert detected")
        }
        DieselError::DatabaseError(DatabaseErrorKind::SerializationFailure, _) => {
            DieselFailure::Conflict("serialization failure")
        }
        DieselError::DatabaseError(DatabaseErrorKind::ClosedConnection, _) => {
            DieselFailure::Connection("database connection error")
        }
        DieselError::DatabaseError(_, info) if is_deadlock_message(info.message()) => {
            DieselFailure::Conflict("deadlock detected")
        }
        DieselError::DatabaseError(DatabaseErrorKind::ForeignKeyViolation, _) => {
            DieselFailure::Query("referenced record does not exist")
        }
        DieselError::DatabaseError(DatabaseErrorKind::CheckViolation, _) => {
            DieselFailure::Query("check constraint violated")
        }
        _ => DieselFailure::Query("database error"),
    }
}

fn is_deadlock_message(message: &str) -> bool {
    message.to_lowercase().contains("deadlock detected")
}
