use std::time::Duration;

use crate::utils::IsTransient;

// ============================================================================
// Error Taxonomy
// ============================================================================
//
// DecodeError  - inbound payload is unusable; never reaches the store
// StoreError   - persistence failed; the cache is never touched on this path
// ServiceError - what the read/write facade reports to its callers
//
// A cache miss is not an error: `OrderCache::get` returns `None`.
//
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Malformed order payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid field {field}: {reason}")]
    Invalid { field: String, reason: String },
}

impl DecodeError {
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        DecodeError::Invalid {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Store call exceeded {0:?}")]
    Timeout(Duration),

    #[error("Order {order_uid} has no {table} row")]
    Inconsistent { order_uid: String, table: &'static str },

    #[error("Order {order_uid} rejected by the database ({sqlstate}): {message}")]
    Rejected {
        order_uid: String,
        sqlstate: String,
        message: String,
    },
}

impl StoreError {
    /// Attach the order id to a failed write, singling out data the database
    /// will never accept.
    pub fn from_write(order_uid: &str, err: sqlx::Error) -> Self {
        let rejected = match &err {
            sqlx::Error::Database(db_err) => db_err
                .code()
                .filter(|code| is_rejected_sqlstate(code))
                .map(|code| (code.into_owned(), db_err.message().to_string())),
            _ => None,
        };

        match rejected {
            Some((sqlstate, message)) => StoreError::Rejected {
                order_uid: order_uid.to_string(),
                sqlstate,
                message,
            },
            None => StoreError::Database(err),
        }
    }

    /// Retrying or redelivering the same payload cannot succeed
    pub fn is_rejection(&self) -> bool {
        matches!(self, StoreError::Rejected { .. })
    }
}

impl IsTransient for StoreError {
    fn is_transient(&self) -> bool {
        match self {
            StoreError::Timeout(_) => true,
            StoreError::Inconsistent { .. } | StoreError::Rejected { .. } => false,
            StoreError::Database(err) => match err {
                sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::WorkerCrashed => true,
                sqlx::Error::Database(db_err) => db_err
                    .code()
                    .map(|code| is_transient_sqlstate(&code))
                    .unwrap_or(false),
                _ => false,
            },
        }
    }
}

/// serialization_failure, deadlock_detected and the connection exception class
fn is_transient_sqlstate(code: &str) -> bool {
    code == "40001" || code == "40P01" || code.starts_with("08")
}

/// data_exception and integrity_constraint_violation
fn is_rejected_sqlstate(code: &str) -> bool {
    code.starts_with("22") || code.starts_with("23")
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Order {0} not found")]
    NotFound(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}
