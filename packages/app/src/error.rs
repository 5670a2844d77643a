//! Application error type.

use actors::PoolError;
use db::DbError;
use dispatch_core::{DataError, QueueError};
use storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Db(#[from] DbError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error(transparent)]
    Data(#[from] DataError),
}

impl AppError {
    /// True when the caller asked for something that does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, AppError::Data(DataError::NotFound { .. }))
    }

    /// Field-level detail for validation failures, empty otherwise.
    pub fn field_errors(&self) -> &[dispatch_core::network::FieldError] {
        match self {
            AppError::Data(DataError::Validation(fields)) => fields,
            _ => &[],
        }
    }
}
