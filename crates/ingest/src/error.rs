//! Ingestion error types.

use offers_core::{SellerId, TaskId, TaskStatus};
use thiserror::Error;

/// Errors reported by a [`PersistenceGateway`](crate::PersistenceGateway).
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("seller {0} does not exist")]
    UnknownSeller(SellerId),

    #[error("seller named {0:?} already exists")]
    DuplicateSeller(String),

    #[error("task {0} does not exist")]
    TaskNotFound(TaskId),

    #[error("task {task_id} is already {status}")]
    AlreadyTerminal { task_id: TaskId, status: TaskStatus },

    #[error("storage backend error: {0}")]
    Backend(String),
}

/// The uploaded bytes are not a workbook container at all.
#[derive(Debug, Error)]
pub enum WorkbookError {
    #[error("not a readable workbook: {0}")]
    Unreadable(String),
}

/// Errors surfaced synchronously by [`TaskLifecycle::submit_ingestion`](crate::TaskLifecycle::submit_ingestion).
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("seller {0} does not exist")]
    UnknownSeller(SellerId),

    #[error("ingestion dispatcher is not running (task {0} marked as error)")]
    DispatcherClosed(TaskId),

    #[error(transparent)]
    Gateway(#[from] GatewayError),
}
