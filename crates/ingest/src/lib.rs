//! Bulk offer ingestion: row validation, the background ingestion worker,
//! task lifecycle management and the persistence gateway it drives.

pub mod error;
pub mod gateway;
pub mod lifecycle;
pub mod memory;
pub mod validator;
pub mod workbook;
pub mod worker;

#[cfg(test)]
pub(crate) mod fixtures;

pub use error::{GatewayError, SubmitError, WorkbookError};
pub use gateway::{Finalization, PersistenceGateway, TaskPage};
pub use lifecycle::{IngestionDispatcher, TaskLifecycle};
pub use memory::MemoryGateway;
pub use validator::{validate_row, RowRejection, ValidRow};
pub use workbook::{RowDefect, Workbook};
pub use worker::{FailureKind, IngestionRequest, IngestionWorker, ScanReport, WorkerOutcome};
