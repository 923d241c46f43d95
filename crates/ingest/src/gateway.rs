//! Persistence gateway trait.
//!
//! Every method is one atomic unit against the store: callers never see
//! partial effects, and a read issued right after a call observes its
//! result.

use async_trait::async_trait;
use offers_core::{ApplyOutcome, CandidateOffer, Seller, SellerId, Task, TaskId, TaskStatus};

use crate::error::GatewayError;

/// Result of asking the store to finalize a task as `Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Finalization {
    /// The task moved `Running -> Error` just now.
    Applied,
    /// The task was already terminal; nothing changed.
    AlreadyTerminal(TaskStatus),
}

/// Pagination for task listings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskPage {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

#[async_trait]
pub trait PersistenceGateway: Send + Sync + 'static {
    /// Register a seller under a unique name.
    ///
    /// Fails with [`GatewayError::DuplicateSeller`] if the name is taken.
    async fn create_seller(&self, seller_name: &str) -> Result<Seller, GatewayError>;

    async fn get_seller(&self, seller_id: SellerId) -> Result<Option<Seller>, GatewayError>;

    /// Sellers ordered by id.
    async fn list_sellers(&self) -> Result<Vec<Seller>, GatewayError>;

    async fn seller_exists(&self, seller_id: SellerId) -> Result<bool, GatewayError>;

    /// Insert a `Running` task for the seller and return its id.
    ///
    /// Fails with [`GatewayError::UnknownSeller`] if the seller does not exist.
    async fn create_task(&self, seller_id: SellerId) -> Result<TaskId, GatewayError>;

    /// Apply the whole batch to the seller's catalog and complete the task.
    ///
    /// All-or-nothing: on any error neither the catalog nor the task is
    /// modified. A task that is no longer `Running` yields
    /// [`GatewayError::AlreadyTerminal`].
    async fn bulk_apply(
        &self,
        task_id: TaskId,
        error_count: u64,
        offers: &[CandidateOffer],
    ) -> Result<ApplyOutcome, GatewayError>;

    /// Move a `Running` task to `Error`. Re-applying is a no-op that leaves
    /// `finish_time` untouched.
    async fn force_error(&self, task_id: TaskId) -> Result<Finalization, GatewayError>;

    /// Force every `Running` task to `Error`. Returns the affected ids.
    async fn sweep_abandoned(&self) -> Result<Vec<TaskId>, GatewayError>;

    async fn get_task(&self, task_id: TaskId) -> Result<Option<Task>, GatewayError>;

    /// Tasks ordered by id.
    async fn list_tasks(&self, page: TaskPage) -> Result<Vec<Task>, GatewayError>;
}
