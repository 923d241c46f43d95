//! Task lifecycle: create a task, hand the upload to a background worker,
//! and finalize tasks that can no longer progress.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use offers_core::{SellerId, TaskId};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::error::{GatewayError, SubmitError};
use crate::gateway::{Finalization, PersistenceGateway};
use crate::worker::{IngestionRequest, IngestionWorker, WorkerOutcome};

/// Entry point for ingestion. Cheap to clone; every clone feeds the same
/// dispatcher.
pub struct TaskLifecycle<G> {
    gateway: Arc<G>,
    sender: mpsc::UnboundedSender<IngestionRequest>,
    active: Arc<AtomicU64>,
}

impl<G> Clone for TaskLifecycle<G> {
    fn clone(&self) -> Self {
        Self {
            gateway: self.gateway.clone(),
            sender: self.sender.clone(),
            active: self.active.clone(),
        }
    }
}

impl<G: PersistenceGateway> TaskLifecycle<G> {
    /// Build the lifecycle and the dispatcher that must be driven with
    /// [`IngestionDispatcher::run`] for submitted uploads to be processed.
    pub fn new(gateway: Arc<G>) -> (Self, IngestionDispatcher<G>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let active = Arc::new(AtomicU64::new(0));
        let lifecycle = Self {
            gateway: gateway.clone(),
            sender,
            active: active.clone(),
        };
        let dispatcher = IngestionDispatcher {
            gateway,
            receiver,
            active,
        };
        (lifecycle, dispatcher)
    }

    pub fn gateway(&self) -> &Arc<G> {
        &self.gateway
    }

    /// Number of workers currently processing an upload.
    pub fn active_workers(&self) -> u64 {
        self.active.load(Ordering::SeqCst)
    }

    /// Create a `Running` task for the upload and schedule it. Returns as
    /// soon as the task exists; the file is processed in the background.
    pub async fn submit_ingestion(
        &self,
        file: Bytes,
        seller_id: SellerId,
    ) -> Result<TaskId, SubmitError> {
        if !self.gateway.seller_exists(seller_id).await? {
            return Err(SubmitError::UnknownSeller(seller_id));
        }

        let task_id = match self.gateway.create_task(seller_id).await {
            Ok(id) => id,
            Err(GatewayError::UnknownSeller(id)) => return Err(SubmitError::UnknownSeller(id)),
            Err(e) => return Err(e.into()),
        };

        let size = file.len();
        let request = IngestionRequest {
            task_id,
            seller_id,
            file,
        };
        if self.sender.send(request).is_err() {
            error!(task_id, seller_id, "ingestion dispatcher is gone");
            // Left running on failure; the next startup sweep finalizes it.
            if let Err(e) = self.finalize_error(task_id).await {
                error!(task_id, error = %e, "could not mark task as error");
            }
            return Err(SubmitError::DispatcherClosed(task_id));
        }

        info!(task_id, seller_id, bytes = size, "ingestion task submitted");
        Ok(task_id)
    }

    /// Force every task left `Running` by a previous process to `Error`.
    pub async fn recover_abandoned(&self) -> Result<Vec<TaskId>, GatewayError> {
        let swept = self.gateway.sweep_abandoned().await?;
        for task_id in &swept {
            warn!(task_id, "abandoned ingestion task marked as error");
        }
        if swept.is_empty() {
            debug!("no abandoned ingestion tasks");
        } else {
            info!(count = swept.len(), "recovered abandoned ingestion tasks");
        }
        Ok(swept)
    }

    /// Move a task to `Error`. An already terminal task is left as is.
    pub async fn finalize_error(&self, task_id: TaskId) -> Result<Finalization, GatewayError> {
        let result = self.gateway.force_error(task_id).await?;
        if let Finalization::AlreadyTerminal(status) = result {
            warn!(task_id, %status, "task already finalized, not overwritten");
        }
        Ok(result)
    }
}

/// Receives submitted uploads and runs one worker per upload.
pub struct IngestionDispatcher<G> {
    gateway: Arc<G>,
    receiver: mpsc::UnboundedReceiver<IngestionRequest>,
    active: Arc<AtomicU64>,
}

impl<G: PersistenceGateway> IngestionDispatcher<G> {
    /// Runs until every [`TaskLifecycle`] clone has been dropped.
    pub async fn run(mut self) {
        info!("ingestion dispatcher started");
        while let Some(request) = self.receiver.recv().await {
            let worker = IngestionWorker::new(self.gateway.clone());
            let active = self.active.clone();
            let task_id = request.task_id;

            let in_flight = active.fetch_add(1, Ordering::SeqCst) + 1;
            debug!(task_id, in_flight, "ingestion worker started");

            tokio::spawn(async move {
                let outcome = worker.run(request).await;
                let in_flight = active.fetch_sub(1, Ordering::SeqCst) - 1;
                match outcome {
                    WorkerOutcome::Completed { .. } => {
                        debug!(task_id, in_flight, "ingestion worker finished");
                    }
                    WorkerOutcome::Failed(kind) => {
                        debug!(task_id, in_flight, reason = kind.as_str(), "ingestion worker failed");
                    }
                }
            });
        }
        info!("ingestion dispatcher stopped");
    }
}
