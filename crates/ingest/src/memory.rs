//! In-process gateway with the same semantics as the PostgreSQL one.
//!
//! Backs the test suites and local experiments. A single mutex makes every
//! operation atomic; `bulk_apply` stages its changes on a copy of the
//! catalog and only commits when the whole batch went through.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use offers_core::{
    ApplyOutcome, CandidateOffer, OfferId, Seller, SellerId, Task, TaskId, TaskStatus, TaskSummary,
};

use crate::error::GatewayError;
use crate::gateway::{Finalization, PersistenceGateway, TaskPage};

/// Catalog entry as stored for a seller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredOffer {
    pub name: String,
    pub price: u64,
    pub quantity: u64,
}

#[derive(Debug, Clone)]
struct TaskRecord {
    seller_id: SellerId,
    start_time: DateTime<Utc>,
    finish_time: Option<DateTime<Utc>>,
    status: TaskStatus,
    summary: Option<TaskSummary>,
}

#[derive(Debug, Default)]
struct MemoryState {
    sellers: BTreeMap<SellerId, String>,
    tasks: BTreeMap<TaskId, TaskRecord>,
    offers: BTreeMap<(SellerId, OfferId), StoredOffer>,
    last_seller_id: SellerId,
    last_task_id: TaskId,
}

impl MemoryState {
    fn insert_seller(&mut self, name: &str) -> SellerId {
        self.last_seller_id += 1;
        let id = self.last_seller_id;
        self.sellers.insert(id, name.to_string());
        id
    }

    fn to_task(&self, task_id: TaskId, record: &TaskRecord) -> Task {
        Task {
            task_id,
            seller: Seller {
                seller_id: record.seller_id,
                seller_name: self.sellers.get(&record.seller_id).cloned().unwrap_or_default(),
            },
            start_time: record.start_time,
            finish_time: record.finish_time,
            status: record.status,
            summary: record.summary,
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryGateway {
    state: Mutex<MemoryState>,
    fail_bulk_apply: AtomicBool,
    fail_force_error: AtomicBool,
    bulk_apply_calls: AtomicU64,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a seller and return its id.
    pub fn add_seller(&self, name: &str) -> SellerId {
        self.lock().insert_seller(name)
    }

    /// Make every subsequent `bulk_apply` fail as if the store went away.
    pub fn set_fail_bulk_apply(&self, fail: bool) {
        self.fail_bulk_apply.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent `force_error` fail as if the store went away.
    pub fn set_fail_force_error(&self, fail: bool) {
        self.fail_force_error.store(fail, Ordering::SeqCst);
    }

    /// Number of `bulk_apply` calls received, failed ones included.
    pub fn bulk_apply_calls(&self) -> u64 {
        self.bulk_apply_calls.load(Ordering::SeqCst)
    }

    pub fn offer(&self, seller_id: SellerId, offer_id: OfferId) -> Option<StoredOffer> {
        self.lock().offers.get(&(seller_id, offer_id)).cloned()
    }

    pub fn offer_count(&self, seller_id: SellerId) -> usize {
        self.lock()
            .offers
            .keys()
            .filter(|(seller, _)| *seller == seller_id)
            .count()
    }
}

#[async_trait]
impl PersistenceGateway for MemoryGateway {
    async fn create_seller(&self, seller_name: &str) -> Result<Seller, GatewayError> {
        let mut state = self.lock();
        if state.sellers.values().any(|name| name == seller_name) {
            return Err(GatewayError::DuplicateSeller(seller_name.to_string()));
        }
        let seller_id = state.insert_seller(seller_name);
        Ok(Seller {
            seller_id,
            seller_name: seller_name.to_string(),
        })
    }

    async fn get_seller(&self, seller_id: SellerId) -> Result<Option<Seller>, GatewayError> {
        Ok(self.lock().sellers.get(&seller_id).map(|name| Seller {
            seller_id,
            seller_name: name.clone(),
        }))
    }

    async fn list_sellers(&self) -> Result<Vec<Seller>, GatewayError> {
        Ok(self
            .lock()
            .sellers
            .iter()
            .map(|(seller_id, name)| Seller {
                seller_id: *seller_id,
                seller_name: name.clone(),
            })
            .collect())
    }

    async fn seller_exists(&self, seller_id: SellerId) -> Result<bool, GatewayError> {
        Ok(self.lock().sellers.contains_key(&seller_id))
    }

    async fn create_task(&self, seller_id: SellerId) -> Result<TaskId, GatewayError> {
        let mut state = self.lock();
        if !state.sellers.contains_key(&seller_id) {
            return Err(GatewayError::UnknownSeller(seller_id));
        }
        state.last_task_id += 1;
        let task_id = state.last_task_id;
        state.tasks.insert(
            task_id,
            TaskRecord {
                seller_id,
                start_time: Utc::now(),
                finish_time: None,
                status: TaskStatus::Running,
                summary: None,
            },
        );
        Ok(task_id)
    }

    async fn bulk_apply(
        &self,
        task_id: TaskId,
        error_count: u64,
        offers: &[CandidateOffer],
    ) -> Result<ApplyOutcome, GatewayError> {
        self.bulk_apply_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_bulk_apply.load(Ordering::SeqCst) {
            return Err(GatewayError::Backend("connection reset by peer".to_string()));
        }

        let mut state = self.lock();
        let status = state
            .tasks
            .get(&task_id)
            .map(|t| t.status)
            .ok_or(GatewayError::TaskNotFound(task_id))?;
        if !status.can_transition_to(TaskStatus::Completed) {
            return Err(GatewayError::AlreadyTerminal { task_id, status });
        }

        let mut catalog = state.offers.clone();
        let mut outcome = ApplyOutcome::default();
        for offer in offers {
            if !state.sellers.contains_key(&offer.seller_id) {
                return Err(GatewayError::UnknownSeller(offer.seller_id));
            }
            let key = (offer.seller_id, offer.offer_id);
            if offer.available {
                let stored = StoredOffer {
                    name: offer.name.clone(),
                    price: offer.price,
                    quantity: offer.quantity,
                };
                if catalog.insert(key, stored).is_some() {
                    outcome.num_updated += 1;
                } else {
                    outcome.num_created += 1;
                }
            } else if catalog.remove(&key).is_some() {
                outcome.num_deleted += 1;
            }
        }

        state.offers = catalog;
        if let Some(task) = state.tasks.get_mut(&task_id) {
            task.status = TaskStatus::Completed;
            task.finish_time = Some(Utc::now());
            task.summary = Some(TaskSummary::new(error_count, outcome));
        }
        Ok(outcome)
    }

    async fn force_error(&self, task_id: TaskId) -> Result<Finalization, GatewayError> {
        if self.fail_force_error.load(Ordering::SeqCst) {
            return Err(GatewayError::Backend("connection reset by peer".to_string()));
        }
        let mut state = self.lock();
        let task = state
            .tasks
            .get_mut(&task_id)
            .ok_or(GatewayError::TaskNotFound(task_id))?;
        if !task.status.can_transition_to(TaskStatus::Error) {
            return Ok(Finalization::AlreadyTerminal(task.status));
        }
        task.status = TaskStatus::Error;
        task.finish_time = Some(Utc::now());
        task.summary = None;
        Ok(Finalization::Applied)
    }

    async fn sweep_abandoned(&self) -> Result<Vec<TaskId>, GatewayError> {
        let mut state = self.lock();
        let now = Utc::now();
        let mut swept = Vec::new();
        for (task_id, task) in state.tasks.iter_mut() {
            if task.status == TaskStatus::Running {
                task.status = TaskStatus::Error;
                task.finish_time = Some(now);
                swept.push(*task_id);
            }
        }
        Ok(swept)
    }

    async fn get_task(&self, task_id: TaskId) -> Result<Option<Task>, GatewayError> {
        let state = self.lock();
        Ok(state
            .tasks
            .get(&task_id)
            .map(|record| state.to_task(task_id, record)))
    }

    async fn list_tasks(&self, page: TaskPage) -> Result<Vec<Task>, GatewayError> {
        let state = self.lock();
        let offset = page.offset.unwrap_or(0) as usize;
        let limit = page.limit.map(|l| l as usize).unwrap_or(usize::MAX);
        Ok(state
            .tasks
            .iter()
            .skip(offset)
            .take(limit)
            .map(|(task_id, record)| state.to_task(*task_id, record))
            .collect())
    }
}
