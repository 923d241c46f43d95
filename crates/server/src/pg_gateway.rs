//! PostgreSQL-backed [`PersistenceGateway`].
//!
//! Every operation is a single statement or a single transaction. The
//! `task` table's `status = 'running'` guard is what makes finalization
//! happen at most once.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::error;

use offers_core::{
    ApplyOutcome, CandidateOffer, OfferId, Seller, SellerId, Task, TaskId, TaskStatus,
    TaskSummary,
};
use offers_ingest::{Finalization, GatewayError, PersistenceGateway, TaskPage};

const TASK_COLUMNS: &str = "t.task_id, t.seller_id, s.seller_name, t.start_time, t.finish_time,
     t.status, t.num_errors, t.num_created, t.num_updated, t.num_deleted";

#[derive(Debug, sqlx::FromRow)]
struct TaskRow {
    task_id: i64,
    seller_id: i64,
    seller_name: String,
    start_time: DateTime<Utc>,
    finish_time: Option<DateTime<Utc>>,
    status: String,
    num_errors: Option<i64>,
    num_created: Option<i64>,
    num_updated: Option<i64>,
    num_deleted: Option<i64>,
}

impl TaskRow {
    fn into_task(self) -> Result<Task, GatewayError> {
        let status: TaskStatus = self
            .status
            .parse()
            .map_err(|e: offers_core::OffersError| GatewayError::Backend(e.to_string()))?;
        let summary = match (self.num_errors, self.num_created, self.num_updated, self.num_deleted) {
            (Some(errors), Some(created), Some(updated), Some(deleted)) => Some(TaskSummary {
                num_errors: errors.max(0) as u64,
                num_created: created.max(0) as u64,
                num_updated: updated.max(0) as u64,
                num_deleted: deleted.max(0) as u64,
            }),
            _ => None,
        };
        Ok(Task {
            task_id: self.task_id,
            seller: Seller {
                seller_id: self.seller_id,
                seller_name: self.seller_name,
            },
            start_time: self.start_time,
            finish_time: self.finish_time,
            status,
            summary,
        })
    }
}

pub struct PgGateway {
    pool: PgPool,
}

impl PgGateway {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn task_status(&self, task_id: TaskId) -> Result<Option<TaskStatus>, GatewayError> {
        let status: Option<String> =
            sqlx::query_scalar("SELECT status FROM task WHERE task_id = $1")
                .bind(task_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(backend)?;
        status
            .map(|s| s.parse().map_err(|e: offers_core::OffersError| GatewayError::Backend(e.to_string())))
            .transpose()
    }
}

#[async_trait]
impl PersistenceGateway for PgGateway {
    async fn create_seller(&self, seller_name: &str) -> Result<Seller, GatewayError> {
        let seller_id: SellerId =
            sqlx::query_scalar("INSERT INTO seller (seller_name) VALUES ($1) RETURNING seller_id")
                .bind(seller_name)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| map_unique_violation(e, seller_name))?;
        Ok(Seller {
            seller_id,
            seller_name: seller_name.to_string(),
        })
    }

    async fn get_seller(&self, seller_id: SellerId) -> Result<Option<Seller>, GatewayError> {
        let row: Option<(i64, String)> =
            sqlx::query_as("SELECT seller_id, seller_name FROM seller WHERE seller_id = $1")
                .bind(seller_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(backend)?;
        Ok(row.map(|(seller_id, seller_name)| Seller {
            seller_id,
            seller_name,
        }))
    }

    async fn list_sellers(&self) -> Result<Vec<Seller>, GatewayError> {
        let rows: Vec<(i64, String)> =
            sqlx::query_as("SELECT seller_id, seller_name FROM seller ORDER BY seller_id")
                .fetch_all(&self.pool)
                .await
                .map_err(backend)?;
        Ok(rows
            .into_iter()
            .map(|(seller_id, seller_name)| Seller {
                seller_id,
                seller_name,
            })
            .collect())
    }

    async fn seller_exists(&self, seller_id: SellerId) -> Result<bool, GatewayError> {
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM seller WHERE seller_id = $1)")
            .bind(seller_id)
            .fetch_one(&self.pool)
            .await
            .map_err(backend)
    }

    async fn create_task(&self, seller_id: SellerId) -> Result<TaskId, GatewayError> {
        sqlx::query_scalar("INSERT INTO task (seller_id) VALUES ($1) RETURNING task_id")
            .bind(seller_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_fk_violation(e, seller_id))
    }

    async fn bulk_apply(
        &self,
        task_id: TaskId,
        error_count: u64,
        offers: &[CandidateOffer],
    ) -> Result<ApplyOutcome, GatewayError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;

        let status: Option<String> =
            sqlx::query_scalar("SELECT status FROM task WHERE task_id = $1 FOR UPDATE")
                .bind(task_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(backend)?;
        let status: TaskStatus = status
            .ok_or(GatewayError::TaskNotFound(task_id))?
            .parse()
            .map_err(|e: offers_core::OffersError| GatewayError::Backend(e.to_string()))?;
        if status.is_terminal() {
            return Err(GatewayError::AlreadyTerminal { task_id, status });
        }

        let keys: Vec<(SellerId, OfferId)> = offers
            .iter()
            .map(|o| (o.seller_id, o.offer_id))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let (key_sellers, key_offers): (Vec<i64>, Vec<i64>) = keys.into_iter().unzip();
        let existing: Vec<(i64, i64)> = sqlx::query_as(
            "SELECT o.seller_id, o.offer_id
             FROM offer o
             JOIN UNNEST($1::bigint[], $2::bigint[]) AS k (seller_id, offer_id)
               ON o.seller_id = k.seller_id AND o.offer_id = k.offer_id
             FOR UPDATE OF o",
        )
        .bind(&key_sellers)
        .bind(&key_offers)
        .fetch_all(&mut *tx)
        .await
        .map_err(backend)?;

        let existing: HashSet<(SellerId, OfferId)> = existing.into_iter().collect();
        let plan = plan_batch(&existing, offers);

        if let Some(first) = plan.upserts.first() {
            let seller_id = first.seller_id;
            let mut sellers = Vec::with_capacity(plan.upserts.len());
            let mut ids = Vec::with_capacity(plan.upserts.len());
            let mut names = Vec::with_capacity(plan.upserts.len());
            let mut prices = Vec::with_capacity(plan.upserts.len());
            let mut quantities = Vec::with_capacity(plan.upserts.len());
            for offer in &plan.upserts {
                sellers.push(offer.seller_id);
                ids.push(offer.offer_id);
                names.push(offer.name.clone());
                prices.push(to_bigint(offer.price)?);
                quantities.push(to_bigint(offer.quantity)?);
            }
            sqlx::query(
                "INSERT INTO offer (seller_id, offer_id, name, price, quantity)
                 SELECT * FROM UNNEST($1::bigint[], $2::bigint[], $3::text[], $4::bigint[], $5::bigint[])
                 ON CONFLICT (seller_id, offer_id) DO UPDATE
                 SET name = EXCLUDED.name,
                     price = EXCLUDED.price,
                     quantity = EXCLUDED.quantity,
                     updated_at = now()",
            )
            .bind(&sellers)
            .bind(&ids)
            .bind(&names)
            .bind(&prices)
            .bind(&quantities)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_fk_violation(e, seller_id))?;
        }

        if !plan.deletes.is_empty() {
            let (sellers, ids): (Vec<i64>, Vec<i64>) = plan.deletes.iter().copied().unzip();
            sqlx::query(
                "DELETE FROM offer o
                 USING UNNEST($1::bigint[], $2::bigint[]) AS k (seller_id, offer_id)
                 WHERE o.seller_id = k.seller_id AND o.offer_id = k.offer_id",
            )
            .bind(&sellers)
            .bind(&ids)
            .execute(&mut *tx)
            .await
            .map_err(backend)?;
        }

        let outcome = plan.outcome;
        let result = sqlx::query(
            "UPDATE task
             SET status = 'completed', finish_time = now(),
                 num_errors = $2, num_created = $3, num_updated = $4, num_deleted = $5
             WHERE task_id = $1 AND status = 'running'",
        )
        .bind(task_id)
        .bind(to_bigint(error_count)?)
        .bind(to_bigint(outcome.num_created)?)
        .bind(to_bigint(outcome.num_updated)?)
        .bind(to_bigint(outcome.num_deleted)?)
        .execute(&mut *tx)
        .await
        .map_err(backend)?;
        if result.rows_affected() != 1 {
            return Err(GatewayError::Backend(format!(
                "task {task_id} changed status during bulk apply"
            )));
        }

        tx.commit().await.map_err(backend)?;
        Ok(outcome)
    }

    async fn force_error(&self, task_id: TaskId) -> Result<Finalization, GatewayError> {
        let result = sqlx::query(
            "UPDATE task
             SET status = 'error', finish_time = now(),
                 num_errors = NULL, num_created = NULL, num_updated = NULL, num_deleted = NULL
             WHERE task_id = $1 AND status = 'running'",
        )
        .bind(task_id)
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        if result.rows_affected() == 1 {
            return Ok(Finalization::Applied);
        }

        match self.task_status(task_id).await? {
            Some(status) => Ok(Finalization::AlreadyTerminal(status)),
            None => Err(GatewayError::TaskNotFound(task_id)),
        }
    }

    async fn sweep_abandoned(&self) -> Result<Vec<TaskId>, GatewayError> {
        let mut swept: Vec<TaskId> = sqlx::query_scalar(
            "UPDATE task SET status = 'error', finish_time = now()
             WHERE status = 'running'
             RETURNING task_id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        swept.sort_unstable();
        Ok(swept)
    }

    async fn get_task(&self, task_id: TaskId) -> Result<Option<Task>, GatewayError> {
        let sql = format!(
            "SELECT {TASK_COLUMNS}
             FROM task t JOIN seller s ON s.seller_id = t.seller_id
             WHERE t.task_id = $1"
        );
        let row = sqlx::query_as::<_, TaskRow>(&sql)
            .bind(task_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        row.map(TaskRow::into_task).transpose()
    }

    async fn list_tasks(&self, page: TaskPage) -> Result<Vec<Task>, GatewayError> {
        let sql = format!(
            "SELECT {TASK_COLUMNS}
             FROM task t JOIN seller s ON s.seller_id = t.seller_id
             ORDER BY t.task_id
             LIMIT $1 OFFSET $2"
        );
        let rows = sqlx::query_as::<_, TaskRow>(&sql)
            .bind(page.limit.map(i64::from))
            .bind(i64::from(page.offset.unwrap_or(0)))
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;
        rows.into_iter().map(TaskRow::into_task).collect()
    }
}

/// Catalog changes for one batch, after replaying it in document order
/// against the keys that already exist.
#[derive(Debug, Default)]
struct BatchPlan<'a> {
    /// Final state of every key whose last candidate is available.
    upserts: Vec<&'a CandidateOffer>,
    /// Keys whose last candidate is unavailable.
    deletes: Vec<(SellerId, OfferId)>,
    outcome: ApplyOutcome,
}

fn plan_batch<'a>(
    existing: &HashSet<(SellerId, OfferId)>,
    offers: &'a [CandidateOffer],
) -> BatchPlan<'a> {
    let mut present = existing.clone();
    let mut last = BTreeMap::new();
    let mut outcome = ApplyOutcome::default();

    for offer in offers {
        let key = (offer.seller_id, offer.offer_id);
        if offer.available {
            if present.insert(key) {
                outcome.num_created += 1;
            } else {
                outcome.num_updated += 1;
            }
        } else if present.remove(&key) {
            outcome.num_deleted += 1;
        }
        last.insert(key, offer);
    }

    let mut plan = BatchPlan {
        outcome,
        ..Default::default()
    };
    for (key, offer) in last {
        if offer.available {
            plan.upserts.push(offer);
        } else {
            plan.deletes.push(key);
        }
    }
    plan
}

fn backend(e: sqlx::Error) -> GatewayError {
    error!("Database error: {}", e);
    GatewayError::Backend(e.to_string())
}

/// Map a unique violation (SQLSTATE 23505) on `seller_name` to `DuplicateSeller`.
fn map_unique_violation(e: sqlx::Error, seller_name: &str) -> GatewayError {
    if let sqlx::Error::Database(ref db_err) = e {
        if db_err.code().as_deref() == Some("23505") {
            return GatewayError::DuplicateSeller(seller_name.to_string());
        }
    }
    backend(e)
}

/// Map a foreign-key violation (SQLSTATE 23503) to `UnknownSeller`.
fn map_fk_violation(e: sqlx::Error, seller_id: SellerId) -> GatewayError {
    if let sqlx::Error::Database(ref db_err) = e {
        if db_err.code().as_deref() == Some("23503") {
            return GatewayError::UnknownSeller(seller_id);
        }
    }
    backend(e)
}

fn to_bigint(value: u64) -> Result<i64, GatewayError> {
    i64::try_from(value).map_err(|_| GatewayError::Backend(format!("{value} exceeds BIGINT range")))
}
