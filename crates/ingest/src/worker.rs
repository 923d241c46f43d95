//! Ingestion worker: turns one buffered upload into one terminal task status.
//!
//! The worker owns its batch and error counter until the single call to
//! [`PersistenceGateway::bulk_apply`]. Every failure path ends in exactly
//! one `force_error`; row-level problems are only counted.

use std::sync::Arc;

use bytes::Bytes;
use calamine::Data;
use offers_core::{ApplyOutcome, CandidateOffer, SellerId, TaskId};
use tracing::{debug, error, info, warn};

use crate::error::WorkbookError;
use crate::gateway::{Finalization, PersistenceGateway};
use crate::validator::validate_row;
use crate::workbook::{RowDefect, Workbook};

/// Handoff from the endpoint to a worker. Carries no request state.
#[derive(Debug, Clone)]
pub struct IngestionRequest {
    pub task_id: TaskId,
    pub seller_id: SellerId,
    pub file: Bytes,
}

/// Why a task ended in `Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The buffer is not a workbook.
    Unreadable,
    /// The workbook opened but produced no valid row.
    EmptyBatch,
    /// The bulk-apply call failed.
    Persistence,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Unreadable => "unreadable",
            FailureKind::EmptyBatch => "empty_batch",
            FailureKind::Persistence => "persistence",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerOutcome {
    Completed { num_errors: u64, outcome: ApplyOutcome },
    Failed(FailureKind),
}

/// Result of scanning a workbook.
#[derive(Debug, Default)]
pub struct ScanReport {
    pub batch: Vec<CandidateOffer>,
    pub num_errors: u64,
    pub rows_seen: u64,
}

impl ScanReport {
    /// Scan every row of the workbook in document order.
    pub fn scan(file: Bytes, seller_id: SellerId) -> Result<Self, WorkbookError> {
        let mut workbook = Workbook::open(file)?;
        let mut report = ScanReport::default();
        workbook.for_each_row(|row| report.record(row, seller_id));
        Ok(report)
    }

    /// Count one row and keep it if it validates.
    pub fn record(&mut self, row: Result<&[Data], RowDefect>, seller_id: SellerId) {
        self.rows_seen += 1;
        let row = match row {
            Ok(row) => row,
            Err(defect) => {
                debug!(?defect, "row could not be extracted");
                self.num_errors += 1;
                return;
            }
        };
        match validate_row(row) {
            Ok(valid) => self.batch.push(valid.for_seller(seller_id)),
            Err(reason) => {
                debug!(row = self.rows_seen, %reason, "row rejected");
                self.num_errors += 1;
            }
        }
    }
}

pub struct IngestionWorker<G> {
    gateway: Arc<G>,
}

impl<G: PersistenceGateway> IngestionWorker<G> {
    pub fn new(gateway: Arc<G>) -> Self {
        Self { gateway }
    }

    /// Process one upload to completion. The outcome is already recorded
    /// in the store when this returns; it is handed back for logging.
    pub async fn run(&self, request: IngestionRequest) -> WorkerOutcome {
        let IngestionRequest {
            task_id,
            seller_id,
            file,
        } = request;
        let size = file.len();

        let scan = tokio::task::spawn_blocking(move || ScanReport::scan(file, seller_id)).await;
        let report = match scan {
            Ok(Ok(report)) => report,
            Ok(Err(e)) => {
                warn!(task_id, seller_id, bytes = size, error = %e, "upload is not a workbook");
                return self.fail(task_id, FailureKind::Unreadable).await;
            }
            Err(e) => {
                error!(task_id, seller_id, error = %e, "workbook scan aborted");
                return self.fail(task_id, FailureKind::Unreadable).await;
            }
        };

        if report.batch.is_empty() {
            warn!(
                task_id,
                seller_id,
                rows = report.rows_seen,
                num_errors = report.num_errors,
                "workbook produced no valid offers"
            );
            return self.fail(task_id, FailureKind::EmptyBatch).await;
        }

        match self
            .gateway
            .bulk_apply(task_id, report.num_errors, &report.batch)
            .await
        {
            Ok(outcome) => {
                info!(
                    task_id,
                    seller_id,
                    num_errors = report.num_errors,
                    num_created = outcome.num_created,
                    num_updated = outcome.num_updated,
                    num_deleted = outcome.num_deleted,
                    "ingestion task completed"
                );
                WorkerOutcome::Completed {
                    num_errors: report.num_errors,
                    outcome,
                }
            }
            Err(e) => {
                error!(
                    task_id,
                    seller_id,
                    offers = report.batch.len(),
                    error = %e,
                    "bulk apply failed"
                );
                self.fail(task_id, FailureKind::Persistence).await
            }
        }
    }

    async fn fail(&self, task_id: TaskId, kind: FailureKind) -> WorkerOutcome {
        match self.gateway.force_error(task_id).await {
            Ok(Finalization::Applied) => {
                info!(task_id, reason = kind.as_str(), "ingestion task marked as error");
            }
            Ok(Finalization::AlreadyTerminal(status)) => {
                warn!(
                    task_id,
                    %status,
                    reason = kind.as_str(),
                    "task was already finalized, status left unchanged"
                );
            }
            // Left Running; the next startup sweep finalizes it.
            Err(e) => {
                error!(task_id, reason = kind.as_str(), error = %e, "could not mark task as error");
            }
        }
        WorkerOutcome::Failed(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{offer, scenario_a, workbook_bytes, Cell};
    use crate::memory::MemoryGateway;
    use offers_core::TaskStatus;

    async fn setup() -> (Arc<MemoryGateway>, IngestionWorker<MemoryGateway>, SellerId, TaskId) {
        let gateway = Arc::new(MemoryGateway::new());
        let seller_id = gateway.add_seller("First");
        let task_id = gateway.create_task(seller_id).await.unwrap();
        let worker = IngestionWorker::new(gateway.clone());
        (gateway, worker, seller_id, task_id)
    }

    fn request(task_id: TaskId, seller_id: SellerId, file: Bytes) -> IngestionRequest {
        IngestionRequest {
            task_id,
            seller_id,
            file,
        }
    }

    #[test]
    fn test_scan_counts_rejections_in_order() {
        let report = ScanReport::scan(scenario_a(), 7).unwrap();
        assert_eq!(report.rows_seen, 5);
        assert_eq!(report.num_errors, 1);
        let ids: Vec<_> = report.batch.iter().map(|o| o.offer_id).collect();
        assert_eq!(ids, vec![1, 2, 4, 5]);
        assert!(report.batch.iter().all(|o| o.seller_id == 7));
    }

    #[test]
    fn test_extraction_defect_counts_as_error() {
        let mut report = ScanReport::default();
        report.record(Err(RowDefect::CellError { row: 0, column: 2 }), 7);
        report.record(
            Err(RowDefect::UnreadableSheet {
                sheet: "Sheet2".to_string(),
            }),
            7,
        );
        assert_eq!(report.rows_seen, 2);
        assert_eq!(report.num_errors, 2);
        assert!(report.batch.is_empty());
    }

    #[test]
    fn test_blank_rows_count_as_errors() {
        let file = workbook_bytes(&[&[
            &[],
            &[],
            &offer(1.0, "Pen", 10.0, 5.0, "true"),
            &[],
            &offer(2.0, "Ink", 30.0, 2.0, "true"),
        ]]);
        let report = ScanReport::scan(file, 7).unwrap();
        assert_eq!(report.rows_seen, 5);
        assert_eq!(report.num_errors, 3);
        assert_eq!(report.batch.len(), 2);
    }

    #[tokio::test]
    async fn test_formula_error_cell_counted_in_completed_task() {
        let (gateway, worker, seller_id, task_id) = setup().await;

        let file = workbook_bytes(&[&[
            &offer(1.0, "Pen", 10.0, 5.0, "true"),
            &[
                Cell::Num(2.0),
                Cell::Text("Ink"),
                Cell::Formula("=1/0", "#DIV/0!"),
                Cell::Num(2.0),
                Cell::Text("true"),
            ],
            &offer(3.0, "Nib", 5.0, 50.0, "true"),
        ]]);
        let outcome = worker.run(request(task_id, seller_id, file)).await;
        assert_eq!(
            outcome,
            WorkerOutcome::Completed {
                num_errors: 1,
                outcome: ApplyOutcome {
                    num_created: 2,
                    num_updated: 0,
                    num_deleted: 0,
                },
            }
        );

        let task = gateway.get_task(task_id).await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.summary.unwrap().num_errors, 1);
        assert!(gateway.offer(seller_id, 2).is_none());
    }

    #[tokio::test]
    async fn test_partial_batch_completes_with_error_count() {
        let (gateway, worker, seller_id, task_id) = setup().await;

        let outcome = worker.run(request(task_id, seller_id, scenario_a())).await;
        assert_eq!(
            outcome,
            WorkerOutcome::Completed {
                num_errors: 1,
                outcome: ApplyOutcome {
                    num_created: 4,
                    num_updated: 0,
                    num_deleted: 0,
                },
            }
        );

        let task = gateway.get_task(task_id).await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
        let summary = task.summary.unwrap();
        assert_eq!(summary.num_errors, 1);
        assert_eq!(summary.num_created, 4);
        assert_eq!(gateway.bulk_apply_calls(), 1);
        assert_eq!(gateway.offer(seller_id, 5).unwrap().price, 1800);
    }

    #[tokio::test]
    async fn test_unreadable_container_fails_without_bulk_apply() {
        let (gateway, worker, seller_id, task_id) = setup().await;

        let file = Bytes::from_static(b"this is just a text file\n");
        let outcome = worker.run(request(task_id, seller_id, file)).await;
        assert_eq!(outcome, WorkerOutcome::Failed(FailureKind::Unreadable));

        let task = gateway.get_task(task_id).await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Error);
        assert!(task.summary.is_none());
        assert!(task.finish_time.is_some());
        assert_eq!(gateway.bulk_apply_calls(), 0);
    }

    #[tokio::test]
    async fn test_zero_rows_is_an_error() {
        let (gateway, worker, seller_id, task_id) = setup().await;

        let file = workbook_bytes(&[&[]]);
        let outcome = worker.run(request(task_id, seller_id, file)).await;
        assert_eq!(outcome, WorkerOutcome::Failed(FailureKind::EmptyBatch));

        let task = gateway.get_task(task_id).await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Error);
        assert!(task.summary.is_none());
        assert_eq!(gateway.bulk_apply_calls(), 0);
    }

    #[tokio::test]
    async fn test_all_rows_rejected_is_an_error() {
        let (gateway, worker, seller_id, task_id) = setup().await;

        let file = workbook_bytes(&[&[
            &[Cell::Text("offer_id"), Cell::Text("name"), Cell::Text("price")],
            &[Cell::Num(1.0), Cell::Blank, Cell::Num(10.0), Cell::Num(1.0), Cell::Text("true")],
            &[Cell::Num(2.0), Cell::Text("Pen"), Cell::Num(10.0), Cell::Num(0.0), Cell::Text("true")],
            &[Cell::Num(3.0), Cell::Text("Ink"), Cell::Num(10.0), Cell::Num(1.0), Cell::Text("maybe")],
        ]]);
        let outcome = worker.run(request(task_id, seller_id, file)).await;
        assert_eq!(outcome, WorkerOutcome::Failed(FailureKind::EmptyBatch));

        let task = gateway.get_task(task_id).await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Error);
        assert!(task.summary.is_none());
        assert_eq!(gateway.bulk_apply_calls(), 0);
    }

    #[tokio::test]
    async fn test_bulk_apply_failure_marks_error() {
        let (gateway, worker, seller_id, task_id) = setup().await;
        gateway.set_fail_bulk_apply(true);

        let outcome = worker.run(request(task_id, seller_id, scenario_a())).await;
        assert_eq!(outcome, WorkerOutcome::Failed(FailureKind::Persistence));

        let task = gateway.get_task(task_id).await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Error);
        assert!(task.summary.is_none());
        assert_eq!(gateway.bulk_apply_calls(), 1);
        assert_eq!(gateway.offer_count(seller_id), 0);
    }

    #[tokio::test]
    async fn test_rows_across_sheets_and_availability() {
        let (gateway, worker, seller_id, _) = setup().await;

        let first = gateway.create_task(seller_id).await.unwrap();
        let file = workbook_bytes(&[
            &[&offer(1.0, "Pen", 10.0, 5.0, "true"), &offer(2.0, "Ink", 30.0, 2.0, "true")],
            &[&offer(3.0, "Nib", 5.0, 50.0, "true")],
        ]);
        worker.run(request(first, seller_id, file)).await;
        assert_eq!(gateway.offer_count(seller_id), 3);

        let second = gateway.create_task(seller_id).await.unwrap();
        let file = workbook_bytes(&[&[
            &offer(1.0, "Pen", 12.0, 5.0, "true"),
            &[Cell::Num(2.0), Cell::Text("Ink"), Cell::Num(30.0), Cell::Num(2.0), Cell::Bool(false)],
            &offer(3.0, "Nib", 5.0, 50.0, "false"),
        ]]);
        let outcome = worker.run(request(second, seller_id, file)).await;
        assert_eq!(
            outcome,
            WorkerOutcome::Completed {
                num_errors: 0,
                outcome: ApplyOutcome {
                    num_created: 0,
                    num_updated: 1,
                    num_deleted: 2,
                },
            }
        );
        assert_eq!(gateway.offer(seller_id, 1).unwrap().price, 12);
        assert_eq!(gateway.offer_count(seller_id), 1);
    }

    #[tokio::test]
    async fn test_already_finalized_task_is_not_overwritten() {
        let (gateway, worker, seller_id, task_id) = setup().await;
        gateway.sweep_abandoned().await.unwrap();

        let outcome = worker.run(request(task_id, seller_id, scenario_a())).await;
        assert_eq!(outcome, WorkerOutcome::Failed(FailureKind::Persistence));

        let task = gateway.get_task(task_id).await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Error);
        assert_eq!(gateway.offer_count(seller_id), 0);
    }
}
