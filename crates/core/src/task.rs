//! Ingestion task model and its status state machine.
//!
//! A task starts `Running` and ends in exactly one terminal status.
//! The summary counters only exist once a task is `Completed`; for
//! `Running` and `Error` tasks they serialize as `null`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::OffersError;
use crate::offer::{ApplyOutcome, Seller};

/// Task identifier, assigned by the store's sequence.
pub type TaskId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Running,
    Completed,
    Error,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskStatus::Running)
    }

    /// Only `Running -> Completed` and `Running -> Error` are legal.
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (TaskStatus::Running, TaskStatus::Completed) | (TaskStatus::Running, TaskStatus::Error)
        )
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = OffersError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(TaskStatus::Running),
            "completed" => Ok(TaskStatus::Completed),
            "error" => Ok(TaskStatus::Error),
            other => Err(OffersError::InvalidStatus(other.to_string())),
        }
    }
}

/// Counters recorded when a task completes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSummary {
    pub num_errors: u64,
    pub num_created: u64,
    pub num_updated: u64,
    pub num_deleted: u64,
}

impl TaskSummary {
    pub fn new(num_errors: u64, outcome: ApplyOutcome) -> Self {
        Self {
            num_errors,
            num_created: outcome.num_created,
            num_updated: outcome.num_updated,
            num_deleted: outcome.num_deleted,
        }
    }
}

/// One ingestion attempt as seen by readers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub task_id: TaskId,
    pub seller: Seller,
    pub start_time: DateTime<Utc>,
    pub finish_time: Option<DateTime<Utc>>,
    pub status: TaskStatus,
    #[serde(flatten, with = "summary_fields")]
    pub summary: Option<TaskSummary>,
}

/// Flattens an optional summary into four nullable counter fields.
mod summary_fields {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use super::TaskSummary;

    #[derive(Serialize, Deserialize)]
    struct Fields {
        num_errors: Option<u64>,
        num_created: Option<u64>,
        num_updated: Option<u64>,
        num_deleted: Option<u64>,
    }

    pub fn serialize<S: Serializer>(
        summary: &Option<TaskSummary>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let fields = match summary {
            Some(s) => Fields {
                num_errors: Some(s.num_errors),
                num_created: Some(s.num_created),
                num_updated: Some(s.num_updated),
                num_deleted: Some(s.num_deleted),
            },
            None => Fields {
                num_errors: None,
                num_created: None,
                num_updated: None,
                num_deleted: None,
            },
        };
        fields.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<TaskSummary>, D::Error> {
        let fields = Fields::deserialize(deserializer)?;
        Ok(match fields {
            Fields {
                num_errors: Some(num_errors),
                num_created: Some(num_created),
                num_updated: Some(num_updated),
                num_deleted: Some(num_deleted),
            } => Some(TaskSummary {
                num_errors,
                num_created,
                num_updated,
                num_deleted,
            }),
            _ => None,
        })
    }
}
