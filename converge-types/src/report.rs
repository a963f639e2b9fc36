use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decl::Identity;

/// Per-resource convergence outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceStatus {
    Unchanged,
    Created,
    Updated,
    Failed,
}

impl ResourceStatus {
    pub fn label(self) -> &'static str {
        match self {
            ResourceStatus::Unchanged => "unchanged",
            ResourceStatus::Created => "created",
            ResourceStatus::Updated => "updated",
            ResourceStatus::Failed => "failed",
        }
    }

    pub fn is_failed(self) -> bool {
        matches!(self, ResourceStatus::Failed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceResult {
    pub identity: Identity,
    pub status: ResourceStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunSummary {
    pub unchanged: u64,
    pub created: u64,
    pub updated: u64,
    pub failed: u64,
    pub notifications: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunInfo {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
}

/// Outcome of one convergence run. Created fresh each run, discarded after
/// reporting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub schema: String,
    pub run: RunInfo,
    pub dry_run: bool,

    #[serde(default)]
    pub results: Vec<ResourceResult>,

    /// Notification targets fired this run (or that would fire, on dry-run),
    /// in plan order, deduplicated.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notifications: Vec<Identity>,

    pub summary: RunSummary,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl RunReport {
    pub fn new(dry_run: bool) -> Self {
        Self {
            schema: crate::schema::CONVERGE_REPORT_V1.to_string(),
            run: RunInfo {
                run_id: Uuid::new_v4(),
                started_at: Utc::now(),
                ended_at: None,
            },
            dry_run,
            results: vec![],
            notifications: vec![],
            summary: RunSummary::default(),
            errors: vec![],
        }
    }

    /// Record a per-resource outcome, keeping the summary counts in step.
    pub fn push_result(
        &mut self,
        identity: Identity,
        status: ResourceStatus,
        message: Option<String>,
    ) {
        match status {
            ResourceStatus::Unchanged => self.summary.unchanged += 1,
            ResourceStatus::Created => self.summary.created += 1,
            ResourceStatus::Updated => self.summary.updated += 1,
            ResourceStatus::Failed => self.summary.failed += 1,
        }
        self.results.push(ResourceResult {
            identity,
            status,
            message,
        });
    }

    pub fn first_failed(&self) -> Option<usize> {
        self.results.iter().position(|r| r.status.is_failed())
    }
}
