//! Persistent backfill progress.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Backfill lifecycle.
///
/// `NotNeeded` and `Completed` are terminal. `Error` is never entered by the
/// coordinator; per-order failures are accumulated while the run continues.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationStatus {
    NotNeeded,
    Pending,
    InProgress,
    Completed,
    Error,
}

impl MigrationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            MigrationStatus::NotNeeded => "not_needed",
            MigrationStatus::Pending => "pending",
            MigrationStatus::InProgress => "in_progress",
            MigrationStatus::Completed => "completed",
            MigrationStatus::Error => "error",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, MigrationStatus::NotNeeded | MigrationStatus::Completed)
    }
}

impl fmt::Display for MigrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The singleton migration record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationState {
    pub status: MigrationStatus,
    /// Eligible orders counted at detection; fixed afterwards.
    pub total_orders: u64,
    /// Never decreases, never exceeds `total_orders`.
    pub migrated_count: u64,
    /// Every per-order failure, including those dropped from `errors`.
    pub error_count: u64,
    /// `"Order #<id>: <reason>"`, oldest first, bounded.
    pub errors: Vec<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Default for MigrationState {
    fn default() -> Self {
        Self {
            status: MigrationStatus::NotNeeded,
            total_orders: 0,
            migrated_count: 0,
            error_count: 0,
            errors: Vec::new(),
            started_at: None,
            completed_at: None,
        }
    }
}

impl MigrationState {
    /// State recorded at detection time.
    pub fn detected(total_orders: u64) -> Self {
        let status = if total_orders == 0 {
            MigrationStatus::NotNeeded
        } else {
            MigrationStatus::Pending
        };
        Self {
            status,
            total_orders,
            ..Self::default()
        }
    }

    /// Fraction of eligible orders processed, 1.0 when there is nothing to do.
    pub fn progress(&self) -> f64 {
        if self.total_orders == 0 {
            return 1.0;
        }
        self.migrated_count as f64 / self.total_orders as f64
    }
}
