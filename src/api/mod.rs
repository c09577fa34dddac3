//! The externally callable operations.
//!
//! Each operation checks the anti-forgery token and the caller's permission
//! first, validates its input next, and only then touches storage. Failures
//! come back as `{"success": false, "data": {"message": ...}}`; an auth
//! failure always reads "Unauthorized" whichever check failed.

mod auth;
mod response;

pub use auth::{ApiAction, Capability, Gatekeeper, RequestContext, StaticGatekeeper};
pub use response::ApiResponse;

use crate::config::Limits;
use crate::error::{ReadModelError, Result};
use crate::migration::MigrationCoordinator;
use crate::query::{DateRange, QueryEngine};
use crate::seed::Seeder;
use crate::types::Clock;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

/// Dashboard request. Both dates win over `days`.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct DashboardRequest {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub days: Option<i64>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct SeedRequest {
    pub batch_size: Option<i64>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct MigrateRequest {
    pub offset: Option<i64>,
    pub batch_size: Option<i64>,
}

/// Dashboard, seeding and backfill behind one authorization layer.
pub struct AnalyticsApi {
    gatekeeper: Arc<dyn Gatekeeper>,
    queries: Arc<QueryEngine>,
    seeder: Arc<Seeder>,
    migration: Arc<MigrationCoordinator>,
    clock: Arc<dyn Clock>,
    limits: Limits,
}

impl AnalyticsApi {
    pub fn new(
        gatekeeper: Arc<dyn Gatekeeper>,
        queries: Arc<QueryEngine>,
        seeder: Arc<Seeder>,
        migration: Arc<MigrationCoordinator>,
        clock: Arc<dyn Clock>,
        limits: Limits,
    ) -> Self {
        Self {
            gatekeeper,
            queries,
            seeder,
            migration,
            clock,
            limits,
        }
    }

    /// KPIs, chart, leaderboards and rollups for a date range.
    pub fn get_dashboard_data(&self, ctx: &RequestContext, req: &DashboardRequest) -> ApiResponse {
        self.handle(ctx, ApiAction::ViewDashboard, "Failed to fetch dashboard data", || {
            let range = self.dashboard_range(req)?;
            Ok(serde_json::to_value(self.queries.dashboard(range))?)
        })
    }

    /// Generate demo orders through the normal write path.
    pub fn seed_batch(&self, ctx: &RequestContext, req: &SeedRequest) -> ApiResponse {
        self.handle(ctx, ApiAction::SeedData, "Failed to generate orders", || {
            let max = self.limits.seed_batch_max;
            let batch_size = bounded_batch(req.batch_size, self.limits.default_batch_size, max)?;
            let report = self.seeder.seed_batch(batch_size)?;
            Ok(json!({
                "count": report.count,
                "message": format!("Batch of {} orders completed.", report.count),
            }))
        })
    }

    /// Run one backfill batch.
    pub fn migrate_batch(&self, ctx: &RequestContext, req: &MigrateRequest) -> ApiResponse {
        self.handle(ctx, ApiAction::MigrateOrders, "Migration failed", || {
            let max = self.limits.migrate_batch_max;
            let batch_size = bounded_batch(req.batch_size, self.limits.default_batch_size, max)?;
            let offset = match req.offset {
                None => 0,
                Some(offset) => u64::try_from(offset).map_err(|_| {
                    ReadModelError::Validation("Offset must not be negative".into())
                })?,
            };
            let report = self.migration.migrate_batch(offset, batch_size)?;
            Ok(serde_json::to_value(report)?)
        })
    }

    fn dashboard_range(&self, req: &DashboardRequest) -> Result<DateRange> {
        match (&req.start_date, &req.end_date) {
            (Some(start), Some(end)) => DateRange::parse(start, end),
            _ => {
                let days = req.days.unwrap_or(self.limits.default_days);
                if days < 0 {
                    return Err(ReadModelError::Validation(
                        "Days must not be negative".into(),
                    ));
                }
                DateRange::last_days(self.clock.today(), days)
            }
        }
    }

    fn handle(
        &self,
        ctx: &RequestContext,
        action: ApiAction,
        failure_message: &str,
        op: impl FnOnce() -> Result<Value>,
    ) -> ApiResponse {
        let token_ok = self.gatekeeper.verify_token(ctx, action);
        let authorized = token_ok && self.gatekeeper.authorize(ctx, action.capability());
        if !authorized {
            tracing::warn!(
                action = action.as_str(),
                user = ctx.user.as_deref().unwrap_or("-"),
                "unauthorized request"
            );
            return ApiResponse::failure(ReadModelError::Unauthorized.to_string());
        }

        match op() {
            Ok(data) => ApiResponse::success(data),
            Err(e) if e.is_validation() => {
                tracing::debug!(action = action.as_str(), error = %e, "rejected request");
                ApiResponse::failure(e.to_string())
            }
            Err(e) => {
                tracing::error!(action = action.as_str(), error = %e, "request failed");
                ApiResponse::failure(failure_message)
            }
        }
    }
}

/// Missing means `default`; anything outside `[1, max]` is rejected.
fn bounded_batch(requested: Option<i64>, default: usize, max: usize) -> Result<usize> {
    let Some(requested) = requested else {
        return Ok(default.min(max));
    };
    match usize::try_from(requested) {
        Ok(size) if (1..=max).contains(&size) => Ok(size),
        _ => Err(ReadModelError::Validation(format!(
            "Batch size must be between 1 and {}",
            max
        ))),
    }
}
