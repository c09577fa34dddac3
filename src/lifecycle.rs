//! Order status notifications to read model writes.

use crate::commerce::OrderSource;
use crate::sync::SyncEngine;
use crate::types::{Clock, OrderId, OrderStatus};
use std::sync::Arc;

/// What a status transition means for the read model.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RouteDecision {
    Sync,
    Remove,
    Ignore,
}

/// Only the new status matters; the previous one is accepted for logging.
pub fn decide(_from: Option<&OrderStatus>, to: &OrderStatus) -> RouteDecision {
    if to.is_eligible() {
        RouteDecision::Sync
    } else if to.is_terminal_unpaid() {
        RouteDecision::Remove
    } else {
        RouteDecision::Ignore
    }
}

/// What happened to one notification.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RouteOutcome {
    Synced { items: usize },
    Removed,
    Ignored,
    /// The order no longer exists in the commerce system.
    NotFound,
    /// The write failed; the message has already been logged.
    Failed(String),
}

/// Routes order events to the sync engine. Never returns errors to the
/// event source.
pub struct LifecycleRouter {
    engine: Arc<SyncEngine>,
    orders: Arc<dyn OrderSource>,
    clock: Arc<dyn Clock>,
}

impl LifecycleRouter {
    pub fn new(engine: Arc<SyncEngine>, orders: Arc<dyn OrderSource>, clock: Arc<dyn Clock>) -> Self {
        Self {
            engine,
            orders,
            clock,
        }
    }

    /// Handle an order status change.
    pub fn on_status_changed(
        &self,
        order_id: OrderId,
        from: &OrderStatus,
        to: &OrderStatus,
    ) -> RouteOutcome {
        tracing::debug!(order_id = %order_id, from = %from, to = %to, "order status changed");

        match decide(Some(from), to) {
            RouteDecision::Sync => self.sync(order_id),
            RouteDecision::Remove => self.remove(order_id),
            RouteDecision::Ignore => RouteOutcome::Ignored,
        }
    }

    /// Handle an "order completed" notification.
    pub fn on_order_completed(&self, order_id: OrderId) -> RouteOutcome {
        self.sync(order_id)
    }

    fn sync(&self, order_id: OrderId) -> RouteOutcome {
        let order = match self.orders.get_order(order_id) {
            Ok(Some(order)) => order,
            Ok(None) => {
                tracing::warn!(order_id = %order_id, "order not found, skipping sync");
                return RouteOutcome::NotFound;
            }
            Err(e) => {
                tracing::error!(order_id = %order_id, error = %e, "failed to load order");
                return RouteOutcome::Failed(e.to_string());
            }
        };

        match self.engine.sync_order(order.as_ref(), self.clock.today()) {
            Ok(report) => RouteOutcome::Synced {
                items: report.items_written,
            },
            Err(e) => {
                tracing::error!(order_id = %order_id, error = %e, "failed to sync order");
                RouteOutcome::Failed(e.to_string())
            }
        }
    }

    fn remove(&self, order_id: OrderId) -> RouteOutcome {
        match self.engine.delete(order_id) {
            Ok(_) => RouteOutcome::Removed,
            Err(e) => {
                tracing::error!(order_id = %order_id, error = %e, "failed to delete order");
                RouteOutcome::Failed(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decide() {
        use OrderStatus::*;

        assert_eq!(decide(None, &Completed), RouteDecision::Sync);
        assert_eq!(decide(Some(&Pending), &Processing), RouteDecision::Sync);
        assert_eq!(decide(Some(&Completed), &Refunded), RouteDecision::Remove);
        assert_eq!(decide(Some(&Processing), &Trashed), RouteDecision::Remove);
        assert_eq!(decide(Some(&Completed), &Failed), RouteDecision::Remove);
        assert_eq!(decide(Some(&Pending), &Cancelled), RouteDecision::Remove);
        assert_eq!(decide(Some(&Processing), &OnHold), RouteDecision::Ignore);
        assert_eq!(
            decide(Some(&Pending), &Other("checkout-draft".into())),
            RouteDecision::Ignore
        );
    }
}
