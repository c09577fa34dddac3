//! The narrow view of the commerce system the read model needs.
//!
//! The commerce system owns orders, products and categories. Everything here
//! is read-only; the in-memory adapter in [`memory`] also lets tests and the
//! demo generator create data.

pub mod memory;

pub use memory::{InMemoryCommerce, OrderDraft};

use crate::error::Result;
use crate::types::{CategoryId, LineItem, Money, OrderId, OrderStatus, ProductId};
use chrono::NaiveDate;
use serde::Serialize;

/// One order as seen through the commerce system.
pub trait CommerceOrder: Send + Sync {
    fn id(&self) -> OrderId;

    fn total(&self) -> Money;

    /// Date the order was completed, if it ever was.
    fn completion_date(&self) -> Option<NaiveDate>;

    /// Date the order was placed.
    fn created_date(&self) -> Option<NaiveDate>;

    /// Current order lines. Lines whose product no longer exists are omitted.
    fn items(&self) -> Result<Vec<LineItem>>;
}

/// Order lookups.
pub trait OrderSource: Send + Sync {
    fn get_order(&self, id: OrderId) -> Result<Option<Box<dyn CommerceOrder>>>;

    /// Orders in any of `statuses`, ascending by id, skipping `offset`.
    fn list_orders(
        &self,
        statuses: &[OrderStatus],
        offset: u64,
        limit: usize,
    ) -> Result<Vec<Box<dyn CommerceOrder>>>;

    fn count_orders(&self, statuses: &[OrderStatus]) -> Result<u64>;
}

/// A product category.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
}

/// Product to category membership.
pub trait CategoryLookup: Send + Sync {
    /// Every category the product belongs to; empty for unknown products.
    fn categories_for(&self, product_id: ProductId) -> Vec<Category>;
}

/// Everything the sync engine writes for one order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrderSnapshot {
    pub order_id: OrderId,
    pub total: Money,
    pub report_date: NaiveDate,
    pub items: Vec<LineItem>,
}

impl OrderSnapshot {
    /// Read total, date and lines from `order`. The report date is the
    /// completion date, else the creation date; `fallback_date` is used only
    /// when the order carries neither.
    pub fn extract(order: &dyn CommerceOrder, fallback_date: NaiveDate) -> Result<Self> {
        let report_date = order
            .completion_date()
            .or_else(|| order.created_date())
            .unwrap_or(fallback_date);
        Ok(Self {
            order_id: order.id(),
            total: order.total(),
            report_date,
            items: order.items()?,
        })
    }
}
