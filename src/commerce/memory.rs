//! In-memory commerce system.

use super::{Category, CategoryLookup, CommerceOrder, OrderSource};
use crate::error::{ReadModelError, Result};
use crate::types::{CategoryId, LineItem, Money, OrderId, OrderStatus, ProductId};
use chrono::NaiveDate;
use parking_lot::RwLock;
use std::collections::BTreeMap;

/// An order to be placed in an [`InMemoryCommerce`].
#[derive(Clone, Debug)]
pub struct OrderDraft {
    pub id: OrderId,
    pub status: OrderStatus,
    pub created_date: Option<NaiveDate>,
    pub completion_date: Option<NaiveDate>,
    /// (product, quantity); names and prices come from the catalog.
    pub lines: Vec<(ProductId, u32)>,
    /// Overrides the sum of line totals.
    pub total: Option<Money>,
}

impl OrderDraft {
    pub fn new(id: OrderId) -> Self {
        Self {
            id,
            status: OrderStatus::Pending,
            created_date: None,
            completion_date: None,
            lines: Vec::new(),
            total: None,
        }
    }

    pub fn status(mut self, status: OrderStatus) -> Self {
        self.status = status;
        self
    }

    pub fn created_on(mut self, date: NaiveDate) -> Self {
        self.created_date = Some(date);
        self
    }

    pub fn completed_on(mut self, date: NaiveDate) -> Self {
        self.completion_date = Some(date);
        self
    }

    pub fn line(mut self, product_id: ProductId, quantity: u32) -> Self {
        self.lines.push((product_id, quantity));
        self
    }

    pub fn total(mut self, total: Money) -> Self {
        self.total = Some(total);
        self
    }
}

#[derive(Clone, Debug)]
struct Product {
    name: String,
    price: Money,
    categories: Vec<CategoryId>,
}

#[derive(Clone, Debug)]
struct StoredOrder {
    status: OrderStatus,
    total: Money,
    created_date: Option<NaiveDate>,
    completion_date: Option<NaiveDate>,
    lines: Vec<LineItem>,
    corrupt: bool,
}

#[derive(Default)]
struct Catalog {
    products: BTreeMap<ProductId, Product>,
    categories: BTreeMap<CategoryId, String>,
    orders: BTreeMap<OrderId, StoredOrder>,
}

impl Catalog {
    fn snapshot(&self, id: OrderId, order: &StoredOrder) -> Box<dyn CommerceOrder> {
        let items = if order.corrupt {
            Err(format!("order {} line items are unreadable", id))
        } else {
            Ok(order
                .lines
                .iter()
                .filter(|line| self.products.contains_key(&line.product_id))
                .cloned()
                .collect())
        };
        Box::new(MemoryOrder {
            id,
            total: order.total,
            created_date: order.created_date,
            completion_date: order.completion_date,
            items,
        })
    }
}

/// Point-in-time copy of a stored order.
struct MemoryOrder {
    id: OrderId,
    total: Money,
    created_date: Option<NaiveDate>,
    completion_date: Option<NaiveDate>,
    items: std::result::Result<Vec<LineItem>, String>,
}

impl CommerceOrder for MemoryOrder {
    fn id(&self) -> OrderId {
        self.id
    }

    fn total(&self) -> Money {
        self.total
    }

    fn completion_date(&self) -> Option<NaiveDate> {
        self.completion_date
    }

    fn created_date(&self) -> Option<NaiveDate> {
        self.created_date
    }

    fn items(&self) -> Result<Vec<LineItem>> {
        self.items.clone().map_err(ReadModelError::Commerce)
    }
}

/// Products, categories and orders held in memory.
///
/// Order lines capture the product name at placement; renaming or deleting a
/// product afterwards behaves like a real store (old names stay on the lines,
/// lines of deleted products disappear from `items()`).
#[derive(Default)]
pub struct InMemoryCommerce {
    catalog: RwLock<Catalog>,
}

impl InMemoryCommerce {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_category(&self, name: impl Into<String>) -> CategoryId {
        let mut catalog = self.catalog.write();
        let id = CategoryId(catalog.categories.keys().next_back().map_or(1, |c| c.0 + 1));
        catalog.categories.insert(id, name.into());
        id
    }

    pub fn add_product(
        &self,
        name: impl Into<String>,
        price: Money,
        categories: &[CategoryId],
    ) -> ProductId {
        let mut catalog = self.catalog.write();
        let id = ProductId(catalog.products.keys().next_back().map_or(1, |p| p.0 + 1));
        catalog.products.insert(
            id,
            Product {
                name: name.into(),
                price,
                categories: categories.to_vec(),
            },
        );
        id
    }

    pub fn remove_product(&self, id: ProductId) -> bool {
        self.catalog.write().products.remove(&id).is_some()
    }

    pub fn rename_product(&self, id: ProductId, name: impl Into<String>) -> Result<()> {
        let mut catalog = self.catalog.write();
        let product = catalog
            .products
            .get_mut(&id)
            .ok_or_else(|| ReadModelError::Commerce(format!("unknown product {}", id)))?;
        product.name = name.into();
        Ok(())
    }

    /// Replace a product's category membership.
    pub fn set_product_categories(&self, id: ProductId, categories: &[CategoryId]) -> Result<()> {
        let mut catalog = self.catalog.write();
        let product = catalog
            .products
            .get_mut(&id)
            .ok_or_else(|| ReadModelError::Commerce(format!("unknown product {}", id)))?;
        product.categories = categories.to_vec();
        Ok(())
    }

    /// Delete every product whose name starts with `prefix`.
    pub fn remove_products_named(&self, prefix: &str) -> usize {
        let mut catalog = self.catalog.write();
        let before = catalog.products.len();
        catalog.products.retain(|_, p| !p.name.starts_with(prefix));
        before - catalog.products.len()
    }

    /// Products whose name starts with `prefix`, ascending by id.
    pub fn products_named(&self, prefix: &str) -> Vec<(ProductId, String)> {
        self.catalog
            .read()
            .products
            .iter()
            .filter(|(_, p)| p.name.starts_with(prefix))
            .map(|(id, p)| (*id, p.name.clone()))
            .collect()
    }

    /// Place an order; line names and prices are taken from the catalog.
    pub fn insert_order(&self, draft: OrderDraft) -> Result<()> {
        let mut catalog = self.catalog.write();
        if catalog.orders.contains_key(&draft.id) {
            return Err(ReadModelError::Commerce(format!(
                "order {} already exists",
                draft.id
            )));
        }

        let mut lines = Vec::with_capacity(draft.lines.len());
        for (product_id, quantity) in &draft.lines {
            let product = catalog.products.get(product_id).ok_or_else(|| {
                ReadModelError::Commerce(format!("unknown product {}", product_id))
            })?;
            lines.push(LineItem::new(
                *product_id,
                product.name.clone(),
                *quantity,
                Money::from_cents(product.price.cents() * i64::from(*quantity)),
            ));
        }

        let total = draft
            .total
            .unwrap_or_else(|| lines.iter().map(|l| l.line_total).sum());
        catalog.orders.insert(
            draft.id,
            StoredOrder {
                status: draft.status,
                total,
                created_date: draft.created_date,
                completion_date: draft.completion_date,
                lines,
                corrupt: false,
            },
        );
        Ok(())
    }

    /// Change an order's status, returning the previous one.
    pub fn set_status(&self, id: OrderId, status: OrderStatus) -> Result<OrderStatus> {
        let mut catalog = self.catalog.write();
        let order = catalog
            .orders
            .get_mut(&id)
            .ok_or_else(|| ReadModelError::Commerce(format!("unknown order {}", id)))?;
        Ok(std::mem::replace(&mut order.status, status))
    }

    pub fn status_of(&self, id: OrderId) -> Option<OrderStatus> {
        self.catalog.read().orders.get(&id).map(|o| o.status.clone())
    }

    /// Make `items()` fail for this order from now on.
    pub fn corrupt_order(&self, id: OrderId) -> bool {
        match self.catalog.write().orders.get_mut(&id) {
            Some(order) => {
                order.corrupt = true;
                true
            }
            None => false,
        }
    }

    pub fn remove_order(&self, id: OrderId) -> bool {
        self.catalog.write().orders.remove(&id).is_some()
    }

    /// Delete every order with id `>= floor`.
    pub fn remove_orders_from(&self, floor: OrderId) -> usize {
        let mut catalog = self.catalog.write();
        let removed = catalog.orders.split_off(&floor);
        removed.len()
    }

    /// Smallest unused order id that is `>= floor` and above every existing id
    /// in that region.
    pub fn next_order_id(&self, floor: OrderId) -> OrderId {
        let catalog = self.catalog.read();
        catalog
            .orders
            .range(floor..)
            .next_back()
            .map_or(floor, |(id, _)| OrderId(id.0 + 1))
    }

    pub fn order_count(&self) -> usize {
        self.catalog.read().orders.len()
    }
}

impl OrderSource for InMemoryCommerce {
    fn get_order(&self, id: OrderId) -> Result<Option<Box<dyn CommerceOrder>>> {
        let catalog = self.catalog.read();
        Ok(catalog.orders.get(&id).map(|order| catalog.snapshot(id, order)))
    }

    fn list_orders(
        &self,
        statuses: &[OrderStatus],
        offset: u64,
        limit: usize,
    ) -> Result<Vec<Box<dyn CommerceOrder>>> {
        let catalog = self.catalog.read();
        Ok(catalog
            .orders
            .iter()
            .filter(|(_, order)| statuses.contains(&order.status))
            .skip(usize::try_from(offset).unwrap_or(usize::MAX))
            .take(limit)
            .map(|(id, order)| catalog.snapshot(*id, order))
            .collect())
    }

    fn count_orders(&self, statuses: &[OrderStatus]) -> Result<u64> {
        let catalog = self.catalog.read();
        Ok(catalog
            .orders
            .values()
            .filter(|order| statuses.contains(&order.status))
            .count() as u64)
    }
}

impl CategoryLookup for InMemoryCommerce {
    fn categories_for(&self, product_id: ProductId) -> Vec<Category> {
        let catalog = self.catalog.read();
        let Some(product) = catalog.products.get(&product_id) else {
            return Vec::new();
        };
        product
            .categories
            .iter()
            .filter_map(|id| {
                catalog.categories.get(id).map(|name| Category {
                    id: *id,
                    name: name.clone(),
                })
            })
            .collect()
    }
}
