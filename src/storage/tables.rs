//! In-memory tables rebuilt from the journal.

use crate::journal::JournalOp;
use crate::types::{ItemRowId, LineItem, OrderId, OrderLineItem, OrderSummary};
use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet, HashMap};

const FIRST_ROW: ItemRowId = ItemRowId(1);

/// Summary and line item tables with their secondary indexes.
pub(crate) struct Tables {
    summaries: HashMap<OrderId, OrderSummary>,
    summaries_by_date: BTreeSet<(NaiveDate, OrderId)>,
    items: BTreeMap<ItemRowId, OrderLineItem>,
    items_by_order: HashMap<OrderId, Vec<ItemRowId>>,
    items_by_date: BTreeSet<(NaiveDate, ItemRowId)>,
    next_row: ItemRowId,
}

impl Default for Tables {
    fn default() -> Self {
        Self {
            summaries: HashMap::new(),
            summaries_by_date: BTreeSet::new(),
            items: BTreeMap::new(),
            items_by_order: HashMap::new(),
            items_by_date: BTreeSet::new(),
            next_row: FIRST_ROW,
        }
    }
}

impl Tables {
    /// Apply one journaled mutation, returning the number of rows touched.
    pub fn apply(&mut self, op: &JournalOp) -> usize {
        match op {
            JournalOp::UpsertSummary(summary) => {
                self.put_summary(summary.clone());
                1
            }
            JournalOp::InsertSummaries(rows) => {
                let mut inserted = 0;
                for row in rows {
                    if !self.summaries.contains_key(&row.order_id) {
                        self.put_summary(row.clone());
                        inserted += 1;
                    }
                }
                inserted
            }
            JournalOp::ReplaceItems {
                order_id,
                report_date,
                first_row,
                items,
            } => {
                self.remove_items(*order_id);
                self.insert_items(*order_id, *report_date, *first_row, items);
                items.len()
            }
            JournalOp::DeleteSummary(order_id) => usize::from(self.remove_summary(*order_id)),
            JournalOp::DeleteItems(order_id) => self.remove_items(*order_id),
            JournalOp::PurgeFrom(min_id) => {
                let doomed: BTreeSet<OrderId> = self
                    .summaries
                    .keys()
                    .chain(self.items_by_order.keys())
                    .filter(|id| *id >= min_id)
                    .copied()
                    .collect();
                doomed
                    .into_iter()
                    .map(|id| usize::from(self.remove_summary(id)) + self.remove_items(id))
                    .sum()
            }
        }
    }

    /// Row id the next item replacement should start at.
    pub fn next_row(&self) -> ItemRowId {
        self.next_row
    }

    pub fn contains_summary(&self, order_id: OrderId) -> bool {
        self.summaries.contains_key(&order_id)
    }

    pub fn summary(&self, order_id: OrderId) -> Option<OrderSummary> {
        self.summaries.get(&order_id).cloned()
    }

    pub fn summary_count(&self) -> usize {
        self.summaries.len()
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    pub fn item_count_for(&self, order_id: OrderId) -> usize {
        self.items_by_order.get(&order_id).map_or(0, Vec::len)
    }

    /// Whether any row of either table belongs to an order `>= min_id`.
    pub fn any_order_from(&self, min_id: OrderId) -> bool {
        self.summaries.keys().any(|id| *id >= min_id)
            || self.items_by_order.keys().any(|id| *id >= min_id)
    }

    pub fn items_for_order(&self, order_id: OrderId) -> Vec<OrderLineItem> {
        self.items_by_order
            .get(&order_id)
            .map(|rows| {
                rows.iter()
                    .filter_map(|row| self.items.get(row).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn summaries_between(&self, start: NaiveDate, end: NaiveDate) -> Vec<OrderSummary> {
        // BTreeSet::range panics on an inverted range
        if start > end {
            return Vec::new();
        }
        self.summaries_by_date
            .range((start, OrderId(0))..=(end, OrderId(u64::MAX)))
            .filter_map(|(_, id)| self.summaries.get(id).cloned())
            .collect()
    }

    pub fn items_between(&self, start: NaiveDate, end: NaiveDate) -> Vec<OrderLineItem> {
        if start > end {
            return Vec::new();
        }
        self.items_by_date
            .range((start, ItemRowId(0))..=(end, ItemRowId(u64::MAX)))
            .filter_map(|(_, row)| self.items.get(row).cloned())
            .collect()
    }

    pub fn order_ids(&self) -> Vec<OrderId> {
        let mut ids: Vec<OrderId> = self.summaries.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn has_items(&self, order_id: OrderId) -> bool {
        self.items_by_order.contains_key(&order_id)
    }

    /// Minimal list of operations that rebuilds the current tables.
    ///
    /// Item rows keep their ids: every order's rows were allocated as one
    /// consecutive run, so each order becomes one `ReplaceItems`.
    pub fn snapshot_ops(&self) -> Vec<JournalOp> {
        let mut ops = Vec::new();

        let mut summaries: Vec<OrderSummary> = self.summaries.values().cloned().collect();
        summaries.sort_unstable_by_key(|s| s.order_id);
        if !summaries.is_empty() {
            ops.push(JournalOp::InsertSummaries(summaries));
        }

        let mut orders: Vec<(&OrderId, &Vec<ItemRowId>)> = self.items_by_order.iter().collect();
        orders.sort_unstable_by_key(|(id, _)| **id);
        for (order_id, rows) in orders {
            let lines: Vec<&OrderLineItem> =
                rows.iter().filter_map(|row| self.items.get(row)).collect();
            let (Some(first), Some(report_date)) =
                (rows.first(), lines.first().map(|l| l.report_date))
            else {
                continue;
            };
            ops.push(JournalOp::ReplaceItems {
                order_id: *order_id,
                report_date,
                first_row: *first,
                items: lines
                    .iter()
                    .map(|l| {
                        LineItem::new(l.product_id, l.product_name.clone(), l.quantity, l.line_total)
                    })
                    .collect(),
            });
        }

        ops
    }

    fn put_summary(&mut self, summary: OrderSummary) {
        if let Some(previous) = self.summaries.get(&summary.order_id) {
            self.summaries_by_date
                .remove(&(previous.report_date, previous.order_id));
        }
        self.summaries_by_date
            .insert((summary.report_date, summary.order_id));
        self.summaries.insert(summary.order_id, summary);
    }

    fn remove_summary(&mut self, order_id: OrderId) -> bool {
        match self.summaries.remove(&order_id) {
            Some(previous) => {
                self.summaries_by_date
                    .remove(&(previous.report_date, order_id));
                true
            }
            None => false,
        }
    }

    fn insert_items(
        &mut self,
        order_id: OrderId,
        report_date: NaiveDate,
        first_row: ItemRowId,
        items: &[LineItem],
    ) {
        if items.is_empty() {
            return;
        }

        let mut row = first_row;
        let mut rows = Vec::with_capacity(items.len());
        for item in items {
            self.items.insert(
                row,
                OrderLineItem {
                    id: row,
                    order_id,
                    product_id: item.product_id,
                    product_name: item.product_name.clone(),
                    quantity: item.quantity,
                    line_total: item.line_total,
                    report_date,
                },
            );
            self.items_by_date.insert((report_date, row));
            rows.push(row);
            row = row.next();
        }

        if row > self.next_row {
            self.next_row = row;
        }
        self.items_by_order.insert(order_id, rows);
    }

    fn remove_items(&mut self, order_id: OrderId) -> usize {
        let Some(rows) = self.items_by_order.remove(&order_id) else {
            return 0;
        };
        for row in &rows {
            if let Some(item) = self.items.remove(row) {
                self.items_by_date.remove(&(item.report_date, *row));
            }
        }
        rows.len()
    }
}
