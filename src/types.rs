//! Core types for the read model.

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign};

/// External order identifier, owned by the commerce system.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OrderId(pub u64);

impl fmt::Debug for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OrderId({})", self.0)
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// External product identifier.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProductId(pub u64);

impl fmt::Debug for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ProductId({})", self.0)
    }
}

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Category identifier in the commerce taxonomy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CategoryId(pub u64);

/// Surrogate id of a line item row (assigned by the store).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ItemRowId(pub u64);

impl ItemRowId {
    pub fn next(self) -> Self {
        ItemRowId(self.0 + 1)
    }
}

/// Fixed-point amount in minor units (two decimals).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Whole currency units, e.g. `Money::from_units(100)` is `100.00`.
    pub const fn from_units(units: i64) -> Self {
        Money(units * 100)
    }

    pub const fn cents(self) -> i64 {
        self.0
    }

    pub fn is_negative(self) -> bool {
        self.0 < 0
    }

    pub fn as_f64(self) -> f64 {
        self.0 as f64 / 100.0
    }

    /// Arithmetic mean of `count` amounts summing to `total`, rounded half away
    /// from zero to the nearest cent. Zero when `count` is zero.
    pub fn mean(total: Money, count: u64) -> Money {
        if count == 0 {
            return Money::ZERO;
        }
        let count = count as i128;
        let total = total.0 as i128;
        let rounded = if total >= 0 {
            (2 * total + count) / (2 * count)
        } else {
            -((-2 * total + count) / (2 * count))
        };
        Money(rounded as i64)
    }
}

impl fmt::Debug for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Money({})", self)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{}{}.{:02}", sign, abs / 100, abs % 100)
    }
}

impl Add for Money {
    type Output = Money;

    fn add(self, rhs: Money) -> Money {
        Money(self.0 + rhs.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Money) {
        self.0 += rhs.0;
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money {
        iter.fold(Money::ZERO, Add::add)
    }
}

/// Serialize an amount as a JSON decimal number (`150.0`) for API payloads.
pub fn as_decimal<S: Serializer>(money: &Money, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(money.as_f64())
}

/// Order status as reported by the commerce system.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum OrderStatus {
    Pending,
    Processing,
    OnHold,
    Completed,
    Cancelled,
    Refunded,
    Failed,
    Trashed,
    Other(String),
}

impl OrderStatus {
    /// Parse a wire status; accepts an optional `wc-` prefix and both
    /// `trash` and `trashed`.
    pub fn parse(raw: &str) -> Self {
        let lowered = raw.trim().to_ascii_lowercase();
        let name = lowered.strip_prefix("wc-").unwrap_or(&lowered);
        match name {
            "pending" => OrderStatus::Pending,
            "processing" => OrderStatus::Processing,
            "on-hold" => OrderStatus::OnHold,
            "completed" => OrderStatus::Completed,
            "cancelled" => OrderStatus::Cancelled,
            "refunded" => OrderStatus::Refunded,
            "failed" => OrderStatus::Failed,
            "trash" | "trashed" => OrderStatus::Trashed,
            other => OrderStatus::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Processing => "processing",
            OrderStatus::OnHold => "on-hold",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Refunded => "refunded",
            OrderStatus::Failed => "failed",
            OrderStatus::Trashed => "trash",
            OrderStatus::Other(name) => name,
        }
    }

    /// Paid states that belong in the read model.
    pub fn is_eligible(&self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Processing)
    }

    /// Terminal non-paid states whose rows must be removed.
    pub fn is_terminal_unpaid(&self) -> bool {
        matches!(
            self,
            OrderStatus::Cancelled
                | OrderStatus::Refunded
                | OrderStatus::Failed
                | OrderStatus::Trashed
        )
    }

    /// The statuses counted and paged by the backfill.
    pub fn eligible() -> [OrderStatus; 2] {
        [OrderStatus::Completed, OrderStatus::Processing]
    }
}

impl From<&str> for OrderStatus {
    fn from(raw: &str) -> Self {
        OrderStatus::parse(raw)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the order summary table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSummary {
    pub order_id: OrderId,
    pub total: Money,
    pub report_date: NaiveDate,
}

impl OrderSummary {
    pub fn new(order_id: OrderId, total: Money, report_date: NaiveDate) -> Self {
        Self {
            order_id,
            total,
            report_date,
        }
    }
}

/// A line item as extracted from an order (before row id and date are assigned).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub product_id: ProductId,
    /// Name captured from the order line; never refreshed from the catalog.
    pub product_name: String,
    pub quantity: u32,
    pub line_total: Money,
}

impl LineItem {
    pub fn new(
        product_id: ProductId,
        product_name: impl Into<String>,
        quantity: u32,
        line_total: Money,
    ) -> Self {
        Self {
            product_id,
            product_name: product_name.into(),
            quantity,
            line_total,
        }
    }
}

/// One row of the order line item table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLineItem {
    pub id: ItemRowId,
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub product_name: String,
    pub quantity: u32,
    pub line_total: Money,
    pub report_date: NaiveDate,
}

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

/// Wall clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock frozen at one instant.
#[derive(Clone, Copy, Debug)]
pub struct FixedClock(pub DateTime<Utc>);

impl FixedClock {
    /// Midnight UTC of the given date.
    pub fn on(date: NaiveDate) -> Self {
        FixedClock(Utc.from_utc_datetime(&date.and_time(NaiveTime::default())))
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_money_display() {
        assert_eq!(Money::from_cents(30000).to_string(), "300.00");
        assert_eq!(Money::from_cents(5).to_string(), "0.05");
        assert_eq!(Money::from_cents(-150).to_string(), "-1.50");
    }

    #[test]
    fn test_money_mean_rounds_half_up() {
        assert_eq!(Money::mean(Money::from_units(300), 2), Money::from_units(150));
        assert_eq!(Money::mean(Money::from_cents(100), 3), Money::from_cents(33));
        assert_eq!(Money::mean(Money::from_cents(5), 2), Money::from_cents(3));
        assert_eq!(Money::mean(Money::from_units(10), 0), Money::ZERO);
    }

    #[test]
    fn test_status_parse() {
        assert_eq!(OrderStatus::parse("wc-completed"), OrderStatus::Completed);
        assert_eq!(OrderStatus::parse("trash"), OrderStatus::Trashed);
        assert_eq!(OrderStatus::parse("trashed"), OrderStatus::Trashed);
        assert_eq!(
            OrderStatus::parse("checkout-draft"),
            OrderStatus::Other("checkout-draft".into())
        );
        assert!(OrderStatus::Processing.is_eligible());
        assert!(OrderStatus::Refunded.is_terminal_unpaid());
        assert!(!OrderStatus::OnHold.is_eligible());
        assert!(!OrderStatus::OnHold.is_terminal_unpaid());
    }

    #[test]
    fn test_fixed_clock_today() {
        let date = NaiveDate::from_ymd_opt(2026, 1, 20).unwrap();
        assert_eq!(FixedClock::on(date).today(), date);
    }
}
