//! Dashboard result types.
//!
//! Field names follow the dashboard's JSON payload; amounts serialize as
//! decimal numbers.

use crate::error::{ReadModelError, Result};
use crate::types::{as_decimal, CategoryId, Money, ProductId};
use chrono::{Duration, NaiveDate};
use serde::Serialize;

/// Inclusive date range. A range with `start > end` selects nothing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// `[today - days, today]`. Fails when the start falls outside the
    /// calendar `NaiveDate` can represent.
    pub fn last_days(today: NaiveDate, days: i64) -> Result<Self> {
        let start = Duration::try_days(days)
            .and_then(|span| today.checked_sub_signed(span))
            .ok_or_else(|| ReadModelError::Validation("Invalid days".into()))?;
        Ok(Self { start, end: today })
    }

    /// Parse two `YYYY-MM-DD` dates; start must not be after end.
    pub fn parse(start: &str, end: &str) -> Result<Self> {
        let (Some(start), Some(end)) = (parse_date(start), parse_date(end)) else {
            return Err(ReadModelError::Validation("Invalid date format".into()));
        };
        if start > end {
            return Err(ReadModelError::Validation(
                "Start date must not be after end date".into(),
            ));
        }
        Ok(Self { start, end })
    }

    pub fn is_empty(&self) -> bool {
        self.start > self.end
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

/// Exactly four digits, dash, two digits, dash, two digits, and a real date.
fn parse_date(raw: &str) -> Option<NaiveDate> {
    let bytes = raw.as_bytes();
    let shaped = bytes.len() == 10
        && bytes.iter().enumerate().all(|(i, b)| match i {
            4 | 7 => *b == b'-',
            _ => b.is_ascii_digit(),
        });
    if !shaped {
        return None;
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Kpis {
    #[serde(serialize_with = "as_decimal")]
    pub revenue: Money,
    pub orders: u64,
    /// Average order value, rounded to cents.
    #[serde(serialize_with = "as_decimal")]
    pub aov: Money,
    #[serde(serialize_with = "as_decimal")]
    pub max_order: Money,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DailySales {
    pub report_date: NaiveDate,
    #[serde(serialize_with = "as_decimal")]
    pub total_sales: Money,
}

/// Sales per day of week; `weekday` is 1 (Sunday) to 7 (Saturday).
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct WeekdaySales {
    pub weekday: u32,
    #[serde(serialize_with = "as_decimal")]
    pub total_sales: Money,
    pub order_count: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ExtremeDays {
    pub best_day: Option<NaiveDate>,
    #[serde(serialize_with = "as_decimal")]
    pub best_total: Money,
    pub worst_day: Option<NaiveDate>,
    #[serde(serialize_with = "as_decimal")]
    pub worst_total: Money,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ProductRank {
    pub product_id: ProductId,
    pub product_name: String,
    pub total_sold: u64,
    #[serde(serialize_with = "as_decimal")]
    pub total_revenue: Money,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CategoryRank {
    pub category_id: CategoryId,
    pub category_name: String,
    #[serde(serialize_with = "as_decimal")]
    pub total_revenue: Money,
    pub total_sold: u64,
}

/// Everything the dashboard shows for one range.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Dashboard {
    pub kpis: Kpis,
    pub chart: Vec<DailySales>,
    pub leaderboard: Vec<ProductRank>,
    pub weekday_sales: Vec<WeekdaySales>,
    pub extreme_days: ExtremeDays,
    pub bottom_products: Vec<ProductRank>,
    pub top_categories: Vec<CategoryRank>,
    pub period: DateRange,
}
