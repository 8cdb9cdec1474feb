//! Spending aggregation: calendar bucketing of expenses and the derived
//! monthly balance.
//!
//! Buckets are keyed on the UTC calendar components (year, month, day) of each
//! expense's stored timestamp. Totals are exact decimal sums.

use bigdecimal::{BigDecimal, Zero};
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

use crate::error::AppError;
use crate::models::{Expense, serialize_amount};

static MONTH_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{4}-\d{2}$").expect("month pattern is valid"));

/// A calendar month, ordered by year then month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MonthKey {
    pub year: i32,
    pub month: u32,
}

impl MonthKey {
    pub fn of(date: &DateTime<Utc>) -> Self {
        MonthKey {
            year: date.year(),
            month: date.month(),
        }
    }

    /// Parses `YYYY-MM`. Anything that does not match the pattern, or names a
    /// month outside 01-12, is a validation error.
    pub fn parse(value: &str) -> Result<Self, AppError> {
        if !MONTH_PATTERN.is_match(value) {
            return Err(AppError::validation(format!("month must be formatted as YYYY-MM, got '{}'", value)));
        }

        let (year, month) = value
            .split_once('-')
            .ok_or_else(|| AppError::validation("month must be formatted as YYYY-MM"))?;
        let year: i32 = year.parse().map_err(|_| AppError::validation("invalid year"))?;
        let month: u32 = month.parse().map_err(|_| AppError::validation("invalid month"))?;

        if !(1..=12).contains(&month) {
            return Err(AppError::validation(format!("month must be between 01 and 12, got '{}'", value)));
        }

        Ok(MonthKey { year, month })
    }

    pub fn contains(&self, date: &DateTime<Utc>) -> bool {
        MonthKey::of(date) == *self
    }

    /// Half-open UTC range `[first instant of the month, first instant of the next month)`.
    pub fn bounds(&self) -> Result<(DateTime<Utc>, DateTime<Utc>), AppError> {
        let (next_year, next_month) = if self.month == 12 {
            (self.year + 1, 1)
        } else {
            (self.year, self.month + 1)
        };

        let start = first_instant(self.year, self.month)?;
        let end = first_instant(next_year, next_month)?;
        Ok((start, end))
    }
}

fn first_instant(year: i32, month: u32) -> Result<DateTime<Utc>, AppError> {
    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| AppError::validation(format!("month {:04}-{:02} is out of range", year, month)))
}

impl fmt::Display for MonthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyBucket {
    pub label: String,
    #[serde(serialize_with = "serialize_amount")]
    pub total: BigDecimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyBucket {
    pub day: u32,
    #[serde(serialize_with = "serialize_amount")]
    pub total: BigDecimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailySummary {
    pub month: String,
    pub days: Vec<DailyBucket>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BalanceStatus {
    NonNegative,
    Negative,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Balance {
    pub month: String,
    #[serde(serialize_with = "serialize_amount")]
    pub income: BigDecimal,
    #[serde(serialize_with = "serialize_amount")]
    pub spent: BigDecimal,
    #[serde(serialize_with = "serialize_amount")]
    pub available: BigDecimal,
    pub status: BalanceStatus,
}

/// Groups expenses by calendar month and sums each group, oldest month first.
pub fn group_by_month<'a>(expenses: impl IntoIterator<Item = &'a Expense>) -> Vec<MonthlyBucket> {
    let mut totals: BTreeMap<MonthKey, BigDecimal> = BTreeMap::new();
    for expense in expenses {
        *totals.entry(MonthKey::of(&expense.date)).or_insert_with(BigDecimal::zero) += &expense.amount;
    }

    totals
        .into_iter()
        .map(|(key, total)| MonthlyBucket {
            label: key.to_string(),
            total,
        })
        .collect()
}

/// Groups the expenses dated inside `month` by day of month and sums each group.
/// Expenses from other months are ignored.
pub fn group_by_day<'a>(month: MonthKey, expenses: impl IntoIterator<Item = &'a Expense>) -> DailySummary {
    let mut totals: BTreeMap<u32, BigDecimal> = BTreeMap::new();
    for expense in expenses.into_iter().filter(|e| month.contains(&e.date)) {
        *totals.entry(expense.date.day()).or_insert_with(BigDecimal::zero) += &expense.amount;
    }

    DailySummary {
        month: month.to_string(),
        days: totals.into_iter().map(|(day, total)| DailyBucket { day, total }).collect(),
    }
}

pub fn current_month_total<'a>(expenses: impl IntoIterator<Item = &'a Expense>, now: DateTime<Utc>) -> BigDecimal {
    let month = MonthKey::of(&now);
    expenses
        .into_iter()
        .filter(|e| month.contains(&e.date))
        .fold(BigDecimal::zero(), |acc, e| acc + &e.amount)
}

/// Income minus spend. Never clamped or rounded; may be negative.
pub fn available_balance(monthly_income: &BigDecimal, current_month_total: &BigDecimal) -> BigDecimal {
    monthly_income - current_month_total
}

pub fn balance_for<'a>(monthly_income: &BigDecimal, expenses: impl IntoIterator<Item = &'a Expense>, now: DateTime<Utc>) -> Balance {
    let spent = current_month_total(expenses, now);
    let available = available_balance(monthly_income, &spent);
    let status = if available < BigDecimal::zero() {
        BalanceStatus::Negative
    } else {
        BalanceStatus::NonNegative
    };

    Balance {
        month: MonthKey::of(&now).to_string(),
        income: monthly_income.clone(),
        spent,
        available,
        status,
    }
}
