//! Spending aggregation for the dashboard summary and the reports page.
//!
//! Everything here works on an already-fetched slice of transactions.
//! Divisions that could hit zero return `Option` so callers render a
//! defined fallback instead of NaN.

use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use std::collections::HashMap;

use crate::models::Transaction;
use crate::time::{days_in_month, month_bounds};

/// How many categories the dashboard highlights
pub const DASHBOARD_TOP_CATEGORIES: usize = 3;

/// Total spent in one category label
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CategoryTotal {
    pub category: String,
    pub amount: f64,
    pub count: usize,
}

/// Sum of all amounts
pub fn total_spent(txns: &[Transaction]) -> f64 {
    txns.iter().map(|t| t.amount).sum()
}

/// Sum per category label, largest first (ties by label), optionally top-N.
pub fn category_breakdown(txns: &[Transaction], top_n: Option<usize>) -> Vec<CategoryTotal> {
    let mut groups: HashMap<&str, (f64, usize)> = HashMap::new();
    for t in txns {
        let entry = groups.entry(t.category.as_str()).or_insert((0.0, 0));
        entry.0 += t.amount;
        entry.1 += 1;
    }

    let mut totals: Vec<CategoryTotal> = groups
        .into_iter()
        .map(|(category, (amount, count))| CategoryTotal {
            category: category.to_string(),
            amount,
            count,
        })
        .collect();

    totals.sort_by(|a, b| {
        b.amount
            .total_cmp(&a.amount)
            .then_with(|| a.category.cmp(&b.category))
    });

    if let Some(n) = top_n {
        totals.truncate(n);
    }
    totals
}

/// `part / total * 100`, or `None` when the total is zero
pub fn share_of_total(part: f64, total: f64) -> Option<f64> {
    if total == 0.0 || !total.is_finite() || !part.is_finite() {
        return None;
    }
    Some(part / total * 100.0)
}

/// Spending over a period with a projection to the period end
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PeriodSummary {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub total_spent: f64,
    pub transaction_count: usize,
    /// Days of the period already elapsed, `today` included
    pub elapsed_days: u32,
    pub remaining_days: u32,
    pub daily_average: f64,
    pub projected_total: f64,
    pub top_categories: Vec<CategoryTotal>,
}

impl PeriodSummary {
    pub fn compute(txns: &[Transaction], start: NaiveDate, end: NaiveDate, today: NaiveDate) -> Self {
        let period_days = ((end - start).num_days() + 1).max(0) as u32;
        let elapsed = ((today - start).num_days() + 1).clamp(0, period_days as i64) as u32;
        let remaining = period_days - elapsed;

        let total = total_spent(txns);
        let daily_average = if elapsed > 0 {
            total / elapsed as f64
        } else {
            0.0
        };

        Self {
            start,
            end,
            total_spent: total,
            transaction_count: txns.len(),
            elapsed_days: elapsed,
            remaining_days: remaining,
            daily_average,
            projected_total: total + daily_average * remaining as f64,
            top_categories: category_breakdown(txns, Some(DASHBOARD_TOP_CATEGORIES)),
        }
    }
}

/// Month-to-date summary shown on the dashboard
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MonthlySummary {
    pub month: String,
    pub days_in_month: u32,
    #[serde(flatten)]
    pub period: PeriodSummary,
}

impl MonthlySummary {
    /// `txns` is expected to hold the current month's transactions.
    pub fn compute(txns: &[Transaction], today: NaiveDate) -> Self {
        let (first, last) = month_bounds(today);
        Self {
            month: format!("{:04}-{:02}", today.year(), today.month()),
            days_in_month: days_in_month(today),
            period: PeriodSummary::compute(txns, first, last, today),
        }
    }
}

/// One row of the "Spending by Category" table
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct BreakdownRow {
    pub category: String,
    pub amount: f64,
    /// `None` when the overall total is zero
    pub percent: Option<f64>,
}

/// Reports page figures for a date range
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ReportSummary {
    pub total_spent: f64,
    pub transaction_count: usize,
    pub average_transaction: Option<f64>,
    pub rows: Vec<BreakdownRow>,
    pub top_category: Option<CategoryTotal>,
}

impl ReportSummary {
    pub fn compute(txns: &[Transaction]) -> Self {
        let total = total_spent(txns);
        let breakdown = category_breakdown(txns, None);

        let rows = breakdown
            .iter()
            .map(|c| BreakdownRow {
                category: c.category.clone(),
                amount: c.amount,
                percent: share_of_total(c.amount, total),
            })
            .collect();

        let average_transaction = if txns.is_empty() {
            None
        } else {
            Some(total / txns.len() as f64)
        };

        Self {
            total_spent: total,
            transaction_count: txns.len(),
            average_transaction,
            rows,
            top_category: breakdown.into_iter().next(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn txn(id: &str, amount: f64, category: &str, date: &str) -> Transaction {
        Transaction {
            id: id.to_string(),
            amount,
            date: date.to_string(),
            merchant: format!("m-{id}"),
            category: category.to_string(),
            notes: None,
            items: None,
            bill_image: None,
            created_at: String::new(),
        }
    }

    fn sample() -> Vec<Transaction> {
        vec![
            txn("1", 12.5, "Food", "2026-02-01"),
            txn("2", 40.0, "Utilities", "2026-02-03"),
            txn("3", 7.25, "Food", "2026-02-04"),
            txn("4", 19.99, "Entertainment", "2026-02-05"),
            txn("5", 0.01, "Other", "2026-02-06"),
        ]
    }

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_category_sums_add_up_to_total() {
        let txns = sample();
        let sum: f64 = category_breakdown(&txns, None).iter().map(|c| c.amount).sum();
        assert!((sum - total_spent(&txns)).abs() < 1e-9);
    }

    #[test]
    fn test_breakdown_sorted_descending_and_truncated() {
        let txns = sample();
        let all = category_breakdown(&txns, None);
        assert_eq!(all.len(), 4);
        for w in all.windows(2) {
            assert!(w[0].amount >= w[1].amount, "breakdown not sorted");
        }
        assert_eq!(all[0].category, "Utilities");
        assert_eq!(all[1].category, "Food");
        assert_eq!(all[1].count, 2);

        let top = category_breakdown(&txns, Some(2));
        assert_eq!(top.len(), 2);
        assert_eq!(top[..], all[..2]);
    }

    #[test]
    fn test_ties_break_by_label() {
        let txns = vec![txn("1", 5.0, "b", "2026-02-01"), txn("2", 5.0, "a", "2026-02-01")];
        let rows = category_breakdown(&txns, None);
        assert_eq!(rows[0].category, "a");
    }

    #[test]
    fn test_percentages_sum_to_100() {
        let report = ReportSummary::compute(&sample());
        let pct: f64 = report.rows.iter().filter_map(|r| r.percent).sum();
        assert!((pct - 100.0).abs() < 1e-9, "got {pct}");
    }

    #[test]
    fn test_empty_list_has_defined_fallbacks() {
        let report = ReportSummary::compute(&[]);
        assert_eq!(report.total_spent, 0.0);
        assert_eq!(report.average_transaction, None);
        assert_eq!(report.top_category, None);
        assert!(report.rows.is_empty());
        assert_eq!(share_of_total(0.0, 0.0), None);
    }

    #[test]
    fn test_zero_total_gives_no_percentages() {
        let txns = vec![txn("1", 0.0, "Food", "2026-02-01"), txn("2", 0.0, "Other", "2026-02-01")];
        let report = ReportSummary::compute(&txns);
        assert!(report.rows.iter().all(|r| r.percent.is_none()));
    }

    #[test]
    fn test_monthly_projection_formula() {
        // February 2026: N = 28, D = 10
        let txns = sample();
        let today = d(2026, 2, 10);
        let s = MonthlySummary::compute(&txns, today);

        let t = total_spent(&txns);
        assert_eq!(s.days_in_month, 28);
        assert_eq!(s.period.elapsed_days, 10);
        assert_eq!(s.period.remaining_days, 18);
        assert_eq!(s.period.daily_average, t / 10.0);
        assert_eq!(s.period.projected_total, t + (t / 10.0) * 18.0);
        assert_eq!(s.period.top_categories.len(), 3);
        assert_eq!(s.month, "2026-02");
    }

    #[test]
    fn test_last_day_projects_current_total() {
        let txns = sample();
        let s = MonthlySummary::compute(&txns, d(2026, 2, 28));
        assert_eq!(s.period.remaining_days, 0);
        assert_eq!(s.period.projected_total, total_spent(&txns));
    }

    #[test]
    fn test_period_not_started_yet() {
        let s = PeriodSummary::compute(&[], d(2026, 3, 1), d(2026, 3, 31), d(2026, 2, 20));
        assert_eq!(s.elapsed_days, 0);
        assert_eq!(s.remaining_days, 31);
        assert_eq!(s.daily_average, 0.0);
        assert_eq!(s.projected_total, 0.0);
    }

    #[test]
    fn test_period_already_over() {
        let txns = sample();
        let s = PeriodSummary::compute(&txns, d(2026, 1, 1), d(2026, 1, 31), d(2026, 2, 20));
        assert_eq!(s.elapsed_days, 31);
        assert_eq!(s.remaining_days, 0);
        assert_eq!(s.projected_total, total_spent(&txns));
    }
}
