//! Plain-text views. Every function returns a `String`; printing is left to
//! the command handlers.

use chrono::NaiveDate;
use std::fmt::Write as _;
use tenny_core::{
    Category, MonthlySummary, OcrResult, ReportSummary, Transaction, TransactionsPage, User,
    share_of_total,
};

pub const NOT_DETECTED: &str = "Not detected";

/// `$1,234.50`; negative values keep the sign in front of the symbol
pub fn money(amount: f64, symbol: &str) -> String {
    if !amount.is_finite() {
        return format!("{symbol}0.00");
    }
    let cents = (amount.abs() * 100.0).round() as u64;
    let whole = (cents / 100).to_string();
    let mut grouped = String::new();
    for (i, ch) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    let sign = if amount < 0.0 && cents > 0 { "-" } else { "" };
    format!("{sign}{symbol}{grouped}.{:02}", cents % 100)
}

/// One decimal; an undefined share (zero total) shows as `0.0%`
pub fn percent(p: Option<f64>) -> String {
    format!("{:.1}%", p.unwrap_or(0.0))
}

fn bar(share: Option<f64>, width: usize) -> String {
    let filled = ((share.unwrap_or(0.0).clamp(0.0, 100.0) / 100.0) * width as f64).round() as usize;
    format!("{}{}", "#".repeat(filled), ".".repeat(width - filled.min(width)))
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('~');
    out
}

fn transaction_row(out: &mut String, t: &Transaction, symbol: &str) {
    let _ = writeln!(
        out,
        "{:<10}  {:<24}  {:<16}  {:>12}",
        truncate(&t.date, 10),
        truncate(&t.merchant, 24),
        truncate(&t.category, 16),
        money(t.amount, symbol)
    );
}

pub fn dashboard(summary: &MonthlySummary, recent: &[Transaction], symbol: &str) -> String {
    let p = &summary.period;
    let mut out = String::new();
    let _ = writeln!(out, "Spending for {}", summary.month);
    let _ = writeln!(out, "  Total spent      {:>12}   {} transactions", money(p.total_spent, symbol), p.transaction_count);
    let _ = writeln!(out, "  Daily average    {:>12}   per day this month", money(p.daily_average, symbol));
    let _ = writeln!(out, "  Projected total  {:>12}   {} days remaining", money(p.projected_total, symbol), p.remaining_days);

    if !p.top_categories.is_empty() {
        let _ = writeln!(out, "\nTop categories");
        for c in &p.top_categories {
            let share = share_of_total(c.amount, p.total_spent).map(|s| s.min(100.0));
            let _ = writeln!(
                out,
                "  {:<16} {:>12}  {} {}",
                truncate(&c.category, 16),
                money(c.amount, symbol),
                bar(share, 20),
                percent(share)
            );
        }
    }

    let _ = writeln!(out, "\nRecent transactions");
    if recent.is_empty() {
        let _ = writeln!(out, "  No transactions yet");
    }
    for t in recent {
        out.push_str("  ");
        transaction_row(&mut out, t, symbol);
    }
    out
}

pub fn transaction_list(page: &TransactionsPage, limit: u64, symbol: &str) -> String {
    if page.transactions.is_empty() {
        return "No transactions found\n".to_string();
    }
    let mut out = String::new();
    let _ = writeln!(out, "{:<10}  {:<24}  {:<16}  {:>12}  ID", "DATE", "MERCHANT", "CATEGORY", "AMOUNT");
    for t in &page.transactions {
        let mut row = String::new();
        transaction_row(&mut row, t, symbol);
        let _ = writeln!(out, "{}  {}", row.trim_end(), t.id);
    }
    if let Some((first, last)) = page.showing_range(limit) {
        let _ = writeln!(
            out,
            "\nShowing {first} to {last} of {} (page {} of {})",
            page.total,
            page.page.max(1),
            page.pages.max(1)
        );
    }
    out
}

pub fn transaction_detail(t: &Transaction, symbol: &str) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", t.merchant);
    let _ = writeln!(out, "  ID        {}", t.id);
    let _ = writeln!(out, "  Amount    {}", money(t.amount, symbol));
    let _ = writeln!(out, "  Date      {}", t.date);
    let _ = writeln!(out, "  Category  {}", t.category);
    if let Some(notes) = t.notes.as_deref().filter(|n| !n.is_empty()) {
        let _ = writeln!(out, "  Notes     {notes}");
    }
    if let Some(image) = &t.bill_image {
        let _ = writeln!(out, "  Receipt   {image}");
    }
    if let Some(items) = t.items.as_ref().filter(|i| !i.is_empty()) {
        let _ = writeln!(out, "  Items");
        for item in items {
            let _ = writeln!(
                out,
                "    {:<28} x{:<3} {}",
                truncate(&item.name, 28),
                item.quantity.unwrap_or(1),
                item.price.map(|p| money(p, symbol)).unwrap_or_default()
            );
        }
    }
    if !t.created_at.is_empty() {
        let _ = writeln!(out, "  Created   {}", t.created_at);
    }
    out
}

/// Review step after OCR; missing fields are a normal outcome
pub fn ocr_review(result: &OcrResult, symbol: &str) -> String {
    let d = &result.extracted_data;
    let mut out = String::new();
    let _ = writeln!(out, "Extracted information");
    let _ = writeln!(out, "  Merchant    {}", d.merchant.as_deref().unwrap_or(NOT_DETECTED));
    let _ = writeln!(out, "  Date        {}", d.date.as_deref().unwrap_or(NOT_DETECTED));
    let _ = writeln!(
        out,
        "  Total       {}",
        d.total.map(|t| money(t, symbol)).unwrap_or_else(|| NOT_DETECTED.to_string())
    );
    let _ = writeln!(out, "  Confidence  {}%", result.confidence_percent());
    if let Some(source) = &result.source {
        let _ = writeln!(out, "  Engine      {source}");
    }
    let _ = writeln!(out, "  Took        {:.0} ms", result.processing_time);

    if !d.items.is_empty() {
        let _ = writeln!(out, "\nItems");
        for item in &d.items {
            let _ = writeln!(
                out,
                "  {:<30} {}",
                truncate(&item.name, 30),
                item.price.map(|p| money(p, symbol)).unwrap_or_default()
            );
        }
    }
    if result.is_empty_extraction() {
        let _ = writeln!(out, "\nNothing could be read reliably; fill in the form by hand.");
    }
    if !result.text.trim().is_empty() {
        let _ = writeln!(out, "\nRaw text\n{}", result.text.trim_end());
    }
    out
}

pub fn report(summary: &ReportSummary, start: NaiveDate, end: NaiveDate, symbol: &str) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Report {start} to {end}");
    let _ = writeln!(out, "  Total spent          {}", money(summary.total_spent, symbol));
    let _ = writeln!(out, "  Transactions         {}", summary.transaction_count);
    let _ = writeln!(
        out,
        "  Average transaction  {}",
        summary.average_transaction.map(|a| money(a, symbol)).unwrap_or_else(|| "N/A".to_string())
    );
    let _ = writeln!(
        out,
        "  Top category         {}",
        summary.top_category.as_ref().map(|c| c.category.as_str()).unwrap_or("None")
    );

    let _ = writeln!(out, "\nSpending by category");
    if summary.rows.is_empty() {
        let _ = writeln!(out, "  No data for this period");
    }
    for row in &summary.rows {
        let _ = writeln!(
            out,
            "  {:<16} {:>12}  {:>6}",
            truncate(&row.category, 16),
            money(row.amount, symbol),
            percent(row.percent)
        );
    }
    out
}

pub fn categories(list: &[Category]) -> String {
    if list.is_empty() {
        return "No categories\n".to_string();
    }
    let mut out = String::new();
    for c in list {
        let _ = write!(out, "{:<20} {}", c.name, c.id);
        if let Some(desc) = c.description.as_deref().filter(|d| !d.is_empty()) {
            let _ = write!(out, "  {desc}");
        }
        out.push('\n');
    }
    out
}

pub fn users(list: &[User]) -> String {
    if list.is_empty() {
        return "No users\n".to_string();
    }
    let mut out = String::new();
    for u in list {
        let _ = writeln!(out, "{:<24} {:<32} {}", truncate(&u.name, 24), u.email, u.id);
    }
    out
}

pub fn user(u: &User) -> String {
    let mut out = format!("{} <{}>\n  ID       {}\n", u.name, u.email, u.id);
    if let Some(created) = &u.created_at {
        let _ = writeln!(out, "  Joined   {created}");
    }
    out
}

/// Backend report payloads have no fixed shape; show them as indented JSON
pub fn json(value: &serde_json::Value) -> String {
    let mut s = serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
    s.push('\n');
    s
}
