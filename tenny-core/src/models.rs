//! Records exchanged with the Tenny backend.
//!
//! The backend owns every entity; the client only holds refetchable copies.
//! Field names are camelCase on the wire. Snake_case aliases are accepted as
//! well because older backend builds serialize the Rust field names directly.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::time::parse_date;

/// A spending record as returned by `GET /api/transactions[/:id]`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: String,
    /// Currency value, never negative
    pub amount: f64,
    /// Calendar date (`YYYY-MM-DD`, some backends send full RFC 3339)
    pub date: String,
    pub merchant: String,
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<LineItem>>,
    #[serde(default, alias = "bill_image", skip_serializing_if = "Option::is_none")]
    pub bill_image: Option<String>,
    #[serde(default, alias = "created_at")]
    pub created_at: String,
}

impl Transaction {
    /// Parsed calendar date, if the backend sent something recognisable
    pub fn date_naive(&self) -> Option<NaiveDate> {
        parse_date(&self.date).ok()
    }

    /// Merchant and category joined for search/display
    pub fn label(&self) -> String {
        format!("{} ({})", self.merchant, self.category)
    }
}

/// One line of a receipt
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LineItem {
    pub name: String,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub quantity: Option<u32>,
}

/// Paginated listing of `GET /api/transactions`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct TransactionsPage {
    pub transactions: Vec<Transaction>,
    pub total: u64,
    pub page: u64,
    pub pages: u64,
}

impl TransactionsPage {
    /// 1-based index range shown on this page, e.g. "Showing 11 to 20 of 42"
    pub fn showing_range(&self, limit: u64) -> Option<(u64, u64)> {
        if self.total == 0 || limit == 0 {
            return None;
        }
        let first = (self.page.max(1) - 1) * limit + 1;
        let last = (self.page.max(1) * limit).min(self.total);
        Some((first, last))
    }
}

/// Payload for `POST /api/transactions`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NewTransaction {
    pub amount: f64,
    pub date: String,
    pub merchant: String,
    pub category: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<LineItem>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bill_image: Option<String>,
}

/// Payload for `PUT /api/transactions/:id`; unset fields are left alone
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct TransactionPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merchant: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl TransactionPatch {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Apply the patch to a local copy (used for optimistic updates)
    pub fn apply_to(&self, txn: &mut Transaction) {
        if let Some(amount) = self.amount {
            txn.amount = amount;
        }
        if let Some(date) = &self.date {
            txn.date = date.clone();
        }
        if let Some(merchant) = &self.merchant {
            txn.merchant = merchant.clone();
        }
        if let Some(category) = &self.category {
            txn.category = category.clone();
        }
        if let Some(notes) = &self.notes {
            txn.notes = Some(notes.clone());
        }
    }
}

/// A user-defined spending category
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Category {
    pub id: String,
    /// Unique display label
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

/// Payload for `POST /api/categories`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewCategory {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

impl NewCategory {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            color: None,
            icon: None,
        }
    }
}

/// Payload for `PUT /api/categories/:id`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct CategoryPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

/// Engine the backend should run for OCR
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum OcrEngine {
    /// Tesseract first, Google Vision when confidence is low
    #[default]
    Hybrid,
    Tesseract,
    Google,
}

impl OcrEngine {
    pub const ALL: [OcrEngine; 3] = [OcrEngine::Hybrid, OcrEngine::Tesseract, OcrEngine::Google];

    pub fn as_str(&self) -> &'static str {
        match self {
            OcrEngine::Hybrid => "hybrid",
            OcrEngine::Tesseract => "tesseract",
            OcrEngine::Google => "google",
        }
    }
}

impl fmt::Display for OcrEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OcrEngine {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hybrid" => Ok(OcrEngine::Hybrid),
            "tesseract" => Ok(OcrEngine::Tesseract),
            "google" => Ok(OcrEngine::Google),
            other => Err(format!(
                "unknown OCR engine '{other}' (expected hybrid, tesseract or google)"
            )),
        }
    }
}

/// Response of `POST /api/ocr/process`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OcrResult {
    #[serde(default)]
    pub text: String,
    #[serde(default, alias = "extracted_data")]
    pub extracted_data: ExtractedData,
    /// 0.0 - 1.0
    #[serde(default)]
    pub confidence: f64,
    /// Backend processing time in milliseconds
    #[serde(default, alias = "processing_time")]
    pub processing_time: f64,
    /// Engine that produced the text (`tesseract`, `google`, ...)
    #[serde(default)]
    pub source: Option<String>,
}

impl OcrResult {
    /// Confidence as a whole percentage, clamped to 0..=100
    pub fn confidence_percent(&self) -> u8 {
        if !self.confidence.is_finite() {
            return 0;
        }
        (self.confidence.clamp(0.0, 1.0) * 100.0).round() as u8
    }

    /// True when none of total/date/merchant were recognised
    pub fn is_empty_extraction(&self) -> bool {
        let d = &self.extracted_data;
        d.total.is_none() && d.date.is_none() && d.merchant.is_none()
    }
}

/// Best-effort structured fields pulled out of the OCR text.
/// Any of them may be missing; that is a normal outcome.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ExtractedData {
    #[serde(default)]
    pub total: Option<f64>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub merchant: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub items: Vec<LineItem>,
}

fn null_as_empty<'de, D>(d: D) -> Result<Vec<LineItem>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<Vec<LineItem>>::deserialize(d)?.unwrap_or_default())
}

/// Account as returned by `/api/auth/me` and `/api/users`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: String,
    #[serde(default, alias = "created_at")]
    pub created_at: Option<String>,
}

/// Response of login/register
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuthResponse {
    pub token: String,
    pub user: User,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Registration {
    pub email: String,
    pub password: String,
    pub name: String,
}

/// Payload for `PUT /api/users/:id`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct UserPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}
