//! Staging area for the transaction create/edit form.
//!
//! Inputs stay as typed text until `submit`, which validates them and
//! produces the API payload.

use chrono::NaiveDate;
use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;

use crate::categorizer::suggest_category;
use crate::models::{LineItem, NewTransaction, OcrResult, Transaction, TransactionPatch};
use crate::time::{parse_date, to_iso_date};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FormError {
    #[error("amount '{0}' is not a number")]
    InvalidAmount(String),
    #[error("amount cannot be negative")]
    NegativeAmount,
    #[error("{0} is required")]
    MissingField(&'static str),
    #[error("date '{0}' is not a calendar date (YYYY-MM-DD)")]
    InvalidDate(String),
}

/// Raw form inputs, as the user typed them
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransactionForm {
    pub amount: String,
    pub date: String,
    pub merchant: String,
    pub category: String,
    pub notes: String,
    pub items: Vec<LineItem>,
    pub bill_image: String,
}

impl TransactionForm {
    /// Blank form dated `today`
    pub fn new(today: NaiveDate) -> Self {
        Self {
            amount: "0".to_string(),
            date: to_iso_date(today),
            ..Default::default()
        }
    }

    /// Pre-fill from an OCR review. Undetected fields stay blank (date falls
    /// back to `today`) so the user completes them by hand.
    pub fn prefill(ocr: &OcrResult, today: NaiveDate) -> Self {
        let data = &ocr.extracted_data;
        let merchant = data.merchant.clone().unwrap_or_default();
        let date = data
            .date
            .as_deref()
            .and_then(|d| parse_date(d).ok())
            .unwrap_or(today);

        Self {
            amount: data.total.map(|t| format!("{t:.2}")).unwrap_or_default(),
            date: to_iso_date(date),
            category: if merchant.is_empty() {
                String::new()
            } else {
                suggest_category(&merchant).to_string()
            },
            merchant,
            notes: String::new(),
            items: data.items.clone(),
            bill_image: String::new(),
        }
    }

    /// Stage an edit of an existing record
    pub fn from_transaction(txn: &Transaction) -> Self {
        Self {
            amount: txn.amount.to_string(),
            date: txn.date.clone(),
            merchant: txn.merchant.clone(),
            category: txn.category.clone(),
            notes: txn.notes.clone().unwrap_or_default(),
            items: txn.items.clone().unwrap_or_default(),
            bill_image: txn.bill_image.clone().unwrap_or_default(),
        }
    }

    /// Validate and build the create payload
    pub fn submit(&self) -> Result<NewTransaction, FormError> {
        let amount = parse_amount(&self.amount)?;
        let date = validate_date(&self.date)?;
        let merchant = required(&self.merchant, "merchant")?;
        let category = required(&self.category, "category")?;

        Ok(NewTransaction {
            amount,
            date,
            merchant,
            category,
            notes: non_blank(&self.notes),
            items: if self.items.is_empty() {
                None
            } else {
                Some(self.items.clone())
            },
            bill_image: non_blank(&self.bill_image),
        })
    }

    /// Fields that differ from `original`, validated
    pub fn patch(&self, original: &Transaction) -> Result<TransactionPatch, FormError> {
        let amount = parse_amount(&self.amount)?;
        let date = validate_date(&self.date)?;
        let merchant = required(&self.merchant, "merchant")?;
        let category = required(&self.category, "category")?;
        let notes = self.notes.trim().to_string();

        Ok(TransactionPatch {
            amount: (amount != original.amount).then_some(amount),
            date: (date != original.date).then_some(date),
            merchant: (merchant != original.merchant).then_some(merchant),
            category: (category != original.category).then_some(category),
            notes: (Some(notes.as_str()) != original.notes.as_deref()
                && !(notes.is_empty() && original.notes.is_none()))
            .then_some(notes),
        })
    }
}

fn amount_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*(?P<sign>-)?\s*\$?\s*(?P<num>\d[\d,]*(?:\.\d*)?|\.\d+)\s*$")
            .expect("amount pattern is valid")
    })
}

/// Numeric parse of an amount input: `"12.5"`, `"$1,234.50"`, `" 3 "`.
pub fn parse_amount(input: &str) -> Result<f64, FormError> {
    let caps = amount_re()
        .captures(input)
        .ok_or_else(|| FormError::InvalidAmount(input.to_string()))?;

    let value: f64 = caps["num"]
        .replace(',', "")
        .parse()
        .map_err(|_| FormError::InvalidAmount(input.to_string()))?;

    if caps.name("sign").is_some() && value != 0.0 {
        return Err(FormError::NegativeAmount);
    }
    if !value.is_finite() {
        return Err(FormError::InvalidAmount(input.to_string()));
    }
    Ok(value)
}

fn validate_date(input: &str) -> Result<String, FormError> {
    parse_date(input)
        .map(to_iso_date)
        .map_err(|_| FormError::InvalidDate(input.to_string()))
}

fn required(input: &str, field: &'static str) -> Result<String, FormError> {
    non_blank(input).ok_or(FormError::MissingField(field))
}

fn non_blank(input: &str) -> Option<String> {
    let s = input.trim();
    if s.is_empty() { None } else { Some(s.to_string()) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ExtractedData;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 14).unwrap()
    }

    fn filled() -> TransactionForm {
        TransactionForm {
            amount: "12.5".into(),
            date: "2026-03-02".into(),
            merchant: "Blue Bottle".into(),
            category: "Food".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_amount_payload_is_numeric_parse() {
        let payload = filled().submit().unwrap();
        assert_eq!(payload.amount, 12.5);
        assert_eq!(payload.notes, None);
        assert_eq!(payload.items, None);
    }

    #[test]
    fn test_parse_amount_variants() {
        assert_eq!(parse_amount("12.5").unwrap(), 12.5);
        assert_eq!(parse_amount(" $1,234.50 ").unwrap(), 1234.5);
        assert_eq!(parse_amount("3").unwrap(), 3.0);
        assert_eq!(parse_amount(".75").unwrap(), 0.75);
        assert_eq!(parse_amount("-0").unwrap(), 0.0);
        assert_eq!(parse_amount("-4.00"), Err(FormError::NegativeAmount));
        assert!(matches!(parse_amount("twelve"), Err(FormError::InvalidAmount(_))));
        assert!(matches!(parse_amount(""), Err(FormError::InvalidAmount(_))));
    }

    #[test]
    fn test_missing_fields_rejected() {
        let mut f = filled();
        f.merchant = "   ".into();
        assert_eq!(f.submit(), Err(FormError::MissingField("merchant")));

        let mut f = filled();
        f.date = "03/02/2026".into();
        assert!(matches!(f.submit(), Err(FormError::InvalidDate(_))));
    }

    #[test]
    fn test_prefill_from_partial_ocr() {
        let ocr = OcrResult {
            text: "TRADER JOE'S ...".into(),
            extracted_data: ExtractedData {
                total: Some(23.4),
                date: None,
                merchant: Some("Trader Joe's Market".into()),
                items: vec![],
            },
            confidence: 0.8,
            processing_time: 120.0,
            source: Some("tesseract".into()),
        };
        let form = TransactionForm::prefill(&ocr, today());
        assert_eq!(form.amount, "23.40");
        assert_eq!(form.date, "2026-03-14");
        assert_eq!(form.merchant, "Trader Joe's Market");
        assert_eq!(form.category, "Food");
    }

    #[test]
    fn test_prefill_with_nothing_detected_needs_manual_input() {
        let ocr = OcrResult {
            text: String::new(),
            extracted_data: ExtractedData::default(),
            confidence: 0.1,
            processing_time: 0.0,
            source: None,
        };
        let form = TransactionForm::prefill(&ocr, today());
        assert_eq!(form.amount, "");
        assert_eq!(form.category, "");
        assert!(matches!(form.submit(), Err(FormError::InvalidAmount(_))));
    }

    #[test]
    fn test_patch_only_carries_changes() {
        let original = Transaction {
            id: "t1".into(),
            amount: 12.5,
            date: "2026-03-02".into(),
            merchant: "Blue Bottle".into(),
            category: "Food".into(),
            notes: None,
            items: None,
            bill_image: None,
            created_at: String::new(),
        };
        let mut form = TransactionForm::from_transaction(&original);
        assert!(form.patch(&original).unwrap().is_empty());

        form.amount = "13".into();
        form.notes = "tip included".into();
        let patch = form.patch(&original).unwrap();
        assert_eq!(patch.amount, Some(13.0));
        assert_eq!(patch.notes.as_deref(), Some("tip included"));
        assert_eq!(patch.merchant, None);
    }
}
