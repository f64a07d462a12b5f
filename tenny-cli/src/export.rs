//! CSV export of transaction listings.
//!
//! Columns: id,date,merchant,category,amount,notes,created_at

use anyhow::{Context, Result};
use serde::Serialize;
use std::io::Write;
use std::path::Path;
use tenny_core::Transaction;

#[derive(Debug, Serialize)]
struct Row<'a> {
    id: &'a str,
    date: &'a str,
    merchant: &'a str,
    category: &'a str,
    amount: String,
    notes: &'a str,
    created_at: &'a str,
}

impl<'a> From<&'a Transaction> for Row<'a> {
    fn from(t: &'a Transaction) -> Self {
        Self {
            id: &t.id,
            date: &t.date,
            merchant: &t.merchant,
            category: &t.category,
            amount: format!("{:.2}", t.amount),
            notes: t.notes.as_deref().unwrap_or(""),
            created_at: &t.created_at,
        }
    }
}

pub fn write_csv<W: Write>(out: W, txns: &[Transaction]) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(out);
    for t in txns {
        wtr.serialize(Row::from(t)).context("write csv row")?;
    }
    wtr.flush().context("flush csv")?;
    Ok(())
}

pub fn export_to_path(path: impl AsRef<Path>, txns: &[Transaction]) -> Result<()> {
    let path = path.as_ref();
    let file = std::fs::File::create(path).with_context(|| format!("create {}", path.display()))?;
    write_csv(file, txns)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn txn(merchant: &str, notes: Option<&str>) -> Transaction {
        Transaction {
            id: "t1".into(),
            amount: 12.5,
            date: "2026-03-02".into(),
            merchant: merchant.into(),
            category: "Food".into(),
            notes: notes.map(Into::into),
            items: None,
            bill_image: None,
            created_at: "2026-03-02T10:00:00Z".into(),
        }
    }

    #[test]
    fn test_header_and_quoting() {
        let mut buf = Vec::new();
        write_csv(&mut buf, &[txn("Joe's, Diner", Some("lunch"))]).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("id,date,merchant,category,amount,notes,created_at"));
        assert_eq!(
            lines.next(),
            Some("t1,2026-03-02,\"Joe's, Diner\",Food,12.50,lunch,2026-03-02T10:00:00Z")
        );
    }

    #[test]
    fn test_export_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        export_to_path(&path, &[txn("Cafe", None), txn("Bakery", None)]).unwrap();

        let mut rdr = csv::Reader::from_path(&path).unwrap();
        let merchants: Vec<String> = rdr
            .records()
            .map(|r| r.unwrap().get(2).unwrap().to_string())
            .collect();
        assert_eq!(merchants, vec!["Cafe", "Bakery"]);
    }
}
