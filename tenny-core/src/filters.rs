//! Transaction listing filters and their canonical cache keys.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::time::{month_bounds, to_iso_date};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum SortField {
    Date,
    Amount,
    Merchant,
    Category,
    CreatedAt,
}

impl SortField {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortField::Date => "date",
            SortField::Amount => "amount",
            SortField::Merchant => "merchant",
            SortField::Category => "category",
            SortField::CreatedAt => "createdAt",
        }
    }
}

impl std::str::FromStr for SortField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace(['_', '-'], "").as_str() {
            "date" => Ok(SortField::Date),
            "amount" => Ok(SortField::Amount),
            "merchant" => Ok(SortField::Merchant),
            "category" => Ok(SortField::Category),
            "createdat" => Ok(SortField::CreatedAt),
            other => Err(format!("unknown sort field '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }
}

/// Query parameters of `GET /api/transactions`
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct TransactionFilters {
    pub page: Option<u64>,
    pub limit: Option<u64>,
    pub search: Option<String>,
    pub category: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub sort_by: Option<SortField>,
    pub sort_direction: Option<SortDirection>,
}

impl TransactionFilters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything dated within the month containing `today`
    pub fn current_month(today: NaiveDate) -> Self {
        let (first, last) = month_bounds(today);
        Self::new().with_range(first, last).with_limit(100)
    }

    /// The `n` most recent transactions
    pub fn recent(n: u64) -> Self {
        Self::new()
            .with_limit(n)
            .sorted_by(SortField::Date, SortDirection::Desc)
    }

    pub fn with_page(mut self, page: u64) -> Self {
        self.page = Some(page);
        self
    }

    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_range(mut self, start: NaiveDate, end: NaiveDate) -> Self {
        self.start_date = Some(to_iso_date(start));
        self.end_date = Some(to_iso_date(end));
        self
    }

    pub fn sorted_by(mut self, field: SortField, direction: SortDirection) -> Self {
        self.sort_by = Some(field);
        self.sort_direction = Some(direction);
        self
    }

    /// Query string pairs, camelCase names, sorted by name.
    /// Unset and blank values are left out so the backend never sees `search=`.
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs: BTreeMap<&'static str, String> = BTreeMap::new();

        if let Some(p) = self.page {
            pairs.insert("page", p.to_string());
        }
        if let Some(l) = self.limit {
            pairs.insert("limit", l.to_string());
        }
        let text = [
            ("search", &self.search),
            ("category", &self.category),
            ("startDate", &self.start_date),
            ("endDate", &self.end_date),
        ];
        for (name, value) in text {
            if let Some(v) = value.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
                pairs.insert(name, v.to_string());
            }
        }
        if let Some(s) = self.sort_by {
            pairs.insert("sortBy", s.as_str().to_string());
        }
        if let Some(d) = self.sort_direction {
            pairs.insert("sortDirection", d.as_str().to_string());
        }

        pairs.into_iter().collect()
    }

    /// Canonical cache key: `endpoint?k=v&...` with keys sorted.
    /// Equal keys mean the backend would receive the same request.
    pub fn cache_key(&self, endpoint: &str) -> String {
        canonical_key(endpoint, &self.query_pairs())
    }
}

/// Join an endpoint name with already-sorted query pairs.
pub fn canonical_key<K: AsRef<str>, V: AsRef<str>>(endpoint: &str, pairs: &[(K, V)]) -> String {
    if pairs.is_empty() {
        return endpoint.to_string();
    }
    let query: Vec<String> = pairs
        .iter()
        .map(|(k, v)| format!("{}={}", k.as_ref(), escape(v.as_ref())))
        .collect();
    format!("{}?{}", endpoint, query.join("&"))
}

// Separators inside values must not be able to forge another key.
fn escape(v: &str) -> String {
    v.replace('%', "%25").replace('&', "%26").replace('=', "%3D")
}
