//! tenny-core: data model and spending arithmetic for Tenny Ledger

pub mod filters;
pub mod form;
pub mod models;
pub mod summary;
pub mod time;

pub use filters::{SortDirection, SortField, TransactionFilters, canonical_key};
pub use form::{FormError, TransactionForm, parse_amount};
pub use models::{
    AuthResponse, Category, CategoryPatch, Credentials, ExtractedData, LineItem, NewCategory,
    NewTransaction, OcrEngine, OcrResult, Registration, Transaction, TransactionPatch,
    TransactionsPage, User, UserPatch,
};
pub use summary::{
    BreakdownRow, CategoryTotal, MonthlySummary, PeriodSummary, ReportSummary,
    category_breakdown, share_of_total, total_spent,
};

/// Suggests a category label for a merchant name read off a receipt
pub mod categorizer {
    /// Categories every new account starts with
    pub const DEFAULT_CATEGORIES: [&str; 8] = [
        "Food",
        "Transportation",
        "Entertainment",
        "Shopping",
        "Utilities",
        "Healthcare",
        "Housing",
        "Other",
    ];

    /// Keyword match on the merchant name. Falls back to "Other".
    pub fn suggest_category(merchant: &str) -> &'static str {
        let m = merchant.to_lowercase();

        // Food
        if m.contains("grocery")
            || m.contains("market")
            || m.contains("restaurant")
            || m.contains("cafe")
            || m.contains("coffee")
            || m.contains("bakery")
            || m.contains("pizza")
            || m.contains("uber eats")
            || m.contains("doordash")
            || m.contains("starbucks")
            || m.contains("trader joe")
            || m.contains("whole foods") {
            return "Food";
        }

        // Transportation
        if m.contains("uber")
            || m.contains("lyft")
            || m.contains("taxi")
            || m.contains("shell")
            || m.contains("chevron")
            || m.contains("fuel")
            || m.contains("gas station")
            || m.contains("parking")
            || m.contains("transit")
            || m.contains("airline") {
            return "Transportation";
        }

        // Entertainment
        if m.contains("cinema")
            || m.contains("theater")
            || m.contains("theatre")
            || m.contains("netflix")
            || m.contains("spotify")
            || m.contains("steam")
            || m.contains("concert")
            || m.contains("ticket") {
            return "Entertainment";
        }

        // Utilities
        if m.contains("electric")
            || m.contains("energy")
            || m.contains("water")
            || m.contains("internet")
            || m.contains("telecom")
            || m.contains("mobile")
            || m.contains("utility") {
            return "Utilities";
        }

        // Healthcare
        if m.contains("pharmacy")
            || m.contains("clinic")
            || m.contains("hospital")
            || m.contains("dental")
            || m.contains("cvs")
            || m.contains("walgreens") {
            return "Healthcare";
        }

        // Housing
        if m.contains("rent")
            || m.contains("apartment")
            || m.contains("lease")
            || m.contains("landlord")
            || m.contains("hardware")
            || m.contains("ikea") {
            return "Housing";
        }

        // Shopping
        if m.contains("store")
            || m.contains("mall")
            || m.contains("amazon")
            || m.contains("target")
            || m.contains("walmart")
            || m.contains("outlet")
            || m.contains("boutique") {
            return "Shopping";
        }

        "Other"
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_suggest_food() {
            assert_eq!(suggest_category("Blue Bottle Coffee"), "Food");
            assert_eq!(suggest_category("WHOLE FOODS MKT #102"), "Food");
        }

        #[test]
        fn test_suggest_transportation() {
            assert_eq!(suggest_category("Shell Oil 5521"), "Transportation");
            assert_eq!(suggest_category("Lyft ride"), "Transportation");
        }

        #[test]
        fn test_food_delivery_wins_over_rideshare() {
            assert_eq!(suggest_category("Uber Eats order"), "Food");
            assert_eq!(suggest_category("Uber trip"), "Transportation");
        }

        #[test]
        fn test_suggest_healthcare_and_utilities() {
            assert_eq!(suggest_category("CVS Pharmacy"), "Healthcare");
            assert_eq!(suggest_category("City Water Dept"), "Utilities");
        }

        #[test]
        fn test_unknown_merchant_is_other() {
            assert_eq!(suggest_category("ACME 42"), "Other");
            assert!(DEFAULT_CATEGORIES.contains(&suggest_category("anything")));
        }
    }
}

pub use categorizer::{DEFAULT_CATEGORIES, suggest_category};
