use crate::model::{Amount, ListFilters, NewTransaction, Transaction, TransactionType};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// An outbox entry: a transaction the user submitted that the ledger has not confirmed yet.
///
/// The `temp_id` only identifies the entry on this client. The payload is never changed after
/// the entry is enqueued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingTransaction {
    pub temp_id: String,
    pub payload: NewTransaction,
    /// When the entry was enqueued.
    pub created_at: DateTime<Utc>,
}

impl PendingTransaction {
    /// Wraps `payload` under a fresh temporary id.
    pub fn new(payload: NewTransaction) -> Self {
        Self {
            temp_id: crate::utils::generate_temp_id(),
            payload,
            created_at: Utc::now(),
        }
    }
}

/// A row of the transaction list shown to the user: either confirmed by the ledger or still
/// waiting in the outbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LedgerEntry {
    Confirmed(Transaction),
    Pending(PendingTransaction),
}

impl LedgerEntry {
    pub fn id(&self) -> &str {
        match self {
            LedgerEntry::Confirmed(t) => &t.id,
            LedgerEntry::Pending(p) => &p.temp_id,
        }
    }

    pub fn description(&self) -> &str {
        match self {
            LedgerEntry::Confirmed(t) => &t.description,
            LedgerEntry::Pending(p) => &p.payload.description,
        }
    }

    pub fn amount(&self) -> Amount {
        match self {
            LedgerEntry::Confirmed(t) => t.amount,
            LedgerEntry::Pending(p) => p.payload.amount,
        }
    }

    pub fn r#type(&self) -> TransactionType {
        match self {
            LedgerEntry::Confirmed(t) => t.r#type,
            LedgerEntry::Pending(p) => p.payload.r#type,
        }
    }

    pub fn date(&self) -> NaiveDate {
        match self {
            LedgerEntry::Confirmed(t) => t.date,
            LedgerEntry::Pending(p) => p.payload.date,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, LedgerEntry::Pending(_))
    }

    fn matches(&self, filters: &ListFilters) -> bool {
        match self {
            LedgerEntry::Confirmed(t) => filters.matches(t),
            LedgerEntry::Pending(p) => {
                let category_ok = filters
                    .category
                    .as_ref()
                    .is_none_or(|c| c == &p.payload.category_id);
                category_ok
                    && filters.matches_fields(
                        &p.payload.description,
                        p.payload.r#type,
                        p.payload.date,
                    )
            }
        }
    }
}

/// Builds the list the user sees from the outbox and one page of the ledger. Pending entries
/// come first, newest first, followed by the ledger page in server order. Both sides are filtered
/// with `filters`.
pub fn merge_entries(
    pending: &[PendingTransaction],
    confirmed: &[Transaction],
    filters: &ListFilters,
) -> Vec<LedgerEntry> {
    pending
        .iter()
        .rev()
        .cloned()
        .map(LedgerEntry::Pending)
        .chain(confirmed.iter().cloned().map(LedgerEntry::Confirmed))
        .filter(|e| e.matches(filters))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Category;
    use std::str::FromStr;

    fn pending(temp_id: &str, description: &str) -> PendingTransaction {
        PendingTransaction {
            temp_id: temp_id.into(),
            payload: NewTransaction {
                description: description.into(),
                amount: Amount::from_str("12").unwrap(),
                category_id: "3".into(),
                r#type: TransactionType::Expense,
                date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
                user_id: "1".into(),
            },
            created_at: Utc::now(),
        }
    }

    fn confirmed(id: &str) -> Transaction {
        Transaction {
            id: id.into(),
            amount: Amount::from_str("99").unwrap(),
            description: "Freelance work".into(),
            category: Category {
                id: None,
                name: "Side Income".into(),
            },
            r#type: TransactionType::Income,
            date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_merge_orders_pending_newest_first() {
        let entries = merge_entries(
            &[pending("offline-a", "Lunch"), pending("offline-b", "Taxi")],
            &[confirmed("10"), confirmed("11")],
            &ListFilters::default(),
        );
        let ids: Vec<&str> = entries.iter().map(|e| e.id()).collect();
        assert_eq!(ids, vec!["offline-b", "offline-a", "10", "11"]);
        assert!(entries[0].is_pending());
        assert!(!entries[2].is_pending());
    }

    #[test]
    fn test_merge_filters_both_sides() {
        let filters = ListFilters {
            r#type: Some(TransactionType::Expense),
            ..Default::default()
        };
        let entries = merge_entries(&[pending("offline-a", "Lunch")], &[confirmed("10")], &filters);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].description(), "Lunch");

        let by_category = ListFilters {
            category: Some("3".into()),
            ..Default::default()
        };
        let entries = merge_entries(
            &[pending("offline-a", "Lunch")],
            &[confirmed("10")],
            &by_category,
        );
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_entry_serialization_is_tagged() {
        let json = serde_json::to_value(LedgerEntry::Pending(pending("offline-a", "Lunch"))).unwrap();
        assert_eq!(json["status"], "pending");
        assert_eq!(json["tempId"], "offline-a");
    }
}
