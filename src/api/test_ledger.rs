//! Implements the `Ledger` trait in memory.
//!
//! Note: this is compiled even in the "production" version of this app so that we can run the whole
//! app, top-to-bottom, without a server. Tests also use it to script failures.

use crate::api::{Ledger, LedgerResult};
use crate::error::LedgerError;
use crate::model::{
    Category, ListFilters, NewTransaction, Pagination, Transaction, TransactionPage,
    TransactionPatch,
};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// What to do when a create for a given description comes in.
#[derive(Debug, Clone)]
enum Fault {
    /// Refuse the create with this error.
    Reject(LedgerError),
    /// Store the transaction, then report a `Network` error as if the response was lost.
    LoseResponse,
}

#[derive(Debug, Default)]
struct State {
    transactions: Vec<Transaction>,
    next_id: u64,
    reachable: bool,
    faults: HashMap<String, Fault>,
    /// Idempotency key to the id of the transaction it created.
    keys: HashMap<String, String>,
    create_calls: usize,
    list_calls: usize,
}

/// An in-memory ledger. By default it is reachable and seeded with a few transactions.
#[derive(Debug)]
pub struct TestLedger {
    state: Mutex<State>,
    delay: Option<Duration>,
}

impl TestLedger {
    /// An empty, reachable ledger.
    pub fn empty() -> Self {
        Self::with_transactions(Vec::new())
    }

    pub fn with_transactions(transactions: Vec<Transaction>) -> Self {
        let next_id = transactions
            .iter()
            .filter_map(|t| t.id.parse::<u64>().ok())
            .max()
            .unwrap_or(0)
            + 1;
        Self {
            state: Mutex::new(State {
                transactions,
                next_id,
                reachable: true,
                ..Default::default()
            }),
            delay: None,
        }
    }

    /// Every call sleeps for `delay` before touching the data.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// While unreachable, every call fails with a `Network` error and nothing is stored.
    pub fn set_reachable(&self, reachable: bool) {
        self.lock().reachable = reachable;
    }

    /// Creates whose description equals `description` fail with `error` until cleared.
    pub fn fail_on(&self, description: impl Into<String>, error: LedgerError) {
        self.lock()
            .faults
            .insert(description.into(), Fault::Reject(error));
    }

    /// Creates whose description equals `description` are stored, but the caller sees a
    /// `Network` error.
    pub fn lose_response_on(&self, description: impl Into<String>) {
        self.lock()
            .faults
            .insert(description.into(), Fault::LoseResponse);
    }

    pub fn clear_faults(&self) {
        self.lock().faults.clear();
    }

    /// The number of create requests received, including failed ones.
    pub fn create_calls(&self) -> usize {
        self.lock().create_calls
    }

    pub fn list_calls(&self) -> usize {
        self.lock().list_calls
    }

    /// Everything the ledger has stored, in insertion order.
    pub fn transactions(&self) -> Vec<Transaction> {
        self.lock().transactions.clone()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn pause(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

impl Default for TestLedger {
    /// Seeds the ledger with the sample data from this module.
    fn default() -> Self {
        Self::with_transactions(seed_transactions())
    }
}

impl State {
    fn check_reachable(&self) -> LedgerResult<()> {
        if self.reachable {
            Ok(())
        } else {
            Err(LedgerError::Network("connection refused".into()))
        }
    }

    fn find_mut(&mut self, id: &str) -> LedgerResult<&mut Transaction> {
        self.transactions
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| LedgerError::Validation(format!("transaction {id} not found")))
    }
}

#[async_trait::async_trait]
impl Ledger for TestLedger {
    async fn create(
        &self,
        payload: &NewTransaction,
        idempotency_key: Option<&str>,
    ) -> LedgerResult<Transaction> {
        self.pause().await;
        let mut state = self.lock();
        state.create_calls += 1;
        state.check_reachable()?;
        payload.validate()?;

        if let Some(key) = idempotency_key {
            let existing = state.keys.get(key).cloned();
            if let Some(id) = existing {
                return state.find_mut(&id).cloned();
            }
        }

        let fault = state.faults.get(&payload.description).cloned();
        if let Some(Fault::Reject(error)) = fault {
            return Err(error);
        }

        let transaction = Transaction {
            id: state.next_id.to_string(),
            amount: payload.amount,
            description: payload.description.clone(),
            category: category(&payload.category_id),
            r#type: payload.r#type,
            date: payload.date,
            created_at: Utc::now(),
        };
        state.next_id += 1;
        if let Some(key) = idempotency_key {
            state.keys.insert(key.to_string(), transaction.id.clone());
        }
        state.transactions.push(transaction.clone());

        match fault {
            Some(Fault::LoseResponse) => {
                Err(LedgerError::Network("connection reset by peer".into()))
            }
            _ => Ok(transaction),
        }
    }

    async fn list(&self, filters: &ListFilters) -> LedgerResult<TransactionPage> {
        self.pause().await;
        let mut state = self.lock();
        state.list_calls += 1;
        state.check_reachable()?;

        let mut matching: Vec<Transaction> = state
            .transactions
            .iter()
            .filter(|t| filters.matches(t))
            .cloned()
            .collect();
        matching.sort_by(|a, b| {
            b.date
                .cmp(&a.date)
                .then_with(|| b.created_at.cmp(&a.created_at))
        });

        let limit = filters.limit.max(1) as usize;
        let page = filters.page.max(1);
        let total_items = matching.len();
        let total_pages = total_items.div_ceil(limit).max(1);
        let transactions = matching
            .into_iter()
            .skip((page as usize - 1) * limit)
            .take(limit)
            .collect();
        Ok(TransactionPage {
            transactions,
            pagination: Pagination {
                total_pages: u32::try_from(total_pages).unwrap_or(u32::MAX),
                current_page: page,
                total_items: total_items as u64,
            },
        })
    }

    async fn update(&self, id: &str, patch: &TransactionPatch) -> LedgerResult<Transaction> {
        self.pause().await;
        let mut state = self.lock();
        state.check_reachable()?;
        patch.validate()?;

        let transaction = state.find_mut(id)?;
        if let Some(description) = &patch.description {
            transaction.description = description.trim().to_string();
        }
        if let Some(amount) = patch.amount {
            transaction.amount = amount;
        }
        if let Some(category_id) = &patch.category_id {
            transaction.category = category(category_id);
        }
        if let Some(t) = patch.r#type {
            transaction.r#type = t;
        }
        if let Some(date) = patch.date {
            transaction.date = date;
        }
        Ok(transaction.clone())
    }

    async fn delete(&self, id: &str) -> LedgerResult<()> {
        self.pause().await;
        let mut state = self.lock();
        state.check_reachable()?;
        state.find_mut(id)?;
        state.transactions.retain(|t| t.id != id);
        Ok(())
    }
}

/// Resolves a category id against the seed categories. Unknown ids keep the id as the name.
fn category(id: &str) -> Category {
    let name = CATEGORIES
        .iter()
        .find(|(known, _)| *known == id)
        .map_or(id, |(_, name)| name);
    Category {
        id: Some(id.to_string()),
        name: name.to_string(),
    }
}

const CATEGORIES: &[(&str, &str)] = &[
    ("1", "Salary"),
    ("2", "Food"),
    ("3", "Entertainment"),
    ("4", "Side Income"),
    ("5", "Utilities"),
];

fn seed_transactions() -> Vec<Transaction> {
    serde_json::from_str(SEED_DATA).unwrap_or_default()
}

/// Seed transaction data, in the shape the API returns.
const SEED_DATA: &str = r#"[
  {"id": "1", "amount": 1200, "description": "Salary payment", "category": {"id": "1", "name": "Salary"},
   "type": "income", "date": "2023-12-05", "createdAt": "2023-12-05T09:30:00Z"},
  {"id": "2", "amount": 45, "description": "Grocery shopping", "category": {"id": "2", "name": "Food"},
   "type": "expense", "date": "2023-12-05", "createdAt": "2023-12-05T14:20:00Z"},
  {"id": "3", "amount": 30, "description": "Netflix subscription", "category": {"id": "3", "name": "Entertainment"},
   "type": "expense", "date": "2023-12-04", "createdAt": "2023-12-04T18:00:00Z"},
  {"id": "4", "amount": 200, "description": "Freelance work", "category": {"id": "4", "name": "Side Income"},
   "type": "income", "date": "2023-12-03", "createdAt": "2023-12-03T15:30:00Z"},
  {"id": "5", "amount": 60, "description": "Electric bill", "category": {"id": "5", "name": "Utilities"},
   "type": "expense", "date": "2023-12-02", "createdAt": "2023-12-02T11:45:00Z"}
]"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::model::{Amount, TransactionType};
    use crate::test::payload;
    use std::str::FromStr;

    #[test]
    fn test_seed_data_parses() {
        let ledger = TestLedger::default();
        let transactions = ledger.transactions();
        assert_eq!(transactions.len(), 5);
        assert_eq!(transactions[0].description, "Salary payment");
        assert_eq!(transactions[0].r#type, TransactionType::Income);
        assert_eq!(transactions[4].category.name, "Utilities");
    }

    #[tokio::test]
    async fn test_create_assigns_next_id() {
        let ledger = TestLedger::default();
        let created = ledger.create(&payload("Coffee"), None).await.unwrap();
        assert_eq!(created.id, "6");
        assert_eq!(created.category.name, "Food");
        assert_eq!(ledger.create_calls(), 1);
    }

    #[tokio::test]
    async fn test_idempotency_key_prevents_duplicates() {
        let ledger = TestLedger::empty();
        let first = ledger.create(&payload("Rent"), Some("k1")).await.unwrap();
        let second = ledger.create(&payload("Rent"), Some("k1")).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(ledger.transactions().len(), 1);
        assert_eq!(ledger.create_calls(), 2);
    }

    #[tokio::test]
    async fn test_unreachable_fails_with_network_error() {
        let ledger = TestLedger::empty();
        ledger.set_reachable(false);
        let err = ledger.create(&payload("Rent"), None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Network);
        assert!(ledger.transactions().is_empty());

        ledger.set_reachable(true);
        assert!(ledger.create(&payload("Rent"), None).await.is_ok());
    }

    #[tokio::test]
    async fn test_scripted_faults() {
        let ledger = TestLedger::empty();
        ledger.fail_on("Bad", LedgerError::Validation("category does not exist".into()));
        ledger.lose_response_on("Lost");

        let err = ledger.create(&payload("Bad"), None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        let err = ledger.create(&payload("Lost"), Some("k")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Network);
        // The lost create was stored and the retry with the same key finds it
        assert_eq!(ledger.transactions().len(), 1);
        ledger.clear_faults();
        ledger.create(&payload("Lost"), Some("k")).await.unwrap();
        assert_eq!(ledger.transactions().len(), 1);
    }

    #[tokio::test]
    async fn test_list_filters_and_paginates() {
        let ledger = TestLedger::default();
        let page = ledger.list(&ListFilters::first_page(2)).await.unwrap();
        assert_eq!(page.transactions.len(), 2);
        assert_eq!(page.pagination.total_pages, 3);
        assert_eq!(page.pagination.total_items, 5);
        // Newest first
        assert_eq!(page.transactions[0].description, "Grocery shopping");

        let filters = ListFilters {
            r#type: Some(TransactionType::Income),
            ..Default::default()
        };
        let page = ledger.list(&filters).await.unwrap();
        assert_eq!(page.transactions.len(), 2);
        assert!(page
            .transactions
            .iter()
            .all(|t| t.r#type == TransactionType::Income));
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let ledger = TestLedger::default();
        let patch = TransactionPatch {
            amount: Some(Amount::from_str("50").unwrap()),
            ..Default::default()
        };
        let updated = ledger.update("2", &patch).await.unwrap();
        assert_eq!(updated.amount, Amount::from_str("50").unwrap());
        assert_eq!(updated.description, "Grocery shopping");

        ledger.delete("2").await.unwrap();
        assert_eq!(ledger.transactions().len(), 4);
        let err = ledger.delete("2").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
}
