use crate::config::DEFAULT_PAGE_SIZE;
use crate::model::{Transaction, TransactionType};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Query options for listing ledger transactions.
///
/// The filters are sent to the server as query parameters and can also be applied locally with
/// `matches`, which is how pending (not yet synced) entries get filtered for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListFilters {
    pub page: u32,
    pub limit: u32,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub r#type: Option<TransactionType>,
    /// Category name or id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Case-insensitive substring of the description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    /// Inclusive lower bound on the transaction date.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<NaiveDate>,
    /// Inclusive upper bound on the transaction date.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<NaiveDate>,
}

impl Default for ListFilters {
    fn default() -> Self {
        Self {
            page: 1,
            limit: DEFAULT_PAGE_SIZE,
            r#type: None,
            category: None,
            search: None,
            from: None,
            to: None,
        }
    }
}

impl ListFilters {
    /// The first page with the given page size and no filters. This is the "full re-fetch"
    /// issued after a successful drain.
    pub fn first_page(limit: u32) -> Self {
        Self {
            limit,
            ..Default::default()
        }
    }

    /// Query parameters for `GET /transactions`, excluding `userId`.
    pub(crate) fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![("page", self.page.to_string()), ("limit", self.limit.to_string())];
        if let Some(t) = self.r#type {
            pairs.push(("type", t.to_string()));
        }
        if let Some(category) = &self.category {
            pairs.push(("category", category.clone()));
        }
        if let Some(search) = &self.search {
            pairs.push(("search", search.clone()));
        }
        if let Some(from) = self.from {
            pairs.push(("startDate", from.to_string()));
        }
        if let Some(to) = self.to {
            pairs.push(("endDate", to.to_string()));
        }
        pairs
    }

    /// Applies the filters to a confirmed transaction.
    pub fn matches(&self, t: &Transaction) -> bool {
        let category_ok = match &self.category {
            None => true,
            Some(c) => &t.category.name == c || t.category.id.as_deref() == Some(c.as_str()),
        };
        category_ok && self.matches_fields(&t.description, t.r#type, t.date)
    }

    /// Applies the filters to the fields shared by confirmed and pending transactions. Pending
    /// entries only know their category id, so the category filter is applied by the caller.
    pub(crate) fn matches_fields(
        &self,
        description: &str,
        r#type: TransactionType,
        date: NaiveDate,
    ) -> bool {
        if let Some(search) = &self.search {
            if !description.to_lowercase().contains(&search.to_lowercase()) {
                return false;
            }
        }
        if self.r#type.is_some_and(|t| t != r#type) {
            return false;
        }
        if self.from.is_some_and(|from| date < from) {
            return false;
        }
        if self.to.is_some_and(|to| date > to) {
            return false;
        }
        true
    }
}
