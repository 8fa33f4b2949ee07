use crate::error::LedgerError;
use crate::model::Amount;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Whether money came in or went out.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    clap::ValueEnum,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionType {
    #[serde(alias = "income")]
    Income,
    #[serde(alias = "expense")]
    Expense,
}

serde_plain::derive_display_from_serialize!(TransactionType);
serde_plain::derive_fromstr_from_deserialize!(TransactionType);

/// A category as the ledger reports it. Writes reference categories by id; reads carry the
/// denormalized name and, when the server resolved it, the id as well.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "CategoryWire")]
pub struct Category {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
}

/// The ledger sends either a bare name (`"Food"`) or an object (`{"id": 3, "name": "Food"}`).
#[derive(Deserialize)]
#[serde(untagged)]
enum CategoryWire {
    Name(String),
    Object {
        #[serde(default, deserialize_with = "opt_string_or_number")]
        id: Option<String>,
        name: String,
    },
}

impl From<CategoryWire> for Category {
    fn from(value: CategoryWire) -> Self {
        match value {
            CategoryWire::Name(name) => Category { id: None, name },
            CategoryWire::Object { id, name } => Category { id, name },
        }
    }
}

/// A transaction that has been accepted by the ledger. The `id` is assigned by the server and
/// never changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub amount: Amount,
    pub description: String,
    pub category: Category,
    #[serde(rename = "type")]
    pub r#type: TransactionType,
    #[serde(deserialize_with = "lenient_date")]
    pub date: NaiveDate,
    pub created_at: DateTime<Utc>,
}

/// The body of `POST /transactions`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTransaction {
    pub description: String,
    pub amount: Amount,
    pub category_id: String,
    #[serde(rename = "type")]
    pub r#type: TransactionType,
    pub date: NaiveDate,
    pub user_id: String,
}

impl NewTransaction {
    /// Checks the payload before it is sent anywhere. A payload that fails here is never
    /// enqueued: it would be rejected on every retry.
    pub fn validate(&self) -> std::result::Result<(), LedgerError> {
        if self.user_id.trim().is_empty() {
            return Err(LedgerError::Validation("user id is missing".into()));
        }
        if self.category_id.trim().is_empty() {
            return Err(LedgerError::Validation("category id is missing".into()));
        }
        if !self.amount.is_positive() {
            return Err(LedgerError::Validation(format!(
                "amount must be greater than zero, got {}",
                self.amount
            )));
        }
        if !self.amount.fits_json_number() {
            return Err(LedgerError::Validation(format!(
                "amount {} has more digits than the API can store",
                self.amount.value()
            )));
        }
        if self.description.trim().is_empty() {
            return Err(LedgerError::Validation("description is required".into()));
        }
        Ok(())
    }

    /// Returns the payload with surrounding whitespace removed from text fields.
    pub fn normalized(mut self) -> Self {
        self.description = self.description.trim().to_string();
        self.category_id = self.category_id.trim().to_string();
        self
    }
}

/// The body of `PUT /transactions/{id}`. Only the fields that are `Some` are sent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<Amount>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_id: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub r#type: Option<TransactionType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
}

impl TransactionPatch {
    pub fn is_empty(&self) -> bool {
        self == &TransactionPatch::default()
    }

    pub fn validate(&self) -> std::result::Result<(), LedgerError> {
        if self.is_empty() {
            return Err(LedgerError::Validation("nothing to update".into()));
        }
        if let Some(amount) = &self.amount {
            if !amount.is_positive() {
                return Err(LedgerError::Validation(format!(
                    "amount must be greater than zero, got {amount}"
                )));
            }
            if !amount.fits_json_number() {
                return Err(LedgerError::Validation(format!(
                    "amount {} has more digits than the API can store",
                    amount.value()
                )));
            }
        }
        if let Some(description) = &self.description {
            if description.trim().is_empty() {
                return Err(LedgerError::Validation("description is required".into()));
            }
        }
        Ok(())
    }
}

/// One page of `GET /transactions`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionPage {
    pub transactions: Vec<Transaction>,
    #[serde(default)]
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub total_pages: u32,
    pub current_page: u32,
    pub total_items: u64,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            total_pages: 1,
            current_page: 1,
            total_items: 0,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StringOrNumber {
    String(String),
    Signed(i64),
    Unsigned(u64),
}

impl From<StringOrNumber> for String {
    fn from(value: StringOrNumber) -> Self {
        match value {
            StringOrNumber::String(s) => s,
            StringOrNumber::Signed(n) => n.to_string(),
            StringOrNumber::Unsigned(n) => n.to_string(),
        }
    }
}

/// Ids are strings in this crate but some ledgers send integer primary keys.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(StringOrNumber::deserialize(deserializer)?.into())
}

fn opt_string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<StringOrNumber>::deserialize(deserializer)?.map(String::from))
}

/// Accepts `2023-12-05` as well as a full timestamp such as `2023-12-05T00:00:00.000Z`.
fn lenient_date<'de, D>(deserializer: D) -> Result<NaiveDate, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    let day = s.get(..10).unwrap_or(&s);
    NaiveDate::parse_from_str(day, "%Y-%m-%d")
        .map_err(|e| serde::de::Error::custom(format!("invalid date '{s}': {e}")))
}
