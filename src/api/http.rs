//! Implements the `Ledger` trait over the MoneyTalk REST API using `reqwest`.

use crate::api::{Ledger, LedgerResult};
use crate::error::LedgerError;
use crate::model::{ListFilters, NewTransaction, Transaction, TransactionPage, TransactionPatch};
use crate::Result;
use anyhow::Context;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::trace;
use url::Url;

const IDEMPOTENCY_KEY: &str = "Idempotency-Key";

/// Talks to `POST/GET /transactions` and `PUT/DELETE /transactions/{id}` under the configured
/// base URL. Every request is bounded by the configured timeout; a request that times out is a
/// `Network` failure.
pub struct HttpLedger {
    client: reqwest::Client,
    base: Url,
    user_id: String,
    token: Option<String>,
}

impl HttpLedger {
    pub fn new(
        api_url: &str,
        user_id: impl Into<String>,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Unable to build the HTTP client")?;
        Ok(Self {
            client,
            base: base_url(api_url)?,
            user_id: user_id.into(),
            token,
        })
    }

    fn url(&self, path: &str) -> LedgerResult<Url> {
        self.base
            .join(path)
            .map_err(|e| LedgerError::Validation(format!("invalid request path '{path}': {e}")))
    }

    async fn send(&self, request: RequestBuilder) -> LedgerResult<Response> {
        let request = match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        };
        let response = request
            .send()
            .await
            .map_err(|e| LedgerError::Network(e.to_string()))?;
        let status = response.status();
        trace!("Ledger responded with {status}");
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(LedgerError::from_status(
            status.as_u16(),
            error_message(status, &body),
        ))
    }
}

#[async_trait::async_trait]
impl Ledger for HttpLedger {
    async fn create(
        &self,
        payload: &NewTransaction,
        idempotency_key: Option<&str>,
    ) -> LedgerResult<Transaction> {
        let mut request = self.client.post(self.url("transactions")?).json(payload);
        if let Some(key) = idempotency_key {
            request = request.header(IDEMPOTENCY_KEY, key);
        }
        decode(self.send(request).await?).await
    }

    async fn list(&self, filters: &ListFilters) -> LedgerResult<TransactionPage> {
        let mut query = filters.query_pairs();
        query.push(("userId", self.user_id.clone()));
        let request = self.client.get(self.url("transactions")?).query(&query);
        decode(self.send(request).await?).await
    }

    async fn update(&self, id: &str, patch: &TransactionPatch) -> LedgerResult<Transaction> {
        let request = self
            .client
            .put(self.url(&format!("transactions/{id}"))?)
            .json(patch);
        decode(self.send(request).await?).await
    }

    async fn delete(&self, id: &str) -> LedgerResult<()> {
        let request = self.client.delete(self.url(&format!("transactions/{id}"))?);
        // The body, if any, carries nothing we need
        self.send(request).await?;
        Ok(())
    }
}

/// Parses the API base URL and makes sure relative joins append to its path instead of replacing
/// the last segment.
pub(crate) fn base_url(api_url: &str) -> Result<Url> {
    let mut url =
        Url::parse(api_url).with_context(|| format!("Invalid API URL '{api_url}'"))?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

async fn decode<T: DeserializeOwned>(response: Response) -> LedgerResult<T> {
    let status = response.status().as_u16();
    response.json::<T>().await.map_err(|e| LedgerError::Server {
        status,
        message: format!("unreadable response body: {e}"),
    })
}

/// The shapes of error bodies the API is known to send.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    error: Option<String>,
    message: Option<String>,
    errors: Option<serde_json::Value>,
}

/// Picks the most specific message from an error response.
fn error_message(status: StatusCode, body: &str) -> String {
    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
    parsed
        .error
        .or(parsed.message)
        .or_else(|| parsed.errors.as_ref().and_then(first_error))
        .or_else(|| {
            let trimmed = body.trim();
            (!trimmed.is_empty() && trimmed.len() <= 200).then(|| trimmed.to_string())
        })
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("unknown error")
                .to_string()
        })
}

/// `errors` is either a list of messages or a map of field name to message(s).
fn first_error(errors: &serde_json::Value) -> Option<String> {
    use serde_json::Value;
    let first = match errors {
        Value::Array(items) => items.first()?,
        Value::Object(fields) => fields.values().next()?,
        Value::String(s) => return Some(s.clone()),
        _ => return None,
    };
    match first {
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => items.first()?.as_str().map(str::to_string),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_base_url_keeps_path_prefix() {
        let url = base_url("https://api.moneytalk.com/api").unwrap();
        assert_eq!(
            url.join("transactions").unwrap().as_str(),
            "https://api.moneytalk.com/api/transactions"
        );
        let url = base_url("http://localhost:3000/").unwrap();
        assert_eq!(
            url.join("transactions/7").unwrap().as_str(),
            "http://localhost:3000/transactions/7"
        );
        assert!(base_url("not a url").is_err());
    }

    #[test]
    fn test_error_message_prefers_error_field() {
        let msg = error_message(
            StatusCode::UNPROCESSABLE_ENTITY,
            r#"{"error": "La categoría especificada no existe"}"#,
        );
        assert_eq!(msg, "La categoría especificada no existe");
    }

    #[test]
    fn test_error_message_from_field_errors() {
        let msg = error_message(
            StatusCode::UNPROCESSABLE_ENTITY,
            r#"{"errors": {"amount": ["must be positive"]}}"#,
        );
        assert_eq!(msg, "must be positive");
    }

    #[test]
    fn test_error_message_falls_back_to_status() {
        assert_eq!(
            error_message(StatusCode::INTERNAL_SERVER_ERROR, ""),
            "Internal Server Error"
        );
        assert_eq!(error_message(StatusCode::BAD_GATEWAY, "upstream down"), "upstream down");
    }

    #[tokio::test]
    async fn test_unreachable_server_is_a_network_error() {
        // Nothing listens on port 9 (discard) on loopback in a test environment
        let ledger = HttpLedger::new(
            "http://127.0.0.1:9/api",
            "1",
            None,
            Duration::from_secs(2),
        )
        .unwrap();
        let err = ledger.list(&ListFilters::default()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Network);
    }
}
