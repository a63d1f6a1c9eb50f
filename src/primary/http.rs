use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde_json::{json, Map, Value};
use url::Url;

use crate::store::config::TokenFetcher;
use crate::store::document::Document;
use crate::store::error::{
    internal_error, invalid_argument, not_found, unauthorized, unavailable, StoreError,
    StoreErrorCode, StoreResult,
};
use crate::store::path::ResourcePath;
use crate::store::query::{Filter, OrderDirection};
use crate::store::translate::PrimaryQuery;

use super::PrimaryBackend;

/// Retry policy for transient failures. Only `store/unavailable` outcomes
/// (transport errors, 5xx) are retried; everything else surfaces on the
/// first attempt.
#[derive(Clone, Debug)]
pub struct RetrySettings {
    pub max_attempts: usize,
    pub initial_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_delay: Duration::from_millis(100),
            multiplier: 2.0,
            max_delay: Duration::from_secs(2),
        }
    }
}

impl RetrySettings {
    fn should_retry(&self, attempt: usize, error: &StoreError) -> bool {
        attempt + 1 < self.max_attempts && error.code == StoreErrorCode::Unavailable
    }

    fn backoff_delay(&self, attempt: usize) -> Duration {
        let scaled = self.initial_delay.as_millis() as f64 * self.multiplier.powi(attempt as i32);
        Duration::from_millis(scaled as u64).min(self.max_delay)
    }
}

/// REST client for the primary document store.
///
/// Dialect: documents live at `<base>/<collection>/<id>` as
/// `{"id", "fields"}` resources; queries POST the full specification to
/// `<base>/<collection>:query` and receive an array of document resources.
pub struct HttpPrimaryBackend {
    client: Client,
    base_url: Url,
    token_fetcher: Option<TokenFetcher>,
    retry: RetrySettings,
}

impl HttpPrimaryBackend {
    pub fn new(raw_url: &str) -> StoreResult<Self> {
        let mut url = Url::parse(raw_url)
            .map_err(|err| invalid_argument(format!("Invalid primary store URL '{raw_url}': {err}")))?;
        if !url.path().ends_with('/') {
            let mut path = url.path().trim_end_matches('/').to_owned();
            path.push('/');
            url.set_path(&path);
        }
        Ok(Self {
            client: Client::new(),
            base_url: url,
            token_fetcher: None,
            retry: RetrySettings::default(),
        })
    }

    pub fn with_token_fetcher(mut self, fetcher: TokenFetcher) -> Self {
        self.token_fetcher = Some(fetcher);
        self
    }

    pub fn with_retry(mut self, retry: RetrySettings) -> Self {
        self.retry = retry;
        self
    }

    fn url_for(&self, relative: &str) -> StoreResult<Url> {
        self.base_url
            .join(relative)
            .map_err(|err| internal_error(format!("Failed to compose primary store URL: {err}")))
    }

    async fn send_once(
        &self,
        method: Method,
        relative: &str,
        body: Option<&Value>,
    ) -> StoreResult<(StatusCode, Value)> {
        let url = self.url_for(relative)?;
        let mut request = self.client.request(method, url);
        if let Some(fetcher) = &self.token_fetcher {
            if let Some(token) = fetcher()? {
                request = request.bearer_auth(token);
            }
        }
        if let Some(payload) = body {
            request = request.json(payload);
        }
        let response = request
            .send()
            .await
            .map_err(|err| unavailable(format!("Primary store request failed: {err}")))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|err| unavailable(format!("Primary store response unreadable: {err}")))?;
        let value = serde_json::from_str(&text).unwrap_or(Value::Null);
        Ok((status, value))
    }

    async fn request(
        &self,
        method: Method,
        relative: &str,
        body: Option<&Value>,
    ) -> StoreResult<(StatusCode, Value)> {
        let mut attempt = 0usize;
        loop {
            let outcome = match self.send_once(method.clone(), relative, body).await {
                Ok((status, value)) if status.is_server_error() => {
                    Err(status_error(status, &value))
                }
                other => other,
            };
            match outcome {
                Ok(result) => return Ok(result),
                Err(err) => {
                    if !self.retry.should_retry(attempt, &err) {
                        return Err(err);
                    }
                    tokio::time::sleep(self.retry.backoff_delay(attempt)).await;
                    attempt += 1;
                }
            }
        }
    }
}

fn status_error(status: StatusCode, body: &Value) -> StoreError {
    let message = body
        .get("error")
        .and_then(Value::as_str)
        .map(str::to_string);
    match status {
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            invalid_argument(message.unwrap_or_else(|| "Invalid request payload".to_string()))
        }
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            unauthorized(message.unwrap_or_else(|| "Permission denied".to_string()))
        }
        StatusCode::NOT_FOUND => {
            not_found(message.unwrap_or_else(|| "Resource not found".to_string()))
        }
        _ => unavailable(format!(
            "Primary store request failed with status {}{}",
            status.as_str(),
            message.map(|m| format!(": {m}")).unwrap_or_default()
        )),
    }
}

fn decode_fields(value: &Value) -> StoreResult<Map<String, Value>> {
    value
        .get("fields")
        .and_then(Value::as_object)
        .cloned()
        .ok_or_else(|| internal_error("Primary store document is missing a fields object"))
}

fn encode_query(query: &PrimaryQuery) -> Value {
    let filters: Vec<Value> = query
        .filters
        .iter()
        .map(|filter: &Filter| {
            json!({
                "field": filter.field(),
                "op": filter.operator().as_str(),
                "value": filter.value(),
            })
        })
        .collect();
    let direction = match query.direction {
        OrderDirection::Ascending => "asc",
        OrderDirection::Descending => "desc",
    };
    json!({
        "filters": filters,
        "orderBy": query.order_by,
        "direction": direction,
        "limit": query.limit,
    })
}

#[async_trait]
impl PrimaryBackend for HttpPrimaryBackend {
    async fn get_document(&self, path: &ResourcePath) -> StoreResult<Option<Map<String, Value>>> {
        let (status, body) = self
            .request(Method::GET, &path.canonical_string(), None)
            .await?;
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(status_error(status, &body));
        }
        decode_fields(&body).map(Some)
    }

    async fn set_document(
        &self,
        path: &ResourcePath,
        fields: Map<String, Value>,
    ) -> StoreResult<()> {
        let payload = json!({ "fields": fields });
        let (status, body) = self
            .request(Method::PUT, &path.canonical_string(), Some(&payload))
            .await?;
        if !status.is_success() {
            return Err(status_error(status, &body));
        }
        Ok(())
    }

    async fn update_document(
        &self,
        path: &ResourcePath,
        patch: Map<String, Value>,
    ) -> StoreResult<()> {
        let payload = json!({ "fields": patch });
        let (status, body) = self
            .request(Method::PATCH, &path.canonical_string(), Some(&payload))
            .await?;
        if status == StatusCode::NOT_FOUND {
            return Err(not_found(format!(
                "Document {} does not exist",
                path.canonical_string()
            )));
        }
        if !status.is_success() {
            return Err(status_error(status, &body));
        }
        Ok(())
    }

    async fn delete_document(&self, path: &ResourcePath) -> StoreResult<()> {
        let (status, body) = self
            .request(Method::DELETE, &path.canonical_string(), None)
            .await?;
        if status == StatusCode::NOT_FOUND {
            return Ok(());
        }
        if !status.is_success() {
            return Err(status_error(status, &body));
        }
        Ok(())
    }

    async fn run_query(&self, query: &PrimaryQuery) -> StoreResult<Vec<Document>> {
        let relative = format!("{}:query", query.collection.canonical_string());
        let payload = encode_query(query);
        let (status, body) = self.request(Method::POST, &relative, Some(&payload)).await?;
        if !status.is_success() {
            return Err(status_error(status, &body));
        }
        let entries = body
            .as_array()
            .ok_or_else(|| internal_error("Primary store query response must be an array"))?;
        let mut documents = Vec::with_capacity(entries.len());
        for entry in entries {
            let id = entry
                .get("id")
                .and_then(Value::as_str)
                .ok_or_else(|| internal_error("Primary store query result is missing an id"))?;
            documents.push(Document::new(id, decode_fields(entry)?));
        }
        Ok(documents)
    }
}
