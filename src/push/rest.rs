use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde_json::{Map, Value};
use url::Url;

use crate::store::config::TokenFetcher;
use crate::store::error::{
    internal_error, invalid_argument, unauthorized, unavailable, StoreError, StoreResult,
};
use crate::store::path::ResourcePath;

use super::PushBackend;

/// REST client for the push store's tree dialect: every node is addressable
/// as `<base>/<path>.json`, writes pass `print=silent`, and reads accept the
/// native query parameters verbatim. Missing nodes read as `null` and
/// deletes of missing nodes succeed.
pub struct RestPushBackend {
    client: Client,
    base_url: Url,
    base_query: Vec<(String, String)>,
    token_fetcher: Option<TokenFetcher>,
}

impl RestPushBackend {
    pub fn new(raw_url: &str) -> StoreResult<Self> {
        let mut url = Url::parse(raw_url)
            .map_err(|err| invalid_argument(format!("Invalid push store URL '{raw_url}': {err}")))?;

        // A trailing slash keeps joins predictable.
        if !url.path().ends_with('/') {
            let mut path = url.path().trim_end_matches('/').to_owned();
            path.push('/');
            url.set_path(&path);
        }

        let base_query: Vec<(String, String)> = url
            .query_pairs()
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect();
        url.set_query(None);

        Ok(Self {
            client: Client::new(),
            base_url: url,
            base_query,
            token_fetcher: None,
        })
    }

    pub fn with_token_fetcher(mut self, fetcher: TokenFetcher) -> Self {
        self.token_fetcher = Some(fetcher);
        self
    }

    fn url_for(&self, path: &ResourcePath, query: &[(String, String)]) -> StoreResult<Url> {
        let relative = format!("{}.json", path.canonical_string());
        let mut url = self
            .base_url
            .join(&relative)
            .map_err(|err| internal_error(format!("Failed to compose push store URL: {err}")))?;

        let token = match &self.token_fetcher {
            Some(fetcher) => fetcher()?,
            None => None,
        };

        {
            let mut pairs = url.query_pairs_mut();
            pairs.clear();
            for (key, value) in self.base_query.iter().chain(query.iter()) {
                pairs.append_pair(key, value);
            }
            if let Some(token) = token {
                pairs.append_pair("auth", &token);
            }
        }

        Ok(url)
    }

    async fn send(
        &self,
        method: Method,
        path: &ResourcePath,
        query: &[(String, String)],
        body: Option<&Value>,
    ) -> StoreResult<(StatusCode, Value)> {
        let url = self.url_for(path, query)?;
        let mut request = self.client.request(method, url);
        if let Some(payload) = body {
            request = request.json(payload);
        }
        let response = request
            .send()
            .await
            .map_err(|err| unavailable(format!("Push store request failed: {err}")))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|err| unavailable(format!("Push store response unreadable: {err}")))?;
        let value = serde_json::from_str(&text).unwrap_or(Value::Null);
        Ok((status, value))
    }
}

fn status_error(status: StatusCode, body: &Value) -> StoreError {
    let message = body
        .get("error")
        .and_then(Value::as_str)
        .map(str::to_string);
    match status {
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            invalid_argument(message.unwrap_or_else(|| "Invalid data payload".to_string()))
        }
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            unauthorized(message.unwrap_or_else(|| "Permission denied".to_string()))
        }
        _ => unavailable(format!(
            "Push store request failed with status {}{}",
            status.as_str(),
            message.map(|m| format!(": {m}")).unwrap_or_default()
        )),
    }
}

fn write_params() -> Vec<(String, String)> {
    vec![("print".to_string(), "silent".to_string())]
}

#[async_trait]
impl PushBackend for RestPushBackend {
    async fn get(&self, path: &ResourcePath, query: &[(String, String)]) -> StoreResult<Value> {
        let (status, body) = self.send(Method::GET, path, query, None).await?;
        if status == StatusCode::NOT_FOUND {
            return Ok(Value::Null);
        }
        if !status.is_success() {
            return Err(status_error(status, &body));
        }
        Ok(body)
    }

    async fn set(&self, path: &ResourcePath, value: Value) -> StoreResult<()> {
        let (status, body) = self
            .send(Method::PUT, path, &write_params(), Some(&value))
            .await?;
        if !status.is_success() {
            return Err(status_error(status, &body));
        }
        Ok(())
    }

    async fn merge(&self, path: &ResourcePath, entries: Map<String, Value>) -> StoreResult<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let payload = Value::Object(entries);
        let (status, body) = self
            .send(Method::PATCH, path, &write_params(), Some(&payload))
            .await?;
        if !status.is_success() {
            return Err(status_error(status, &body));
        }
        Ok(())
    }

    async fn delete(&self, path: &ResourcePath) -> StoreResult<()> {
        let (status, body) = self
            .send(Method::DELETE, path, &write_params(), None)
            .await?;
        if status == StatusCode::NOT_FOUND {
            return Ok(());
        }
        if !status.is_success() {
            return Err(status_error(status, &body));
        }
        Ok(())
    }
}
