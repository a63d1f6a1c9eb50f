use std::sync::Arc;

use crate::primary::{HttpPrimaryBackend, InMemoryPrimaryBackend, PrimaryBackend};
use crate::push::{InMemoryPushBackend, PushBackend, RestPushBackend};
use crate::store::error::StoreResult;
use crate::store::facade::DocumentStore;

/// Supplies the caller's session token to the REST backends. Token issuance
/// lives with the session collaborator; the store only asks for the current
/// value per request.
pub type TokenFetcher = Arc<dyn Fn() -> StoreResult<Option<String>> + Send + Sync>;

/// Explicit construction input for a [`DocumentStore`]. Built once at
/// process start and consumed; a backend with no configured URL runs in
/// memory. There is no ambient default instance.
#[derive(Clone, Default)]
pub struct StoreConfig {
    primary_url: Option<String>,
    push_url: Option<String>,
    token_fetcher: Option<TokenFetcher>,
}

impl StoreConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_primary_url(mut self, url: impl Into<String>) -> Self {
        self.primary_url = Some(url.into());
        self
    }

    pub fn with_push_url(mut self, url: impl Into<String>) -> Self {
        self.push_url = Some(url.into());
        self
    }

    pub fn with_token_fetcher(mut self, fetcher: TokenFetcher) -> Self {
        self.token_fetcher = Some(fetcher);
        self
    }

    pub fn build(self) -> StoreResult<DocumentStore> {
        let primary: Arc<dyn PrimaryBackend> = match &self.primary_url {
            Some(url) => {
                let mut backend = HttpPrimaryBackend::new(url)?;
                if let Some(fetcher) = &self.token_fetcher {
                    backend = backend.with_token_fetcher(Arc::clone(fetcher));
                }
                Arc::new(backend)
            }
            None => Arc::new(InMemoryPrimaryBackend::new()),
        };

        let push: Arc<dyn PushBackend> = match &self.push_url {
            Some(url) => {
                let mut backend = RestPushBackend::new(url)?;
                if let Some(fetcher) = &self.token_fetcher {
                    backend = backend.with_token_fetcher(Arc::clone(fetcher));
                }
                Arc::new(backend)
            }
            None => Arc::new(InMemoryPushBackend::new()),
        };

        Ok(DocumentStore::new(primary, push))
    }
}
