use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::store::document::Document;
use crate::store::error::StoreResult;
use crate::store::path::ResourcePath;
use crate::store::translate::PrimaryQuery;

mod http;
mod memory;

pub use http::{HttpPrimaryBackend, RetrySettings};
pub use memory::InMemoryPrimaryBackend;

/// The strongly-queryable document store. The whole query specification runs
/// natively here; `update_document` requires the target to exist.
#[async_trait]
pub trait PrimaryBackend: Send + Sync + 'static {
    async fn get_document(&self, path: &ResourcePath) -> StoreResult<Option<Map<String, Value>>>;
    async fn set_document(&self, path: &ResourcePath, fields: Map<String, Value>)
        -> StoreResult<()>;
    async fn update_document(&self, path: &ResourcePath, patch: Map<String, Value>)
        -> StoreResult<()>;
    async fn delete_document(&self, path: &ResourcePath) -> StoreResult<()>;
    async fn run_query(&self, query: &PrimaryQuery) -> StoreResult<Vec<Document>>;
}
