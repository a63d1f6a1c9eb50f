use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::store::error::StoreResult;
use crate::store::path::ResourcePath;

mod memory;
mod push_id;
mod rest;

pub use memory::InMemoryPushBackend;
pub use rest::RestPushBackend;

pub(crate) use push_id::next_push_id;

/// The tree-shaped realtime store. Reads return the raw JSON subtree at a
/// path (`Null` when absent — absence is not an error here); `merge` writes
/// children under a path and creates the path when missing.
///
/// `query` carries the native parameter list produced by the translator:
/// `orderBy`, `equalTo`, `limitToFirst`, `limitToLast`.
#[async_trait]
pub trait PushBackend: Send + Sync + 'static {
    async fn get(&self, path: &ResourcePath, query: &[(String, String)]) -> StoreResult<Value>;
    async fn set(&self, path: &ResourcePath, value: Value) -> StoreResult<()>;
    async fn merge(&self, path: &ResourcePath, entries: Map<String, Value>) -> StoreResult<()>;
    async fn delete(&self, path: &ResourcePath) -> StoreResult<()>;
}
