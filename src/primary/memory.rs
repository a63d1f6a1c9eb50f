use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::store::document::Document;
use crate::store::emulator::{satisfies_all, sort_documents};
use crate::store::error::{not_found, StoreResult};
use crate::store::path::ResourcePath;
use crate::store::translate::PrimaryQuery;

use super::PrimaryBackend;

/// Document store held in a canonical-path map. The default backend when no
/// primary base URL is configured, and the workhorse for tests.
#[derive(Clone, Default)]
pub struct InMemoryPrimaryBackend {
    documents: Arc<Mutex<BTreeMap<String, Map<String, Value>>>>,
}

impl InMemoryPrimaryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PrimaryBackend for InMemoryPrimaryBackend {
    async fn get_document(&self, path: &ResourcePath) -> StoreResult<Option<Map<String, Value>>> {
        let documents = self.documents.lock().unwrap();
        Ok(documents.get(&path.canonical_string()).cloned())
    }

    async fn set_document(
        &self,
        path: &ResourcePath,
        fields: Map<String, Value>,
    ) -> StoreResult<()> {
        let mut documents = self.documents.lock().unwrap();
        documents.insert(path.canonical_string(), fields);
        Ok(())
    }

    async fn update_document(
        &self,
        path: &ResourcePath,
        patch: Map<String, Value>,
    ) -> StoreResult<()> {
        let mut documents = self.documents.lock().unwrap();
        let canonical = path.canonical_string();
        let Some(existing) = documents.get_mut(&canonical) else {
            return Err(not_found(format!("Document {canonical} does not exist")));
        };
        for (key, value) in patch {
            existing.insert(key, value);
        }
        Ok(())
    }

    async fn delete_document(&self, path: &ResourcePath) -> StoreResult<()> {
        let mut documents = self.documents.lock().unwrap();
        documents.remove(&path.canonical_string());
        Ok(())
    }

    async fn run_query(&self, query: &PrimaryQuery) -> StoreResult<Vec<Document>> {
        let prefix = format!("{}/", query.collection.canonical_string());
        let mut results: Vec<Document> = {
            let documents = self.documents.lock().unwrap();
            documents
                .iter()
                .filter_map(|(canonical, fields)| {
                    let id = canonical.strip_prefix(&prefix)?;
                    if id.contains('/') {
                        // Deeper paths belong to subcollections, not to this
                        // collection's direct documents.
                        return None;
                    }
                    Some(Document::new(id, fields.clone()))
                })
                .collect()
        };

        results.retain(|document| satisfies_all(document, &query.filters));
        sort_documents(&mut results, query.order_by.as_deref(), query.direction);
        if let Some(limit) = query.limit {
            results.truncate(limit as usize);
        }
        Ok(results)
    }
}
