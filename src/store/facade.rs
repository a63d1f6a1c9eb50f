use std::sync::{Arc, LazyLock};

use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};
use serde_json::{Map, Value};

use crate::live::subscription::{SubscriptionHandle, SubscriptionManager};
use crate::logger::Logger;
use crate::primary::PrimaryBackend;
use crate::push::{next_push_id, PushBackend};
use crate::store::document::{
    documents_from_tree, normalize_timestamps, now_millis, stamp_create, stamp_update, Document,
    UPDATED_AT_FIELD,
};
use crate::store::emulator::{apply_residual_filters, sort_documents};
use crate::store::error::{internal_error, invalid_argument, not_found, StoreResult};
use crate::store::path::{PathResolver, ResourcePath};
use crate::store::query::{OrderDirection, QuerySpec};
use crate::store::translate::{translate_primary, translate_push};

static LOGGER: LazyLock<Logger> = LazyLock::new(|| Logger::new("@rentral/store"));

const COUNTERS_COLLECTION: &str = "counters";
const DOCUMENT_COUNT_FIELD: &str = "documentCount";

/// Which backend an operation targets. Call sites pick per operation; the
/// listings/application flows live on the primary store while messaging
/// lives on the push store.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StoreMode {
    #[default]
    Primary,
    Push,
}

/// The single entry point for document access. Holds one handle per backend,
/// both injected at construction; the facade itself is cheap to clone and
/// has no ambient global instance.
#[derive(Clone)]
pub struct DocumentStore {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    primary: Arc<dyn PrimaryBackend>,
    push: Arc<dyn PushBackend>,
    subscriptions: SubscriptionManager,
}

impl std::fmt::Debug for DocumentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentStore").finish_non_exhaustive()
    }
}

impl DocumentStore {
    pub fn new(primary: Arc<dyn PrimaryBackend>, push: Arc<dyn PushBackend>) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                primary,
                push,
                subscriptions: SubscriptionManager::new(),
            }),
        }
    }

    /// Both backends in memory; the configuration used by tests and local
    /// tooling.
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(crate::primary::InMemoryPrimaryBackend::new()),
            Arc::new(crate::push::InMemoryPushBackend::new()),
        )
    }

    /// Fetches one document.
    ///
    /// The two stores disagree about absence and the facade keeps the
    /// disagreement visible instead of papering over it: primary mode fails
    /// with `store/not-found`, push mode resolves to `Ok(None)` because the
    /// tree store reads a missing path as `null`, not as an error.
    pub async fn get(
        &self,
        collection: &str,
        id: &str,
        mode: StoreMode,
    ) -> StoreResult<Option<Document>> {
        let path = PathResolver::document(collection, id)?;
        self.get_at(&path, mode).await
    }

    pub async fn get_in_sub(
        &self,
        collection: &str,
        id: &str,
        subcollection: &str,
        sub_id: &str,
        mode: StoreMode,
    ) -> StoreResult<Option<Document>> {
        let path = PathResolver::document_in_sub(collection, id, subcollection, sub_id)?;
        self.get_at(&path, mode).await
    }

    /// Creates a document with a backend-minted id and returns it with the
    /// stamped audit fields.
    pub async fn add(
        &self,
        collection: &str,
        data: Map<String, Value>,
        mode: StoreMode,
    ) -> StoreResult<Document> {
        let id = mint_id(mode);
        self.add_with_id(collection, &id, data, mode).await
    }

    /// Creates (or overwrites — ids are honored verbatim, so this is an
    /// upsert) a document under a caller-supplied id.
    pub async fn add_with_id(
        &self,
        collection: &str,
        id: &str,
        data: Map<String, Value>,
        mode: StoreMode,
    ) -> StoreResult<Document> {
        let path = PathResolver::document(collection, id)?;
        let document = self.add_at(&path, data, mode).await?;
        self.bump_document_count(collection, mode).await;
        Ok(document)
    }

    pub async fn add_in_sub(
        &self,
        collection: &str,
        id: &str,
        subcollection: &str,
        data: Map<String, Value>,
        mode: StoreMode,
    ) -> StoreResult<Document> {
        let sub_id = mint_id(mode);
        let path = PathResolver::document_in_sub(collection, id, subcollection, &sub_id)?;
        self.add_at(&path, data, mode).await
    }

    pub async fn add_in_sub_with_id(
        &self,
        collection: &str,
        id: &str,
        subcollection: &str,
        sub_id: &str,
        data: Map<String, Value>,
        mode: StoreMode,
    ) -> StoreResult<Document> {
        let path = PathResolver::document_in_sub(collection, id, subcollection, sub_id)?;
        self.add_at(&path, data, mode).await
    }

    /// Applies a partial update and stamps `updatedAt`.
    ///
    /// Missing-target behavior is backend-dependent and preserved as such:
    /// the primary store fails with `store/not-found`, the push store
    /// creates the missing path. Call sites rely on both spellings; do not
    /// unify them.
    pub async fn update(
        &self,
        collection: &str,
        id: &str,
        patch: Map<String, Value>,
        mode: StoreMode,
    ) -> StoreResult<()> {
        let path = PathResolver::document(collection, id)?;
        self.update_at(&path, patch, mode).await
    }

    pub async fn update_in_sub(
        &self,
        collection: &str,
        id: &str,
        subcollection: &str,
        sub_id: &str,
        patch: Map<String, Value>,
        mode: StoreMode,
    ) -> StoreResult<()> {
        let path = PathResolver::document_in_sub(collection, id, subcollection, sub_id)?;
        self.update_at(&path, patch, mode).await
    }

    /// Deletes a document. Deleting an id that never existed succeeds.
    pub async fn delete(&self, collection: &str, id: &str, mode: StoreMode) -> StoreResult<()> {
        let path = PathResolver::document(collection, id)?;
        self.delete_at(&path, mode).await
    }

    pub async fn delete_in_sub(
        &self,
        collection: &str,
        id: &str,
        subcollection: &str,
        sub_id: &str,
        mode: StoreMode,
    ) -> StoreResult<()> {
        let path = PathResolver::document_in_sub(collection, id, subcollection, sub_id)?;
        self.delete_at(&path, mode).await
    }

    /// Runs a query against one collection.
    ///
    /// Primary mode hands the whole specification to the backend. Push mode
    /// executes the translator's split: the native portion on the backend,
    /// the residual filters through the emulator, and the presentation
    /// order client-side.
    pub async fn query(
        &self,
        collection: &str,
        spec: &QuerySpec,
        mode: StoreMode,
    ) -> StoreResult<Vec<Document>> {
        let path = PathResolver::collection(collection)?;
        self.query_at(path, spec, mode).await
    }

    pub async fn query_in_sub(
        &self,
        collection: &str,
        id: &str,
        subcollection: &str,
        spec: &QuerySpec,
        mode: StoreMode,
    ) -> StoreResult<Vec<Document>> {
        let path = PathResolver::subcollection(collection, id, subcollection)?;
        self.query_at(path, spec, mode).await
    }

    /// Registers a live listener on a push-store path. See
    /// [`SubscriptionHandle`]; re-subscribing to an actively watched
    /// resource returns the existing handle.
    pub fn subscribe<F>(&self, resource_path: &str, on_snapshot: F) -> StoreResult<SubscriptionHandle>
    where
        F: Fn(&[Document]) + Send + Sync + 'static,
    {
        self.subscribe_resource(resource_path, resource_path, on_snapshot)
    }

    /// Listener registration under an explicit logical-resource name, for
    /// views that layer several derived streams over one tree path.
    pub(crate) fn subscribe_resource<F>(
        &self,
        resource: &str,
        resource_path: &str,
        on_snapshot: F,
    ) -> StoreResult<SubscriptionHandle>
    where
        F: Fn(&[Document]) + Send + Sync + 'static,
    {
        let path = ResourcePath::from_string(resource_path)?;
        Ok(self
            .inner
            .subscriptions
            .subscribe(resource.to_string(), path, Arc::new(on_snapshot)))
    }

    /// Tears the listener down before returning; at most one already
    /// in-flight delivery may still be dropped against the deactivated
    /// handle afterwards.
    pub fn unsubscribe(&self, handle: &SubscriptionHandle) {
        self.inner.subscriptions.unsubscribe(handle);
    }

    async fn get_at(&self, path: &ResourcePath, mode: StoreMode) -> StoreResult<Option<Document>> {
        let id = document_id(path)?;
        match mode {
            StoreMode::Primary => match self.inner.primary.get_document(path).await? {
                Some(mut fields) => {
                    normalize_timestamps(&mut fields);
                    Ok(Some(Document::new(id, fields)))
                }
                None => Err(not_found(format!(
                    "Document {} does not exist",
                    path.canonical_string()
                ))),
            },
            StoreMode::Push => match self.inner.push.get(path, &[]).await? {
                Value::Object(mut fields) => {
                    normalize_timestamps(&mut fields);
                    Ok(Some(Document::new(id, fields)))
                }
                Value::Null => Ok(None),
                other => Err(internal_error(format!(
                    "Push store node {} is not a document: {other}",
                    path.canonical_string()
                ))),
            },
        }
    }

    async fn add_at(
        &self,
        path: &ResourcePath,
        data: Map<String, Value>,
        mode: StoreMode,
    ) -> StoreResult<Document> {
        if data.is_empty() {
            return Err(invalid_argument("Document data cannot be empty"));
        }
        let mut fields = data;
        stamp_create(&mut fields, now_millis());
        match mode {
            StoreMode::Primary => {
                self.inner.primary.set_document(path, fields.clone()).await?;
            }
            StoreMode::Push => {
                self.inner
                    .push
                    .set(path, Value::Object(fields.clone()))
                    .await?;
                self.notify_push(path).await;
            }
        }
        Ok(Document::new(document_id(path)?, fields))
    }

    async fn update_at(
        &self,
        path: &ResourcePath,
        patch: Map<String, Value>,
        mode: StoreMode,
    ) -> StoreResult<()> {
        if patch.is_empty() {
            return Err(invalid_argument("Update patch cannot be empty"));
        }
        let mut patch = patch;
        stamp_update(&mut patch, now_millis());
        match mode {
            // Backend-dependent on purpose: primary rejects a missing
            // target, push materializes it.
            StoreMode::Primary => self.inner.primary.update_document(path, patch).await,
            StoreMode::Push => {
                self.inner.push.merge(path, patch).await?;
                self.notify_push(path).await;
                Ok(())
            }
        }
    }

    async fn delete_at(&self, path: &ResourcePath, mode: StoreMode) -> StoreResult<()> {
        match mode {
            StoreMode::Primary => self.inner.primary.delete_document(path).await,
            StoreMode::Push => {
                self.inner.push.delete(path).await?;
                self.notify_push(path).await;
                Ok(())
            }
        }
    }

    async fn query_at(
        &self,
        collection: ResourcePath,
        spec: &QuerySpec,
        mode: StoreMode,
    ) -> StoreResult<Vec<Document>> {
        match mode {
            StoreMode::Primary => {
                let query = translate_primary(collection, spec);
                let documents = self.inner.primary.run_query(&query).await?;
                Ok(documents
                    .into_iter()
                    .map(|document| {
                        let id = document.id().to_string();
                        let mut fields = document.into_fields();
                        normalize_timestamps(&mut fields);
                        Document::new(id, fields)
                    })
                    .collect())
            }
            StoreMode::Push => {
                let plan = translate_push(spec)?;
                let raw = self.inner.push.get(&collection, &plan.params).await?;
                let documents = documents_from_tree(&raw);
                let mut documents = apply_residual_filters(documents, &plan.residual);
                let direction = if plan.reverse_results {
                    OrderDirection::Descending
                } else {
                    OrderDirection::Ascending
                };
                sort_documents(&mut documents, plan.order_by.as_deref(), direction);
                Ok(documents)
            }
        }
    }

    async fn notify_push(&self, path: &ResourcePath) {
        self.inner
            .subscriptions
            .deliver(path, self.inner.push.as_ref())
            .await;
    }

    /// Advisory dashboard counter, denormalized per collection. Strictly a
    /// side effect: any failure is logged and swallowed so the write that
    /// triggered it still succeeds.
    async fn bump_document_count(&self, collection: &str, mode: StoreMode) {
        if collection == COUNTERS_COLLECTION {
            return;
        }
        if let Err(err) = self.increment_counter(collection, mode).await {
            LOGGER.warn(format!(
                "Document counter update for '{collection}' failed: {err}"
            ));
        }
    }

    async fn increment_counter(&self, collection: &str, mode: StoreMode) -> StoreResult<()> {
        let path = PathResolver::document(COUNTERS_COLLECTION, collection)?;
        let current = match mode {
            StoreMode::Primary => self
                .inner
                .primary
                .get_document(&path)
                .await?
                .and_then(|fields| fields.get(DOCUMENT_COUNT_FIELD).and_then(Value::as_i64))
                .unwrap_or(0),
            StoreMode::Push => self
                .inner
                .push
                .get(&path, &[])
                .await?
                .get(DOCUMENT_COUNT_FIELD)
                .and_then(Value::as_i64)
                .unwrap_or(0),
        };

        let mut fields = Map::new();
        fields.insert(DOCUMENT_COUNT_FIELD.to_string(), Value::from(current + 1));
        fields.insert(UPDATED_AT_FIELD.to_string(), Value::from(now_millis()));
        match mode {
            StoreMode::Primary => self.inner.primary.set_document(&path, fields).await,
            StoreMode::Push => {
                self.inner.push.merge(&path, fields).await?;
                self.notify_push(&path).await;
                Ok(())
            }
        }
    }
}

fn document_id(path: &ResourcePath) -> StoreResult<String> {
    path.last_segment()
        .map(str::to_string)
        .ok_or_else(|| internal_error("Document path has no id segment"))
}

fn mint_id(mode: StoreMode) -> String {
    match mode {
        StoreMode::Primary => thread_rng()
            .sample_iter(&Alphanumeric)
            .map(char::from)
            .take(20)
            .collect(),
        StoreMode::Push => next_push_id(now_millis() as u64),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::query::FilterOperator;
    use serde_json::json;

    fn fields(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn rejects_empty_arguments_before_touching_backends() {
        let store = DocumentStore::in_memory();

        for mode in [StoreMode::Primary, StoreMode::Push] {
            let err = store.get("", "p1", mode).await.unwrap_err();
            assert_eq!(err.code_str(), "store/invalid-argument");

            let err = store.get("properties", "", mode).await.unwrap_err();
            assert_eq!(err.code_str(), "store/invalid-argument");

            let err = store.add("properties", Map::new(), mode).await.unwrap_err();
            assert_eq!(err.code_str(), "store/invalid-argument");

            let err = store
                .update("properties", "p1", Map::new(), mode)
                .await
                .unwrap_err();
            assert_eq!(err.code_str(), "store/invalid-argument");
        }
    }

    #[tokio::test]
    async fn minted_ids_follow_the_backend_convention() {
        let store = DocumentStore::in_memory();
        let primary = store
            .add("properties", fields(json!({"title": "Flat 1"})), StoreMode::Primary)
            .await
            .unwrap();
        assert_eq!(primary.id().len(), 20);
        assert!(primary.id().chars().all(|c| c.is_ascii_alphanumeric()));

        let push = store
            .add("messages", fields(json!({"content": "hi"})), StoreMode::Push)
            .await
            .unwrap();
        assert_eq!(push.id().len(), 20);
    }

    #[tokio::test]
    async fn get_absence_semantics_differ_per_mode() {
        let store = DocumentStore::in_memory();

        let err = store
            .get("properties", "ghost", StoreMode::Primary)
            .await
            .unwrap_err();
        assert_eq!(err.code_str(), "store/not-found");

        let missing = store.get("properties", "ghost", StoreMode::Push).await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn update_asymmetry_is_preserved() {
        let store = DocumentStore::in_memory();
        let patch = fields(json!({"status": "let"}));

        let err = store
            .update("properties", "ghost", patch.clone(), StoreMode::Primary)
            .await
            .unwrap_err();
        assert_eq!(err.code_str(), "store/not-found");

        store
            .update("properties", "ghost", patch, StoreMode::Push)
            .await
            .unwrap();
        let created = store
            .get("properties", "ghost", StoreMode::Push)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(created.fields().get("status"), Some(&json!("let")));
        assert!(created.updated_at().is_some());
    }

    #[tokio::test]
    async fn add_stamps_and_counts_documents() {
        let store = DocumentStore::in_memory();
        let added = store
            .add_with_id(
                "properties",
                "p1",
                fields(json!({"title": "Flat 1"})),
                StoreMode::Primary,
            )
            .await
            .unwrap();
        assert!(added.created_at().is_some());
        assert_eq!(added.created_at(), added.updated_at());

        let counter = store
            .get("counters", "properties", StoreMode::Primary)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(counter.fields().get("documentCount"), Some(&json!(1)));
    }

    #[tokio::test]
    async fn subcollections_roundtrip_in_both_modes() {
        let store = DocumentStore::in_memory();
        for mode in [StoreMode::Primary, StoreMode::Push] {
            store
                .add_with_id("properties", "p1", fields(json!({"title": "Flat"})), mode)
                .await
                .unwrap();
            let viewing = store
                .add_in_sub(
                    "properties",
                    "p1",
                    "viewings",
                    fields(json!({"visitor": "u2"})),
                    mode,
                )
                .await
                .unwrap();
            let read = store
                .get_in_sub("properties", "p1", "viewings", viewing.id(), mode)
                .await
                .unwrap()
                .unwrap();
            assert_eq!(read.fields().get("visitor"), Some(&json!("u2")));

            store
                .update_in_sub(
                    "properties",
                    "p1",
                    "viewings",
                    viewing.id(),
                    fields(json!({"confirmed": true})),
                    mode,
                )
                .await
                .unwrap();
            let results = store
                .query_in_sub("properties", "p1", "viewings", &QuerySpec::new(), mode)
                .await
                .unwrap();
            assert_eq!(results.len(), 1);
            assert_eq!(results[0].fields().get("confirmed"), Some(&json!(true)));

            store
                .delete_in_sub("properties", "p1", "viewings", viewing.id(), mode)
                .await
                .unwrap();
            let results = store
                .query_in_sub("properties", "p1", "viewings", &QuerySpec::new(), mode)
                .await
                .unwrap();
            assert!(results.is_empty());
        }
    }

    #[tokio::test]
    async fn push_query_runs_native_equality_plus_residual_emulation() {
        let store = DocumentStore::in_memory();
        for (id, price, status) in [
            ("a", 40, "available"),
            ("b", 90, "let"),
            ("c", 75, "available"),
            ("d", 120, "available"),
        ] {
            store
                .add_with_id(
                    "properties",
                    id,
                    fields(json!({"price": price, "status": status})),
                    StoreMode::Push,
                )
                .await
                .unwrap();
        }

        let spec = QuerySpec::new()
            .filter("status", FilterOperator::Equal, "available")
            .filter("price", FilterOperator::GreaterThanOrEqual, 50);
        let results = store
            .query("properties", &spec, StoreMode::Push)
            .await
            .unwrap();
        let ids: Vec<&str> = results.iter().map(Document::id).collect();
        assert_eq!(ids, ["c", "d"]);
    }
}
