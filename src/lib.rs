//! Data-access layer for the Rentral rental marketplace.
//!
//! One facade ([`DocumentStore`]) fronts two structurally different
//! backends: a strongly-queryable document store and a tree-shaped realtime
//! push store. Queries are written once against [`QuerySpec`] and translated
//! per backend; whatever the push store cannot evaluate natively is applied
//! client-side after the fetch. Live views (messaging, conversation lists)
//! subscribe to push-store snapshots and derive their state from each full
//! delivery.
//!
//! ```no_run
//! use rentral_data::{ConversationSync, DocumentStore, FilterOperator, QuerySpec, StoreMode};
//! use serde_json::json;
//!
//! # async fn run() -> rentral_data::StoreResult<()> {
//! let store = DocumentStore::in_memory();
//!
//! let listing = store
//!     .add(
//!         "properties",
//!         json!({"title": "Flat 1", "price": {"amount": 100}})
//!             .as_object()
//!             .cloned()
//!             .unwrap(),
//!         StoreMode::Primary,
//!     )
//!     .await?;
//!
//! let affordable = store
//!     .query(
//!         "properties",
//!         &QuerySpec::new().filter("price.amount", FilterOperator::GreaterThanOrEqual, 50),
//!         StoreMode::Primary,
//!     )
//!     .await?;
//! assert_eq!(affordable[0].id(), listing.id());
//!
//! let sync = ConversationSync::new(store.clone());
//! sync.send_message("c1", "u1", "is it still available?", None).await?;
//! # Ok(())
//! # }
//! ```

pub mod live;
pub mod logger;
pub mod primary;
pub mod push;
pub mod store;

pub use live::conversation::{Conversation, ConversationSync, ConversationView, Message};
pub use live::subscription::SubscriptionHandle;
pub use store::config::{StoreConfig, TokenFetcher};
pub use store::document::Document;
pub use store::error::{StoreError, StoreErrorCode, StoreResult};
pub use store::facade::{DocumentStore, StoreMode};
pub use store::path::{PathResolver, ResourcePath};
pub use store::query::{Filter, FilterOperator, OrderDirection, QuerySpec};
