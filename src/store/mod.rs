pub mod config;
pub mod document;
pub(crate) mod emulator;
pub mod error;
pub mod facade;
pub mod path;
pub mod query;
pub mod translate;

pub use config::{StoreConfig, TokenFetcher};
pub use document::Document;
pub use error::{StoreError, StoreErrorCode, StoreResult};
pub use facade::{DocumentStore, StoreMode};
pub use path::{PathResolver, ResourcePath};
pub use query::{Filter, FilterOperator, OrderDirection, QuerySpec};
