//! # helios-orm: row-backed ORM core
//!
//! Turns raw tabular rows into typed, mutable records, resolves declared
//! relationships between tables without query explosion, tracks per-column
//! mutation for minimal-diff persistence, and layers a version-keyed cache
//! over all of it.
//!
//! The SQL layer, the validation filter-chain engine, and the durable
//! cache store are external collaborators consumed through the narrow
//! [`store::Store`], [`filter::FilterChain`], and [`cache::CacheBackend`]
//! traits.

pub mod cache;
pub mod catalog;
pub mod collection;
pub mod error;
pub mod fake;
pub mod fetch;
pub mod filter;
pub mod inflect;
pub mod model;
pub mod observers;
pub mod record;
pub mod relationships;
pub mod store;


// Re-export core traits and types
pub use cache::{CacheBackend, MemoryCache, ModelCache};
pub use catalog::Catalog;
pub use collection::Collection;
pub use error::{OrmError, OrmResult, StoreError, StoreResult};
pub use fetch::{EagerParams, FetchParams, Page, PagerInfo};
pub use filter::{FilterChain, FilterChainFactory};
pub use model::{Accessor, ColumnSpec, ColumnType, Model, ModelSpec};
pub use observers::{Observer, ObserverHandle};
pub use record::{Record, Related, SaveOutcome, SqlStatus};
pub use relationships::{
    Cardinality, Merge, NativeBy, RelationKind, Relationship, RelationshipDef,
};
pub use store::{
    Assign, Condition, Join, JoinTarget, JoinType, OrderBy, OrderDirection, QueryOperator, Row,
    Select, Store,
};
