//! Storage abstraction.
//!
//! The store talks to its document database through [`DataStore`] and
//! [`Collection`]: named collections of ordered documents, queried through a
//! small aggregation pipeline. The in-memory engine in [`memory`] implements
//! the contract for embedded use and tests; a server-backed implementation
//! plugs in behind the same traits.

pub mod memory;

pub use memory::MemoryStore;

use std::sync::Arc;

use thiserror::Error;

use strata_core::effect::{Effect, Transience};
use strata_core::value::Doc;

/// Backend failure, propagated unchanged through the data source.
#[derive(Debug, Error, Clone)]
#[non_exhaustive]
pub enum StorageError {
    #[error("storage error: {reason}")]
    Backend { reason: String },
    #[error("document has no `_id` field")]
    MissingId,
    #[error("storage operation timed out: {reason}")]
    Timeout { reason: String },
}

impl StorageError {
    pub fn transience(&self) -> Transience {
        match self {
            StorageError::Backend { .. } => Transience::Unknown,
            StorageError::MissingId => Transience::Permanent,
            StorageError::Timeout { .. } => Transience::Retryable,
        }
    }

    pub fn effect(&self) -> Effect {
        Effect::Unknown
    }
}

/// One stage of the aggregation pipeline, applied in order.
#[derive(Clone, Debug)]
pub enum Stage {
    /// Keep documents matching the encoded filter.
    Match(Doc),
    /// Stable multi-key sort; `1` ascending, `-1` descending.
    Sort(Vec<(String, i32)>),
    /// Group by a field and keep the first whole document per group
    /// (documents arrive pre-sorted), replacing the root with it.
    GroupFirst { by: String },
    /// Restrict documents to the listed fields, in list order.
    Project(Vec<String>),
    Limit(usize),
}

/// Forward-only, single-consumer stream of documents.
pub trait Cursor: Iterator<Item = Result<Doc, StorageError>> + Send {}

impl<T> Cursor for T where T: Iterator<Item = Result<Doc, StorageError>> + Send {}

pub type DocCursor = Box<dyn Cursor>;

/// One named collection of documents keyed by `_id`.
pub trait Collection: Send + Sync {
    fn name(&self) -> &str;

    /// Insert a document. The `_id` field must be present and unique.
    fn insert(&self, doc: Doc) -> Result<(), StorageError>;

    /// Run the pipeline over the collection in `_id` order.
    fn aggregate(&self, pipeline: &[Stage]) -> Result<DocCursor, StorageError>;

    /// Make sure the declared index exists.
    fn ensure_index(&self, elements: &[(String, i32)], name: &str) -> Result<(), StorageError>;

    /// Names of indexes declared so far.
    fn index_names(&self) -> Vec<String>;

    fn count(&self) -> Result<usize, StorageError>;
}

/// A database: named collections plus drop.
pub trait DataStore: Send + Sync {
    fn collection(&self, name: &str) -> Arc<dyn Collection>;
    fn collection_names(&self) -> Vec<String>;
    fn drop_db(&self) -> Result<(), StorageError>;
}
