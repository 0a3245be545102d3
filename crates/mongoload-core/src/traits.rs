use std::sync::Arc;

use async_trait::async_trait;
use bson::{Bson, Document};

use crate::codec::CodecOptions;
use crate::error::Result;
use crate::event::RequestEvent;

/// Process-wide database client.
///
/// Built once at process start and shared by every worker. Implementations must
/// be safe for concurrent use; connection pooling is the driver's job.
#[async_trait]
pub trait DocumentClient: Send + Sync {
    /// Returns a handle to the named database.
    fn database(&self, name: &str) -> Arc<dyn DocumentDatabase>;

    /// Closes pooled connections. Called once at process shutdown.
    async fn shutdown(&self) -> Result<()>;
}

/// Handle to one logical database.
#[async_trait]
pub trait DocumentDatabase: Send + Sync {
    fn name(&self) -> &str;

    /// Lists the names of all collections in the database.
    async fn list_collection_names(&self) -> Result<Vec<String>>;

    /// Creates a collection and returns a handle bound to `codec`.
    ///
    /// Returns `WorkloadError::AlreadyExists` when the name is taken.
    async fn create_collection(
        &self,
        name: &str,
        codec: CodecOptions,
    ) -> Result<Arc<dyn DocumentCollection>>;

    /// Opens a handle to an existing collection bound to `codec`.
    async fn get_collection(
        &self,
        name: &str,
        codec: CodecOptions,
    ) -> Result<Arc<dyn DocumentCollection>>;
}

/// Index definition requested at collection creation time.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexSpec {
    /// Key pattern, e.g. `{ "customer_id": 1 }`
    pub keys: Document,
    pub name: Option<String>,
    pub unique: bool,
}

impl IndexSpec {
    pub fn new(keys: Document) -> Self {
        Self {
            keys,
            name: None,
            unique: false,
        }
    }

    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }
}

/// Handle to a provisioned collection.
#[async_trait]
pub trait DocumentCollection: Send + Sync {
    fn name(&self) -> &str;

    /// Codec configuration the handle was created with.
    ///
    /// Documents pass through unchanged; workload code converts typed fields
    /// with [`CodecOptions::set_typed`] and [`CodecOptions::get_typed`].
    fn codec_options(&self) -> &CodecOptions;

    /// Creates the given indexes and returns their names.
    async fn create_indexes(&self, indexes: &[IndexSpec]) -> Result<Vec<String>>;

    /// Runs an aggregation pipeline and collects the resulting documents.
    async fn aggregate(&self, pipeline: Vec<Document>) -> Result<Vec<Document>>;

    /// Inserts several documents and returns their `_id`s in input order.
    async fn insert_many(&self, docs: Vec<Document>) -> Result<Vec<Bson>>;

    async fn find_one(&self, filter: Document) -> Result<Option<Document>>;

    /// Applies `update` to the first document matching `filter`; returns the modified count.
    async fn update_one(&self, filter: Document, update: Document) -> Result<u64>;
}

/// Receiver of result events, typically the load-testing harness.
pub trait ReportingSink: Send + Sync {
    fn fire(&self, event: RequestEvent);
}
