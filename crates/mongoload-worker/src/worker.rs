//! Per-virtual-user worker state and collection provisioning

use std::sync::Arc;
use std::time::Duration;

use bson::doc;
use tracing::{debug, info};

use mongoload_core::{
    CodecOptions, DocumentClient, DocumentCollection, DocumentDatabase, IndexSpec, Result,
    WorkloadError,
};

use crate::cache::IdentifierCache;
use crate::environment::Environment;

/// Base state of a workload worker.
///
/// Holds the shared database handle plus one collection slot and one
/// identifier cache per logical collection. None of it is shared with other
/// workers, so no locking is needed.
pub struct MongoWorker {
    environment: Arc<Environment>,
    client: Arc<dyn DocumentClient>,
    db: Arc<dyn DocumentDatabase>,
    collections: Vec<Option<Arc<dyn DocumentCollection>>>,
    cache: Vec<IdentifierCache>,
}

impl MongoWorker {
    /// Create a worker bound to the configured working database.
    ///
    /// `client` is the process-wide handle; the worker only keeps a reference.
    pub fn new(environment: Arc<Environment>, client: Arc<dyn DocumentClient>) -> Self {
        let settings = environment.settings();
        let db = client.database(&settings.db_name);
        let slots = settings.num_collections;

        Self {
            collections: vec![None; slots],
            cache: vec![IdentifierCache::new(); slots],
            environment,
            client,
            db,
        }
    }

    /// Idle time between two operations; workers issue back to back.
    pub fn wait_time(&self) -> Duration {
        Duration::ZERO
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    pub fn client(&self) -> &Arc<dyn DocumentClient> {
        &self.client
    }

    pub fn db(&self) -> &Arc<dyn DocumentDatabase> {
        &self.db
    }

    pub fn num_collections(&self) -> usize {
        self.collections.len()
    }

    /// Provisioned handle for a logical collection, if any.
    pub fn collection(&self, coll_id: usize) -> Option<&Arc<dyn DocumentCollection>> {
        self.collections.get(coll_id).and_then(Option::as_ref)
    }

    pub fn cache(&self, coll_id: usize) -> Option<&IdentifierCache> {
        self.cache.get(coll_id)
    }

    fn check_slot(&self, coll_id: usize) -> Result<()> {
        if coll_id >= self.collections.len() {
            return Err(WorkloadError::InvalidCollectionIndex {
                index: coll_id,
                slots: self.collections.len(),
            });
        }
        Ok(())
    }

    /// Make sure `name` exists and return a handle bound to the decimal codec.
    ///
    /// A missing collection is created together with `indexes`. An existing one
    /// is opened and, if this worker's cache for `coll_id` is still empty, used
    /// to warm the cache. Every database error is returned to the caller.
    pub async fn ensure_collection(
        &mut self,
        coll_id: usize,
        name: &str,
        indexes: &[IndexSpec],
    ) -> Result<Arc<dyn DocumentCollection>> {
        self.check_slot(coll_id)?;
        let codec = CodecOptions::with_decimal();

        let existing = self.db.list_collection_names().await?;
        let collection = if existing.iter().any(|n| n == name) {
            self.open_existing(coll_id, name, codec).await?
        } else {
            match self.db.create_collection(name, codec.clone()).await {
                Ok(collection) => {
                    info!(collection = %name, "Created new collection");
                    if !indexes.is_empty() {
                        let created = collection.create_indexes(indexes).await?;
                        debug!(collection = %name, indexes = ?created, "Created indexes");
                    }
                    collection
                }
                // Another worker created it between the listing and our create.
                Err(e) if e.is_already_exists() => {
                    info!(collection = %name, "Collection created concurrently, opening it");
                    self.open_existing(coll_id, name, codec).await?
                }
                Err(e) => return Err(e),
            }
        };

        let slot = &mut self.collections[coll_id];
        if slot.is_none() {
            *slot = Some(Arc::clone(&collection));
        }
        Ok(collection)
    }

    async fn open_existing(
        &mut self,
        coll_id: usize,
        name: &str,
        codec: CodecOptions,
    ) -> Result<Arc<dyn DocumentCollection>> {
        let collection = self.db.get_collection(name, codec).await?;
        info!(collection = %name, "Found existing collection");

        if self.cache[coll_id].is_empty() {
            self.warm_up(coll_id, collection.as_ref()).await?;
        }
        Ok(collection)
    }

    /// Sample up to `docs_to_cache` identifiers into the cache for `coll_id`.
    async fn warm_up(
        &mut self,
        coll_id: usize,
        collection: &dyn DocumentCollection,
    ) -> Result<usize> {
        let sample_size = self.environment.settings().docs_to_cache;
        if sample_size == 0 {
            return Ok(0);
        }

        let pipeline = vec![
            doc! { "$sample": { "size": sample_size as i64 } },
            doc! { "$project": { "_id": 1 } },
        ];
        let docs = collection.aggregate(pipeline).await?;

        let cache = &mut self.cache[coll_id];
        let mut count = 0;
        for mut doc in docs {
            if let Some(id) = doc.remove("_id") {
                cache.push(id);
                count += 1;
            }
        }

        info!(collection = %collection.name(), count, "Warmed up identifier cache");
        Ok(count)
    }
}
