//! MongoDB-backed database handles

use std::sync::Arc;

use async_trait::async_trait;
use bson::{Bson, Document};
use futures::TryStreamExt;
use mongodb::error::{Error as DriverError, ErrorKind};
use mongodb::options::IndexOptions;
use mongodb::{Client, Collection, Database, IndexModel};
use tracing::{debug, info};

use mongoload_core::{
    CodecOptions, DocumentClient, DocumentCollection, DocumentDatabase, IndexSpec, Result,
    Settings, WorkloadError,
};

/// Server error code returned when creating a collection whose name is taken.
const NAMESPACE_EXISTS: i32 = 48;

fn driver_error(operation: &'static str, err: DriverError) -> WorkloadError {
    WorkloadError::database(operation, err.to_string())
}

fn is_namespace_exists(err: &DriverError) -> bool {
    matches!(err.kind.as_ref(), ErrorKind::Command(cmd) if cmd.code == NAMESPACE_EXISTS)
}

/// Shared client backed by the driver's connection pool.
#[derive(Clone)]
pub struct MongoClient {
    client: Client,
}

impl MongoClient {
    /// Connect to the cluster named in `settings`.
    ///
    /// The driver connects lazily; this only parses the connection string and
    /// sets up the pool.
    pub async fn connect(settings: &Settings) -> Result<Self> {
        let client = Client::with_uri_str(&settings.cluster_url)
            .await
            .map_err(|e| driver_error("connect", e))?;
        info!(db = %settings.db_name, "MongoDB client initialized");
        Ok(Self { client })
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DocumentClient for MongoClient {
    fn database(&self, name: &str) -> Arc<dyn DocumentDatabase> {
        Arc::new(MongoDatabase {
            db: self.client.database(name),
        })
    }

    async fn shutdown(&self) -> Result<()> {
        self.client.clone().shutdown().await;
        info!("MongoDB client shut down");
        Ok(())
    }
}

struct MongoDatabase {
    db: Database,
}

impl MongoDatabase {
    fn handle(&self, name: &str, codec: CodecOptions) -> Arc<dyn DocumentCollection> {
        Arc::new(MongoCollection {
            name: name.to_string(),
            inner: self.db.collection::<Document>(name),
            codec,
        })
    }
}

#[async_trait]
impl DocumentDatabase for MongoDatabase {
    fn name(&self) -> &str {
        self.db.name()
    }

    async fn list_collection_names(&self) -> Result<Vec<String>> {
        self.db
            .list_collection_names(None)
            .await
            .map_err(|e| driver_error("list_collection_names", e))
    }

    async fn create_collection(
        &self,
        name: &str,
        codec: CodecOptions,
    ) -> Result<Arc<dyn DocumentCollection>> {
        match self.db.create_collection(name, None).await {
            Ok(()) => Ok(self.handle(name, codec)),
            Err(e) if is_namespace_exists(&e) => {
                Err(WorkloadError::already_exists("collection", name))
            }
            Err(e) => Err(driver_error("create_collection", e)),
        }
    }

    async fn get_collection(
        &self,
        name: &str,
        codec: CodecOptions,
    ) -> Result<Arc<dyn DocumentCollection>> {
        Ok(self.handle(name, codec))
    }
}

struct MongoCollection {
    name: String,
    inner: Collection<Document>,
    codec: CodecOptions,
}

fn index_model(spec: &IndexSpec) -> IndexModel {
    let mut options = IndexOptions::default();
    options.name = spec.name.clone();
    if spec.unique {
        options.unique = Some(true);
    }

    IndexModel::builder()
        .keys(spec.keys.clone())
        .options(options)
        .build()
}

#[async_trait]
impl DocumentCollection for MongoCollection {
    fn name(&self) -> &str {
        &self.name
    }

    fn codec_options(&self) -> &CodecOptions {
        &self.codec
    }

    async fn create_indexes(&self, indexes: &[IndexSpec]) -> Result<Vec<String>> {
        let models: Vec<IndexModel> = indexes.iter().map(index_model).collect();
        let result = self
            .inner
            .create_indexes(models, None)
            .await
            .map_err(|e| driver_error("create_indexes", e))?;
        debug!(collection = %self.name, indexes = ?result.index_names, "Indexes created");
        Ok(result.index_names)
    }

    async fn aggregate(&self, pipeline: Vec<Document>) -> Result<Vec<Document>> {
        let cursor = self
            .inner
            .aggregate(pipeline, None)
            .await
            .map_err(|e| driver_error("aggregate", e))?;
        cursor
            .try_collect()
            .await
            .map_err(|e| driver_error("aggregate", e))
    }

    async fn insert_many(&self, docs: Vec<Document>) -> Result<Vec<Bson>> {
        let result = self
            .inner
            .insert_many(docs, None)
            .await
            .map_err(|e| driver_error("insert_many", e))?;

        let mut ids: Vec<(usize, Bson)> = result.inserted_ids.into_iter().collect();
        ids.sort_unstable_by_key(|(position, _)| *position);
        Ok(ids.into_iter().map(|(_, id)| id).collect())
    }

    async fn find_one(&self, filter: Document) -> Result<Option<Document>> {
        self.inner
            .find_one(filter, None)
            .await
            .map_err(|e| driver_error("find_one", e))
    }

    async fn update_one(&self, filter: Document, update: Document) -> Result<u64> {
        let result = self
            .inner
            .update_one(filter, update, None)
            .await
            .map_err(|e| driver_error("update_one", e))?;
        Ok(result.modified_count)
    }
}
