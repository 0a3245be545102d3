//! In-memory database handles for testing
//!
//! Supports only what the workload layer needs: collection bookkeeping,
//! index definitions, the `$sample` / `$project` / `$match` / `$limit`
//! aggregation stages, equality filters and `$set` / `$inc` updates.
//! Failures can be injected per operation to exercise error paths.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bson::oid::ObjectId;
use bson::{Bson, Document};
use parking_lot::{Mutex, RwLock};
use rand::seq::SliceRandom;

use mongoload_core::{
    CodecOptions, DocumentClient, DocumentCollection, DocumentDatabase, IndexSpec, Result,
    WorkloadError,
};

/// Operation that can be made to fail on purpose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailurePoint {
    ListCollections,
    CreateCollection,
    GetCollection,
    CreateIndexes,
    Aggregate,
    Insert,
    Find,
    Update,
}

impl FailurePoint {
    fn operation(self) -> &'static str {
        match self {
            Self::ListCollections => "list_collection_names",
            Self::CreateCollection => "create_collection",
            Self::GetCollection => "get_collection",
            Self::CreateIndexes => "create_indexes",
            Self::Aggregate => "aggregate",
            Self::Insert => "insert",
            Self::Find => "find_one",
            Self::Update => "update_one",
        }
    }
}

#[derive(Default)]
struct FailureSet {
    points: Mutex<HashSet<FailurePoint>>,
}

impl FailureSet {
    fn check(&self, point: FailurePoint) -> Result<()> {
        if self.points.lock().contains(&point) {
            return Err(WorkloadError::database(point.operation(), "injected failure"));
        }
        Ok(())
    }
}

#[derive(Default)]
struct CollectionState {
    docs: RwLock<Vec<Document>>,
    indexes: RwLock<Vec<IndexSpec>>,
    aggregate_calls: AtomicUsize,
}

struct DatabaseState {
    name: String,
    collections: RwLock<BTreeMap<String, Arc<CollectionState>>>,
    create_collection_calls: AtomicUsize,
    failures: Arc<FailureSet>,
}

impl DatabaseState {
    fn collection(&self, name: &str) -> Option<Arc<CollectionState>> {
        self.collections.read().get(name).cloned()
    }
}

/// In-memory client (for testing)
#[derive(Clone, Default)]
pub struct MemoryClient {
    databases: Arc<RwLock<HashMap<String, Arc<DatabaseState>>>>,
    failures: Arc<FailureSet>,
}

impl MemoryClient {
    pub fn new() -> Self {
        Self::default()
    }

    fn database_state(&self, name: &str) -> Arc<DatabaseState> {
        if let Some(state) = self.databases.read().get(name) {
            return Arc::clone(state);
        }

        let mut databases = self.databases.write();
        Arc::clone(databases.entry(name.to_string()).or_insert_with(|| {
            Arc::new(DatabaseState {
                name: name.to_string(),
                collections: RwLock::new(BTreeMap::new()),
                create_collection_calls: AtomicUsize::new(0),
                failures: Arc::clone(&self.failures),
            })
        }))
    }

    /// Makes every subsequent call of the given operation fail.
    pub fn fail_on(&self, point: FailurePoint) {
        self.failures.points.lock().insert(point);
    }

    pub fn clear_failures(&self) {
        self.failures.points.lock().clear();
    }

    /// Creates the collection if needed and appends `docs` to it.
    pub fn seed(&self, db: &str, collection: &str, docs: Vec<Document>) {
        let state = self.database_state(db);
        let mut collections = state.collections.write();
        let coll = collections.entry(collection.to_string()).or_default();
        let mut stored = coll.docs.write();
        for mut doc in docs {
            if !doc.contains_key("_id") {
                doc.insert("_id", ObjectId::new());
            }
            stored.push(doc);
        }
    }

    /// Number of aggregation pipelines run against the collection.
    pub fn aggregate_calls(&self, db: &str, collection: &str) -> usize {
        self.database_state(db)
            .collection(collection)
            .map(|c| c.aggregate_calls.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    /// Number of `create_collection` attempts against the database.
    pub fn create_collection_calls(&self, db: &str) -> usize {
        self.database_state(db)
            .create_collection_calls
            .load(Ordering::SeqCst)
    }

    pub fn document_count(&self, db: &str, collection: &str) -> usize {
        self.database_state(db)
            .collection(collection)
            .map(|c| c.docs.read().len())
            .unwrap_or(0)
    }

    pub fn indexes(&self, db: &str, collection: &str) -> Vec<IndexSpec> {
        self.database_state(db)
            .collection(collection)
            .map(|c| c.indexes.read().clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl DocumentClient for MemoryClient {
    fn database(&self, name: &str) -> Arc<dyn DocumentDatabase> {
        Arc::new(MemoryDatabase {
            state: self.database_state(name),
        })
    }

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}

struct MemoryDatabase {
    state: Arc<DatabaseState>,
}

#[async_trait]
impl DocumentDatabase for MemoryDatabase {
    fn name(&self) -> &str {
        &self.state.name
    }

    async fn list_collection_names(&self) -> Result<Vec<String>> {
        self.state.failures.check(FailurePoint::ListCollections)?;
        Ok(self.state.collections.read().keys().cloned().collect())
    }

    async fn create_collection(
        &self,
        name: &str,
        codec: CodecOptions,
    ) -> Result<Arc<dyn DocumentCollection>> {
        self.state
            .create_collection_calls
            .fetch_add(1, Ordering::SeqCst);
        self.state.failures.check(FailurePoint::CreateCollection)?;

        let mut collections = self.state.collections.write();
        if collections.contains_key(name) {
            return Err(WorkloadError::already_exists("collection", name));
        }
        let coll = Arc::new(CollectionState::default());
        collections.insert(name.to_string(), Arc::clone(&coll));

        Ok(Arc::new(MemoryCollection {
            name: name.to_string(),
            state: coll,
            codec,
            failures: Arc::clone(&self.state.failures),
        }))
    }

    async fn get_collection(
        &self,
        name: &str,
        codec: CodecOptions,
    ) -> Result<Arc<dyn DocumentCollection>> {
        self.state.failures.check(FailurePoint::GetCollection)?;
        let coll = self
            .state
            .collection(name)
            .ok_or_else(|| WorkloadError::not_found("collection", name))?;

        Ok(Arc::new(MemoryCollection {
            name: name.to_string(),
            state: coll,
            codec,
            failures: Arc::clone(&self.state.failures),
        }))
    }
}

struct MemoryCollection {
    name: String,
    state: Arc<CollectionState>,
    codec: CodecOptions,
    failures: Arc<FailureSet>,
}

fn matches_filter(doc: &Document, filter: &Document) -> bool {
    filter.iter().all(|(key, value)| doc.get(key) == Some(value))
}

fn is_truthy(value: &Bson) -> bool {
    match value {
        Bson::Boolean(b) => *b,
        Bson::Int32(n) => *n != 0,
        Bson::Int64(n) => *n != 0,
        Bson::Double(n) => *n != 0.0,
        _ => false,
    }
}

fn as_count(stage: &str, value: &Bson) -> Result<usize> {
    match value {
        Bson::Int32(n) if *n >= 0 => Ok(*n as usize),
        Bson::Int64(n) if *n >= 0 => Ok(*n as usize),
        other => Err(WorkloadError::database(
            "aggregate",
            format!("{stage} expects a non-negative integer, got {other}"),
        )),
    }
}

fn project(doc: &Document, spec: &Document) -> Document {
    let include_id = spec.get("_id").map_or(true, is_truthy);
    let mut out = Document::new();
    if include_id {
        if let Some(id) = doc.get("_id") {
            out.insert("_id", id.clone());
        }
    }
    for (key, value) in spec {
        if key != "_id" && is_truthy(value) {
            if let Some(field) = doc.get(key) {
                out.insert(key.clone(), field.clone());
            }
        }
    }
    out
}

fn run_pipeline(mut docs: Vec<Document>, pipeline: &[Document]) -> Result<Vec<Document>> {
    for stage in pipeline {
        let (operator, argument) = stage
            .iter()
            .next()
            .ok_or_else(|| WorkloadError::database("aggregate", "empty pipeline stage"))?;

        docs = match (operator.as_str(), argument) {
            ("$sample", Bson::Document(spec)) => {
                let size = as_count("$sample", spec.get("size").unwrap_or(&Bson::Null))?;
                let mut rng = rand::thread_rng();
                docs.choose_multiple(&mut rng, size).cloned().collect()
            }
            ("$project", Bson::Document(spec)) => docs.iter().map(|d| project(d, spec)).collect(),
            ("$match", Bson::Document(filter)) => docs
                .into_iter()
                .filter(|d| matches_filter(d, filter))
                .collect(),
            ("$limit", value) => {
                let limit = as_count("$limit", value)?;
                docs.truncate(limit);
                docs
            }
            (other, _) => {
                return Err(WorkloadError::Unsupported(format!(
                    "aggregation stage {other}"
                )))
            }
        };
    }
    Ok(docs)
}

fn add_numbers(current: Option<&Bson>, delta: &Bson) -> Result<Bson> {
    let sum = match (current, delta) {
        (None, d) => d.clone(),
        (Some(Bson::Int32(a)), Bson::Int32(b)) => Bson::Int32(a + b),
        (Some(Bson::Int64(a)), Bson::Int64(b)) => Bson::Int64(a + b),
        (Some(Bson::Int64(a)), Bson::Int32(b)) => Bson::Int64(a + i64::from(*b)),
        (Some(Bson::Int32(a)), Bson::Int64(b)) => Bson::Int64(i64::from(*a) + b),
        (Some(Bson::Double(a)), Bson::Double(b)) => Bson::Double(a + b),
        (Some(a), b) => {
            return Err(WorkloadError::database(
                "update_one",
                format!("cannot apply $inc of {b} to {a}"),
            ))
        }
    };
    Ok(sum)
}

fn apply_update(doc: &mut Document, update: &Document) -> Result<()> {
    for (operator, argument) in update {
        let fields = match argument {
            Bson::Document(fields) => fields,
            _ => {
                return Err(WorkloadError::database(
                    "update_one",
                    format!("{operator} expects a document"),
                ))
            }
        };
        match operator.as_str() {
            "$set" => {
                for (key, value) in fields {
                    doc.insert(key.clone(), value.clone());
                }
            }
            "$inc" => {
                for (key, delta) in fields {
                    let sum = add_numbers(doc.get(key), delta)?;
                    doc.insert(key.clone(), sum);
                }
            }
            other => {
                return Err(WorkloadError::Unsupported(format!("update operator {other}")))
            }
        }
    }
    Ok(())
}

impl MemoryCollection {
    fn insert(&self, docs: Vec<Document>) -> Result<Vec<Bson>> {
        self.failures.check(FailurePoint::Insert)?;

        let mut stored = self.state.docs.write();
        let mut ids = Vec::with_capacity(docs.len());
        for mut doc in docs {
            let id = match doc.get("_id") {
                Some(id) => id.clone(),
                None => {
                    let id = Bson::ObjectId(ObjectId::new());
                    doc.insert("_id", id.clone());
                    id
                }
            };
            if stored.iter().any(|d| d.get("_id") == Some(&id)) {
                return Err(WorkloadError::database(
                    "insert",
                    format!("duplicate key {id} in {}", self.name),
                ));
            }
            stored.push(doc);
            ids.push(id);
        }
        Ok(ids)
    }
}

#[async_trait]
impl DocumentCollection for MemoryCollection {
    fn name(&self) -> &str {
        &self.name
    }

    fn codec_options(&self) -> &CodecOptions {
        &self.codec
    }

    async fn create_indexes(&self, indexes: &[IndexSpec]) -> Result<Vec<String>> {
        self.failures.check(FailurePoint::CreateIndexes)?;

        let names = indexes
            .iter()
            .map(|spec| {
                spec.name.clone().unwrap_or_else(|| {
                    spec.keys
                        .iter()
                        .map(|(k, v)| format!("{k}_{v}"))
                        .collect::<Vec<_>>()
                        .join("_")
                })
            })
            .collect();
        self.state.indexes.write().extend_from_slice(indexes);
        Ok(names)
    }

    async fn aggregate(&self, pipeline: Vec<Document>) -> Result<Vec<Document>> {
        self.state.aggregate_calls.fetch_add(1, Ordering::SeqCst);
        self.failures.check(FailurePoint::Aggregate)?;

        let docs = self.state.docs.read().clone();
        run_pipeline(docs, &pipeline)
    }

    async fn insert_many(&self, docs: Vec<Document>) -> Result<Vec<Bson>> {
        self.insert(docs)
    }

    async fn find_one(&self, filter: Document) -> Result<Option<Document>> {
        self.failures.check(FailurePoint::Find)?;
        Ok(self
            .state
            .docs
            .read()
            .iter()
            .find(|d| matches_filter(d, &filter))
            .cloned())
    }

    async fn update_one(&self, filter: Document, update: Document) -> Result<u64> {
        self.failures.check(FailurePoint::Update)?;

        let mut docs = self.state.docs.write();
        match docs.iter_mut().find(|d| matches_filter(d, &filter)) {
            Some(doc) => {
                apply_update(doc, &update)?;
                Ok(1)
            }
            None => Ok(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn seeded(count: usize) -> MemoryClient {
        let client = MemoryClient::new();
        let docs = (0..count)
            .map(|i| doc! { "_id": i as i64, "n": i as i64, "tag": "x" })
            .collect();
        client.seed("db", "items", docs);
        client
    }

    #[tokio::test]
    async fn test_sample_and_project_returns_ids_only() {
        let client = seeded(50);
        let coll = client
            .database("db")
            .get_collection("items", CodecOptions::default())
            .await
            .unwrap();

        let docs = coll
            .aggregate(vec![
                doc! { "$sample": { "size": 10 } },
                doc! { "$project": { "_id": 1 } },
            ])
            .await
            .unwrap();

        assert_eq!(docs.len(), 10);
        assert!(docs.iter().all(|d| d.len() == 1 && d.contains_key("_id")));

        let mut ids: Vec<i64> = docs.iter().map(|d| d.get_i64("_id").unwrap()).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 10, "sample must not repeat documents");
    }

    #[tokio::test]
    async fn test_sample_larger_than_collection() {
        let client = seeded(3);
        let coll = client
            .database("db")
            .get_collection("items", CodecOptions::default())
            .await
            .unwrap();

        let docs = coll
            .aggregate(vec![doc! { "$sample": { "size": 100 } }])
            .await
            .unwrap();
        assert_eq!(docs.len(), 3);
        assert_eq!(client.aggregate_calls("db", "items"), 1);
    }

    #[tokio::test]
    async fn test_create_collection_twice_conflicts() {
        let client = MemoryClient::new();
        let db = client.database("db");
        db.create_collection("orders", CodecOptions::default())
            .await
            .unwrap();

        let err = db
            .create_collection("orders", CodecOptions::default())
            .await
            .err()
            .unwrap();
        assert!(err.is_already_exists());
        assert_eq!(client.create_collection_calls("db"), 2);
        assert_eq!(db.list_collection_names().await.unwrap(), vec!["orders"]);
    }

    #[tokio::test]
    async fn test_get_missing_collection() {
        let client = MemoryClient::new();
        let result = client
            .database("db")
            .get_collection("nope", CodecOptions::default())
            .await;
        assert!(matches!(result, Err(WorkloadError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_insert_find_update() {
        let client = MemoryClient::new();
        let coll = client
            .database("db")
            .create_collection("orders", CodecOptions::default())
            .await
            .unwrap();

        let ids = coll
            .insert_many(vec![doc! { "qty": 1 }, doc! { "qty": 2 }])
            .await
            .unwrap();
        assert_eq!(ids.len(), 2);

        let modified = coll
            .update_one(
                doc! { "_id": ids[1].clone() },
                doc! { "$inc": { "qty": 5 }, "$set": { "state": "shipped" } },
            )
            .await
            .unwrap();
        assert_eq!(modified, 1);

        let found = coll
            .find_one(doc! { "_id": ids[1].clone() })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.get_i32("qty").unwrap(), 7);
        assert_eq!(found.get_str("state").unwrap(), "shipped");

        assert_eq!(
            coll.update_one(doc! { "qty": 99 }, doc! { "$set": { "x": 1 } })
                .await
                .unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let client = seeded(1);
        client.fail_on(FailurePoint::ListCollections);

        let db = client.database("db");
        let err = db.list_collection_names().await.err().unwrap();
        assert!(matches!(
            err,
            WorkloadError::Database {
                operation: "list_collection_names",
                ..
            }
        ));

        client.clear_failures();
        assert!(db.list_collection_names().await.is_ok());
    }

    #[tokio::test]
    async fn test_unsupported_stage() {
        let client = seeded(1);
        let coll = client
            .database("db")
            .get_collection("items", CodecOptions::default())
            .await
            .unwrap();
        let result = coll.aggregate(vec![doc! { "$group": { "_id": null } }]).await;
        assert!(matches!(result, Err(WorkloadError::Unsupported(_))));
    }
}
