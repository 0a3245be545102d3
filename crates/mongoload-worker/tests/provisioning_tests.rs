//! Collection provisioning and identifier cache warm-up against the in-memory backend.

mod common;

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use bson::{doc, Bson};
use mongoload_core::{
    CodecOptions, DocumentClient, DocumentCollection, DocumentDatabase, IndexSpec, Result,
    WorkloadError,
};
use mongoload_driver::{FailurePoint, MemoryClient};
use mongoload_worker::MongoWorker;
use rust_decimal::Decimal;

use common::{environment, seed_numbered, settings, DB};

fn worker(client: &MemoryClient, docs_to_cache: usize) -> MongoWorker {
    let (env, _) = environment(settings(2, docs_to_cache));
    MongoWorker::new(env, Arc::new(client.clone()))
}

#[tokio::test]
async fn test_absent_collection_is_created_with_indexes() {
    let client = MemoryClient::new();
    let mut worker = worker(&client, 100);
    let indexes = vec![
        IndexSpec::new(doc! { "customer_id": 1 }),
        IndexSpec::new(doc! { "order_no": 1 }).named("order_no_unique").unique(),
    ];

    let coll = worker.ensure_collection(0, "orders", &indexes).await.unwrap();

    assert_eq!(coll.name(), "orders");
    assert_eq!(client.create_collection_calls(DB), 1);
    assert_eq!(client.indexes(DB, "orders"), indexes);
    // A fresh collection is empty: no warm-up.
    assert_eq!(client.aggregate_calls(DB, "orders"), 0);
    assert!(worker.cache(0).unwrap().is_empty());
    assert!(worker.collection(0).is_some());
    assert!(worker.collection(1).is_none());
}

#[tokio::test]
async fn test_absent_collection_without_indexes() {
    let client = MemoryClient::new();
    let mut worker = worker(&client, 100);

    worker.ensure_collection(1, "events", &[]).await.unwrap();

    assert!(client.indexes(DB, "events").is_empty());
    assert!(worker.collection(1).is_some());
}

#[tokio::test]
async fn test_existing_collection_skips_creation_and_indexes() {
    let client = MemoryClient::new();
    seed_numbered(&client, "orders", 5);
    let mut worker = worker(&client, 100);

    worker
        .ensure_collection(0, "orders", &[IndexSpec::new(doc! { "value": 1 })])
        .await
        .unwrap();

    assert_eq!(client.create_collection_calls(DB), 0);
    assert!(client.indexes(DB, "orders").is_empty());
}

#[tokio::test]
async fn test_warm_up_caches_all_documents_when_fewer_than_sample_size() {
    let client = MemoryClient::new();
    seed_numbered(&client, "orders", 30);
    let mut worker = worker(&client, 100);

    worker.ensure_collection(0, "orders", &[]).await.unwrap();

    let cache = worker.cache(0).unwrap();
    assert_eq!(cache.len(), 30);
    let ids: HashSet<i64> = cache.iter().map(|id| id.as_i64().unwrap()).collect();
    assert_eq!(ids, (0..30).collect::<HashSet<i64>>());
}

#[tokio::test]
async fn test_warm_up_caps_at_sample_size() {
    let client = MemoryClient::new();
    seed_numbered(&client, "orders", 500);
    let mut worker = worker(&client, 100);

    worker.ensure_collection(0, "orders", &[]).await.unwrap();

    let cache = worker.cache(0).unwrap();
    assert_eq!(cache.len(), 100);
    assert!(cache
        .iter()
        .all(|id| matches!(id, Bson::Int64(n) if (0..500).contains(n))));
}

#[tokio::test]
async fn test_warm_up_of_empty_collection_leaves_cache_empty() {
    let client = MemoryClient::new();
    client.seed(DB, "orders", Vec::new());
    let mut worker = worker(&client, 100);

    worker.ensure_collection(0, "orders", &[]).await.unwrap();

    assert!(worker.cache(0).unwrap().is_empty());
    assert_eq!(client.aggregate_calls(DB, "orders"), 1);
}

#[tokio::test]
async fn test_zero_sample_size_does_not_query() {
    let client = MemoryClient::new();
    seed_numbered(&client, "orders", 10);
    let mut worker = worker(&client, 0);

    worker.ensure_collection(0, "orders", &[]).await.unwrap();

    assert!(worker.cache(0).unwrap().is_empty());
    assert_eq!(client.aggregate_calls(DB, "orders"), 0);
}

#[tokio::test]
async fn test_second_ensure_does_not_warm_up_again() {
    let client = MemoryClient::new();
    seed_numbered(&client, "orders", 50);
    let mut worker = worker(&client, 10);

    let first = worker.ensure_collection(0, "orders", &[]).await.unwrap();
    let cached: Vec<Bson> = worker.cache(0).unwrap().as_slice().to_vec();
    worker.ensure_collection(0, "orders", &[]).await.unwrap();

    assert_eq!(client.aggregate_calls(DB, "orders"), 1);
    assert_eq!(worker.cache(0).unwrap().as_slice(), cached.as_slice());
    assert!(Arc::ptr_eq(worker.collection(0).unwrap(), &first));
}

#[tokio::test]
async fn test_caches_are_private_per_worker() {
    let client = MemoryClient::new();
    seed_numbered(&client, "orders", 20);
    let mut first = worker(&client, 10);
    let mut second = worker(&client, 10);

    first.ensure_collection(0, "orders", &[]).await.unwrap();
    second.ensure_collection(0, "orders", &[]).await.unwrap();

    assert_eq!(client.aggregate_calls(DB, "orders"), 2);
    assert_eq!(first.cache(0).unwrap().len(), 10);
    assert_eq!(second.cache(0).unwrap().len(), 10);
}

#[tokio::test]
async fn test_handles_carry_decimal_codec_on_both_branches() {
    let client = MemoryClient::new();
    seed_numbered(&client, "existing", 1);
    let mut worker = worker(&client, 10);

    let created = worker.ensure_collection(0, "fresh", &[]).await.unwrap();
    let opened = worker.ensure_collection(1, "existing", &[]).await.unwrap();

    for coll in [created, opened] {
        assert!(coll.codec_options().type_registry().contains::<Decimal>());
    }
}

#[tokio::test]
async fn test_provisioning_errors_propagate() {
    for (point, seeded) in [
        (FailurePoint::ListCollections, false),
        (FailurePoint::CreateCollection, false),
        (FailurePoint::CreateIndexes, false),
        (FailurePoint::GetCollection, true),
        (FailurePoint::Aggregate, true),
    ] {
        let client = MemoryClient::new();
        if seeded {
            seed_numbered(&client, "orders", 3);
        }
        client.fail_on(point);
        let mut worker = worker(&client, 10);

        let result = worker
            .ensure_collection(0, "orders", &[IndexSpec::new(doc! { "value": 1 })])
            .await;

        assert!(
            matches!(result, Err(WorkloadError::Database { .. })),
            "{point:?} should surface a database error"
        );
        assert!(worker.collection(0).is_none());
    }
}

/// Client whose listing never sees collections, as when another worker
/// creates one right after we listed.
struct StaleListingClient {
    inner: MemoryClient,
}

struct StaleListingDatabase {
    inner: Arc<dyn DocumentDatabase>,
}

#[async_trait]
impl DocumentClient for StaleListingClient {
    fn database(&self, name: &str) -> Arc<dyn DocumentDatabase> {
        Arc::new(StaleListingDatabase {
            inner: self.inner.database(name),
        })
    }

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl DocumentDatabase for StaleListingDatabase {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn list_collection_names(&self) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    async fn create_collection(
        &self,
        name: &str,
        codec: CodecOptions,
    ) -> Result<Arc<dyn DocumentCollection>> {
        self.inner.create_collection(name, codec).await
    }

    async fn get_collection(
        &self,
        name: &str,
        codec: CodecOptions,
    ) -> Result<Arc<dyn DocumentCollection>> {
        self.inner.get_collection(name, codec).await
    }
}

#[tokio::test]
async fn test_losing_the_creation_race_opens_and_warms_up() {
    let memory = MemoryClient::new();
    seed_numbered(&memory, "orders", 7);
    let (env, _) = environment(settings(1, 100));
    let mut worker = MongoWorker::new(
        env,
        Arc::new(StaleListingClient {
            inner: memory.clone(),
        }),
    );

    worker
        .ensure_collection(0, "orders", &[IndexSpec::new(doc! { "value": 1 })])
        .await
        .unwrap();

    assert_eq!(memory.create_collection_calls(DB), 1);
    assert!(memory.indexes(DB, "orders").is_empty());
    assert_eq!(worker.cache(0).unwrap().len(), 7);
}
