#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bson::doc;
use mongoload_core::{DocumentClient, IndexSpec, Result, Settings, WorkloadError};
use mongoload_driver::MemoryClient;
use mongoload_worker::{Environment, MongoTask, MongoWorker, RecordingSink, Workload};

pub const DB: &str = "load_test";

pub fn settings(num_collections: usize, docs_to_cache: usize) -> Settings {
    Settings {
        db_name: DB.to_string(),
        num_collections,
        docs_to_cache,
        ..Default::default()
    }
}

pub fn environment(settings: Settings) -> (Arc<Environment>, Arc<RecordingSink>) {
    let sink = Arc::new(RecordingSink::new());
    let env = Arc::new(Environment::new(Arc::new(settings), sink.clone()));
    (env, sink)
}

pub fn seed_numbered(client: &MemoryClient, collection: &str, count: usize) {
    let docs = (0..count).map(|i| doc! { "_id": i as i64, "value": i as i64 }).collect();
    client.seed(DB, collection, docs);
}

/// Workload with one operation per interesting outcome.
pub struct ProbeWorkload {
    pub base: MongoWorker,
    pub calls: usize,
}

impl ProbeWorkload {
    pub fn new(environment: Arc<Environment>, client: Arc<dyn DocumentClient>) -> Self {
        Self {
            base: MongoWorker::new(environment, client),
            calls: 0,
        }
    }

    pub async fn succeed(&mut self) -> Result<()> {
        self.calls += 1;
        Ok(())
    }

    pub async fn fail(&mut self) -> Result<()> {
        self.calls += 1;
        Err(WorkloadError::operation("domain failure"))
    }

    pub async fn slow(&mut self) -> Result<()> {
        tokio::time::sleep(Duration::from_millis(20)).await;
        Ok(())
    }

    pub async fn read_cached(&mut self) -> Result<()> {
        let id = {
            let cache = self
                .base
                .cache(0)
                .ok_or_else(|| WorkloadError::operation("no cache slot"))?;
            cache
                .get(self.calls % cache.len().max(1))
                .cloned()
                .ok_or_else(|| WorkloadError::operation("identifier cache is empty"))?
        };
        self.calls += 1;

        let collection = self
            .base
            .collection(0)
            .cloned()
            .ok_or_else(|| WorkloadError::operation("collection not provisioned"))?;
        collection
            .find_one(doc! { "_id": id })
            .await?
            .ok_or_else(|| WorkloadError::operation("cached document vanished"))?;
        Ok(())
    }
}

#[async_trait]
impl Workload for ProbeWorkload {
    fn base(&self) -> &MongoWorker {
        &self.base
    }

    fn base_mut(&mut self) -> &mut MongoWorker {
        &mut self.base
    }

    async fn on_start(&mut self) -> Result<()> {
        self.base
            .ensure_collection(0, "probe", &[IndexSpec::new(doc! { "value": 1 })])
            .await?;
        Ok(())
    }

    fn tasks() -> Vec<MongoTask<Self>> {
        vec![
            MongoTask::new("read_cached", |w: &mut ProbeWorkload| Box::pin(w.read_cached()))
                .with_weight(3),
            MongoTask::new("succeed", |w: &mut ProbeWorkload| Box::pin(w.succeed())),
            MongoTask::new("fail", |w: &mut ProbeWorkload| Box::pin(w.fail())).with_weight(0),
        ]
    }
}
