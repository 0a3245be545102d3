//! Sample workload: an order book spread over `num_collections` collections.

use std::sync::Arc;

use async_trait::async_trait;
use bson::{doc, Bson, DateTime, Document};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;

use mongoload_core::{
    CodecOptions, DocumentClient, DocumentCollection, IndexSpec, Result, WorkloadError,
};
use mongoload_worker::{Environment, MongoTask, MongoWorker, Workload};

/// Documents written by one `insert_orders` call.
pub const ORDERS_PER_INSERT: usize = 10;

const CUSTOMERS: i64 = 10_000;

pub fn collection_name(coll_id: usize) -> String {
    format!("orders_{coll_id}")
}

pub struct OrdersWorkload {
    base: MongoWorker,
    rng: StdRng,
}

impl OrdersWorkload {
    pub fn new(environment: Arc<Environment>, client: Arc<dyn DocumentClient>) -> Self {
        Self {
            base: MongoWorker::new(environment, client),
            rng: StdRng::from_entropy(),
        }
    }

    fn pick_collection(&mut self) -> Result<(usize, Arc<dyn DocumentCollection>)> {
        let coll_id = self.rng.gen_range(0..self.base.num_collections());
        let collection = self
            .base
            .collection(coll_id)
            .cloned()
            .ok_or_else(|| {
                WorkloadError::operation(format!("{} is not provisioned", collection_name(coll_id)))
            })?;
        Ok((coll_id, collection))
    }

    fn pick_cached_id(&mut self, coll_id: usize) -> Result<Bson> {
        let cache = self
            .base
            .cache(coll_id)
            .ok_or(WorkloadError::InvalidCollectionIndex {
                index: coll_id,
                slots: self.base.num_collections(),
            })?;
        cache
            .choose(&mut self.rng)
            .cloned()
            .ok_or_else(|| WorkloadError::operation("identifier cache is empty"))
    }

    fn random_total(&mut self) -> Decimal {
        Decimal::new(self.rng.gen_range(100..1_000_000), 2)
    }

    fn new_order(&mut self, codec: &CodecOptions) -> Result<Document> {
        let mut order = doc! {
            "customer_id": self.rng.gen_range(0..CUSTOMERS),
            "status": "new",
            "items": self.rng.gen_range(1..20_i32),
            "created_at": DateTime::now(),
        };
        let total = self.random_total();
        codec.set_typed(&mut order, "total", &total)?;
        Ok(order)
    }

    /// Write a batch of orders. New ids are not cached; reads and updates only
    /// target documents sampled during warm-up.
    pub async fn insert_orders(&mut self) -> Result<()> {
        let (_, collection) = self.pick_collection()?;
        let orders = (0..ORDERS_PER_INSERT)
            .map(|_| self.new_order(collection.codec_options()))
            .collect::<Result<Vec<_>>>()?;

        collection.insert_many(orders).await?;
        Ok(())
    }

    pub async fn find_order(&mut self) -> Result<()> {
        let (coll_id, collection) = self.pick_collection()?;
        let id = self.pick_cached_id(coll_id)?;

        collection
            .find_one(doc! { "_id": id.clone() })
            .await?
            .ok_or_else(|| WorkloadError::not_found("order", id.to_string()))?;
        Ok(())
    }

    pub async fn update_order_total(&mut self) -> Result<()> {
        let (coll_id, collection) = self.pick_collection()?;
        let id = self.pick_cached_id(coll_id)?;

        let mut set = Document::new();
        let total = self.random_total();
        collection.codec_options().set_typed(&mut set, "total", &total)?;
        set.insert("status", "updated");

        collection
            .update_one(doc! { "_id": id }, doc! { "$set": set })
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Workload for OrdersWorkload {
    fn base(&self) -> &MongoWorker {
        &self.base
    }

    fn base_mut(&mut self) -> &mut MongoWorker {
        &mut self.base
    }

    async fn on_start(&mut self) -> Result<()> {
        let indexes = [IndexSpec::new(doc! { "customer_id": 1 })];
        for coll_id in 0..self.base.num_collections() {
            self.base
                .ensure_collection(coll_id, &collection_name(coll_id), &indexes)
                .await?;
        }
        Ok(())
    }

    fn tasks() -> Vec<MongoTask<Self>> {
        vec![
            MongoTask::new("insert_orders", |w: &mut OrdersWorkload| Box::pin(w.insert_orders()))
                .with_batch_size(ORDERS_PER_INSERT),
            MongoTask::new("find_order", |w: &mut OrdersWorkload| Box::pin(w.find_order()))
                .with_weight(3),
            MongoTask::new("update_order_total", |w: &mut OrdersWorkload| {
                Box::pin(w.update_order_total())
            })
            .with_weight(2),
        ]
    }
}
