//! Timed operation wrapper
//!
//! A [`MongoTask`] wraps one workload operation. Running it measures the
//! wall-clock time of the call and reports `batch_size` result events, all
//! sharing the same elapsed time and outcome. Failures are logged and turned
//! into failure events; they never reach the caller.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use futures::future::BoxFuture;
use tracing::warn;

use mongoload_core::{RequestEvent, Result};

use crate::workload::Workload;

/// Future returned by a workload operation borrowing its worker.
pub type OperationFuture<'a> = BoxFuture<'a, Result<()>>;

type Operation<W> = dyn for<'a> Fn(&'a mut W) -> OperationFuture<'a> + Send + Sync;

/// A named, weighted workload operation that reports its own timing.
pub struct MongoTask<W> {
    name: Arc<str>,
    weight: u32,
    batch_size: usize,
    operation: Arc<Operation<W>>,
}

impl<W> Clone for MongoTask<W> {
    fn clone(&self) -> Self {
        Self {
            name: Arc::clone(&self.name),
            weight: self.weight,
            batch_size: self.batch_size,
            operation: Arc::clone(&self.operation),
        }
    }
}

impl<W> fmt::Debug for MongoTask<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MongoTask")
            .field("name", &self.name)
            .field("weight", &self.weight)
            .field("batch_size", &self.batch_size)
            .finish()
    }
}

impl<W: Workload> MongoTask<W> {
    /// Wrap `operation` under `name` with weight 1 and batch size 1.
    ///
    /// ```ignore
    /// MongoTask::new("insert_orders", |w: &mut Orders| Box::pin(w.insert_orders()))
    ///     .with_batch_size(10)
    /// ```
    pub fn new<F>(name: &str, operation: F) -> Self
    where
        F: for<'a> Fn(&'a mut W) -> OperationFuture<'a> + Send + Sync + 'static,
    {
        Self {
            name: Arc::from(name),
            weight: 1,
            batch_size: 1,
            operation: Arc::new(operation),
        }
    }

    /// Relative selection frequency, consumed by the runner.
    #[must_use]
    pub fn with_weight(mut self, weight: u32) -> Self {
        self.weight = weight;
        self
    }

    /// Number of logical operations one call represents.
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn weight(&self) -> u32 {
        self.weight
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Run the wrapped operation against `worker` and report the outcome.
    pub async fn run(&self, worker: &mut W) {
        let start = Instant::now();
        let outcome = (self.operation)(worker).await;
        let response_time_ms = start.elapsed().as_millis() as u64;

        let events = worker.base().environment().events();
        match outcome {
            Ok(()) => {
                for _ in 0..self.batch_size {
                    events.fire(RequestEvent::success(
                        Arc::clone(&self.name),
                        response_time_ms,
                    ));
                }
            }
            Err(error) => {
                warn!(operation = %self.name, error = %error, "Operation failed");
                let error = Arc::new(error);
                for _ in 0..self.batch_size {
                    events.fire(RequestEvent::failure(
                        Arc::clone(&self.name),
                        response_time_ms,
                        Arc::clone(&error),
                    ));
                }
            }
        }
    }
}
