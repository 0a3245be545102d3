//! In-process runner driving workload workers

use std::sync::Arc;
use std::time::Duration;

use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::time::Instant;
use tracing::{error, info};

use mongoload_core::{DocumentClient, Result, WorkloadError};

use crate::environment::Environment;
use crate::task::MongoTask;
use crate::workload::Workload;

/// Builds one worker per simulated user.
pub type WorkerFactory<W> =
    dyn Fn(Arc<Environment>, Arc<dyn DocumentClient>) -> Result<W> + Send + Sync;

/// Configuration for a run
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Number of concurrent simulated users
    pub users: usize,

    /// How long each user keeps issuing operations
    pub run_time: Duration,

    /// Seed for task selection; `None` draws from OS entropy
    pub seed: Option<u64>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            users: 10,
            run_time: Duration::from_secs(60),
            seed: None,
        }
    }
}

/// Outcome of a run, per worker.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub workers_completed: usize,
    pub workers_failed: usize,
    pub tasks_executed: u64,
}

/// Spawns workers and lets each pick weighted tasks until the deadline.
pub struct WorkloadRunner<W: Workload> {
    config: RunnerConfig,
    environment: Arc<Environment>,
    client: Arc<dyn DocumentClient>,
    factory: Arc<WorkerFactory<W>>,
}

impl<W: Workload> WorkloadRunner<W> {
    pub fn new<F>(
        config: RunnerConfig,
        environment: Arc<Environment>,
        client: Arc<dyn DocumentClient>,
        factory: F,
    ) -> Self
    where
        F: Fn(Arc<Environment>, Arc<dyn DocumentClient>) -> Result<W> + Send + Sync + 'static,
    {
        Self {
            config,
            environment,
            client,
            factory: Arc::new(factory),
        }
    }

    /// Run all users to completion.
    ///
    /// A user whose construction or `on_start` fails stops immediately and is
    /// counted in `workers_failed`; the others keep going.
    pub async fn run(&self) -> Result<RunSummary> {
        let tasks: Arc<Vec<MongoTask<W>>> = Arc::new(W::tasks());
        if tasks.is_empty() {
            return Err(WorkloadError::Config("workload registers no tasks".to_string()));
        }
        let weights = WeightedIndex::new(tasks.iter().map(MongoTask::weight))
            .map_err(|e| WorkloadError::Config(format!("invalid task weights: {e}")))?;

        info!(
            users = self.config.users,
            run_time = ?self.config.run_time,
            tasks = tasks.len(),
            "Starting workload"
        );

        let deadline = Instant::now() + self.config.run_time;
        let mut handles = Vec::with_capacity(self.config.users);

        for user_id in 0..self.config.users {
            let user = User {
                id: user_id,
                factory: Arc::clone(&self.factory),
                environment: Arc::clone(&self.environment),
                client: Arc::clone(&self.client),
                tasks: Arc::clone(&tasks),
                weights: weights.clone(),
                rng: match self.config.seed {
                    Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(user_id as u64)),
                    None => StdRng::from_entropy(),
                },
                deadline,
            };
            handles.push(tokio::spawn(user.run()));
        }

        let mut summary = RunSummary::default();
        for (user_id, handle) in handles.into_iter().enumerate() {
            match handle.await {
                Ok(Ok(executed)) => {
                    summary.workers_completed += 1;
                    summary.tasks_executed += executed;
                }
                Ok(Err(e)) => {
                    error!(user = user_id, error = %e, "Worker stopped");
                    summary.workers_failed += 1;
                }
                Err(e) => {
                    error!(user = user_id, error = %e, "Worker task aborted");
                    summary.workers_failed += 1;
                }
            }
        }

        info!(
            completed = summary.workers_completed,
            failed = summary.workers_failed,
            tasks = summary.tasks_executed,
            "Workload finished"
        );
        Ok(summary)
    }
}

struct User<W: Workload> {
    id: usize,
    factory: Arc<WorkerFactory<W>>,
    environment: Arc<Environment>,
    client: Arc<dyn DocumentClient>,
    tasks: Arc<Vec<MongoTask<W>>>,
    weights: WeightedIndex<u32>,
    rng: StdRng,
    deadline: Instant,
}

impl<W: Workload> User<W> {
    async fn run(mut self) -> Result<u64> {
        let mut worker = (self.factory)(self.environment, self.client)?;
        worker.on_start().await?;

        let mut executed = 0u64;
        while Instant::now() < self.deadline {
            let task = &self.tasks[self.weights.sample(&mut self.rng)];
            task.run(&mut worker).await;
            executed += 1;

            let wait = worker.base().wait_time();
            if wait.is_zero() {
                tokio::task::yield_now().await;
            } else {
                tokio::time::sleep(wait).await;
            }
        }

        tracing::debug!(user = self.id, executed, "User finished");
        Ok(executed)
    }
}
