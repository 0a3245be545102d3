//! Workload workers for mongoload.
//!
//! A [`MongoWorker`] is the per-virtual-user state: the shared database
//! handle, one collection slot and one [`IdentifierCache`] per logical
//! collection. Concrete workloads embed it, implement [`Workload`] and
//! register their operations as [`MongoTask`]s, which time every call and
//! report the outcome to the environment's [`ReportingSink`].
//!
//! [`ReportingSink`]: mongoload_core::ReportingSink

pub mod cache;
pub mod environment;
pub mod metrics;
pub mod report;
pub mod runner;
pub mod stats;
pub mod task;
pub mod worker;
pub mod workload;

pub use cache::IdentifierCache;
pub use environment::Environment;
pub use metrics::PrometheusSink;
pub use report::{ReportFormat, ReportWriter};
pub use runner::{RunSummary, RunnerConfig, WorkloadRunner};
pub use stats::{FanoutSink, OperationStats, RecordingSink, StatsCollector, StatsSnapshot};
pub use task::{MongoTask, OperationFuture};
pub use worker::MongoWorker;
pub use workload::Workload;
