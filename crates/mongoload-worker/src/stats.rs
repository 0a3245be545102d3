//! Reporting sinks and request statistics

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use uuid::Uuid;

use mongoload_core::{ReportingSink, RequestEvent};

/// Aggregated statistics for one operation name.
#[derive(Debug, Clone, Default, Serialize)]
pub struct OperationStats {
    pub request_type: String,
    pub name: String,
    pub num_requests: u64,
    pub num_failures: u64,
    pub total_response_time_ms: u64,
    pub total_content_length: u64,

    /// Individual response times, kept for percentiles
    #[serde(skip)]
    response_times_ms: Vec<u64>,
}

impl OperationStats {
    fn new(request_type: &str, name: &str) -> Self {
        Self {
            request_type: request_type.to_string(),
            name: name.to_string(),
            ..Default::default()
        }
    }

    fn record(&mut self, event: &RequestEvent) {
        self.num_requests += 1;
        if !event.is_success() {
            self.num_failures += 1;
        }
        self.total_response_time_ms += event.response_time_ms;
        self.total_content_length += event.response_length as u64;
        self.response_times_ms.push(event.response_time_ms);
    }

    fn merge(&mut self, other: &OperationStats) {
        self.num_requests += other.num_requests;
        self.num_failures += other.num_failures;
        self.total_response_time_ms += other.total_response_time_ms;
        self.total_content_length += other.total_content_length;
        self.response_times_ms
            .extend_from_slice(&other.response_times_ms);
    }

    /// Failure ratio (0.0-1.0)
    pub fn fail_ratio(&self) -> f64 {
        if self.num_requests == 0 {
            return 0.0;
        }
        self.num_failures as f64 / self.num_requests as f64
    }

    pub fn avg_response_time_ms(&self) -> f64 {
        if self.num_requests == 0 {
            return 0.0;
        }
        self.total_response_time_ms as f64 / self.num_requests as f64
    }

    pub fn min_response_time_ms(&self) -> u64 {
        self.response_times_ms.iter().copied().min().unwrap_or(0)
    }

    pub fn max_response_time_ms(&self) -> u64 {
        self.response_times_ms.iter().copied().max().unwrap_or(0)
    }

    /// Response time at percentile `p` (0.0-1.0)
    pub fn percentile(&self, p: f64) -> u64 {
        if self.response_times_ms.is_empty() {
            return 0;
        }

        let mut sorted = self.response_times_ms.clone();
        sorted.sort_unstable();

        let index = ((sorted.len() as f64) * p) as usize;
        sorted[index.min(sorted.len() - 1)]
    }

    pub fn p50(&self) -> u64 {
        self.percentile(0.50)
    }

    pub fn p95(&self) -> u64 {
        self.percentile(0.95)
    }

    pub fn p99(&self) -> u64 {
        self.percentile(0.99)
    }
}

/// Error occurrences grouped by operation and message.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ErrorStats {
    pub name: String,
    pub error: String,
    pub occurrences: u64,
}

/// Point-in-time view of everything a [`StatsCollector`] has seen.
#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub duration_secs: f64,
    pub entries: Vec<OperationStats>,
    pub total: OperationStats,
    pub errors: Vec<ErrorStats>,
}

impl StatsSnapshot {
    /// Requests per second over the whole run
    pub fn throughput_rps(&self) -> f64 {
        if self.duration_secs == 0.0 {
            return 0.0;
        }
        self.total.num_requests as f64 / self.duration_secs
    }

    pub fn entry(&self, name: &str) -> Option<&OperationStats> {
        self.entries.iter().find(|e| e.name == name)
    }
}

#[derive(Default)]
struct StatsState {
    entries: BTreeMap<(String, String), OperationStats>,
    errors: BTreeMap<(String, String), u64>,
}

/// Sink aggregating events per operation name.
pub struct StatsCollector {
    run_id: Uuid,
    started: Instant,
    started_at: DateTime<Utc>,
    state: Mutex<StatsState>,
}

impl StatsCollector {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started: Instant::now(),
            started_at: Utc::now(),
            state: Mutex::new(StatsState::default()),
        }
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        self.snapshot_with_duration(self.started.elapsed())
    }

    fn snapshot_with_duration(&self, duration: Duration) -> StatsSnapshot {
        let state = self.state.lock();

        let entries: Vec<OperationStats> = state.entries.values().cloned().collect();
        let mut total = OperationStats::new("", "Aggregated");
        for entry in &entries {
            total.merge(entry);
        }

        let errors = state
            .errors
            .iter()
            .map(|((name, error), occurrences)| ErrorStats {
                name: name.clone(),
                error: error.clone(),
                occurrences: *occurrences,
            })
            .collect();

        StatsSnapshot {
            run_id: self.run_id,
            started_at: self.started_at,
            duration_secs: duration.as_secs_f64(),
            entries,
            total,
            errors,
        }
    }
}

impl Default for StatsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportingSink for StatsCollector {
    fn fire(&self, event: RequestEvent) {
        let mut state = self.state.lock();

        let key = (event.request_type.to_string(), event.name.to_string());
        state
            .entries
            .entry(key)
            .or_insert_with(|| OperationStats::new(event.request_type, &event.name))
            .record(&event);

        if let Some(error) = &event.exception {
            *state
                .errors
                .entry((event.name.to_string(), error.to_string()))
                .or_insert(0) += 1;
        }
    }
}

/// Sink keeping every event in arrival order.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<RequestEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<RequestEvent> {
        self.events.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl ReportingSink for RecordingSink {
    fn fire(&self, event: RequestEvent) {
        self.events.lock().push(event);
    }
}

/// Sink forwarding every event to several sinks.
pub struct FanoutSink {
    sinks: Vec<Arc<dyn ReportingSink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<Arc<dyn ReportingSink>>) -> Self {
        Self { sinks }
    }
}

impl ReportingSink for FanoutSink {
    fn fire(&self, event: RequestEvent) {
        if let Some((last, rest)) = self.sinks.split_last() {
            for sink in rest {
                sink.fire(event.clone());
            }
            last.fire(event);
        }
    }
}
