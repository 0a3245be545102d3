use std::sync::Arc;

use crate::error::WorkloadError;

/// Category tag attached to every result event emitted by mongoload.
pub const REQUEST_TYPE: &str = "mongodb";

/// Response-size indicator reported for successful operations.
pub const SUCCESS_RESPONSE_LENGTH: usize = 1;

/// One reported outcome of a timed workload operation.
#[derive(Debug, Clone)]
pub struct RequestEvent {
    /// Fixed subsystem tag, see [`REQUEST_TYPE`]
    pub request_type: &'static str,

    /// Operation name shown in statistics
    pub name: Arc<str>,

    /// Elapsed wall-clock time in whole milliseconds
    pub response_time_ms: u64,

    /// 0 on failure, [`SUCCESS_RESPONSE_LENGTH`] on success
    pub response_length: usize,

    /// Captured error when the operation failed; shared by all events of one invocation
    pub exception: Option<Arc<WorkloadError>>,
}

impl RequestEvent {
    pub fn success(name: Arc<str>, response_time_ms: u64) -> Self {
        Self {
            request_type: REQUEST_TYPE,
            name,
            response_time_ms,
            response_length: SUCCESS_RESPONSE_LENGTH,
            exception: None,
        }
    }

    pub fn failure(name: Arc<str>, response_time_ms: u64, error: Arc<WorkloadError>) -> Self {
        Self {
            request_type: REQUEST_TYPE,
            name,
            response_time_ms,
            response_length: 0,
            exception: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.exception.is_none()
    }
}
