use thiserror::Error;

/// Canonical error type shared by every mongoload crate.
#[derive(Debug, Error)]
pub enum WorkloadError {
    /// A database call failed (existence check, creation, query, ...).
    #[error("database error during {operation}: {message}")]
    Database {
        /// Name of the database operation that failed (e.g. `"create_collection"`).
        operation: &'static str,
        /// Driver supplied details.
        message: String,
    },

    /// Entity already exists and cannot be created again.
    #[error("{entity} `{name}` already exists")]
    AlreadyExists {
        /// Entity type name (e.g. `"collection"`).
        entity: &'static str,
        /// Name that conflicts.
        name: String,
    },

    /// Entity was not found.
    #[error("{entity} `{name}` was not found")]
    NotFound {
        /// Entity type name (e.g. `"collection"`).
        entity: &'static str,
        /// Name of the missing entity.
        name: String,
    },

    /// A value could not be converted to or from its wire representation.
    #[error("codec error: {0}")]
    Codec(String),

    /// Settings could not be loaded or failed validation.
    #[error("configuration error: {0}")]
    Config(String),

    /// Logical collection index outside the worker's slot range.
    #[error("collection index {index} out of range (worker manages {slots} collections)")]
    InvalidCollectionIndex {
        /// Requested logical index.
        index: usize,
        /// Number of slots the worker was built with.
        slots: usize,
    },

    /// The backend does not implement the requested feature.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// Domain failure raised by a workload operation.
    #[error("operation failed: {0}")]
    Operation(String),

    /// I/O error (report files, config files).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkloadError {
    /// Creates a `Database` variant.
    #[must_use]
    pub fn database(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Database {
            operation,
            message: message.into(),
        }
    }

    /// Creates an `AlreadyExists` variant.
    #[must_use]
    pub fn already_exists(entity: &'static str, name: impl Into<String>) -> Self {
        Self::AlreadyExists {
            entity,
            name: name.into(),
        }
    }

    /// Creates a `NotFound` variant.
    #[must_use]
    pub fn not_found(entity: &'static str, name: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            name: name.into(),
        }
    }

    /// Creates an `Operation` variant.
    #[must_use]
    pub fn operation(message: impl Into<String>) -> Self {
        Self::Operation(message.into())
    }

    /// Returns true when the error reports a name collision.
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }
}

impl From<config::ConfigError> for WorkloadError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<serde_json::Error> for WorkloadError {
    fn from(err: serde_json::Error) -> Self {
        Self::Codec(err.to_string())
    }
}

/// Convenient result alias for mongoload operations.
pub type Result<T> = std::result::Result<T, WorkloadError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let err = WorkloadError::database("list_collection_names", "connection refused");
        assert_eq!(
            err.to_string(),
            "database error during list_collection_names: connection refused"
        );

        let err = WorkloadError::InvalidCollectionIndex { index: 4, slots: 2 };
        assert_eq!(
            err.to_string(),
            "collection index 4 out of range (worker manages 2 collections)"
        );
    }

    #[test]
    fn test_already_exists_predicate() {
        assert!(WorkloadError::already_exists("collection", "orders_0").is_already_exists());
        assert!(!WorkloadError::not_found("collection", "orders_0").is_already_exists());
    }
}
