//! Database handle implementations for mongoload.
//!
//! [`MongoClient`] talks to a real cluster through the official driver;
//! [`MemoryClient`] keeps everything in process and is used by tests.

pub mod memory;
pub mod mongo;

pub use memory::{FailurePoint, MemoryClient};
pub use mongo::MongoClient;
