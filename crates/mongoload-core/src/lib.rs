//! Core types and collaborator traits for the mongoload workload generator.

pub mod codec;
pub mod error;
pub mod event;
pub mod settings;
pub mod traits;

pub use codec::{CodecOptions, DecimalCodec, TypeCodec, TypeRegistry};
pub use error::{Result, WorkloadError};
pub use event::{RequestEvent, REQUEST_TYPE};
pub use settings::Settings;
pub use traits::{DocumentClient, DocumentCollection, DocumentDatabase, IndexSpec, ReportingSink};
