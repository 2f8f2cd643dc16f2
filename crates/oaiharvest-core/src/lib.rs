//! oaiharvest-core - Core OAI-PMH harvesting types and traits.

pub mod error;
pub mod protocol;
pub mod traits;
pub mod types;

pub use error::{Error, ProtocolError, SetupError, TransportError, UsageError};
pub use protocol::{OaiRequest, ResponseBody, Verb};
pub use traits::{Connection, ConnectionFactory, HarvestingIterator, IterationResult};
pub use types::{Granularity, HarvestRequest, HarvestRequestBuilder, Record, RecordHeader, RepositoryRef};

/// Result type alias using the crate's Error type.
pub type Result<T> = std::result::Result<T, Error>;
