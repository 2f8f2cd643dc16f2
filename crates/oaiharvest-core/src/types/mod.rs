//! Descriptor types.
//!
//! These are immutable values describing what to harvest and what was
//! harvested. Constructors validate their inputs so that an invalid request
//! never reaches the network.

mod header;
mod record;
mod repository;
mod request;

pub use header::RecordHeader;
pub use record::Record;
pub use repository::RepositoryRef;
pub use request::{Granularity, HarvestRequest, HarvestRequestBuilder};
