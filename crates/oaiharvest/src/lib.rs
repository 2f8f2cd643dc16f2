//! oaiharvest - Blocking OAI-PMH harvester
//!
//! Walks `ListIdentifiers` resumption tokens lazily, one page at a time,
//! and fetches single records with `GetRecord`. All work happens on the
//! calling thread; independent harvests may run on separate threads, each
//! with its own connection.
//!
//! # Example
//!
//! ```no_run
//! use oaiharvest::{HarvestRequest, Harvester, HarvesterConfig, RepositoryRef};
//!
//! # fn main() -> oaiharvest::Result<()> {
//! let harvester = Harvester::with_config(HarvesterConfig::default())?;
//! let repository = RepositoryRef::new("https://example.org/oai", "edm")?;
//!
//! let total = harvester.count_records(HarvestRequest::full(repository.clone()))?;
//! println!("repository reports {total:?} records");
//!
//! let record = harvester.harvest_record(&repository, "oai:example.org:1")?;
//! println!("{} bytes", record.metadata()?.len());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod harvester;
pub mod iterator;
pub mod parser;
pub mod transport;

#[cfg(test)]
mod test_support;

pub use config::HarvesterConfig;
pub use harvester::Harvester;
pub use iterator::{HeaderIterator, PostProcessing};
pub use parser::{HeaderPage, RecordParser};
pub use transport::{HttpConnection, HttpConnectionFactory, Interrupter, RetryPolicy};

// Re-export the core model so most callers need only this crate.
pub use oaiharvest_core::{
    Connection, ConnectionFactory, Error, Granularity, HarvestRequest, HarvestRequestBuilder,
    HarvestingIterator, IterationResult, OaiRequest, ProtocolError, Record, RecordHeader,
    RepositoryRef, ResponseBody, Result, SetupError, TransportError, UsageError, Verb,
};
