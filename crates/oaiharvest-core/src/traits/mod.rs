//! Core traits for connections and harvesting iterators.

mod connection;
mod iterator;

pub use connection::{Connection, ConnectionFactory};
pub use iterator::{HarvestingIterator, IterationResult};
