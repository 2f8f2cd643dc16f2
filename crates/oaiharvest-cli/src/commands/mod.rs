//! Subcommand implementations.

pub mod count;
pub mod headers;
pub mod record;
