//! CLI argument definitions.

use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};

use oaiharvest::config;
use oaiharvest::{Granularity, HarvestRequest, HarvesterConfig, RepositoryRef};

use crate::commands::{count::CountArgs, headers::HeadersArgs, record::RecordArgs};

/// OAI-PMH CLI tool for repository exploration.
#[derive(Parser, Debug)]
#[command(name = "oaiharvest")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Output logs as JSON
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(flatten)]
    pub client: ClientArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the list size a repository reports for a harvest
    Count(CountArgs),

    /// List record headers, following resumption tokens
    Headers(HeadersArgs),

    /// Fetch a single record
    Record(RecordArgs),
}

/// HTTP client settings.
#[derive(Args, Debug)]
pub struct ClientArgs {
    /// Retries after a failed request
    #[arg(long, global = true, default_value_t = config::DEFAULT_NUMBER_OF_RETRIES)]
    pub retries: u32,

    /// Seconds to wait between retries
    #[arg(long, global = true, default_value_t = config::DEFAULT_TIME_BETWEEN_RETRIES.as_secs())]
    pub retry_wait: u64,

    /// Connect timeout in seconds
    #[arg(long, global = true, default_value_t = config::DEFAULT_CONNECT_TIMEOUT.as_secs())]
    pub connect_timeout: u64,

    /// Socket read timeout in seconds
    #[arg(long, global = true, default_value_t = config::DEFAULT_SOCKET_TIMEOUT.as_secs())]
    pub socket_timeout: u64,

    /// Request timeout in seconds
    #[arg(long, global = true, default_value_t = config::DEFAULT_REQUEST_TIMEOUT.as_secs())]
    pub request_timeout: u64,

    /// User-Agent header sent with every request
    #[arg(long, global = true)]
    pub user_agent: Option<String>,
}

impl ClientArgs {
    pub fn to_config(&self) -> HarvesterConfig {
        let config = HarvesterConfig::default()
            .with_number_of_retries(self.retries)
            .with_time_between_retries(Duration::from_secs(self.retry_wait))
            .with_connect_timeout(Duration::from_secs(self.connect_timeout))
            .with_socket_timeout(Duration::from_secs(self.socket_timeout))
            .with_request_timeout(Duration::from_secs(self.request_timeout));
        match &self.user_agent {
            Some(user_agent) => config.with_user_agent(user_agent.as_str()),
            None => config,
        }
    }
}

/// Repository and metadata format.
#[derive(Args, Debug)]
pub struct RepositoryArgs {
    /// Base URL of the OAI-PMH endpoint
    pub url: String,

    /// Metadata prefix to request
    #[arg(short, long, default_value = "oai_dc")]
    pub prefix: String,
}

impl RepositoryArgs {
    pub fn to_repository(&self) -> Result<RepositoryRef> {
        RepositoryRef::new(&self.url, self.prefix.as_str()).context("Invalid repository")
    }
}

/// Selective harvesting options.
#[derive(Args, Debug)]
pub struct SelectionArgs {
    /// Set spec to restrict the harvest to
    #[arg(long)]
    pub set: Option<String>,

    /// Lower datestamp bound (YYYY-MM-DD or RFC 3339)
    #[arg(long, value_parser = parse_datestamp)]
    pub from: Option<DateTime<Utc>>,

    /// Upper datestamp bound (YYYY-MM-DD or RFC 3339)
    #[arg(long, value_parser = parse_datestamp)]
    pub until: Option<DateTime<Utc>>,

    /// Send from/until with day granularity
    #[arg(long)]
    pub day_granularity: bool,
}

impl SelectionArgs {
    pub fn to_request(&self, repository: RepositoryRef) -> Result<HarvestRequest> {
        let mut builder = HarvestRequest::builder(repository);
        if let Some(set) = &self.set {
            builder = builder.set_spec(set.as_str());
        }
        if let Some(from) = self.from {
            builder = builder.from(from);
        }
        if let Some(until) = self.until {
            builder = builder.until(until);
        }
        if self.day_granularity {
            builder = builder.granularity(Granularity::Day);
        }
        builder.build().context("Invalid harvest request")
    }
}

fn parse_datestamp(value: &str) -> std::result::Result<DateTime<Utc>, String> {
    if let Ok(instant) = DateTime::parse_from_rfc3339(value) {
        return Ok(instant.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map(|day| day.and_time(chrono::NaiveTime::MIN).and_utc())
        .map_err(|_| format!("'{value}' is neither YYYY-MM-DD nor an RFC 3339 timestamp"))
}
