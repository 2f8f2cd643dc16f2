//! Record command implementation.

use anyhow::{Context, Result};
use clap::Args;

use oaiharvest::{Harvester, HarvesterConfig};

use crate::cli::RepositoryArgs;
use crate::output;

#[derive(Args, Debug)]
pub struct RecordArgs {
    #[command(flatten)]
    pub repository: RepositoryArgs,

    /// OAI identifier of the record
    pub identifier: String,

    /// Print only the header fields
    #[arg(long)]
    pub header_only: bool,
}

pub fn run(args: RecordArgs, config: HarvesterConfig) -> Result<()> {
    let repository = args.repository.to_repository()?;
    let harvester = Harvester::with_config(config).context("Invalid client settings")?;

    let record = harvester
        .harvest_record(&repository, &args.identifier)
        .context("Failed to get record")?;
    let header = record.header();
    let mut stdout = std::io::stdout().lock();

    if args.header_only || header.is_deleted() {
        output::write_header_json(&mut stdout, header)?;
        if header.is_deleted() {
            output::note("Record is deleted; no metadata.");
        }
        return Ok(());
    }

    output::write_record_header(&mut stdout, header)?;
    output::write_metadata(&mut stdout, record.metadata()?)
}
