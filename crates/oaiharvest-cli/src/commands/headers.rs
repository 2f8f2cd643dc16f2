//! Headers command implementation.

use anyhow::{Context, Result};
use clap::Args;
use oaiharvest::{Harvester, HarvesterConfig, HarvestingIterator, IterationResult};

use crate::cli::{RepositoryArgs, SelectionArgs};
use crate::output::{self, HeaderFormat};

#[derive(Args, Debug)]
pub struct HeadersArgs {
    #[command(flatten)]
    pub repository: RepositoryArgs,

    #[command(flatten)]
    pub selection: SelectionArgs,

    /// Also list deleted records
    #[arg(long)]
    pub include_deleted: bool,

    /// Stop after this many headers (at least 1)
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub limit: Option<u64>,

    /// Print one JSON object per header
    #[arg(long)]
    pub json: bool,
}

pub fn run(args: HeadersArgs, config: HarvesterConfig) -> Result<()> {
    let request = args.selection.to_request(args.repository.to_repository()?)?;
    let harvester = Harvester::with_config(config).context("Invalid client settings")?;
    let mut headers = harvester
        .harvest_record_headers(request)
        .context("Failed to start harvest")?;

    let include_deleted = args.include_deleted;
    let format = HeaderFormat::from_json_flag(args.json);
    let mut stdout = std::io::stdout().lock();
    let mut printed = 0u64;
    let mut output_error = None;
    let result = headers.for_each_filtered(
        |header| {
            if let Err(e) = output::write_header(&mut stdout, &header, format) {
                output_error = Some(e);
                return Ok(IterationResult::Terminate);
            }
            printed += 1;
            if args.limit.is_some_and(|limit| printed >= limit) {
                return Ok(IterationResult::Terminate);
            }
            Ok(IterationResult::Continue)
        },
        |header| include_deleted || !header.is_deleted(),
    );
    headers.close();

    result.context("Failed to list headers")?;
    if let Some(e) = output_error {
        return Err(e);
    }

    if printed == 0 {
        output::note("No headers found.");
    }

    Ok(())
}
