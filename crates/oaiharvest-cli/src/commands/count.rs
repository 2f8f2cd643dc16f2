//! Count command implementation.

use anyhow::{Context, Result};
use clap::Args;

use oaiharvest::{Harvester, HarvesterConfig};

use crate::cli::{RepositoryArgs, SelectionArgs};
use crate::output;

#[derive(Args, Debug)]
pub struct CountArgs {
    #[command(flatten)]
    pub repository: RepositoryArgs,

    #[command(flatten)]
    pub selection: SelectionArgs,
}

pub fn run(args: CountArgs, config: HarvesterConfig) -> Result<()> {
    let request = args.selection.to_request(args.repository.to_repository()?)?;
    let harvester = Harvester::with_config(config).context("Invalid client settings")?;

    let count = harvester
        .count_records(request)
        .context("Failed to count records")?;

    output::write_list_size(&mut std::io::stdout().lock(), count)
}
