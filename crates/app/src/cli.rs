use anyhow::{Context, Result};
use clap::Parser;

use crate::vision::{CamwatchCliArgs, CamwatchConfig};

/// Parse the process arguments into a validated configuration.
///
/// `--help` and `--version` print and exit here, like any clap binary.
pub fn parse_config() -> Result<CamwatchConfig> {
    let args = CamwatchCliArgs::parse();
    CamwatchConfig::try_from(args).context("Invalid configuration")
}
