//! Command-line front end for nvforge.

use anyhow::Result;
use clap::Parser;
use nvforge_cli::{run_cli, Cli};

fn main() -> Result<()> {
    let cli = Cli::parse();
    run_cli(cli)
}
