use std::path::PathBuf;

use clap::Args;

#[derive(Args)]
pub struct Run {
    /// Path to the TOML configuration file. Built-in defaults are used when
    /// omitted.
    #[clap(long, short)]
    pub config: Option<PathBuf>,
}
