//! Command-line arguments.

use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(author, version, about = "Unifies stratum root directories into one FUSE namespace")]
pub struct Args {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = "/etc/stratafs.toml")]
    pub config: PathBuf,

    /// Mount point, overriding the one named in the configuration file.
    #[arg(long)]
    pub mountpoint: Option<PathBuf>,

    /// Stay in the foreground instead of forking into the background.
    #[arg(short, long)]
    pub foreground: bool,

    /// Enable verbose (debug-level) logging regardless of the log
    /// configuration file's own level.
    #[arg(short, long)]
    pub debug: bool,
}
