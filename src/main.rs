mod args;
mod classify;
mod config;
mod control;
mod dirsynth;
mod dispatcher;
mod error;
mod filters;
mod fsid;
mod path;
mod resolve;
mod rooted_io;
mod routing;

use std::fs::File;

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::info;

use args::Args;
use config::Config;
use dispatcher::StrataFs;

fn main() -> Result<()> {
    let args = Args::parse();

    log4rs::init_file("log4rs.yml", Default::default())
        .context("initializing logging from log4rs.yml")?;

    if unsafe { libc::getuid() } != 0 {
        bail!("must run as root to chroot into stratum roots");
    }

    let config = Config::load(&args.config)?;
    let mountpoint = args.mountpoint.unwrap_or_else(|| config.mountpoint.clone());

    let initial_root = File::open("/")
        .context("opening initial root directory")?;
    let strata_root = File::open(&config.strata_root)
        .with_context(|| format!("opening strata root {}", config.strata_root.display()))?;
    let redirector = std::fs::read(&config.redirector_path)
        .with_context(|| format!("reading redirector binary {}", config.redirector_path.display()))?;

    let launcher_path = config
        .launcher_path
        .to_str()
        .context("launcher_path is not valid UTF-8")?
        .to_owned();

    let fs = StrataFs::new(&initial_root, strata_root, redirector, launcher_path);

    if !config.initial_routes.is_empty() {
        info!("applying {} initial route(s)", config.initial_routes.len());
        fs.apply_startup_routes(&config.initial_routes)
            .context("applying initial_routes from configuration")?;
    }

    let mut fuse_args = vec!["-o".to_owned(), "ro".to_owned()];
    if config.allow_other {
        fuse_args.push("-o".to_owned());
        fuse_args.push("allow_other".to_owned());
    }
    let fuse_args: Vec<&std::ffi::OsStr> = fuse_args.iter().map(std::ffi::OsStr::new).collect();

    info!("mounting at {}", mountpoint.display());
    fuse_mt::mount(fuse_mt::FuseMT::new(fs, 1), &mountpoint, &fuse_args)
        .with_context(|| format!("mounting at {}", mountpoint.display()))?;

    Ok(())
}
