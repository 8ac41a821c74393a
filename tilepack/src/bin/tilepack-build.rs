use std::env;
use std::process;

use clap::Parser;
use log::log_enabled;
use tilepack::TilepackResult;
use tilepack::args::BuildArgs;
use tilepack::config::{BuildConfig, read_config};
use tilepack::logging::{LOG_FORMAT_ENV, filter_from_env, init_tracing};
use tilepack::pipeline::build;
use tracing::{error, info};

const VERSION: &str = env!("CARGO_PKG_VERSION");

async fn start(args: BuildArgs) -> TilepackResult<()> {
    info!("Starting tilepack-build v{VERSION}");

    let save_config = args.meta.save_config.clone();
    let mut config = if let Some(ref cfg_filename) = args.meta.config {
        info!("Using {}", cfg_filename.display());
        read_config(cfg_filename)?
    } else {
        BuildConfig::default()
    };
    args.merge_into_config(&mut config);

    if let Some(file_name) = save_config {
        config.save_to_file(file_name)?;
    }
    let plan = config.finalize()?;

    let summary = build(&plan).await?;
    info!(
        "Done: {} tiles requested, {} saved, {} dropped",
        summary.requested, summary.saved, summary.dropped
    );
    Ok(())
}

#[tokio::main]
async fn main() {
    init_tracing(
        &filter_from_env(env::var("RUST_LOG").ok()),
        env::var(LOG_FORMAT_ENV).ok(),
    );

    let args = BuildArgs::parse();
    if let Err(e) = start(args).await {
        // Ensure the message is printed, even if the logging is disabled
        if log_enabled!(log::Level::Error) {
            error!("{e}");
        } else {
            eprintln!("{e}");
        }
        process::exit(1);
    }
}
