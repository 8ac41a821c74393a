use std::env;
use std::process;

use clap::Parser;
use tilepack::TilepackResult;
use tilepack::args::MergeArgs;
use tilepack::logging::{LOG_FORMAT_ENV, filter_from_env, init_tracing};
use tilepack_mbtiles::MbtilesMerger;
use tracing::{error, info};

async fn start(args: MergeArgs) -> TilepackResult<()> {
    let mut merger = MbtilesMerger::new(args.inputs, args.output);
    if let Some(batch_size) = args.batch_size {
        merger = merger.with_batch_size(batch_size);
    }
    let summary = merger.run().await?;
    info!(
        "Merged {} tiles from {} archives",
        summary.tiles, summary.sources
    );
    Ok(())
}

#[tokio::main]
async fn main() {
    init_tracing(
        &filter_from_env(env::var("RUST_LOG").ok()),
        env::var(LOG_FORMAT_ENV).ok(),
    );

    let args = MergeArgs::parse();
    if let Err(e) = start(args).await {
        error!("{e}");
        process::exit(1);
    }
}
