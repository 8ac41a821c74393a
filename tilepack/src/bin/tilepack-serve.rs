use std::env;
use std::process;

use clap::Parser;
use tilepack::TilepackResult;
use tilepack::args::ServeArgs;
use tilepack::config::ConfigError;
use tilepack::logging::{LOG_FORMAT_ENV, filter_from_env, init_tracing};
use tilepack::srv::new_server;
use tilepack_mbtiles::{MbtilesReader, TileScheme};
use tracing::{error, info};

const VERSION: &str = env!("CARGO_PKG_VERSION");

async fn start(args: ServeArgs) -> TilepackResult<()> {
    info!("Starting tilepack-serve v{VERSION}");

    let path = args.archive().ok_or(ConfigError::MissingInput)?;
    let mut reader = MbtilesReader::open(path).await?;
    if args.tms {
        reader = reader.with_scheme(TileScheme::Tms);
    }
    if let Some((min_zoom, max_zoom)) = reader.zoom_range().await? {
        info!("Serving {} with zooms {min_zoom}..={max_zoom}", reader.mbtiles());
    }

    let (server, listen_address) = new_server(args.listen_address(), reader)?;
    info!("tilepack-serve has been started on {listen_address}.");
    server.await
}

#[actix_web::main]
async fn main() {
    init_tracing(
        &filter_from_env(env::var("RUST_LOG").ok()),
        env::var(LOG_FORMAT_ENV).ok(),
    );

    let args = ServeArgs::parse();
    if let Err(e) = start(args).await {
        error!("{e}");
        process::exit(1);
    }
}
