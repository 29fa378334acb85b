//! LabelDB server binary.

use actix_web::{App, HttpServer};
use clap::Parser;
use labeldb_server::{configure, AppContext, ServerConfig, VERSION};
use std::net::SocketAddr;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// A REST-addressable entity store with a real-time change feed.
#[derive(Debug, Parser)]
#[command(name = "labeldb", version = VERSION)]
struct Args {
    /// Address to bind to.
    #[arg(long, default_value = "127.0.0.1:8080")]
    bind: SocketAddr,

    /// Entity type to serve; repeat for multiple types.
    #[arg(long = "entity-type", required = true)]
    entity_types: Vec<String>,

    /// Advertised base URL used in write-result URIs.
    #[arg(long)]
    addr: Option<String>,

    /// Disable the websocket change feed.
    #[arg(long)]
    no_cdc: bool,

    /// Per-subscriber buffer of the change feed.
    #[arg(long, default_value_t = 1024)]
    feed_buffer: usize,

    /// Websocket write deadline in seconds.
    #[arg(long, default_value_t = 5)]
    write_timeout: u64,

    /// Compatibility version assumed when clients send no version header.
    #[arg(long)]
    default_client_version: Option<String>,
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let mut config = ServerConfig::new(args.bind)
        .with_entity_types(args.entity_types)
        .with_cdc(!args.no_cdc)
        .with_feed_buffer(args.feed_buffer)
        .with_write_timeout(Duration::from_secs(args.write_timeout));
    if let Some(addr) = args.addr {
        config = config.with_addr(addr);
    }
    if let Some(version) = args.default_client_version {
        config = config.with_default_client_version(version);
    }

    let bind_addr = config.bind_addr;
    let ctx = AppContext::from_config(config)
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidInput, err.to_string()))?;

    info!(
        version = VERSION,
        %bind_addr,
        entity_types = ?ctx.store.entity_types(),
        cdc = ctx.config.cdc_enabled,
        "labeldb starting"
    );

    HttpServer::new(move || App::new().configure(configure(ctx.clone())))
        .bind(bind_addr)?
        .run()
        .await
}
