// Copyright (c) 2026 Federa Contributors
// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use federa_core::verify::{PemChainVerifier, Xmlsec1Verifier};
use federa_daemon::auth::Authorizer;
use federa_daemon::config::{self, Config};
use federa_daemon::gc::Collector;
use federa_daemon::http;
use federa_daemon::server::AmService;
use federa_daemon::store::{MemoryStore, ObjectStore};

#[derive(Parser, Debug)]
#[command(name = "federa-daemon", about = "GENI AM API v3 aggregate manager")]
struct Args {
    /// Address to serve the AM API on.
    #[arg(long, default_value = "127.0.0.1:8890")]
    listen: SocketAddr,

    /// Authority chain this manager speaks for (colon-separated).
    #[arg(long, default_value = "example.org")]
    authority_name: String,

    /// Public URL advertised by GetVersion.
    #[arg(long, default_value = "http://localhost:8890/am")]
    absolute_url: String,

    /// Disk image mapping, repeatable: short-name=container-image-reference.
    #[arg(long = "container-image", value_parser = config::parse_image_flag)]
    container_images: Vec<(String, String)>,

    /// Short name of the image used when a request names none.
    #[arg(long, default_value = "ubuntu2004")]
    default_image: String,

    #[arg(long, default_value = "2")]
    container_cpu_limit: String,

    #[arg(long, default_value = "2Gi")]
    container_memory_limit: String,

    /// Trusted federation root certificate (PEM), repeatable.
    #[arg(long = "trusted-root-cert")]
    trusted_root_certs: Vec<PathBuf>,

    /// Seconds between expiry-collection ticks.
    #[arg(long, default_value_t = 30)]
    gc_interval_secs: u64,

    /// Log filter, e.g. `info` or `federa_daemon=debug`.
    #[arg(long, default_value = "info")]
    log: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&args.log)?)
        .init();

    let trusted_roots = config::read_trusted_roots(&args.trusted_root_certs)?;
    if trusted_roots.is_empty() {
        tracing::warn!("no trusted roots configured, every credential will be rejected");
    }

    let mut config = Config {
        listen: args.listen,
        authority: args.authority_name,
        absolute_url: args.absolute_url,
        default_image: args.default_image,
        cpu_limit: args.container_cpu_limit,
        memory_limit: args.container_memory_limit,
        trusted_roots,
        gc_interval: Duration::from_secs(args.gc_interval_secs),
        ..Config::default()
    };
    config.images.extend(args.container_images);
    if !config.images.contains_key(&config.default_image) {
        return Err(format!("default image {:?} has no mapping", config.default_image).into());
    }

    let store: Arc<dyn ObjectStore> = Arc::new(MemoryStore::default());
    let authorizer = Authorizer::new(
        config.trusted_roots.clone(),
        Arc::new(Xmlsec1Verifier::default()),
        Arc::new(PemChainVerifier),
    );
    let service = AmService::new(config.clone(), store.clone(), authorizer);

    Collector::new(store, config.gc_interval, config.gc_timeout).spawn();

    let listener = tokio::net::TcpListener::bind(config.listen).await?;
    tracing::info!(listen = %config.listen, authority = %config.authority, "aggregate manager listening");
    axum::serve(listener, http::router(service)).await?;
    Ok(())
}
