//! wlwire schema cache
//!
//! Compiles the protocol documents named by the configuration and writes
//! the resulting schema as JSON for later loading with `Schema::from_json`.

use anyhow::{Context, Result};
use std::fs;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wlwire::config::{Config, ProtocolSource};
use wlwire::{DocumentSource, SchemaCompiler};

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "wlwire=debug,info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load configuration")?;
    let protocols = config.protocols.clone();
    let mut compiler = SchemaCompiler::with_config(protocols.clone());

    let sources: Vec<DocumentSource> = match protocols.source {
        ProtocolSource::Local => compiler
            .get_local_files()
            .into_iter()
            .map(DocumentSource::from)
            .collect(),
        ProtocolSource::Remote => compiler
            .get_remote_uris()
            .context("Failed to list remote protocols")?
            .into_iter()
            .map(DocumentSource::Uri)
            .collect(),
    };
    info!("Compiling {} protocol documents", sources.len());

    compiler
        .parse_all(sources)
        .context("Failed to compile protocol documents")?;

    let json = compiler
        .to_json(protocols.minimise)
        .context("Failed to serialize schema")?;
    let cache_path = protocols
        .cache_path()
        .context("No cache path configured")?;
    if let Some(parent) = cache_path.parent() {
        fs::create_dir_all(parent).context("Failed to create cache directory")?;
    }
    fs::write(&cache_path, json).context("Failed to write schema")?;

    info!(
        "Wrote {} interfaces to {:?}",
        compiler.schema().len(),
        cache_path
    );
    Ok(())
}
