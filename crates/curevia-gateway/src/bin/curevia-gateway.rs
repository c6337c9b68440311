//! Curevia Gateway Binary
//!
//! # Usage
//! ```bash
//! curevia-gateway [--config curevia.toml] [--verbose] serve [--port 8787] [--host 127.0.0.1]
//! curevia-gateway seed
//! curevia-gateway config
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand};
use curevia_core::config::CacheSettings;
use curevia_core::knowledge::{
    Embedder, HashingEmbedder, KnowledgeCache, KnowledgeStore, OpenAiEmbedder, SqliteKnowledgeStore,
};
use curevia_core::seed::seed_examples;
use curevia_gateway::{Gateway, GatewayConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Curevia Gateway - site assistant HTTP server
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// TOML configuration file
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Enable verbose debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the HTTP API
    Serve {
        /// Port to listen on (default: PORT or 8787)
        #[arg(short, long)]
        port: Option<u16>,

        /// Host to bind to
        #[arg(long)]
        host: Option<String>,
    },

    /// Insert the example FAQ set into the knowledge store
    Seed,

    /// Print the effective configuration as TOML
    Config,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    if verbose {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = GatewayConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve { port, host } => {
            if let Some(port) = port {
                config = config.with_port(port);
            }
            if let Some(host) = host {
                config = config.with_host(host);
            }
            print_banner(&config);

            let gateway = Gateway::from_config(config).await?;
            gateway.start().await?;
        }
        Commands::Seed => {
            let settings = config.resolver.cache.clone();
            let path = settings
                .db_path
                .clone()
                .context("Seeding needs a database path (CUREVIA_DB_PATH or [resolver.cache] db_path)")?;
            let store: Arc<dyn KnowledgeStore> = Arc::new(SqliteKnowledgeStore::open(&path)?);
            let cache = KnowledgeCache::new(store, embedder(&config, &settings), settings);
            let inserted = seed_examples(&cache)
                .await
                .context("Seeding example questions")?;
            println!("Seeded {} example questions into {}", inserted, path.display());
        }
        Commands::Config => {
            print!("{}", config.to_toml()?);
        }
    }

    Ok(())
}

fn embedder(config: &GatewayConfig, settings: &CacheSettings) -> Arc<dyn Embedder> {
    let provider = &config.resolver.provider;
    match &provider.api_key {
        Some(key) if provider.has_key() => Arc::new(OpenAiEmbedder::new(
            key.clone(),
            provider.api_base.clone(),
            settings.embed_model.clone(),
        )),
        _ => Arc::new(HashingEmbedder::new(settings.hashing_dimension)),
    }
}

fn print_banner(config: &GatewayConfig) {
    let resolver = &config.resolver;
    println!();
    println!("Curevia Gateway v{}", curevia_gateway::VERSION);
    println!("   └─ http://{}:{}", config.host, config.port);
    println!();
    println!("Endpoints");
    println!("   ├─ GET  /resolve  metadata and suggestions");
    println!("   ├─ POST /resolve  answer (JSON or SSE), contact, feedback");
    println!("   └─ GET  /health   liveness");
    println!();
    println!("Model {}  ·  provider key {}", resolver.provider.model, if resolver.provider.has_key() { "set" } else { "missing" });
    println!(
        "Rate limits {}/min general, {}/min generative",
        config.rate_limit_general, config.rate_limit_generative
    );
    println!();
}
