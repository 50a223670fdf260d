use anyhow::{Context, Result};
use clap::Parser;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::runtime::Builder;
use tracing::{debug, info};

use fetchdns::cli::{self, Cli};
use fetchdns::config::{self, FetchConfig};
use fetchdns::resolver::{LookupOutcome, Resolver};

fn main() -> Result<()> {
    // Lookups are IO-bound; a couple of threads beyond the core count helps,
    // capped to keep context switching in check.
    let num_cpus = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4);
    let worker_threads = std::cmp::min(num_cpus + 2, 16);

    debug!("Configuring Tokio runtime with {} worker threads", worker_threads);

    let runtime = Builder::new_multi_thread()
        .worker_threads(worker_threads)
        .enable_all()
        .build()
        .context("Failed to create Tokio runtime")?;

    runtime.block_on(async_main())
}

async fn async_main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = fetch_config_from_cli(&cli)?;
    let resolver = Resolver::new(Duration::from_millis(cli.timeout_ms))?;

    match &cli.command {
        cli::Commands::Single { key } => {
            info!("Resolving single key: {}", key);
            let outcome = match resolver.query(&config, key).await {
                Ok(address) if address.is_empty() => LookupOutcome {
                    key: key.clone(),
                    address: None,
                    error: None,
                },
                Ok(address) => LookupOutcome {
                    key: key.clone(),
                    address: Some(address),
                    error: None,
                },
                Err(e) => LookupOutcome {
                    key: key.clone(),
                    address: None,
                    error: Some(e.to_string()),
                },
            };
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        cli::Commands::Batch {
            input_file,
            output_file,
        } => {
            info!("Resolving keys from file: {:?}", input_file);
            let keys = read_keys(input_file).await?;
            let outcomes = resolver
                .query_many(&config, keys, cli.concurrent_requests)
                .await;

            let mut writer = match output_file {
                Some(path) => Some(
                    File::create(path)
                        .await
                        .context("Failed to create output file")?,
                ),
                None => None,
            };
            for outcome in &outcomes {
                let line = serde_json::to_string(outcome)?;
                match writer {
                    Some(ref mut w) => {
                        w.write_all(line.as_bytes()).await?;
                        w.write_all(b"\n").await?;
                    }
                    None => println!("{}", line),
                }
            }
            if let Some(ref mut w) = writer {
                w.flush().await?;
            }

            let stats = resolver.stats();
            info!(
                "Resolved {} keys ({} cache hits, {} misses, {} fetch failures)",
                outcomes.len(),
                stats.cache_hits,
                stats.cache_misses,
                stats.fetch_failures
            );
        }
    }

    Ok(())
}

fn fetch_config_from_cli(cli: &Cli) -> Result<FetchConfig> {
    let mut config = FetchConfig::new(cli.url.clone())?
        .with_method(config::parse_method(&cli.method)?);
    config.query_template = cli.query.clone();
    config.body_template = cli.body.clone();
    config.headers = cli.headers.clone();
    config.address_extractor = cli.analyze_ip.clone();
    config.ttl_extractor = cli.analyze_ttl.clone();
    Ok(config)
}

/// Reads lookup keys from a file, one per line, skipping blanks and comments.
async fn read_keys(path: &std::path::Path) -> Result<Vec<String>> {
    let file = File::open(path)
        .await
        .context(format!("Failed to open key file: {:?}", path))?;
    let reader = BufReader::with_capacity(64 * 1024, file);
    let mut lines = reader.lines();
    let mut keys = Vec::new();

    while let Some(line) = lines.next_line().await? {
        let trimmed = line.trim();
        if !trimmed.is_empty() && !trimmed.starts_with('#') {
            keys.push(trimmed.to_string());
        }
    }

    Ok(keys)
}
