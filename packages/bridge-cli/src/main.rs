use anyhow::{Context, Result};
use bridge_core::{
    chain_adapter::{ChainAdapterFactory, DefaultChainAdapterFactory},
    signer::Ed25519Signer,
    Config, EventSink, RelayerEvent, Router,
};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log verbosity: 0-5 or a level name (error, warn, info, debug, trace)
    #[arg(short, long, global = true, value_name = "LEVEL")]
    verbosity: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate and summarize a config file
    ValidateConfig {
        /// Path to the config file
        #[arg(short, long, value_name = "FILE")]
        config: PathBuf,
    },
    /// Run the relayer until interrupted
    Start {
        /// Path to the config file
        #[arg(short, long, value_name = "FILE")]
        config: PathBuf,

        /// Environment variable holding the hex-encoded ed25519 signing key
        #[arg(long, value_name = "VAR", default_value = "BRIDGE_SIGNER_KEY")]
        signer_key_env: String,
    },
}

fn init_logging(verbosity: Option<&str>) -> Result<()> {
    let filter = match verbosity {
        Some(level) => EnvFilter::try_new(level_directive(level)?)?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
    Ok(())
}

fn level_directive(level: &str) -> Result<&str> {
    let directive = match level.to_ascii_lowercase().as_str() {
        "0" | "off" => "off",
        "1" | "error" | "crit" => "error",
        "2" | "warn" => "warn",
        "3" | "info" => "info",
        "4" | "debug" => "debug",
        "5" | "trace" => "trace",
        other => anyhow::bail!("unknown verbosity level: {}", other),
    };
    Ok(directive)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbosity.as_deref())?;

    match cli.command {
        Commands::ValidateConfig { config } => {
            info!("Validating config file: {:?}", config);
            let config = Config::load(config)?;
            println!("Config file is valid.");
            println!("Summary:");
            println!("- Chains:");
            for chain in &config.chains {
                println!("  - {} ({}): {} @ {}", chain.name, chain.id, chain.adapter_type, chain.rpc_url);
                println!("    receiver: {}, emitter: {}", chain.receiver, chain.emitter);
                for filter in &chain.subscriptions {
                    println!("    - subscription {}: {}", filter.name, filter.topic);
                }
            }
            println!("- Relayer:");
            println!("  - max attempts: {}", config.relayer.max_attempts);
            println!(
                "  - retry delay: {}ms - {}ms",
                config.relayer.retry_base_delay_ms, config.relayer.retry_max_delay_ms
            );
            println!("  - queue capacity: {}", config.relayer.queue_capacity);
            println!("  - shutdown deadline: {}ms", config.relayer.shutdown_deadline_ms);
            Ok(())
        }
        Commands::Start { config, signer_key_env } => {
            info!("Starting relayer");
            info!("Using config file: {:?}", config);

            let config = Config::load(config)?;
            let secret = std::env::var(&signer_key_env)
                .with_context(|| format!("signing key variable {} is not set", signer_key_env))?;
            let signer = Arc::new(Ed25519Signer::from_hex(&secret)?);
            info!(public_key = %hex::encode(signer.verifying_key().to_bytes()), "signer loaded");

            let factory = DefaultChainAdapterFactory::new(
                signer,
                config.relayer.poll_interval(),
                config.relayer.submit_timeout(),
            );
            let (sink, mut events) = EventSink::channel();
            let mut router = Router::new(config.relayer.clone(), sink);
            for chain in &config.chains {
                let adapter = factory.create_adapter(chain).await?;
                router.add_chain(adapter)?;
            }

            router.start()?;
            info!("Relayer initialized, running");

            let mut delivered: u64 = 0;
            let mut failed: u64 = 0;
            loop {
                tokio::select! {
                    signal = tokio::signal::ctrl_c() => {
                        if let Err(e) = signal {
                            error!("failed to listen for shutdown signal: {}", e);
                        }
                        break;
                    }
                    event = events.recv() => match event {
                        Some(RelayerEvent::Delivered { .. }) => delivered += 1,
                        Some(_) => failed += 1,
                        None => break,
                    },
                }
            }

            info!("Stopping relayer");
            let report = router.stop().await?;
            while let Ok(event) = events.try_recv() {
                if event.is_success() {
                    delivered += 1;
                } else {
                    failed += 1;
                }
            }
            if !report.graceful {
                warn!(aborted = ?report.aborted, "shutdown deadline elapsed before all work finished");
            }
            info!(delivered, failed, "Relayer stopped");
            Ok(())
        }
    }
}
