//! clustergen - main entry point
//!
//! Parses the command line, installs logging and the child-process signal
//! handlers, then hands off to the asset store.

use anyhow::Result;
use clustergen::cli::{Cli, Commands, run_create, run_validate};
use clustergen::process_guard::{self, ProcessGuard};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

/// Install the tracing subscriber; `RUST_LOG` overrides `--log-level`.
fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse_args();
    init_logging(&cli.log_level);
    debug!("clustergen {} starting", env!("CARGO_PKG_VERSION"));

    if let Err(e) = process_guard::init_signal_handlers() {
        // Tools are still stopped when the guard drops
        warn!("Failed to install signal handlers: {}", e);
    }
    let guard = ProcessGuard::new();

    match cli.command {
        Commands::Create {
            target,
            dir,
            config,
            terraform,
        } => {
            info!("Creating {} in {}", target, dir.display());
            let created = run_create(target, &dir, config.as_deref(), terraform.as_deref());
            if let Err(e) = &created {
                error!("{:#}", e);
            }
            // Interrupted runs still persisted what they could; report the signal
            if let Some(sig) = process_guard::shutdown_requested() {
                warn!("Stopped by {}", process_guard::signal_name(sig));
                drop(guard);
                std::process::exit(128 + sig);
            }
            if created.is_err() {
                drop(guard);
                std::process::exit(1);
            }
        }
        Commands::Validate { config } => match run_validate(&config) {
            Ok(install_config) => {
                println!(
                    "✓ {} is valid (cluster {:?})",
                    config.display(),
                    install_config.cluster_name
                );
            }
            Err(e) => {
                eprintln!("✗ {:#}", e);
                std::process::exit(1);
            }
        },
    }

    Ok(())
}
