use std::path::{Path, PathBuf};
use std::sync::Arc;

use al_server::bootstrap::{self, RuntimeConfig};
use al_server::config::AppConfig;
use al_server::handler::AppState;
use al_server::rng::StdRandom;
use al_server::routes;
use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "al", about = "auto-labeling annotation server")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to the configuration file.
    #[arg(short, long, default_value = "config.toml", global = true)]
    config: PathBuf,
}

#[derive(Subcommand)]
enum Command {
    /// Start the HTTP server (default).
    Serve,
    /// Validate configuration file and exit.
    Validate,
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Some(Command::Validate) => run_validate(&cli.config),
        Some(Command::Serve) | None => {
            if let Err(e) = run_serve(&cli.config) {
                eprintln!("Server error: {e:#}");
                std::process::exit(1);
            }
        }
    }
}

fn load_runtime(path: &Path) -> RuntimeConfig {
    let config = match AppConfig::from_file(path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error reading config: {e}");
            std::process::exit(1);
        }
    };

    match bootstrap::into_runtime(config) {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Config invalid: {e}");
            std::process::exit(1);
        }
    }
}

fn run_validate(path: &Path) {
    let runtime = load_runtime(path);
    println!(
        "Config valid: {} ({} users, listening on {})",
        path.display(),
        runtime.auth_service.users().count(),
        runtime.listen_addr
    );
}

fn run_serve(path: &Path) -> Result<(), anyhow::Error> {
    let runtime = load_runtime(path);
    init_tracing(&runtime.log_level, &runtime.log_format);

    let store = runtime.storage.open()?;
    let listen_addr = runtime.listen_addr;
    let state = Arc::new(AppState::new(
        runtime.auth_service,
        store,
        Arc::new(StdRandom::new(runtime.seed)),
    ));

    let rt = tokio::runtime::Runtime::new().context("starting tokio runtime")?;
    rt.block_on(async move {
        let listener = tokio::net::TcpListener::bind(listen_addr)
            .await
            .with_context(|| format!("binding {listen_addr}"))?;
        tracing::info!(addr = %listen_addr, "listening");
        routes::serve(listener, state).await?;
        Ok::<(), anyhow::Error>(())
    })
}

/// `RUST_LOG` takes precedence over the configured level.
fn init_tracing(level: &str, format: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if format == "pretty" {
        builder.pretty().init();
    } else {
        builder.json().init();
    }
}
