mod api;
mod config;
mod core;
mod domain;
mod heartbeat;
mod reconcile;
mod recurrence;
mod scorecard;
mod sequences;
mod store;
mod tasks;

#[cfg(test)]
mod testing;

use std::path::PathBuf;

use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut config_path = PathBuf::from("config.toml");

    // Handle CLI arguments
    let args: Vec<String> = std::env::args().collect();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--version" | "-V" => {
                println!("crmd {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            "--help" | "-h" => {
                println!("crmd {}", env!("CARGO_PKG_VERSION"));
                println!("{}\n", env!("CARGO_PKG_DESCRIPTION"));
                println!("Usage: crmd [OPTIONS]\n");
                println!("Options:");
                println!("  -c, --config <PATH>  Config file (default: config.toml)");
                println!("  -h, --help           Print help");
                println!("  -V, --version        Print version");
                return Ok(());
            }
            "--config" | "-c" => {
                i += 1;
                match args.get(i) {
                    Some(path) => config_path = PathBuf::from(path),
                    None => {
                        eprintln!("--config requires a path");
                        std::process::exit(2);
                    }
                }
            }
            other => {
                eprintln!("Unknown argument: '{}'. Try --help.", other);
                std::process::exit(2);
            }
        }
        i += 1;
    }

    let config = config::AppConfig::load(&config_path)?;

    // Run async
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(crate::core::run(config))
}
