#[cfg(feature = "cli")]
pub mod cli;

pub mod config;
pub mod export;
pub mod ingest;
pub mod kql;
pub mod models;
pub mod query_tools;
pub mod session;

pub use kql::{CompileError, CompileOptions, compile, compile_with, debug_plan};
pub use session::{QuerySession, SessionError};

/// Command line entrypoint
#[cfg(feature = "cli")]
pub async fn run(args: cli::Cli) -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();
    let _ = env_logger::Builder::new()
        // RUST_LOG, parsed last, overrides this default
        .filter_module("kqlite", log::LevelFilter::Warn)
        .parse_default_env()
        .is_test(false)
        .try_init();
    log::info!("Starting with data directory: {}", config::get_data_dir().display());
    cli::run(args).await
}
