//! MediaVault - Single-user Media Gallery
//!
//! Serves the gallery over HTTP on top of the configured storage backend.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mediavault::api::HttpServer;
use mediavault::config::{BackendKind, GalleryConfig};
use mediavault::error::Result;
use mediavault::storage::{self, StorageBackend};

/// MediaVault - Single-user Media Gallery
#[derive(Parser)]
#[command(name = "mediavault")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (optional; environment variables override it)
    #[arg(short, long, default_value = "mediavault.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gallery web server
    Serve,

    /// Write a sample configuration file
    Init {
        /// Output path for configuration file
        #[arg(short, long, default_value = "mediavault.toml")]
        output: PathBuf,

        /// Storage backend to configure (local, object, cdn)
        #[arg(long, default_value = "local")]
        backend: BackendKind,
    },

    /// Validate configuration (file plus environment)
    Validate,

    /// Connect to the configured backend and count stored assets
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Init { output, backend } => {
            init_logging(cli.log_level.as_deref().unwrap_or("info"));
            run_init(output, backend)
        }
        Commands::Validate => {
            init_logging(cli.log_level.as_deref().unwrap_or("warn"));
            run_validate(cli.config)
        }
        Commands::Serve => {
            let config = load_config(&cli.config, cli.log_level.as_deref())?;
            run_serve(config).await
        }
        Commands::Check => {
            let config = load_config(&cli.config, cli.log_level.as_deref())?;
            run_check(config).await
        }
    }
}

/// Initialize logging
fn init_logging(level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| level.into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Load configuration, then start logging at the configured level (the
/// command line wins over the file)
fn load_config(path: &Path, cli_level: Option<&str>) -> Result<GalleryConfig> {
    match GalleryConfig::load(path) {
        Ok(config) => {
            init_logging(cli_level.unwrap_or(&config.logging.level));
            Ok(config)
        }
        Err(e) => {
            init_logging(cli_level.unwrap_or("info"));
            tracing::error!("Failed to load configuration: {}", e);
            tracing::error!("USERNAME, PASSWORD and SECRET_KEY must be set in the environment or {:?}", path);
            Err(e)
        }
    }
}

/// Start the gallery
async fn run_serve(config: GalleryConfig) -> Result<()> {
    tracing::info!("Starting MediaVault...");

    let backend = storage::from_config(&config.storage).await.map_err(|e| {
        tracing::error!("Failed to initialize {} storage: {}", config.storage.backend, e);
        e
    })?;

    let server = HttpServer::new(&config, backend);

    tokio::select! {
        result = server.start() => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutting down");
            Ok(())
        }
    }
}

/// Count assets in the configured backend
async fn run_check(config: GalleryConfig) -> Result<()> {
    let backend = storage::from_config(&config.storage).await?;
    let listing = backend.list().await;

    match listing.error {
        Some(error) => {
            println!("✗ {} backend unreachable: {}", backend.kind(), error);
            Err(mediavault::Error::BackendUnavailable(error))
        }
        None => {
            println!("✓ {} backend reachable", backend.kind());
            println!("  Assets: {}", listing.assets.len());
            if let Some(newest) = listing.assets.first() {
                println!("  Newest: {} ({})", newest.name, newest.created_at.to_rfc3339());
            }
            Ok(())
        }
    }
}

/// Write a sample configuration file
fn run_init(output: PathBuf, backend: BackendKind) -> Result<()> {
    let config_content = format!(r#"# MediaVault Configuration
# Secrets are best supplied through the environment:
#   USERNAME, PASSWORD, SECRET_KEY
#   S3_BUCKET_NAME, S3_REGION, AWS_ACCESS_KEY_ID, AWS_SECRET_ACCESS_KEY
#   CLOUDINARY_CLOUD_NAME, CLOUDINARY_API_KEY, CLOUDINARY_API_SECRET

[server]
bind_address = "0.0.0.0:8080"
max_upload_mb = 256

[auth]
# username = "admin"
# password = "changeme"
# secret_key = "at-least-16-random-bytes"
session_ttl_secs = 604800
secure_cookies = false

[storage]
backend = "{backend}"

[storage.local]
upload_dir = "static/uploads"

[storage.object]
# bucket = "my-gallery"
# region = "us-east-1"
# endpoint = "http://localhost:9000"

[storage.cdn]
# cloud_name = "my-cloud"

[logging]
level = "info"
"#);

    if output.exists() {
        return Err(mediavault::Error::Config(format!(
            "{:?} already exists, refusing to overwrite",
            output
        )));
    }

    std::fs::write(&output, config_content)?;
    println!("✓ Configuration written to {:?}", output);
    println!("  Set USERNAME, PASSWORD and SECRET_KEY before running `mediavault serve`");
    Ok(())
}

/// Validate configuration
fn run_validate(config_path: PathBuf) -> Result<()> {
    match GalleryConfig::load(&config_path) {
        Ok(config) => {
            println!("✓ Configuration is valid");
            println!("  Bind Address: {}", config.server.bind_address);
            println!("  User: {}", config.auth.username);
            println!("  Backend: {}", config.storage.backend);
            match config.storage.backend {
                BackendKind::Local => {
                    println!("  Upload Dir: {:?}", config.storage.local.upload_dir)
                }
                BackendKind::Object => println!(
                    "  Bucket: {} ({})",
                    config.storage.object.bucket, config.storage.object.region
                ),
                BackendKind::Cdn => println!("  Cloud: {}", config.storage.cdn.cloud_name),
            }
            Ok(())
        }
        Err(e) => {
            println!("✗ Configuration is invalid: {}", e);
            Err(e)
        }
    }
}
