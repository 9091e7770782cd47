use facebank::common::{Config, Paths, Result};
use facebank::core::{BoundedExtractor, OnnxExtractor, VerifyPolicy};
use facebank::service::{serve_connection, ServiceState, SessionManager};
use facebank::storage::{FsAccountStore, UploadArchive};

use anyhow::Context as _;
use clap::Parser;
use std::fs;
use std::os::unix::net::UnixListener;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "facebank-service")]
#[command(about = "FaceBank account service")]
struct Args {
    /// Run in development mode
    #[arg(long)]
    dev: bool,

    /// Socket path override
    #[arg(long)]
    socket: Option<PathBuf>,

    /// Config file override
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("Starting FaceBank service (dev_mode: {})", args.dev);

    let paths = Paths::new(args.dev);
    let config_path = args.config.unwrap_or_else(|| paths.config_file());
    let config = Config::load_from_path(&config_path)?;

    let socket_path = args.socket.unwrap_or_else(|| paths.socket_path());

    // Models load once and are shared by every connection
    let onnx = OnnxExtractor::new(&config)?;
    let extractor = BoundedExtractor::new(
        Arc::new(onnx),
        Duration::from_millis(config.extraction.timeout_ms),
    );

    let store = FsAccountStore::new(&config.storage.accounts_dir)?;
    let uploads = UploadArchive::new(&config.storage.uploads_dir)?;
    let sessions = SessionManager::new(Duration::from_secs(config.session.ttl_seconds));

    let state = Arc::new(ServiceState {
        extractor: Arc::new(extractor),
        store: Arc::new(store),
        sessions,
        uploads: Some(uploads),
        verify_policy: VerifyPolicy {
            tolerance: config.matching.verification_tolerance,
            presence_check: config.extraction.presence_check,
        },
    });

    // Clean up a stale socket from a previous run
    if socket_path.exists() {
        fs::remove_file(&socket_path)?;
    }
    if let Some(parent) = socket_path.parent() {
        fs::create_dir_all(parent)?;
    }

    let listener = UnixListener::bind(&socket_path).context("Failed to bind Unix socket")?;
    tracing::info!("Listening on {:?}", socket_path);

    for stream in listener.incoming() {
        match stream {
            Ok(stream) => {
                let state = Arc::clone(&state);
                thread::spawn(move || {
                    if let Err(e) = serve_connection(stream, state) {
                        tracing::error!("Client error: {}", e);
                    }
                });
            }
            Err(e) => {
                tracing::error!("Connection error: {}", e);
            }
        }
    }

    Ok(())
}
