//! cloakscore-server: blind scoring service over HTTP
//!
//! Loads the vault key, the model artifact and the ledger at startup,
//! then serves sealed evaluation requests. Never holds a private context.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use eyre::{Result, WrapErr};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use cloakscore::protocol::{ArtifactStore, LEDGER_FILE};
use cloakscore::{http, FileLedger, ModelArtifact, ServerEngine};

#[derive(Parser)]
#[command(name = "cloakscore-server")]
#[command(about = "CloakScore blind scoring service")]
#[command(version)]
struct Args {
    /// Path to the deployment data directory (vault key, ledger)
    #[arg(long, default_value = "cloakscore_data")]
    data_dir: PathBuf,

    /// Path to the model artifact
    #[arg(long, default_value = "model.json")]
    model: PathBuf,

    /// Server bind address
    #[arg(long, default_value = "0.0.0.0:3000")]
    bind: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();

    info!("CloakScore scoring server");
    info!("Data directory: {}", args.data_dir.display());

    let store = ArtifactStore::new(&args.data_dir);
    let key = store
        .load_or_generate_key()
        .wrap_err("failed to load vault key")?;

    let artifact = ModelArtifact::load_json(&args.model)
        .wrap_err_with(|| format!("failed to load model artifact {}", args.model.display()))?;
    info!(
        "model loaded: {} features{}",
        artifact.feature_count(),
        if artifact.scaler.is_some() {
            ", standardized inputs"
        } else {
            ""
        }
    );

    let ledger_path = args.data_dir.join(LEDGER_FILE);
    info!("Ledger file: {}", ledger_path.display());
    let ledger = FileLedger::new(ledger_path);

    let engine = ServerEngine::new(artifact.model.clone(), Arc::new(key), ledger);
    let app = http::router(engine);

    info!("Starting server on {}", args.bind);
    let listener = tokio::net::TcpListener::bind(&args.bind).await?;

    println!();
    println!("=== CloakScore Scoring Server Running ===");
    println!("Listening on: http://{}", args.bind);
    println!();
    println!("Endpoints:");
    println!("  GET  /health   - Health check");
    println!("  GET  /model    - Model input shape");
    println!("  POST /evaluate - Score a sealed request, return result + receipt");
    println!();

    axum::serve(listener, app).await?;

    Ok(())
}
