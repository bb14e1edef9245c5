//! cloakscore-client: encrypt features, decode and verify sealed results
//!
//! `encrypt` walks a fresh session from context generation through the
//! transmitted request, persisting every artifact under the session
//! directory. `decrypt` resumes that session (possibly on another day or
//! machine), decodes the sealed result and refuses to report a score the
//! ledger does not confirm.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use eyre::{Result, WrapErr};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Deserialize;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use cloakscore::protocol::{
    ArtifactStore, EvaluationReceipt, LEDGER_FILE, PRIVATE_CONTEXT_FILE, PUBLIC_CONTEXT_FILE,
    REQUEST_ENVELOPE_FILE, RESULT_ENVELOPE_FILE,
};
use cloakscore::{
    ClientSession, CkksParams, Envelope, FileLedger, ModelArtifact, NoiseSampler, PrivateContext,
    SessionId, SessionMeta,
};

/// Serialized request bundle, ready to POST to the scoring service.
const REQUEST_BUNDLE_FILE: &str = "request_bundle.json";

#[derive(Parser)]
#[command(name = "cloakscore-client")]
#[command(about = "CloakScore client: encrypt features, decrypt and verify results")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Encrypt a feature vector and persist the session artifacts
    Encrypt(EncryptArgs),
    /// Decode a sealed result and verify it against the ledger
    Decrypt(DecryptArgs),
}

#[derive(clap::Args)]
struct EncryptArgs {
    /// Raw feature values, comma separated
    #[arg(long, value_delimiter = ',', required = true)]
    features: Vec<f64>,

    /// Path to the model artifact (feature count and scaler)
    #[arg(long, default_value = "model.json")]
    model: PathBuf,

    /// Deployment data directory
    #[arg(long, default_value = "cloakscore_data")]
    data_dir: PathBuf,

    /// Parameter preset: "secure" (n=8192, 3 levels) or "shallow"
    /// (n=2048, 1 level; demonstrates budget exhaustion)
    #[arg(long, default_value = "secure")]
    preset: String,

    /// Random seed for deterministic context generation (optional)
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(clap::Args)]
struct DecryptArgs {
    /// Session id printed by encrypt
    #[arg(long)]
    session: String,

    /// Deployment data directory
    #[arg(long, default_value = "cloakscore_data")]
    data_dir: PathBuf,

    /// Scoring service JSON response to ingest as the result envelope;
    /// without it the session directory must already hold one
    #[arg(long)]
    response_json: Option<PathBuf>,

    /// Ledger file to verify against (default: data dir ledger)
    #[arg(long)]
    ledger: Option<PathBuf>,
}

/// Shape of the scoring service's /evaluate response.
#[derive(Deserialize)]
struct ServerReply {
    result: Envelope,
    receipt: EvaluationReceipt,
}

fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match Args::parse().command {
        Command::Encrypt(args) => cmd_encrypt(args),
        Command::Decrypt(args) => cmd_decrypt(args),
    }
}

fn cmd_encrypt(args: EncryptArgs) -> Result<()> {
    info!("CloakScore client: encrypt");
    info!("Data directory: {}", args.data_dir.display());

    let params = match args.preset.as_str() {
        "secure" => CkksParams::secure_8192(),
        "shallow" => CkksParams::shallow_2048(),
        other => {
            return Err(eyre::eyre!(
                "Unknown preset: {}. Must be \"secure\" or \"shallow\"",
                other
            ));
        }
    };

    let artifact = ModelArtifact::load_json(&args.model)
        .wrap_err_with(|| format!("failed to load model artifact {}", args.model.display()))?;
    let prepared = artifact
        .prepared_features(&args.features)
        .wrap_err("feature vector does not fit the model")?;
    info!("Prepared {} features", prepared.len());

    let store = ArtifactStore::new(&args.data_dir);
    let key = store
        .load_or_generate_key()
        .wrap_err("failed to load vault key")?;

    let mut sampler = match args.seed {
        Some(seed) => NoiseSampler::with_seed(params.sigma, seed),
        None => NoiseSampler::new(params.sigma),
    };

    let mut session = ClientSession::new(Arc::new(key));
    let id = session.id();

    match encrypt_and_persist(&store, &mut session, params, &prepared, &mut sampler) {
        Ok(()) => {
            let dir = store.session_dir(id);
            println!();
            println!("=== Request Sealed ===");
            println!("Session:   {}", id);
            println!("Artifacts: {}", dir.display());
            println!();
            println!("Send {} to the scoring service:", REQUEST_BUNDLE_FILE);
            println!(
                "  curl -s -X POST http://HOST:3000/evaluate -H 'Content-Type: application/json' \\"
            );
            println!(
                "       --data-binary @{} > response.json",
                dir.join(REQUEST_BUNDLE_FILE).display()
            );
            println!();
            println!("Then decode and verify:");
            println!(
                "  cloakscore-client decrypt --session {} --response-json response.json",
                id
            );
            Ok(())
        }
        Err(e) => {
            session.fail();
            if let Err(cleanup) = store.remove_session(id) {
                warn!("failed to remove session directory: {cleanup}");
            }
            Err(e)
        }
    }
}

fn encrypt_and_persist(
    store: &ArtifactStore,
    session: &mut ClientSession,
    params: CkksParams,
    prepared: &[f64],
    sampler: &mut NoiseSampler,
) -> Result<()> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {msg}")?);
    pb.set_message(format!(
        "Generating homomorphic context (n={})...",
        params.ring_dim
    ));
    pb.enable_steady_tick(Duration::from_millis(100));

    let gen_start = Instant::now();
    session
        .establish_context(params, sampler)
        .wrap_err("context generation failed")?;
    pb.finish_with_message(format!("Context ready in {:.2?}", gen_start.elapsed()));

    let bundle = session
        .encrypt_request(prepared, sampler)
        .wrap_err("failed to encrypt the feature vector")?;
    session.mark_transmitted()?;

    let id = session.id();
    let private = session
        .private_context()
        .ok_or_else(|| eyre::eyre!("session lost its context before persistence"))?;
    store.write_session_file(id, PRIVATE_CONTEXT_FILE, &private.to_bytes()?)?;
    store.write_session_file(id, PUBLIC_CONTEXT_FILE, &bundle.public_context)?;
    store.write_session_file(id, REQUEST_ENVELOPE_FILE, bundle.request.as_bytes())?;
    store.write_session_file(
        id,
        REQUEST_BUNDLE_FILE,
        &serde_json::to_vec(&bundle).wrap_err("failed to serialize the request bundle")?,
    )?;

    let request_digest = session
        .request_digest()
        .ok_or_else(|| eyre::eyre!("session retained no request digest"))?;
    let meta = SessionMeta::new(id, prepared.len(), &request_digest);
    store.write_session_meta(id, &meta)?;

    info!("Session artifacts written to {}", store.session_dir(id).display());
    Ok(())
}

fn cmd_decrypt(args: DecryptArgs) -> Result<()> {
    info!("CloakScore client: decrypt");

    let id: SessionId = args
        .session
        .parse()
        .wrap_err("session id must be the hex string printed by encrypt")?;
    let store = ArtifactStore::new(&args.data_dir);
    let key = store
        .load_or_generate_key()
        .wrap_err("failed to load vault key")?;

    let meta = store
        .read_session_meta(id)
        .wrap_err("session metadata not found; run encrypt first")?;
    let private = PrivateContext::from_bytes(&store.read_session_file(id, PRIVATE_CONTEXT_FILE)?)
        .wrap_err("failed to restore the private context")?;
    let request =
        Envelope::from_bytes(store.read_session_file(id, REQUEST_ENVELOPE_FILE)?);

    let (result, receipt) = load_result(&store, id, args.response_json.as_deref())?;
    if let Some(receipt) = &receipt {
        info!(
            "Service receipt: record {} for request {}",
            receipt.record_id,
            receipt.request_digest.short()
        );
        if receipt.request_digest.to_string() != meta.request_digest {
            warn!("receipt names a different request digest than this session");
        }
    }

    let mut session = ClientSession::resume_transmitted(id, Arc::new(key), private, request);
    let outcome = session
        .accept_result(&result)
        .wrap_err("failed to decode the sealed result")?;

    let ledger_path = args
        .ledger
        .unwrap_or_else(|| args.data_dir.join(LEDGER_FILE));
    info!("Verifying against ledger {}", ledger_path.display());
    let ledger = FileLedger::new(ledger_path);

    match session.verify(&ledger) {
        Ok(verified) => {
            println!();
            println!("=== Scoring Result ===");
            println!("Session:     {}", id);
            println!("Probability: {:.4}", verified.probability);
            println!(
                "Decision:    {}",
                if verified.approved { "APPROVE" } else { "DENY" }
            );
            println!("Raw score:   {:.6}", verified.raw_score);
            println!("Integrity:   VERIFIED (ledger holds the digest pair)");
            store.remove_session(id)?;
            println!("Session artifacts removed.");
            Ok(())
        }
        Err(e) if e.is_transient() => {
            warn!("ledger unavailable; session artifacts kept for retry");
            println!();
            println!("=== Scoring Result (UNVERIFIED) ===");
            println!("Probability: {:.4}  (do not act on this yet)", outcome.probability);
            println!("Re-run decrypt once the ledger is reachable.");
            Err(e).wrap_err("ledger unavailable, verification deferred")
        }
        Err(e) => {
            if let Err(cleanup) = store.remove_session(id) {
                warn!("failed to remove session directory: {cleanup}");
            }
            Err(e).wrap_err("cannot trust this result")
        }
    }
}

/// Result envelope plus, when ingesting a service response, its receipt.
fn load_result(
    store: &ArtifactStore,
    id: SessionId,
    response_json: Option<&std::path::Path>,
) -> Result<(Envelope, Option<EvaluationReceipt>)> {
    match response_json {
        Some(path) => {
            let text = fs::read_to_string(path)
                .wrap_err_with(|| format!("failed to read {}", path.display()))?;
            let reply: ServerReply =
                serde_json::from_str(&text).wrap_err("response is not a scoring service reply")?;
            store.write_session_file(id, RESULT_ENVELOPE_FILE, reply.result.as_bytes())?;
            Ok((reply.result, Some(reply.receipt)))
        }
        None => {
            let bytes = store
                .read_session_file(id, RESULT_ENVELOPE_FILE)
                .wrap_err("no result envelope; pass --response-json or copy one in")?;
            Ok((Envelope::from_bytes(bytes), None))
        }
    }
}
