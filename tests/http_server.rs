#![cfg(feature = "server")]

use std::net::SocketAddr;
use std::sync::Arc;

use cloakscore::params::{Q40A, Q40B, Q40C, Q60};
use cloakscore::{
    CkksParams, ClientSession, Envelope, EvaluationReceipt, FileLedger, LinearModel, NoiseSampler,
    RequestBundle, ServerEngine, SessionState, SymmetricKey,
};
use serde::Deserialize;
use tokio::net::TcpListener;

// Response bodies mirrored field-for-field; the server keeps its own
// structs private.
#[derive(Deserialize)]
struct HealthReply {
    status: String,
    version: String,
}

#[derive(Deserialize)]
struct ModelReply {
    feature_count: usize,
}

#[derive(Deserialize)]
struct EvaluateReply {
    result: Envelope,
    receipt: EvaluationReceipt,
    processing_time_ms: u64,
}

#[derive(Deserialize)]
struct ErrorReply {
    error: String,
}

fn test_params() -> CkksParams {
    CkksParams::custom(64, vec![Q60, Q40A, Q40B, Q40C], 40)
}

fn test_model() -> LinearModel {
    LinearModel {
        coefficients: vec![0.1, 0.05, 0.3, 0.05, 0.4, 0.1],
        intercept: -0.5,
    }
}

fn test_key() -> Arc<SymmetricKey> {
    Arc::new(SymmetricKey::from_bytes([5u8; 32]))
}

async fn spawn_server(
    engine: ServerEngine<FileLedger>,
) -> (String, tokio::task::JoinHandle<()>) {
    let app = cloakscore::http::router(engine);
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind should succeed");
    let addr: SocketAddr = listener.local_addr().expect("local addr");
    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.expect("server should run");
    });
    (format!("http://{}", addr), handle)
}

fn transmitted_session(params: CkksParams, features: &[f64]) -> (ClientSession, RequestBundle) {
    let mut sampler = NoiseSampler::with_seed(3.2, 31);
    let mut session = ClientSession::new(test_key());
    session
        .establish_context(params, &mut sampler)
        .expect("context");
    let bundle = session
        .encrypt_request(features, &mut sampler)
        .expect("encrypt");
    session.mark_transmitted().expect("transmit");
    (session, bundle)
}

#[tokio::test]
async fn test_http_evaluate_roundtrip() {
    let dir = tempfile::tempdir().expect("tempdir");
    let ledger_path = dir.path().join("ledger.jsonl");
    let engine = ServerEngine::new(test_model(), test_key(), FileLedger::new(&ledger_path));
    let (base_url, server_handle) = spawn_server(engine).await;

    let features = [1.0, 0.5, 2.0, 1.0, 0.0, 1.0];
    let (mut session, bundle) = transmitted_session(test_params(), &features);

    let client = reqwest::Client::new();
    let response = client
        .post(format!("{}/evaluate", base_url))
        .json(&bundle)
        .send()
        .await
        .expect("request should succeed");
    assert!(response.status().is_success());
    let body: EvaluateReply = response.json().await.expect("parse response");
    assert_eq!(body.receipt.request_digest, session.request_digest().unwrap());

    let outcome = session.accept_result(&body.result).expect("decode");
    let want = cloakscore::plain_score(&test_model(), &features);
    assert!(
        (outcome.raw_score - want).abs() < 1e-3,
        "raw {} vs plaintext {} ({}ms)",
        outcome.raw_score,
        want,
        body.processing_time_ms
    );

    // a fresh handle onto the same file sees the committed pair
    let reopened = FileLedger::new(&ledger_path);
    session.verify(&reopened).expect("verify");
    assert_eq!(session.state(), SessionState::Verified);

    server_handle.abort();
}

#[tokio::test]
async fn test_http_health_and_model() {
    let dir = tempfile::tempdir().expect("tempdir");
    let engine = ServerEngine::new(
        test_model(),
        test_key(),
        FileLedger::new(dir.path().join("ledger.jsonl")),
    );
    let (base_url, server_handle) = spawn_server(engine).await;
    let client = reqwest::Client::new();

    let health: HealthReply = client
        .get(format!("{}/health", base_url))
        .send()
        .await
        .expect("request should succeed")
        .json()
        .await
        .expect("parse health");
    assert_eq!(health.status, "ok");
    assert_eq!(health.version, env!("CARGO_PKG_VERSION"));

    let model: ModelReply = client
        .get(format!("{}/model", base_url))
        .send()
        .await
        .expect("request should succeed")
        .json()
        .await
        .expect("parse model");
    assert_eq!(model.feature_count, 6);

    server_handle.abort();
}

#[tokio::test]
async fn test_http_tampered_envelope_is_bad_request() {
    let dir = tempfile::tempdir().expect("tempdir");
    let ledger_path = dir.path().join("ledger.jsonl");
    let engine = ServerEngine::new(test_model(), test_key(), FileLedger::new(&ledger_path));
    let (base_url, server_handle) = spawn_server(engine).await;

    let (_session, bundle) = transmitted_session(test_params(), &[0.5; 6]);
    let mut bytes = bundle.request.as_bytes().to_vec();
    let mid = bytes.len() / 2;
    bytes[mid] ^= 0x20;
    let tampered = RequestBundle {
        public_context: bundle.public_context.clone(),
        request: Envelope::from_bytes(bytes),
    };

    let client = reqwest::Client::new();
    let response = client
        .post(format!("{}/evaluate", base_url))
        .json(&tampered)
        .send()
        .await
        .expect("request should succeed");
    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
    let err: ErrorReply = response.json().await.expect("parse error");
    assert!(!err.error.is_empty());

    // nothing was committed for the rejected request
    let reopened = FileLedger::new(&ledger_path);
    assert_eq!(reopened.len().expect("read ledger"), 0);

    server_handle.abort();
}

#[tokio::test]
async fn test_http_shallow_context_is_unprocessable() {
    let dir = tempfile::tempdir().expect("tempdir");
    let engine = ServerEngine::new(
        test_model(),
        test_key(),
        FileLedger::new(dir.path().join("ledger.jsonl")),
    );
    let (base_url, server_handle) = spawn_server(engine).await;

    // one level of headroom cannot host the three-level circuit
    let shallow = CkksParams::custom(64, vec![Q60, Q40A], 40);
    let (_session, bundle) = transmitted_session(shallow, &[0.5; 6]);

    let client = reqwest::Client::new();
    let response = client
        .post(format!("{}/evaluate", base_url))
        .json(&bundle)
        .send()
        .await
        .expect("request should succeed");
    assert_eq!(response.status(), reqwest::StatusCode::UNPROCESSABLE_ENTITY);
    let err: ErrorReply = response.json().await.expect("parse error");
    assert!(err.error.contains("levels"), "unexpected error: {}", err.error);

    server_handle.abort();
}
