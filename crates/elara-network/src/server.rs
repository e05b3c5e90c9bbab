//! HTTP server for record exchange and witnessing.
//!
//! Endpoints:
//!   GET  /status        — node identity and DAG info
//!   POST /records       — receive record wire bytes
//!   GET  /records       — query recent records
//!   POST /witness       — counter-sign a record with the local identity
//!   GET  /attestations  — stored attestations + trust for a record
//!
//! Bodies of the POST routes are raw wire bytes; everything else is JSON.

use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::{Arc, Mutex};

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tower_http::cors::{Any, CorsLayer};

use elara_core::config::NodeType;
use elara_core::constants::MAX_RECORDS_PER_QUERY;
use elara_core::types::{now_timestamp, RecordId, Timestamp};
use elara_core::{ElaraError, ValidationRecord};
use elara_cortex::events::{EventBus, EventType};
use elara_cortex::payload::Payload;
use elara_crypto::Identity;
use elara_dag::LocalDAG;

use crate::trust::TrustScore;
use crate::types::{
    AttestationSummary, AttestationsResponse, ErrorResponse, RecordSummary, RecordsResponse,
    StatusResponse, SubmitResponse, WitnessResponse,
};
use crate::witness::{WitnessAttestation, WitnessManager};

struct ServerState {
    identity: Arc<Identity>,
    dag: Arc<LocalDAG>,
    witness: Arc<WitnessManager>,
    bus: Arc<EventBus>,
    node_type: NodeType,
    bound_port: AtomicU16,
}

/// The record-exchange HTTP server. `start` binds and serves in a background
/// task; `stop` shuts it down gracefully.
pub struct NetworkServer {
    state: Arc<ServerState>,
    port: u16,
    shutdown: Mutex<Option<tokio::sync::oneshot::Sender<()>>>,
    task: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl NetworkServer {
    pub fn new(
        identity: Arc<Identity>,
        dag: Arc<LocalDAG>,
        witness: Arc<WitnessManager>,
        bus: Arc<EventBus>,
        port: u16,
        node_type: NodeType,
    ) -> Self {
        Self {
            state: Arc::new(ServerState {
                identity,
                dag,
                witness,
                bus,
                node_type,
                bound_port: AtomicU16::new(port),
            }),
            port,
            shutdown: Mutex::new(None),
            task: Mutex::new(None),
        }
    }

    /// Bind 0.0.0.0:port and serve. Returns the bound port (useful with
    /// port 0 in tests).
    pub async fn start(&self) -> Result<u16, ElaraError> {
        let cors = CorsLayer::new()
            .allow_methods(Any)
            .allow_origin(Any)
            .allow_headers(Any);

        let app = Router::new()
            .route("/status", get(handle_status))
            .route("/records", post(handle_submit_record).get(handle_query_records))
            .route("/witness", post(handle_witness))
            .route("/attestations", get(handle_attestations))
            .layer(cors)
            .with_state(Arc::clone(&self.state));

        let listener = tokio::net::TcpListener::bind(("0.0.0.0", self.port))
            .await
            .map_err(|e| ElaraError::Transport(e.to_string()))?;
        let port = listener
            .local_addr()
            .map_err(|e| ElaraError::Transport(e.to_string()))?
            .port();
        self.state.bound_port.store(port, Ordering::SeqCst);

        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        *self.shutdown.lock().expect("server lock poisoned") = Some(tx);

        let task = tokio::spawn(async move {
            let shutdown = async {
                let _ = rx.await;
            };
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(shutdown)
                .await
            {
                tracing::error!(error = %e, "network server error");
            }
        });
        *self.task.lock().expect("server lock poisoned") = Some(task);

        tracing::info!(port, "network server started");
        self.state.bus.emit(
            EventType::NetworkStarted,
            Payload::from_value(serde_json::json!({
                "port": port,
                "identity": self.state.identity.identity_hash.short(),
                "node_type": self.state.node_type.as_str(),
            })),
            Some("network.server"),
        );
        Ok(port)
    }

    /// Graceful shutdown; waits for the serve task to finish.
    pub async fn stop(&self) {
        let tx = self.shutdown.lock().expect("server lock poisoned").take();
        if let Some(tx) = tx {
            let _ = tx.send(());
        }
        let task = self.task.lock().expect("server lock poisoned").take();
        if let Some(task) = task {
            let _ = task.await;
        }
        tracing::info!("network server stopped");
        self.state.bus.emit(
            EventType::NetworkStopped,
            Payload::from_value(serde_json::json!({
                "port": self.state.bound_port.load(Ordering::SeqCst),
            })),
            Some("network.server"),
        );
    }

    pub fn port(&self) -> u16 {
        self.state.bound_port.load(Ordering::SeqCst)
    }
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

// ── Handlers ─────────────────────────────────────────────────────────────────

async fn handle_status(State(state): State<Arc<ServerState>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        identity: state.identity.identity_hash.to_hex(),
        entity_type: state.identity.entity_type.as_str().to_string(),
        dag_records: state.dag.len(),
        port: state.bound_port.load(Ordering::SeqCst),
        node_type: state.node_type.as_str().to_string(),
    })
}

/// POST /records — receive and validate a remote record. The signature check
/// is the authority here; the parent check is relaxed so foreign roots and
/// partial histories are accepted.
async fn handle_submit_record(State(state): State<Arc<ServerState>>, body: Bytes) -> Response {
    if body.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "empty body");
    }

    let record = match ValidationRecord::from_bytes(&body) {
        Ok(record) => record,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e.to_string()),
    };

    if elara_crypto::verify_record(&record, None).is_err() {
        return error_response(StatusCode::FORBIDDEN, "invalid signature");
    }

    let record_hash = match state.dag.insert(&record, false) {
        Ok(hash) => hash,
        Err(e) => return error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    };

    state.bus.emit(
        EventType::RecordReceived,
        Payload::from_value(serde_json::json!({
            "record_id": record.id.to_hex(),
            "record_hash": record_hash.to_hex(),
            "creator": hex::encode(&record.creator_public_key[..16.min(record.creator_public_key.len())]),
        })),
        Some("network.server"),
    );

    Json(SubmitResponse {
        record_id: record.id.to_hex(),
        record_hash: record_hash.to_hex(),
        accepted: true,
    })
    .into_response()
}

#[derive(Deserialize)]
struct RecordsQuery {
    since: Option<Timestamp>,
    limit: Option<usize>,
}

async fn handle_query_records(
    State(state): State<Arc<ServerState>>,
    Query(query): Query<RecordsQuery>,
) -> Response {
    let limit = query.limit.unwrap_or(20).min(MAX_RECORDS_PER_QUERY);

    let records = match state.dag.query(None, query.since, limit) {
        Ok(records) => records,
        Err(e) => return error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    };

    let mut summaries = Vec::with_capacity(records.len());
    for record in records {
        match record.to_bytes() {
            Ok(wire) => summaries.push(RecordSummary {
                record_id: record.id.to_hex(),
                wire_hex: hex::encode(wire),
                timestamp: record.timestamp,
            }),
            Err(e) => return error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
        }
    }

    Json(RecordsResponse {
        count: summaries.len(),
        records: summaries,
    })
    .into_response()
}

/// POST /witness — re-verify the original signature, counter-sign the same
/// signable bytes, and store the attestation.
async fn handle_witness(State(state): State<Arc<ServerState>>, body: Bytes) -> Response {
    if body.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "empty body");
    }

    let record = match ValidationRecord::from_bytes(&body) {
        Ok(record) => record,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e.to_string()),
    };

    if elara_crypto::verify_record(&record, None).is_err() {
        return error_response(StatusCode::FORBIDDEN, "original signature invalid");
    }

    let signable = record.signable_bytes();
    let witness_signature = match state.identity.sign(&signable) {
        Ok(sig) => sig,
        Err(e) => return error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    };

    let attestation = WitnessAttestation {
        record_id: record.id,
        witness_identity_hash: state.identity.identity_hash,
        witness_signature: witness_signature.clone(),
        timestamp: now_timestamp(),
    };
    if let Err(e) = state.witness.add_attestation(&attestation) {
        return error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
    }

    state.bus.emit(
        EventType::RecordWitnessed,
        Payload::from_value(serde_json::json!({
            "record_id": record.id.to_hex(),
            "witness": state.identity.identity_hash.short(),
        })),
        Some("network.server"),
    );

    Json(WitnessResponse {
        record_id: record.id.to_hex(),
        witness: state.identity.identity_hash.to_hex(),
        signature: hex::encode(witness_signature),
        timestamp: attestation.timestamp,
    })
    .into_response()
}

#[derive(Deserialize)]
struct AttestationsQuery {
    record_id: String,
}

async fn handle_attestations(
    State(state): State<Arc<ServerState>>,
    Query(query): Query<AttestationsQuery>,
) -> Response {
    let record_id = match RecordId::from_hex(&query.record_id) {
        Ok(id) => id,
        Err(_) => return error_response(StatusCode::BAD_REQUEST, "malformed record_id"),
    };

    let attestations = match state.witness.get_attestations(&record_id) {
        Ok(list) => list,
        Err(e) => return error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    };

    let count = attestations.len() as u64;
    let score = TrustScore::compute(count);
    Json(AttestationsResponse {
        record_id: record_id.to_hex(),
        count,
        trust_score: score,
        trust_level: TrustScore::level(score).to_string(),
        attestations: attestations
            .into_iter()
            .map(|a| AttestationSummary {
                witness_identity_hash: a.witness_identity_hash.to_hex(),
                signature: hex::encode(a.witness_signature),
                timestamp: a.timestamp,
            })
            .collect(),
    })
    .into_response()
}
