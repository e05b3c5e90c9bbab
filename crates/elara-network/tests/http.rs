//! End-to-end tests of the record-exchange HTTP surface: two in-process
//! nodes with real sockets, real signatures, and real sled stores.

use std::sync::Arc;

use serde_json::Map;

use elara_core::config::NodeType;
use elara_core::types::{Classification, CryptoProfile, EntityType};
use elara_core::ValidationRecord;
use elara_cortex::events::EventBus;
use elara_crypto::Identity;
use elara_dag::LocalDAG;
use elara_network::{NetworkClient, NetworkServer, TrustScore, WitnessManager};

struct TestNode {
    identity: Arc<Identity>,
    dag: Arc<LocalDAG>,
    witness: Arc<WitnessManager>,
    server: NetworkServer,
    port: u16,
}

async fn spawn_node(name: &str) -> TestNode {
    let dir = std::env::temp_dir().join(format!("elara_http_{}_{}", name, std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();

    let identity = Arc::new(Identity::generate(EntityType::Ai, CryptoProfile::ProfileB).unwrap());
    let dag = Arc::new(LocalDAG::open(dir.join("dag.sled")).unwrap());
    let witness = Arc::new(WitnessManager::open(dir.join("attestations.sled")).unwrap());
    let bus = Arc::new(EventBus::default());

    let server = NetworkServer::new(
        Arc::clone(&identity),
        Arc::clone(&dag),
        Arc::clone(&witness),
        bus,
        0,
        NodeType::Leaf,
    );
    let port = server.start().await.unwrap();

    TestNode {
        identity,
        dag,
        witness,
        server,
        port,
    }
}

fn signed_record(identity: &Identity, content: &[u8]) -> ValidationRecord {
    let mut record = ValidationRecord::create(
        content.to_vec(),
        identity.public_key.clone(),
        vec![],
        Classification::Public,
        Map::new(),
        None,
    );
    record.signature = identity.sign(&record.signable_bytes()).unwrap();
    record
}

#[tokio::test]
async fn status_reports_identity_and_dag_size() {
    let node = spawn_node("status").await;
    let client = NetworkClient::new();

    let status = client.get_status("127.0.0.1", node.port).await.unwrap();
    assert_eq!(status.identity, node.identity.identity_hash.to_hex());
    assert_eq!(status.entity_type, "AI");
    assert_eq!(status.dag_records, 0);
    assert_eq!(status.port, node.port);

    node.server.stop().await;
}

#[tokio::test]
async fn submit_accepts_valid_and_rejects_tampered_records() {
    let node = spawn_node("submit").await;
    let client = NetworkClient::new();
    let sender = Identity::generate(EntityType::Ai, CryptoProfile::ProfileB).unwrap();

    let record = signed_record(&sender, b"Hello testnet");
    let accepted = client
        .submit_record("127.0.0.1", node.port, record.to_bytes().unwrap())
        .await
        .unwrap();
    assert!(accepted.accepted);
    assert_eq!(accepted.record_id, record.id.to_hex());
    assert!(node.dag.contains(&record.id));

    // Flip one byte in the content and re-serialize: 403, no row.
    let mut tampered = record.clone();
    tampered.content[0] ^= 0x01;
    let err = client
        .submit_record("127.0.0.1", node.port, tampered.to_bytes().unwrap())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        elara_core::ElaraError::PeerRejected { status: 403, .. }
    ));
    assert_eq!(node.dag.len(), 1);

    // Empty body: 400.
    let err = client
        .submit_record("127.0.0.1", node.port, Vec::new())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        elara_core::ElaraError::PeerRejected { status: 400, .. }
    ));

    node.server.stop().await;
}

#[tokio::test]
async fn two_node_exchange_preserves_content_and_signature() {
    let node_a = spawn_node("exchange_a").await;
    let node_b = spawn_node("exchange_b").await;
    let client = NetworkClient::new();

    // Node A creates a record locally.
    let record = signed_record(&node_a.identity, b"Hello testnet");
    node_a.dag.insert(&record, true).unwrap();

    // Node B pulls from A and ingests.
    let summaries = client
        .query_records("127.0.0.1", node_a.port, None, 20)
        .await
        .unwrap();
    assert_eq!(summaries.len(), 1);

    let wire = hex::decode(&summaries[0].wire_hex).unwrap();
    let pulled = ValidationRecord::from_bytes(&wire).unwrap();
    node_b.dag.insert(&pulled, false).unwrap();

    let on_b = node_b.dag.get(&record.id).unwrap().unwrap();
    assert_eq!(on_b.content, record.content);
    assert_eq!(on_b.signature, record.signature);

    node_a.server.stop().await;
    node_b.server.stop().await;
}

#[tokio::test]
async fn witness_flow_stores_one_attestation_and_raises_trust() {
    let node_a = spawn_node("witness_a").await;
    let client = NetworkClient::new();

    // A third identity authors the record; node A witnesses it.
    let author = Identity::generate(EntityType::Ai, CryptoProfile::ProfileB).unwrap();
    let record = signed_record(&author, b"witness me");
    let wire = record.to_bytes().unwrap();

    let response = client
        .request_witness("127.0.0.1", node_a.port, wire.clone())
        .await
        .unwrap();
    assert_eq!(response.record_id, record.id.to_hex());
    assert_eq!(response.witness, node_a.identity.identity_hash.to_hex());

    // The counter-signature covers the same signable bytes.
    let sig = hex::decode(&response.signature).unwrap();
    assert!(elara_crypto::dilithium::verify(
        &node_a.identity.public_key,
        &record.signable_bytes(),
        &sig
    )
    .is_ok());

    // Exactly one attestation row, even after a repeat request.
    client
        .request_witness("127.0.0.1", node_a.port, wire)
        .await
        .unwrap();
    assert_eq!(node_a.witness.witness_count(&record.id).unwrap(), 1);

    let attestations = client
        .query_attestations("127.0.0.1", node_a.port, &record.id.to_hex())
        .await
        .unwrap();
    assert_eq!(attestations.count, 1);
    assert_eq!(attestations.trust_score, 0.5);
    assert_eq!(attestations.trust_level, "moderate");
    assert_eq!(TrustScore::compute(1), 0.5);

    // Tampered bytes are refused witness.
    let mut tampered = record.clone();
    tampered.content[0] ^= 0xff;
    let err = client
        .request_witness("127.0.0.1", node_a.port, tampered.to_bytes().unwrap())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        elara_core::ElaraError::PeerRejected { status: 403, .. }
    ));

    node_a.server.stop().await;
}

#[tokio::test]
async fn transport_error_when_peer_is_down() {
    let client = NetworkClient::with_timeout(std::time::Duration::from_millis(500));
    let err = client.get_status("127.0.0.1", 1).await.unwrap_err();
    assert!(matches!(err, elara_core::ElaraError::Transport(_)));
}
