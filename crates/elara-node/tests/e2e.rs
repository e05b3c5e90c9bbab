//! End-to-end tests for the elara binary.
//!
//! Spawns the real node process with a fresh data directory, drives it over
//! HTTP, and checks the proof-file workflow through the CLI.
//!
//! Run with:
//!   cargo test -p elara-node --test e2e

use std::net::TcpListener;
use std::path::PathBuf;
use std::process::{Child, Command, Output, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Map;

use elara_core::types::{Classification, CryptoProfile, EntityType};
use elara_core::ValidationRecord;
use elara_crypto::Identity;
use elara_network::NetworkClient;

// ── Helpers ───────────────────────────────────────────────────────────────────

struct NodeGuard {
    child: Child,
    data_dir: PathBuf,
}

impl Drop for NodeGuard {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
        let _ = std::fs::remove_dir_all(&self.data_dir);
    }
}

fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

fn temp_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("elara_e2e_{}_{}", name, std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn elara(data_dir: &PathBuf, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_elara"))
        .arg("--data-dir")
        .arg(data_dir)
        .args(args)
        .output()
        .expect("failed to run elara")
}

async fn wait_for_status(client: &NetworkClient, port: u16, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if client.get_status("127.0.0.1", port).await.is_ok() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(250)).await;
    }
    false
}

// ── Proof round trip ──────────────────────────────────────────────────────────

#[test]
fn proof_round_trip_and_tamper_detection() {
    let data_dir = temp_dir("proof");

    let out = elara(&data_dir, &["init"]);
    assert!(out.status.success(), "init failed: {}", String::from_utf8_lossy(&out.stderr));

    let file = data_dir.join("foo.txt");
    std::fs::write(&file, "a promise made to the future").unwrap();

    let out = elara(
        &data_dir,
        &["sign", file.to_str().unwrap(), "--classification", "PUBLIC"],
    );
    assert!(out.status.success(), "sign failed: {}", String::from_utf8_lossy(&out.stderr));

    let proof = data_dir.join("foo.txt.elara.proof");
    assert!(proof.exists());

    // Pristine file: verify exits 0.
    let out = elara(&data_dir, &["verify", proof.to_str().unwrap()]);
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("VALID"));
    assert!(stdout.contains("matches"));

    // One flipped byte: verify exits 1 and reports MISMATCH.
    std::fs::write(&file, "a promise made to the futurE").unwrap();
    let out = elara(&data_dir, &["verify", proof.to_str().unwrap()]);
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stdout).contains("MISMATCH"));

    // A proof with corrupted wire bytes reports INVALID.
    let mut doc: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&proof).unwrap()).unwrap();
    let wire = doc["wire_bytes"].as_str().unwrap().to_string();
    let mut bytes = hex::decode(wire).unwrap();
    let idx = bytes.len() / 2;
    bytes[idx] ^= 0xff;
    doc["wire_bytes"] = serde_json::Value::String(hex::encode(bytes));
    std::fs::write(&proof, doc.to_string()).unwrap();

    let out = elara(&data_dir, &["verify", proof.to_str().unwrap()]);
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stdout).contains("INVALID"));

    // The signed record landed in the DAG.
    let out = elara(&data_dir, &["dag", "stats"]);
    assert!(String::from_utf8_lossy(&out.stdout).contains("Records: 1"));

    let _ = std::fs::remove_dir_all(&data_dir);
}

// ── Doctor ────────────────────────────────────────────────────────────────────

#[test]
fn doctor_passes_on_initialized_node() {
    let data_dir = temp_dir("doctor");
    assert!(elara(&data_dir, &["init"]).status.success());

    let out = elara(&data_dir, &["doctor"]);
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(out.status.success(), "doctor failed: {stdout}");
    assert!(stdout.contains("All checks passed"));
}

// ── Serve smoke ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn serve_accepts_queries_and_witnesses_records() {
    let data_dir = temp_dir("serve");
    assert!(elara(&data_dir, &["init"]).status.success());

    let port = free_port();
    let child = Command::new(env!("CARGO_BIN_EXE_elara"))
        .args([
            "--data-dir",
            data_dir.to_str().unwrap(),
            "serve",
            "--port",
            &port.to_string(),
        ])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("failed to spawn elara serve");
    let _guard = NodeGuard {
        child,
        data_dir: data_dir.clone(),
    };

    let client = NetworkClient::new();
    assert!(
        wait_for_status(&client, port, Duration::from_secs(30)).await,
        "node did not become ready"
    );

    let status = client.get_status("127.0.0.1", port).await.unwrap();
    assert_eq!(status.entity_type, "AI");
    assert_eq!(status.dag_records, 0);

    // A foreign identity submits a signed record.
    let author = Identity::generate(EntityType::Ai, CryptoProfile::ProfileB).unwrap();
    let mut record = ValidationRecord::create(
        b"Hello testnet".to_vec(),
        author.public_key.clone(),
        vec![],
        Classification::Public,
        Map::new(),
        None,
    );
    record.signature = author.sign(&record.signable_bytes()).unwrap();

    let accepted = client
        .submit_record("127.0.0.1", port, record.to_bytes().unwrap())
        .await
        .unwrap();
    assert!(accepted.accepted);

    // The record is now queryable with identical bytes.
    let summaries = client
        .query_records("127.0.0.1", port, None, 20)
        .await
        .unwrap();
    assert_eq!(summaries.len(), 1);
    let wire = hex::decode(&summaries[0].wire_hex).unwrap();
    let served = ValidationRecord::from_bytes(&wire).unwrap();
    assert_eq!(served.content, record.content);
    assert_eq!(served.signature, record.signature);

    // Witness flow: one attestation, trust 0.5 (moderate).
    let witnessed = client
        .request_witness("127.0.0.1", port, record.to_bytes().unwrap())
        .await
        .unwrap();
    assert_eq!(witnessed.record_id, record.id.to_hex());

    let attestations = client
        .query_attestations("127.0.0.1", port, &record.id.to_hex())
        .await
        .unwrap();
    assert_eq!(attestations.count, 1);
    assert_eq!(attestations.trust_score, 0.5);
    assert_eq!(attestations.trust_level, "moderate");

    // Tampered bytes are refused.
    let mut tampered = record.clone();
    tampered.content[0] ^= 0x01;
    let err = client
        .submit_record("127.0.0.1", port, tampered.to_bytes().unwrap())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        elara_core::ElaraError::PeerRejected { status: 403, .. }
    ));
}

// ── Two-node push between processes ──────────────────────────────────────────

#[tokio::test]
async fn records_flow_between_two_node_processes() {
    let spawn = |name: &str, port: u16| {
        let data_dir = temp_dir(name);
        assert!(elara(&data_dir, &["init"]).status.success());
        let child = Command::new(env!("CARGO_BIN_EXE_elara"))
            .args([
                "--data-dir",
                data_dir.to_str().unwrap(),
                "serve",
                "--port",
                &port.to_string(),
            ])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .expect("failed to spawn elara serve");
        NodeGuard { child, data_dir }
    };

    let port_a = free_port();
    let port_b = free_port();
    let _node_a = spawn("flow_a", port_a);
    let _node_b = spawn("flow_b", port_b);

    let client = Arc::new(NetworkClient::new());
    assert!(wait_for_status(&client, port_a, Duration::from_secs(30)).await);
    assert!(wait_for_status(&client, port_b, Duration::from_secs(30)).await);

    // Submit a record to A, then relay A's copy to B.
    let author = Identity::generate(EntityType::Ai, CryptoProfile::ProfileB).unwrap();
    let mut record = ValidationRecord::create(
        b"crossing nodes".to_vec(),
        author.public_key.clone(),
        vec![],
        Classification::Public,
        Map::new(),
        None,
    );
    record.signature = author.sign(&record.signable_bytes()).unwrap();
    client
        .submit_record("127.0.0.1", port_a, record.to_bytes().unwrap())
        .await
        .unwrap();

    let from_a = client
        .query_records("127.0.0.1", port_a, None, 20)
        .await
        .unwrap();
    assert_eq!(from_a.len(), 1);
    let wire = hex::decode(&from_a[0].wire_hex).unwrap();
    client
        .submit_record("127.0.0.1", port_b, wire)
        .await
        .unwrap();

    let status_b = client.get_status("127.0.0.1", port_b).await.unwrap();
    assert_eq!(status_b.dag_records, 1);
}
