//! Testnet — an in-process N-node end-to-end proof.
//!
//! Two (or more) nodes with fresh identities exchange a record, witness it,
//! and the trust score rises. Exercises the whole pipeline: identity
//! generation, dual signing, the DAG, the HTTP surface, attestation storage,
//! and trust scoring.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use serde_json::Map;

use elara_core::config::NodeType;
use elara_core::types::{Classification, CryptoProfile, EntityType};
use elara_core::ValidationRecord;
use elara_cortex::events::EventBus;
use elara_crypto::Identity;
use elara_dag::LocalDAG;
use elara_network::{NetworkClient, NetworkServer, TrustScore, WitnessManager};

struct TestnetNode {
    name: String,
    temp_dir: PathBuf,
    identity: Arc<Identity>,
    dag: Arc<LocalDAG>,
    witness: Arc<WitnessManager>,
    server: NetworkServer,
    port: u16,
}

impl TestnetNode {
    async fn bootstrap(name: &str) -> anyhow::Result<Self> {
        let temp_dir = std::env::temp_dir().join(format!(
            "elara-testnet-{}-{}",
            name.to_lowercase(),
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&temp_dir);
        std::fs::create_dir_all(&temp_dir).context("creating testnet dir")?;

        let identity = Arc::new(
            Identity::generate(EntityType::Ai, CryptoProfile::ProfileA)
                .context("generating identity")?,
        );
        identity.save(&temp_dir.join("identity.json")).context("saving identity")?;

        let dag = Arc::new(LocalDAG::open(temp_dir.join("dag.sled")).context("opening DAG")?);
        let witness = Arc::new(
            WitnessManager::open(temp_dir.join("attestations.sled"))
                .context("opening attestation store")?,
        );
        let bus = Arc::new(EventBus::default());

        let server = NetworkServer::new(
            Arc::clone(&identity),
            Arc::clone(&dag),
            Arc::clone(&witness),
            bus,
            0,
            NodeType::Leaf,
        );
        let port = server.start().await.context("starting server")?;

        Ok(Self {
            name: name.to_string(),
            temp_dir,
            identity,
            dag,
            witness,
            server,
            port,
        })
    }

    /// Create, dual-sign, and insert one PUBLIC record.
    fn create_record(&self, content: &[u8]) -> anyhow::Result<ValidationRecord> {
        let parents = match self.dag.head().context("reading head")? {
            Some(head) => vec![head],
            None => vec![],
        };

        let mut metadata = Map::new();
        metadata.insert("source".into(), "testnet".into());
        metadata.insert("node".into(), self.name.clone().into());

        let mut record = ValidationRecord::create(
            content.to_vec(),
            self.identity.public_key.clone(),
            parents,
            Classification::Public,
            metadata,
            None,
        );
        let signable = record.signable_bytes();
        record.signature = self.identity.sign(&signable).context("signing")?;
        record.backup_signature = Some(self.identity.sign_backup(&signable).context("backup signing")?);

        self.dag.insert(&record, true).context("inserting record")?;
        Ok(record)
    }

    async fn teardown(self) {
        self.server.stop().await;
        let _ = self.dag.close();
        let _ = std::fs::remove_dir_all(&self.temp_dir);
    }
}

pub async fn run(num_nodes: usize) -> anyhow::Result<()> {
    if num_nodes < 2 {
        bail!("testnet needs at least 2 nodes");
    }

    println!("==================================================");
    println!("  ELARA TESTNET — {num_nodes} nodes");
    println!("==================================================");

    let mut nodes = Vec::with_capacity(num_nodes);
    for i in 0..num_nodes {
        let name = char::from(b'A' + i as u8).to_string();
        let node = TestnetNode::bootstrap(&name).await?;
        println!(
            "  [{}] node {} up on port {} ({})",
            nodes.len() + 1,
            node.name,
            node.port,
            node.identity.identity_hash.short()
        );
        nodes.push(node);
    }

    let client = NetworkClient::new();
    let result = exchange_and_witness(&client, &nodes).await;

    for node in nodes {
        node.teardown().await;
    }

    match result {
        Ok(()) => {
            println!("  PASS — record exchanged, witnessed, trust raised");
            Ok(())
        }
        Err(e) => {
            println!("  FAIL — {e}");
            std::process::exit(1);
        }
    }
}

async fn exchange_and_witness(
    client: &NetworkClient,
    nodes: &[TestnetNode],
) -> anyhow::Result<()> {
    let node_a = &nodes[0];
    let node_b = &nodes[1];

    // A creates and signs a record.
    let record = node_a.create_record(b"Hello testnet")?;
    println!("  [+] {} created record {}", node_a.name, record.id.short());

    // B reads A's status.
    let status = client
        .get_status("127.0.0.1", node_a.port)
        .await
        .context("B reading A's status")?;
    if status.identity != node_a.identity.identity_hash.to_hex() {
        bail!("status identity mismatch");
    }
    println!("  [+] {} sees {}'s status ({} records)", node_b.name, node_a.name, status.dag_records);

    // B syncs the record from A.
    let summaries = client
        .query_records("127.0.0.1", node_a.port, None, 20)
        .await
        .context("B pulling records from A")?;
    let mut synced = 0;
    for summary in &summaries {
        let wire = hex::decode(&summary.wire_hex).context("decoding wire hex")?;
        let pulled = ValidationRecord::from_bytes(&wire).context("parsing pulled record")?;
        elara_crypto::verify_record(&pulled, None)
            .map_err(|_| anyhow::anyhow!("pulled record failed signature check"))?;
        node_b.dag.insert(&pulled, false).context("B inserting pulled record")?;
        synced += 1;
    }
    let on_b = node_b
        .dag
        .get(&record.id)
        .context("reading synced record")?
        .context("record missing on B after sync")?;
    if on_b.content != record.content || on_b.signature != record.signature {
        bail!("synced record differs from the original");
    }
    println!("  [+] {} synced {synced} record(s) from {}", node_b.name, node_a.name);

    // B asks A to witness the record.
    let wire = record.to_bytes().context("serializing record")?;
    let witnessed = client
        .request_witness("127.0.0.1", node_a.port, wire)
        .await
        .context("B requesting witness from A")?;
    if witnessed.witness != node_a.identity.identity_hash.to_hex() {
        bail!("unexpected witness identity");
    }

    let count = node_a
        .witness
        .witness_count(&record.id)
        .context("counting attestations")?;
    if count != 1 {
        bail!("expected exactly 1 attestation, found {count}");
    }

    let score = TrustScore::compute(count);
    let level = TrustScore::level(score);
    if (score - 0.5).abs() > f64::EPSILON || level != "moderate" {
        bail!("unexpected trust score {score} ({level})");
    }
    println!("  [+] witnessed by {} — trust {score:.2} ({level})", node_a.name);

    Ok(())
}
