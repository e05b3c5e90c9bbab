//! CLI command implementations (everything except `serve` and `testnet`).

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context};
use serde_json::Map;

use elara_core::config::{DataPaths, NetworkConfig};
use elara_core::types::{Classification, CryptoProfile, EntityType};
use elara_core::ValidationRecord;
use elara_crypto::{sha3_256, Identity};
use elara_dag::LocalDAG;
use elara_network::types::load_peers;
use elara_network::NetworkClient;

use crate::proof::ProofFile;

fn load_identity(paths: &DataPaths) -> anyhow::Result<Identity> {
    Identity::load(&paths.identity_file())
        .with_context(|| format!("no identity at {} — run `elara init` first", paths.identity_file().display()))
}

// ── init ─────────────────────────────────────────────────────────────────────

pub fn init(paths: &DataPaths) -> anyhow::Result<()> {
    paths
        .ensure()
        .with_context(|| format!("creating data dir {}", paths.root.display()))?;

    let identity = Identity::load_or_generate(
        &paths.identity_file(),
        EntityType::Ai,
        CryptoProfile::ProfileA,
    )
    .context("creating identity")?;

    if !paths.network_config_file().exists() {
        NetworkConfig::default()
            .save(paths)
            .context("writing network config")?;
    }

    println!("Initialized {}", paths.root.display());
    println!("  Identity: {}", identity.identity_hash);
    println!("  Profile:  {}", identity.profile.as_str());
    Ok(())
}

// ── doctor ───────────────────────────────────────────────────────────────────

pub fn doctor(paths: &DataPaths) -> anyhow::Result<()> {
    let mut failures = 0;
    let mut check = |name: &str, ok: bool, detail: String| {
        println!("  [{}] {:<18} {}", if ok { "ok" } else { "FAIL" }, name, detail);
        if !ok {
            failures += 1;
        }
    };

    println!("elara doctor — {}", paths.root.display());

    check(
        "data dir",
        paths.root.is_dir(),
        paths.root.display().to_string(),
    );

    match Identity::load(&paths.identity_file()) {
        Ok(identity) => {
            check("identity", true, identity.identity_hash.short());

            let probe = b"doctor self-test";
            let signed = identity
                .sign(probe)
                .ok()
                .map(|sig| elara_crypto::dilithium::verify(&identity.public_key, probe, &sig).is_ok())
                .unwrap_or(false);
            check("primary scheme", signed, "Dilithium3 sign/verify".into());

            if identity.profile.dual_sign() {
                let backup_ok = identity
                    .sign_backup(probe)
                    .ok()
                    .zip(identity.backup_public_key.as_ref())
                    .map(|(sig, pk)| elara_crypto::sphincs::verify(pk, probe, &sig).is_ok())
                    .unwrap_or(false);
                check("backup scheme", backup_ok, "SPHINCS+ sign/verify".into());
            }
        }
        Err(e) => check("identity", false, e.to_string()),
    }

    match LocalDAG::open(paths.dag_dir()) {
        Ok(dag) => match dag.stats() {
            Ok(stats) => check(
                "dag",
                true,
                format!("{} records, {} edges", stats.total_records, stats.total_edges),
            ),
            Err(e) => check("dag", false, e.to_string()),
        },
        Err(e) => check("dag", false, e.to_string()),
    }

    let continuity = paths.continuity_file();
    if continuity.exists() {
        let parses = std::fs::read_to_string(&continuity)
            .ok()
            .and_then(|text| serde_json::from_str::<serde_json::Value>(&text).ok())
            .is_some();
        check("continuity state", parses, continuity.display().to_string());
    } else {
        check("continuity state", true, "no chain yet".into());
    }

    if failures > 0 {
        bail!("{failures} check(s) failed");
    }
    println!("All checks passed.");
    Ok(())
}

// ── identity / dag ───────────────────────────────────────────────────────────

pub fn identity(paths: &DataPaths) -> anyhow::Result<()> {
    let identity = load_identity(paths)?;
    println!("Identity:  {}", identity.identity_hash);
    println!("Entity:    {}", identity.entity_type.as_str());
    println!("Profile:   {}", identity.profile.as_str());
    println!("Primary:   Dilithium3 ({} byte key)", identity.public_key.len());
    match &identity.backup_public_key {
        Some(pk) => println!("Backup:    SPHINCS+ ({} byte key)", pk.len()),
        None => println!("Backup:    none"),
    }
    println!("Created:   {:.0}", identity.created_at);
    Ok(())
}

pub fn dag_stats(paths: &DataPaths) -> anyhow::Result<()> {
    if !paths.dag_dir().exists() {
        println!("No DAG found at {}", paths.dag_dir().display());
        return Ok(());
    }
    let dag = LocalDAG::open(paths.dag_dir()).context("opening DAG")?;
    let stats = dag.stats().context("reading DAG stats")?;
    let tips = dag.tips().context("computing tips")?;

    println!("DAG: {}", paths.dag_dir().display());
    println!("  Records: {}", stats.total_records);
    println!("  Edges:   {}", stats.total_edges);
    println!("  Roots:   {}", stats.roots);
    if let (Some(oldest), Some(newest)) = (stats.oldest_timestamp, stats.newest_timestamp) {
        println!("  Span:    {oldest:.0} .. {newest:.0}");
    }
    println!("  Tips:    {}", tips.len());
    for tip in tips.iter().rev().take(5) {
        println!("    {}", tip.short());
    }
    dag.close().ok();
    Ok(())
}

// ── sign / verify ────────────────────────────────────────────────────────────

pub fn sign(paths: &DataPaths, file: &Path, classification: &str) -> anyhow::Result<()> {
    let classification = Classification::parse(classification)
        .with_context(|| format!("unknown classification '{classification}'"))?;

    let content = std::fs::read(file).with_context(|| format!("reading {}", file.display()))?;
    let content_hash = hex::encode(sha3_256(&content));
    let filename = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let identity = load_identity(paths)?;
    let dag = LocalDAG::open(paths.dag_dir()).context("opening DAG")?;

    let parents = match dag.head().context("reading DAG head")? {
        Some(head) => vec![head],
        None => vec![],
    };

    let mut metadata = Map::new();
    metadata.insert("record_type".into(), "file_signature".into());
    metadata.insert("filename".into(), filename.clone().into());
    metadata.insert("content_hash".into(), content_hash.clone().into());

    let mut record = ValidationRecord::create(
        content,
        identity.public_key.clone(),
        parents,
        classification,
        metadata,
        None,
    );
    let signable = record.signable_bytes();
    record.signature = identity.sign(&signable).context("signing")?;
    if identity.profile.dual_sign() {
        record.backup_signature = Some(identity.sign_backup(&signable).context("backup signing")?);
    }

    dag.insert(&record, true).context("inserting into DAG")?;

    let proof = ProofFile {
        record_id: record.id.to_hex(),
        content_hash,
        creator: identity.identity_hash.to_hex(),
        classification: classification.as_str().to_string(),
        filename,
        wire_bytes: hex::encode(record.to_bytes().context("serializing record")?),
    };
    let proof_path = ProofFile::path_for(file);
    std::fs::write(&proof_path, serde_json::to_string_pretty(&proof)?)
        .with_context(|| format!("writing {}", proof_path.display()))?;
    dag.close().ok();

    println!("Signed {}", file.display());
    println!("  Record: {}", record.id);
    println!("  Class:  {}", classification);
    println!("  Proof:  {}", proof_path.display());
    Ok(())
}

pub fn verify(_paths: &DataPaths, proof_path: &Path) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(proof_path)
        .with_context(|| format!("reading {}", proof_path.display()))?;
    let proof: ProofFile = serde_json::from_str(&text).context("parsing proof file")?;
    let wire = hex::decode(&proof.wire_bytes).context("decoding wire bytes")?;

    let record = match ValidationRecord::from_bytes(&wire) {
        Ok(record) => record,
        Err(e) => {
            println!("INVALID — malformed record: {e}");
            std::process::exit(1);
        }
    };

    if elara_crypto::verify_record(&record, None).is_err() {
        println!("INVALID — signature verification failed");
        std::process::exit(1);
    }

    println!("Signature VALID");
    println!("  Record:  {}", proof.record_id);
    println!("  Creator: {}...", &proof.creator[..24.min(proof.creator.len())]);
    println!("  Class:   {}", proof.classification);

    match ProofFile::companion_path(proof_path) {
        Some(companion) if companion.exists() => {
            let actual = hex::encode(sha3_256(&std::fs::read(&companion)?));
            if actual != proof.content_hash {
                println!("MISMATCH — {} does not match the signed content", companion.display());
                std::process::exit(1);
            }
            println!("  Content: {} matches", companion.display());
        }
        _ => println!("  Content: source file not found (cannot verify content)"),
    }
    Ok(())
}

// ── continuity ───────────────────────────────────────────────────────────────

pub fn continuity_status(paths: &DataPaths) -> anyhow::Result<()> {
    let file = paths.continuity_file();
    if !file.exists() {
        println!("No continuity chain at {}", file.display());
        return Ok(());
    }
    let state: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(&file).context("reading continuity state")?,
    )
    .context("parsing continuity state")?;

    println!("Continuity chain: {}", file.display());
    println!(
        "  Checkpoints: {}",
        state.get("chain_count").and_then(|v| v.as_u64()).unwrap_or(0)
    );
    println!(
        "  Head:        {}",
        state
            .get("chain_head")
            .and_then(|v| v.as_str())
            .map(|h| h[..12.min(h.len())].to_string())
            .unwrap_or_else(|| "none".into())
    );
    println!(
        "  Created:     {}",
        state.get("created").and_then(|v| v.as_str()).unwrap_or("?")
    );
    Ok(())
}

pub fn continuity_verify(paths: &DataPaths) -> anyhow::Result<()> {
    use elara_bridge::{ContinuityChain, FileStateProvider};
    use elara_cortex::events::EventBus;

    let identity = Arc::new(load_identity(paths)?);
    let dag = Arc::new(LocalDAG::open(paths.dag_dir()).context("opening DAG")?);
    let bus = Arc::new(EventBus::default());
    let chain = ContinuityChain::new(
        paths.clone(),
        identity,
        dag,
        bus,
        Box::new(FileStateProvider::new(paths.clone())),
    );

    let (ok, verified, breaks) = chain.verify_chain();
    println!("Verified {verified} checkpoint(s)");
    if ok {
        println!("Chain intact.");
        return Ok(());
    }
    for b in &breaks {
        println!("  BREAK: {b}");
    }
    std::process::exit(1);
}

// ── node subcommands ─────────────────────────────────────────────────────────

pub async fn node_status(paths: &DataPaths) -> anyhow::Result<()> {
    let config = NetworkConfig::load(paths);
    let client = NetworkClient::new();
    match client.get_status("127.0.0.1", config.port).await {
        Ok(status) => {
            println!("Node running on port {}", status.port);
            println!("  Identity:  {}...", &status.identity[..16]);
            println!("  Entity:    {}", status.entity_type);
            println!("  Node type: {}", status.node_type);
            println!("  Records:   {}", status.dag_records);
        }
        Err(e) => println!("Node not reachable on port {}: {e}", config.port),
    }
    Ok(())
}

pub fn node_peers(paths: &DataPaths) -> anyhow::Result<()> {
    let peers = load_peers(&paths.peers_file());
    if peers.is_empty() {
        println!("No peers known.");
        return Ok(());
    }
    println!("{} peer(s):", peers.len());
    for peer in peers {
        println!(
            "  {}... [{}] {}:{}",
            &peer.identity_hash[..16.min(peer.identity_hash.len())],
            peer.node_type.as_str(),
            peer.host,
            peer.port
        );
    }
    Ok(())
}

pub fn node_stop(paths: &DataPaths) -> anyhow::Result<()> {
    let pid_file = paths.pid_file();
    let Ok(pid) = std::fs::read_to_string(&pid_file) else {
        println!("No pidfile at {} — is the node running?", pid_file.display());
        return Ok(());
    };
    let pid = pid.trim();
    let status = std::process::Command::new("kill").arg(pid).status();
    match status {
        Ok(s) if s.success() => {
            println!("Sent SIGTERM to pid {pid}");
            let _ = std::fs::remove_file(&pid_file);
        }
        _ => println!("Failed to signal pid {pid}"),
    }
    Ok(())
}

pub async fn node_push(
    paths: &DataPaths,
    host: &str,
    port: u16,
    limit: usize,
) -> anyhow::Result<()> {
    let dag = LocalDAG::open(paths.dag_dir()).context("opening DAG")?;
    let records = dag.query(None, None, limit).context("querying DAG")?;
    if records.is_empty() {
        println!("No records to push.");
        return Ok(());
    }

    let client = NetworkClient::new();
    let mut pushed = 0;
    let mut errors = 0;
    for record in records {
        let wire = record.to_bytes().context("serializing record")?;
        match client.submit_record(host, port, wire).await {
            Ok(response) if response.accepted => pushed += 1,
            _ => errors += 1,
        }
    }
    println!("Pushed {pushed} record(s) to {host}:{port} ({errors} errors)");
    Ok(())
}

pub async fn node_sync(
    paths: &DataPaths,
    host: &str,
    port: u16,
    limit: usize,
) -> anyhow::Result<()> {
    let client = NetworkClient::new();
    let summaries = client
        .query_records(host, port, None, limit)
        .await
        .context("querying peer")?;
    if summaries.is_empty() {
        println!("No records from {host}:{port}");
        return Ok(());
    }

    let dag = LocalDAG::open(paths.dag_dir()).context("opening DAG")?;
    let total = summaries.len();
    let mut inserted = 0;
    for summary in summaries {
        let Ok(wire) = hex::decode(&summary.wire_hex) else {
            continue;
        };
        let Ok(record) = ValidationRecord::from_bytes(&wire) else {
            continue;
        };
        // Foreign path: the signature check is mandatory, the parent check
        // is relaxed.
        if elara_crypto::verify_record(&record, None).is_err() {
            continue;
        }
        if dag.insert(&record, false).is_ok() {
            inserted += 1;
        }
    }
    println!("Synced {inserted}/{total} record(s) from {host}:{port}");
    Ok(())
}
