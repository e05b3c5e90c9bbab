//! The full node: cortical services + bridge + continuity chain + HTTP
//! server, torn down cleanly on ctrl-c.

use std::sync::Arc;

use anyhow::Context;

use elara_bridge::{ContinuityChain, FileStateProvider, Layer1Bridge};
use elara_core::config::{bridge_rate_limit, DataPaths, NetworkConfig};
use elara_core::types::{CryptoProfile, EntityType};
use elara_cortex::Services;
use elara_crypto::Identity;
use elara_dag::LocalDAG;
use elara_network::{NetworkServer, WitnessManager};
use elara_udr::DecisionRegistry;

pub async fn serve(paths: &DataPaths, port_override: Option<u16>) -> anyhow::Result<()> {
    paths
        .ensure()
        .with_context(|| format!("creating data dir {}", paths.root.display()))?;

    let mut config = NetworkConfig::load(paths);
    if let Some(port) = port_override {
        config.port = port;
    }

    // ── Cortical substrate ────────────────────────────────────────────────────
    let services = Services::init();

    // ── Identity & stores ─────────────────────────────────────────────────────
    let identity = Arc::new(
        Identity::load_or_generate(
            &paths.identity_file(),
            EntityType::Ai,
            CryptoProfile::ProfileA,
        )
        .context("loading identity")?,
    );
    let dag = Arc::new(LocalDAG::open(paths.dag_dir()).context("opening DAG")?);
    let witness = Arc::new(
        WitnessManager::open(paths.attestations_dir()).context("opening attestation store")?,
    );

    // ── Decision registry (boot + fail-silent backfills) ──────────────────────
    let registry = DecisionRegistry::open(paths.udr_dir()).context("opening decision registry")?;
    let backfilled = registry.backfill_from_corrections(&paths.corrections_file())
        + registry.backfill_from_outcomes(&paths.outcomes_file());
    if backfilled > 0 {
        tracing::info!(backfilled, "decision registry backfilled");
    }

    // ── Layer 1 bridge & continuity chain ─────────────────────────────────────
    let bridge = Layer1Bridge::new(
        Arc::clone(&identity),
        Arc::clone(&dag),
        Arc::clone(&services.bus),
        bridge_rate_limit(),
    )
    .context("initializing bridge")?;

    let chain = ContinuityChain::new(
        paths.clone(),
        Arc::clone(&identity),
        Arc::clone(&dag),
        Arc::clone(&services.bus),
        Box::new(FileStateProvider::new(paths.clone())),
    );

    // Continuity subscribes first so its handlers outrank the bridge's.
    chain.setup();
    bridge.setup();

    // ── HTTP server ───────────────────────────────────────────────────────────
    let server = NetworkServer::new(
        Arc::clone(&identity),
        Arc::clone(&dag),
        witness,
        Arc::clone(&services.bus),
        config.port,
        config.node_type,
    );
    let port = server.start().await.context("starting network server")?;

    std::fs::write(paths.pid_file(), std::process::id().to_string())
        .context("writing pidfile")?;

    tracing::info!(port, node_type = config.node_type.as_str(), "node ready");
    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;

    // ── Teardown ──────────────────────────────────────────────────────────────
    tracing::info!("shutting down");
    server.stop().await;
    bridge.teardown();
    services.shutdown();
    drop(chain);
    let _ = std::fs::remove_file(paths.pid_file());
    Ok(())
}
