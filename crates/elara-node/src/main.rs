//! elara — node binary for the cryptographic cognitive substrate.
//!
//! Startup sequence for `serve`:
//!   1. Resolve the data directory and load configuration
//!   2. Initialise the cortical services (bus, cache, worker pools)
//!   3. Load or generate the dual-key identity
//!   4. Open the DAG, attestation, and decision stores
//!   5. Wire the Layer 1 bridge and continuity chain onto the bus
//!   6. Start the HTTP record-exchange server and wait for shutdown

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use elara_core::config::{expand_tilde, DataPaths};

mod commands;
mod proof;
mod serve;
mod testnet;

#[derive(Parser, Debug)]
#[command(
    name = "elara",
    version,
    about = "Elara node — a verifiable causal history for cognitive events"
)]
struct Args {
    /// Data directory (overrides ELARA_DATA_DIR).
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the data directory, identity, and default network config.
    Init,

    /// Diagnostic health check of the local node.
    Doctor,

    /// Run the full node: bridge, continuity chain, and HTTP server.
    Serve {
        /// HTTP port (overrides ELARA_NETWORK_PORT and the config file).
        #[arg(long)]
        port: Option<u16>,
    },

    /// Peer-network operations.
    #[command(subcommand)]
    Node(NodeCommand),

    /// Sign a file into the DAG and emit a proof file next to it.
    Sign {
        file: PathBuf,
        /// Record classification (PUBLIC or SOVEREIGN).
        #[arg(long, default_value = "SOVEREIGN")]
        classification: String,
    },

    /// Verify an .elara.proof file (and its companion file if present).
    Verify { proof: PathBuf },

    /// Show the local identity.
    Identity,

    /// DAG inspection.
    #[command(subcommand)]
    Dag(DagCommand),

    /// Continuity chain inspection.
    #[command(subcommand)]
    Continuity(ContinuityCommand),

    /// Run an in-process multi-node exchange-and-witness proof.
    Testnet {
        /// Number of nodes to bootstrap.
        #[arg(long, default_value_t = 2)]
        nodes: usize,
    },
}

#[derive(Subcommand, Debug)]
enum NodeCommand {
    /// Query a running node's /status endpoint.
    Status,
    /// List known peers from peers.json.
    Peers,
    /// Start the node (alias for `serve`).
    Start {
        #[arg(long)]
        port: Option<u16>,
    },
    /// Stop a running `serve` process via its pidfile.
    Stop,
    /// Push recent local records to a peer.
    Push {
        #[arg(long)]
        host: String,
        #[arg(long)]
        port: u16,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Pull records from a peer into the local DAG.
    Sync {
        #[arg(long)]
        host: String,
        #[arg(long)]
        port: u16,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

#[derive(Subcommand, Debug)]
enum DagCommand {
    /// Show record/edge counts and tips.
    Stats,
}

#[derive(Subcommand, Debug)]
enum ContinuityCommand {
    /// Show chain head, count, and creation date.
    Status,
    /// Walk the chain from head to genesis and report every break.
    Verify,
}

fn resolve_paths(args: &Args) -> DataPaths {
    match &args.data_dir {
        Some(dir) => DataPaths::new(expand_tilde(dir)),
        None => DataPaths::resolve(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,elara=debug".parse().unwrap()),
        )
        .init();

    let args = Args::parse();
    let paths = resolve_paths(&args);

    match args.command {
        Command::Init => commands::init(&paths),
        Command::Doctor => commands::doctor(&paths),
        Command::Serve { port } => serve::serve(&paths, port).await,
        Command::Node(node) => match node {
            NodeCommand::Status => commands::node_status(&paths).await,
            NodeCommand::Peers => commands::node_peers(&paths),
            NodeCommand::Start { port } => serve::serve(&paths, port).await,
            NodeCommand::Stop => commands::node_stop(&paths),
            NodeCommand::Push { host, port, limit } => {
                commands::node_push(&paths, &host, port, limit).await
            }
            NodeCommand::Sync { host, port, limit } => {
                commands::node_sync(&paths, &host, port, limit).await
            }
        },
        Command::Sign {
            file,
            classification,
        } => commands::sign(&paths, &file, &classification),
        Command::Verify { proof } => commands::verify(&paths, &proof),
        Command::Identity => commands::identity(&paths),
        Command::Dag(DagCommand::Stats) => commands::dag_stats(&paths),
        Command::Continuity(sub) => match sub {
            ContinuityCommand::Status => commands::continuity_status(&paths),
            ContinuityCommand::Verify => commands::continuity_verify(&paths),
        },
        Command::Testnet { nodes } => testnet::run(nodes).await,
    }
}
