use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_BRIDGE_RATE_LIMIT, DEFAULT_NETWORK_PORT};

/// Expand a leading `~` to the user's home directory (`HOME` or `USERPROFILE`).
pub fn expand_tilde(path: &Path) -> PathBuf {
    if let Ok(stripped) = path.strip_prefix("~") {
        if let Ok(home) = std::env::var("HOME").or_else(|_| std::env::var("USERPROFILE")) {
            return PathBuf::from(home).join(stripped);
        }
    }
    path.to_path_buf()
}

// ── Data layout ──────────────────────────────────────────────────────────────

/// All on-disk locations under the Elara data directory.
///
/// Collaborator-owned files (state, goals, corrections, …) are listed here
/// too: the core never writes them, it only probes them for counts.
#[derive(Clone, Debug)]
pub struct DataPaths {
    pub root: PathBuf,
}

impl DataPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve the data directory: `ELARA_DATA_DIR` if set, else `~/.elara`.
    pub fn resolve() -> Self {
        let root = match std::env::var("ELARA_DATA_DIR") {
            Ok(dir) if !dir.is_empty() => expand_tilde(Path::new(&dir)),
            _ => expand_tilde(Path::new("~/.elara")),
        };
        Self { root }
    }

    /// Create the data directory tree if missing.
    pub fn ensure(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.root)
    }

    // ── Core-owned files ─────────────────────────────────────────────────────

    pub fn identity_file(&self) -> PathBuf {
        self.root.join("identity.json")
    }

    pub fn dag_dir(&self) -> PathBuf {
        self.root.join("dag.sled")
    }

    pub fn continuity_file(&self) -> PathBuf {
        self.root.join("continuity.json")
    }

    pub fn attestations_dir(&self) -> PathBuf {
        self.root.join("attestations.sled")
    }

    pub fn udr_dir(&self) -> PathBuf {
        self.root.join("udr.sled")
    }

    pub fn peers_file(&self) -> PathBuf {
        self.root.join("peers.json")
    }

    pub fn network_config_file(&self) -> PathBuf {
        self.root.join("network-config.json")
    }

    pub fn pid_file(&self) -> PathBuf {
        self.root.join("serve.pid")
    }

    // ── Collaborator-owned files probed for the cognitive digest ─────────────

    pub fn state_file(&self) -> PathBuf {
        self.root.join("state.json")
    }

    pub fn models_dir(&self) -> PathBuf {
        self.root.join("models")
    }

    pub fn predictions_dir(&self) -> PathBuf {
        self.root.join("predictions")
    }

    pub fn memories_dir(&self) -> PathBuf {
        self.root.join("memories")
    }

    pub fn principles_file(&self) -> PathBuf {
        self.root.join("principles.json")
    }

    pub fn corrections_file(&self) -> PathBuf {
        self.root.join("corrections.json")
    }

    pub fn outcomes_file(&self) -> PathBuf {
        self.root.join("outcomes.json")
    }

    pub fn goals_file(&self) -> PathBuf {
        self.root.join("goals.json")
    }

    pub fn presence_file(&self) -> PathBuf {
        self.root.join("presence.json")
    }
}

// ── Node type ────────────────────────────────────────────────────────────────

/// Role this node plays on the peer network.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    Leaf,
    Relay,
    Witness,
}

impl NodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Leaf => "leaf",
            NodeType::Relay => "relay",
            NodeType::Witness => "witness",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "leaf" => Some(NodeType::Leaf),
            "relay" => Some(NodeType::Relay),
            "witness" => Some(NodeType::Witness),
            _ => None,
        }
    }
}

// ── Network config ───────────────────────────────────────────────────────────

/// Node networking configuration. Precedence: environment variables over
/// `network-config.json` over built-in defaults.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub port: u16,
    pub node_type: NodeType,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_NETWORK_PORT,
            node_type: NodeType::Leaf,
        }
    }
}

impl NetworkConfig {
    /// Load from the config file (if present), then apply env overrides.
    pub fn load(paths: &DataPaths) -> Self {
        let mut config: NetworkConfig = std::fs::read_to_string(paths.network_config_file())
            .ok()
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default();

        if let Ok(port) = std::env::var("ELARA_NETWORK_PORT") {
            if let Ok(port) = port.parse() {
                config.port = port;
            }
        }
        if let Ok(nt) = std::env::var("ELARA_NODE_TYPE") {
            if let Some(nt) = NodeType::parse(&nt) {
                config.node_type = nt;
            }
        }
        config
    }

    pub fn save(&self, paths: &DataPaths) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self).expect("config serialization is infallible");
        write_atomic(&paths.network_config_file(), json.as_bytes())
    }
}

/// Bridge rate limit: `ELARA_BRIDGE_RATE_LIMIT` or the protocol default.
pub fn bridge_rate_limit() -> usize {
    std::env::var("ELARA_BRIDGE_RATE_LIMIT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_BRIDGE_RATE_LIMIT)
}

/// Write a file via temp-file + atomic rename.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, bytes)?;
    std::fs::rename(&tmp, path)
}
