use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use turtle_engine::EngineConfig;
use turtle_log::{EventLog, InMemoryEventLog, SyncMode, WalConfig, WalEventLog};

use crate::error::{ServerError, ServerResult};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// WAL file backing the event log. `None` keeps the log in memory.
    pub wal_path: Option<PathBuf>,
    pub sync_mode: SyncMode,
    pub engine: EngineConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 7878)),
            wal_path: Some(PathBuf::from("turtle.wal")),
            sync_mode: SyncMode::default(),
            engine: EngineConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Read a TOML file. Missing keys take their defaults.
    pub fn load(path: &Path) -> ServerResult<Self> {
        let text = std::fs::read_to_string(path)?;
        toml::from_str(&text)
            .map_err(|e| ServerError::Config(format!("{}: {e}", path.display())))
    }

    pub fn open_log(&self) -> ServerResult<Arc<dyn EventLog>> {
        match &self.wal_path {
            Some(path) => {
                let config = WalConfig {
                    sync_mode: self.sync_mode,
                };
                Ok(Arc::new(WalEventLog::open(path, config)?))
            }
            None => Ok(Arc::new(InMemoryEventLog::new())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use turtle_engine::DescendantStrategy;

    #[test]
    fn default_config() {
        let c = ServerConfig::default();
        assert_eq!(c.bind_addr, "127.0.0.1:7878".parse::<SocketAddr>().unwrap());
        assert_eq!(c.wal_path, Some(PathBuf::from("turtle.wal")));
        assert_eq!(c.engine.actor, "Service");
    }

    #[test]
    fn load_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("turtle.toml");
        std::fs::write(
            &path,
            r#"
bind_addr = "0.0.0.0:8080"
sync_mode = "every_write"

[engine]
descendant_strategy = "in_memory"
"#,
        )
        .unwrap();

        let c = ServerConfig::load(&path).unwrap();
        assert_eq!(c.bind_addr.port(), 8080);
        assert_eq!(c.sync_mode, SyncMode::EveryWrite);
        assert_eq!(c.engine.descendant_strategy, DescendantStrategy::InMemory);
        assert_eq!(c.engine.max_ancestor_depth, 4096);
    }

    #[test]
    fn bad_toml_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "bind_addr = 12").unwrap();
        assert!(matches!(ServerConfig::load(&path), Err(ServerError::Config(_))));
    }
}
