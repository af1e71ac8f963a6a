use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::AuthResult;

/// Read access to agent settings by key, used by schema default providers.
#[async_trait]
pub trait SettingsSource: Send + Sync {
    async fn get(&self, key: &str) -> Option<Value>;
}

fn default_database_file() -> String {
    "keys.db".into()
}

fn default_key_cache_ttl_secs() -> u64 {
    60
}

fn default_auth_required() -> bool {
    true
}

fn default_body_limit_bytes() -> usize {
    5 * 1024 * 1024
}

/// Agent settings persisted as `config.json` in the data directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentConfig {
    /// Key database file name, relative to the data directory.
    #[serde(default = "default_database_file")]
    pub database_file: String,
    #[serde(default = "default_key_cache_ttl_secs")]
    pub key_cache_ttl_secs: u64,
    /// When false, requests without an API key are treated as globally scoped
    /// (local development mode). A key that is presented is still checked.
    #[serde(default = "default_auth_required")]
    pub auth_required: bool,
    /// Default for the `force` flag of lifecycle actions: override update locks.
    #[serde(default)]
    pub lock_override: bool,
    #[serde(default = "default_body_limit_bytes")]
    pub body_limit_bytes: usize,
    #[serde(skip)]
    path: PathBuf,
}

impl Default for AgentConfig {
    fn default() -> Self {
        AgentConfig {
            database_file: default_database_file(),
            key_cache_ttl_secs: default_key_cache_ttl_secs(),
            auth_required: default_auth_required(),
            lock_override: false,
            body_limit_bytes: default_body_limit_bytes(),
            path: PathBuf::new(),
        }
    }
}

impl AgentConfig {
    pub fn load(data_dir: &Path) -> AuthResult<Self> {
        let path = data_dir.join("config.json");
        if path.exists() {
            let data = std::fs::read_to_string(&path)?;
            let mut config: AgentConfig = serde_json::from_str(&data)?;
            config.path = path;
            Ok(config)
        } else {
            Ok(AgentConfig {
                path,
                ..Default::default()
            })
        }
    }

    pub fn save(&self) -> AuthResult<()> {
        let data = serde_json::to_string_pretty(self)?;
        std::fs::write(&self.path, data)?;
        Ok(())
    }

    pub fn key_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.key_cache_ttl_secs)
    }

    pub fn database_path(&self, data_dir: &Path) -> PathBuf {
        data_dir.join(&self.database_file)
    }
}

#[async_trait]
impl SettingsSource for AgentConfig {
    async fn get(&self, key: &str) -> Option<Value> {
        match key {
            "lockOverride" => Some(Value::Bool(self.lock_override)),
            "authRequired" => Some(Value::Bool(self.auth_required)),
            "keyCacheTtlSecs" => Some(Value::from(self.key_cache_ttl_secs)),
            _ => None,
        }
    }
}
