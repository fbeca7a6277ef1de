//! Node configuration loaded from environment variables.
//!
//! Every setting has a default, so a node starts with zero configuration.

use std::path::PathBuf;
use std::time::Duration;

use roomchat_shared::constants::{
    DEFAULT_CHANNEL_CAPACITY, DEFAULT_INVITE_TIMEOUT_SECS, SERVICE_TYPE,
};
use roomchat_store::{Database, StoreError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeConfig {
    /// SQLite file holding messages and the profile.
    /// Env: `ROOMCHAT_DB_PATH`
    /// Default: the platform data directory.
    pub db_path: Option<PathBuf>,

    /// Display name used when the profile is first created.
    /// Env: `ROOMCHAT_DISPLAY_NAME`
    pub display_name: Option<String>,

    /// Discovery service type; nodes only see nodes with the same one.
    /// Env: `ROOMCHAT_SERVICE_TYPE`
    /// Default: `local-chat`
    pub service_type: String,

    /// How long an invitation may stay unanswered.
    /// Env: `ROOMCHAT_INVITE_TIMEOUT_SECS`
    /// Default: 30 seconds
    pub invite_timeout: Duration,

    /// Capacity of the command and notification channels.
    /// Env: `ROOMCHAT_CHANNEL_CAPACITY`
    /// Default: 256
    pub channel_capacity: usize,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            display_name: None,
            service_type: SERVICE_TYPE.to_string(),
            invite_timeout: Duration::from_secs(DEFAULT_INVITE_TIMEOUT_SECS),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

impl NodeConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an arbitrary variable lookup.
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(path) = var("ROOMCHAT_DB_PATH").filter(|p| !p.is_empty()) {
            config.db_path = Some(PathBuf::from(path));
        }

        if let Some(name) = var("ROOMCHAT_DISPLAY_NAME") {
            let name = name.trim();
            if !name.is_empty() {
                config.display_name = Some(name.to_string());
            }
        }

        if let Some(service_type) = var("ROOMCHAT_SERVICE_TYPE") {
            if service_type.is_empty() {
                tracing::warn!("Empty ROOMCHAT_SERVICE_TYPE, using default");
            } else {
                config.service_type = service_type;
            }
        }

        if let Some(val) = var("ROOMCHAT_INVITE_TIMEOUT_SECS") {
            match val.parse::<u64>() {
                Ok(secs) if secs > 0 => config.invite_timeout = Duration::from_secs(secs),
                _ => tracing::warn!(
                    value = %val,
                    "Invalid ROOMCHAT_INVITE_TIMEOUT_SECS, using default"
                ),
            }
        }

        if let Some(val) = var("ROOMCHAT_CHANNEL_CAPACITY") {
            match val.parse::<usize>() {
                Ok(n) if n > 0 => config.channel_capacity = n,
                _ => tracing::warn!(
                    value = %val,
                    "Invalid ROOMCHAT_CHANNEL_CAPACITY, using default"
                ),
            }
        }

        config
    }

    /// Open the configured database, or the platform default one.
    pub fn open_database(&self) -> Result<Database, StoreError> {
        match &self.db_path {
            Some(path) => Database::open_at(path),
            None => Database::new(),
        }
    }

    /// Database for one simulated node.  Only the primary node persists, and
    /// only when a path is configured.
    pub fn node_database(&self, primary: bool) -> Result<Database, StoreError> {
        if primary && self.db_path.is_some() {
            self.open_database()
        } else {
            Database::open_in_memory()
        }
    }

    /// Name a simulated node's profile starts with.  The configured name
    /// applies to the primary node only.
    pub fn node_display_name<'a>(&'a self, node: &'a str, primary: bool) -> &'a str {
        match &self.display_name {
            Some(name) if primary => name.as_str(),
            _ => node,
        }
    }
}
