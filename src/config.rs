//! Runtime configuration.
//!
//! Loaded from an optional TOML file; every section has defaults so an empty
//! file (or none at all) is valid. CLI flags are layered on top with
//! [`PluginConfig::apply_args`], then the result is checked with
//! [`PluginConfig::validate`].
//!
//! ```toml
//! [datasource]
//! uid = "YlAe8PmVk"
//! name = "Demo"
//!
//! [server]
//! listen = "127.0.0.1:10001"
//!
//! [stream]
//! interval_ms = 1000
//! batch_size = 3
//!
//! [query]
//! rows = 3
//!
//! [log]
//! level = "info"
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::backend::{DEFAULT_ROWS, MAX_ROWS};
use crate::cli::Args;
use crate::error::ConfigError;
use crate::stream::{DEFAULT_BATCH_SIZE, DEFAULT_INTERVAL};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSourceSection {
    /// Provisioned identifier of this instance; namespaces its live channels.
    pub uid: String,
    pub name: String,
}

impl Default for DataSourceSection {
    fn default() -> Self {
        Self {
            uid: String::new(),
            name: "livefork".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub listen: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:10001".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamSection {
    pub interval_ms: u64,
    pub batch_size: u32,
}

impl Default for StreamSection {
    fn default() -> Self {
        Self {
            interval_ms: DEFAULT_INTERVAL.as_millis() as u64,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl StreamSection {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuerySection {
    pub rows: usize,
}

impl Default for QuerySection {
    fn default() -> Self {
        Self { rows: DEFAULT_ROWS }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSection {
    pub level: String,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginConfig {
    pub datasource: DataSourceSection,
    pub server: ServerSection,
    pub stream: StreamSection,
    pub query: QuerySection,
    pub log: LogSection,
}

impl PluginConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Build the effective config: file (if given) overridden by CLI flags.
    pub fn resolve(args: &Args) -> Result<Self, ConfigError> {
        let mut config = match &args.config {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        config.apply_args(args);
        config.validate()?;
        Ok(config)
    }

    pub fn apply_args(&mut self, args: &Args) {
        if let Some(uid) = &args.uid {
            self.datasource.uid = uid.clone();
        }
        if let Some(listen) = &args.listen {
            self.server.listen = listen.clone();
        }
        if let Some(ms) = args.interval_ms {
            self.stream.interval_ms = ms;
        }
        if let Some(n) = args.batch_size {
            self.stream.batch_size = n;
        }
        if let Some(rows) = args.rows {
            self.query.rows = rows;
        }
        if let Some(level) = &args.log_level {
            self.log.level = level.clone();
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let uid = &self.datasource.uid;
        if uid.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "datasource.uid",
                reason: "must be set to the provisioned data source uid".to_string(),
            });
        }
        if uid.contains('/') {
            return Err(ConfigError::Invalid {
                field: "datasource.uid",
                reason: format!("'{uid}' must not contain '/'"),
            });
        }
        if self.stream.interval_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "stream.interval_ms",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.stream.batch_size == 0 {
            return Err(ConfigError::Invalid {
                field: "stream.batch_size",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.query.rows == 0 {
            return Err(ConfigError::Invalid {
                field: "query.rows",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.query.rows > MAX_ROWS {
            return Err(ConfigError::Invalid {
                field: "query.rows",
                reason: format!("{} exceeds the limit of {MAX_ROWS}", self.query.rows),
            });
        }
        Ok(())
    }
}
