/**
 * config.rs
 * Pool settings and supervisor configuration (YAML format)
 *
 * Format:
 * ```yaml
 * program: node
 * args: [server.js]
 * execArgs: [--enable-source-maps]
 * workers: 4
 * respawn: true
 * workerDebugPort: 9300
 * env:
 *   NODE_ENV: development
 * ```
 */

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::errors::{ClusterDebugError, Result};
use crate::port::WORKER_DEBUG_PORT_ENV;

/// Inputs for computing the worker base port
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PoolConfig {
    /// Raw override value; authoritative when non-empty
    pub worker_port_override: Option<String>,
    /// Start flags of the primary process
    pub primary_args: Vec<String>,
}

impl PoolConfig {
    /// Read the override variable and this process's own start flags
    ///
    /// Flags after a `--` separator belong to the worker command and are not
    /// considered part of the primary's configuration.
    pub fn from_env() -> Self {
        PoolConfig {
            worker_port_override: std::env::var(WORKER_DEBUG_PORT_ENV).ok(),
            primary_args: std::env::args()
                .skip(1)
                .take_while(|arg| arg != "--")
                .collect(),
        }
    }

    pub fn with_override(mut self, value: impl Into<String>) -> Self {
        self.worker_port_override = Some(value.into());
        self
    }

    pub fn with_primary_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.primary_args = args.into_iter().map(Into::into).collect();
        self
    }
}

fn default_workers() -> usize {
    1
}

/// Supervisor configuration file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterConfig {
    /// Worker executable
    pub program: String,
    /// Script arguments, passed after the runtime flags
    #[serde(default)]
    pub args: Vec<String>,
    /// Runtime flags every worker starts with
    #[serde(default)]
    pub exec_args: Vec<String>,
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Restart workers that exit
    #[serde(default)]
    pub respawn: bool,
    /// Base port for workers; wins over the environment variable
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_debug_port: Option<u16>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl ClusterConfig {
    /// Minimal configuration running `program` once
    pub fn new(program: impl Into<String>) -> Self {
        ClusterConfig {
            program: program.into(),
            args: Vec::new(),
            exec_args: Vec::new(),
            workers: default_workers(),
            respawn: false,
            worker_debug_port: None,
            env: BTreeMap::new(),
        }
    }

    /// Load and validate a configuration file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            ClusterDebugError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&content)
    }

    /// Parse and validate YAML content
    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: ClusterConfig = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.program.trim().is_empty() {
            return Err(ClusterDebugError::Config("program must not be empty".to_string()));
        }
        if self.workers == 0 {
            return Err(ClusterDebugError::Config("workers must be at least 1".to_string()));
        }
        if self.worker_debug_port == Some(0) {
            return Err(ClusterDebugError::Config(
                "workerDebugPort must be in 1..=65535".to_string(),
            ));
        }
        Ok(())
    }

    /// Layer this file's port setting over `pool`
    pub fn apply_to(&self, pool: PoolConfig) -> PoolConfig {
        match self.worker_debug_port {
            Some(port) => pool.with_override(port.to_string()),
            None => pool,
        }
    }
}
