/**
 * pool.rs
 * Debug port pool for worker processes
 *
 * Each pool has:
 * - Base port: first port a worker may lease, fixed at construction
 * - Lease table: port -> worker and worker -> port, always injective
 *
 * Allocation strategy:
 * - The next worker gets the lowest port >= base that nobody holds
 * - A port returns to the pool the moment its worker exits
 *
 * Example (primary started with --inspect, i.e. 9229):
 * - base = 9230
 * - worker 1 -> 9230, worker 2 -> 9231
 * - worker 1 exits -> next worker gets 9230 again
 */

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info};

use crate::config::PoolConfig;
use crate::errors::{ClusterDebugError, Result};
use crate::inspect;
use crate::port::lease::{Lease, WorkerId};

/// Environment variable that sets the base port directly
pub const WORKER_DEBUG_PORT_ENV: &str = "CLUSTER_WORKER_DEBUG_PORT";

/// Serializable view of the pool
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PoolSnapshot {
    pub base_port: u16,
    pub leases: Vec<Lease>,
}

/// Debug Port Pool - hands out and reclaims worker inspector ports
#[derive(Debug, Clone)]
pub struct DebugPortPool {
    base_port: u16,
    ports: BTreeMap<u16, Lease>,
    workers: HashMap<WorkerId, u16>,
}

impl DebugPortPool {
    /// Create an empty pool starting at `base_port`
    ///
    /// # Errors
    /// Returns an error if `base_port` is 0
    pub fn new(base_port: u16) -> Result<Self> {
        if base_port == 0 {
            return Err(ClusterDebugError::Config(
                "base port must be in 1..=65535".to_string(),
            ));
        }

        Ok(DebugPortPool {
            base_port,
            ports: BTreeMap::new(),
            workers: HashMap::new(),
        })
    }

    /// Create a pool whose base port is derived from `config`
    ///
    /// # Example
    /// ```
    /// use cluster_debug::{DebugPortPool, PoolConfig};
    ///
    /// let config = PoolConfig::default().with_primary_args(["--inspect-port=9111"]);
    /// let pool = DebugPortPool::from_config(&config).unwrap();
    /// assert_eq!(pool.base_port(), 9112);
    /// ```
    pub fn from_config(config: &PoolConfig) -> Result<Self> {
        let base_port = Self::compute_base_port(
            config.worker_port_override.as_deref(),
            &inspect::join_args(&config.primary_args),
        )?;
        Self::new(base_port)
    }

    /// Compute the base port for workers
    ///
    /// # Arguments
    /// * `override_value` - Raw override (e.g. from `CLUSTER_WORKER_DEBUG_PORT`)
    /// * `primary_args` - Primary process start flags, space-joined
    ///
    /// # Returns
    /// The override verbatim when present, otherwise the primary's debug port + 1
    ///
    /// # Errors
    /// Returns error if:
    /// - The override is set but is not a port in 1..=65535
    /// - The primary already listens on 65535, leaving nothing above it
    pub fn compute_base_port(override_value: Option<&str>, primary_args: &str) -> Result<u16> {
        if let Some(raw) = override_value.map(str::trim).filter(|v| !v.is_empty()) {
            let port = raw
                .parse::<u16>()
                .ok()
                .filter(|&p| p != 0)
                .ok_or_else(|| {
                    ClusterDebugError::InvalidOverride(format!(
                        "{}={:?} is not a port in 1..=65535",
                        WORKER_DEBUG_PORT_ENV, raw
                    ))
                })?;
            debug!(base_port = port, "worker debug port taken from override");
            return Ok(port);
        }

        let primary_port = inspect::resolve_primary_debug_port(primary_args);
        let base_port = primary_port.checked_add(1).ok_or_else(|| {
            ClusterDebugError::PortExhausted(format!(
                "primary debug port {} leaves no port for workers",
                primary_port
            ))
        })?;

        debug!(primary_port, base_port, "worker debug port derived from primary flags");
        Ok(base_port)
    }

    /// Get base port
    pub fn base_port(&self) -> u16 {
        self.base_port
    }

    /// Find the lowest port no live worker holds
    ///
    /// Stable: repeated calls without a lease or release return the same port.
    ///
    /// # Errors
    /// Returns `PortExhausted` if every port from base to 65535 is leased
    pub fn lowest_free_port(&self) -> Result<u16> {
        (self.base_port..=u16::MAX)
            .find(|port| !self.ports.contains_key(port))
            .ok_or_else(|| {
                ClusterDebugError::PortExhausted(format!(
                    "all ports {}-{} are leased",
                    self.base_port,
                    u16::MAX
                ))
            })
    }

    /// Lease `port` to `worker_id`
    ///
    /// Callers obtain `port` from [`lowest_free_port`](Self::lowest_free_port)
    /// with no other lease or release in between.
    ///
    /// # Errors
    /// Returns `LeaseConflict` and leaves the table untouched if:
    /// - `port` is below the base port
    /// - `port` is already leased
    /// - `worker_id` already holds a port
    pub fn lease(&mut self, worker_id: WorkerId, port: u16) -> Result<()> {
        if port < self.base_port {
            return Err(ClusterDebugError::LeaseConflict(format!(
                "port {} is below base port {}",
                port, self.base_port
            )));
        }
        if let Some(holder) = self.ports.get(&port) {
            return Err(ClusterDebugError::LeaseConflict(format!(
                "port {} already leased to worker {}",
                port, holder.worker_id
            )));
        }
        if let Some(held) = self.workers.get(&worker_id) {
            return Err(ClusterDebugError::LeaseConflict(format!(
                "worker {} already holds port {}",
                worker_id, held
            )));
        }

        self.ports.insert(port, Lease::new(worker_id, port));
        self.workers.insert(worker_id, port);

        info!(worker_id = %worker_id, port, "debug port leased");
        Ok(())
    }

    /// Release the port held by `worker_id`
    ///
    /// # Returns
    /// The freed port, or None if the worker held nothing (no-op)
    pub fn release(&mut self, worker_id: WorkerId) -> Option<u16> {
        match self.workers.remove(&worker_id) {
            Some(port) => {
                self.ports.remove(&port);
                info!(worker_id = %worker_id, port, "debug port released");
                Some(port)
            }
            None => {
                debug!(worker_id = %worker_id, "release ignored, worker holds no debug port");
                None
            }
        }
    }

    /// Get the port held by a worker
    pub fn port_of(&self, worker_id: WorkerId) -> Option<u16> {
        self.workers.get(&worker_id).copied()
    }

    /// Get the worker holding a port
    pub fn worker_on(&self, port: u16) -> Option<WorkerId> {
        self.ports.get(&port).map(|lease| lease.worker_id)
    }

    /// Live leases in ascending port order
    pub fn leases(&self) -> impl Iterator<Item = &Lease> {
        self.ports.values()
    }

    pub fn len(&self) -> usize {
        self.ports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }

    pub fn snapshot(&self) -> PoolSnapshot {
        PoolSnapshot {
            base_port: self.base_port,
            leases: self.ports.values().cloned().collect(),
        }
    }
}
