//! # cluster-debug - inspector ports for supervised workers
//!
//! A supervisor that forks worker processes needs every worker to listen for a
//! debugger on its own port. This crate keeps a pool of those ports:
//!
//! - The base port comes from `CLUSTER_WORKER_DEBUG_PORT`, or is one above the
//!   primary process's own inspector port (`--inspect`, `--inspect-brk`,
//!   `--inspect-port`; 9229 when none is given)
//! - Each fork gets the lowest free port at or above the base
//! - A port returns to the pool as soon as its worker exits
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────┐  fork(env)   ┌──────────────────────┐
//! │    ClusterDebug      │─────────────▶│   Cluster (trait)    │
//! │  (lifecycle binder)  │◀─────────────│  ProcessCluster, ... │
//! └──────────┬───────────┘  WorkerExit  └──────────────────────┘
//!            │ lowest_free_port / lease / release
//!            ▼
//! ┌──────────────────────┐   base port  ┌──────────────────────┐
//! │    DebugPortPool     │◀─────────────│  inspect parser      │
//! └──────────────────────┘              └──────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use cluster_debug::{ClusterDebug, DebugPortPool, PoolConfig, ProcessCluster, WorkerEnv};
//!
//! # fn main() -> cluster_debug::errors::Result<()> {
//! let pool = DebugPortPool::from_config(&PoolConfig::from_env())?;
//! let cluster = ProcessCluster::new("node").with_args(vec!["server.js".to_string()]);
//!
//! let mut binder = ClusterDebug::new(cluster, pool);
//! binder.subscribe();
//!
//! let worker = binder.fork(&WorkerEnv::new())?;
//! println!("worker on port {:?}", worker.inspect_port());
//! # Ok(())
//! # }
//! ```

pub mod errors;
pub mod config;
pub mod inspect;
pub mod port;
pub mod cluster;
pub mod logging;

pub use errors::ClusterDebugError;
pub use config::{ClusterConfig, PoolConfig};
pub use inspect::{resolve_primary_debug_port, DEFAULT_INSPECT_PORT};
pub use port::{DebugPortPool, Lease, PoolSnapshot, WorkerId, WORKER_DEBUG_PORT_ENV};
pub use cluster::{
    Cluster, ClusterDebug, ClusterWorker, ProcessCluster, ProcessWorker, SharedClusterDebug,
    WorkerEnv, WorkerExit, WORKER_ID_ENV,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
