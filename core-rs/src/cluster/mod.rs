//! Cluster module - binds the debug port pool to a worker cluster
//!
//! The cluster manager is an external collaborator reached through the
//! [`Cluster`] trait: a one-shot per-fork inspector port setting, a fork call,
//! and a worker-exit subscription. [`ClusterDebug`] routes every fork through the
//! port pool and releases ports as exit notifications arrive.
//! [`ProcessCluster`] is a plain child-process implementation of the trait.

mod binder;
mod process;

pub use binder::{ClusterDebug, SharedClusterDebug, MAX_QUEUED_EXITS};
pub use process::{ProcessCluster, ProcessWorker, WORKER_ID_ENV};

use crate::errors::Result;
use crate::port::WorkerId;
use std::collections::BTreeMap;
use std::sync::mpsc::Receiver;

/// Environment passed to a forked worker
pub type WorkerEnv = BTreeMap<String, String>;

/// Notification that a worker has terminated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerExit {
    pub worker_id: WorkerId,
    /// Exit code, None when terminated by a signal
    pub code: Option<i32>,
}

/// Handle returned by a fork
pub trait ClusterWorker {
    fn id(&self) -> WorkerId;
}

/// Worker cluster primitives the binder consumes
///
/// Worker ids must not be reused while an earlier worker with the same id is
/// still live or its exit is still undelivered.
pub trait Cluster {
    type Worker: ClusterWorker;

    /// Set the inspector port for the next fork only
    fn setup_inspect_port(&mut self, port: u16);

    /// Start a worker with `env` added to its environment
    fn fork(&mut self, env: &WorkerEnv) -> Result<Self::Worker>;

    /// Register a receiver for exit notifications of all workers
    fn subscribe_exits(&mut self) -> Receiver<WorkerExit>;
}
