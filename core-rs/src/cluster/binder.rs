//! Lifecycle binder between a worker cluster and the debug port pool

use std::collections::VecDeque;
use std::sync::mpsc::{Receiver, RecvTimeoutError, TryRecvError};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{Cluster, ClusterWorker, WorkerEnv, WorkerExit};
use crate::errors::Result;
use crate::port::{DebugPortPool, WorkerId};

/// Most exits kept for [`ClusterDebug::wait_exit`]; older ones are dropped
pub const MAX_QUEUED_EXITS: usize = 256;

/// Binder shared between threads; the lock spans the whole allocate-then-lease step
pub type SharedClusterDebug<C> = Arc<Mutex<ClusterDebug<C>>>;

/// Routes forks through the port pool and reclaims ports on worker exit
pub struct ClusterDebug<C: Cluster> {
    cluster: C,
    pool: DebugPortPool,
    exits: Option<Receiver<WorkerExit>>,
    /// Exits already applied to the pool but not yet handed to the caller,
    /// at most MAX_QUEUED_EXITS
    applied: VecDeque<WorkerExit>,
}

impl<C: Cluster> ClusterDebug<C> {
    /// Create a binder over `cluster`
    ///
    /// Exit notifications are not received until [`subscribe`](Self::subscribe)
    /// is called.
    pub fn new(cluster: C, pool: DebugPortPool) -> Self {
        ClusterDebug {
            cluster,
            pool,
            exits: None,
            applied: VecDeque::new(),
        }
    }

    /// Register the exit subscriber with the cluster
    ///
    /// # Returns
    /// false if already subscribed (no second subscription is made)
    pub fn subscribe(&mut self) -> bool {
        if self.exits.is_some() {
            return false;
        }
        self.exits = Some(self.cluster.subscribe_exits());
        debug!("subscribed to worker exits");
        true
    }

    pub fn is_subscribed(&self) -> bool {
        self.exits.is_some()
    }

    /// Fork a worker on the lowest free debug port
    ///
    /// This will:
    /// 1. Apply pending exit notifications
    /// 2. Pick the lowest free port
    /// 3. Configure the cluster so the next fork listens on it
    /// 4. Fork and lease the port to the new worker
    ///
    /// # Errors
    /// Returns error if the port space is exhausted or the fork fails. No lease
    /// is recorded in either case. A `LeaseConflict` after a successful fork
    /// means the cluster reused the id of a worker whose exit was not yet
    /// delivered; see [`Cluster`].
    pub fn fork(&mut self, env: &WorkerEnv) -> Result<C::Worker> {
        self.drain_exits();

        let port = self.pool.lowest_free_port()?;
        self.cluster.setup_inspect_port(port);

        let worker = match self.cluster.fork(env) {
            Ok(worker) => worker,
            Err(e) => {
                warn!(port, error = %e, "worker fork failed, port stays free");
                return Err(e);
            }
        };

        if let Err(e) = self.pool.lease(worker.id(), port) {
            warn!(
                worker_id = %worker.id(),
                port,
                error = %e,
                "forked worker could not be leased its port"
            );
            return Err(e);
        }
        info!(worker_id = %worker.id(), port, "worker forked");
        Ok(worker)
    }

    /// Port the next fork would use
    pub fn next_port(&mut self) -> Result<u16> {
        self.drain_exits();
        self.pool.lowest_free_port()
    }

    /// Release the port of an exited worker
    ///
    /// Unknown workers (never leased, or already released) are ignored.
    pub fn on_worker_exit(&mut self, worker_id: WorkerId) -> Option<u16> {
        self.pool.release(worker_id)
    }

    /// Apply every exit notification currently queued
    ///
    /// # Returns
    /// Number of notifications applied
    pub fn drain_exits(&mut self) -> usize {
        let mut pending = Vec::new();
        let mut closed = false;
        if let Some(rx) = &self.exits {
            loop {
                match rx.try_recv() {
                    Ok(exit) => pending.push(exit),
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        closed = true;
                        break;
                    }
                }
            }
        }
        if closed {
            warn!("worker exit channel closed");
            self.exits = None;
        }

        let count = pending.len();
        for exit in pending {
            self.apply_exit(exit);
        }
        count
    }

    /// Wait up to `timeout` for the next worker exit
    ///
    /// Exits already applied by an earlier drain are returned first. Without a
    /// subscription this just sleeps for `timeout`.
    pub fn wait_exit(&mut self, timeout: Duration) -> Option<WorkerExit> {
        if let Some(exit) = self.applied.pop_front() {
            return Some(exit);
        }

        let received = match &self.exits {
            Some(rx) => rx.recv_timeout(timeout),
            None => {
                std::thread::sleep(timeout);
                return None;
            }
        };

        let received = match received {
            Ok(exit) => Some(exit),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => {
                warn!("worker exit channel closed");
                self.exits = None;
                None
            }
        };

        received.map(|exit| {
            self.pool.release(exit.worker_id);
            debug!(worker_id = %exit.worker_id, code = ?exit.code, "worker exited");
            exit
        })
    }

    fn apply_exit(&mut self, exit: WorkerExit) {
        self.pool.release(exit.worker_id);
        debug!(worker_id = %exit.worker_id, code = ?exit.code, "worker exited");
        if self.applied.len() == MAX_QUEUED_EXITS {
            self.applied.pop_front();
        }
        self.applied.push_back(exit);
    }

    /// Number of applied exits still waiting to be returned by `wait_exit`
    pub fn queued_exits(&self) -> usize {
        self.applied.len()
    }

    pub fn pool(&self) -> &DebugPortPool {
        &self.pool
    }

    pub fn cluster(&self) -> &C {
        &self.cluster
    }

    pub fn cluster_mut(&mut self) -> &mut C {
        &mut self.cluster
    }

    /// Wrap the binder for use from several threads
    pub fn into_shared(self) -> SharedClusterDebug<C> {
        Arc::new(Mutex::new(self))
    }
}
