//! Child-process cluster
//!
//! Each fork spawns `program [exec_args] [--inspect-port=N] [args]` with
//! inherited stdio. A watcher thread per worker, started before the child,
//! waits on the child and broadcasts a [`WorkerExit`] to every subscriber.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use tracing::{debug, warn};

use super::{Cluster, ClusterWorker, WorkerEnv, WorkerExit};
use crate::config::ClusterConfig;
use crate::errors::{ClusterDebugError, Result};
use crate::port::WorkerId;

/// Environment variable carrying the worker id into each worker
pub const WORKER_ID_ENV: &str = "CLUSTER_WORKER_ID";

/// Handle to a spawned worker process
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessWorker {
    id: WorkerId,
    pid: u32,
    inspect_port: Option<u16>,
}

impl ProcessWorker {
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Inspector port the worker was started with
    pub fn inspect_port(&self) -> Option<u16> {
        self.inspect_port
    }
}

impl ClusterWorker for ProcessWorker {
    fn id(&self) -> WorkerId {
        self.id
    }
}

/// Cluster of plain child processes
pub struct ProcessCluster {
    program: PathBuf,
    args: Vec<String>,
    exec_args: Vec<String>,
    env: WorkerEnv,
    next_id: u32,
    inspect_port: Option<u16>,
    /// Live workers: id -> pid
    live: Arc<Mutex<BTreeMap<WorkerId, u32>>>,
    subscribers: Arc<Mutex<Vec<Sender<WorkerExit>>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl ProcessCluster {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        ProcessCluster {
            program: program.into(),
            args: Vec::new(),
            exec_args: Vec::new(),
            env: WorkerEnv::new(),
            next_id: 0,
            inspect_port: None,
            live: Arc::new(Mutex::new(BTreeMap::new())),
            subscribers: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Build a cluster from a supervisor configuration
    pub fn from_config(config: &ClusterConfig) -> Self {
        ProcessCluster::new(&config.program)
            .with_exec_args(config.exec_args.clone())
            .with_args(config.args.clone())
            .with_env(config.env.clone())
    }

    /// Script arguments, placed after the inspector flag
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    /// Runtime flags, placed before the inspector flag
    pub fn with_exec_args(mut self, exec_args: Vec<String>) -> Self {
        self.exec_args = exec_args;
        self
    }

    /// Environment shared by every worker
    pub fn with_env(mut self, env: WorkerEnv) -> Self {
        self.env = env;
        self
    }

    /// Ids of workers that have not exited yet
    pub fn live_workers(&self) -> Vec<WorkerId> {
        lock(&self.live).keys().copied().collect()
    }

    /// Send SIGTERM to a live worker
    ///
    /// # Returns
    /// false if the worker is unknown or already gone
    pub fn terminate(&self, worker_id: WorkerId) -> bool {
        let pid = lock(&self.live).get(&worker_id).copied();
        match pid {
            Some(pid) => send_sigterm(pid),
            None => false,
        }
    }

    /// Send SIGTERM to every live worker
    ///
    /// # Returns
    /// Number of workers signalled
    pub fn terminate_all(&self) -> usize {
        self.live_workers()
            .into_iter()
            .filter(|id| self.terminate(*id))
            .count()
    }

    fn command(&self, worker_id: WorkerId, port: Option<u16>, env: &WorkerEnv) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.exec_args);
        if let Some(port) = port {
            cmd.arg(format!("--inspect-port={}", port));
        }
        cmd.args(&self.args);

        cmd.envs(&self.env);
        cmd.envs(env);
        cmd.env(WORKER_ID_ENV, worker_id.to_string());

        cmd.stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());
        cmd
    }
}

impl Cluster for ProcessCluster {
    type Worker = ProcessWorker;

    fn setup_inspect_port(&mut self, port: u16) {
        self.inspect_port = Some(port);
    }

    fn fork(&mut self, env: &WorkerEnv) -> Result<ProcessWorker> {
        let port = self.inspect_port.take();
        let worker_id = WorkerId(self.next_id + 1);

        // The waiter exists before the child does, so a running child always
        // has someone to reap it and report its exit.
        let (child_tx, child_rx) = mpsc::channel::<Child>();
        let live = Arc::clone(&self.live);
        let subscribers = Arc::clone(&self.subscribers);
        thread::Builder::new()
            .name(format!("worker-{}-wait", worker_id))
            .spawn(move || {
                // Sender dropped: the spawn failed, nothing to wait on
                let Ok(mut child) = child_rx.recv() else {
                    return;
                };
                let code = match child.wait() {
                    Ok(status) => status.code(),
                    Err(e) => {
                        warn!(worker_id = %worker_id, error = %e, "failed to wait on worker");
                        None
                    }
                };

                lock(&live).remove(&worker_id);
                let exit = WorkerExit { worker_id, code };
                lock(&subscribers).retain(|tx| tx.send(exit).is_ok());
            })
            .map_err(|e| {
                ClusterDebugError::Process(format!(
                    "Failed to start waiter for worker {}: {}",
                    worker_id, e
                ))
            })?;

        let child = self.command(worker_id, port, env).spawn().map_err(|e| {
            ClusterDebugError::Process(format!(
                "Failed to spawn worker {} ({}): {}",
                worker_id,
                self.program.display(),
                e
            ))
        })?;
        self.next_id += 1;

        let pid = child.id();
        lock(&self.live).insert(worker_id, pid);

        if let Err(mpsc::SendError(mut child)) = child_tx.send(child) {
            // Waiter died before taking the child; reap it here
            lock(&self.live).remove(&worker_id);
            let _ = child.kill();
            let _ = child.wait();
            return Err(ClusterDebugError::Process(format!(
                "waiter for worker {} exited early",
                worker_id
            )));
        }

        debug!(worker_id = %worker_id, pid, port = ?port, "worker process spawned");
        Ok(ProcessWorker {
            id: worker_id,
            pid,
            inspect_port: port,
        })
    }

    fn subscribe_exits(&mut self) -> Receiver<WorkerExit> {
        let (tx, rx) = mpsc::channel();
        lock(&self.subscribers).push(tx);
        rx
    }
}

/// Send SIGTERM signal to process
#[cfg(unix)]
fn send_sigterm(pid: u32) -> bool {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    kill(Pid::from_raw(pid as i32), Signal::SIGTERM).is_ok()
}

#[cfg(not(unix))]
fn send_sigterm(_pid: u32) -> bool {
    warn!("SIGTERM not supported on this platform");
    false
}
