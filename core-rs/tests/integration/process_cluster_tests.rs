//! Process Cluster Integration Tests
//!
//! Real child processes (`sh`) behind ClusterDebug: the inspector flag reaches
//! the worker, and a worker's exit frees its port for the next fork.

#![cfg(unix)]

use cluster_debug::{
    ClusterConfig, ClusterDebug, ClusterWorker, DebugPortPool, ProcessCluster, WorkerEnv,
};
use std::time::{Duration, Instant};

fn wait_until_empty(binder: &mut ClusterDebug<ProcessCluster>) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !binder.pool().is_empty() && Instant::now() < deadline {
        binder.wait_exit(Duration::from_millis(100));
    }
}

/// Worker that checks its own inspector flag and exits 0 on success
fn checking_cluster(expected_flag: &str) -> ProcessCluster {
    let script = format!(r#"[ "$1" = "{}" ]"#, expected_flag);
    ProcessCluster::new("sh").with_exec_args(vec![
        "-c".to_string(),
        script,
        "worker".to_string(),
    ])
}

#[test]
fn test_worker_receives_leased_port() {
    let pool = DebugPortPool::new(9400).unwrap();
    let mut binder = ClusterDebug::new(checking_cluster("--inspect-port=9400"), pool);
    binder.subscribe();

    let worker = binder.fork(&WorkerEnv::new()).unwrap();
    assert_eq!(worker.inspect_port(), Some(9400));

    let exit = binder.wait_exit(Duration::from_secs(10)).unwrap();
    assert_eq!(exit.worker_id, worker.id());
    assert_eq!(exit.code, Some(0));
    assert!(binder.pool().is_empty());
}

#[test]
fn test_exited_worker_port_is_reused() {
    let pool = DebugPortPool::new(9500).unwrap();
    let mut binder = ClusterDebug::new(checking_cluster("--inspect-port=9500"), pool);
    binder.subscribe();

    let first = binder.fork(&WorkerEnv::new()).unwrap();
    assert_eq!(first.inspect_port(), Some(9500));
    wait_until_empty(&mut binder);

    let second = binder.fork(&WorkerEnv::new()).unwrap();
    assert_eq!(second.inspect_port(), Some(9500));
    assert_ne!(second.id(), first.id());
    wait_until_empty(&mut binder);
}

#[test]
fn test_terminate_all_releases_every_port() {
    let config = ClusterConfig::from_yaml(
        r#"
program: sh
execArgs: ["-c", "sleep 30", "worker"]
workers: 3
"#,
    )
    .unwrap();
    let pool = DebugPortPool::new(9600).unwrap();
    let mut binder = ClusterDebug::new(ProcessCluster::from_config(&config), pool);
    binder.subscribe();

    for expected in 9600..9600 + config.workers as u16 {
        let worker = binder.fork(&WorkerEnv::new()).unwrap();
        assert_eq!(worker.inspect_port(), Some(expected));
    }
    assert_eq!(binder.cluster().live_workers().len(), 3);

    assert_eq!(binder.cluster().terminate_all(), 3);
    wait_until_empty(&mut binder);

    assert!(binder.pool().is_empty());
    assert!(binder.cluster().live_workers().is_empty());
    assert_eq!(binder.next_port().unwrap(), 9600);
}
