// Port Pool Contract Tests
//
// These tests verify INVARIANTS of the worker debug port pool that must hold
// regardless of how the pool is implemented internally.
//
// **Problem**: "Simplifying" the pool into a counter leaks ports, or reusing
//              ports eagerly hands one port to two live workers
// **Solution**: Contract tests that state what each guarantee protects

use cluster_debug::{ClusterDebugError, DebugPortPool, WorkerId};
use std::collections::HashSet;

fn lease_next(pool: &mut DebugPortPool, worker: u32) -> u16 {
    let port = pool.lowest_free_port().unwrap();
    pool.lease(WorkerId(worker), port).unwrap();
    port
}

/// WHY: Workers must never collide with the primary's own inspector
/// DEFAULT: primary listens on 9229, so workers start at 9230
/// BREAKS: First worker fails to bind its inspector if base == primary port
#[test]
fn default_base_port_is_one_above_primary() {
    let base = DebugPortPool::compute_base_port(None, "").unwrap();
    assert_eq!(base, 9230);
}

/// WHY: The override is operator intent and wins over everything else
/// REASON: Lets operators move worker ports out of a firewalled range
/// BREAKS: Deployments that pin CLUSTER_WORKER_DEBUG_PORT
#[test]
fn override_is_used_verbatim() {
    for flags in ["", "--inspect", "--inspect-port=9111", "--inspect-brk=0.0.0.0:9500"] {
        assert_eq!(
            DebugPortPool::compute_base_port(Some("9000"), flags).unwrap(),
            9000,
            "override ignored with flags {:?}",
            flags
        );
    }
}

/// WHY: A typo in the override must not silently move workers elsewhere
/// DECISION: Malformed override fails fast instead of falling back
/// BREAKS: Operators debugging the wrong port without any warning
#[test]
fn malformed_override_fails_fast() {
    let result = DebugPortPool::compute_base_port(Some("92a0"), "--inspect-port=9111");
    assert!(matches!(result, Err(ClusterDebugError::InvalidOverride(_))));
}

/// WHY: N forks with no exits hand out b..b+N-1 in order
/// REASON: Operators attach debuggers by counting up from the base port
/// BREAKS: Predictable attach workflow for launch configurations
#[test]
fn sequential_leases_are_contiguous_from_base() {
    for base in [1024u16, 9230, 40000] {
        let mut pool = DebugPortPool::new(base).unwrap();
        let ports: Vec<u16> = (1..=16).map(|w| lease_next(&mut pool, w)).collect();
        let expected: Vec<u16> = (0..16).map(|i| base + i).collect();

        assert_eq!(ports, expected);
    }
}

/// WHY: A released port is the next one handed out
/// REASON: Ports are reused, not leaked; a restarted worker returns to the
///         port the debugger was attached to
/// BREAKS: Port drift after every worker restart
#[test]
fn released_port_is_reused_first() {
    let mut pool = DebugPortPool::new(9230).unwrap();
    let a = lease_next(&mut pool, 1);
    let b = lease_next(&mut pool, 2);
    assert_eq!((a, b), (9230, 9231));

    pool.release(WorkerId(1));
    assert_eq!(pool.lowest_free_port().unwrap(), 9230);
}

/// WHY: Release is idempotent and unknown ids are ignored
/// REASON: Exit notifications can arrive for workers that never got a port
/// BREAKS: Supervisor crashes on a worker that died during fork
#[test]
fn release_is_idempotent() {
    let mut pool = DebugPortPool::new(9230).unwrap();
    lease_next(&mut pool, 1);
    lease_next(&mut pool, 2);
    let before = pool.snapshot().leases;

    assert_eq!(pool.release(WorkerId(77)), None);
    assert_eq!(pool.snapshot().leases, before);

    pool.release(WorkerId(2));
    let after_first = pool.snapshot().leases;
    assert_eq!(pool.release(WorkerId(2)), None);
    assert_eq!(pool.snapshot().leases, after_first);
}

/// WHY: No two live workers ever share a port
/// REASON: A second inspector on the same port fails to bind
/// BREAKS: The core guarantee of the pool
#[test]
fn live_leases_are_injective_under_churn() {
    let mut pool = DebugPortPool::new(9230).unwrap();
    let mut live: Vec<u32> = Vec::new();
    let mut next_id = 1u32;

    // Deterministic churn: fork three, kill the middle one, repeat
    for round in 0..50u32 {
        for _ in 0..3 {
            lease_next(&mut pool, next_id);
            live.push(next_id);
            next_id += 1;
        }
        let victim = live.remove(live.len() / 2 + (round as usize % 2));
        pool.release(WorkerId(victim));

        let ports: HashSet<u16> = pool.leases().map(|l| l.port).collect();
        assert_eq!(ports.len(), pool.len(), "duplicate port in round {}", round);
        for id in &live {
            let port = pool.port_of(WorkerId(*id)).unwrap();
            assert_eq!(pool.worker_on(port), Some(WorkerId(*id)));
        }
    }
}

/// WHY: Scanning stops at the top of the port range
/// REASON: An exhausted pool must report an error, never loop forever
/// BREAKS: Supervisor hang under pathological lease tables
#[test]
fn scanning_is_bounded_by_port_range() {
    let mut pool = DebugPortPool::new(65530).unwrap();
    for w in 1..=6 {
        lease_next(&mut pool, w);
    }

    assert!(matches!(
        pool.lowest_free_port(),
        Err(ClusterDebugError::PortExhausted(_))
    ));
}
