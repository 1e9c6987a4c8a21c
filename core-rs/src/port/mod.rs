/**
 * port module
 * Worker debug port pool: base port resolution, leasing and reclaiming
 */

pub mod lease;
pub mod pool;

pub use lease::{Lease, WorkerId};
pub use pool::{DebugPortPool, PoolSnapshot, WORKER_DEBUG_PORT_ENV};
