/**
 * lease.rs
 * Worker identity and port lease records
 */

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier the cluster manager issues per worker
///
/// Unique among live workers; may be reused once the worker holding it has exited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkerId(pub u32);

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for WorkerId {
    fn from(id: u32) -> Self {
        WorkerId(id)
    }
}

/// A port held by one live worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lease {
    pub port: u16,
    pub worker_id: WorkerId,
    pub leased_at: DateTime<Utc>,
}

impl Lease {
    pub fn new(worker_id: WorkerId, port: u16) -> Self {
        Lease {
            port,
            worker_id,
            leased_at: Utc::now(),
        }
    }
}
