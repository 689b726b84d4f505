//! The per-`(client, name)` handle a caller holds onto.
//!
//! Mutated only by the client's heartbeat task; readers only ever see a
//! consistent snapshot through [`Lease::values`].

use std::sync::Arc;

use parking_lot::RwLock;

use crate::hash;
use crate::logger::{log_info, Logger};
use crate::present::present_integers;

/// A lease on a named, sized resource. `size` and the ring seed are fixed
/// for the lifetime of the handle; `values` is republished every heartbeat.
#[derive(Debug)]
pub struct Lease {
    client_id: String,
    name: String,
    size: i64,
    ring_seed: i64,
    values: RwLock<Vec<i64>>,
    logger: Arc<dyn Logger>,
}

impl Lease {
    pub(crate) fn new(client_id: String, name: String, size: i64, logger: Arc<dyn Logger>) -> Self {
        let ring_seed = hash::modulo(&client_id, size);
        Self {
            client_id,
            name,
            size,
            ring_seed,
            values: RwLock::new(Vec::new()),
            logger,
        }
    }

    /// Current ownership snapshot: sorted, deduplicated slot values.
    pub fn values(&self) -> Vec<i64> {
        self.values.read().clone()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn size(&self) -> i64 {
        self.size
    }

    pub(crate) fn ring_seed(&self) -> i64 {
        self.ring_seed
    }

    /// Replaces `values`, logging once through [`present_integers`] if they
    /// actually changed. Called only from the heartbeat task.
    pub(crate) fn set_values(&self, new_values: Vec<i64>) {
        let mut guard = self.values.write();
        if *guard != new_values {
            log_info!(
                self.logger,
                "lease {:?} for client {:?} set to {}",
                self.name,
                self.client_id,
                present_integers(&new_values)
            );
        }
        *guard = new_values;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::NoopLogger;

    #[test]
    fn seeds_ring_position_from_client_id_hash() {
        let lease = Lease::new("c1".to_string(), "my".to_string(), 20, Arc::new(NoopLogger));
        assert_eq!(lease.ring_seed(), hash::modulo("c1", 20));
    }

    #[test]
    fn values_start_empty() {
        let lease = Lease::new("c1".to_string(), "my".to_string(), 20, Arc::new(NoopLogger));
        assert!(lease.values().is_empty());
    }

    #[test]
    fn set_values_replaces_snapshot() {
        let lease = Lease::new("c1".to_string(), "my".to_string(), 20, Arc::new(NoopLogger));
        lease.set_values(vec![1, 2, 3]);
        assert_eq!(lease.values(), vec![1, 2, 3]);
    }

    #[test]
    fn set_values_is_a_no_op_log_when_unchanged() {
        let lease = Lease::new("c1".to_string(), "my".to_string(), 20, Arc::new(NoopLogger));
        lease.set_values(vec![1, 2, 3]);
        lease.set_values(vec![1, 2, 3]);
        assert_eq!(lease.values(), vec![1, 2, 3]);
    }
}
