//! One-time process preparation.
//!
//! The original design performed privilege checks and resource-limit
//! fix-ups lazily behind a global flag; here setup is an explicit value
//! created by the entry point and handed to [`crate::net::Network::new`],
//! so a network can only be constructed once the preconditions hold.
//! Privilege checking itself belongs to the isolation backend and is out
//! of scope for the orchestrator.

use log::debug;
use std::thread;

/// Completed-precondition token consumed by the network constructor.
#[derive(Debug, Clone)]
pub struct Setup {
    num_cores: usize,
}

impl Setup {
    /// Capture process-level facts the orchestrator depends on.
    pub fn init() -> Self {
        let num_cores = thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        debug!("process setup complete, {num_cores} cores available");
        Setup { num_cores }
    }

    /// Number of cores the CPU-pinning allocator cycles over.
    pub fn num_cores(&self) -> usize {
        self.num_cores
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setup_reports_at_least_one_core() {
        assert!(Setup::init().num_cores() >= 1);
    }
}
