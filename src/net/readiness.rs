//! Switch readiness polling.
//!
//! A cooperative poll loop over the switches' `connected()` predicate.
//! With no budget the loop polls indefinitely; with one it breaks once the
//! budget is exceeded, re-checks every remaining switch once more (a
//! switch may have connected between the last poll and the timeout
//! check), then reports failure naming every switch still unconnected.

use crate::error::{NetError, Result};
use crate::net::Network;
use log::{info, warn};
use std::thread;
use std::time::{Duration, Instant};

impl Network {
    /// Block until every switch reports a controller connection.
    ///
    /// `timeout`: elapsed-time budget, or `None` to wait indefinitely.
    /// `delay`: sleep between poll rounds.
    pub fn wait_connected(&self, timeout: Option<Duration>, delay: Duration) -> Result<()> {
        info!("*** Waiting for switches to connect");
        let started = Instant::now();
        let mut remaining: Vec<_> = self.registry.switches().collect();
        loop {
            remaining.retain(|switch| {
                if switch.connected() {
                    info!("{} connected", switch.name());
                    false
                } else {
                    true
                }
            });
            if remaining.is_empty() {
                return Ok(());
            }
            if let Some(budget) = timeout {
                if started.elapsed() > budget {
                    break;
                }
            }
            thread::sleep(delay);
        }

        // Final re-check before declaring failure
        remaining.retain(|switch| !switch.connected());
        if remaining.is_empty() {
            return Ok(());
        }
        let elapsed = started.elapsed();
        warn!("timed out after {:.1?}", elapsed);
        for switch in &remaining {
            warn!("{} is not connected to a controller", switch.name());
        }
        Err(NetError::ReadinessTimeout {
            elapsed,
            unready: remaining
                .into_iter()
                .map(|switch| switch.name().to_string())
                .collect(),
        })
    }
}
