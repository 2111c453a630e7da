//! Output multiplexing over running nodes.
//!
//! Fans the output streams of many concurrently running nodes into one
//! lazy event sequence. Each wake drains every ready stream one line at a
//! time; when a per-wait timeout is set and nothing became ready, an
//! [`MonitorEvent::Idle`] sentinel is produced so callers can detect idle
//! periods. The sequence ends only when every stream has closed.

use crate::net::Network;
use crate::node::OutputStream;
use std::collections::VecDeque;
use std::thread;
use std::time::{Duration, Instant};

/// One event from the multiplexed output sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorEvent {
    /// A complete line read from one node's output.
    Line { node: String, line: String },
    /// Nothing became ready within the per-wait timeout.
    Idle,
}

/// Lazy, unbounded fan-in over a set of node output streams.
///
/// Not restartable; terminates only when the caller stops consuming or
/// all streams close.
pub struct Monitor<'a> {
    streams: Vec<(String, &'a mut dyn OutputStream)>,
    /// Per-wait budget; `None` blocks until a line arrives or all
    /// streams close.
    timeout: Option<Duration>,
    poll_delay: Duration,
    pending: VecDeque<(String, String)>,
}

impl Network {
    /// Monitor all hosts' output.
    pub fn monitor(&mut self, timeout: Option<Duration>) -> Monitor<'_> {
        let names = self.registry().host_names();
        self.monitor_hosts(&names, timeout)
    }

    /// Monitor the named hosts' output. Hosts without an output stream
    /// are skipped.
    pub fn monitor_hosts(&mut self, hosts: &[String], timeout: Option<Duration>) -> Monitor<'_> {
        let wanted: Vec<String> = hosts.to_vec();
        let streams = self
            .registry_mut()
            .hosts_mut()
            .filter(|host| wanted.iter().any(|name| name == host.name()))
            .filter_map(|host| {
                let name = host.name().to_string();
                Some((name, host.output()?))
            })
            .collect();
        Monitor {
            streams,
            timeout,
            poll_delay: Duration::from_millis(10),
            pending: VecDeque::new(),
        }
    }
}

impl Monitor<'_> {
    fn drain_ready(&mut self) {
        for (name, stream) in &mut self.streams {
            while let Some(line) = stream.read_line() {
                self.pending.push_back((name.clone(), line));
            }
        }
    }
}

impl Iterator for Monitor<'_> {
    type Item = MonitorEvent;

    fn next(&mut self) -> Option<MonitorEvent> {
        if let Some((node, line)) = self.pending.pop_front() {
            return Some(MonitorEvent::Line { node, line });
        }
        let wait_started = Instant::now();
        loop {
            self.drain_ready();
            if let Some((node, line)) = self.pending.pop_front() {
                return Some(MonitorEvent::Line { node, line });
            }
            if self.streams.iter().all(|(_, stream)| stream.closed()) {
                return None;
            }
            match self.timeout {
                Some(budget) if wait_started.elapsed() >= budget => {
                    return Some(MonitorEvent::Idle);
                }
                _ => thread::sleep(self.poll_delay),
            }
        }
    }
}
