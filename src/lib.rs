//! # Netweaver - Network emulation topology and lifecycle engine
//!
//! This library assembles emulated networks of hosts, switches and
//! controllers, allocates their addresses, and orchestrates their
//! lifecycle from construction through teardown.
//!
//! ## Overview
//!
//! Netweaver does not implement nodes or links itself. Backends supply
//! them through factory traits ([`node::HostFactory`],
//! [`node::SwitchFactory`], [`node::ControllerFactory`],
//! [`link::LinkFactory`]), and the engine wires them together: it
//! expands a [`topology::Topology`] into concrete nodes and links,
//! hands out IP addresses and MACs from a deterministic allocator, and
//! drives start, readiness polling, output monitoring and shutdown in a
//! single thread.
//!
//! ## Key Features
//!
//! - **Topology Expansion**: Programmatic graphs or declarative YAML,
//!   materialized in a fixed phase order
//! - **Address Allocation**: Sequential IPs inside a configurable base
//!   network, index-derived or randomized locally-administered MACs
//! - **Pluggable Backends**: Node and link implementations live behind
//!   trait objects; an in-process [`sim`] backend ships with the crate
//! - **Batch Lifecycle**: Switch classes may start and stop as a group,
//!   with per-instance fallback for the remainder
//! - **Best-Effort Teardown**: `stop` releases every resource it can
//!   and logs what it cannot, regardless of earlier failures
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - `addr`: IP and MAC address types and the sequential allocator
//! - `node`: Node roles, parameters and the backend factory traits
//! - `link`: Link and interface contracts
//! - `topology`: Programmatic and declarative topology descriptions
//! - `registry`: Name-indexed ownership of built nodes
//! - `net`: The network engine — assembly, lifecycle, readiness, monitoring
//! - `sim`: In-process simulation backend
//! - `setup`: One-time environment probing
//! - `error`: Error taxonomy shared across the crate
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use netweaver::net::{Network, NetworkOptions};
//! use netweaver::setup::Setup;
//! use netweaver::sim::SimBackend;
//! use netweaver::topology::TopologyGraph;
//!
//! # fn main() -> netweaver::error::Result<()> {
//! let setup = Setup::init();
//! let backend = SimBackend::new();
//! let mut net = Network::new(NetworkOptions::default(), backend.factories(), &setup)?
//!     .with_topology(Box::new(TopologyGraph::linear(3)));
//! net.start()?;
//! // exercise the network here
//! net.stop();
//! # Ok(())
//! # }
//! ```

pub mod addr;
pub mod error;
pub mod link;
pub mod net;
pub mod node;
pub mod registry;
pub mod setup;
pub mod sim;
pub mod topology;
