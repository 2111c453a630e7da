//! Node collaborator contracts.
//!
//! The orchestrator never creates isolation domains itself; it drives
//! backend implementations of the traits in this module. A backend decides
//! what a "host", "switch" or "controller" concretely is (a namespaced
//! process, a datapath, an in-memory stand-in) while the orchestrator owns
//! naming, addressing, ordering and lifecycle sequencing.

use crate::addr::{IpSpec, MacAddr};
use crate::error::ExternalError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::net::Ipv4Addr;

/// Role of a node, fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeRole {
    Host,
    Switch,
    Controller,
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeRole::Host => write!(f, "host"),
            NodeRole::Switch => write!(f, "switch"),
            NodeRole::Controller => write!(f, "controller"),
        }
    }
}

/// Lifecycle state of a node as observed by the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeStatus {
    Unbuilt,
    Running,
    Stopped,
    Terminated,
}

/// Construction parameters recognized by node factories.
///
/// The orchestrator fills in allocator defaults (`ip`, `mac`, `cores`) and
/// network-level settings (`listen_port`, `in_namespace`); caller-supplied
/// values always win over defaults. Anything the core does not interpret
/// travels through `extra` untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<IpSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mac: Option<MacAddr>,
    /// Core index to pin the node's processes to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cores: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub listen_port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_namespace: Option<bool>,
    /// Named switch-class override, resolved against the network's
    /// registered switch classes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub switch_class: Option<String>,
    /// Backend-specific parameters, passed through uninterpreted.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub extra: HashMap<String, String>,
}

impl NodeParams {
    /// Fill unset fields from `defaults`, keeping existing values.
    pub fn with_defaults(mut self, defaults: &NodeParams) -> Self {
        self.ip = self.ip.or(defaults.ip);
        self.mac = self.mac.or(defaults.mac);
        self.cores = self.cores.or(defaults.cores);
        self.listen_port = self.listen_port.or(defaults.listen_port);
        self.in_namespace = self.in_namespace.or(defaults.in_namespace);
        self.switch_class = self.switch_class.or_else(|| defaults.switch_class.clone());
        for (key, value) in &defaults.extra {
            self.extra
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
        self
    }
}

/// A node endpoint given either by name or by a live handle.
///
/// Normalized to the registry name at the public API boundary; all
/// internal resolution goes through the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeRef(String);

impl NodeRef {
    /// Reference a node through a live handle.
    pub fn handle(node: &dyn Node) -> Self {
        NodeRef(node.name().to_string())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl From<&str> for NodeRef {
    fn from(name: &str) -> Self {
        NodeRef(name.to_string())
    }
}

impl From<String> for NodeRef {
    fn from(name: String) -> Self {
        NodeRef(name)
    }
}

impl From<&String> for NodeRef {
    fn from(name: &String) -> Self {
        NodeRef(name.clone())
    }
}

/// Common surface of every node handle.
pub trait Node {
    fn name(&self) -> &str;
    fn status(&self) -> NodeStatus;
}

/// A readable, non-blocking view onto one node's output.
pub trait OutputStream {
    /// True if at least one complete line can be read without blocking.
    fn ready(&self) -> bool;

    /// The next buffered line, if one is available.
    fn read_line(&mut self) -> Option<String>;

    /// True once the stream has closed and no further lines will appear.
    fn closed(&self) -> bool;
}

/// A host: an isolated execution context running user workloads.
pub trait HostNode: Node {
    /// Name of the host's default (first) interface, if it has one.
    fn default_intf(&self) -> Option<String>;

    /// Apply the default configuration: bring the default interface up and
    /// assign the IP and MAC the host was constructed with. The
    /// orchestrator only calls this for hosts that have an interface.
    fn config_default(&mut self) -> Result<(), ExternalError>;

    /// The IP applied by `config_default`, if any.
    fn ip(&self) -> Option<IpSpec>;

    /// The MAC applied by `config_default`, if any.
    fn mac(&self) -> Option<MacAddr>;

    /// Install a static ARP entry for a peer.
    fn set_arp(&mut self, ip: Ipv4Addr, mac: MacAddr) -> Result<(), ExternalError>;

    /// Tear the host down, optionally deleting its interfaces.
    fn terminate(&mut self, delete_intfs: bool) -> Result<(), ExternalError>;

    /// The host's output stream, if the backend exposes one.
    fn output(&mut self) -> Option<&mut dyn OutputStream>;
}

/// Connection coordinates a switch needs to reach a controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerInfo {
    pub name: String,
    pub ip: Ipv4Addr,
    pub port: u16,
}

/// A switch: forwards traffic and connects to the controller set.
pub trait SwitchNode: Node {
    /// Start the switch, handing it the full controller set.
    fn start(&mut self, controllers: &[ControllerInfo]) -> Result<(), ExternalError>;

    fn stop(&mut self) -> Result<(), ExternalError>;

    fn terminate(&mut self) -> Result<(), ExternalError>;

    /// Whether the switch's control plane is connected to a controller.
    fn connected(&self) -> bool;

    /// Attach a newly created interface to the forwarding logic. Called
    /// whenever a link gains an endpoint on this switch, including at
    /// runtime.
    fn attach(&mut self, intf: &str) -> Result<(), ExternalError>;
}

/// A controller accepting switch connections.
pub trait ControllerNode: Node {
    fn start(&mut self) -> Result<(), ExternalError>;

    fn stop(&mut self) -> Result<(), ExternalError>;

    /// Coordinates passed to switches at start.
    fn conn_info(&self) -> ControllerInfo;
}

/// Class-level bulk start/stop, declared by a switch class at registration.
///
/// Implementations receive every live instance of their class and return
/// the names of the instances they successfully handled; the orchestrator
/// skips the individual path for exactly that subset.
pub trait BatchLifecycle {
    fn batch_startup(
        &self,
        switches: Vec<&mut dyn SwitchNode>,
        controllers: &[ControllerInfo],
    ) -> Vec<String>;

    fn batch_shutdown(&self, switches: Vec<&mut dyn SwitchNode>) -> Vec<String>;
}

/// Constructs host handles.
pub trait HostFactory {
    fn build(&self, name: &str, params: &NodeParams) -> Result<Box<dyn HostNode>, ExternalError>;
}

/// Constructs switch handles; may advertise a batch lifecycle capability.
pub trait SwitchFactory {
    fn build(&self, name: &str, params: &NodeParams)
        -> Result<Box<dyn SwitchNode>, ExternalError>;

    /// The class-level batch capability, if this class supports it.
    fn batch(&self) -> Option<&dyn BatchLifecycle> {
        None
    }
}

/// Constructs controller handles.
pub trait ControllerFactory {
    fn build(&self, name: &str, params: &NodeParams)
        -> Result<Box<dyn ControllerNode>, ExternalError>;
}

/// Hook for spawning interactive terminal front-ends per node.
///
/// The concrete terminal mechanism is a backend concern; the orchestrator
/// only sequences launch (during build) and shutdown (during stop).
pub trait TerminalLauncher {
    fn launch(&mut self, role: NodeRole, names: &[String]) -> Result<(), ExternalError>;

    fn shutdown(&mut self) -> Result<(), ExternalError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_defaults_do_not_override() {
        let caller = NodeParams {
            ip: Some("10.0.0.9/8".parse().unwrap()),
            ..Default::default()
        };
        let defaults = NodeParams {
            ip: Some("10.0.0.1/8".parse().unwrap()),
            cores: Some(2),
            ..Default::default()
        };
        let merged = caller.with_defaults(&defaults);
        assert_eq!(merged.ip.unwrap().to_string(), "10.0.0.9/8");
        assert_eq!(merged.cores, Some(2));
    }

    #[test]
    fn test_params_extra_merge_keeps_caller_entries() {
        let mut caller = NodeParams::default();
        caller.extra.insert("dpid".to_string(), "7".to_string());
        let mut defaults = NodeParams::default();
        defaults.extra.insert("dpid".to_string(), "1".to_string());
        defaults.extra.insert("proto".to_string(), "of13".to_string());
        let merged = caller.with_defaults(&defaults);
        assert_eq!(merged.extra["dpid"], "7");
        assert_eq!(merged.extra["proto"], "of13");
    }

    #[test]
    fn test_node_ref_normalizes_to_name() {
        let by_name: NodeRef = "h1".into();
        assert_eq!(by_name.name(), "h1");
        let owned: NodeRef = String::from("s1").into();
        assert_eq!(owned.name(), "s1");
    }

    struct Stub;

    impl Node for Stub {
        fn name(&self) -> &str {
            "h9"
        }

        fn status(&self) -> NodeStatus {
            NodeStatus::Running
        }
    }

    #[test]
    fn test_node_ref_from_handle() {
        let node = Stub;
        let by_handle = NodeRef::handle(&node);
        assert_eq!(by_handle, NodeRef::from("h9"));
    }
}
