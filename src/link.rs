//! Link and interface collaborator contracts.
//!
//! A link is a virtual cable joining two interfaces on two nodes. The
//! orchestrator requests construction through a [`LinkFactory`]; the
//! factory realizes both interfaces (naming them after their owning nodes)
//! and hands back a [`LinkHandle`] owning them. Tearing a link down
//! destroys both interfaces.

use crate::addr::{IpSpec, MacAddr};
use crate::error::ExternalError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Administrative status of an interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntfStatus {
    Up,
    Down,
}

impl fmt::Display for IntfStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntfStatus::Up => write!(f, "up"),
            IntfStatus::Down => write!(f, "down"),
        }
    }
}

/// One endpoint of a link, bound to exactly one node.
pub trait IntfHandle {
    /// Interface name, conventionally `{node}-eth{k}`.
    fn name(&self) -> &str;

    /// Name of the owning node.
    fn node(&self) -> &str;

    fn ifconfig(&mut self, status: IntfStatus) -> Result<(), ExternalError>;

    fn is_up(&self) -> bool;

    fn set_ip(&mut self, ip: IpSpec) -> Result<(), ExternalError>;

    fn mac(&self) -> Option<MacAddr>;
}

/// A constructed link owning its two interfaces.
pub trait LinkHandle {
    fn intf1(&self) -> &dyn IntfHandle;

    fn intf2(&self) -> &dyn IntfHandle;

    fn intf1_mut(&mut self) -> &mut dyn IntfHandle;

    fn intf2_mut(&mut self) -> &mut dyn IntfHandle;

    /// Tear down the link and both interfaces.
    fn stop(&mut self) -> Result<(), ExternalError>;
}

impl dyn LinkHandle {
    /// True if this link joins `a` and `b`, in either order.
    pub fn connects(&self, a: &str, b: &str) -> bool {
        let (n1, n2) = (self.intf1().node(), self.intf2().node());
        (n1 == a && n2 == b) || (n1 == b && n2 == a)
    }
}

/// Link-level construction parameters.
///
/// `addr1`/`addr2` are the per-side MACs; the orchestrator fills them with
/// random locally-administered addresses when absent. Port indices are
/// optional hints; the factory picks the next free index per node when
/// they are not given.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LinkParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub addr1: Option<MacAddr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub addr2: Option<MacAddr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port1: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port2: Option<u16>,
    /// Backend-specific parameters (bandwidth, delay, ...), uninterpreted.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub extra: HashMap<String, String>,
}

/// A fully resolved link construction request.
#[derive(Debug, Clone)]
pub struct LinkSpec {
    pub node1: String,
    pub node2: String,
    pub params: LinkParams,
}

/// Constructs link handles.
pub trait LinkFactory {
    fn build(&self, spec: &LinkSpec) -> Result<Box<dyn LinkHandle>, ExternalError>;
}
