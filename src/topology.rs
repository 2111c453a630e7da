//! Abstract topology descriptions.
//!
//! A topology is a static description of the nodes and links a network
//! should realize: ordered host and switch name sequences with per-node
//! parameter maps, and an ordered link list. [`TopologyGraph`] is the
//! programmatic builder (with the canned shapes used throughout the
//! tests); [`DeclaredTopology`] is the YAML form consumed by the binary.

use crate::error::NetError;
use crate::link::LinkParams;
use crate::node::NodeParams;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One declared link with its side-specific parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TopoLink {
    pub node1: String,
    pub node2: String,
    #[serde(flatten)]
    pub params: LinkParams,
}

/// Contract the topology builder consumes.
pub trait Topology {
    /// Host names in topology order.
    fn hosts(&self) -> Vec<String>;

    /// Switch names in topology order.
    fn switches(&self) -> Vec<String>;

    /// Construction parameters declared for a node; empty if none were.
    fn node_info(&self, name: &str) -> NodeParams;

    /// Declared links, optionally in deterministic natural-sorted order.
    fn links(&self, sort: bool) -> Vec<TopoLink>;
}

/// Split a name into text and number chunks so `h2` sorts before `h10`.
fn natural_key(name: &str) -> Vec<(String, Option<u64>)> {
    let mut key = Vec::new();
    let mut text = String::new();
    let mut digits = String::new();
    for ch in name.chars() {
        if ch.is_ascii_digit() {
            digits.push(ch);
        } else {
            if !digits.is_empty() {
                key.push((text.clone(), digits.parse().ok()));
                text.clear();
                digits.clear();
            }
            text.push(ch);
        }
    }
    key.push((text, digits.parse().ok()));
    key
}

fn sorted_links(mut links: Vec<TopoLink>) -> Vec<TopoLink> {
    links.sort_by_key(|link| {
        let (a, b) = (natural_key(&link.node1), natural_key(&link.node2));
        if a <= b { (a, b) } else { (b, a) }
    });
    links
}

/// Programmatically assembled topology preserving insertion order.
#[derive(Debug, Clone, Default)]
pub struct TopologyGraph {
    hosts: Vec<(String, NodeParams)>,
    switches: Vec<(String, NodeParams)>,
    links: Vec<TopoLink>,
}

impl TopologyGraph {
    pub fn new() -> Self {
        TopologyGraph::default()
    }

    pub fn add_host(&mut self, name: &str) -> &mut Self {
        self.add_host_with(name, NodeParams::default())
    }

    pub fn add_host_with(&mut self, name: &str, params: NodeParams) -> &mut Self {
        self.hosts.push((name.to_string(), params));
        self
    }

    pub fn add_switch(&mut self, name: &str) -> &mut Self {
        self.add_switch_with(name, NodeParams::default())
    }

    pub fn add_switch_with(&mut self, name: &str, params: NodeParams) -> &mut Self {
        self.switches.push((name.to_string(), params));
        self
    }

    pub fn add_link(&mut self, node1: &str, node2: &str) -> &mut Self {
        self.add_link_with(node1, node2, LinkParams::default())
    }

    pub fn add_link_with(&mut self, node1: &str, node2: &str, params: LinkParams) -> &mut Self {
        self.links.push(TopoLink {
            node1: node1.to_string(),
            node2: node2.to_string(),
            params,
        });
        self
    }

    /// One switch `s1` with hosts `h1..hN` attached.
    pub fn single(num_hosts: usize) -> Self {
        let mut topo = TopologyGraph::new();
        topo.add_switch("s1");
        for i in 1..=num_hosts {
            let host = format!("h{i}");
            topo.add_host(&host);
            topo.add_link(&host, "s1");
        }
        topo
    }

    /// A chain of switches `s1..sN`, each with one host attached.
    pub fn linear(num_switches: usize) -> Self {
        let mut topo = TopologyGraph::new();
        for i in 1..=num_switches {
            let switch = format!("s{i}");
            let host = format!("h{i}");
            topo.add_switch(&switch);
            topo.add_host(&host);
            topo.add_link(&host, &switch);
            if i > 1 {
                topo.add_link(&format!("s{}", i - 1), &switch);
            }
        }
        topo
    }
}

impl Topology for TopologyGraph {
    fn hosts(&self) -> Vec<String> {
        self.hosts.iter().map(|(name, _)| name.clone()).collect()
    }

    fn switches(&self) -> Vec<String> {
        self.switches.iter().map(|(name, _)| name.clone()).collect()
    }

    fn node_info(&self, name: &str) -> NodeParams {
        self.hosts
            .iter()
            .chain(self.switches.iter())
            .find(|(n, _)| n == name)
            .map(|(_, params)| params.clone())
            .unwrap_or_default()
    }

    fn links(&self, sort: bool) -> Vec<TopoLink> {
        if sort {
            sorted_links(self.links.clone())
        } else {
            self.links.clone()
        }
    }
}

/// One node declaration in the YAML topology form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeDecl {
    pub name: String,
    #[serde(flatten)]
    pub params: NodeParams,
}

/// Declarative topology loaded from YAML.
///
/// ```yaml
/// hosts:
///   - name: h1
///   - name: h2
///     ip: 10.0.0.99/8
/// switches:
///   - name: s1
/// links:
///   - { node1: h1, node2: s1 }
///   - { node1: h2, node2: s1 }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeclaredTopology {
    #[serde(default)]
    pub hosts: Vec<NodeDecl>,
    #[serde(default)]
    pub switches: Vec<NodeDecl>,
    #[serde(default)]
    pub links: Vec<TopoLink>,
}

impl DeclaredTopology {
    pub fn from_yaml(yaml: &str) -> Result<Self, NetError> {
        serde_yaml::from_str(yaml)
            .map_err(|e| NetError::Configuration(format!("invalid topology description: {e}")))
    }

    pub fn load(path: &Path) -> Result<Self, NetError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            NetError::Configuration(format!("cannot read topology '{}': {e}", path.display()))
        })?;
        DeclaredTopology::from_yaml(&content)
    }
}

impl Topology for DeclaredTopology {
    fn hosts(&self) -> Vec<String> {
        self.hosts.iter().map(|decl| decl.name.clone()).collect()
    }

    fn switches(&self) -> Vec<String> {
        self.switches.iter().map(|decl| decl.name.clone()).collect()
    }

    fn node_info(&self, name: &str) -> NodeParams {
        self.hosts
            .iter()
            .chain(self.switches.iter())
            .find(|decl| decl.name == name)
            .map(|decl| decl.params.clone())
            .unwrap_or_default()
    }

    fn links(&self, sort: bool) -> Vec<TopoLink> {
        if sort {
            sorted_links(self.links.clone())
        } else {
            self.links.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_shape() {
        let topo = TopologyGraph::single(3);
        assert_eq!(topo.hosts(), vec!["h1", "h2", "h3"]);
        assert_eq!(topo.switches(), vec!["s1"]);
        assert_eq!(topo.links(false).len(), 3);
    }

    #[test]
    fn test_linear_shape() {
        let topo = TopologyGraph::linear(3);
        assert_eq!(topo.switches(), vec!["s1", "s2", "s3"]);
        assert_eq!(topo.hosts(), vec!["h1", "h2", "h3"]);
        // one host link per switch plus two inter-switch links
        assert_eq!(topo.links(false).len(), 5);
    }

    #[test]
    fn test_natural_link_sort() {
        let mut topo = TopologyGraph::new();
        topo.add_switch("s1");
        for i in [10, 2, 1] {
            let host = format!("h{i}");
            topo.add_host(&host);
            topo.add_link(&host, "s1");
        }
        let sorted: Vec<String> = topo
            .links(true)
            .into_iter()
            .map(|l| l.node1)
            .collect();
        assert_eq!(sorted, vec!["h1", "h2", "h10"]);
    }

    #[test]
    fn test_node_info_falls_back_to_default() {
        let topo = TopologyGraph::single(1);
        assert_eq!(topo.node_info("h1"), NodeParams::default());
        assert_eq!(topo.node_info("unknown"), NodeParams::default());
    }

    #[test]
    fn test_declared_topology_parses_params() {
        let yaml = r#"
hosts:
  - name: h1
  - name: h2
    ip: 10.0.0.99/8
switches:
  - name: s1
    switch_class: batch
links:
  - { node1: h1, node2: s1 }
  - { node1: h2, node2: s1 }
"#;
        let topo = DeclaredTopology::from_yaml(yaml).unwrap();
        assert_eq!(topo.hosts(), vec!["h1", "h2"]);
        assert_eq!(
            topo.node_info("h2").ip.unwrap().to_string(),
            "10.0.0.99/8"
        );
        assert_eq!(topo.node_info("s1").switch_class.as_deref(), Some("batch"));
        assert_eq!(topo.links(false).len(), 2);
    }

    #[test]
    fn test_declared_topology_rejects_garbage() {
        assert!(DeclaredTopology::from_yaml("hosts: 5").is_err());
    }
}
