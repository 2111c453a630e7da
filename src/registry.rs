//! Name-indexed node registry.
//!
//! Owns every node for the lifetime of the network. Names are unique
//! across all roles and never reused for a different live node within one
//! network instance. Each role keeps its own insertion-ordered sequence so
//! start/stop iteration and display are deterministic.

use crate::error::NetError;
use crate::node::{ControllerNode, HostNode, NodeRole, SwitchNode};
use std::collections::HashMap;

#[derive(Default)]
pub struct NodeRegistry {
    hosts: Vec<Box<dyn HostNode>>,
    switches: Vec<Box<dyn SwitchNode>>,
    controllers: Vec<Box<dyn ControllerNode>>,
    roles: HashMap<String, NodeRole>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        NodeRegistry::default()
    }

    fn claim_name(&mut self, name: &str, role: NodeRole) -> Result<(), NetError> {
        if self.roles.contains_key(name) {
            return Err(NetError::DuplicateName(name.to_string()));
        }
        self.roles.insert(name.to_string(), role);
        Ok(())
    }

    /// Register a host; fails with `DuplicateName` if the name is taken,
    /// leaving the existing mapping unchanged.
    pub fn register_host(&mut self, host: Box<dyn HostNode>) -> Result<(), NetError> {
        self.claim_name(host.name(), NodeRole::Host)?;
        self.hosts.push(host);
        Ok(())
    }

    pub fn register_switch(&mut self, switch: Box<dyn SwitchNode>) -> Result<(), NetError> {
        self.claim_name(switch.name(), NodeRole::Switch)?;
        self.switches.push(switch);
        Ok(())
    }

    pub fn register_controller(
        &mut self,
        controller: Box<dyn ControllerNode>,
    ) -> Result<(), NetError> {
        self.claim_name(controller.name(), NodeRole::Controller)?;
        self.controllers.push(controller);
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.roles.contains_key(name)
    }

    pub fn role(&self, name: &str) -> Option<NodeRole> {
        self.roles.get(name).copied()
    }

    /// Total node count across all roles.
    pub fn count(&self) -> usize {
        self.hosts.len() + self.switches.len() + self.controllers.len()
    }

    /// All node names in hosts, switches, controllers order.
    pub fn names(&self) -> Vec<String> {
        self.host_names()
            .into_iter()
            .chain(self.switch_names())
            .chain(self.controller_names())
            .collect()
    }

    pub fn host(&self, name: &str) -> Result<&dyn HostNode, NetError> {
        self.hosts
            .iter()
            .find(|h| h.name() == name)
            .map(|h| h.as_ref())
            .ok_or_else(|| NetError::NotFound(name.to_string()))
    }

    pub fn host_mut(&mut self, name: &str) -> Result<&mut dyn HostNode, NetError> {
        self.hosts
            .iter_mut()
            .find(|h| h.name() == name)
            .map(|h| h.as_mut() as &mut dyn HostNode)
            .ok_or_else(|| NetError::NotFound(name.to_string()))
    }

    pub fn switch(&self, name: &str) -> Result<&dyn SwitchNode, NetError> {
        self.switches
            .iter()
            .find(|s| s.name() == name)
            .map(|s| s.as_ref())
            .ok_or_else(|| NetError::NotFound(name.to_string()))
    }

    pub fn switch_mut(&mut self, name: &str) -> Result<&mut dyn SwitchNode, NetError> {
        self.switches
            .iter_mut()
            .find(|s| s.name() == name)
            .map(|s| s.as_mut() as &mut dyn SwitchNode)
            .ok_or_else(|| NetError::NotFound(name.to_string()))
    }

    pub fn controller(&self, name: &str) -> Result<&dyn ControllerNode, NetError> {
        self.controllers
            .iter()
            .find(|c| c.name() == name)
            .map(|c| c.as_ref())
            .ok_or_else(|| NetError::NotFound(name.to_string()))
    }

    pub fn hosts(&self) -> impl Iterator<Item = &dyn HostNode> {
        self.hosts.iter().map(|h| h.as_ref())
    }

    pub fn hosts_mut(&mut self) -> impl Iterator<Item = &mut Box<dyn HostNode>> {
        self.hosts.iter_mut()
    }

    pub fn switches(&self) -> impl Iterator<Item = &dyn SwitchNode> {
        self.switches.iter().map(|s| s.as_ref())
    }

    pub fn switches_mut(&mut self) -> impl Iterator<Item = &mut Box<dyn SwitchNode>> {
        self.switches.iter_mut()
    }

    pub fn controllers(&self) -> impl Iterator<Item = &dyn ControllerNode> {
        self.controllers.iter().map(|c| c.as_ref())
    }

    pub fn controllers_mut(&mut self) -> impl Iterator<Item = &mut Box<dyn ControllerNode>> {
        self.controllers.iter_mut()
    }

    pub fn host_names(&self) -> Vec<String> {
        self.hosts.iter().map(|h| h.name().to_string()).collect()
    }

    pub fn switch_names(&self) -> Vec<String> {
        self.switches.iter().map(|s| s.name().to_string()).collect()
    }

    pub fn controller_names(&self) -> Vec<String> {
        self.controllers
            .iter()
            .map(|c| c.name().to_string())
            .collect()
    }

    /// Remove a host from the registry and hand its handle back to the
    /// caller for teardown. Fails with `NotFound` for unknown or
    /// non-host names.
    pub fn take_host(&mut self, name: &str) -> Result<Box<dyn HostNode>, NetError> {
        let index = self
            .hosts
            .iter()
            .position(|h| h.name() == name)
            .ok_or_else(|| NetError::NotFound(name.to_string()))?;
        self.roles.remove(name);
        Ok(self.hosts.remove(index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{HostFactory, SwitchFactory};
    use crate::sim::SimBackend;

    fn registry_with_hosts(names: &[&str]) -> NodeRegistry {
        let backend = SimBackend::new();
        let mut registry = NodeRegistry::new();
        for name in names {
            let host = backend.host_factory().build(name, &Default::default()).unwrap();
            registry.register_host(host).unwrap();
        }
        registry
    }

    #[test]
    fn test_duplicate_name_rejected_and_mapping_unchanged() {
        let backend = SimBackend::new();
        let mut registry = registry_with_hosts(&["h1"]);
        let dup = backend.host_factory().build("h1", &Default::default()).unwrap();
        let err = registry.register_host(dup).unwrap_err();
        assert!(matches!(err, NetError::DuplicateName(name) if name == "h1"));
        assert_eq!(registry.count(), 1);
        assert!(registry.host("h1").is_ok());
    }

    #[test]
    fn test_names_unique_across_roles() {
        let backend = SimBackend::new();
        let mut registry = registry_with_hosts(&["n1"]);
        let sw = backend
            .switch_factory()
            .build("n1", &Default::default())
            .unwrap();
        assert!(matches!(
            registry.register_switch(sw),
            Err(NetError::DuplicateName(_))
        ));
    }

    #[test]
    fn test_insertion_order_preserved() {
        let registry = registry_with_hosts(&["h3", "h1", "h2"]);
        assert_eq!(registry.host_names(), vec!["h3", "h1", "h2"]);
    }

    #[test]
    fn test_take_host_removes_from_role_sequence() {
        let mut registry = registry_with_hosts(&["h1", "h2", "h3"]);
        let taken = registry.take_host("h2").unwrap();
        assert_eq!(taken.name(), "h2");
        assert_eq!(registry.host_names(), vec!["h1", "h3"]);
        assert!(!registry.contains("h2"));
        assert!(matches!(
            registry.take_host("h2"),
            Err(NetError::NotFound(_))
        ));
    }

    #[test]
    fn test_lookup_unknown_is_recoverable() {
        let registry = registry_with_hosts(&["h1"]);
        assert!(matches!(
            registry.host("nope"),
            Err(NetError::NotFound(name)) if name == "nope"
        ));
    }
}
