//! The network: registry, allocator, link set and orchestration state.
//!
//! A [`Network`] owns everything that exists for the lifetime of one
//! emulated network instance and drives it through its phases:
//! construction, (optional) build from a topology, start, runtime
//! mutation, stop. All operations run on one control thread; concurrency
//! exists only in the external world once nodes are started.

mod build;
mod lifecycle;
mod monitor;
mod readiness;

pub use monitor::{Monitor, MonitorEvent};

use crate::addr::AddressAllocator;
use crate::error::{NetError, Result};
use crate::link::{IntfStatus, LinkFactory, LinkHandle, LinkParams, LinkSpec};
use crate::node::{
    ControllerFactory, HostFactory, NodeParams, NodeRef, NodeRole, SwitchFactory,
    TerminalLauncher,
};
use crate::registry::NodeRegistry;
use crate::setup::Setup;
use crate::topology::Topology;
use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::time::Duration;

/// Key the default switch factory is registered under.
pub const DEFAULT_SWITCH_CLASS: &str = "default";

/// Synchronous-readiness policy applied at the end of `start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WaitPolicy {
    /// Return from `start` without waiting for switch readiness.
    #[default]
    NoWait,
    /// Poll until every switch reports a controller connection.
    Indefinite,
    /// Poll up to the given budget, then fail listing unready switches.
    Timeout(Duration),
}

/// Orchestration flags and defaults for one network instance.
#[derive(Debug, Clone)]
pub struct NetworkOptions {
    /// Base prefix for host address allocation, CIDR notation.
    pub ip_base: String,
    /// Run switches and controllers in isolated namespaces (requires a
    /// control-network configurator).
    pub in_namespace: bool,
    /// Derive default host MACs from the address counter.
    pub auto_set_macs: bool,
    /// Populate all-pairs static ARP entries during build.
    pub auto_static_arp: bool,
    /// Assign default core indices, cycling over available cores.
    pub auto_pin_cpus: bool,
    /// Base listen port; advances per switch when not namespaced.
    pub listen_port: Option<u16>,
    /// Readiness wait performed by `start`.
    pub wait_connected: WaitPolicy,
    /// Delay between readiness polls.
    pub poll_delay: Duration,
}

impl Default for NetworkOptions {
    fn default() -> Self {
        NetworkOptions {
            ip_base: "10.0.0.0/8".to_string(),
            in_namespace: false,
            auto_set_macs: false,
            auto_static_arp: false,
            auto_pin_cpus: false,
            listen_port: None,
            wait_connected: WaitPolicy::NoWait,
            poll_delay: Duration::from_millis(500),
        }
    }
}

/// The collaborator factories a network is assembled from.
pub struct Factories {
    pub host: Box<dyn HostFactory>,
    pub switch: Box<dyn SwitchFactory>,
    /// Default controller factories; one controller per factory is added
    /// during build when none was added explicitly. May be empty for
    /// controller-less setups.
    pub controllers: Vec<Box<dyn ControllerFactory>>,
    pub link: Box<dyn LinkFactory>,
}

/// Hook configuring a control network when nodes run in namespaces.
///
/// There is no usable default: requesting namespaced mode without an
/// explicit configurator is a configuration error.
pub trait ControlNetConfigurator {
    fn configure(&mut self, net: &mut Network) -> Result<()>;
}

pub struct Network {
    options: NetworkOptions,
    allocator: AddressAllocator,
    registry: NodeRegistry,
    links: Vec<Box<dyn LinkHandle>>,
    host_factory: Box<dyn HostFactory>,
    switch_classes: HashMap<String, Box<dyn SwitchFactory>>,
    controller_factories: Vec<Box<dyn ControllerFactory>>,
    link_factory: Box<dyn LinkFactory>,
    /// Class key each switch was constructed under, for batch grouping.
    switch_class_of: HashMap<String, String>,
    topo: Option<Box<dyn Topology>>,
    control_net: Option<Box<dyn ControlNetConfigurator>>,
    terminals: Option<Box<dyn TerminalLauncher>>,
    terms_launched: bool,
    next_listen_port: Option<u16>,
    built: bool,
}

impl Network {
    /// Create an empty network from completed process setup.
    pub fn new(options: NetworkOptions, factories: Factories, setup: &Setup) -> Result<Self> {
        let allocator = AddressAllocator::new(&options.ip_base, setup.num_cores())?;
        let mut switch_classes = HashMap::new();
        switch_classes.insert(DEFAULT_SWITCH_CLASS.to_string(), factories.switch);
        Ok(Network {
            next_listen_port: options.listen_port,
            options,
            allocator,
            registry: NodeRegistry::new(),
            links: Vec::new(),
            host_factory: factories.host,
            switch_classes,
            controller_factories: factories.controllers,
            link_factory: factories.link,
            switch_class_of: HashMap::new(),
            topo: None,
            control_net: None,
            terminals: None,
            terms_launched: false,
            built: false,
        })
    }

    /// Supply the topology `build` realizes. `start` builds implicitly.
    pub fn with_topology(mut self, topo: Box<dyn Topology>) -> Self {
        self.topo = Some(topo);
        self
    }

    /// Register an alternative switch class, selectable per switch via
    /// `NodeParams::switch_class`.
    pub fn with_switch_class(mut self, name: &str, factory: Box<dyn SwitchFactory>) -> Self {
        self.switch_classes.insert(name.to_string(), factory);
        self
    }

    pub fn with_control_net(mut self, configurator: Box<dyn ControlNetConfigurator>) -> Self {
        self.control_net = Some(configurator);
        self
    }

    pub fn with_terminals(mut self, launcher: Box<dyn TerminalLauncher>) -> Self {
        self.terminals = Some(launcher);
        self
    }

    pub fn options(&self) -> &NetworkOptions {
        &self.options
    }

    pub fn registry(&self) -> &NodeRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut NodeRegistry {
        &mut self.registry
    }

    pub fn links(&self) -> &[Box<dyn LinkHandle>] {
        &self.links
    }

    pub fn built(&self) -> bool {
        self.built
    }

    /// Total node count across all roles.
    pub fn len(&self) -> usize {
        self.registry.count()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.count() == 0
    }

    pub fn contains(&self, name: &str) -> bool {
        self.registry.contains(name)
    }

    /// Default parameters for the next host: the next allocator address,
    /// plus MAC and core index when the corresponding options are set.
    /// Advances the address counter even when callers override the IP.
    fn host_defaults(&mut self) -> NodeParams {
        let index = self.allocator.next_index();
        NodeParams {
            ip: Some(self.allocator.address_for(index)),
            mac: self
                .options
                .auto_set_macs
                .then(|| AddressAllocator::mac_for(index)),
            cores: self
                .options
                .auto_pin_cpus
                .then(|| self.allocator.next_core()),
            ..Default::default()
        }
    }

    /// Add a host, merging allocator defaults under caller params.
    /// Usable both during build and while the network is running.
    pub fn add_host(&mut self, name: &str, params: NodeParams) -> Result<()> {
        let defaults = self.host_defaults();
        let params = params.with_defaults(&defaults);
        let host = self.host_factory.build(name, &params)?;
        self.registry.register_host(host)?;
        debug!("added host {name} ({})", params.ip.map(|ip| ip.to_string()).unwrap_or_default());
        Ok(())
    }

    /// Remove a host at runtime, terminating it with forced interface
    /// deletion. Unknown names are reported and returned as `NotFound`.
    pub fn remove_host(&mut self, node: impl Into<NodeRef>) -> Result<()> {
        let node = node.into();
        let mut host = match self.registry.take_host(node.name()) {
            Ok(host) => host,
            Err(err) => {
                error!("host {} not found, cannot remove it", node.name());
                return Err(err);
            }
        };
        if let Err(err) = host.terminate(true) {
            warn!("error terminating removed host {}: {err}", node.name());
        }
        debug!("removed host {}", node.name());
        Ok(())
    }

    /// Add a switch, resolving any class override and advancing the
    /// shared listen port when not namespaced.
    pub fn add_switch(&mut self, name: &str, params: NodeParams) -> Result<()> {
        let defaults = NodeParams {
            listen_port: self.next_listen_port,
            in_namespace: Some(self.options.in_namespace),
            ..Default::default()
        };
        let params = params.with_defaults(&defaults);
        let class = params
            .switch_class
            .clone()
            .unwrap_or_else(|| DEFAULT_SWITCH_CLASS.to_string());
        let factory = self.switch_classes.get(&class).ok_or_else(|| {
            NetError::Configuration(format!("unknown switch class '{class}' for switch '{name}'"))
        })?;
        let switch = factory.build(name, &params)?;
        self.registry.register_switch(switch)?;
        self.switch_class_of.insert(name.to_string(), class);
        if !self.options.in_namespace {
            if let Some(port) = self.next_listen_port.as_mut() {
                *port += 1;
            }
        }
        Ok(())
    }

    /// Add a controller built by the first configured controller factory.
    pub fn add_controller(&mut self, name: &str, params: NodeParams) -> Result<()> {
        let factory = self.controller_factories.first().ok_or_else(|| {
            NetError::Configuration("no controller factory configured".to_string())
        })?;
        let controller = factory.build(name, &params)?;
        self.registry.register_controller(controller)?;
        Ok(())
    }

    /// Add a link between two nodes, filling in random per-side MACs and
    /// notifying switch endpoints to attach the new interfaces. Multiple
    /// parallel links between the same pair are permitted.
    pub fn add_link(
        &mut self,
        node1: impl Into<NodeRef>,
        node2: impl Into<NodeRef>,
        mut params: LinkParams,
    ) -> Result<()> {
        let (node1, node2) = (node1.into(), node2.into());
        for node in [&node1, &node2] {
            if !self.registry.contains(node.name()) {
                error!("node {} not found, cannot link it", node.name());
                return Err(NetError::NotFound(node.name().to_string()));
            }
        }
        if params.addr1.is_none() {
            params.addr1 = Some(AddressAllocator::rand_mac());
        }
        if params.addr2.is_none() {
            params.addr2 = Some(AddressAllocator::rand_mac());
        }
        let spec = LinkSpec {
            node1: node1.name().to_string(),
            node2: node2.name().to_string(),
            params,
        };
        let link = self.link_factory.build(&spec)?;
        for (node, intf) in [
            (node1.name(), link.intf1().name().to_string()),
            (node2.name(), link.intf2().name().to_string()),
        ] {
            if self.registry.role(node) == Some(NodeRole::Switch) {
                self.registry.switch_mut(node)?.attach(&intf)?;
            }
        }
        self.links.push(link);
        Ok(())
    }

    /// Remove the first link joining the two nodes, in either order,
    /// tearing it down. A missing link is reported and returned as
    /// `LinkNotFound`.
    pub fn remove_link(
        &mut self,
        node1: impl Into<NodeRef>,
        node2: impl Into<NodeRef>,
    ) -> Result<()> {
        let (node1, node2) = (node1.into(), node2.into());
        let position = self
            .links
            .iter()
            .position(|link| link.as_ref().connects(node1.name(), node2.name()));
        let Some(position) = position else {
            error!(
                "couldn't find link between {} and {} to remove",
                node1.name(),
                node2.name()
            );
            return Err(NetError::LinkNotFound(
                node1.name().to_string(),
                node2.name().to_string(),
            ));
        };
        let mut link = self.links.remove(position);
        if let Err(err) = link.stop() {
            warn!("error tearing down link: {err}");
        }
        Ok(())
    }

    /// Flip the administrative status of every link joining two nodes.
    /// Per-interface failures are reported; remaining interfaces are
    /// still attempted.
    pub fn config_link_status(
        &mut self,
        src: impl Into<NodeRef>,
        dst: impl Into<NodeRef>,
        status: IntfStatus,
    ) -> Result<()> {
        let (src, dst) = (src.into(), dst.into());
        for node in [&src, &dst] {
            if !self.registry.contains(node.name()) {
                error!("node {} not in network", node.name());
                return Err(NetError::NotFound(node.name().to_string()));
            }
        }
        let mut found = false;
        for link in &mut self.links {
            if !(**link).connects(src.name(), dst.name()) {
                continue;
            }
            found = true;
            if let Err(err) = link.intf1_mut().ifconfig(status) {
                error!("link src status change failed: {err}");
            }
            if let Err(err) = link.intf2_mut().ifconfig(status) {
                error!("link dst status change failed: {err}");
            }
        }
        if !found {
            error!("{} and {} are not connected", src.name(), dst.name());
            return Err(NetError::LinkNotFound(
                src.name().to_string(),
                dst.name().to_string(),
            ));
        }
        Ok(())
    }

    /// Complete start/test/stop cycle around a caller-provided closure.
    pub fn run<T>(&mut self, test: impl FnOnce(&mut Network) -> T) -> Result<T> {
        self.start()?;
        info!("*** Running test");
        let result = test(self);
        self.stop();
        Ok(result)
    }
}
