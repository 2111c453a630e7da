//! In-process simulation backend.
//!
//! A complete in-memory realization of the collaborator contracts, used
//! by the binary and the integration tests. Nodes and links mutate a
//! shared [`SimWorld`] (interface bookkeeping, lifecycle statuses, an
//! ordered operation log) behind `Rc<RefCell<_>>`, which pins a network
//! to one thread by construction — matching the single-threaded
//! orchestration model. This is a stand-in for isolation primitives, not
//! a packet data plane.

use crate::addr::{IpSpec, MacAddr};
use crate::error::ExternalError;
use crate::link::{IntfHandle, IntfStatus, LinkFactory, LinkHandle, LinkSpec};
use crate::node::{
    BatchLifecycle, ControllerFactory, ControllerInfo, ControllerNode, HostFactory, HostNode,
    Node, NodeParams, NodeStatus, OutputStream, SwitchFactory, SwitchNode,
};
use log::debug;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::net::Ipv4Addr;
use std::rc::Rc;
use std::time::{Duration, Instant};

/// Class key the batch-capable switch factory registers under.
pub const BATCH_SWITCH_CLASS: &str = "batch";

const DEFAULT_CONTROLLER_PORT: u16 = 6653;

/// How a simulated switch reaches the connected state after start.
#[derive(Debug, Clone, Copy, Default)]
pub enum ConnectBehavior {
    #[default]
    Immediate,
    Delayed(Duration),
    Never,
}

#[derive(Debug, Default)]
struct OutputState {
    lines: VecDeque<String>,
    closed: bool,
}

#[derive(Debug, Default)]
struct IntfState {
    up: bool,
    ip: Option<IpSpec>,
    mac: Option<MacAddr>,
}

/// Shared backend state mutated by all sim nodes and links.
#[derive(Default)]
pub struct SimWorld {
    /// Ordered log of every operation, for test assertions.
    events: Vec<String>,
    /// Interface names per node, creation order, never reused.
    intfs: HashMap<String, Vec<String>>,
    next_eth: HashMap<String, u16>,
    intf_state: HashMap<String, IntfState>,
    statuses: HashMap<String, NodeStatus>,
    switch_started: HashMap<String, Instant>,
    connect_behavior: HashMap<String, ConnectBehavior>,
    controllers_running: HashSet<String>,
    start_calls: HashMap<String, u32>,
    arp_tables: HashMap<String, Vec<(Ipv4Addr, MacAddr)>>,
    outputs: HashMap<String, Rc<RefCell<OutputState>>>,
    fail_ops: HashSet<String>,
}

impl SimWorld {
    fn record(&mut self, event: impl Into<String>) {
        self.events.push(event.into());
    }

    fn check_failure(&self, op: &str, node: &str) -> Result<(), ExternalError> {
        if self.fail_ops.contains(&format!("{op}:{node}")) {
            Err(ExternalError::new(op, node, "injected failure"))
        } else {
            Ok(())
        }
    }

    fn new_intf(&mut self, node: &str, mac: Option<MacAddr>) -> String {
        let index = self.next_eth.entry(node.to_string()).or_insert(0);
        let name = format!("{node}-eth{index}");
        *index += 1;
        self.intfs
            .entry(node.to_string())
            .or_default()
            .push(name.clone());
        self.intf_state.insert(
            name.clone(),
            IntfState {
                up: false,
                ip: None,
                mac,
            },
        );
        name
    }

    fn drop_intf(&mut self, node: &str, intf: &str) {
        if let Some(list) = self.intfs.get_mut(node) {
            list.retain(|name| name != intf);
        }
        self.intf_state.remove(intf);
    }

    fn output_of(&mut self, node: &str) -> Rc<RefCell<OutputState>> {
        self.outputs.entry(node.to_string()).or_default().clone()
    }
}

/// Handle to a shared sim world plus factory constructors over it.
#[derive(Clone, Default)]
pub struct SimBackend {
    world: Rc<RefCell<SimWorld>>,
}

impl SimBackend {
    pub fn new() -> Self {
        SimBackend::default()
    }

    /// A complete factory set: sim hosts, sim switches, one sim
    /// controller factory and sim links.
    pub fn factories(&self) -> crate::net::Factories {
        crate::net::Factories {
            host: Box::new(self.host_factory()),
            switch: Box::new(self.switch_factory()),
            controllers: vec![Box::new(self.controller_factory())],
            link: Box::new(self.link_factory()),
        }
    }

    pub fn host_factory(&self) -> SimHostFactory {
        SimHostFactory {
            world: self.world.clone(),
        }
    }

    pub fn switch_factory(&self) -> SimSwitchFactory {
        SimSwitchFactory {
            world: self.world.clone(),
        }
    }

    /// Switch factory advertising the class-level batch capability.
    pub fn batch_switch_factory(&self) -> SimBatchSwitchFactory {
        SimBatchSwitchFactory {
            world: self.world.clone(),
            driver: SimBatchDriver {
                world: self.world.clone(),
            },
        }
    }

    pub fn controller_factory(&self) -> SimControllerFactory {
        SimControllerFactory {
            world: self.world.clone(),
        }
    }

    pub fn link_factory(&self) -> SimLinkFactory {
        SimLinkFactory {
            world: self.world.clone(),
        }
    }

    /// Configure how a switch reaches readiness once started.
    pub fn set_connect_behavior(&self, switch: &str, behavior: ConnectBehavior) {
        self.world
            .borrow_mut()
            .connect_behavior
            .insert(switch.to_string(), behavior);
    }

    /// Make one operation on one node fail (`op` as logged, e.g. "stop").
    pub fn fail_on(&self, op: &str, node: &str) {
        self.world.borrow_mut().fail_ops.insert(format!("{op}:{node}"));
    }

    /// Append a line to a host's output stream.
    pub fn emit(&self, host: &str, line: &str) {
        let output = self.world.borrow_mut().output_of(host);
        output.borrow_mut().lines.push_back(line.to_string());
    }

    /// Close a host's output stream.
    pub fn close_output(&self, host: &str) {
        let output = self.world.borrow_mut().output_of(host);
        output.borrow_mut().closed = true;
    }

    /// Snapshot of the ordered operation log.
    pub fn events(&self) -> Vec<String> {
        self.world.borrow().events.clone()
    }

    pub fn status_of(&self, node: &str) -> Option<NodeStatus> {
        self.world.borrow().statuses.get(node).copied()
    }

    /// Interface names currently registered for a node.
    pub fn intfs_of(&self, node: &str) -> Vec<String> {
        self.world
            .borrow()
            .intfs
            .get(node)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of individual (non-batch) start calls a switch received.
    pub fn start_calls(&self, switch: &str) -> u32 {
        self.world
            .borrow()
            .start_calls
            .get(switch)
            .copied()
            .unwrap_or(0)
    }

    pub fn arp_entries(&self, host: &str) -> Vec<(Ipv4Addr, MacAddr)> {
        self.world
            .borrow()
            .arp_tables
            .get(host)
            .cloned()
            .unwrap_or_default()
    }
}

struct SimOutput {
    state: Rc<RefCell<OutputState>>,
}

impl OutputStream for SimOutput {
    fn ready(&self) -> bool {
        !self.state.borrow().lines.is_empty()
    }

    fn read_line(&mut self) -> Option<String> {
        self.state.borrow_mut().lines.pop_front()
    }

    fn closed(&self) -> bool {
        let state = self.state.borrow();
        state.closed && state.lines.is_empty()
    }
}

pub struct SimHost {
    name: String,
    params: NodeParams,
    world: Rc<RefCell<SimWorld>>,
    output: SimOutput,
}

impl Node for SimHost {
    fn name(&self) -> &str {
        &self.name
    }

    fn status(&self) -> NodeStatus {
        self.world
            .borrow()
            .statuses
            .get(&self.name)
            .copied()
            .unwrap_or(NodeStatus::Unbuilt)
    }
}

impl HostNode for SimHost {
    fn default_intf(&self) -> Option<String> {
        self.world
            .borrow()
            .intfs
            .get(&self.name)
            .and_then(|list| list.first().cloned())
    }

    fn config_default(&mut self) -> Result<(), ExternalError> {
        let Some(intf) = self.default_intf() else {
            return Ok(());
        };
        let mut world = self.world.borrow_mut();
        world.check_failure("config", &self.name)?;
        let state = world
            .intf_state
            .get_mut(&intf)
            .ok_or_else(|| ExternalError::new("config", &self.name, "interface vanished"))?;
        state.up = true;
        state.ip = self.params.ip;
        if let Some(mac) = self.params.mac {
            state.mac = Some(mac);
        }
        world.record(format!("config {}", self.name));
        Ok(())
    }

    fn ip(&self) -> Option<IpSpec> {
        self.params.ip
    }

    fn mac(&self) -> Option<MacAddr> {
        self.params.mac
    }

    fn set_arp(&mut self, ip: Ipv4Addr, mac: MacAddr) -> Result<(), ExternalError> {
        let mut world = self.world.borrow_mut();
        world.check_failure("arp", &self.name)?;
        world
            .arp_tables
            .entry(self.name.clone())
            .or_default()
            .push((ip, mac));
        Ok(())
    }

    fn terminate(&mut self, delete_intfs: bool) -> Result<(), ExternalError> {
        let mut world = self.world.borrow_mut();
        world.check_failure("terminate", &self.name)?;
        if delete_intfs {
            for intf in world.intfs.remove(&self.name).unwrap_or_default() {
                world.intf_state.remove(&intf);
            }
        }
        world
            .statuses
            .insert(self.name.clone(), NodeStatus::Terminated);
        world.record(format!("terminate {}", self.name));
        self.output.state.borrow_mut().closed = true;
        Ok(())
    }

    fn output(&mut self) -> Option<&mut dyn OutputStream> {
        Some(&mut self.output)
    }
}

pub struct SimHostFactory {
    world: Rc<RefCell<SimWorld>>,
}

impl HostFactory for SimHostFactory {
    fn build(&self, name: &str, params: &NodeParams) -> Result<Box<dyn HostNode>, ExternalError> {
        let mut world = self.world.borrow_mut();
        world.check_failure("build", name)?;
        // Hosts run from construction, like a spawned shell
        world.statuses.insert(name.to_string(), NodeStatus::Running);
        let state = world.output_of(name);
        debug!("sim: built host {name}");
        Ok(Box::new(SimHost {
            name: name.to_string(),
            params: params.clone(),
            world: self.world.clone(),
            output: SimOutput { state },
        }))
    }
}

pub struct SimSwitch {
    name: String,
    world: Rc<RefCell<SimWorld>>,
}

impl SimSwitch {
    fn start_inner(&mut self, individual: bool) -> Result<(), ExternalError> {
        let mut world = self.world.borrow_mut();
        world.check_failure("start", &self.name)?;
        if individual {
            *world.start_calls.entry(self.name.clone()).or_insert(0) += 1;
        }
        world
            .switch_started
            .insert(self.name.clone(), Instant::now());
        world.statuses.insert(self.name.clone(), NodeStatus::Running);
        world.record(format!("start {}", self.name));
        Ok(())
    }
}

impl Node for SimSwitch {
    fn name(&self) -> &str {
        &self.name
    }

    fn status(&self) -> NodeStatus {
        self.world
            .borrow()
            .statuses
            .get(&self.name)
            .copied()
            .unwrap_or(NodeStatus::Unbuilt)
    }
}

impl SwitchNode for SimSwitch {
    fn start(&mut self, _controllers: &[ControllerInfo]) -> Result<(), ExternalError> {
        self.start_inner(true)
    }

    fn stop(&mut self) -> Result<(), ExternalError> {
        let mut world = self.world.borrow_mut();
        world.check_failure("stop", &self.name)?;
        world.switch_started.remove(&self.name);
        world.statuses.insert(self.name.clone(), NodeStatus::Stopped);
        world.record(format!("stop {}", self.name));
        Ok(())
    }

    fn terminate(&mut self) -> Result<(), ExternalError> {
        let mut world = self.world.borrow_mut();
        world.check_failure("terminate", &self.name)?;
        world
            .statuses
            .insert(self.name.clone(), NodeStatus::Terminated);
        world.record(format!("terminate {}", self.name));
        Ok(())
    }

    fn connected(&self) -> bool {
        let world = self.world.borrow();
        let Some(started) = world.switch_started.get(&self.name) else {
            return false;
        };
        match world
            .connect_behavior
            .get(&self.name)
            .copied()
            .unwrap_or_default()
        {
            ConnectBehavior::Immediate => true,
            ConnectBehavior::Delayed(delay) => started.elapsed() >= delay,
            ConnectBehavior::Never => false,
        }
    }

    fn attach(&mut self, intf: &str) -> Result<(), ExternalError> {
        let mut world = self.world.borrow_mut();
        world.check_failure("attach", &self.name)?;
        world.record(format!("attach {intf} to {}", self.name));
        Ok(())
    }
}

pub struct SimSwitchFactory {
    world: Rc<RefCell<SimWorld>>,
}

impl SimSwitchFactory {
    fn build_switch(
        world: &Rc<RefCell<SimWorld>>,
        name: &str,
    ) -> Result<Box<dyn SwitchNode>, ExternalError> {
        let mut inner = world.borrow_mut();
        inner.check_failure("build", name)?;
        inner.statuses.insert(name.to_string(), NodeStatus::Unbuilt);
        debug!("sim: built switch {name}");
        Ok(Box::new(SimSwitch {
            name: name.to_string(),
            world: world.clone(),
        }))
    }
}

impl SwitchFactory for SimSwitchFactory {
    fn build(
        &self,
        name: &str,
        _params: &NodeParams,
    ) -> Result<Box<dyn SwitchNode>, ExternalError> {
        SimSwitchFactory::build_switch(&self.world, name)
    }
}

/// Class-level batch start/stop over sim switches.
pub struct SimBatchDriver {
    world: Rc<RefCell<SimWorld>>,
}

impl BatchLifecycle for SimBatchDriver {
    fn batch_startup(
        &self,
        switches: Vec<&mut dyn SwitchNode>,
        _controllers: &[ControllerInfo],
    ) -> Vec<String> {
        let names: Vec<String> = switches.iter().map(|s| s.name().to_string()).collect();
        let mut world = self.world.borrow_mut();
        let mut succeeded = Vec::new();
        for name in names {
            if world.check_failure("batch-start", &name).is_err() {
                continue;
            }
            world.switch_started.insert(name.clone(), Instant::now());
            world.statuses.insert(name.clone(), NodeStatus::Running);
            succeeded.push(name);
        }
        world.record(format!("batch-startup [{}]", succeeded.join(", ")));
        succeeded
    }

    fn batch_shutdown(&self, switches: Vec<&mut dyn SwitchNode>) -> Vec<String> {
        let names: Vec<String> = switches.iter().map(|s| s.name().to_string()).collect();
        let mut world = self.world.borrow_mut();
        let mut succeeded = Vec::new();
        for name in names {
            if world.check_failure("batch-stop", &name).is_err() {
                continue;
            }
            world.switch_started.remove(&name);
            world.statuses.insert(name.clone(), NodeStatus::Stopped);
            succeeded.push(name);
        }
        world.record(format!("batch-shutdown [{}]", succeeded.join(", ")));
        succeeded
    }
}

pub struct SimBatchSwitchFactory {
    world: Rc<RefCell<SimWorld>>,
    driver: SimBatchDriver,
}

impl SwitchFactory for SimBatchSwitchFactory {
    fn build(
        &self,
        name: &str,
        _params: &NodeParams,
    ) -> Result<Box<dyn SwitchNode>, ExternalError> {
        SimSwitchFactory::build_switch(&self.world, name)
    }

    fn batch(&self) -> Option<&dyn BatchLifecycle> {
        Some(&self.driver)
    }
}

pub struct SimController {
    name: String,
    port: u16,
    world: Rc<RefCell<SimWorld>>,
}

impl Node for SimController {
    fn name(&self) -> &str {
        &self.name
    }

    fn status(&self) -> NodeStatus {
        self.world
            .borrow()
            .statuses
            .get(&self.name)
            .copied()
            .unwrap_or(NodeStatus::Unbuilt)
    }
}

impl ControllerNode for SimController {
    fn start(&mut self) -> Result<(), ExternalError> {
        let mut world = self.world.borrow_mut();
        world.check_failure("start", &self.name)?;
        world.controllers_running.insert(self.name.clone());
        world.statuses.insert(self.name.clone(), NodeStatus::Running);
        world.record(format!("start {}", self.name));
        Ok(())
    }

    fn stop(&mut self) -> Result<(), ExternalError> {
        let mut world = self.world.borrow_mut();
        world.check_failure("stop", &self.name)?;
        world.controllers_running.remove(&self.name);
        world.statuses.insert(self.name.clone(), NodeStatus::Stopped);
        world.record(format!("stop {}", self.name));
        Ok(())
    }

    fn conn_info(&self) -> ControllerInfo {
        ControllerInfo {
            name: self.name.clone(),
            ip: Ipv4Addr::LOCALHOST,
            port: self.port,
        }
    }
}

pub struct SimControllerFactory {
    world: Rc<RefCell<SimWorld>>,
}

impl ControllerFactory for SimControllerFactory {
    fn build(
        &self,
        name: &str,
        params: &NodeParams,
    ) -> Result<Box<dyn ControllerNode>, ExternalError> {
        let mut world = self.world.borrow_mut();
        world.check_failure("build", name)?;
        world.statuses.insert(name.to_string(), NodeStatus::Unbuilt);
        debug!("sim: built controller {name}");
        Ok(Box::new(SimController {
            name: name.to_string(),
            port: params.listen_port.unwrap_or(DEFAULT_CONTROLLER_PORT),
            world: self.world.clone(),
        }))
    }
}

pub struct SimIntf {
    name: String,
    node: String,
    world: Rc<RefCell<SimWorld>>,
}

impl IntfHandle for SimIntf {
    fn name(&self) -> &str {
        &self.name
    }

    fn node(&self) -> &str {
        &self.node
    }

    fn ifconfig(&mut self, status: IntfStatus) -> Result<(), ExternalError> {
        let mut world = self.world.borrow_mut();
        world.check_failure("ifconfig", &self.name)?;
        let state = world
            .intf_state
            .get_mut(&self.name)
            .ok_or_else(|| ExternalError::new("ifconfig", &self.name, "interface deleted"))?;
        state.up = status == IntfStatus::Up;
        world.record(format!("ifconfig {} {status}", self.name));
        Ok(())
    }

    fn is_up(&self) -> bool {
        self.world
            .borrow()
            .intf_state
            .get(&self.name)
            .map(|state| state.up)
            .unwrap_or(false)
    }

    fn set_ip(&mut self, ip: IpSpec) -> Result<(), ExternalError> {
        let mut world = self.world.borrow_mut();
        world.check_failure("setip", &self.name)?;
        let state = world
            .intf_state
            .get_mut(&self.name)
            .ok_or_else(|| ExternalError::new("setip", &self.name, "interface deleted"))?;
        state.ip = Some(ip);
        Ok(())
    }

    fn mac(&self) -> Option<MacAddr> {
        self.world
            .borrow()
            .intf_state
            .get(&self.name)
            .and_then(|state| state.mac)
    }
}

pub struct SimLink {
    intf1: SimIntf,
    intf2: SimIntf,
    world: Rc<RefCell<SimWorld>>,
}

impl LinkHandle for SimLink {
    fn intf1(&self) -> &dyn IntfHandle {
        &self.intf1
    }

    fn intf2(&self) -> &dyn IntfHandle {
        &self.intf2
    }

    fn intf1_mut(&mut self) -> &mut dyn IntfHandle {
        &mut self.intf1
    }

    fn intf2_mut(&mut self) -> &mut dyn IntfHandle {
        &mut self.intf2
    }

    fn stop(&mut self) -> Result<(), ExternalError> {
        let mut world = self.world.borrow_mut();
        world.check_failure("unlink", &self.intf1.name)?;
        world.drop_intf(&self.intf1.node, &self.intf1.name);
        world.drop_intf(&self.intf2.node, &self.intf2.name);
        world.record(format!("unlink {}<->{}", self.intf1.name, self.intf2.name));
        Ok(())
    }
}

pub struct SimLinkFactory {
    world: Rc<RefCell<SimWorld>>,
}

impl LinkFactory for SimLinkFactory {
    fn build(&self, spec: &LinkSpec) -> Result<Box<dyn LinkHandle>, ExternalError> {
        let mut world = self.world.borrow_mut();
        world.check_failure("link", &spec.node1)?;
        let name1 = world.new_intf(&spec.node1, spec.params.addr1);
        let name2 = world.new_intf(&spec.node2, spec.params.addr2);
        world.record(format!("link {name1}<->{name2}"));
        drop(world);
        Ok(Box::new(SimLink {
            intf1: SimIntf {
                name: name1,
                node: spec.node1.clone(),
                world: self.world.clone(),
            },
            intf2: SimIntf {
                name: name2,
                node: spec.node2.clone(),
                world: self.world.clone(),
            },
            world: self.world.clone(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intf_names_follow_owner() {
        let backend = SimBackend::new();
        let factory = backend.link_factory();
        let spec = LinkSpec {
            node1: "h1".to_string(),
            node2: "s1".to_string(),
            params: Default::default(),
        };
        let link = factory.build(&spec).unwrap();
        assert_eq!(link.intf1().name(), "h1-eth0");
        assert_eq!(link.intf2().name(), "s1-eth0");
        let link2 = factory.build(&spec).unwrap();
        assert_eq!(link2.intf1().name(), "h1-eth1");
        assert_eq!(link2.intf2().name(), "s1-eth1");
    }

    #[test]
    fn test_link_teardown_removes_interfaces() {
        let backend = SimBackend::new();
        let factory = backend.link_factory();
        let mut link = factory
            .build(&LinkSpec {
                node1: "h1".to_string(),
                node2: "s1".to_string(),
                params: Default::default(),
            })
            .unwrap();
        assert_eq!(backend.intfs_of("h1"), vec!["h1-eth0"]);
        link.stop().unwrap();
        assert!(backend.intfs_of("h1").is_empty());
        assert!(backend.intfs_of("s1").is_empty());
    }

    #[test]
    fn test_intf_addressing_and_status() {
        let backend = SimBackend::new();
        let mut link = backend
            .link_factory()
            .build(&LinkSpec {
                node1: "h1".to_string(),
                node2: "s1".to_string(),
                params: Default::default(),
            })
            .unwrap();
        assert!(!link.intf1().is_up());
        link.intf1_mut().ifconfig(IntfStatus::Up).unwrap();
        assert!(link.intf1().is_up());
        link.intf1_mut().set_ip("10.0.0.7/8".parse().unwrap()).unwrap();
        link.intf1_mut().ifconfig(IntfStatus::Down).unwrap();
        assert!(!link.intf1().is_up());
    }

    #[test]
    fn test_switch_connects_after_start_only() {
        let backend = SimBackend::new();
        let mut switch = backend
            .switch_factory()
            .build("s1", &Default::default())
            .unwrap();
        assert!(!switch.connected());
        switch.start(&[]).unwrap();
        assert!(switch.connected());
        backend.set_connect_behavior("s1", ConnectBehavior::Never);
        assert!(!switch.connected());
    }

    #[test]
    fn test_injected_failures() {
        let backend = SimBackend::new();
        backend.fail_on("stop", "s1");
        let mut switch = backend
            .switch_factory()
            .build("s1", &Default::default())
            .unwrap();
        switch.start(&[]).unwrap();
        assert!(switch.stop().is_err());
        assert!(switch.terminate().is_ok());
    }

    #[test]
    fn test_output_stream_lines_and_close() {
        let backend = SimBackend::new();
        let mut host = backend
            .host_factory()
            .build("h1", &Default::default())
            .unwrap();
        backend.emit("h1", "hello");
        let stream = host.output().unwrap();
        assert!(stream.ready());
        assert_eq!(stream.read_line().as_deref(), Some("hello"));
        assert!(!stream.closed());
        backend.close_output("h1");
        assert!(host.output().unwrap().closed());
    }
}
