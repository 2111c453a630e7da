//! Topology realization and the build phase.
//!
//! Converts an abstract topology into concrete nodes and links in a fixed
//! phase order: default controllers, hosts, switches, links. Address and
//! port allocation is purely sequential, so the same topology always
//! produces the same assignments. Build-time errors are fatal and abort
//! the remaining steps.

use crate::error::{NetError, Result};
use crate::net::Network;
use crate::node::{NodeParams, NodeRole};
use crate::topology::Topology;
use log::{debug, error, info, warn};

impl Network {
    /// Build the network: realize the topology if one was supplied,
    /// configure the control network in namespaced mode, apply default
    /// host configuration, launch terminals and populate static ARP
    /// entries when requested. Building is one-way; a second call fails.
    pub fn build(&mut self) -> Result<()> {
        if self.built {
            return Err(NetError::Configuration(
                "network is already built".to_string(),
            ));
        }
        if let Some(topo) = self.topo.take() {
            self.build_from_topo(topo.as_ref())?;
        }
        if self.options.in_namespace {
            self.configure_control_network()?;
        }
        info!("*** Configuring hosts");
        self.config_hosts()?;
        if self.terminals.is_some() {
            self.start_terms();
        }
        if self.options.auto_static_arp {
            self.static_arp()?;
        }
        self.built = true;
        Ok(())
    }

    /// Realize an abstract topology: controllers, hosts, switches, links,
    /// in that order, everything registered and attached at the end.
    fn build_from_topo(&mut self, topo: &dyn Topology) -> Result<()> {
        info!("*** Creating network");

        if self.registry.controllers().next().is_none() && !self.controller_factories.is_empty() {
            info!("*** Adding {} controllers", self.controller_factories.len());
            for i in 0..self.controller_factories.len() {
                let name = format!("c{i}");
                let controller =
                    self.controller_factories[i].build(&name, &NodeParams::default())?;
                self.registry.register_controller(controller)?;
            }
        }

        let hosts = topo.hosts();
        info!("*** Adding {} hosts", hosts.len());
        for name in &hosts {
            self.add_host(name, topo.node_info(name))?;
        }

        let switches = topo.switches();
        info!("*** Adding {} switches", switches.len());
        for name in &switches {
            self.add_switch(name, topo.node_info(name))?;
        }

        let links = topo.links(true);
        info!("*** Adding {} links", links.len());
        for link in links {
            debug!("link ({}, {})", link.node1, link.node2);
            self.add_link(link.node1.as_str(), link.node2.as_str(), link.params)?;
        }

        Ok(())
    }

    /// Invoke the control-network hook. Namespaced mode without an
    /// explicit configurator is a configuration error.
    fn configure_control_network(&mut self) -> Result<()> {
        let Some(mut hook) = self.control_net.take() else {
            return Err(NetError::Configuration(
                "control network configuration must be supplied when running in namespaces"
                    .to_string(),
            ));
        };
        let result = hook.configure(self);
        self.control_net = Some(hook);
        result
    }

    /// Apply default configuration to every host, in registry order.
    /// Hosts without an interface are skipped (nothing to configure).
    fn config_hosts(&mut self) -> Result<()> {
        for host in self.registry.hosts_mut() {
            if host.default_intf().is_some() {
                host.config_default()?;
            } else {
                debug!("host {} has no interface to configure", host.name());
            }
        }
        Ok(())
    }

    /// Launch terminal front-ends for every node, controllers first.
    /// Failures are reported; the build continues without terminals.
    fn start_terms(&mut self) {
        let Some(mut launcher) = self.terminals.take() else {
            return;
        };
        let batches = [
            (NodeRole::Controller, self.registry.controller_names()),
            (NodeRole::Switch, self.registry.switch_names()),
            (NodeRole::Host, self.registry.host_names()),
        ];
        for (role, names) in batches {
            if names.is_empty() {
                continue;
            }
            if let Err(err) = launcher.launch(role, &names) {
                error!("error starting {role} terminals: {err}");
            } else {
                self.terms_launched = true;
            }
        }
        self.terminals = Some(launcher);
    }

    /// Install all-pairs static ARP entries so hosts need not broadcast.
    fn static_arp(&mut self) -> Result<()> {
        let entries: Vec<_> = self
            .registry
            .hosts()
            .filter_map(|host| Some((host.name().to_string(), host.ip()?, host.mac()?)))
            .collect();
        if entries.len() < self.registry.hosts().count() {
            warn!("some hosts have no IP/MAC; static ARP entries will be incomplete");
        }
        for src in self.registry.host_names() {
            let host = self.registry.host_mut(&src)?;
            for (peer, ip, mac) in &entries {
                if *peer != src {
                    host.set_arp(ip.addr, *mac)?;
                }
            }
        }
        Ok(())
    }
}
