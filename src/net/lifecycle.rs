//! Start and stop sequencing.
//!
//! Start order: controllers, then switches (class-level batch startup
//! where a class advertises it, individual start for the rest), then the
//! optional readiness wait. Stop reverses the dependency order:
//! controllers, terminals, links, switches (batch then individual, then
//! terminate), hosts. Stop is best-effort: every element gets a stop
//! attempt even when earlier ones fail.

use crate::error::Result;
use crate::net::{Network, WaitPolicy};
use crate::node::{ControllerInfo, SwitchNode};
use log::{debug, info, warn};
use std::collections::HashSet;

impl Network {
    /// Switch class keys in first-appearance order over the registry's
    /// switch sequence.
    fn switch_class_order(&self) -> Vec<String> {
        let mut order = Vec::new();
        for name in self.registry.switch_names() {
            if let Some(class) = self.switch_class_of.get(&name) {
                if !order.contains(class) {
                    order.push(class.clone());
                }
            }
        }
        order
    }

    /// Start the network, building it first if needed.
    ///
    /// Controller or switch start failures are fatal; a configured
    /// readiness wait that times out surfaces as `ReadinessTimeout`.
    pub fn start(&mut self) -> Result<()> {
        if !self.built {
            self.build()?;
        }

        info!(
            "*** Starting {} controllers",
            self.registry.controllers().count()
        );
        for controller in self.registry.controllers_mut() {
            debug!("starting controller {}", controller.name());
            controller.start()?;
        }

        let controller_infos: Vec<ControllerInfo> = self
            .registry
            .controllers()
            .map(|c| c.conn_info())
            .collect();

        info!("*** Starting {} switches", self.registry.switches().count());
        let mut batch_started: HashSet<String> = HashSet::new();
        for class in self.switch_class_order() {
            let Some(batch) = self.switch_classes[&class].batch() else {
                continue;
            };
            let class_of = &self.switch_class_of;
            let instances: Vec<&mut dyn SwitchNode> = self
                .registry
                .switches_mut()
                .filter(|s| class_of.get(s.name()) == Some(&class))
                .map(|s| s.as_mut() as &mut dyn SwitchNode)
                .collect();
            let count = instances.len();
            let succeeded = batch.batch_startup(instances, &controller_infos);
            debug!(
                "batch startup for class '{class}': {}/{count} switches",
                succeeded.len()
            );
            batch_started.extend(succeeded);
        }
        for switch in self.registry.switches_mut() {
            if batch_started.contains(switch.name()) {
                continue;
            }
            debug!("starting switch {}", switch.name());
            switch.start(&controller_infos)?;
        }

        match self.options.wait_connected {
            WaitPolicy::NoWait => Ok(()),
            WaitPolicy::Indefinite => self.wait_connected(None, self.options.poll_delay),
            WaitPolicy::Timeout(budget) => {
                self.wait_connected(Some(budget), self.options.poll_delay)
            }
        }
    }

    /// Stop the network. Safe to call after a partial start: every stage
    /// iterates defensively and reports failures without aborting the
    /// remaining teardown.
    pub fn stop(&mut self) {
        info!(
            "*** Stopping {} controllers",
            self.registry.controllers().count()
        );
        for controller in self.registry.controllers_mut() {
            if let Err(err) = controller.stop() {
                warn!("error stopping controller {}: {err}", controller.name());
            }
        }

        if self.terms_launched {
            info!("*** Stopping terminals");
            if let Some(launcher) = self.terminals.as_mut() {
                if let Err(err) = launcher.shutdown() {
                    warn!("error stopping terminals: {err}");
                }
            }
            self.terms_launched = false;
        }

        info!("*** Stopping {} links", self.links.len());
        for link in &mut self.links {
            if let Err(err) = link.stop() {
                warn!("error tearing down link: {err}");
            }
        }
        self.links.clear();

        info!("*** Stopping {} switches", self.registry.switches().count());
        let mut batch_stopped: HashSet<String> = HashSet::new();
        for class in self.switch_class_order() {
            let Some(batch) = self.switch_classes[&class].batch() else {
                continue;
            };
            let class_of = &self.switch_class_of;
            let instances: Vec<&mut dyn SwitchNode> = self
                .registry
                .switches_mut()
                .filter(|s| class_of.get(s.name()) == Some(&class))
                .map(|s| s.as_mut() as &mut dyn SwitchNode)
                .collect();
            batch_stopped.extend(batch.batch_shutdown(instances));
        }
        for switch in self.registry.switches_mut() {
            if !batch_stopped.contains(switch.name()) {
                if let Err(err) = switch.stop() {
                    warn!("error stopping switch {}: {err}", switch.name());
                }
            }
            if let Err(err) = switch.terminate() {
                warn!("error terminating switch {}: {err}", switch.name());
            }
        }

        info!("*** Stopping {} hosts", self.registry.hosts().count());
        for host in self.registry.hosts_mut() {
            if let Err(err) = host.terminate(false) {
                warn!("error terminating host {}: {err}", host.name());
            }
        }
        info!("*** Done");
    }
}
