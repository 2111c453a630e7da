use clap::{Parser, ValueEnum};
use color_eyre::Result;
use env_logger::Env;
use log::info;
use std::path::PathBuf;
use std::time::Duration;

use netweaver::net::{MonitorEvent, Network, NetworkOptions, WaitPolicy};
use netweaver::setup::Setup;
use netweaver::sim::{SimBackend, BATCH_SWITCH_CLASS};
use netweaver::topology::{DeclaredTopology, Topology, TopologyGraph};

/// Canned topology shapes available without a topology file.
#[derive(ValueEnum, Debug, Clone, Copy)]
enum Shape {
    /// One switch with N hosts attached.
    Single,
    /// N switches in a chain, one host per switch.
    Linear,
}

/// Network emulation topology and lifecycle engine
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to a declarative topology YAML file
    #[arg(short, long)]
    topology: Option<PathBuf>,

    /// Canned topology shape used when no topology file is given
    #[arg(long, value_enum, default_value_t = Shape::Linear, conflicts_with = "topology")]
    shape: Shape,

    /// Node count for the canned topology shape
    #[arg(long, default_value_t = 2, conflicts_with = "topology")]
    size: usize,

    /// Base network for host address allocation, CIDR notation
    #[arg(long, default_value = "10.0.0.0/8")]
    ip_base: String,

    /// Derive default host MACs from the address counter
    #[arg(long)]
    mac: bool,

    /// Populate all-pairs static ARP entries during build
    #[arg(long)]
    arp: bool,

    /// Assign default core indices to hosts, cycling over cores
    #[arg(long)]
    pin_cpus: bool,

    /// Base listen port, advancing per switch
    #[arg(long)]
    listen_port: Option<u16>,

    /// Wait indefinitely for switches to connect during start
    #[arg(long)]
    wait: bool,

    /// Wait up to this many seconds for switches to connect
    #[arg(long, conflicts_with = "wait")]
    wait_timeout: Option<f64>,

    /// Monitor host output for this many seconds before stopping
    #[arg(long, default_value_t = 2.0)]
    run_for: f64,
}

impl Args {
    fn wait_policy(&self) -> WaitPolicy {
        if self.wait {
            WaitPolicy::Indefinite
        } else if let Some(secs) = self.wait_timeout {
            WaitPolicy::Timeout(Duration::from_secs_f64(secs))
        } else {
            WaitPolicy::NoWait
        }
    }

    fn topology(&self) -> Result<Box<dyn Topology>> {
        if let Some(path) = &self.topology {
            info!("Topology file: {:?}", path);
            return Ok(Box::new(DeclaredTopology::load(path)?));
        }
        Ok(match self.shape {
            Shape::Single => Box::new(TopologyGraph::single(self.size)),
            Shape::Linear => Box::new(TopologyGraph::linear(self.size)),
        })
    }
}

fn main() -> Result<()> {
    // Initialize error handling
    color_eyre::install()?;

    // Parse command-line arguments
    let args = Args::parse();

    // Initialize logging with default filter level of "info"
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    info!("Starting netweaver");

    let options = NetworkOptions {
        ip_base: args.ip_base.clone(),
        auto_set_macs: args.mac,
        auto_static_arp: args.arp,
        auto_pin_cpus: args.pin_cpus,
        listen_port: args.listen_port,
        wait_connected: args.wait_policy(),
        ..NetworkOptions::default()
    };

    let setup = Setup::init();
    let backend = SimBackend::new();
    let mut net = Network::new(options, backend.factories(), &setup)?
        .with_switch_class(BATCH_SWITCH_CLASS, Box::new(backend.batch_switch_factory()))
        .with_topology(args.topology()?);

    net.start()?;
    info!(
        "Network up: {} hosts, {} switches, {} controllers, {} links",
        net.registry().hosts().count(),
        net.registry().switches().count(),
        net.registry().controllers().count(),
        net.links().len()
    );

    // The sim backend produces no traffic of its own; seed one line per
    // host so the monitor loop has something to show.
    for name in net.registry().host_names() {
        backend.emit(&name, "up and configured");
    }
    for event in net.monitor(Some(Duration::from_secs_f64(args.run_for))) {
        match event {
            MonitorEvent::Line { node, line } => info!("<{node}> {line}"),
            MonitorEvent::Idle => break,
        }
    }

    net.stop();
    info!("Done");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let args = Args::parse_from(["netweaver", "--shape", "single", "--size", "4"]);

        assert!(matches!(args.shape, Shape::Single));
        assert_eq!(args.size, 4);
        assert_eq!(args.ip_base, "10.0.0.0/8");
        assert!(matches!(args.wait_policy(), WaitPolicy::NoWait));
    }

    #[test]
    fn test_wait_policy_args() {
        let args = Args::parse_from(["netweaver", "--wait-timeout", "1.5"]);

        assert!(matches!(
            args.wait_policy(),
            WaitPolicy::Timeout(d) if d == Duration::from_millis(1500)
        ));
    }
}
