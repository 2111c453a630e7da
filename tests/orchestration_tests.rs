#[cfg(test)]
mod orchestration_tests {
    use std::cell::RefCell;
    use std::io::Write;
    use std::rc::Rc;
    use std::time::Duration;
    use tempfile::NamedTempFile;

    use netweaver::error::{ExternalError, NetError};
    use netweaver::link::IntfStatus;
    use netweaver::net::{
        MonitorEvent, Network, NetworkOptions, WaitPolicy, DEFAULT_SWITCH_CLASS,
    };
    use netweaver::node::{NodeParams, NodeRole, NodeStatus, TerminalLauncher};
    use netweaver::setup::Setup;
    use netweaver::sim::{ConnectBehavior, SimBackend, BATCH_SWITCH_CLASS};
    use netweaver::topology::{DeclaredTopology, Topology, TopologyGraph};

    fn network(backend: &SimBackend, options: NetworkOptions) -> Network {
        Network::new(options, backend.factories(), &Setup::init()).unwrap()
    }

    /// Build phases materialize every declared node and link, plus one
    /// default controller per configured controller factory.
    #[test]
    fn test_build_realizes_topology() {
        let backend = SimBackend::new();
        let mut net = network(&backend, NetworkOptions::default())
            .with_topology(Box::new(TopologyGraph::linear(3)));
        net.build().unwrap();

        assert_eq!(net.registry().host_names(), vec!["h1", "h2", "h3"]);
        assert_eq!(net.registry().switch_names(), vec!["s1", "s2", "s3"]);
        assert_eq!(net.registry().controller_names(), vec!["c0"]);
        assert_eq!(net.len(), 7);
        // three host links plus two inter-switch links
        assert_eq!(net.links().len(), 5);
        assert!(net.built());
    }

    /// Hosts receive sequential addresses inside the base network, in
    /// topology order, each address used once.
    #[test]
    fn test_sequential_host_addresses() {
        let backend = SimBackend::new();
        let mut net = network(&backend, NetworkOptions::default())
            .with_topology(Box::new(TopologyGraph::single(3)));
        net.build().unwrap();

        for (name, expected) in [("h1", "10.0.0.1/8"), ("h2", "10.0.0.2/8"), ("h3", "10.0.0.3/8")]
        {
            let ip = net.registry().host(name).unwrap().ip().unwrap();
            assert_eq!(ip.to_string(), expected, "address of {name}");
        }
    }

    /// An explicit address still consumes an allocator slot, so later
    /// defaults never collide with it.
    #[test]
    fn test_address_counter_advances_past_overrides() {
        let backend = SimBackend::new();
        let mut net = network(&backend, NetworkOptions::default());
        net.add_host("h1", NodeParams::default()).unwrap();
        let params = NodeParams {
            ip: Some("10.0.0.50/8".parse().unwrap()),
            ..Default::default()
        };
        net.add_host("hx", params).unwrap();
        net.add_host("h3", NodeParams::default()).unwrap();

        let ip_of = |net: &Network, name: &str| {
            net.registry().host(name).unwrap().ip().unwrap().to_string()
        };
        assert_eq!(ip_of(&net, "h1"), "10.0.0.1/8");
        assert_eq!(ip_of(&net, "hx"), "10.0.0.50/8");
        assert_eq!(ip_of(&net, "h3"), "10.0.0.3/8");
    }

    /// Removing and re-adding a link restores the link count with fresh
    /// interfaces; torn-down interface names are never reused.
    #[test]
    fn test_remove_and_readd_link() {
        let backend = SimBackend::new();
        let mut net = network(&backend, NetworkOptions::default())
            .with_topology(Box::new(TopologyGraph::linear(2)));
        net.build().unwrap();
        assert_eq!(net.links().len(), 3);
        let before = backend.intfs_of("s1");

        net.remove_link("s2", "s1").unwrap();
        assert_eq!(net.links().len(), 2);
        assert_eq!(backend.intfs_of("s1").len(), before.len() - 1);

        net.add_link("s1", "s2", Default::default()).unwrap();
        assert_eq!(net.links().len(), 3);
        let after = backend.intfs_of("s1");
        assert_eq!(after.len(), before.len());
        assert!(
            after.iter().any(|intf| !before.contains(intf)),
            "re-added link must get a fresh interface"
        );
    }

    #[test]
    fn test_remove_missing_link_is_reported() {
        let backend = SimBackend::new();
        let mut net = network(&backend, NetworkOptions::default())
            .with_topology(Box::new(TopologyGraph::single(2)));
        net.build().unwrap();

        match net.remove_link("h1", "h2") {
            Err(NetError::LinkNotFound(a, b)) => {
                assert_eq!((a.as_str(), b.as_str()), ("h1", "h2"));
            }
            other => panic!("expected LinkNotFound, got {other:?}"),
        }
    }

    /// A bounded readiness wait fails naming exactly the switches that
    /// never reported a controller connection.
    #[test]
    fn test_readiness_timeout_names_unready_switches() {
        let backend = SimBackend::new();
        backend.set_connect_behavior("s3", ConnectBehavior::Never);
        let options = NetworkOptions {
            wait_connected: WaitPolicy::Timeout(Duration::from_secs(1)),
            poll_delay: Duration::from_millis(100),
            ..Default::default()
        };
        let mut net =
            network(&backend, options).with_topology(Box::new(TopologyGraph::linear(3)));

        match net.start() {
            Err(NetError::ReadinessTimeout { unready, .. }) => {
                assert_eq!(unready, vec!["s3"]);
            }
            other => panic!("expected ReadinessTimeout, got {other:?}"),
        }
        net.stop();
    }

    #[test]
    fn test_readiness_succeeds_with_delayed_connect() {
        let backend = SimBackend::new();
        backend.set_connect_behavior("s1", ConnectBehavior::Delayed(Duration::from_millis(200)));
        let options = NetworkOptions {
            wait_connected: WaitPolicy::Timeout(Duration::from_secs(2)),
            poll_delay: Duration::from_millis(50),
            ..Default::default()
        };
        let mut net =
            network(&backend, options).with_topology(Box::new(TopologyGraph::single(1)));
        net.start().unwrap();
        net.stop();
    }

    /// Runtime add/remove of a host leaves the rest of the registry
    /// untouched and terminates the removed host.
    #[test]
    fn test_add_then_remove_host_round_trip() {
        let backend = SimBackend::new();
        let mut net = network(&backend, NetworkOptions::default())
            .with_topology(Box::new(TopologyGraph::single(2)));
        net.start().unwrap();
        let names_before = net.registry().host_names();

        let params = NodeParams {
            ip: Some("10.0.0.5/8".parse().unwrap()),
            ..Default::default()
        };
        net.add_host("h5", params).unwrap();
        assert!(net.contains("h5"));
        assert_eq!(net.registry().host_names().len(), names_before.len() + 1);

        net.remove_host("h5").unwrap();
        assert!(!net.contains("h5"));
        assert_eq!(net.registry().host_names(), names_before);
        assert_eq!(backend.status_of("h5"), Some(NodeStatus::Terminated));

        assert!(matches!(net.remove_host("h5"), Err(NetError::NotFound(_))));
        net.stop();
    }

    /// Teardown after a failed start still releases every node that was
    /// created, regardless of individual failures on the way down.
    #[test]
    fn test_stop_after_partial_start() {
        let backend = SimBackend::new();
        backend.fail_on("start", "s2");
        let mut net = network(&backend, NetworkOptions::default())
            .with_topology(Box::new(TopologyGraph::linear(3)));
        assert!(net.start().is_err());

        net.stop();
        for switch in ["s1", "s2", "s3"] {
            assert_eq!(
                backend.status_of(switch),
                Some(NodeStatus::Terminated),
                "status of {switch}"
            );
        }
        for host in ["h1", "h2", "h3"] {
            assert_eq!(backend.status_of(host), Some(NodeStatus::Terminated));
        }
        assert_eq!(backend.status_of("c0"), Some(NodeStatus::Stopped));
    }

    /// Stop releases controllers before links and links before switches.
    #[test]
    fn test_stop_ordering() {
        let backend = SimBackend::new();
        let mut net = network(&backend, NetworkOptions::default())
            .with_topology(Box::new(TopologyGraph::single(1)));
        net.start().unwrap();
        net.stop();

        let events = backend.events();
        let index_of = |needle: &str| {
            events
                .iter()
                .position(|event| event.starts_with(needle))
                .unwrap_or_else(|| panic!("no event starting with '{needle}' in {events:?}"))
        };
        assert!(index_of("stop c0") < index_of("unlink"));
        assert!(index_of("unlink") < index_of("terminate s1"));
        assert!(index_of("terminate s1") < index_of("terminate h1"));
    }

    /// Switches of a batch-capable class start as a group; the rest fall
    /// back to per-instance starts.
    #[test]
    fn test_batch_switch_class_startup() {
        let backend = SimBackend::new();
        let mut net = network(&backend, NetworkOptions::default())
            .with_switch_class(BATCH_SWITCH_CLASS, Box::new(backend.batch_switch_factory()));
        for name in ["s1", "s2"] {
            let params = NodeParams {
                switch_class: Some(BATCH_SWITCH_CLASS.to_string()),
                ..Default::default()
            };
            net.add_switch(name, params).unwrap();
        }
        net.add_switch("s3", NodeParams::default()).unwrap();
        net.start().unwrap();

        assert!(backend
            .events()
            .iter()
            .any(|event| event == "batch-startup [s1, s2]"));
        assert_eq!(backend.start_calls("s1"), 0);
        assert_eq!(backend.start_calls("s2"), 0);
        assert_eq!(backend.start_calls("s3"), 1);
        net.stop();
    }

    #[test]
    fn test_unknown_switch_class_is_rejected() {
        let backend = SimBackend::new();
        let mut net = network(&backend, NetworkOptions::default());
        let params = NodeParams {
            switch_class: Some("no-such-class".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            net.add_switch("s1", params),
            Err(NetError::Configuration(_))
        ));
        // the default class is always available
        let params = NodeParams {
            switch_class: Some(DEFAULT_SWITCH_CLASS.to_string()),
            ..Default::default()
        };
        net.add_switch("s1", params).unwrap();
    }

    /// With automatic MACs and static ARP enabled, every host learns an
    /// entry for every other host.
    #[test]
    fn test_static_arp_population() {
        let backend = SimBackend::new();
        let options = NetworkOptions {
            auto_set_macs: true,
            auto_static_arp: true,
            ..Default::default()
        };
        let mut net =
            network(&backend, options).with_topology(Box::new(TopologyGraph::single(3)));
        net.build().unwrap();

        for host in ["h1", "h2", "h3"] {
            let entries = backend.arp_entries(host);
            assert_eq!(entries.len(), 2, "arp entries of {host}");
            let own_ip = net.registry().host(host).unwrap().ip().unwrap().addr;
            assert!(entries.iter().all(|(ip, _)| *ip != own_ip));
        }
    }

    /// The monitor fans host output into one ordered event sequence and
    /// terminates once every stream has closed.
    #[test]
    fn test_monitor_fans_in_host_output() {
        let backend = SimBackend::new();
        let mut net = network(&backend, NetworkOptions::default())
            .with_topology(Box::new(TopologyGraph::single(2)));
        net.start().unwrap();

        backend.emit("h1", "first");
        backend.emit("h2", "second");
        backend.close_output("h1");
        backend.close_output("h2");

        let events: Vec<MonitorEvent> = net.monitor(None).collect();
        assert_eq!(
            events,
            vec![
                MonitorEvent::Line {
                    node: "h1".to_string(),
                    line: "first".to_string()
                },
                MonitorEvent::Line {
                    node: "h2".to_string(),
                    line: "second".to_string()
                },
            ]
        );
        net.stop();
    }

    #[test]
    fn test_monitor_reports_idle_on_timeout() {
        let backend = SimBackend::new();
        let mut net = network(&backend, NetworkOptions::default())
            .with_topology(Box::new(TopologyGraph::single(1)));
        net.start().unwrap();

        let mut monitor = net.monitor(Some(Duration::from_millis(50)));
        assert_eq!(monitor.next(), Some(MonitorEvent::Idle));
        drop(monitor);
        net.stop();
    }

    /// Administrative status changes hit both interfaces of every link
    /// joining the named pair.
    #[test]
    fn test_config_link_status_flips_both_interfaces() {
        let backend = SimBackend::new();
        let mut net = network(&backend, NetworkOptions::default())
            .with_topology(Box::new(TopologyGraph::single(2)));
        net.build().unwrap();

        net.config_link_status("s1", "h1", IntfStatus::Down).unwrap();
        let link = net
            .links()
            .iter()
            .find(|link| link.intf1().node() == "h1" || link.intf2().node() == "h1")
            .unwrap();
        assert!(!link.intf1().is_up());
        assert!(!link.intf2().is_up());

        net.config_link_status("h1", "s1", IntfStatus::Up).unwrap();
        let link = net
            .links()
            .iter()
            .find(|link| link.intf1().node() == "h1" || link.intf2().node() == "h1")
            .unwrap();
        assert!(link.intf1().is_up());
        assert!(link.intf2().is_up());

        // both nodes exist but share no link
        assert!(matches!(
            net.config_link_status("h1", "h2", IntfStatus::Down),
            Err(NetError::LinkNotFound(_, _))
        ));
        // unknown endpoint
        assert!(matches!(
            net.config_link_status("h1", "nope", IntfStatus::Down),
            Err(NetError::NotFound(_))
        ));
    }

    #[derive(Default)]
    struct RecordingTerms {
        log: Rc<RefCell<Vec<String>>>,
    }

    impl TerminalLauncher for RecordingTerms {
        fn launch(&mut self, role: NodeRole, names: &[String]) -> Result<(), ExternalError> {
            self.log
                .borrow_mut()
                .push(format!("launch {role} {}", names.join(",")));
            Ok(())
        }

        fn shutdown(&mut self) -> Result<(), ExternalError> {
            self.log.borrow_mut().push("shutdown".to_string());
            Ok(())
        }
    }

    /// Terminals are launched during build, controllers first, and shut
    /// down during stop.
    #[test]
    fn test_terminal_launch_and_shutdown() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let terms = RecordingTerms { log: log.clone() };
        let backend = SimBackend::new();
        let mut net = network(&backend, NetworkOptions::default())
            .with_topology(Box::new(TopologyGraph::single(1)))
            .with_terminals(Box::new(terms));
        net.start().unwrap();
        net.stop();

        assert_eq!(
            *log.borrow(),
            vec![
                "launch controller c0",
                "launch switch s1",
                "launch host h1",
                "shutdown",
            ]
        );
    }

    /// A YAML topology file builds the same network a programmatic graph
    /// would, honoring declared per-node parameters.
    #[test]
    fn test_declared_topology_from_yaml_file() {
        let yaml = "\
hosts:
  - name: h1
  - name: h2
    ip: 10.0.0.99/8
switches:
  - name: s1
links:
  - { node1: h1, node2: s1 }
  - { node1: h2, node2: s1 }
";
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(yaml.as_bytes()).unwrap();
        let topo = DeclaredTopology::load(file.path()).unwrap();
        assert_eq!(topo.hosts(), vec!["h1", "h2"]);

        let backend = SimBackend::new();
        let mut net =
            network(&backend, NetworkOptions::default()).with_topology(Box::new(topo));
        net.build().unwrap();

        assert_eq!(net.len(), 4);
        assert_eq!(net.links().len(), 2);
        let ip = net.registry().host("h2").unwrap().ip().unwrap();
        assert_eq!(ip.to_string(), "10.0.0.99/8");
        // h1 carried no override and got the first allocator address
        let ip = net.registry().host("h1").unwrap().ip().unwrap();
        assert_eq!(ip.to_string(), "10.0.0.1/8");
    }

    /// `run` wraps start, a caller-provided check and stop in one call.
    #[test]
    fn test_run_cycle() {
        let backend = SimBackend::new();
        let mut net = network(&backend, NetworkOptions::default())
            .with_topology(Box::new(TopologyGraph::single(2)));
        let connected = net
            .run(|net| {
                net.registry()
                    .switches()
                    .all(|switch| switch.connected())
            })
            .unwrap();
        assert!(connected);
        assert_eq!(backend.status_of("s1"), Some(NodeStatus::Terminated));
    }
}
