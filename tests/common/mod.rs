//! Shared utilities for integration tests.
#![allow(dead_code)]

use network_sim::{
    Endpoint, LinkSpec, NodeKind, NodeSpec, Topology, TopologyDescription, check_frr_deps,
    check_namespace_deps, unique_ns_name,
};
use netgrade::fixtures::ExpectedHost;

/// Check namespace test dependencies. Returns `true` if the test should be
/// skipped (prints the reason to stderr). Use at the top of every test.
pub fn skip_without_deps() -> bool {
    match check_namespace_deps() {
        Ok(()) => false,
        Err(reason) => {
            eprintln!("Skipping: {reason}");
            true
        }
    }
}

/// Like `skip_without_deps` but also requires an FRR install.
pub fn skip_without_frr() -> bool {
    match check_frr_deps() {
        Ok(()) => false,
        Err(reason) => {
            eprintln!("Skipping: {reason}");
            true
        }
    }
}

/// Namespace prefix unique to this test run.
pub fn ns_prefix(tag: &str) -> String {
    format!("{}-", unique_ns_name(tag))
}

/// `h1 -- r1 -- h2`, two /24s joined by a router without daemons.
pub fn routed_line() -> Topology {
    let host = |name: &str, gw: &str| NodeSpec {
        name: name.into(),
        kind: NodeKind::Host,
        default_route: gw.parse().ok(),
        ..Default::default()
    };
    let end = |node: &str, iface: &str, addr: &str| Endpoint {
        node: node.into(),
        iface: Some(iface.into()),
        addr: addr.parse().ok(),
    };
    let desc = TopologyDescription {
        nodes: vec![
            host("h1", "10.1.0.254"),
            host("h2", "10.2.0.254"),
            NodeSpec {
                name: "r1".into(),
                kind: NodeKind::Router,
                loopback: "100.100.1.1/32".parse().ok(),
                ..Default::default()
            },
        ],
        links: vec![
            LinkSpec {
                a: end("h1", "h1-eth0", "10.1.0.1/24"),
                b: end("r1", "r1-eth0", "10.1.0.254/24"),
            },
            LinkSpec {
                a: end("h2", "h2-eth0", "10.2.0.1/24"),
                b: end("r1", "r1-eth1", "10.2.0.254/24"),
            },
        ],
    };
    Topology::from_description(&desc).expect("valid topology")
}

/// Expected structure of `topology`, as fixtures would declare it.
pub fn expected_hosts(topology: &Topology) -> Vec<ExpectedHost> {
    topology
        .nodes()
        .filter(|n| n.kind != NodeKind::Switch)
        .map(|n| ExpectedHost {
            name: n.name.clone(),
            loopback: n.loopback,
            interfaces: n
                .interfaces
                .iter()
                .filter_map(|i| Some((i.name.clone(), i.addr?)))
                .collect(),
        })
        .collect()
}
