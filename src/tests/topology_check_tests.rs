#![cfg(test)]

use crate::checks::topology::check_topology;
use crate::fixtures::{ExpectedHost, Fixtures};
use crate::test_helpers::{FakeNetwork, ip_addr_json, reference_network};

fn host(name: &str, loopback: Option<&str>, ifaces: &[(&str, &str)]) -> ExpectedHost {
    ExpectedHost {
        name: name.into(),
        loopback: loopback.map(|l| l.parse().unwrap()),
        interfaces: ifaces
            .iter()
            .map(|(i, a)| (i.to_string(), a.parse().unwrap()))
            .collect(),
    }
}

#[test]
fn test_reference_network_matches() {
    let result = check_topology(&reference_network(), &Fixtures::assignment_two().hosts);
    assert!(result.passed, "{:?}", result.diagnostics);
    assert_eq!(result.name, "Topology");
}

#[test]
fn test_wrong_address_names_the_interface() {
    let expected = vec![host("h211", None, &[("h211-eth0", "10.2.1.1/24")])];
    let observed = host("h211", None, &[("h211-eth0", "10.2.1.2/24")]);
    let net = FakeNetwork::new(["h211"]).on("h211", "ip -j addr show", ip_addr_json(&observed));

    let result = check_topology(&net, &expected);
    assert!(!result.passed);
    assert_eq!(
        result.diagnostics,
        vec!["(h211-eth0) should have address 10.2.1.1/24; observed 10.2.1.2/24".to_string()]
    );
}

#[test]
fn test_node_and_interface_differences_are_symmetric() {
    let expected = vec![
        host("h1", None, &[("h1-eth0", "10.0.0.1/24")]),
        host("r1", Some("1.1.1.1/32"), &[("r1-eth0", "10.0.0.254/24"), ("r1-eth1", "10.1.0.254/24")]),
        host("r2", None, &[]),
    ];
    let r1_seen = host("r1", None, &[("r1-eth0", "10.0.0.254/24"), ("r1-eth2", "10.1.0.254/24")]);
    let net = FakeNetwork::new(["h1", "r1", "r3"])
        .on("h1", "ip -j addr show", ip_addr_json(&expected[0]))
        .on("r1", "ip -j addr show", ip_addr_json(&r1_seen));

    let result = check_topology(&net, &expected);
    assert!(!result.passed);
    assert_eq!(
        result.diagnostics,
        vec![
            "additional nodes: r3".to_string(),
            "missing nodes: r2".to_string(),
            "(r1) should have configured loopback".to_string(),
            "(r1) additional interface: r1-eth2".to_string(),
            "(r1) missing interface: r1-eth1".to_string(),
        ]
    );
}

#[test]
fn test_unexpected_and_wrong_loopbacks() {
    let expected = vec![
        host("h1", None, &[]),
        host("r1", Some("100.100.1.1/32"), &[]),
    ];
    let net = FakeNetwork::new(["h1", "r1"])
        .on("h1", "ip -j addr show", ip_addr_json(&host("h1", Some("9.9.9.9/32"), &[])))
        .on("r1", "ip -j addr show", ip_addr_json(&host("r1", Some("100.100.1.2/32"), &[])));

    let result = check_topology(&net, &expected);
    assert_eq!(
        result.diagnostics,
        vec![
            "(h1) should not have configured loopback".to_string(),
            "(r1) should have loopback configured as 100.100.1.1/32; observed 100.100.1.2/32"
                .to_string(),
        ]
    );
}

#[test]
fn test_unparsable_interface_list() {
    let expected = vec![host("h1", None, &[])];
    let net = FakeNetwork::new(["h1"]).on("h1", "ip -j addr show", "Object \"addr\" is unknown");
    let result = check_topology(&net, &expected);
    assert!(!result.passed);
    assert!(result.diagnostics[0].starts_with("(h1) `ip -j addr show`: unparsable interface list"));
}

#[test]
fn test_non_ethernet_links_are_ignored() {
    let expected = vec![host("s1", None, &[("s1-eth1", "10.0.0.1/8")])];
    let json = r#"[
      {"ifname": "lo", "link_type": "loopback", "addr_info": []},
      {"ifname": "tun0", "link_type": "none", "addr_info": []},
      {"ifname": "s1-eth1", "link_type": "ether",
       "addr_info": [{"family": "inet", "local": "10.0.0.1", "prefixlen": 8}]}
    ]"#;
    let net = FakeNetwork::new(["s1"]).on("s1", "ip -j addr show", json);
    let result = check_topology(&net, &expected);
    assert!(result.passed, "{:?}", result.diagnostics);
}
