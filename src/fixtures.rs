//! Expected facts about a correctly built network.
//!
//! Fixtures are plain data: loaded from JSON or taken from the built-in
//! table, and never modified during a run.

use std::collections::BTreeMap;
use std::fmt;
use std::net::Ipv4Addr;
use std::path::Path;

use anyhow::{Context, Result};
use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fixtures {
    #[serde(default)]
    pub hosts: Vec<ExpectedHost>,
    #[serde(default)]
    pub protocols: Vec<ExpectedProtocols>,
    #[serde(default)]
    pub asns: Vec<ExpectedAsn>,
    #[serde(default)]
    pub bgp_neighbors: Vec<ExpectedNeighbors>,
    #[serde(default)]
    pub pings: PingExpectations,
    #[serde(default)]
    pub restricted_directives: Vec<RestrictedDirective>,
    #[serde(default)]
    pub fault_tolerance: Option<FaultScenario>,
    #[serde(default)]
    pub metrics: Vec<MetricExpectation>,
    #[serde(default)]
    pub route_attributes: Vec<RouteAttributes>,
    #[serde(default)]
    pub kernel_routes: Vec<KernelRoute>,
}

/// A node as the structural check expects to observe it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpectedHost {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loopback: Option<Ipv4Net>,
    pub interfaces: BTreeMap<String, Ipv4Net>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Rip,
    Bgp,
    Ospf,
}

impl Protocol {
    /// vtysh query whose output tells whether the protocol runs.
    pub fn show_query(self) -> &'static str {
        match self {
            Protocol::Rip => "show ip rip",
            Protocol::Bgp => "show ip bgp",
            Protocol::Ospf => "show ip ospf",
        }
    }

    /// Regex for what vtysh prints when the protocol has no instance or its
    /// daemon is not running.
    pub fn inactive_pattern(self) -> String {
        let upper = self.to_string().to_uppercase();
        format!("{upper} instance not found|No {upper} process is configured|{self}d is not running")
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Rip => write!(f, "rip"),
            Protocol::Bgp => write!(f, "bgp"),
            Protocol::Ospf => write!(f, "ospf"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolStatus {
    #[serde(alias = "type")]
    pub protocol: Protocol,
    #[serde(alias = "status")]
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpectedProtocols {
    pub node: String,
    pub protocols: Vec<ProtocolStatus>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpectedAsn {
    pub node: String,
    pub asn: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpectedNeighbors {
    pub node: String,
    pub include: Vec<Ipv4Addr>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude: Vec<Ipv4Addr>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PingPair {
    pub source: String,
    pub target: Ipv4Addr,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PingExpectations {
    #[serde(default)]
    pub success: Vec<PingPair>,
    #[serde(default)]
    pub failure: Vec<PingPair>,
}

/// A configuration directive only the listed routers may (and must) use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestrictedDirective {
    #[serde(alias = "command")]
    pub directive: String,
    pub nodes: Vec<String>,
}

/// Take one link down and watch traffic move to a backup path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultScenario {
    pub link: (String, String),
    pub probe_node: String,
    pub target: Ipv4Addr,
    /// Hop the trace must pass while the link is up.
    pub primary_via: Ipv4Addr,
    /// Hop the trace must pass while the link is down.
    pub backup_via: Ipv4Addr,
}

/// BGP routes learned via `next_hop` on `node` carry `metric`, or must not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricExpectation {
    pub node: String,
    pub next_hop: Ipv4Addr,
    pub metric: u32,
    pub present: bool,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteAttributes {
    pub node: String,
    pub prefix: String,
    pub next_hop: Ipv4Addr,
    pub community: String,
    pub local_pref: u32,
}

/// A regex the node's kernel routing table must match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KernelRoute {
    pub node: String,
    pub pattern: String,
    pub description: String,
}

impl Fixtures {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read fixtures {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("parse fixtures {}", path.display()))
    }

    /// The expectations for the multi-AS RIP/BGP assignment.
    pub fn assignment_two() -> Self {
        Self {
            hosts: assignment_two_hosts(),
            protocols: assignment_two_protocols(),
            asns: [
                ("r110", 100),
                ("r120", 100),
                ("r130", 100),
                ("r210", 200),
                ("r310", 300),
                ("r410", 400),
            ]
            .into_iter()
            .map(|(node, asn)| ExpectedAsn {
                node: node.into(),
                asn,
            })
            .collect(),
            bgp_neighbors: vec![
                neighbors(
                    "r110",
                    &["100.100.1.2", "100.100.1.3", "172.17.1.1", "172.17.3.1"],
                    &["192.168.1.1"],
                ),
                neighbors(
                    "r120",
                    &["100.100.1.1", "100.100.1.3"],
                    &["192.168.1.0", "192.168.1.3"],
                ),
                neighbors(
                    "r130",
                    &["100.100.1.1", "100.100.1.2", "172.17.2.1", "172.17.4.1"],
                    &["192.168.1.2"],
                ),
                neighbors("r210", &["172.17.1.0"], &[]),
                neighbors("r310", &["172.17.2.0"], &[]),
                neighbors("r410", &["172.17.3.0", "172.17.4.0"], &[]),
            ],
            pings: PingExpectations {
                success: pairs(&[
                    ("r110", "100.100.1.2"),
                    ("r110", "100.100.1.3"),
                    ("r120", "100.100.1.1"),
                    ("r120", "100.100.1.3"),
                    ("r130", "100.100.1.1"),
                    ("r130", "100.100.1.2"),
                ]),
                failure: pairs(&[
                    ("r120", "100.100.1.4"),
                    ("r120", "100.100.1.5"),
                    ("r120", "100.100.1.6"),
                    ("r210", "100.100.1.1"),
                    ("r210", "100.100.1.2"),
                    ("r210", "100.100.1.3"),
                    ("r310", "100.100.1.1"),
                    ("r310", "100.100.1.2"),
                    ("r310", "100.100.1.3"),
                    ("r410", "100.100.1.1"),
                    ("r410", "100.100.1.2"),
                    ("r410", "100.100.1.3"),
                ]),
            },
            restricted_directives: [
                ("redistribute", &[][..]),
                ("match community", &["r110", "r130"][..]),
                ("match ip address", &["r410"][..]),
                ("set community", &["r410"][..]),
                ("set local-preference", &["r110", "r130"][..]),
                ("set metric", &["r110", "r130"][..]),
            ]
            .into_iter()
            .map(|(directive, nodes)| RestrictedDirective {
                directive: directive.into(),
                nodes: nodes.iter().map(|n| n.to_string()).collect(),
            })
            .collect(),
            fault_tolerance: Some(FaultScenario {
                link: ("r110".into(), "r410".into()),
                probe_node: "r410".into(),
                target: Ipv4Addr::new(192, 168, 1, 1),
                primary_via: Ipv4Addr::new(172, 17, 3, 0),
                backup_via: Ipv4Addr::new(172, 17, 4, 0),
            }),
            metrics: vec![
                metric("r410", "172.17.3.0", false, "route from r110 carries a set metric"),
                metric("r410", "172.17.4.0", false, "route from r130 carries a set metric"),
                metric("r210", "172.17.1.0", true, "route from r110 has an unset metric"),
                metric("r310", "172.17.2.0", true, "route from r130 has an unset metric"),
            ],
            route_attributes: vec![
                route_attrs("r110", "10.4.1.0", "172.17.3.1", "400:300", 300),
                route_attrs("r110", "10.4.1.128", "172.17.3.1", "400:100", 100),
                route_attrs("r130", "10.4.1.0", "172.17.4.1", "400:100", 100),
                route_attrs("r130", "10.4.1.128", "172.17.4.1", "400:300", 300),
            ],
            kernel_routes: vec![
                KernelRoute {
                    node: "r120".into(),
                    pattern: r"10\.4\.1\.0/25 nhid \d+ via 192\.168\.1\.0\b".into(),
                    description: "route to 10.4.1.0/25 passes through r110".into(),
                },
                KernelRoute {
                    node: "r120".into(),
                    pattern: r"10\.4\.1\.128/25 nhid \d+ via 192\.168\.1\.3\b".into(),
                    description: "route to 10.4.1.128/25 passes through r130".into(),
                },
            ],
        }
    }
}

fn assignment_two_hosts() -> Vec<ExpectedHost> {
    let host = |name: &str, loopback: Option<&str>, ifaces: &[(&str, &str)]| ExpectedHost {
        name: name.into(),
        loopback: loopback.and_then(|l| l.parse().ok()),
        interfaces: ifaces
            .iter()
            .filter_map(|(i, a)| Some((i.to_string(), a.parse().ok()?)))
            .collect(),
    };
    vec![
        host("h211", None, &[("h211-eth0", "10.2.1.1/24")]),
        host("h311", None, &[("h311-eth0", "10.3.1.1/24")]),
        host("h411", None, &[("h411-eth0", "10.4.1.1/25")]),
        host("h412", None, &[("h412-eth0", "10.4.1.129/25")]),
        host(
            "r110",
            Some("100.100.1.1/32"),
            &[
                ("r110-eth1", "192.168.1.0/31"),
                ("r110-eth2", "172.17.1.0/31"),
                ("r110-eth3", "172.17.3.0/31"),
            ],
        ),
        host(
            "r120",
            Some("100.100.1.2/32"),
            &[("r120-eth1", "192.168.1.1/31"), ("r120-eth2", "192.168.1.2/31")],
        ),
        host(
            "r130",
            Some("100.100.1.3/32"),
            &[
                ("r130-eth1", "192.168.1.3/31"),
                ("r130-eth2", "172.17.2.0/31"),
                ("r130-eth3", "172.17.4.0/31"),
            ],
        ),
        host(
            "r210",
            Some("100.100.2.1/32"),
            &[("r210-eth0", "10.2.1.254/24"), ("r210-eth1", "172.17.1.1/31")],
        ),
        host(
            "r310",
            Some("100.100.3.1/32"),
            &[("r310-eth0", "10.3.1.254/24"), ("r310-eth1", "172.17.2.1/31")],
        ),
        host(
            "r410",
            Some("100.100.4.1/32"),
            &[
                ("r410-eth0", "10.4.1.126/25"),
                ("r410-eth1", "10.4.1.254/25"),
                ("r410-eth2", "172.17.3.1/31"),
                ("r410-eth3", "172.17.4.1/31"),
            ],
        ),
    ]
}

fn assignment_two_protocols() -> Vec<ExpectedProtocols> {
    let status = |rip: bool| {
        vec![
            ProtocolStatus {
                protocol: Protocol::Rip,
                active: rip,
            },
            ProtocolStatus {
                protocol: Protocol::Bgp,
                active: true,
            },
        ]
    };
    ["r110", "r120", "r130", "r210", "r310", "r410"]
        .into_iter()
        .map(|node| ExpectedProtocols {
            node: node.into(),
            // RIP only runs inside AS 100.
            protocols: status(node.starts_with("r1")),
        })
        .collect()
}

fn addrs(list: &[&str]) -> Vec<Ipv4Addr> {
    list.iter().filter_map(|a| a.parse().ok()).collect()
}

fn neighbors(node: &str, include: &[&str], exclude: &[&str]) -> ExpectedNeighbors {
    ExpectedNeighbors {
        node: node.into(),
        include: addrs(include),
        exclude: addrs(exclude),
    }
}

fn pairs(list: &[(&str, &str)]) -> Vec<PingPair> {
    list.iter()
        .filter_map(|(source, target)| {
            Some(PingPair {
                source: source.to_string(),
                target: target.parse().ok()?,
            })
        })
        .collect()
}

fn metric(node: &str, next_hop: &str, present: bool, description: &str) -> MetricExpectation {
    MetricExpectation {
        node: node.into(),
        next_hop: next_hop.parse().unwrap_or(Ipv4Addr::UNSPECIFIED),
        metric: 0,
        present,
        description: description.into(),
    }
}

fn route_attrs(
    node: &str,
    prefix: &str,
    next_hop: &str,
    community: &str,
    local_pref: u32,
) -> RouteAttributes {
    RouteAttributes {
        node: node.into(),
        prefix: prefix.into(),
        next_hop: next_hop.parse().unwrap_or(Ipv4Addr::UNSPECIFIED),
        community: community.into(),
        local_pref,
    }
}
