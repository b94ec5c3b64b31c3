#![cfg(any(test, feature = "test-internals"))]
#![allow(dead_code)] // Allow unused helpers - they're used by library tests but not binary tests

use std::cell::RefCell;
use std::time::Duration;

use anyhow::{Result, anyhow, bail};
use network_sim::Topology;
use rustc_hash::FxHashSet;
use serde_json::json;

use crate::config::GraderConfig;
use crate::fixtures::{ExpectedHost, Fixtures};
use crate::live::LiveNetwork;
use crate::poll::PollConfig;

/// Topology of the multi-AS assignment, as a student would declare it.
pub const ASSIGNMENT_TWO_TOPOLOGY: &str = include_str!("../tests/data/assignment_two_topology.json");

pub fn assignment_two_topology() -> Topology {
    let desc = serde_json::from_str(ASSIGNMENT_TWO_TOPOLOGY).unwrap();
    Topology::from_description(&desc).unwrap()
}

/// Config with millisecond polling so scripted runs finish instantly.
pub fn fast_config() -> GraderConfig {
    GraderConfig {
        convergence: PollConfig::new(Duration::from_millis(1), Duration::from_millis(200)),
        stable_samples: 2,
        reroute: PollConfig::new(Duration::from_millis(1), Duration::from_millis(200)),
        ..GraderConfig::default()
    }
}

#[derive(Debug, Clone)]
enum Reply {
    Output(String),
    Error(String),
}

/// A link state a rule depends on.
#[derive(Debug, Clone)]
struct LinkCondition {
    a: String,
    b: String,
    up: bool,
}

#[derive(Debug, Clone)]
struct Rule {
    /// `"*"` matches every node.
    node: String,
    needle: String,
    when: Option<LinkCondition>,
    reply: Reply,
}

/// Scripted [`LiveNetwork`].
///
/// Commands are answered by the most recently added rule whose node
/// matches and whose needle is a substring of the command. Rules can be
/// made conditional on a link being up or down. Unmatched commands return
/// empty output.
#[derive(Debug, Default)]
pub struct FakeNetwork {
    nodes: Vec<String>,
    rules: Vec<Rule>,
    down: RefCell<FxHashSet<(String, String)>>,
    calls: RefCell<Vec<(String, String)>>,
    link_error: Option<String>,
}

fn link_key(a: &str, b: &str) -> (String, String) {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

impl FakeNetwork {
    pub fn new<I, S>(nodes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut nodes: Vec<String> = nodes.into_iter().map(Into::into).collect();
        nodes.sort();
        Self {
            nodes,
            ..Default::default()
        }
    }

    pub fn on(mut self, node: &str, needle: &str, output: impl Into<String>) -> Self {
        self.rules.push(Rule {
            node: node.into(),
            needle: needle.into(),
            when: None,
            reply: Reply::Output(output.into()),
        });
        self
    }

    /// Like [`on`](Self::on), but only while link `a`-`b` is in state `up`.
    pub fn on_link(
        mut self,
        (a, b, up): (&str, &str, bool),
        node: &str,
        needle: &str,
        output: impl Into<String>,
    ) -> Self {
        self.rules.push(Rule {
            node: node.into(),
            needle: needle.into(),
            when: Some(LinkCondition {
                a: a.into(),
                b: b.into(),
                up,
            }),
            reply: Reply::Output(output.into()),
        });
        self
    }

    pub fn failing(mut self, node: &str, needle: &str, error: &str) -> Self {
        self.rules.push(Rule {
            node: node.into(),
            needle: needle.into(),
            when: None,
            reply: Reply::Error(error.into()),
        });
        self
    }

    /// Make every link state change fail.
    pub fn with_link_error(mut self, error: &str) -> Self {
        self.link_error = Some(error.into());
        self
    }

    pub fn is_link_up(&self, a: &str, b: &str) -> bool {
        !self.down.borrow().contains(&link_key(a, b))
    }

    /// Every `(node, command)` seen so far, in order.
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.borrow().clone()
    }

    pub fn count_calls(&self, needle: &str) -> usize {
        self.calls.borrow().iter().filter(|(_, c)| c.contains(needle)).count()
    }
}

impl LiveNetwork for FakeNetwork {
    fn node_names(&self) -> Vec<String> {
        self.nodes.clone()
    }

    fn run(&self, node: &str, command: &str) -> Result<String> {
        self.calls.borrow_mut().push((node.to_string(), command.to_string()));
        if !self.nodes.iter().any(|n| n == node) {
            bail!("no such node '{node}'");
        }
        let rule = self.rules.iter().rev().find(|r| {
            (r.node == "*" || r.node == node)
                && command.contains(&r.needle)
                && r.when
                    .as_ref()
                    .is_none_or(|c| self.is_link_up(&c.a, &c.b) == c.up)
        });
        match rule.map(|r| &r.reply) {
            Some(Reply::Output(out)) => Ok(out.clone()),
            Some(Reply::Error(e)) => Err(anyhow!("{e}")),
            None => Ok(String::new()),
        }
    }

    fn set_link_state(&self, a: &str, b: &str, up: bool) -> Result<()> {
        self.calls
            .borrow_mut()
            .push((format!("{a}-{b}"), format!("link {}", if up { "up" } else { "down" })));
        if let Some(e) = &self.link_error {
            bail!("{e}");
        }
        let key = link_key(a, b);
        if up {
            self.down.borrow_mut().remove(&key);
        } else {
            self.down.borrow_mut().insert(key);
        }
        Ok(())
    }
}

/// `ip -j addr show` output for an expected host.
pub fn ip_addr_json(host: &ExpectedHost) -> String {
    let mut lo_addrs = vec![json!({"family": "inet", "local": "127.0.0.1", "prefixlen": 8})];
    if let Some(lo) = host.loopback {
        lo_addrs.push(json!({"family": "inet", "local": lo.addr().to_string(), "prefixlen": lo.prefix_len()}));
    }
    let mut entries = vec![json!({"ifindex": 1, "ifname": "lo", "link_type": "loopback", "addr_info": lo_addrs})];
    for (i, (name, net)) in host.interfaces.iter().enumerate() {
        entries.push(json!({
            "ifindex": i + 2,
            "ifname": name,
            "link_type": "ether",
            "addr_info": [
                {"family": "inet", "local": net.addr().to_string(), "prefixlen": net.prefix_len()},
                {"family": "inet6", "local": "fe80::1", "prefixlen": 64}
            ]
        }));
    }
    serde_json::Value::Array(entries).to_string()
}

fn bgp_summary(router_id: &str, asn: u32, neighbors: &[&str]) -> String {
    let mut out = format!(
        "\nIPv4 Unicast Summary (VRF default):\nBGP router identifier {router_id}, local AS number {asn} vrf-id 0\n\
         BGP table version 12\n\nNeighbor        V         AS   MsgRcvd   MsgSent   TblVer  InQ OutQ  Up/Down State/PfxRcd   PfxSnt Desc\n"
    );
    for n in neighbors {
        out.push_str(&format!("{n:<15} 4 {asn:>10}        42        40       12    0    0 00:01:07            3        6 N/A\n"));
    }
    out.push_str(&format!("\nTotal number of neighbors {}\n", neighbors.len()));
    out
}

fn prefix_json(prefix: &str, next_hop: &str, community: &str, local_pref: u32) -> String {
    json!({
        "prefix": prefix,
        "paths": [
            {
                "aspath": {"string": "400", "segments": [{"type": "as-sequence", "list": [400]}], "length": 1},
                "origin": "IGP",
                "metric": 0,
                "locPrf": local_pref,
                "valid": true,
                "community": {"string": community, "list": [community]},
                "bestpath": {"overall": true, "selectionReason": "First path received"},
                "nexthops": [{"ip": next_hop, "afi": "ipv4", "used": true}]
            },
            {
                "aspath": {"string": "400", "segments": [], "length": 1},
                "origin": "IGP",
                "locPrf": 100,
                "valid": true,
                "nexthops": [{"ip": "100.100.1.2", "afi": "ipv4"}]
            }
        ]
    })
    .to_string()
}

fn bgp_table(router_id: &str, routes: &[(&str, &str, u32)]) -> String {
    let mut table = serde_json::Map::new();
    for (prefix, hop, metric) in routes {
        let path = json!({"valid": true, "metric": metric, "nexthops": [{"ip": hop, "afi": "ipv4"}]});
        table
            .entry(prefix.to_string())
            .or_insert_with(|| json!([]))
            .as_array_mut()
            .unwrap()
            .push(path);
    }
    json!({"vrfId": 0, "routerId": router_id, "routes": table}).to_string()
}

const PING_OK: &str = "PING 10.0.0.1 (10.0.0.1) 56(84) bytes of data.\n\
    64 bytes from 10.0.0.1: icmp_seq=1 ttl=62 time=0.081 ms\n\n\
    --- 10.0.0.1 ping statistics ---\n\
    1 packets transmitted, 1 received, 0% packet loss, time 0ms\n";
const PING_LOST: &str = "PING 10.0.0.1 (10.0.0.1) 56(84) bytes of data.\n\n\
    --- 10.0.0.1 ping statistics ---\n\
    1 packets transmitted, 0 received, 100% packet loss, time 0ms\n";
const PING_UNREACHABLE: &str = "ping: connect: Network is unreachable\n";

pub fn ping_ok() -> &'static str {
    PING_OK
}

pub fn ping_lost() -> &'static str {
    PING_LOST
}

fn trace(via: &str) -> String {
    format!(
        "traceroute to 192.168.1.1 (192.168.1.1), 30 hops max, 60 byte packets\n 1  {via}  0.052 ms\n 2  192.168.1.1  0.071 ms\n"
    )
}

/// A scripted network on which the whole built-in suite passes.
pub fn reference_network() -> FakeNetwork {
    let fixtures = Fixtures::assignment_two();
    let mut net = FakeNetwork::new(fixtures.hosts.iter().map(|h| h.name.clone()));

    for host in &fixtures.hosts {
        net = net.on(&host.name, "ip -j addr show", ip_addr_json(host));
    }

    net = net
        .on("*", "ip route", "default via 10.0.0.254 dev eth0\n")
        .on(
            "r120",
            "ip route",
            "10.4.1.0/25 nhid 40 via 192.168.1.0 dev r120-eth1 proto bgp metric 20\n\
             10.4.1.128/25 nhid 41 via 192.168.1.3 dev r120-eth2 proto bgp metric 20\n\
             100.100.1.1 nhid 27 via 192.168.1.0 dev r120-eth1 proto rip metric 20\n",
        )
        .on("*", "show ip rip", "Codes: R - RIP, C - connected\n     Network            Next Hop         Metric From            Tag Time\n")
        .on("*", "show ip bgp", "BGP table version is 12, local router ID is 100.100.1.1, vrf id 0\n");
    for node in ["r210", "r310", "r410"] {
        net = net.on(node, "show ip rip", "% RIP instance not found\n");
    }

    let summaries = [
        ("r110", "100.100.1.1", 100, &["100.100.1.2", "100.100.1.3", "172.17.1.1", "172.17.3.1"][..]),
        ("r120", "100.100.1.2", 100, &["100.100.1.1", "100.100.1.3"][..]),
        ("r130", "100.100.1.3", 100, &["100.100.1.1", "100.100.1.2", "172.17.2.1", "172.17.4.1"][..]),
        ("r210", "100.100.2.1", 200, &["172.17.1.0"][..]),
        ("r310", "100.100.3.1", 300, &["172.17.2.0"][..]),
        ("r410", "100.100.4.1", 400, &["172.17.3.0", "172.17.4.0"][..]),
    ];
    for (node, id, asn, neighbors) in summaries {
        net = net.on(node, "show bgp summary", bgp_summary(id, asn, neighbors));
    }

    net = net.on("*", "ping -c 1", PING_OK);
    for pair in &fixtures.pings.failure {
        net = net.on(&pair.source, &format!(" {}", pair.target), PING_UNREACHABLE);
    }

    net = net
        .on_link(("r110", "r410", true), "r410", "traceroute", trace("172.17.3.0"))
        .on_link(("r110", "r410", false), "r410", "traceroute", trace("172.17.4.0"));

    let configs = [
        ("r110", "route-map FROM-R410 permit 10\n match community 1\n set local-preference 300\nroute-map TO-R410 permit 10\n set metric 50\n"),
        ("r120", "router bgp 100\n neighbor 100.100.1.1 remote-as 100\n"),
        ("r130", "route-map FROM-R410 permit 10\n match community 2\n set local-preference 300\nroute-map TO-R410 permit 10\n set metric 50\n"),
        ("r210", "router bgp 200\n neighbor 172.17.1.0 remote-as 100\n"),
        ("r310", "router bgp 300\n neighbor 172.17.2.0 remote-as 100\n"),
        ("r410", "route-map TO-R110 permit 10\n match ip address 1\n set community 400:300\n"),
    ];
    for (node, config) in configs {
        net = net.on(node, "show running-config", format!("Building configuration...\n{config}end\n"));
    }

    net = net
        .on(
            "r410",
            "show bgp ipv4 unicast json",
            bgp_table("100.100.4.1", &[("10.2.1.0/24", "172.17.3.0", 50), ("10.2.1.0/24", "172.17.4.0", 50)]),
        )
        .on("r210", "show bgp ipv4 unicast json", bgp_table("100.100.2.1", &[("10.4.1.0/25", "172.17.1.0", 0)]))
        .on("r310", "show bgp ipv4 unicast json", bgp_table("100.100.3.1", &[("10.4.1.0/25", "172.17.2.0", 0)]));

    for attrs in &fixtures.route_attributes {
        net = net.on(
            &attrs.node,
            &format!("show bgp ipv4 unicast {} json", attrs.prefix),
            prefix_json(
                &format!("{}/25", attrs.prefix),
                &attrs.next_hop.to_string(),
                &attrs.community,
                attrs.local_pref,
            ),
        );
    }

    net
}
