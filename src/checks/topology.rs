//! Structural check: do the observed nodes, interfaces and addresses match
//! what was expected?

use std::collections::{BTreeMap, BTreeSet};

use ipnet::Ipv4Net;
use tracing::debug;

use super::{CheckResult, command_failed, Source};
use crate::fixtures::ExpectedHost;
use crate::frr::{IpAddrEntry, parse_ip_addr};
use crate::live::LiveNetwork;

pub const CHECK_NAME: &str = "Topology";
const ADDR_COMMAND: &str = "ip -j addr show";

/// Addresses observed on one node.
#[derive(Debug, Default)]
struct Observed {
    /// Ethernet interfaces, by name.
    interfaces: BTreeMap<String, Vec<Ipv4Net>>,
    /// Addresses on `lo` outside 127.0.0.0/8.
    loopback: Vec<Ipv4Net>,
}

impl Observed {
    fn from_entries(entries: &[IpAddrEntry]) -> Self {
        let mut obs = Observed::default();
        for entry in entries {
            if entry.ifname == "lo" {
                obs.loopback = entry
                    .ipv4_addrs()
                    .into_iter()
                    .filter(|net| !net.addr().is_loopback())
                    .collect();
            } else if entry.is_ethernet() {
                obs.interfaces.insert(entry.ifname.clone(), entry.ipv4_addrs());
            }
        }
        obs
    }
}

fn format_set(set: &BTreeSet<&str>) -> String {
    set.iter().copied().collect::<Vec<_>>().join(", ")
}

/// Compare the live network with `expected`.
///
/// Node sets and interface sets are compared by symmetric difference; every
/// discrepancy is reported, not just the first.
pub fn check_topology(net: &dyn LiveNetwork, expected: &[ExpectedHost]) -> CheckResult {
    let mut diags = Vec::new();

    let observed_names = net.node_names();
    let observed: BTreeSet<&str> = observed_names.iter().map(String::as_str).collect();
    let wanted: BTreeSet<&str> = expected.iter().map(|h| h.name.as_str()).collect();

    let additional: BTreeSet<&str> = observed.difference(&wanted).copied().collect();
    let missing: BTreeSet<&str> = wanted.difference(&observed).copied().collect();
    if !additional.is_empty() {
        diags.push(format!("additional nodes: {}", format_set(&additional)));
    }
    if !missing.is_empty() {
        diags.push(format!("missing nodes: {}", format_set(&missing)));
    }

    for host in expected.iter().filter(|h| observed.contains(h.name.as_str())) {
        diags.extend(check_node(net, host));
    }

    CheckResult::from_diagnostics(CHECK_NAME, diags)
}

fn check_node(net: &dyn LiveNetwork, host: &ExpectedHost) -> Vec<String> {
    let node = host.name.as_str();
    let source = Source::Shell(ADDR_COMMAND);
    let output = match source.capture(net, node) {
        Ok(out) => out,
        Err(e) => return vec![command_failed(node, &source, &e)],
    };
    let entries = match parse_ip_addr(&output) {
        Ok(entries) => entries,
        Err(e) => {
            return vec![format!(
                "({node}) {source}: unparsable interface list: {e}; observed: {}",
                super::excerpt(&output)
            )];
        }
    };
    let obs = Observed::from_entries(&entries);
    debug!(node, interfaces = obs.interfaces.len(), "observed interfaces");

    let mut diags = Vec::new();
    match (host.loopback, obs.loopback.as_slice()) {
        (None, []) => {}
        (None, [..]) => diags.push(format!("({node}) should not have configured loopback")),
        (Some(_), []) => diags.push(format!("({node}) should have configured loopback")),
        (Some(want), found) if !found.contains(&want) => diags.push(format!(
            "({node}) should have loopback configured as {want}; observed {}",
            join_nets(found)
        )),
        (Some(_), _) => {}
    }

    let wanted: BTreeSet<&str> = host.interfaces.keys().map(String::as_str).collect();
    let seen: BTreeSet<&str> = obs.interfaces.keys().map(String::as_str).collect();
    let additional: BTreeSet<&str> = seen.difference(&wanted).copied().collect();
    let missing: BTreeSet<&str> = wanted.difference(&seen).copied().collect();
    if !additional.is_empty() {
        diags.push(format!("({node}) additional interface: {}", format_set(&additional)));
    }
    if !missing.is_empty() {
        diags.push(format!("({node}) missing interface: {}", format_set(&missing)));
    }

    for name in wanted.intersection(&seen) {
        let (Some(want), Some(found)) = (host.interfaces.get(*name), obs.interfaces.get(*name))
        else {
            continue;
        };
        if found.first() != Some(want) {
            let observed = if found.is_empty() {
                "no address".to_string()
            } else {
                join_nets(found)
            };
            diags.push(format!("({name}) should have address {want}; observed {observed}"));
        }
    }
    diags
}

fn join_nets(nets: &[Ipv4Net]) -> String {
    nets.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}
