//! Route policy checks: BGP metrics, per-route attributes and kernel routes.

use super::{Source, command_failed, excerpt, expect_output};
use crate::fixtures::{KernelRoute, MetricExpectation, RouteAttributes};
use crate::frr::{parse_bgp_table, parse_prefix_dump};
use crate::live::LiveNetwork;
use crate::predicate::Predicate;

const BGP_TABLE_QUERY: &str = "show bgp ipv4 unicast json";

/// Compare the metric of BGP routes learned via `m.next_hop`.
///
/// With `present`, at least one such route must carry `m.metric`; otherwise
/// none may. A route without a MED carries no metric at all, so it never
/// matches, not even metric 0.
pub fn check_metric(net: &dyn LiveNetwork, m: &MetricExpectation) -> Vec<String> {
    let node = m.node.as_str();
    let source = Source::Daemon(BGP_TABLE_QUERY);
    let output = match source.capture(net, node) {
        Ok(out) => out,
        Err(e) => return vec![command_failed(node, &source, &e)],
    };
    let table = match parse_bgp_table(&output) {
        Ok(t) => t,
        Err(e) => {
            return vec![format!(
                "({node}) {source}: malformed BGP table ({e}); observed: {}",
                excerpt(&output)
            )];
        }
    };

    let via: Vec<(&str, Option<u32>)> = table
        .paths_via(m.next_hop)
        .map(|(prefix, path)| (prefix, path.metric))
        .collect();
    let matching: Vec<&str> = via
        .iter()
        .filter(|(_, metric)| *metric == Some(m.metric))
        .map(|(prefix, _)| *prefix)
        .collect();

    let observed = if via.is_empty() {
        format!("no routes via {}", m.next_hop)
    } else {
        via.iter()
            .map(|(prefix, metric)| match metric {
                Some(metric) => format!("{prefix} metric {metric}"),
                None => format!("{prefix} no metric"),
            })
            .collect::<Vec<_>>()
            .join(", ")
    };

    match (m.present, matching.is_empty()) {
        (true, true) => vec![format!(
            "({node}) {}: expected a route via {} with metric {}; observed {observed}",
            m.description, m.next_hop, m.metric
        )],
        (false, false) => vec![format!(
            "({node}) {}: expected no route via {} with metric {}; observed {observed}",
            m.description, m.next_hop, m.metric
        )],
        _ => Vec::new(),
    }
}

/// Check community and local preference of the path to `r.prefix` via
/// `r.next_hop`.
pub fn check_route_attributes(net: &dyn LiveNetwork, r: &RouteAttributes) -> Vec<String> {
    let node = r.node.as_str();
    let query = format!("show bgp ipv4 unicast {} json", r.prefix);
    let source = Source::Daemon(&query);
    let output = match source.capture(net, node) {
        Ok(out) => out,
        Err(e) => return vec![command_failed(node, &source, &e)],
    };
    let dump = match parse_prefix_dump(&output) {
        Ok(d) => d,
        Err(e) => {
            return vec![format!(
                "({node}) {source}: malformed route dump for {} ({e}); observed: {}",
                r.prefix,
                excerpt(&output)
            )];
        }
    };

    let Some(path) = dump.paths.iter().find(|p| p.has_next_hop(r.next_hop)) else {
        return vec![format!(
            "({node}) no path to {} via {} ({} paths in table)",
            r.prefix,
            r.next_hop,
            dump.paths.len()
        )];
    };

    let mut diags = Vec::new();
    let community = path.community_string();
    if community != r.community {
        diags.push(format!(
            "({node}) incorrect community value received for {}: expected {}, observed {}",
            r.prefix,
            r.community,
            if community.is_empty() { "none" } else { community }
        ));
    }
    if path.local_pref != Some(r.local_pref) {
        diags.push(format!(
            "({node}) incorrect local preference value set for {}: expected {}, observed {}",
            r.prefix,
            r.local_pref,
            path.local_pref.map_or("none".into(), |lp| lp.to_string())
        ));
    }
    diags
}

pub fn check_kernel_route(net: &dyn LiveNetwork, k: &KernelRoute) -> Vec<String> {
    match Predicate::matches(&k.pattern) {
        Ok(pred) => expect_output(
            net,
            &k.node,
            Source::Shell("ip route"),
            &[pred],
            &k.description,
        ),
        Err(e) => vec![format!("({}) invalid route pattern {}: {e}", k.node, k.pattern)],
    }
}
