//! Full-mesh reachability.

use std::net::Ipv4Addr;

use network_sim::{NodeKind, Topology};
use tracing::{debug, info};

use super::{CheckResult, ZERO_LOSS, ping_command};
use crate::live::LiveNetwork;
use crate::poll::{AbortReason, RunGuard};

/// Outcome of pinging every addressed node from every other one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PingAllReport {
    pub attempted: usize,
    /// `(source, target node, target address)` of each lost probe.
    pub failed: Vec<(String, String, Ipv4Addr)>,
    pub aborted: Option<AbortReason>,
}

impl PingAllReport {
    /// Percentage of probes lost, rounded down.
    pub fn loss_percent(&self) -> usize {
        if self.attempted == 0 {
            return 0;
        }
        self.failed.len() * 100 / self.attempted
    }

    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.aborted.is_none()
    }

    pub fn summary(&self) -> String {
        let lost = self
            .failed
            .iter()
            .map(|(src, dst, addr)| format!("{src}->{dst} ({addr})"))
            .collect::<Vec<_>>()
            .join(", ");
        let mut text = format!(
            "{}% dropped ({}/{} lost)",
            self.loss_percent(),
            self.failed.len(),
            self.attempted
        );
        if !lost.is_empty() {
            text.push_str(": ");
            text.push_str(&lost);
        }
        if let Some(reason) = self.aborted {
            text.push_str(&format!(" [stopped: {reason}]"));
        }
        text
    }

    pub fn into_result(self, name: impl Into<String>) -> CheckResult {
        if self.is_clean() {
            CheckResult::pass(name)
        } else {
            CheckResult::fail(
                name,
                format!("all nodes should be able to ping each other: {}", self.summary()),
            )
        }
    }
}

/// Ping every ordered pair of addressed hosts and routers once.
///
/// A probe whose command fails counts as lost. Stops early when the guard
/// trips, recording why.
pub fn ping_all(
    net: &dyn LiveNetwork,
    topology: &Topology,
    timeout_secs: u64,
    guard: &RunGuard,
) -> PingAllReport {
    let nodes: Vec<(&str, Ipv4Addr)> = topology
        .nodes()
        .filter(|n| n.kind != NodeKind::Switch)
        .filter_map(|n| Some((n.name.as_str(), n.primary_address()?)))
        .collect();

    let mut report = PingAllReport::default();
    let zero_loss = regex::Regex::new(ZERO_LOSS).ok();

    'outer: for &(src, _) in &nodes {
        for &(dst, addr) in &nodes {
            if src == dst {
                continue;
            }
            if let Err(reason) = guard.check() {
                report.aborted = Some(reason);
                break 'outer;
            }
            report.attempted += 1;
            let ok = match net.run(src, &ping_command(addr, timeout_secs)) {
                Ok(out) => zero_loss.as_ref().is_some_and(|re| re.is_match(&out)),
                Err(e) => {
                    debug!(src, dst, "ping failed to run: {e:#}");
                    false
                }
            };
            if !ok {
                report.failed.push((src.to_string(), dst.to_string(), addr));
            }
        }
    }

    info!(
        attempted = report.attempted,
        lost = report.failed.len(),
        "ping all: {}% dropped",
        report.loss_percent()
    );
    report
}
