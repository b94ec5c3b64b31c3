//! The seam between checks and a running network.
//!
//! Checks only ever talk to a [`LiveNetwork`]. The real implementation is
//! [`network_sim::Network`]; tests drive checks against a scripted fake.

use anyhow::Result;
use network_sim::{Network, NodeKind};
use tracing::debug;

/// Target for captured command output. Silenced unless `--show-output`.
pub const OUTPUT_TARGET: &str = "netgrade::output";

pub trait LiveNetwork {
    /// Hosts and routers, sorted. Switches are plumbing and not listed.
    fn node_names(&self) -> Vec<String>;

    /// Run a shell command inside `node` and return stdout followed by
    /// stderr. A non-zero exit status is not an error.
    fn run(&self, node: &str, command: &str) -> Result<String>;

    /// Ask the routing daemon of `node` a CLI question.
    fn query_daemon(&self, node: &str, query: &str) -> Result<String> {
        self.run(node, &format!("vtysh -c {}", network_sim::daemon::shell_quote(query)))
    }

    fn set_link_state(&self, a: &str, b: &str, up: bool) -> Result<()>;
}

impl LiveNetwork for Network {
    fn node_names(&self) -> Vec<String> {
        self.topology()
            .nodes()
            .filter(|n| n.kind != NodeKind::Switch)
            .map(|n| n.name.clone())
            .collect()
    }

    fn run(&self, node: &str, command: &str) -> Result<String> {
        let out = self.exec(node, command)?;
        let text = out.combined();
        debug!(target: OUTPUT_TARGET, node, command, "\n{text}");
        Ok(text)
    }

    fn query_daemon(&self, node: &str, query: &str) -> Result<String> {
        let out = self.query(node, query)?;
        let text = out.combined();
        debug!(target: OUTPUT_TARGET, node, query, "\n{text}");
        Ok(text)
    }

    fn set_link_state(&self, a: &str, b: &str, up: bool) -> Result<()> {
        self.set_link(a, b, up)
    }
}
