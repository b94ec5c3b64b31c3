//! A running emulated network built from a [`Topology`].

use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow, bail};
use rustc_hash::FxHashMap;
use tracing::{debug, info};

use crate::daemon::RouterDaemon;
use crate::namespace::{Namespace, ShellOutput};
use crate::topology::{NodeKind, Topology};

/// Bridge created inside every switch namespace.
const BRIDGE: &str = "br0";

/// Listening plus learning at the default 15s forward delay, with margin.
const STP_SETTLE_TIMEOUT: Duration = Duration::from_secs(45);

/// Default deadline for a single command run inside a node.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, Clone)]
pub struct NetworkOptions {
    /// Prepended to every node name to form its namespace name.
    pub ns_prefix: String,
    /// Directory holding one sub-directory per router with its daemon
    /// configuration. Without it, no daemons are started.
    pub config_root: Option<PathBuf>,
    /// Shared BIRD include files (`*.conf`), installed on every BIRD router.
    pub shared_config_dir: Option<PathBuf>,
    pub command_timeout: Duration,
}

impl Default for NetworkOptions {
    fn default() -> Self {
        Self {
            ns_prefix: String::new(),
            config_root: None,
            shared_config_dir: None,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }
}

/// Emulated network: one namespace per node, veth links, routing daemons.
///
/// Owns every resource it creates. Dropping it stops the daemons and then
/// deletes the namespaces, whichever way the owner exits.
pub struct Network {
    topology: Topology,
    options: NetworkOptions,
    daemons: FxHashMap<String, RouterDaemon>,
    namespaces: FxHashMap<String, Namespace>,
}

impl Network {
    /// Instantiate `topology`.
    ///
    /// On error everything created so far is torn down before returning.
    pub fn start(topology: &Topology, options: NetworkOptions) -> Result<Self> {
        let mut net = Self {
            topology: topology.clone(),
            options,
            daemons: FxHashMap::default(),
            namespaces: FxHashMap::default(),
        };

        for node in topology.nodes() {
            let ns_name = format!("{}{}", net.options.ns_prefix, node.name);
            let ns = Namespace::new(&ns_name)
                .with_context(|| format!("create namespace for {}", node.name))?;
            net.namespaces.insert(node.name.clone(), ns);
        }

        for link in topology.links() {
            let a = net.namespace(&link.a.node)?;
            let b = net.namespace(&link.b.node)?;
            let a_ip = link.a.addr.map(|n| n.to_string());
            let b_ip = link.b.addr.map(|n| n.to_string());
            a.add_veth_link(b, &link.a.name, &link.b.name, a_ip.as_deref(), b_ip.as_deref())
                .with_context(|| {
                    format!("link {}:{} <-> {}:{}", link.a.node, link.a.name, link.b.node, link.b.name)
                })?;
        }

        let switch_loop = topology.has_switch_loop();
        for node in topology.nodes() {
            let ns = net.namespace(&node.name)?;
            match node.kind {
                NodeKind::Router => {
                    ns.sysctl("net.ipv4.ip_forward", "1")?;
                    if let Some(lo) = node.loopback {
                        ns.add_address("lo", &lo.to_string())?;
                    }
                }
                NodeKind::Switch => {
                    let stp = if switch_loop { "1" } else { "0" };
                    ns.exec_checked(
                        "ip",
                        &["link", "add", BRIDGE, "type", "bridge", "stp_state", stp],
                    )
                    .with_context(|| format!("create bridge on {}", node.name))?;
                    for port in &node.interfaces {
                        ns.exec_checked("ip", &["link", "set", &port.name, "master", BRIDGE])
                            .with_context(|| format!("attach {} to bridge", port.name))?;
                    }
                    ns.set_link_state(BRIDGE, true)?;
                }
                NodeKind::Host => {
                    if let Some(gw) = node.default_route {
                        let gw = gw.to_string();
                        ns.exec_checked("ip", &["route", "add", "default", "via", &gw])
                            .with_context(|| format!("default route on {}", node.name))?;
                    }
                }
            }
        }

        if switch_loop {
            info!("switch loop found, waiting for spanning tree");
            for node in topology.nodes().filter(|n| n.kind == NodeKind::Switch) {
                wait_for_stp(net.namespace(&node.name)?, STP_SETTLE_TIMEOUT)
                    .with_context(|| format!("spanning tree on {}", node.name))?;
            }
        }

        if let Some(root) = net.options.config_root.clone() {
            for node in topology.routers() {
                let Some(kind) = &node.daemon else { continue };
                let ns = net.namespace(&node.name)?;
                let daemon = RouterDaemon::start(
                    ns,
                    &node.name,
                    kind,
                    &root.join(&node.name),
                    net.options.shared_config_dir.as_deref(),
                )?;
                net.daemons.insert(node.name.clone(), daemon);
            }
        }

        info!(
            nodes = net.namespaces.len(),
            links = topology.links().len(),
            daemons = net.daemons.len(),
            "network started"
        );
        Ok(net)
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// Node names, sorted.
    pub fn node_names(&self) -> Vec<String> {
        self.topology.nodes().map(|n| n.name.clone()).collect()
    }

    pub fn namespace(&self, node: &str) -> Result<&Namespace> {
        self.namespaces
            .get(node)
            .ok_or_else(|| anyhow!("no such node '{node}'"))
    }

    /// Run `script` with `sh -c` inside `node`.
    pub fn exec(&self, node: &str, script: &str) -> Result<ShellOutput> {
        let out = self
            .namespace(node)?
            .shell(script, self.options.command_timeout)?;
        debug!(node, script, status = ?out.status, "command finished");
        if out.timed_out {
            bail!(
                "`{script}` on {node} did not finish within {:?}",
                self.options.command_timeout
            );
        }
        Ok(out)
    }

    /// Run `query` through the routing daemon CLI of `node`.
    pub fn query(&self, node: &str, query: &str) -> Result<ShellOutput> {
        let daemon = self
            .daemons
            .get(node)
            .ok_or_else(|| anyhow!("no routing daemon runs on '{node}'"))?;
        self.exec(node, &daemon.query_command(query))
    }

    /// Bring both ends of the link between `a` and `b` up or down.
    pub fn set_link(&self, a: &str, b: &str, up: bool) -> Result<()> {
        let link = self
            .topology
            .link_between(a, b)
            .ok_or_else(|| anyhow!("no link between '{a}' and '{b}'"))?;
        for end in [&link.a, &link.b] {
            self.namespace(&end.node)?.set_link_state(&end.name, up)?;
        }
        info!(a, b, up, "link state changed");
        Ok(())
    }

    /// Tear the network down now instead of at the end of scope.
    pub fn stop(self) {
        drop(self);
    }
}

/// Poll bridge port states until none is listening (1) or learning (2).
fn wait_for_stp(ns: &Namespace, timeout: Duration) -> Result<()> {
    let start = Instant::now();
    loop {
        let out = ns.shell("cat /sys/class/net/*/brport/state", DEFAULT_COMMAND_TIMEOUT)?;
        let states: Vec<&str> = out.stdout.split_whitespace().collect();
        if !states.is_empty() && states.iter().all(|s| !matches!(*s, "1" | "2")) {
            debug!(ns = ns.name, ports = states.len(), "spanning tree settled");
            return Ok(());
        }
        if start.elapsed() > timeout {
            bail!(
                "bridge ports of {} still not forwarding after {timeout:?} (states: {})",
                ns.name,
                states.join(" ")
            );
        }
        thread::sleep(Duration::from_millis(500));
    }
}

impl Drop for Network {
    fn drop(&mut self) {
        // Daemons first: they live inside the namespaces.
        for (_, mut daemon) in self.daemons.drain() {
            daemon.stop();
        }
        self.namespaces.clear();
        debug!("network torn down");
    }
}
