//! Declarative topology description and the validated graph built from it.
//!
//! A [`TopologyDescription`] is plain data (usually loaded from JSON). It is
//! turned into an immutable [`Topology`] exactly once; every referential
//! check happens there, so the emulation layer can rely on a well-formed
//! graph.

use std::collections::BTreeMap;
use std::fmt;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

use ipnet::Ipv4Net;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Linux limit on network device names.
pub const MAX_IFACE_NAME_LEN: usize = 15;

/// Daemons launched for an FRR router when the description names none.
pub const DEFAULT_FRR_DAEMONS: [&str; 3] = ["zebra", "ripd", "bgpd"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    #[default]
    Host,
    Router,
    /// Learning bridge; its ports carry no addresses.
    Switch,
}

impl NodeKind {
    /// Index of the first auto-named interface (`<node>-eth<N>`).
    fn first_port(self) -> usize {
        match self {
            NodeKind::Switch => 1,
            NodeKind::Host | NodeKind::Router => 0,
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKind::Host => write!(f, "host"),
            NodeKind::Router => write!(f, "router"),
            NodeKind::Switch => write!(f, "switch"),
        }
    }
}

/// Routing suite running inside a router namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "suite", rename_all = "lowercase")]
pub enum DaemonKind {
    Frr {
        #[serde(default = "default_frr_daemons")]
        daemons: Vec<String>,
    },
    Bird,
}

impl Default for DaemonKind {
    fn default() -> Self {
        DaemonKind::Frr {
            daemons: default_frr_daemons(),
        }
    }
}

fn default_frr_daemons() -> Vec<String> {
    DEFAULT_FRR_DAEMONS.iter().map(|d| d.to_string()).collect()
}

/// One node as written in the description file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSpec {
    pub name: String,
    #[serde(default)]
    pub kind: NodeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loopback: Option<Ipv4Net>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asn: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub daemon: Option<DaemonKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_route: Option<Ipv4Addr>,
}

/// One side of a link as written in the description file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub node: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iface: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub addr: Option<Ipv4Net>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkSpec {
    pub a: Endpoint,
    pub b: Endpoint,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologyDescription {
    pub nodes: Vec<NodeSpec>,
    #[serde(default)]
    pub links: Vec<LinkSpec>,
}

#[derive(Debug, Error)]
pub enum TopologyError {
    #[error("node '{0}' is declared more than once")]
    DuplicateNode(String),
    #[error("node name must not be empty")]
    EmptyNodeName,
    #[error("link #{link} refers to undeclared node '{node}'")]
    UnknownNode { link: usize, node: String },
    #[error("link #{link} connects '{node}' to itself")]
    SelfLink { link: usize, node: String },
    #[error("interface '{iface}' is declared twice on node '{node}'")]
    DuplicateInterface { node: String, iface: String },
    #[error("interface name '{0}' exceeds {MAX_IFACE_NAME_LEN} characters")]
    InterfaceNameTooLong(String),
    #[error("{field} is only valid on a {expected}, but '{node}' is a {kind}")]
    MisplacedAttribute {
        node: String,
        field: &'static str,
        expected: NodeKind,
        kind: NodeKind,
    },
    #[error("switch port {node}/{iface} must not carry an address")]
    AddressedSwitchPort { node: String, iface: String },
    #[error("line {line}: {reason}")]
    LinkList { line: usize, reason: String },
    #[error("read topology {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parse topology {path}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// An interface owned by a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Interface {
    pub node: String,
    pub name: String,
    pub addr: Option<Ipv4Net>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Node {
    pub name: String,
    pub kind: NodeKind,
    pub loopback: Option<Ipv4Net>,
    pub asn: Option<u32>,
    pub daemon: Option<DaemonKind>,
    pub default_route: Option<Ipv4Addr>,
    /// Interfaces in declaration order; the first addressed one is primary.
    pub interfaces: Vec<Interface>,
}

impl Node {
    pub fn is_router(&self) -> bool {
        self.kind == NodeKind::Router
    }

    /// Address other nodes use to reach this one (first addressed interface).
    pub fn primary_address(&self) -> Option<Ipv4Addr> {
        self.interfaces
            .iter()
            .find_map(|iface| iface.addr.map(|net| net.addr()))
    }

    pub fn interface(&self, name: &str) -> Option<&Interface> {
        self.interfaces.iter().find(|iface| iface.name == name)
    }
}

/// Resolved link between two interfaces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Link {
    pub a: Interface,
    pub b: Interface,
}

impl Link {
    /// True if this link joins `x` and `y`, in either direction.
    pub fn connects(&self, x: &str, y: &str) -> bool {
        (self.a.node == x && self.b.node == y) || (self.a.node == y && self.b.node == x)
    }
}

/// Validated, immutable network graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Topology {
    nodes: BTreeMap<String, Node>,
    links: Vec<Link>,
}

impl Topology {
    /// Build the graph, checking referential integrity and naming rules.
    pub fn from_description(desc: &TopologyDescription) -> Result<Self, TopologyError> {
        let mut nodes = BTreeMap::new();
        for spec in &desc.nodes {
            validate_node(spec)?;
            let node = Node {
                name: spec.name.clone(),
                kind: spec.kind,
                loopback: spec.loopback,
                asn: spec.asn,
                daemon: match spec.kind {
                    NodeKind::Router => Some(spec.daemon.clone().unwrap_or_default()),
                    _ => None,
                },
                default_route: spec.default_route,
                interfaces: Vec::new(),
            };
            if nodes.insert(spec.name.clone(), node).is_some() {
                return Err(TopologyError::DuplicateNode(spec.name.clone()));
            }
        }

        let mut seen: FxHashSet<(String, String)> = FxHashSet::default();
        let mut links = Vec::with_capacity(desc.links.len());
        for (idx, spec) in desc.links.iter().enumerate() {
            if spec.a.node == spec.b.node {
                return Err(TopologyError::SelfLink {
                    link: idx,
                    node: spec.a.node.clone(),
                });
            }

            let a = attach(&mut nodes, &mut seen, idx, &spec.a)?;
            let b = attach(&mut nodes, &mut seen, idx, &spec.b)?;
            links.push(Link { a, b });
        }

        Ok(Self { nodes, links })
    }

    /// Load a JSON [`TopologyDescription`] from `path` and build it.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, TopologyError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| TopologyError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let desc: TopologyDescription =
            serde_json::from_str(&text).map_err(|source| TopologyError::Json {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_description(&desc)
    }

    /// Parse the compact link-list format.
    ///
    /// The first line holds `<hosts> <switches> <links>`; every following
    /// non-empty line is `a,b`. Hosts are `h1..hN` addressed `10.0.0.<i>/8`,
    /// switches are `s1..sM`.
    pub fn from_link_list(text: &str) -> Result<Self, TopologyError> {
        let mut lines = text
            .lines()
            .enumerate()
            .map(|(i, l)| (i + 1, l.trim()))
            .filter(|(_, l)| !l.is_empty());

        let (header_line, header) = lines.next().ok_or(TopologyError::LinkList {
            line: 1,
            reason: "missing header".into(),
        })?;
        let counts = header
            .split_whitespace()
            .map(str::parse::<usize>)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| TopologyError::LinkList {
                line: header_line,
                reason: format!("bad header: {e}"),
            })?;
        let [hosts, switches, link_count] = counts[..] else {
            return Err(TopologyError::LinkList {
                line: header_line,
                reason: format!("header needs 3 counts, found {}", counts.len()),
            });
        };
        if hosts > 254 {
            return Err(TopologyError::LinkList {
                line: header_line,
                reason: format!("{hosts} hosts do not fit in 10.0.0.0/8 auto addressing"),
            });
        }

        let mut desc = TopologyDescription::default();
        let mut host_addr = BTreeMap::new();
        for h in 1..=hosts {
            let name = format!("h{h}");
            let addr = Ipv4Net::new(Ipv4Addr::new(10, 0, 0, h as u8), 8).map_err(|e| {
                TopologyError::LinkList {
                    line: header_line,
                    reason: e.to_string(),
                }
            })?;
            host_addr.insert(name.clone(), addr);
            desc.nodes.push(NodeSpec {
                name,
                kind: NodeKind::Host,
                ..Default::default()
            });
        }
        for s in 1..=switches {
            desc.nodes.push(NodeSpec {
                name: format!("s{s}"),
                kind: NodeKind::Switch,
                ..Default::default()
            });
        }

        // A host gets its address on the first link it appears on.
        let mut addressed = FxHashSet::default();
        for (line, entry) in lines {
            let (a, b) = entry.split_once(',').ok_or_else(|| TopologyError::LinkList {
                line,
                reason: format!("expected 'a,b', found '{entry}'"),
            })?;
            let mut endpoint = |node: &str| Endpoint {
                node: node.to_string(),
                iface: None,
                addr: host_addr
                    .get(node)
                    .copied()
                    .filter(|_| addressed.insert(node.to_string())),
            };
            let link = LinkSpec {
                a: endpoint(a.trim()),
                b: endpoint(b.trim()),
            };
            desc.links.push(link);
        }

        if desc.links.len() != link_count {
            return Err(TopologyError::LinkList {
                line: header_line,
                reason: format!(
                    "header announces {link_count} links, found {}",
                    desc.links.len()
                ),
            });
        }

        Self::from_description(&desc)
    }

    pub fn node(&self, name: &str) -> Option<&Node> {
        self.nodes.get(name)
    }

    /// Nodes ordered by name.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn routers(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values().filter(|n| n.is_router())
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    pub fn link_between(&self, x: &str, y: &str) -> Option<&Link> {
        self.links.iter().find(|link| link.connects(x, y))
    }

    pub fn primary_address(&self, node: &str) -> Option<Ipv4Addr> {
        self.nodes.get(node).and_then(Node::primary_address)
    }

    /// True if switch-to-switch links form a loop (or a switch pair is
    /// joined twice). Such bridges need spanning tree.
    pub fn has_switch_loop(&self) -> bool {
        let is_switch = |name: &str| self.nodes.get(name).is_some_and(|n| n.kind == NodeKind::Switch);
        let mut parent: BTreeMap<&str, &str> = BTreeMap::new();

        fn root<'a>(parent: &BTreeMap<&'a str, &'a str>, mut node: &'a str) -> &'a str {
            while let Some(&up) = parent.get(node) {
                node = up;
            }
            node
        }

        for link in &self.links {
            let (a, b) = (link.a.node.as_str(), link.b.node.as_str());
            if !is_switch(a) || !is_switch(b) {
                continue;
            }
            let (ra, rb) = (root(&parent, a), root(&parent, b));
            if ra == rb {
                return true;
            }
            parent.insert(ra, rb);
        }
        false
    }
}

fn validate_node(spec: &NodeSpec) -> Result<(), TopologyError> {
    if spec.name.is_empty() {
        return Err(TopologyError::EmptyNodeName);
    }
    let misplaced = |field, expected| TopologyError::MisplacedAttribute {
        node: spec.name.clone(),
        field,
        expected,
        kind: spec.kind,
    };
    if spec.kind != NodeKind::Router {
        if spec.asn.is_some() {
            return Err(misplaced("asn", NodeKind::Router));
        }
        if spec.daemon.is_some() {
            return Err(misplaced("daemon", NodeKind::Router));
        }
        if spec.loopback.is_some() {
            return Err(misplaced("loopback", NodeKind::Router));
        }
    }
    if spec.kind != NodeKind::Host && spec.default_route.is_some() {
        return Err(misplaced("default_route", NodeKind::Host));
    }
    Ok(())
}

/// Add the interface described by `end` to its node and return it.
fn attach(
    nodes: &mut BTreeMap<String, Node>,
    seen: &mut FxHashSet<(String, String)>,
    link: usize,
    end: &Endpoint,
) -> Result<Interface, TopologyError> {
    let Some(node) = nodes.get_mut(&end.node) else {
        return Err(TopologyError::UnknownNode {
            link,
            node: end.node.clone(),
        });
    };

    let name = match &end.iface {
        Some(name) => name.clone(),
        None => {
            // Skip indices already taken by explicitly named interfaces.
            let mut idx = node.kind.first_port() + node.interfaces.len();
            while seen.contains(&(node.name.clone(), format!("{}-eth{idx}", node.name))) {
                idx += 1;
            }
            format!("{}-eth{idx}", node.name)
        }
    };
    if name.len() > MAX_IFACE_NAME_LEN {
        return Err(TopologyError::InterfaceNameTooLong(name));
    }
    if !seen.insert((node.name.clone(), name.clone())) {
        return Err(TopologyError::DuplicateInterface {
            node: node.name.clone(),
            iface: name,
        });
    }
    if node.kind == NodeKind::Switch && end.addr.is_some() {
        return Err(TopologyError::AddressedSwitchPort {
            node: node.name.clone(),
            iface: name,
        });
    }

    let iface = Interface {
        node: node.name.clone(),
        name,
        addr: end.addr,
    };
    node.interfaces.push(iface.clone());
    Ok(iface)
}
