//! Network emulation for grading routed topologies.
//!
//! Uses Linux network namespaces and veth pairs to instantiate a declared
//! topology, and starts routing daemons (FRR or BIRD) inside router
//! namespaces. Routing itself is left entirely to the daemons.
//!
//! # Modules
//!
//! - [`topology`]: Declarative description and the validated graph
//! - [`namespace`]: Namespace and veth management (RAII cleanup on drop)
//! - [`daemon`]: Routing daemon start/stop inside a namespace
//! - [`network`]: A running network built from a topology
//! - [`test_util`]: Privilege checks and unique name generation for tests

pub mod daemon;
pub mod namespace;
pub mod network;
pub mod test_util;
pub mod topology;

pub use daemon::RouterDaemon;
pub use namespace::{Namespace, ShellOutput};
pub use network::{Network, NetworkOptions};
pub use test_util::{SkipReason, check_frr_deps, check_namespace_deps, check_privileges, unique_ns_name};
pub use topology::{
    DaemonKind, Endpoint, Interface, Link, LinkSpec, Node, NodeKind, NodeSpec, Topology,
    TopologyDescription, TopologyError,
};
