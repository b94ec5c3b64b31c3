//! Check kinds and their evaluation against a live network.
//!
//! Every check turns into a [`CheckResult`]. Command failures, timeouts and
//! unparsable output are failed results with diagnostics, never errors: a
//! single run should surface every discrepancy it can.

pub mod connectivity;
pub mod fault;
pub mod routes;
pub mod topology;

use std::fmt;
use std::net::Ipv4Addr;

use network_sim::Topology;
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::GraderConfig;
use crate::fixtures::{FaultScenario, KernelRoute, MetricExpectation, Protocol, RouteAttributes};
use crate::live::LiveNetwork;
use crate::poll::RunGuard;
use crate::predicate::{Pattern, Predicate};

/// Lines of command output kept in a diagnostic.
const EXCERPT_LINES: usize = 6;
const EXCERPT_CHARS: usize = 400;

/// Regex for a ping that lost nothing (`\b` keeps `100%` from matching).
pub const ZERO_LOSS: &str = r"\b0% packet loss";
pub const UNREACHABLE: &str = "Network is unreachable";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckResult {
    pub name: String,
    pub passed: bool,
    pub diagnostics: Vec<String>,
}

impl CheckResult {
    pub fn pass(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: true,
            diagnostics: Vec::new(),
        }
    }

    pub fn fail(name: impl Into<String>, diagnostic: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: false,
            diagnostics: vec![diagnostic.into()],
        }
    }

    /// Passed iff there is nothing to report.
    pub fn from_diagnostics(name: impl Into<String>, diagnostics: Vec<String>) -> Self {
        Self {
            name: name.into(),
            passed: diagnostics.is_empty(),
            diagnostics,
        }
    }

    /// Fold many results into one that passes only if all of them did.
    pub fn aggregate(name: impl Into<String>, results: impl IntoIterator<Item = CheckResult>) -> Self {
        let mut passed = true;
        let mut diagnostics = Vec::new();
        for r in results {
            passed &= r.passed;
            diagnostics.extend(r.diagnostics);
        }
        Self {
            name: name.into(),
            passed,
            diagnostics,
        }
    }
}

/// What a check needs from the run.
#[derive(Clone, Copy)]
pub struct CheckContext<'a> {
    pub net: &'a dyn LiveNetwork,
    pub topology: &'a Topology,
    pub config: &'a GraderConfig,
    pub guard: &'a RunGuard,
}

/// One named assertion about the live network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expectation {
    Protocol {
        node: String,
        protocol: Protocol,
        active: bool,
    },
    Asn {
        node: String,
        asn: u32,
    },
    Neighbors {
        node: String,
        include: Vec<Ipv4Addr>,
        exclude: Vec<Ipv4Addr>,
    },
    Ping {
        source: String,
        target: Ipv4Addr,
        reachable: bool,
    },
    /// Every addressed node reaches every other one.
    PingAll,
    Traceroute {
        source: String,
        target: Ipv4Addr,
        via: Ipv4Addr,
    },
    /// `directive` appears in the running config of `node` iff `required`.
    Directive {
        node: String,
        directive: String,
        required: bool,
    },
    Metric(MetricExpectation),
    RouteAttributes(RouteAttributes),
    KernelRoute(KernelRoute),
    FaultTolerance(FaultScenario),
}

impl fmt::Display for Expectation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expectation::Protocol {
                node,
                protocol,
                active,
            } => write!(f, "({node}) {protocol} {}", if *active { "active" } else { "inactive" }),
            Expectation::Asn { node, asn } => write!(f, "({node}) AS {asn}"),
            Expectation::Neighbors { node, .. } => write!(f, "({node}) BGP neighbours"),
            Expectation::Ping {
                source,
                target,
                reachable,
            } => write!(
                f,
                "({source}) ping {target} {}",
                if *reachable { "succeeds" } else { "is unreachable" }
            ),
            Expectation::PingAll => write!(f, "full reachability"),
            Expectation::Traceroute { source, target, via } => {
                write!(f, "({source}) trace to {target} via {via}")
            }
            Expectation::Directive {
                node,
                directive,
                required,
            } => write!(
                f,
                "({node}) {} '{directive}'",
                if *required { "uses" } else { "does not use" }
            ),
            Expectation::Metric(m) => write!(f, "({}) metric via {}", m.node, m.next_hop),
            Expectation::RouteAttributes(r) => {
                write!(f, "({}) attributes of {} via {}", r.node, r.prefix, r.next_hop)
            }
            Expectation::KernelRoute(k) => write!(f, "({}) {}", k.node, k.description),
            Expectation::FaultTolerance(s) => {
                write!(f, "fault tolerance of {}-{}", s.link.0, s.link.1)
            }
        }
    }
}

/// Where a check's output comes from.
#[derive(Debug, Clone, Copy)]
pub enum Source<'a> {
    Shell(&'a str),
    Daemon(&'a str),
}

impl Source<'_> {
    pub fn capture(&self, net: &dyn LiveNetwork, node: &str) -> anyhow::Result<String> {
        match self {
            Source::Shell(cmd) => net.run(node, cmd),
            Source::Daemon(query) => net.query_daemon(node, query),
        }
    }
}

impl fmt::Display for Source<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Shell(cmd) => write!(f, "`{cmd}`"),
            Source::Daemon(query) => write!(f, "`vtysh -c \"{query}\"`"),
        }
    }
}

/// First few lines of `output`, for diagnostics.
pub fn excerpt(output: &str) -> String {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        return "no output".into();
    }
    let mut text: String = trimmed
        .lines()
        .take(EXCERPT_LINES)
        .collect::<Vec<_>>()
        .join(" | ");
    if text.chars().count() > EXCERPT_CHARS {
        text = text.chars().take(EXCERPT_CHARS).collect();
        text.push_str("...");
    } else if trimmed.lines().count() > EXCERPT_LINES {
        text.push_str(" | ...");
    }
    text
}

pub fn command_failed(node: &str, source: &Source<'_>, err: &anyhow::Error) -> String {
    format!("({node}) {source}: command failed: {err:#}")
}

/// Capture once and evaluate every predicate over the same output.
///
/// Returns one diagnostic per failed predicate, prefixed by `context`.
pub fn expect_output(
    net: &dyn LiveNetwork,
    node: &str,
    source: Source<'_>,
    predicates: &[Predicate],
    context: &str,
) -> Vec<String> {
    let output = match source.capture(net, node) {
        Ok(out) => out,
        Err(e) => {
            warn!(node, %source, "command failed: {e:#}");
            return vec![command_failed(node, &source, &e)];
        }
    };
    predicates
        .iter()
        .filter(|p| !p.evaluate(&output))
        .map(|p| {
            debug!(node, %source, expectation = %p, "predicate failed");
            let missing = if !p.is_inverted() && p.patterns().len() > 1 {
                let list = p
                    .offending(&output)
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ");
                format!(" (missing {list})")
            } else {
                String::new()
            };
            format!(
                "({node}) {context}: {source} expected output that {p}{missing}; observed: {}",
                excerpt(&output)
            )
        })
        .collect()
}

/// Evaluate one expectation. Never panics and never returns an error.
pub fn run_check(expectation: &Expectation, ctx: &CheckContext<'_>) -> CheckResult {
    let name = expectation.to_string();
    if let Err(reason) = ctx.guard.check() {
        return CheckResult::fail(name, format!("not run: {reason}"));
    }
    let net = ctx.net;

    let diagnostics = match expectation {
        Expectation::Protocol {
            node,
            protocol,
            active,
        } => match Predicate::matches(&protocol.inactive_pattern()) {
            Ok(inactive) => {
                let context = if *active {
                    format!("{protocol} should be active")
                } else {
                    format!("{protocol} should not be active")
                };
                let pred = inactive.expect_present(!active);
                expect_output(net, node, Source::Daemon(protocol.show_query()), &[pred], &context)
            }
            Err(e) => vec![format!("({node}) invalid protocol pattern: {e}")],
        },
        Expectation::Asn { node, asn } => {
            match Predicate::matches(&format!(r"local AS number {asn}\b")) {
                Ok(pred) => expect_output(
                    net,
                    node,
                    Source::Daemon("show bgp summary"),
                    &[pred],
                    "incorrect ASN",
                ),
                Err(e) => vec![format!("({node}) invalid ASN pattern: {e}")],
            }
        }
        Expectation::Neighbors {
            node,
            include,
            exclude,
        } => {
            // Exclusions are one conjunction: only all of them at once fail.
            let preds: Vec<Predicate> = [(include, true), (exclude, false)]
                .into_iter()
                .filter(|(addrs, _)| !addrs.is_empty())
                .map(|(addrs, present)| {
                    Predicate::all_of(addrs.iter().copied().map(Pattern::address))
                        .expect_present(present)
                })
                .collect();
            expect_output(
                net,
                node,
                Source::Daemon("show bgp summary"),
                &preds,
                "wrong BGP neighbours",
            )
        }
        Expectation::Ping {
            source,
            target,
            reachable,
        } => {
            let cmd = ping_command(*target, ctx.config.ping_timeout_secs);
            let pred = if *reachable {
                Predicate::matches(ZERO_LOSS)
            } else {
                Ok(Predicate::contains(UNREACHABLE))
            };
            let context = if *reachable {
                format!("failed to ping {target}")
            } else {
                format!("should fail to ping {target}")
            };
            match pred {
                Ok(pred) => expect_output(net, source, Source::Shell(&cmd), &[pred], &context),
                Err(e) => vec![format!("({source}) invalid ping pattern: {e}")],
            }
        }
        Expectation::PingAll => {
            return connectivity::ping_all(net, ctx.topology, ctx.config.ping_timeout_secs, ctx.guard)
                .into_result(name);
        }
        Expectation::Traceroute { source, target, via } => {
            let cmd = traceroute_command(*target);
            let pred = Predicate::all_of([Pattern::address(*via)]);
            expect_output(
                net,
                source,
                Source::Shell(&cmd),
                &[pred],
                &format!("route to {target} does not pass through {via}"),
            )
        }
        Expectation::Directive {
            node,
            directive,
            required,
        } => {
            let pred = Predicate::contains(directive.as_str()).expect_present(*required);
            let context = if *required {
                format!("does not use {directive}")
            } else {
                format!("uses {directive}")
            };
            expect_output(
                net,
                node,
                Source::Daemon("show running-config"),
                &[pred],
                &context,
            )
        }
        Expectation::Metric(m) => routes::check_metric(net, m),
        Expectation::RouteAttributes(r) => routes::check_route_attributes(net, r),
        Expectation::KernelRoute(k) => routes::check_kernel_route(net, k),
        Expectation::FaultTolerance(s) => return fault::check_fault_tolerance(ctx, s, name),
    };

    CheckResult::from_diagnostics(name, diagnostics)
}

pub fn ping_command(target: Ipv4Addr, timeout_secs: u64) -> String {
    format!("ping -c 1 -W {timeout_secs} {target}")
}

pub fn traceroute_command(target: Ipv4Addr) -> String {
    format!("traceroute -n -w 1 -q 1 {target}")
}
