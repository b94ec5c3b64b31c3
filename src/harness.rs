//! Suite orchestration: from fixtures to a grade.

use std::fmt;

use anyhow::{Context, Result};
use network_sim::{Network, NetworkOptions, Topology};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::assignment::Assignment;
use crate::checks::topology::check_topology;
use crate::checks::{CheckContext, CheckResult, Expectation, run_check};
use crate::config::GraderConfig;
use crate::fixtures::Fixtures;
use crate::live::LiveNetwork;
use crate::poll::{AbortReason, PollError, RunGuard, poll_until_stable};
use crate::report;

pub const EXIT_PASSED: u8 = 0;
pub const EXIT_FAILED: u8 = 1;
pub const EXIT_INFRASTRUCTURE: u8 = 2;
pub const EXIT_ABORTED: u8 = 3;
pub const EXIT_TOPOLOGY_MISMATCH: u8 = 255;

/// A named group of expectations graded as one result.
#[derive(Debug, Clone)]
pub struct Section {
    pub name: String,
    pub expectations: Vec<Expectation>,
}

impl Section {
    fn new(name: &str, expectations: Vec<Expectation>) -> Self {
        Self {
            name: name.into(),
            expectations,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Suite {
    pub sections: Vec<Section>,
}

impl Suite {
    /// The eight graded sections, in grading order.
    ///
    /// Directive expectations are expanded over the routers of `topology`.
    pub fn from_fixtures(fixtures: &Fixtures, topology: &Topology) -> Self {
        let protocol = fixtures
            .protocols
            .iter()
            .flat_map(|entry| {
                entry.protocols.iter().map(|status| Expectation::Protocol {
                    node: entry.node.clone(),
                    protocol: status.protocol,
                    active: status.active,
                })
            })
            .collect();

        let asn = fixtures
            .asns
            .iter()
            .map(|e| Expectation::Asn {
                node: e.node.clone(),
                asn: e.asn,
            })
            .collect();

        let mut connectivity = vec![Expectation::PingAll];
        let pings = &fixtures.pings;
        for (pairs, reachable) in [(&pings.success, true), (&pings.failure, false)] {
            connectivity.extend(pairs.iter().map(|p| Expectation::Ping {
                source: p.source.clone(),
                target: p.target,
                reachable,
            }));
        }

        let neighbour = fixtures
            .bgp_neighbors
            .iter()
            .map(|e| Expectation::Neighbors {
                node: e.node.clone(),
                include: e.include.clone(),
                exclude: e.exclude.clone(),
            })
            .collect();

        let fault = fixtures
            .fault_tolerance
            .iter()
            .cloned()
            .map(Expectation::FaultTolerance)
            .collect();

        let metric = fixtures
            .metrics
            .iter()
            .cloned()
            .map(Expectation::Metric)
            .collect();

        let route = fixtures
            .route_attributes
            .iter()
            .cloned()
            .map(Expectation::RouteAttributes)
            .chain(fixtures.kernel_routes.iter().cloned().map(Expectation::KernelRoute))
            .collect();

        let restricted = topology
            .routers()
            .flat_map(|router| {
                fixtures
                    .restricted_directives
                    .iter()
                    .map(|d| Expectation::Directive {
                        node: router.name.clone(),
                        directive: d.directive.clone(),
                        required: d.nodes.contains(&router.name),
                    })
            })
            .collect();

        Self {
            sections: vec![
                Section::new("Protocol", protocol),
                Section::new("ASN", asn),
                Section::new("Connectivity", connectivity),
                Section::new("Neighbour", neighbour),
                Section::new("Fault tolerance", fault),
                Section::new("Metric value", metric),
                Section::new("Route", route),
                Section::new("Restricted commands", restricted),
            ],
        }
    }
}

/// Run every section in order, continuing past failures.
///
/// One aggregated result per section. Sections reached after the guard
/// trips are failed without touching the network.
pub fn run_suite(suite: &Suite, ctx: &CheckContext<'_>) -> Vec<CheckResult> {
    suite
        .sections
        .iter()
        .map(|section| {
            let result = match ctx.guard.check() {
                Err(reason) => CheckResult::fail(&section.name, format!("not run: {reason}")),
                Ok(()) => {
                    debug!(section = %section.name, checks = section.expectations.len(), "running section");
                    let results = section.expectations.iter().map(|e| run_check(e, ctx));
                    CheckResult::aggregate(&section.name, results.collect::<Vec<_>>())
                }
            };
            report::log_section(&result);
            result
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Grade {
    Passed,
    Failed { failed: Vec<String> },
    TopologyMismatch { diagnostics: Vec<String> },
    Aborted { reason: String },
}

impl Grade {
    pub fn exit_code(&self) -> u8 {
        match self {
            Grade::Passed => EXIT_PASSED,
            Grade::Failed { .. } => EXIT_FAILED,
            Grade::TopologyMismatch { .. } => EXIT_TOPOLOGY_MISMATCH,
            Grade::Aborted { .. } => EXIT_ABORTED,
        }
    }

    fn aborted(reason: AbortReason) -> Self {
        Grade::Aborted {
            reason: reason.to_string(),
        }
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Grade::Passed => write!(f, "ALL PASSED"),
            Grade::Failed { failed } => write!(f, "FAILED ({})", failed.join(", ")),
            Grade::TopologyMismatch { .. } => write!(f, "incorrect topology"),
            Grade::Aborted { reason } => write!(f, "aborted: {reason}"),
        }
    }
}

/// Passed iff every result passed; otherwise the failed names, in order.
pub fn grade_suite(results: &[CheckResult]) -> Grade {
    let failed: Vec<String> = results
        .iter()
        .filter(|r| !r.passed)
        .map(|r| r.name.clone())
        .collect();
    if failed.is_empty() {
        Grade::Passed
    } else {
        Grade::Failed { failed }
    }
}

/// Final grade plus every result that led to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub grade: Grade,
    pub results: Vec<CheckResult>,
}

/// Wait until router routing tables stop changing.
///
/// A timeout is not fatal: grading proceeds and the checks report whatever
/// did not converge.
pub fn wait_for_convergence(
    net: &dyn LiveNetwork,
    topology: &Topology,
    config: &GraderConfig,
    guard: &RunGuard,
) -> Result<(), AbortReason> {
    let routers: Vec<&str> = topology.routers().map(|r| r.name.as_str()).collect();
    if routers.is_empty() {
        return Ok(());
    }
    let started = std::time::Instant::now();
    let sampled = poll_until_stable(
        &config.convergence,
        guard,
        "routing convergence",
        config.stable_samples,
        || {
            routers
                .iter()
                .map(|r| net.run(r, "ip route").map(|out| (r.to_string(), out)))
                .collect::<anyhow::Result<Vec<_>>>()
        },
    );
    match sampled {
        Ok(tables) => {
            info!(
                routers = tables.len(),
                "routing converged after {:.1}s",
                started.elapsed().as_secs_f64()
            );
            Ok(())
        }
        Err(PollError::Timeout { elapsed, .. }) => {
            warn!("routing did not settle within {elapsed:?}, grading anyway");
            Ok(())
        }
        Err(PollError::Aborted { reason, .. }) => Err(reason),
    }
}

/// Grade an already running network.
pub fn grade_network(
    net: &dyn LiveNetwork,
    topology: &Topology,
    fixtures: &Fixtures,
    config: &GraderConfig,
    guard: &RunGuard,
) -> Outcome {
    if let Err(reason) = wait_for_convergence(net, topology, config, guard) {
        return Outcome {
            grade: Grade::aborted(reason),
            results: Vec::new(),
        };
    }

    let structure = check_topology(net, &fixtures.hosts);
    report::log_section(&structure);
    if !structure.passed {
        return Outcome {
            grade: Grade::TopologyMismatch {
                diagnostics: structure.diagnostics.clone(),
            },
            results: vec![structure],
        };
    }

    let ctx = CheckContext {
        net,
        topology,
        config,
        guard,
    };
    let suite = Suite::from_fixtures(fixtures, topology);
    let results = run_suite(&suite, &ctx);

    let grade = match guard.check() {
        Err(reason) => Grade::aborted(reason),
        Ok(()) => grade_suite(&results),
    };
    let mut all = Vec::with_capacity(results.len() + 1);
    all.push(structure);
    all.extend(results);
    Outcome { grade, results: all }
}

/// Build the assignment's network, grade it and tear it down.
///
/// Errors are infrastructure failures (unreadable topology, namespace or
/// daemon setup). The network is torn down on every path.
pub fn run(
    assignment: &Assignment,
    fixtures: &Fixtures,
    config: &GraderConfig,
    guard: &RunGuard,
) -> Result<Outcome> {
    let topology = assignment.load_topology()?;
    info!(
        nodes = topology.nodes().count(),
        links = topology.links().len(),
        "creating the network"
    );

    let options = NetworkOptions {
        ns_prefix: config.ns_prefix.clone(),
        config_root: Some(assignment.dir()),
        shared_config_dir: assignment.shared_config_dir(),
        command_timeout: config.command_timeout,
    };
    let net = Network::start(&topology, options)
        .with_context(|| format!("start network for {}", assignment.id))?;

    let outcome = grade_network(&net, &topology, fixtures, config, guard);
    net.stop();
    Ok(outcome)
}
