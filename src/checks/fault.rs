//! Link failure and recovery.
//!
//! The scenario runs as a fixed sequence of phases:
//!
//! 1. baseline: the probe trace passes the primary hop
//! 2. the link goes down
//! 3. the trace moves to the backup hop
//! 4. every node still reaches every other one
//! 5. the link comes back up (attempted whatever happened before)
//! 6. the trace returns to the primary hop
//! 7. full reachability again
//!
//! Waiting phases poll with the reroute timeout.

use std::fmt;
use std::net::Ipv4Addr;

use tracing::{info, warn};

use super::connectivity::ping_all;
use super::{CheckContext, CheckResult, excerpt, traceroute_command};
use crate::fixtures::FaultScenario;
use crate::poll::{Observation, PollError, poll_until};
use crate::predicate::Pattern;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Baseline,
    LinkDown,
    Rerouted,
    ReachableWhileDown,
    LinkUp,
    Restored,
    ReachableAfterRestore,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Baseline => "baseline path",
            Phase::LinkDown => "link down",
            Phase::Rerouted => "reroute",
            Phase::ReachableWhileDown => "reachability [link down]",
            Phase::LinkUp => "link up",
            Phase::Restored => "restore",
            Phase::ReachableAfterRestore => "reachability [link up]",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseOutcome {
    pub phase: Phase,
    pub passed: bool,
    pub detail: String,
}

pub fn check_fault_tolerance(
    ctx: &CheckContext<'_>,
    scenario: &FaultScenario,
    name: String,
) -> CheckResult {
    let outcomes = run_phases(ctx, scenario);
    let diagnostics = outcomes
        .iter()
        .filter(|o| !o.passed)
        .map(|o| format!("{}: {}", o.phase, o.detail))
        .collect();
    CheckResult::from_diagnostics(name, diagnostics)
}

/// Run all phases and return what each one saw.
pub fn run_phases(ctx: &CheckContext<'_>, s: &FaultScenario) -> Vec<PhaseOutcome> {
    let (a, b) = (s.link.0.as_str(), s.link.1.as_str());
    let mut outcomes = Vec::with_capacity(7);
    let mut record = |phase: Phase, result: Result<String, String>| {
        let outcome = match result {
            Ok(detail) => PhaseOutcome {
                phase,
                passed: true,
                detail,
            },
            Err(detail) => PhaseOutcome {
                phase,
                passed: false,
                detail,
            },
        };
        if outcome.passed {
            info!(link = %format!("{a}-{b}"), "{phase}: ok");
        } else {
            warn!(link = %format!("{a}-{b}"), "{phase}: {}", outcome.detail);
        }
        outcomes.push(outcome);
    };

    record(Phase::Baseline, wait_for_path(ctx, s, s.primary_via, "link up"));

    let down = ctx
        .net
        .set_link_state(a, b, false)
        .map(|()| format!("{a}-{b} down"))
        .map_err(|e| format!("could not take {a}-{b} down: {e:#}"));
    let link_went_down = down.is_ok();
    record(Phase::LinkDown, down);

    if link_went_down {
        record(
            Phase::Rerouted,
            wait_for_path(ctx, s, s.backup_via, "link down"),
        );
        record(Phase::ReachableWhileDown, wait_for_full_reachability(ctx));
    }

    // Always restore, even if the guard has tripped.
    let up = ctx
        .net
        .set_link_state(a, b, true)
        .map(|()| format!("{a}-{b} up"))
        .map_err(|e| format!("could not bring {a}-{b} back up: {e:#}"));
    record(Phase::LinkUp, up);

    record(Phase::Restored, wait_for_path(ctx, s, s.primary_via, "link up"));
    record(Phase::ReachableAfterRestore, wait_for_full_reachability(ctx));

    outcomes
}

fn wait_for_path(
    ctx: &CheckContext<'_>,
    s: &FaultScenario,
    via: Ipv4Addr,
    state: &str,
) -> Result<String, String> {
    let cmd = traceroute_command(s.target);
    let hop = Pattern::address(via);
    let description = format!("({}) route to {} through {via} [{state}]", s.probe_node, s.target);
    poll_until(&ctx.config.reroute, ctx.guard, &description, || {
        let out = ctx.net.run(&s.probe_node, &cmd)?;
        Ok(Observation::new(hop.is_found(&out), excerpt(&out)))
    })
    .map_err(|e| describe_poll_error(&e, &format!("`{cmd}` does not pass through {via}")))
}

fn wait_for_full_reachability(ctx: &CheckContext<'_>) -> Result<String, String> {
    poll_until(&ctx.config.reroute, ctx.guard, "full reachability", || {
        let report = ping_all(ctx.net, ctx.topology, ctx.config.ping_timeout_secs, ctx.guard);
        Ok(Observation::new(report.is_clean(), report.summary()))
    })
    .map_err(|e| describe_poll_error(&e, "failed to maintain connectivity"))
}

fn describe_poll_error(err: &PollError, what: &str) -> String {
    match err {
        PollError::Timeout { elapsed, last, .. } => {
            format!("{what} after {:.1}s; observed: {last}", elapsed.as_secs_f64())
        }
        PollError::Aborted { reason, .. } => format!("{what}: {reason}"),
    }
}
