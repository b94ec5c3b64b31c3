//! Network behaviour grading library
//!
//! Builds a student's routed topology in Linux network namespaces, waits
//! for the routing daemons to converge, then runs named checks (structure,
//! protocol status, AS numbers, reachability, neighbours, fault tolerance,
//! metrics, route policy, restricted directives) by executing commands
//! inside nodes and evaluating predicates over their output.

pub mod assignment;
pub mod checks;
pub mod config;
pub mod fixtures;
pub mod frr;
pub mod harness;
pub mod live;
pub mod poll;
pub mod predicate;
pub mod report;

// Test helpers module - available when test-internals feature is enabled
#[cfg(any(test, feature = "test-internals"))]
pub mod test_helpers;

#[cfg(test)]
pub mod tests;

// Re-export commonly used items
pub use assignment::Assignment;
pub use checks::{CheckContext, CheckResult, Expectation, run_check};
pub use config::GraderConfig;
pub use fixtures::Fixtures;
pub use harness::{Grade, Outcome, Suite, grade_network, grade_suite, run, run_suite};
pub use live::LiveNetwork;
pub use poll::{PollConfig, PollError, RunGuard, poll_until, poll_until_stable};
pub use predicate::{Pattern, Predicate};
