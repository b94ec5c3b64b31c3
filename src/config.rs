//! Grading run configuration.
//!
//! Timeouts and polling cadence for one run. Built from CLI flags; every
//! value has a default constant below.

use std::time::Duration;

use crate::poll::PollConfig;

/// How long routing may take to converge after the daemons start.
pub const DEFAULT_CONVERGENCE_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_CONVERGENCE_INTERVAL: Duration = Duration::from_secs(2);
/// Identical routing-table samples in a row that count as converged.
pub const DEFAULT_STABLE_SAMPLES: usize = 3;

/// How long a reroute (or restore) may take after a link changes state.
pub const DEFAULT_REROUTE_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_REROUTE_INTERVAL: Duration = Duration::from_secs(1);

pub const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 20;
/// Upper bound for a whole grading run, startup and teardown included.
pub const DEFAULT_RUN_TIMEOUT_SECS: u64 = 15 * 60;
/// Per-probe wait passed to `ping -W`.
pub const DEFAULT_PING_TIMEOUT_SECS: u64 = 1;

#[derive(Debug, Clone)]
pub struct GraderConfig {
    pub convergence: PollConfig,
    pub stable_samples: usize,
    pub reroute: PollConfig,
    pub command_timeout: Duration,
    pub run_timeout: Duration,
    pub ping_timeout_secs: u64,
    /// Prepended to node names to form namespace names.
    pub ns_prefix: String,
}

impl Default for GraderConfig {
    fn default() -> Self {
        Self {
            convergence: PollConfig::new(
                DEFAULT_CONVERGENCE_INTERVAL,
                Duration::from_secs(DEFAULT_CONVERGENCE_TIMEOUT_SECS),
            ),
            stable_samples: DEFAULT_STABLE_SAMPLES,
            reroute: PollConfig::new(
                DEFAULT_REROUTE_INTERVAL,
                Duration::from_secs(DEFAULT_REROUTE_TIMEOUT_SECS),
            ),
            command_timeout: Duration::from_secs(DEFAULT_COMMAND_TIMEOUT_SECS),
            run_timeout: Duration::from_secs(DEFAULT_RUN_TIMEOUT_SECS),
            ping_timeout_secs: DEFAULT_PING_TIMEOUT_SECS,
            ns_prefix: String::new(),
        }
    }
}

impl GraderConfig {
    /// Create config from CLI arguments (all in seconds).
    pub fn from_cli(
        convergence_timeout: u64,
        reroute_timeout: u64,
        command_timeout: u64,
        run_timeout: u64,
        ns_prefix: Option<String>,
    ) -> Self {
        let defaults = Self::default();
        Self {
            convergence: PollConfig::new(
                defaults.convergence.interval,
                Duration::from_secs(convergence_timeout),
            ),
            reroute: PollConfig::new(
                defaults.reroute.interval,
                Duration::from_secs(reroute_timeout),
            ),
            command_timeout: Duration::from_secs(command_timeout.max(1)),
            run_timeout: Duration::from_secs(run_timeout),
            ns_prefix: ns_prefix.unwrap_or_default(),
            ..defaults
        }
    }
}
