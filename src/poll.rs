//! Bounded waiting for a live network to settle.
//!
//! Routing convergence is never signalled by the daemons, so every wait is a
//! poll: probe, sleep, repeat until the probe succeeds or a deadline passes.
//! Waits also stop early when the [`RunGuard`] is tripped.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::debug;

/// Why a grading run stopped before finishing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    Interrupted,
    DeadlineExceeded,
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortReason::Interrupted => write!(f, "interrupted"),
            AbortReason::DeadlineExceeded => write!(f, "run deadline exceeded"),
        }
    }
}

/// Cancellation flag plus an overall deadline for one grading run.
///
/// Cheap to clone; all clones share the flag.
#[derive(Debug, Clone)]
pub struct RunGuard {
    cancelled: Arc<AtomicBool>,
    deadline: Instant,
}

impl RunGuard {
    pub fn new(budget: Duration) -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            deadline: Instant::now() + budget,
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn check(&self) -> Result<(), AbortReason> {
        if self.cancelled.load(Ordering::Relaxed) {
            return Err(AbortReason::Interrupted);
        }
        if Instant::now() >= self.deadline {
            return Err(AbortReason::DeadlineExceeded);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    pub interval: Duration,
    pub timeout: Duration,
}

impl PollConfig {
    pub const fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }
}

#[derive(Debug, Error)]
pub enum PollError {
    #[error("{description}: not reached within {elapsed:?} (last observation: {last})")]
    Timeout {
        description: String,
        elapsed: Duration,
        last: String,
    },
    #[error("{description}: {reason}")]
    Aborted {
        description: String,
        reason: AbortReason,
    },
}

/// Outcome of one probe: whether the condition holds, and what was seen.
#[derive(Debug, Clone)]
pub struct Observation {
    pub satisfied: bool,
    pub detail: String,
}

impl Observation {
    pub fn new(satisfied: bool, detail: impl Into<String>) -> Self {
        Self {
            satisfied,
            detail: detail.into(),
        }
    }
}

/// Retry `probe` every `config.interval` until it is satisfied.
///
/// Probe errors count as "not yet" and are kept as the last observation, so
/// a flapping command cannot end the wait early. Returns the satisfying
/// observation's detail.
pub fn poll_until<F>(
    config: &PollConfig,
    guard: &RunGuard,
    description: &str,
    mut probe: F,
) -> Result<String, PollError>
where
    F: FnMut() -> anyhow::Result<Observation>,
{
    let start = Instant::now();
    let mut last = String::from("none");
    loop {
        guard.check().map_err(|reason| PollError::Aborted {
            description: description.to_string(),
            reason,
        })?;

        match probe() {
            Ok(obs) if obs.satisfied => {
                debug!(description, elapsed = ?start.elapsed(), "condition reached");
                return Ok(obs.detail);
            }
            Ok(obs) => last = obs.detail,
            Err(e) => last = format!("error: {e:#}"),
        }

        if start.elapsed() >= config.timeout {
            return Err(PollError::Timeout {
                description: description.to_string(),
                elapsed: start.elapsed(),
                last,
            });
        }
        thread::sleep(config.interval);
    }
}

/// Sample until `samples` consecutive observations are equal.
///
/// Returns the stable value. A failed sample resets the streak.
pub fn poll_until_stable<T, F>(
    config: &PollConfig,
    guard: &RunGuard,
    description: &str,
    samples: usize,
    mut sample: F,
) -> Result<T, PollError>
where
    T: PartialEq + fmt::Debug,
    F: FnMut() -> anyhow::Result<T>,
{
    let needed = samples.max(1);
    let mut previous: Option<T> = None;
    let mut streak = 0usize;

    let mut probe = || -> anyhow::Result<Observation> {
        let current = match sample() {
            Ok(v) => v,
            Err(e) => {
                previous = None;
                streak = 0;
                return Err(e);
            }
        };
        streak = match &previous {
            Some(prev) if *prev == current => streak + 1,
            _ => 1,
        };
        previous = Some(current);
        Ok(Observation::new(
            streak >= needed,
            format!("{streak}/{needed} identical samples"),
        ))
    };

    poll_until(config, guard, description, &mut probe)?;
    drop(probe);
    previous.ok_or_else(|| PollError::Timeout {
        description: description.to_string(),
        elapsed: Duration::ZERO,
        last: "no sample".into(),
    })
}
