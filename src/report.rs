//! Human and machine readable grading summaries.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{info, warn};

use crate::checks::CheckResult;
use crate::harness::{Grade, Outcome};

/// Log one section result as it completes.
pub fn log_section(result: &CheckResult) {
    if result.passed {
        info!("PASSED: {} check", result.name);
        return;
    }
    warn!("FAILED: {} check", result.name);
    for diag in &result.diagnostics {
        warn!("  {diag}");
    }
}

/// Log the end-of-run summary for assignment `id`.
pub fn log_summary(id: &str, outcome: &Outcome) {
    info!("({id}) *** Summary ***");
    for r in outcome.results.iter().filter(|r| !r.passed) {
        warn!("({id}) FAILED: {} check", r.name);
    }
    match &outcome.grade {
        Grade::Passed => info!("({id}) ALL PASSED"),
        Grade::Failed { .. } => warn!("({id}) FAILED"),
        Grade::TopologyMismatch { .. } => warn!("({id}) incorrect topology"),
        Grade::Aborted { reason } => warn!("({id}) ABORTED: {reason}"),
    }
}

/// JSON document written by `--report`.
#[derive(Debug, Serialize)]
pub struct GradeReport<'a> {
    pub assignment: &'a str,
    pub version: &'static str,
    pub exit_code: u8,
    pub grade: &'a Grade,
    pub results: &'a [CheckResult],
}

impl<'a> GradeReport<'a> {
    pub fn new(assignment: &'a str, outcome: &'a Outcome) -> Self {
        Self {
            assignment,
            version: env!("CARGO_PKG_VERSION"),
            exit_code: outcome.grade.exit_code(),
            grade: &outcome.grade,
            results: &outcome.results,
        }
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("serialize report")?;
        std::fs::write(path, json).with_context(|| format!("write report {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_json_shape() {
        let outcome = Outcome {
            grade: Grade::Failed {
                failed: vec!["Route".into()],
            },
            results: vec![
                CheckResult::pass("Topology"),
                CheckResult::fail("Route", "(r120) route to 10.4.1.0/25 does not pass through r110"),
            ],
        };
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        GradeReport::new("A0226581A", &outcome).write(&path).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["assignment"], "A0226581A");
        assert_eq!(value["exit_code"], 1);
        assert_eq!(value["grade"]["status"], "failed");
        assert_eq!(value["grade"]["failed"][0], "Route");
        assert_eq!(value["results"][1]["passed"], false);
        assert_eq!(value["results"].as_array().unwrap().len(), 2);
    }
}
