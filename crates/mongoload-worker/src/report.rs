//! Report generation for workload runs

use std::fmt::Write as _;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::str::FromStr;

use mongoload_core::{Result, WorkloadError};

use crate::stats::{OperationStats, StatsSnapshot};

/// Report format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    Markdown,
    Json,
}

impl FromStr for ReportFormat {
    type Err = WorkloadError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "markdown" | "md" => Ok(Self::Markdown),
            "json" => Ok(Self::Json),
            other => Err(WorkloadError::Config(format!("unknown report format `{other}`"))),
        }
    }
}

/// Renders a [`StatsSnapshot`] as a human or machine readable report.
pub struct ReportWriter {
    scenario_name: String,
    snapshot: StatsSnapshot,
}

impl ReportWriter {
    pub fn new(scenario_name: impl Into<String>, snapshot: StatsSnapshot) -> Self {
        Self {
            scenario_name: scenario_name.into(),
            snapshot,
        }
    }

    pub fn snapshot(&self) -> &StatsSnapshot {
        &self.snapshot
    }

    pub fn render(&self, format: ReportFormat) -> Result<String> {
        match format {
            ReportFormat::Markdown => Ok(self.generate_markdown()),
            ReportFormat::Json => Ok(serde_json::to_string_pretty(&self.snapshot)?),
        }
    }

    /// Write report to file
    pub fn write_report(&self, path: impl AsRef<Path>, format: ReportFormat) -> Result<()> {
        let content = self.render(format)?;
        let mut file = File::create(path)?;
        file.write_all(content.as_bytes())?;
        Ok(())
    }

    fn row(out: &mut String, stats: &OperationStats) {
        let _ = writeln!(
            out,
            "| {} | {} | {} | {:.2}% | {:.1} | {} | {} | {} | {} |",
            stats.name,
            stats.num_requests,
            stats.num_failures,
            stats.fail_ratio() * 100.0,
            stats.avg_response_time_ms(),
            stats.p50(),
            stats.p95(),
            stats.p99(),
            stats.max_response_time_ms(),
        );
    }

    fn generate_markdown(&self) -> String {
        let snapshot = &self.snapshot;
        let mut out = String::new();

        let _ = writeln!(out, "# Workload Report: {}\n", self.scenario_name);
        let _ = writeln!(out, "- **Run**: {}", snapshot.run_id);
        let _ = writeln!(out, "- **Started**: {}", snapshot.started_at.to_rfc3339());
        let _ = writeln!(out, "- **Duration**: {:.1} seconds", snapshot.duration_secs);
        let _ = writeln!(out, "- **Requests**: {}", snapshot.total.num_requests);
        let _ = writeln!(out, "- **Failures**: {}", snapshot.total.num_failures);
        let _ = writeln!(out, "- **Throughput**: {:.1} req/s\n", snapshot.throughput_rps());

        out.push_str("## Operations\n\n");
        out.push_str(
            "| Name | Requests | Failures | Fail % | Avg (ms) | P50 | P95 | P99 | Max |\n",
        );
        out.push_str(
            "|------|----------|----------|--------|----------|-----|-----|-----|-----|\n",
        );
        for entry in &snapshot.entries {
            Self::row(&mut out, entry);
        }
        Self::row(&mut out, &snapshot.total);

        out.push_str("\n## Errors\n\n");
        if snapshot.errors.is_empty() {
            out.push_str("No errors\n");
        } else {
            for error in &snapshot.errors {
                let _ = writeln!(
                    out,
                    "- `{}` x{}: {}",
                    error.name, error.occurrences, error.error
                );
            }
        }

        out
    }
}
