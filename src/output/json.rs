//! JSON output formatting
//!
//! One document per invocation: run info, the effective configuration and one
//! entry per paradigm that ran. Compare mode adds speedup, efficiency and the
//! deviation from the sequential baseline to each non-baseline entry.

use crate::compare::{Comparison, ComparisonEntry};
use crate::config::SimConfig;
use crate::report::{Outcome, Paradigm, RunReport};
use crate::util::time::format_duration;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::time::Duration;

/// Duration with both microseconds and human-readable format
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonDuration {
    pub micros: u64,
    pub human: String,
}

impl JsonDuration {
    pub fn from_duration(d: Duration) -> Self {
        Self {
            micros: d.as_micros() as u64,
            human: format_duration(d),
        }
    }
}

/// Where and when the run happened
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRunInfo {
    pub mode: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    /// RFC 3339, UTC
    pub timestamp: String,
    pub version: String,
}

/// One paradigm's result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRun {
    pub paradigm: Paradigm,
    pub workers: usize,
    pub rows: usize,
    pub cols: usize,
    pub rounds: u64,
    pub outcome: Outcome,
    pub elapsed: JsonDuration,
    pub rounds_per_sec: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speedup: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub efficiency: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_diff: Option<f64>,
    /// Final grid, one array per row
    pub grid: Vec<Vec<f64>>,
}

impl JsonRun {
    pub fn from_report(report: &RunReport) -> Self {
        let grid = &report.grid;
        Self {
            paradigm: report.paradigm,
            workers: report.workers,
            rows: grid.rows(),
            cols: grid.cols(),
            rounds: report.rounds,
            outcome: report.outcome,
            elapsed: JsonDuration::from_duration(report.elapsed),
            rounds_per_sec: report.rounds_per_sec(),
            speedup: None,
            efficiency: None,
            max_diff: None,
            grid: (0..grid.rows()).map(|r| grid.row(r).to_vec()).collect(),
        }
    }

    pub fn from_entry(entry: &ComparisonEntry) -> Self {
        Self {
            speedup: Some(entry.speedup),
            efficiency: Some(entry.efficiency),
            max_diff: Some(entry.max_diff),
            ..Self::from_report(&entry.report)
        }
    }
}

/// Complete JSON document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonOutput {
    pub info: JsonRunInfo,
    pub config: SimConfig,
    pub runs: Vec<JsonRun>,
}

pub fn build_run_info(mode: &str) -> JsonRunInfo {
    JsonRunInfo {
        mode: mode.to_string(),
        hostname: hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok()),
        timestamp: chrono::Utc::now().to_rfc3339(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    }
}

/// Document for a single run
pub fn build_report_output(mode: &str, config: &SimConfig, report: &RunReport) -> JsonOutput {
    JsonOutput {
        info: build_run_info(mode),
        config: config.clone(),
        runs: vec![JsonRun::from_report(report)],
    }
}

/// Document for a comparison; the baseline comes first
pub fn build_comparison_output(config: &SimConfig, comparison: &Comparison) -> JsonOutput {
    let mut runs = Vec::with_capacity(comparison.entries.len() + 1);
    runs.push(JsonRun::from_report(&comparison.baseline));
    runs.extend(comparison.entries.iter().map(JsonRun::from_entry));

    JsonOutput {
        info: build_run_info("compare"),
        config: config.clone(),
        runs,
    }
}

/// Write JSON output to file
pub fn write_json_output(output_path: &Path, output: &JsonOutput, pretty: bool) -> Result<()> {
    let file = File::create(output_path)
        .with_context(|| format!("Failed to create JSON output: {}", output_path.display()))?;
    let writer = BufWriter::new(file);

    if pretty {
        serde_json::to_writer_pretty(writer, output)?;
    } else {
        serde_json::to_writer(writer, output)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Grid;
    use tempfile::TempDir;

    fn report(paradigm: Paradigm, workers: usize, millis: u64) -> RunReport {
        RunReport {
            paradigm,
            workers,
            grid: Grid::new(3, 4, 1.5).unwrap(),
            rounds: 10,
            outcome: Outcome::IterationLimit { max_delta: 0.25 },
            elapsed: Duration::from_millis(millis),
        }
    }

    #[test]
    fn test_json_duration() {
        let d = JsonDuration::from_duration(Duration::from_micros(2500));
        assert_eq!(d.micros, 2500);
        assert_eq!(d.human, "2.50ms");
    }

    #[test]
    fn test_report_output_shape() {
        let out = build_report_output("sequential", &SimConfig::default(), &report(Paradigm::Sequential, 1, 20));
        let value = serde_json::to_value(&out).unwrap();

        assert_eq!(value["info"]["mode"], "sequential");
        let run = &value["runs"][0];
        assert_eq!(run["paradigm"], "sequential");
        assert_eq!(run["rounds"], 10);
        assert_eq!(run["outcome"]["kind"], "iteration_limit");
        assert_eq!(run["grid"].as_array().unwrap().len(), 3);
        assert_eq!(run["grid"][0].as_array().unwrap().len(), 4);
        assert!(run.get("speedup").is_none());
    }

    #[test]
    fn test_comparison_output() {
        let baseline = report(Paradigm::Sequential, 1, 40);
        let entry = ComparisonEntry::against(report(Paradigm::Parallel, 2, 20), &baseline);
        let comparison = Comparison {
            baseline,
            entries: vec![entry],
        };
        let out = build_comparison_output(&SimConfig::default(), &comparison);

        assert_eq!(out.runs.len(), 2);
        assert_eq!(out.runs[0].paradigm, Paradigm::Sequential);
        assert_eq!(out.runs[1].speedup, Some(2.0));
        assert_eq!(out.runs[1].efficiency, Some(1.0));
        assert_eq!(out.runs[1].max_diff, Some(0.0));
    }

    #[test]
    fn test_write_json_output() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.json");
        let out = build_report_output("parallel", &SimConfig::default(), &report(Paradigm::Parallel, 4, 5));

        write_json_output(&path, &out, true).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let parsed: JsonOutput = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed.runs[0].workers, 4);
        assert_eq!(parsed.config.grid.rows, SimConfig::default().grid.rows);
    }
}
