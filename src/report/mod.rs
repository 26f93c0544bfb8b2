//! Run reports produced by the driver.
//!
//! This module provides:
//! - `RunReport`: the machine-readable record of one pipeline run
//! - JSON output for tooling
//! - A Markdown summary for terminals and PR comments

pub mod env;
pub mod timing;

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

pub use env::EnvironmentInfo;
pub use timing::TimingStat;

use crate::BridgeResult;

/// Schema version for forward compatibility
pub const SCHEMA_VERSION: u32 = 1;

/// What the driver was asked to run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    /// Catalog index of the benchmark to run
    pub descriptor: usize,
    /// Which default parameter set to use
    pub default_set: usize,
    pub warmup_iterations: u32,
    pub measured_iterations: u32,
    /// Seed for the generated operand values
    pub seed: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        RunConfig {
            descriptor: 0,
            default_set: 0,
            warmup_iterations: 1,
            measured_iterations: 5,
            seed: 1,
        }
    }
}

impl RunConfig {
    pub fn from_toml_file(path: &Path) -> BridgeResult<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading run config {}", path.display()))?;
        Ok(toml::from_str(&text)?)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendInfo {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Outcome of checking decoded results against a host-side reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verification {
    pub passed: bool,
    pub result_samples: u64,
    pub max_abs_error: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub schema_version: u32,

    /// RFC 3339 timestamp
    pub timestamp: String,

    pub backend: BackendInfo,

    pub workload: String,
    pub category: String,
    pub scheme: String,
    pub security: String,

    /// Extended text from the backend
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,

    pub workload_params: BTreeMap<String, u64>,

    pub config: RunConfig,

    /// Timing of `operate`, the benchmarked call
    pub operate: TimingStat,

    pub verification: Verification,

    pub env: EnvironmentInfo,
}

impl RunReport {
    pub fn write_json(&self, path: &Path) -> BridgeResult<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self).context("serializing run report")?;
        std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    }

    pub fn read_json(path: &Path) -> BridgeResult<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Ok(serde_json::from_str::<RunReport>(&text).context("parsing run report")?)
    }
}

pub fn current_timestamp() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_default()
}

pub fn render_markdown(report: &RunReport) -> String {
    let mut out = String::new();
    let status = if report.verification.passed { "✅" } else { "❌" };

    out.push_str(&format!(
        "## {status} {} ({})\n\n",
        report.workload, report.category
    ));
    out.push_str(&format!(
        "| | |\n|---|---|\n\
         | **Backend** | `{}` {} |\n\
         | **Scheme / Security** | {} / {} |\n\
         | **Generated** | {} |\n\n",
        report.backend.name,
        report.backend.version.as_deref().unwrap_or("-"),
        report.scheme,
        report.security,
        report.timestamp
    ));

    if !report.workload_params.is_empty() {
        out.push_str("| Parameter | Value |\n|-----------|-------|\n");
        for (name, value) in &report.workload_params {
            out.push_str(&format!("| {name} | {value} |\n"));
        }
        out.push('\n');
    }

    let t = &report.operate;
    out.push_str("| operate | mean | median | min | max | p95 |\n");
    out.push_str("|---------|------|--------|-----|-----|-----|\n");
    out.push_str(&format!(
        "| {} iters | {:.3} ms | {} | {:.3} ms | {:.3} ms | {} |\n\n",
        t.iterations,
        t.mean_ms,
        fmt_opt_ms(t.median_ms),
        t.min_ms,
        t.max_ms,
        fmt_opt_ms(t.p95_ms)
    ));

    out.push_str(&format!(
        "Verification: {} result sample(s), max abs error {:e}\n",
        report.verification.result_samples, report.verification.max_abs_error
    ));
    out
}

fn fmt_opt_ms(v: Option<f64>) -> String {
    v.map_or_else(|| "-".to_string(), |v| format!("{v:.3} ms"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_report() -> RunReport {
        RunReport {
            schema_version: SCHEMA_VERSION,
            timestamp: current_timestamp(),
            backend: BackendInfo {
                name: "example".into(),
                version: Some("0.1.0".into()),
            },
            workload: "Matrix Multiplication".into(),
            category: "Latency".into(),
            scheme: "Plain".into(),
            security: "None".into(),
            description: String::new(),
            workload_params: BTreeMap::from([("rows_M0".to_string(), 4)]),
            config: RunConfig::default(),
            operate: TimingStat::from_samples(&[1.0, 2.0]),
            verification: Verification {
                passed: true,
                result_samples: 1,
                max_abs_error: 0.0,
            },
            env: EnvironmentInfo::default(),
        }
    }

    #[test]
    fn test_markdown_mentions_workload_and_params() {
        let md = render_markdown(&sample_report());
        assert!(md.contains("Matrix Multiplication (Latency)"));
        assert!(md.contains("| rows_M0 | 4 |"));
        assert!(md.contains("2 iters"));
    }

    #[test]
    fn test_run_config_defaults_fill_missing_keys() {
        let cfg: RunConfig = toml::from_str("measured_iterations = 9").unwrap();
        assert_eq!(cfg.measured_iterations, 9);
        assert_eq!(cfg.warmup_iterations, RunConfig::default().warmup_iterations);
    }

    #[test]
    fn test_timestamp_is_rfc3339() {
        let ts = current_timestamp();
        assert_eq!(&ts[10..11], "T");
        assert!(ts.ends_with('Z'));
    }
}
