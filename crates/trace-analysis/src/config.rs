use anyhow::{anyhow, Result};
use clap::ValueEnum;
use counters::CounterKind;
use std::path::{Path, PathBuf};

use crate::aligner::{WindowAligner, DEFAULT_SLOT_GAP};
use crate::attribution::{AllSources, BusiestSource, SourceAttribution};
use crate::ranker::{CoveragePolicy, ResourceUsageRanker};

/// Service whose traces table is used when the requested one does not exist
pub const DEFAULT_SERVICE_NAME: &str = "nginx-web-server";

/// Default number of windows reported by the ranking
pub const DEFAULT_TOP_K: usize = 10;

/// Time ranges that counter activity is attributed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum WindowMode {
    /// Non-overlapping spans of each trace, longest first
    #[default]
    Spans,
    /// The merged non-idle intervals of each trace
    NonIdle,
}

/// How instruction counts are attributed to windows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum InstructionAttribution {
    /// The source that retired the most instructions in the window
    #[default]
    Busiest,
    /// The sum over all sources
    AllSources,
}

impl InstructionAttribution {
    pub fn strategy(&self) -> Box<dyn SourceAttribution> {
        match self {
            InstructionAttribution::Busiest => Box::new(BusiestSource),
            InstructionAttribution::AllSources => Box::new(AllSources),
        }
    }
}

/// Interpretation of the values in counter tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum CounterValueKind {
    /// Running totals
    #[default]
    Cumulative,
    /// Counts since the previous sample
    Delta,
}

impl From<CounterValueKind> for CounterKind {
    fn from(kind: CounterValueKind) -> Self {
        match kind {
            CounterValueKind::Cumulative => CounterKind::Cumulative,
            CounterValueKind::Delta => CounterKind::Delta,
        }
    }
}

/// Locates the traces table of one experiment
#[derive(Debug, Clone)]
pub struct TraceTableLocator {
    pub dir: PathBuf,
    pub service: String,
    pub test_name: String,
    pub config: String,
    pub default_service: String,
}

impl TraceTableLocator {
    fn file_stem(&self, service: &str) -> String {
        format!(
            "{}_{}_{}_traces_data",
            service,
            self.test_name.replace(' ', "_"),
            self.config.replace(' ', "_")
        )
    }

    fn existing(&self, service: &str) -> Option<PathBuf> {
        let stem = self.file_stem(service);
        ["csv", "parquet"]
            .into_iter()
            .map(|extension| self.dir.join(format!("{}.{}", stem, extension)))
            .find(|path| path.is_file())
    }

    /// Path of the service's traces table, or of the default service's table
    /// if the service has none.
    pub fn resolve(&self) -> Result<PathBuf> {
        if let Some(path) = self.existing(&self.service) {
            return Ok(path);
        }

        if self.service != self.default_service {
            if let Some(path) = self.existing(&self.default_service) {
                log::info!(
                    "No traces table for service {}, using {} of default service {}",
                    self.service,
                    path.display(),
                    self.default_service
                );
                return Ok(path);
            }
        }

        Err(anyhow!(
            "no traces table {}.{{csv,parquet}} in {}",
            self.file_stem(&self.service),
            self.dir.display()
        ))
    }
}

/// Settings of one analysis run, built once from the command line
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    /// Only spans of this container are analyzed, if set
    pub container_name: Option<String>,
    pub top_k: usize,
    pub slot_gap: i64,
    pub coverage: CoveragePolicy,
    pub counter_kind: CounterKind,
    pub window_mode: WindowMode,
    pub instruction_attribution: InstructionAttribution,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            container_name: None,
            top_k: DEFAULT_TOP_K,
            slot_gap: DEFAULT_SLOT_GAP,
            coverage: CoveragePolicy::default(),
            counter_kind: CounterKind::default(),
            window_mode: WindowMode::default(),
            instruction_attribution: InstructionAttribution::default(),
        }
    }
}

impl AnalysisConfig {
    pub fn aligner(&self) -> WindowAligner {
        WindowAligner::new()
            .with_slot_gap(self.slot_gap)
            .with_instruction_attribution(self.instruction_attribution.strategy())
    }

    pub fn ranker(&self) -> ResourceUsageRanker {
        ResourceUsageRanker::new(self.coverage)
    }
}

/// `<dir>/<name>_<label>.<extension>`
pub fn output_path(dir: &Path, name: &str, label: &str, extension: &str) -> PathBuf {
    dir.join(format!("{}_{}.{}", name, label.replace(' ', "_"), extension))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn locator(dir: PathBuf, service: &str) -> TraceTableLocator {
        TraceTableLocator {
            dir,
            service: service.to_string(),
            test_name: "mixed workload".to_string(),
            config: "baseline".to_string(),
            default_service: DEFAULT_SERVICE_NAME.to_string(),
        }
    }

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "trace-analysis-config-{}-{}",
            name,
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_resolve_prefers_requested_service() {
        let dir = scratch_dir("requested");
        for name in [
            "user-service_mixed_workload_baseline_traces_data.parquet",
            "nginx-web-server_mixed_workload_baseline_traces_data.csv",
        ] {
            std::fs::write(dir.join(name), "").unwrap();
        }

        let path = locator(dir.clone(), "user-service").resolve().unwrap();
        assert_eq!(
            path,
            dir.join("user-service_mixed_workload_baseline_traces_data.parquet")
        );
    }

    #[test]
    fn test_resolve_falls_back_to_default_service() {
        testing_logger::setup();

        let dir = scratch_dir("fallback");
        let fallback = dir.join("nginx-web-server_mixed_workload_baseline_traces_data.csv");
        std::fs::write(&fallback, "").unwrap();

        let path = locator(dir.clone(), "user-service").resolve().unwrap();
        assert_eq!(path, fallback);

        testing_logger::validate(|captured_logs| {
            assert_eq!(captured_logs.len(), 1);
            assert_eq!(captured_logs[0].level, log::Level::Info);
        });
    }

    #[test]
    fn test_resolve_without_any_table() {
        let dir = scratch_dir("missing");
        assert!(locator(dir, "user-service").resolve().is_err());
    }

    #[test]
    fn test_output_path() {
        assert_eq!(
            output_path(Path::new("out"), "top_windows", "high load", "csv"),
            PathBuf::from("out/top_windows_high_load.csv")
        );
    }
}
