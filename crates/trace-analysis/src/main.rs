use anyhow::{Context, Result};
use chrono::DateTime;
use clap::{Args, Parser, Subcommand};
use std::collections::HashMap;
use std::path::PathBuf;

use spans::{SpanTree, TimeRange, Window};

mod aligner;
mod attribution;
mod config;
mod input;
mod jaeger;
mod output;
mod ranker;
mod records;
mod stats;
mod windows;

use config::{
    output_path, AnalysisConfig, CounterValueKind, InstructionAttribution, TraceTableLocator,
    WindowMode, DEFAULT_SERVICE_NAME, DEFAULT_TOP_K,
};
use ranker::CoveragePolicy;
use records::{filter_container, span_rows};

#[derive(Parser)]
#[command(name = "trace-analysis")]
#[command(about = "Correlate distributed trace spans with sampled hardware counters")]
struct Cli {
    #[arg(short, long, global = true, help = "Enable debug logging")]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build a span table with non-idle intervals from saved Jaeger traces
    Spans(SpansArgs),
    /// Compute median durations of the non-idle interval slots of a span table
    NonIdleDurations(NonIdleDurationsArgs),
    /// Align and rank windows of a span table against counter tables
    Analyze(AnalyzeArgs),
}

#[derive(Args)]
struct SpansArgs {
    #[arg(required = true, help = "Jaeger trace JSON files")]
    traces: Vec<PathBuf>,

    #[arg(long, help = "Table mapping container_name to service_name")]
    container_config: Option<PathBuf>,

    #[arg(short, long, help = "Output span table (.csv or .parquet)")]
    output: PathBuf,
}

/// Where to find the span table, either directly or by experiment naming
#[derive(Args)]
struct TraceTableArgs {
    #[arg(long, help = "Span table to read, overrides the lookup by name")]
    traces_file: Option<PathBuf>,

    #[arg(long, default_value = ".", help = "Directory holding the traces tables")]
    traces_dir: PathBuf,

    #[arg(
        long,
        default_value = DEFAULT_SERVICE_NAME,
        help = "Service whose traces table is read"
    )]
    service: String,

    #[arg(
        long,
        default_value = DEFAULT_SERVICE_NAME,
        help = "Service used when the requested one has no traces table"
    )]
    default_service: String,

    #[arg(long, default_value = "", help = "Test name part of the traces table name")]
    test_name: String,

    #[arg(long, default_value = "", help = "Configuration part of the traces table name")]
    config: String,

    #[arg(long, help = "Only use spans of this container")]
    container_name: Option<String>,
}

impl TraceTableArgs {
    fn path(&self) -> Result<PathBuf> {
        match &self.traces_file {
            Some(path) => Ok(path.clone()),
            None => TraceTableLocator {
                dir: self.traces_dir.clone(),
                service: self.service.clone(),
                test_name: self.test_name.clone(),
                config: self.config.clone(),
                default_service: self.default_service.clone(),
            }
            .resolve(),
        }
    }

    /// Label used in output file names
    fn label(&self) -> String {
        if !self.config.is_empty() {
            return self.config.clone();
        }
        self.traces_file
            .as_ref()
            .and_then(|path| path.file_stem())
            .map_or_else(|| "traces".to_string(), |stem| stem.to_string_lossy().into_owned())
    }
}

#[derive(Args)]
struct NonIdleDurationsArgs {
    #[command(flatten)]
    table: TraceTableArgs,

    #[arg(short, long, help = "Output table (.csv or .parquet)")]
    output: PathBuf,
}

#[derive(Args)]
struct AnalyzeArgs {
    #[command(flatten)]
    table: TraceTableArgs,

    #[arg(long, help = "Directory of per-source counter tables")]
    counters_dir: PathBuf,

    #[arg(long, default_value = ".", help = "Directory for the output tables")]
    output_dir: PathBuf,

    #[arg(
        long,
        default_value = "csv",
        value_parser = ["csv", "parquet"],
        help = "Output table format"
    )]
    format: String,

    #[arg(
        short = 'k',
        long,
        default_value_t = DEFAULT_TOP_K,
        help = "Number of ranked windows to report"
    )]
    top_k: usize,

    #[arg(long, value_enum, default_value_t = WindowMode::Spans)]
    windows: WindowMode,

    #[arg(long, value_enum, default_value_t = CoveragePolicy::Overlapping)]
    coverage: CoveragePolicy,

    #[arg(long, value_enum, default_value_t = CounterValueKind::Cumulative)]
    counter_kind: CounterValueKind,

    #[arg(long, value_enum, default_value_t = InstructionAttribution::Busiest)]
    instruction_attribution: InstructionAttribution,

    #[arg(
        long,
        default_value_t = aligner::DEFAULT_SLOT_GAP,
        help = "Gap between segment slots on the combined timeline, in microseconds"
    )]
    slot_gap: i64,
}

impl AnalyzeArgs {
    fn config(&self) -> AnalysisConfig {
        AnalysisConfig {
            container_name: self.table.container_name.clone(),
            top_k: self.top_k,
            slot_gap: self.slot_gap,
            coverage: self.coverage,
            counter_kind: self.counter_kind.into(),
            window_mode: self.windows,
            instruction_attribution: self.instruction_attribution,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    match cli.command {
        Command::Spans(args) => run_spans(&args),
        Command::NonIdleDurations(args) => run_non_idle_durations(&args),
        Command::Analyze(args) => run_analyze(&args),
    }
}

/// Microsecond timestamp as RFC 3339, or the raw number if out of range
fn format_micros(micros: i64) -> String {
    DateTime::from_timestamp_micros(micros)
        .map_or_else(|| micros.to_string(), |time| time.to_rfc3339())
}

fn log_window_range(windows: &[Window]) {
    let start = windows.iter().map(|window| window.start()).min();
    let end = windows.iter().map(|window| window.end()).max();
    if let (Some(start), Some(end)) = (start, end) {
        log::info!(
            "{} windows between {} and {}",
            windows.len(),
            format_micros(start),
            format_micros(end)
        );
    }
}

fn run_spans(args: &SpansArgs) -> Result<()> {
    let containers = match &args.container_config {
        Some(path) => input::read_container_mapping(path)?,
        None => HashMap::new(),
    };

    let mut rows = Vec::new();
    for path in &args.traces {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read trace file: {}", path.display()))?;
        for trace in jaeger::parse_traces(&json)
            .with_context(|| format!("Invalid trace file: {}", path.display()))?
        {
            let tree = SpanTree::build(trace).finalize();
            rows.extend(span_rows(&tree, &containers));
        }
    }

    if rows.is_empty() {
        log::info!("No spans found in {} trace files", args.traces.len());
        return Ok(());
    }

    output::write_table(&args.output, &output::span_table(&rows)?)
}

fn run_non_idle_durations(args: &NonIdleDurationsArgs) -> Result<()> {
    let path = args.table.path()?;
    let rows = filter_container(
        input::read_span_rows(&path)?,
        args.table.container_name.as_deref(),
    );

    let windows = windows::non_idle_windows(&rows);
    let (median, kept) = windows::keep_median_segment_count(&windows);
    let durations = windows::slot_median_durations(&kept);
    if durations.is_empty() {
        log::info!("No non-idle intervals to summarize in {}", path.display());
        return Ok(());
    }

    let total: f64 = durations.iter().map(|duration| duration.median_duration).sum();
    log::info!(
        "{} traces with {} non-idle intervals, total median non-idle duration {}us",
        kept.len(),
        median,
        total
    );

    output::write_table(&args.output, &output::slot_durations_table(&durations)?)
}

fn run_analyze(args: &AnalyzeArgs) -> Result<()> {
    let config = args.config();
    let path = args.table.path()?;
    let label = args.table.label();

    let rows = filter_container(
        input::read_span_rows(&path)?,
        config.container_name.as_deref(),
    );
    let windows = match config.window_mode {
        WindowMode::Spans => windows::span_windows(&rows),
        WindowMode::NonIdle => windows::non_idle_windows(&rows),
    };
    log_window_range(&windows);

    let counters = input::read_counter_dir(&args.counters_dir, config.counter_kind)?;
    if let Some((start, end)) = counters.time_range() {
        log::info!(
            "{} counter sources between {} and {}",
            counters.len(),
            format_micros(start),
            format_micros(end)
        );
    }

    let alignment = config.aligner().align(&windows, &counters);
    if alignment.is_empty() {
        log::info!("No aligned counter activity to write");
    } else {
        log::info!(
            "Aligned {} windows over {} slots",
            alignment.windows,
            alignment.slots.len()
        );
        for metric in counters::Metric::ALL {
            log::debug!(
                "{}: {} non-empty bins",
                metric,
                alignment.statistics_for(metric).count()
            );
        }
        output::write_table(
            &output_path(&args.output_dir, "aligned_resource_usage", &label, &args.format),
            &output::binned_statistics_table(&alignment)?,
        )?;
    }

    let ranked = config.ranker().rank(&windows, &counters, config.top_k)?;
    if ranked.is_empty() {
        log::info!("No windows overlap the counter data");
        return Ok(());
    }
    for window in &ranked {
        log::debug!(
            "#{} trace {} score {} instructions from {}",
            window.rank,
            window.window.trace_id(),
            window.score,
            window
                .instruction_source
                .as_ref()
                .map_or("none", |source| source.as_str())
        );
    }

    output::write_table(
        &output_path(&args.output_dir, "top_windows", &label, &args.format),
        &output::ranked_windows_table(&ranked)?,
    )
}
