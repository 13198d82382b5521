use anyhow::{Context, Result};
use arrow_array::{ArrayRef, Float64Array, Int64Array, RecordBatch, StringArray, UInt64Array};
use arrow_schema::{DataType, Field, Schema, SchemaRef};
use parquet::arrow::ArrowWriter;
use spans::format_intervals;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use crate::aligner::Alignment;
use crate::input::is_parquet;
use crate::ranker::RankedWindow;
use crate::records::SpanRow;
use crate::windows::SlotDuration;
use counters::Metric;

/// Writes a batch as Parquet or CSV, depending on the file extension
pub fn write_table(path: &Path, batch: &RecordBatch) -> Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create output directory: {}", parent.display()))?;
    }
    let file = File::create(path)
        .with_context(|| format!("Failed to create output file: {}", path.display()))?;

    if is_parquet(path) {
        let mut writer = ArrowWriter::try_new(file, batch.schema(), None)
            .with_context(|| "Failed to create Arrow writer")?;
        writer
            .write(batch)
            .with_context(|| "Failed to write record batch")?;
        writer.close().with_context(|| "Failed to close writer")?;
    } else {
        let mut writer = arrow_csv::WriterBuilder::new().with_header(true).build(file);
        writer
            .write(batch)
            .with_context(|| "Failed to write record batch")?;
    }

    log::info!("Wrote {} rows to {}", batch.num_rows(), path.display());
    Ok(())
}

fn int64(values: impl IntoIterator<Item = i64>) -> ArrayRef {
    Arc::new(Int64Array::from_iter_values(values))
}

fn uint64(values: impl IntoIterator<Item = u64>) -> ArrayRef {
    Arc::new(UInt64Array::from_iter_values(values))
}

fn float64(values: impl IntoIterator<Item = f64>) -> ArrayRef {
    Arc::new(Float64Array::from_iter_values(values))
}

fn strings<'a>(values: impl IntoIterator<Item = Option<&'a str>>) -> ArrayRef {
    Arc::new(values.into_iter().collect::<StringArray>())
}

pub fn span_table_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("trace_id", DataType::Utf8, false),
        Field::new("span_id", DataType::Utf8, false),
        Field::new("service", DataType::Utf8, false),
        Field::new("operation", DataType::Utf8, false),
        Field::new("start_time", DataType::Int64, false),
        Field::new("end_time", DataType::Int64, false),
        Field::new("duration", DataType::Int64, false),
        Field::new("non_idle_execution_time", DataType::Int64, true),
        Field::new("non_idle_intervals", DataType::Utf8, false),
        Field::new("container_name", DataType::Utf8, true),
    ]))
}

/// One row per span, intervals formatted as `start-end;start-end`
pub fn span_table(rows: &[SpanRow]) -> Result<RecordBatch> {
    let intervals: Vec<String> = rows
        .iter()
        .map(|row| format_intervals(&row.non_idle_intervals))
        .collect();

    let columns: Vec<ArrayRef> = vec![
        strings(rows.iter().map(|row| Some(row.span.trace_id.as_str()))),
        strings(rows.iter().map(|row| Some(row.span.span_id.as_str()))),
        strings(rows.iter().map(|row| Some(row.span.service.as_str()))),
        strings(rows.iter().map(|row| Some(row.span.operation.as_str()))),
        int64(rows.iter().map(|row| row.span.start_time)),
        int64(rows.iter().map(|row| row.span.end_time())),
        int64(rows.iter().map(|row| row.span.duration)),
        Arc::new(
            rows.iter()
                .map(|row| row.non_idle_execution_time)
                .collect::<Int64Array>(),
        ),
        strings(intervals.iter().map(|text| Some(text.as_str()))),
        strings(rows.iter().map(|row| row.container_name.as_deref())),
    ];

    RecordBatch::try_new(span_table_schema(), columns)
        .with_context(|| "Failed to build span table")
}

pub fn binned_statistics_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("slot", DataType::UInt64, false),
        Field::new("metric", DataType::Utf8, false),
        Field::new("bin_index", DataType::UInt64, false),
        Field::new("relative_position", DataType::Float64, false),
        Field::new("timeline_bin", DataType::UInt64, false),
        Field::new("timeline_position", DataType::Float64, false),
        Field::new("value", DataType::Float64, false),
        Field::new("p25", DataType::Float64, false),
        Field::new("p75", DataType::Float64, false),
        Field::new("p99", DataType::Float64, false),
        Field::new("sample_count", DataType::UInt64, false),
    ]))
}

/// One row per non-empty bin of the alignment
pub fn binned_statistics_table(alignment: &Alignment) -> Result<RecordBatch> {
    let statistics = &alignment.statistics;
    let metrics: Vec<String> = statistics
        .iter()
        .map(|statistic| statistic.metric.to_string())
        .collect();

    let columns: Vec<ArrayRef> = vec![
        uint64(statistics.iter().map(|statistic| statistic.slot as u64)),
        strings(metrics.iter().map(|metric| Some(metric.as_str()))),
        uint64(statistics.iter().map(|statistic| statistic.bin_index as u64)),
        float64(statistics.iter().map(|statistic| statistic.relative_position)),
        uint64(statistics.iter().map(|statistic| statistic.timeline_bin as u64)),
        float64(statistics.iter().map(|statistic| statistic.timeline_position)),
        float64(statistics.iter().map(|statistic| statistic.summary.median)),
        float64(statistics.iter().map(|statistic| statistic.summary.p25)),
        float64(statistics.iter().map(|statistic| statistic.summary.p75)),
        float64(statistics.iter().map(|statistic| statistic.summary.p99)),
        uint64(statistics.iter().map(|statistic| statistic.summary.count as u64)),
    ];

    RecordBatch::try_new(binned_statistics_schema(), columns)
        .with_context(|| "Failed to build binned statistics table")
}

pub fn ranked_windows_schema() -> SchemaRef {
    let mut fields = vec![
        Field::new("rank", DataType::UInt64, false),
        Field::new("window_index", DataType::UInt64, false),
        Field::new("trace_id", DataType::Utf8, false),
        Field::new("span_id", DataType::Utf8, true),
        Field::new("start_time", DataType::Int64, false),
        Field::new("end_time", DataType::Int64, false),
        Field::new("segments", DataType::Utf8, false),
        Field::new("score", DataType::UInt64, false),
    ];
    for metric in Metric::ALL {
        fields.push(Field::new(
            format!("non_zero_{}", metric),
            DataType::UInt64,
            false,
        ));
    }
    for metric in Metric::ALL {
        fields.push(Field::new(format!("total_{}", metric), DataType::UInt64, false));
    }
    fields.push(Field::new("miss_rate", DataType::Float64, false));
    fields.push(Field::new("source_instructions", DataType::Utf8, false));
    fields.push(Field::new("instruction_source", DataType::Utf8, true));

    Arc::new(Schema::new(fields))
}

/// One row per ranked window.
///
/// `source_instructions` lists the instructions retired by each source inside
/// the window as `source=count` pairs separated by `;`.
pub fn ranked_windows_table(ranked: &[RankedWindow]) -> Result<RecordBatch> {
    let segments: Vec<String> = ranked
        .iter()
        .map(|ranked| format_intervals(ranked.window.segments()))
        .collect();
    let source_instructions: Vec<String> = ranked
        .iter()
        .map(|ranked| {
            ranked
                .sources
                .iter()
                .map(|activity| format!("{}={}", activity.source, activity.instructions))
                .collect::<Vec<_>>()
                .join(";")
        })
        .collect();

    let mut columns: Vec<ArrayRef> = vec![
        uint64(ranked.iter().map(|ranked| ranked.rank as u64)),
        uint64(ranked.iter().map(|ranked| ranked.input_index as u64)),
        strings(ranked.iter().map(|ranked| Some(ranked.window.trace_id()))),
        strings(ranked.iter().map(|ranked| ranked.window.span_id())),
        int64(ranked.iter().map(|ranked| ranked.window.start_time())),
        int64(ranked.iter().map(|ranked| ranked.window.end_time())),
        strings(segments.iter().map(|text| Some(text.as_str()))),
        uint64(ranked.iter().map(|ranked| ranked.score as u64)),
    ];
    for metric in Metric::ALL {
        columns.push(uint64(ranked.iter().map(|ranked| ranked.non_zero(metric) as u64)));
    }
    for metric in Metric::ALL {
        columns.push(uint64(ranked.iter().map(|ranked| ranked.totals.get(metric))));
    }
    columns.push(float64(ranked.iter().map(|ranked| ranked.miss_rate())));
    columns.push(strings(source_instructions.iter().map(|text| Some(text.as_str()))));
    columns.push(strings(
        ranked
            .iter()
            .map(|ranked| ranked.instruction_source.as_ref().map(|source| source.as_str())),
    ));

    RecordBatch::try_new(ranked_windows_schema(), columns)
        .with_context(|| "Failed to build ranked windows table")
}

pub fn slot_durations_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("slot", DataType::UInt64, false),
        Field::new("median_duration", DataType::Float64, false),
        Field::new("windows", DataType::UInt64, false),
    ]))
}

pub fn slot_durations_table(durations: &[SlotDuration]) -> Result<RecordBatch> {
    let columns: Vec<ArrayRef> = vec![
        uint64(durations.iter().map(|duration| duration.slot as u64)),
        float64(durations.iter().map(|duration| duration.median_duration)),
        uint64(durations.iter().map(|duration| duration.windows as u64)),
    ];

    RecordBatch::try_new(slot_durations_schema(), columns)
        .with_context(|| "Failed to build slot durations table")
}
