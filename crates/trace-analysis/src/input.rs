use anyhow::{anyhow, Context, Result};
use arrow_array::{Array, ArrayRef, Int64Array, RecordBatch, StringArray};
use arrow_csv::reader::{Format, ReaderBuilder};
use arrow_schema::DataType;
use counters::{
    pivot_long_form, CounterKind, CounterSample, CounterSeries, CounterSet, CounterValues,
    LongFormRecord, Metric, SourceId,
};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use spans::{parse_intervals, Span};
use std::collections::{BTreeSet, HashMap};
use std::fs::File;
use std::io::Seek;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::jaeger::{UNKNOWN_OPERATION, UNKNOWN_SERVICE};
use crate::records::SpanRow;

/// Rows examined when inferring the schema of a CSV file
const SCHEMA_INFERENCE_ROWS: usize = 1000;

/// Whether a path names a Parquet file rather than CSV
pub fn is_parquet(path: &Path) -> bool {
    path.extension()
        .is_some_and(|extension| extension.eq_ignore_ascii_case("parquet"))
}

/// Reads a whole CSV or Parquet table
pub fn read_table(path: &Path) -> Result<Vec<RecordBatch>> {
    if is_parquet(path) {
        read_parquet(path)
    } else {
        read_csv(path)
    }
}

fn read_parquet(path: &Path) -> Result<Vec<RecordBatch>> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open input file: {}", path.display()))?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)
        .with_context(|| "Failed to create Parquet reader builder")?
        .build()
        .with_context(|| "Failed to build Arrow reader")?;

    reader
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("Failed to read record batch from {}", path.display()))
}

fn read_csv(path: &Path) -> Result<Vec<RecordBatch>> {
    let mut file = File::open(path)
        .with_context(|| format!("Failed to open input file: {}", path.display()))?;
    let (schema, _) = Format::default()
        .with_header(true)
        .infer_schema(&mut file, Some(SCHEMA_INFERENCE_ROWS))
        .with_context(|| format!("Failed to infer CSV schema of {}", path.display()))?;
    file.rewind()?;

    let reader = ReaderBuilder::new(Arc::new(schema))
        .with_header(true)
        .build(file)
        .with_context(|| "Failed to create CSV reader")?;

    reader
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("Failed to read record batch from {}", path.display()))
}

fn cast_column(batch: &RecordBatch, name: &str, data_type: &DataType) -> Result<Option<ArrayRef>> {
    match batch.column_by_name(name) {
        None => Ok(None),
        Some(column) => arrow_cast::cast(column.as_ref(), data_type)
            .map(Some)
            .with_context(|| format!("{} column cannot be read as {}", name, data_type)),
    }
}

/// An optional column coerced to Int64; unparsable values become null
fn int64_column(batch: &RecordBatch, name: &str) -> Result<Option<Int64Array>> {
    let Some(array) = cast_column(batch, name, &DataType::Int64)? else {
        return Ok(None);
    };
    let column = array
        .as_any()
        .downcast_ref::<Int64Array>()
        .ok_or_else(|| anyhow!("{} column is not Int64Array", name))?;
    Ok(Some(column.clone()))
}

/// An optional column coerced to Utf8
fn string_column(batch: &RecordBatch, name: &str) -> Result<Option<StringArray>> {
    let Some(array) = cast_column(batch, name, &DataType::Utf8)? else {
        return Ok(None);
    };
    let column = array
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| anyhow!("{} column is not StringArray", name))?;
    Ok(Some(column.clone()))
}

fn required<T>(column: Option<T>, name: &str, path: &Path) -> Result<T> {
    column.ok_or_else(|| anyhow!("{} column not found in {}", name, path.display()))
}

fn string_at(column: Option<&StringArray>, row: usize) -> Option<&str> {
    column.filter(|column| column.is_valid(row)).map(|column| column.value(row))
}

fn int_at(column: Option<&Int64Array>, row: usize) -> Option<i64> {
    column.filter(|column| column.is_valid(row)).map(|column| column.value(row))
}

/// Reads a span table.
///
/// `trace_id`, `span_id` and `start_time` are required, as is one of
/// `duration` or `end_time`. Rows with a missing required value are skipped
/// with a warning.
pub fn read_span_rows(path: &Path) -> Result<Vec<SpanRow>> {
    let mut rows = Vec::new();
    let mut skipped = 0usize;
    let mut negative = 0usize;

    for batch in read_table(path)? {
        let trace_ids = required(string_column(&batch, "trace_id")?, "trace_id", path)?;
        let span_ids = required(string_column(&batch, "span_id")?, "span_id", path)?;
        let start_times = required(int64_column(&batch, "start_time")?, "start_time", path)?;
        let durations = int64_column(&batch, "duration")?;
        let end_times = int64_column(&batch, "end_time")?;
        if durations.is_none() && end_times.is_none() {
            return Err(anyhow!(
                "neither duration nor end_time column found in {}",
                path.display()
            ));
        }
        let services = string_column(&batch, "service")?;
        let operations = string_column(&batch, "operation")?;
        let execution_times = int64_column(&batch, "non_idle_execution_time")?;
        let intervals = string_column(&batch, "non_idle_intervals")?;
        let containers = string_column(&batch, "container_name")?;

        for row in 0..batch.num_rows() {
            let trace_id = string_at(Some(&trace_ids), row).filter(|id| !id.is_empty());
            let span_id = string_at(Some(&span_ids), row).filter(|id| !id.is_empty());
            let start_time = int_at(Some(&start_times), row);
            let duration = int_at(durations.as_ref(), row).or_else(|| {
                Some(int_at(end_times.as_ref(), row)? - start_time?)
            });

            let (Some(trace_id), Some(span_id), Some(start_time), Some(duration)) =
                (trace_id, span_id, start_time, duration)
            else {
                skipped += 1;
                continue;
            };
            if duration < 0 {
                negative += 1;
                continue;
            }

            let span = Span::new(
                trace_id,
                span_id,
                string_at(services.as_ref(), row).unwrap_or(UNKNOWN_SERVICE),
                string_at(operations.as_ref(), row).unwrap_or(UNKNOWN_OPERATION),
                start_time,
                duration,
            );
            rows.push(SpanRow {
                span,
                non_idle_execution_time: int_at(execution_times.as_ref(), row),
                non_idle_intervals: string_at(intervals.as_ref(), row)
                    .map(parse_intervals)
                    .unwrap_or_default(),
                container_name: string_at(containers.as_ref(), row)
                    .filter(|name| !name.is_empty())
                    .map(str::to_string),
            });
        }
    }

    if skipped > 0 {
        log::warn!(
            "Skipped {} rows of {} with missing span fields",
            skipped,
            path.display()
        );
    }
    if negative > 0 {
        log::warn!(
            "Skipped {} rows of {} that end before they start",
            negative,
            path.display()
        );
    }
    log::info!("Read {} spans from {}", rows.len(), path.display());

    Ok(rows)
}

/// Reads a `container_name,service_name` table into a service to container map
pub fn read_container_mapping(path: &Path) -> Result<HashMap<String, String>> {
    let mut mapping = HashMap::new();

    for batch in read_table(path)? {
        let containers =
            required(string_column(&batch, "container_name")?, "container_name", path)?;
        let services = required(string_column(&batch, "service_name")?, "service_name", path)?;

        for row in 0..batch.num_rows() {
            if let (Some(container), Some(service)) =
                (string_at(Some(&containers), row), string_at(Some(&services), row))
            {
                mapping.insert(service.to_string(), container.to_string());
            }
        }
    }

    log::debug!("Loaded {} service to container mappings", mapping.len());
    Ok(mapping)
}

/// Counter source named by a table's file stem: the text after the last `_`
pub fn source_id_from_path(path: &Path) -> Option<SourceId> {
    let stem = path.file_stem()?.to_str()?;
    let id = stem.rsplit_once('_').map_or(stem, |(_, suffix)| suffix);
    (!id.is_empty()).then(|| SourceId::new(id))
}

fn non_negative(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

/// Reads one counter table, in long or wide form, as the series of `source`
pub fn read_counter_series(
    path: &Path,
    source: SourceId,
    kind: CounterKind,
) -> Result<CounterSeries> {
    let batches = read_table(path)?;
    let long_form = batches
        .first()
        .is_some_and(|batch| batch.schema().column_with_name("Type").is_some());

    let readings = if long_form {
        read_long_form(path, &batches)?
    } else {
        read_wide_form(path, &batches)?
    };
    log::debug!(
        "Read {} counter readings of source {} from {}",
        readings.len(),
        source,
        path.display()
    );

    Ok(CounterSeries::new(source, readings, kind))
}

fn read_long_form(path: &Path, batches: &[RecordBatch]) -> Result<Vec<CounterSample>> {
    let mut records = Vec::new();
    let mut unknown_types = BTreeSet::new();

    for batch in batches {
        let times = required(int64_column(batch, "Time")?, "Time", path)?;
        let types = required(string_column(batch, "Type")?, "Type", path)?;
        let values = required(int64_column(batch, "Frequency")?, "Frequency", path)?;

        for row in 0..batch.num_rows() {
            let (Some(timestamp), Some(type_name), Some(value)) = (
                int_at(Some(&times), row),
                string_at(Some(&types), row),
                int_at(Some(&values), row),
            ) else {
                continue;
            };
            match type_name.parse::<Metric>() {
                Ok(metric) => records.push(LongFormRecord {
                    timestamp,
                    metric,
                    value: non_negative(value),
                }),
                Err(_) => {
                    unknown_types.insert(type_name.to_string());
                }
            }
        }
    }

    if !unknown_types.is_empty() {
        log::warn!(
            "Skipped records with unknown counter types {:?} in {}",
            unknown_types,
            path.display()
        );
    }

    Ok(pivot_long_form(records))
}

fn read_wide_form(path: &Path, batches: &[RecordBatch]) -> Result<Vec<CounterSample>> {
    let mut samples = Vec::new();
    let mut missing: BTreeSet<&'static str> = BTreeSet::new();

    for batch in batches {
        let times = required(int64_column(batch, "Time")?, "Time", path)?;
        let mut columns = Vec::with_capacity(Metric::ALL.len());
        for metric in Metric::ALL {
            let column = int64_column(batch, metric.column_name())?;
            if column.is_none() {
                missing.insert(metric.column_name());
            }
            columns.push((metric, column));
        }

        for row in 0..batch.num_rows() {
            let Some(timestamp) = int_at(Some(&times), row) else {
                continue;
            };
            let mut values = CounterValues::default();
            for (metric, column) in &columns {
                values.set(*metric, int_at(column.as_ref(), row).map_or(0, non_negative));
            }
            samples.push(CounterSample::new(timestamp, values));
        }
    }

    if !missing.is_empty() {
        log::warn!(
            "Columns {:?} missing from {}, treating them as zero",
            missing,
            path.display()
        );
    }

    Ok(samples)
}

/// Reads every CSV or Parquet counter table in `dir`, one source per file
pub fn read_counter_dir(dir: &Path, kind: CounterKind) -> Result<CounterSet> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to list counter directory: {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|entry| entry.path()))
        .filter(|path| {
            path.is_file()
                && path.extension().is_some_and(|extension| {
                    extension.eq_ignore_ascii_case("csv")
                        || extension.eq_ignore_ascii_case("parquet")
                })
        })
        .collect();
    paths.sort();

    let mut set = CounterSet::new();
    for path in paths {
        let Some(source) = source_id_from_path(&path) else {
            log::warn!("Cannot derive a counter source from {}, skipping", path.display());
            continue;
        };
        set.insert(read_counter_series(&path, source, kind)?);
    }

    if set.is_empty() {
        log::warn!("No counter tables found in {}", dir.display());
    }

    Ok(set)
}
