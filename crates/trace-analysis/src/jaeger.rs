use std::collections::HashMap;

use anyhow::{Context, Result};
use serde::Deserialize;
use spans::{RawSpan, ReferenceKind, Span, SpanReference};

/// Service name used when a span's process cannot be resolved
pub const UNKNOWN_SERVICE: &str = "unknown";

/// Operation name used when a span does not carry one
pub const UNKNOWN_OPERATION: &str = "unknown";

/// Body of a Jaeger query API trace response
#[derive(Debug, Deserialize)]
struct TraceResponse {
    #[serde(default)]
    data: Vec<JaegerTrace>,
}

#[derive(Debug, Deserialize)]
struct JaegerTrace {
    #[serde(rename = "traceID")]
    trace_id: String,
    #[serde(default)]
    spans: Vec<JaegerSpan>,
    #[serde(default)]
    processes: HashMap<String, JaegerProcess>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JaegerSpan {
    #[serde(rename = "traceID")]
    trace_id: Option<String>,
    #[serde(rename = "spanID")]
    span_id: String,
    #[serde(default = "unknown_operation")]
    operation_name: String,
    #[serde(default)]
    references: Vec<JaegerReference>,
    start_time: i64,
    duration: i64,
    #[serde(rename = "processID")]
    process_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JaegerReference {
    ref_type: String,
    #[serde(rename = "spanID")]
    span_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JaegerProcess {
    service_name: String,
}

fn unknown_operation() -> String {
    UNKNOWN_OPERATION.to_string()
}

/// Parses a saved Jaeger trace response into the raw spans of each trace.
///
/// The service of a span comes from the trace's process table. References of
/// an unrecognized type are dropped with a warning.
pub fn parse_traces(json: &str) -> Result<Vec<Vec<RawSpan>>> {
    let response: TraceResponse =
        serde_json::from_str(json).with_context(|| "Failed to parse Jaeger trace JSON")?;

    Ok(response.data.into_iter().map(convert_trace).collect())
}

fn convert_trace(trace: JaegerTrace) -> Vec<RawSpan> {
    let JaegerTrace {
        trace_id,
        spans,
        processes,
    } = trace;

    spans
        .into_iter()
        .map(|span| {
            let service = span
                .process_id
                .as_ref()
                .and_then(|process_id| processes.get(process_id))
                .map_or(UNKNOWN_SERVICE, |process| process.service_name.as_str());

            let references = span
                .references
                .iter()
                .filter_map(|reference| match reference.ref_type.parse::<ReferenceKind>() {
                    Ok(kind) => Some(SpanReference {
                        kind,
                        span_id: reference.span_id.clone(),
                    }),
                    Err(err) => {
                        log::warn!("Ignoring reference of span {}: {}", span.span_id, err);
                        None
                    }
                })
                .collect();

            RawSpan::new(
                Span::new(
                    span.trace_id.unwrap_or_else(|| trace_id.clone()),
                    span.span_id,
                    service,
                    span.operation_name,
                    span.start_time,
                    span.duration,
                ),
                references,
            )
        })
        .collect()
}
