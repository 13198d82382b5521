use crate::{Error, Interval, Span, TimeRange};

/// A time range against which counter activity is queried.
///
/// A window is either one span's wall-clock range or a concatenation of
/// several disjoint segments, such as the non-idle intervals of a trace.
/// Segments are kept sorted and non-overlapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Window {
    trace_id: String,
    span_id: Option<String>,
    segments: Vec<Interval>,
}

impl Window {
    /// Creates a window from sorted, disjoint segments.
    pub fn new(
        trace_id: impl Into<String>,
        span_id: Option<String>,
        segments: Vec<Interval>,
    ) -> Result<Self, Error> {
        let trace_id = trace_id.into();
        if segments.is_empty() {
            return Err(Error::EmptyWindow(trace_id));
        }
        for pair in segments.windows(2) {
            if pair[1].start < pair[0].end {
                return Err(Error::UnorderedSegments {
                    previous_end: pair[0].end,
                    start: pair[1].start,
                });
            }
        }

        Ok(Self {
            trace_id,
            span_id,
            segments,
        })
    }

    /// A single-segment window covering the span's wall-clock range.
    pub fn from_span(span: &Span) -> Self {
        Self {
            trace_id: span.trace_id.clone(),
            span_id: Some(span.span_id.clone()),
            segments: vec![Interval {
                start: span.start_time,
                end: span.end_time(),
            }],
        }
    }

    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    pub fn span_id(&self) -> Option<&str> {
        self.span_id.as_deref()
    }

    pub fn segments(&self) -> &[Interval] {
        &self.segments
    }

    pub fn start_time(&self) -> i64 {
        self.segments[0].start
    }

    pub fn end_time(&self) -> i64 {
        self.segments[self.segments.len() - 1].end
    }

    /// Sum of the segment durations, excluding the gaps between them.
    pub fn active_duration(&self) -> i64 {
        self.segments.iter().map(|segment| segment.duration()).sum()
    }
}

impl TimeRange for Window {
    fn start(&self) -> i64 {
        self.start_time()
    }

    fn end(&self) -> i64 {
        self.end_time()
    }
}
