use std::str::FromStr;

use crate::{Error, TimeRange};

/// A timed operation within a distributed trace.
///
/// Times are in microseconds, as reported by the tracing backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    pub trace_id: String,
    pub span_id: String,
    pub service: String,
    pub operation: String,
    pub start_time: i64,
    pub duration: i64,
}

impl Span {
    pub fn new(
        trace_id: impl Into<String>,
        span_id: impl Into<String>,
        service: impl Into<String>,
        operation: impl Into<String>,
        start_time: i64,
        duration: i64,
    ) -> Self {
        Self {
            trace_id: trace_id.into(),
            span_id: span_id.into(),
            service: service.into(),
            operation: operation.into(),
            start_time,
            duration,
        }
    }

    pub fn end_time(&self) -> i64 {
        self.start_time + self.duration
    }
}

impl TimeRange for Span {
    fn start(&self) -> i64 {
        self.start_time
    }

    fn end(&self) -> i64 {
        self.end_time()
    }

    fn duration(&self) -> i64 {
        self.duration
    }
}

/// How a span relates to the span it references
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceKind {
    ChildOf,
    FollowsFrom,
}

impl FromStr for ReferenceKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CHILD_OF" => Ok(ReferenceKind::ChildOf),
            "FOLLOWS_FROM" => Ok(ReferenceKind::FollowsFrom),
            other => Err(Error::UnknownReferenceKind(other.to_string())),
        }
    }
}

/// A reference from one span to another span of the same trace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpanReference {
    pub kind: ReferenceKind,
    pub span_id: String,
}

impl SpanReference {
    pub fn child_of(span_id: impl Into<String>) -> Self {
        Self {
            kind: ReferenceKind::ChildOf,
            span_id: span_id.into(),
        }
    }
}

/// A span as fetched, before its references are resolved into tree edges
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawSpan {
    pub span: Span,
    pub references: Vec<SpanReference>,
}

impl RawSpan {
    pub fn new(span: Span, references: Vec<SpanReference>) -> Self {
        Self { span, references }
    }

    /// Creates a span with no references, i.e. a root.
    pub fn root(span: Span) -> Self {
        Self::new(span, Vec::new())
    }

    /// Creates a span that is a `CHILD_OF` `parent_span_id`.
    pub fn child_of(span: Span, parent_span_id: impl Into<String>) -> Self {
        Self::new(span, vec![SpanReference::child_of(parent_span_id)])
    }
}
