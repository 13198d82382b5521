//! # Spans
//!
//! Span trees and the time ranges derived from them.
//!
//! A trace fetched from a tracing backend is a flat list of spans with
//! `CHILD_OF` references. [`SpanTree::build`] turns that list into an arena of
//! spans with parent/child edges, and [`SpanTree::finalize`] computes, once
//! per span, the intervals during which the span was executing its own work
//! rather than waiting on its children (see [`NonIdle`]).
//!
//! The derived ranges are expressed as [`Window`]s, which is what the counter
//! analysis consumes. [`select_non_overlapping`] picks a non-overlapping subset
//! of candidate ranges, preferring the longest ones.

pub mod interval;
pub mod non_idle;
pub mod selector;
pub mod span;
pub mod tree;
pub mod window;

pub use interval::*;
pub use non_idle::*;
pub use selector::*;
pub use span::*;
pub use tree::*;
pub use window::*;

use thiserror::Error;

/// Errors that can occur while constructing span-derived ranges
#[derive(Error, Debug, PartialEq)]
pub enum Error {
    /// A window was constructed without any segments
    #[error("window for trace {0} has no segments")]
    EmptyWindow(String),

    /// Window segments must be sorted and must not overlap
    #[error("window segment at {start} starts before the previous one ends at {previous_end}")]
    UnorderedSegments { previous_end: i64, start: i64 },

    /// An interval whose end lies before its start
    #[error("interval end {1} precedes start {0}")]
    InvertedInterval(i64, i64),

    /// A reference type other than the ones the tracing backend emits
    #[error("unknown span reference type: {0}")]
    UnknownReferenceKind(String),
}
