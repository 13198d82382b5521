use std::fmt;

use crate::Error;

/// Separator between intervals in the serialized form
pub const INTERVAL_SEPARATOR: char = ';';

/// Separator between the start and end of one serialized interval
pub const BOUND_SEPARATOR: char = '-';

/// Anything that occupies a half-open `[start, end)` range of microseconds.
pub trait TimeRange {
    fn start(&self) -> i64;
    fn end(&self) -> i64;

    fn duration(&self) -> i64 {
        self.end() - self.start()
    }

    /// Whether the two ranges share at least one instant.
    fn overlaps<R: TimeRange + ?Sized>(&self, other: &R) -> bool {
        self.start() < other.end() && other.start() < self.end()
    }
}

/// Half-open `[start, end)` interval in microseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Interval {
    pub start: i64,
    pub end: i64,
}

impl Interval {
    /// Creates an interval, rejecting ones that end before they start.
    pub fn new(start: i64, end: i64) -> Result<Self, Error> {
        if end < start {
            return Err(Error::InvertedInterval(start, end));
        }
        Ok(Self { start, end })
    }

    /// Whether the half-open interval contains no instant.
    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }
}

impl TimeRange for Interval {
    fn start(&self) -> i64 {
        self.start
    }

    fn end(&self) -> i64 {
        self.end
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.start, BOUND_SEPARATOR, self.end)
    }
}

/// Parses a `"start-end;start-end"` list.
///
/// Malformed segments are skipped with a warning; this never fails.
pub fn parse_intervals(text: &str) -> Vec<Interval> {
    let mut intervals = Vec::new();

    for segment in text.split(INTERVAL_SEPARATOR) {
        let segment = segment.trim();
        if segment.is_empty() {
            continue;
        }

        match parse_interval(segment) {
            Some(interval) => intervals.push(interval),
            None => log::warn!("Skipping malformed interval segment: {:?}", segment),
        }
    }

    intervals
}

fn parse_interval(segment: &str) -> Option<Interval> {
    let (start, end) = segment.split_once(BOUND_SEPARATOR)?;
    let start = start.trim().parse::<i64>().ok()?;
    let end = end.trim().parse::<i64>().ok()?;
    Interval::new(start, end).ok()
}

/// Joins intervals into the form accepted by [`parse_intervals`].
pub fn format_intervals(intervals: &[Interval]) -> String {
    intervals
        .iter()
        .map(Interval::to_string)
        .collect::<Vec<_>>()
        .join(&INTERVAL_SEPARATOR.to_string())
}

/// Sorts intervals and merges the ones that overlap or touch.
pub fn merge_intervals(mut intervals: Vec<Interval>) -> Vec<Interval> {
    intervals.sort();

    let mut merged: Vec<Interval> = Vec::with_capacity(intervals.len());
    for interval in intervals {
        match merged.last_mut() {
            Some(current) if interval.start <= current.end => {
                current.end = current.end.max(interval.end);
            }
            _ => merged.push(interval),
        }
    }

    merged
}
