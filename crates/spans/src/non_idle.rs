use crate::{Interval, Span};

/// The part of a span's duration spent on its own work.
///
/// Children that overlap in time are collapsed into clusters, and only the
/// longest child of each cluster is subtracted from the parent's duration.
/// This is the same accounting the tracing backend uses when it reports self
/// time, so the numbers line up with what the trace UI shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NonIdle {
    /// Span duration minus the duration of each cluster's longest child
    pub execution_time: i64,
    /// Sorted, disjoint gaps between the clusters' longest children
    pub intervals: Vec<Interval>,
}

impl NonIdle {
    /// Computes the non-idle time of `span` given its direct `children`.
    ///
    /// Children are ordered by start time; children with equal start times
    /// keep the order in which they were passed. When two children of the
    /// same cluster have the same duration, the first one in that order
    /// represents the cluster.
    pub fn compute(span: &Span, children: &[&Span]) -> Self {
        if children.is_empty() {
            return Self {
                execution_time: span.duration,
                intervals: non_empty(span.start_time, span.end_time()).into_iter().collect(),
            };
        }

        let mut sorted: Vec<&Span> = children.to_vec();
        sorted.sort_by_key(|child| child.start_time);

        let representatives = cluster_representatives(&sorted);

        let execution_time = span.duration
            - representatives
                .iter()
                .map(|child| child.duration)
                .sum::<i64>();

        let span_end = span.end_time();
        let mut intervals = Vec::with_capacity(representatives.len() + 1);
        let mut cursor = span.start_time;
        for child in &representatives {
            let gap_end = child.start_time.min(span_end);
            if let Some(interval) = non_empty(cursor, gap_end) {
                intervals.push(interval);
            }
            cursor = cursor.max(child.end_time());
        }
        if let Some(interval) = non_empty(cursor, span_end) {
            intervals.push(interval);
        }

        Self {
            execution_time,
            intervals,
        }
    }
}

/// Picks the longest child of each overlap cluster.
///
/// `sorted` must be ordered by start time. A new cluster starts whenever a
/// child starts at or after the furthest end time seen in the current one.
fn cluster_representatives<'a>(sorted: &[&'a Span]) -> Vec<&'a Span> {
    let mut representatives = Vec::new();

    let mut iter = sorted.iter();
    let Some(&first) = iter.next() else {
        return representatives;
    };

    let mut cluster_end = first.end_time();
    let mut representative = first;

    for &child in iter {
        if child.start_time < cluster_end {
            cluster_end = cluster_end.max(child.end_time());
            if child.duration > representative.duration {
                representative = child;
            }
        } else {
            representatives.push(representative);
            cluster_end = child.end_time();
            representative = child;
        }
    }
    representatives.push(representative);

    representatives
}

fn non_empty(start: i64, end: i64) -> Option<Interval> {
    (end > start).then_some(Interval { start, end })
}
