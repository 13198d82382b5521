use std::collections::BTreeMap;

use spans::{merge_intervals, select_non_overlapping, TimeRange, Window};

use crate::records::{group_by_trace, SpanRow};
use crate::stats;

/// Non-overlapping span windows of every trace.
///
/// Within each trace the longest spans are preferred; windows of different
/// traces may overlap each other. Windows of a trace are returned in start
/// time order.
pub fn span_windows(rows: &[SpanRow]) -> Vec<Window> {
    let mut windows = Vec::new();

    for (trace_id, group) in group_by_trace(rows) {
        let candidates: Vec<Window> =
            group.iter().map(|row| Window::from_span(&row.span)).collect();
        let mut accepted = select_non_overlapping(&candidates);
        accepted.sort_by_key(|&position| candidates[position].start());

        log::debug!(
            "Trace {}: selected {} of {} spans as windows",
            trace_id,
            accepted.len(),
            candidates.len()
        );
        windows.extend(accepted.into_iter().map(|position| candidates[position].clone()));
    }

    windows
}

/// One window per trace covering the union of its spans' non-idle intervals.
///
/// Overlapping and touching intervals are merged, so the window's segments
/// are the stretches during which some span of the trace was doing its own
/// work. Traces without any non-idle interval produce no window.
pub fn non_idle_windows(rows: &[SpanRow]) -> Vec<Window> {
    let mut windows = Vec::new();

    for (trace_id, group) in group_by_trace(rows) {
        let intervals = group
            .iter()
            .flat_map(|row| row.non_idle_intervals.iter().copied())
            .filter(|interval| !interval.is_empty())
            .collect();
        let merged = merge_intervals(intervals);

        match Window::new(trace_id, None, merged) {
            Ok(window) => windows.push(window),
            Err(err) => log::debug!("Trace {} has no non-idle window: {}", trace_id, err),
        }
    }

    windows
}

/// Keeps the windows whose segment count equals the median segment count.
///
/// The median is truncated to an integer, so when no window has exactly that
/// many segments the result is empty. Returns the median together with the
/// kept windows.
pub fn keep_median_segment_count(windows: &[Window]) -> (usize, Vec<&Window>) {
    let Some(median) = stats::median(windows.iter().map(|window| window.segments().len() as f64))
    else {
        return (0, Vec::new());
    };
    let median = median as usize;

    let mut distribution: BTreeMap<usize, usize> = BTreeMap::new();
    for window in windows {
        *distribution.entry(window.segments().len()).or_default() += 1;
    }
    log::info!(
        "Segment counts per window (count: windows): {:?}, using windows with {} segments",
        distribution,
        median
    );

    let kept: Vec<&Window> = windows
        .iter()
        .filter(|window| window.segments().len() == median)
        .collect();
    if kept.len() < windows.len() {
        log::info!(
            "Dropped {} of {} windows with a different segment count",
            windows.len() - kept.len(),
            windows.len()
        );
    }

    (median, kept)
}

/// Median duration of one segment slot across windows
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlotDuration {
    pub slot: usize,
    pub median_duration: f64,
    pub windows: usize,
}

/// Median duration of each segment slot over `windows`.
///
/// All windows must have the same number of segments; callers get such a
/// set from [`keep_median_segment_count`].
pub fn slot_median_durations(windows: &[&Window]) -> Vec<SlotDuration> {
    let slots = windows.first().map_or(0, |window| window.segments().len());

    (0..slots)
        .filter_map(|slot| {
            let median = stats::median(
                windows
                    .iter()
                    .filter_map(|window| window.segments().get(slot))
                    .map(|segment| segment.duration() as f64),
            )?;
            Some(SlotDuration {
                slot,
                median_duration: median,
                windows: windows.len(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use spans::{Interval, Span};

    fn row(trace_id: &str, span_id: &str, start: i64, duration: i64) -> SpanRow {
        SpanRow::new(Span::new(trace_id, span_id, "svc", "op", start, duration))
    }

    fn non_idle_row(trace_id: &str, intervals: &[(i64, i64)]) -> SpanRow {
        let mut row = row(trace_id, "s", 0, 0);
        row.non_idle_intervals = intervals
            .iter()
            .map(|&(start, end)| Interval { start, end })
            .collect();
        row
    }

    fn window(segments: &[(i64, i64)]) -> Window {
        Window::new(
            "t",
            None,
            segments
                .iter()
                .map(|&(start, end)| Interval { start, end })
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_span_windows_are_disjoint_per_trace() {
        let rows = vec![
            row("a", "root", 0, 100),
            row("a", "child", 10, 20),
            row("a", "later", 150, 10),
            row("b", "other", 50, 5),
        ];

        let windows = span_windows(&rows);
        let ids: Vec<(&str, Option<&str>)> = windows
            .iter()
            .map(|window| (window.trace_id(), window.span_id()))
            .collect();
        assert_eq!(
            ids,
            vec![("a", Some("root")), ("a", Some("later")), ("b", Some("other"))]
        );
    }

    #[test]
    fn test_non_idle_windows_merge_spans_of_a_trace() {
        let rows = vec![
            non_idle_row("a", &[(0, 10), (40, 50)]),
            non_idle_row("a", &[(10, 20)]),
            non_idle_row("b", &[]),
        ];

        let windows = non_idle_windows(&rows);
        assert_eq!(windows.len(), 1);
        assert_eq!(
            windows[0].segments(),
            &[Interval { start: 0, end: 20 }, Interval { start: 40, end: 50 }]
        );
    }

    #[test]
    fn test_keep_median_segment_count() {
        let windows = vec![
            window(&[(0, 10)]),
            window(&[(0, 10), (20, 30)]),
            window(&[(0, 4), (20, 26)]),
        ];

        let (median, kept) = keep_median_segment_count(&windows);
        assert_eq!(median, 2);
        assert_eq!(kept.len(), 2);

        let durations = slot_median_durations(&kept);
        assert_eq!(
            durations,
            vec![
                SlotDuration {
                    slot: 0,
                    median_duration: 7.0,
                    windows: 2,
                },
                SlotDuration {
                    slot: 1,
                    median_duration: 8.0,
                    windows: 2,
                },
            ]
        );
    }

    #[test]
    fn test_truncated_median_may_keep_nothing() {
        let windows = vec![window(&[(0, 1)]), window(&[(0, 1), (2, 3), (4, 5), (6, 7)])];
        let (median, kept) = keep_median_segment_count(&windows);
        assert_eq!(median, 2);
        assert!(kept.is_empty());
        assert!(slot_median_durations(&kept).is_empty());
    }

    #[test]
    fn test_no_windows() {
        assert_eq!(keep_median_segment_count(&[]).0, 0);
    }
}
