use std::cmp::Reverse;

use clap::ValueEnum;
use counters::{CounterSet, CounterValues, Metric, SourceId};
use spans::{TimeRange, Window};
use thiserror::Error;

use crate::attribution::{busiest_source, window_activity};

/// Errors that can occur when ranking windows
#[derive(Error, Debug, PartialEq)]
pub enum RankError {
    /// At least one window has to be requested
    #[error("number of windows to rank must be at least 1, got {0}")]
    InvalidK(usize),
}

/// Which windows are eligible relative to the span of the counter data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum CoveragePolicy {
    /// Windows that overlap the counter data at all
    #[default]
    Overlapping,
    /// Only windows that lie entirely within the counter data
    Contained,
}

impl CoveragePolicy {
    fn admits(&self, window: &Window, (first, last): (i64, i64)) -> bool {
        match self {
            CoveragePolicy::Overlapping => window.start() <= last && window.end() >= first,
            CoveragePolicy::Contained => window.start() >= first && window.end() <= last,
        }
    }
}

/// Per-source sample counts with positive increments inside one window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceActivity {
    pub source: SourceId,
    /// Indexed by [`Metric::index`]
    pub non_zero: [usize; 3],
    /// Total instructions retired inside the window
    pub instructions: u64,
}

/// A window together with its activity score
#[derive(Debug, Clone, PartialEq)]
pub struct RankedWindow<'a> {
    /// 1-based position in the ranking
    pub rank: usize,
    /// Position of the window in the ranked input
    pub input_index: usize,
    pub window: &'a Window,
    /// Number of positive increments across all metrics and sources
    pub score: usize,
    /// Positive increments per metric, summed over sources
    pub non_zero: [usize; 3],
    /// Last minus first sample of each segment's boundary-extended query,
    /// summed over segments and sources
    pub totals: CounterValues,
    pub sources: Vec<SourceActivity>,
    /// Source that retired the most instructions inside the window
    pub instruction_source: Option<SourceId>,
}

impl RankedWindow<'_> {
    pub fn non_zero(&self, metric: Metric) -> usize {
        self.non_zero[metric.index()]
    }

    pub fn miss_rate(&self) -> f64 {
        self.totals.miss_rate()
    }
}

/// Ranks windows by how much sampled counter activity falls inside them
#[derive(Debug, Clone, Copy, Default)]
pub struct ResourceUsageRanker {
    coverage: CoveragePolicy,
}

impl ResourceUsageRanker {
    pub fn new(coverage: CoveragePolicy) -> Self {
        Self { coverage }
    }

    /// Returns the `k` windows with the most positive counter increments.
    ///
    /// Windows the coverage policy rejects are left out before ranking.
    /// Windows with equal scores keep their input order. Fewer than `k`
    /// windows are returned when fewer are eligible.
    pub fn rank<'a>(
        &self,
        windows: &'a [Window],
        counters: &CounterSet,
        k: usize,
    ) -> Result<Vec<RankedWindow<'a>>, RankError> {
        if k == 0 {
            return Err(RankError::InvalidK(k));
        }

        let Some(range) = counters.time_range() else {
            log::info!("No counter samples, nothing to rank");
            return Ok(Vec::new());
        };

        let mut candidates: Vec<RankedWindow<'a>> = windows
            .iter()
            .enumerate()
            .filter(|(_, window)| self.coverage.admits(window, range))
            .map(|(input_index, window)| score(input_index, window, counters))
            .collect();

        let excluded = windows.len() - candidates.len();
        if excluded > 0 {
            log::info!(
                "Excluded {} of {} windows outside the counter data [{}, {}]",
                excluded,
                windows.len(),
                range.0,
                range.1
            );
        }

        candidates.sort_by_key(|candidate| Reverse(candidate.score));
        candidates.truncate(k);
        for (position, candidate) in candidates.iter_mut().enumerate() {
            candidate.rank = position + 1;
        }

        Ok(candidates)
    }
}

fn score<'a>(input_index: usize, window: &'a Window, counters: &CounterSet) -> RankedWindow<'a> {
    let mut non_zero = [0usize; 3];
    let mut totals = CounterValues::default();
    let mut sources = Vec::with_capacity(counters.len());

    for series in counters.iter() {
        let mut activity = SourceActivity {
            source: series.source().clone(),
            non_zero: [0; 3],
            instructions: window_activity(series, window, Metric::Instructions),
        };
        for segment in window.segments() {
            totals.add(&series.delta(segment.start, segment.end));
            for (_, values) in series.activity_in(segment.start, segment.end) {
                for metric in Metric::ALL {
                    if values.get(metric) > 0 {
                        activity.non_zero[metric.index()] += 1;
                    }
                }
            }
        }
        for metric in Metric::ALL {
            non_zero[metric.index()] += activity.non_zero[metric.index()];
        }
        sources.push(activity);
    }

    RankedWindow {
        rank: 0,
        input_index,
        window,
        score: non_zero.iter().sum(),
        non_zero,
        totals,
        sources,
        instruction_source: busiest_source(window, counters, Metric::Instructions)
            .map(|series| series.source().clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use counters::{CounterSample, CounterSeries};
    use spans::Interval;

    fn window(trace_id: &str, start: i64, end: i64) -> Window {
        Window::new(trace_id, None, vec![Interval { start, end }]).unwrap()
    }

    fn counters(readings: &[(i64, u64, u64, u64)]) -> CounterSet {
        vec![CounterSeries::from_deltas(
            SourceId::from("core0"),
            readings
                .iter()
                .map(|&(timestamp, loads, misses, instructions)| {
                    CounterSample::new(timestamp, CounterValues::new(loads, misses, instructions))
                })
                .collect(),
        )]
        .into_iter()
        .collect()
    }

    fn trace_ids<'a>(ranked: &[RankedWindow<'a>]) -> Vec<&'a str> {
        ranked.iter().map(|ranked| ranked.window.trace_id()).collect()
    }

    #[test]
    fn test_rank_orders_by_score() {
        let windows = vec![window("quiet", 0, 10), window("busy", 20, 30), window("mid", 40, 50)];
        let counters = counters(&[(5, 1, 0, 0), (25, 1, 1, 1), (26, 1, 0, 0), (45, 1, 1, 0)]);

        let ranked = ResourceUsageRanker::default().rank(&windows, &counters, 2).unwrap();
        assert_eq!(trace_ids(&ranked), vec!["busy", "mid"]);
        assert_eq!(ranked[0].score, 4);
        assert_eq!(ranked[0].rank, 1);
        assert_eq!(ranked[0].input_index, 1);
        assert_eq!(ranked[0].non_zero(Metric::LlcLoads), 2);
        assert_eq!(ranked[0].instruction_source, Some(SourceId::from("core0")));
        assert_eq!(ranked[0].totals, CounterValues::new(1, 0, 0));
        assert_eq!(ranked[0].miss_rate(), 0.0);
        assert_eq!(ranked[1].score, 2);
        assert_eq!(ranked[1].instruction_source, None);
    }

    #[test]
    fn test_ties_keep_input_order() {
        let windows = vec![window("first", 0, 10), window("second", 20, 30)];
        let counters = counters(&[(5, 1, 0, 0), (25, 1, 0, 0)]);

        let ranked = ResourceUsageRanker::default().rank(&windows, &counters, 5).unwrap();
        assert_eq!(trace_ids(&ranked), vec!["first", "second"]);
    }

    #[test]
    fn test_windows_outside_counter_data_are_excluded() {
        let windows = vec![
            window("before", 0, 5),
            window("partial", 5, 15),
            window("inside", 12, 18),
            window("after", 30, 40),
        ];
        let counters = counters(&[(10, 1, 0, 0), (20, 1, 0, 0)]);

        let overlapping = ResourceUsageRanker::new(CoveragePolicy::Overlapping)
            .rank(&windows, &counters, 10)
            .unwrap();
        assert_eq!(trace_ids(&overlapping), vec!["partial", "inside"]);

        let contained = ResourceUsageRanker::new(CoveragePolicy::Contained)
            .rank(&windows, &counters, 10)
            .unwrap();
        assert_eq!(trace_ids(&contained), vec!["inside"]);
        assert_eq!(contained[0].score, 0);
    }

    #[test]
    fn test_zero_k_is_rejected() {
        let result = ResourceUsageRanker::default().rank(&[], &CounterSet::new(), 0);
        assert_eq!(result, Err(RankError::InvalidK(0)));
    }

    #[test]
    fn test_no_counter_data_ranks_nothing() {
        let windows = vec![window("t", 0, 10)];
        let ranked = ResourceUsageRanker::default()
            .rank(&windows, &CounterSet::new(), 3)
            .unwrap();
        assert!(ranked.is_empty());
    }

    #[test]
    fn test_totals_use_boundary_extended_difference() {
        let counters: CounterSet = vec![CounterSeries::from_cumulative(
            SourceId::from("core0"),
            vec![
                CounterSample::new(0, CounterValues::new(0, 0, 0)),
                CounterSample::new(100, CounterValues::new(100, 90, 0)),
                CounterSample::new(200, CounterValues::new(200, 95, 0)),
            ],
        )]
        .into_iter()
        .collect();
        let windows = vec![window("between", 50, 150), window("spanning", 0, 200)];

        testing_logger::setup();
        let ranked = ResourceUsageRanker::default().rank(&windows, &counters, 2).unwrap();
        testing_logger::validate(|captured_logs| {
            let extensions = captured_logs
                .iter()
                .filter(|log| log.body.starts_with("Extended samples of source core0"))
                .count();
            assert_eq!(extensions, 1);
        });

        assert_eq!(trace_ids(&ranked), vec!["spanning", "between"]);
        assert_eq!(ranked[0].totals, CounterValues::new(200, 95, 0));
        assert_eq!(ranked[0].miss_rate(), 0.475);

        let between = &ranked[1];
        assert_eq!(between.non_zero(Metric::LlcLoads), 1);
        assert_eq!(between.totals, CounterValues::default());
        assert_eq!(between.miss_rate(), 0.0);
    }
}
