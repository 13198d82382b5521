use std::fmt;
use std::ops::Range;

use crate::{CounterSample, CounterValues};

/// Identifies a monitored counter source, usually a CPU core
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SourceId(String);

impl SourceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SourceId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// How the values of loaded counter readings should be interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CounterKind {
    /// Monotonic running totals; activity is the difference between samples
    #[default]
    Cumulative,
    /// Counts accumulated since the previous reading
    Delta,
}

/// Time-ordered cumulative counter samples of one source.
///
/// Besides the cumulative samples, the series keeps the increment that each
/// sample contributed since the previous one. For cumulative input the first
/// sample has no predecessor and contributes nothing; for delta input the
/// increments are exactly the loaded readings.
#[derive(Debug, Clone)]
pub struct CounterSeries {
    source: SourceId,
    samples: Vec<CounterSample>,
    increments: Vec<CounterValues>,
}

impl CounterSeries {
    /// Builds a series from readings in any order.
    ///
    /// Readings are sorted by timestamp; when several share a timestamp only
    /// the first one is kept.
    pub fn new(source: SourceId, mut readings: Vec<CounterSample>, kind: CounterKind) -> Self {
        readings.sort_by_key(|sample| sample.timestamp);
        let before = readings.len();
        readings.dedup_by_key(|sample| sample.timestamp);
        if readings.len() < before {
            log::debug!(
                "Dropped {} samples with duplicate timestamps from source {}",
                before - readings.len(),
                source
            );
        }

        let (samples, increments) = match kind {
            CounterKind::Cumulative => {
                let mut increments = Vec::with_capacity(readings.len());
                let mut resets = 0usize;
                for (position, sample) in readings.iter().enumerate() {
                    if position == 0 {
                        increments.push(CounterValues::default());
                        continue;
                    }
                    let previous = &readings[position - 1].values;
                    if went_backwards(&sample.values, previous) {
                        resets += 1;
                    }
                    increments.push(sample.values.saturating_sub(previous));
                }
                if resets > 0 {
                    log::debug!(
                        "Source {} has {} samples where a cumulative counter decreased",
                        source,
                        resets
                    );
                }
                (readings, increments)
            }
            CounterKind::Delta => {
                let mut running = CounterValues::default();
                let mut samples = Vec::with_capacity(readings.len());
                let mut increments = Vec::with_capacity(readings.len());
                for reading in readings {
                    running.add(&reading.values);
                    samples.push(CounterSample::new(reading.timestamp, running));
                    increments.push(reading.values);
                }
                (samples, increments)
            }
        };

        Self {
            source,
            samples,
            increments,
        }
    }

    pub fn from_cumulative(source: SourceId, samples: Vec<CounterSample>) -> Self {
        Self::new(source, samples, CounterKind::Cumulative)
    }

    pub fn from_deltas(source: SourceId, readings: Vec<CounterSample>) -> Self {
        Self::new(source, readings, CounterKind::Delta)
    }

    pub fn source(&self) -> &SourceId {
        &self.source
    }

    pub fn samples(&self) -> &[CounterSample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Timestamps of the first and last sample
    pub fn time_range(&self) -> Option<(i64, i64)> {
        Some((self.samples.first()?.timestamp, self.samples.last()?.timestamp))
    }

    /// Indices of the samples with `start <= timestamp <= end`
    fn range_indices(&self, start: i64, end: i64) -> Range<usize> {
        let lower = self.samples.partition_point(|sample| sample.timestamp < start);
        let upper = self.samples.partition_point(|sample| sample.timestamp <= end);
        lower..upper.max(lower)
    }

    /// Returns the samples with `start <= timestamp <= end`, extended so the
    /// result starts exactly at `start` and ends exactly at `end`.
    ///
    /// When the first real sample is later than `start`, a copy of it moved to
    /// `start` is prepended; likewise a copy of the last sample moved to `end`
    /// is appended. If no sample falls in the range at all, the sample nearest
    /// to the range is used for both boundaries. A single warning is logged
    /// whenever any extension happens.
    ///
    /// An empty series or a range with `start > end` yields no samples.
    pub fn query(&self, start: i64, end: i64) -> Vec<CounterSample> {
        if start > end {
            log::debug!("Ignoring inverted counter query [{}, {}]", start, end);
            return Vec::new();
        }
        if self.samples.is_empty() {
            log::warn!(
                "Source {} has no samples to answer query [{}, {}]",
                self.source,
                start,
                end
            );
            return Vec::new();
        }

        let mut result = self.samples[self.range_indices(start, end)].to_vec();
        let mut extended = false;

        match (result.first().copied(), result.last().copied()) {
            (Some(first), Some(last)) => {
                if first.timestamp > start {
                    result.insert(0, first.with_timestamp(start));
                    extended = true;
                }
                if last.timestamp < end {
                    result.push(last.with_timestamp(end));
                    extended = true;
                }
            }
            _ => {
                let nearest = self.nearest_outside(start, end);
                result.push(nearest.with_timestamp(start));
                result.push(nearest.with_timestamp(end));
                extended = true;
            }
        }

        if extended {
            log::warn!(
                "Extended samples of source {} to cover [{}, {}]",
                self.source,
                start,
                end
            );
        }

        result
    }

    /// Nearest sample to a range that contains no samples.
    fn nearest_outside(&self, start: i64, end: i64) -> CounterSample {
        let next = self.samples.partition_point(|sample| sample.timestamp < start);
        let before = next.checked_sub(1).map(|position| self.samples[position]);
        let after = self.samples.get(next).copied();

        match (before, after) {
            (Some(before), Some(after)) => {
                if after.timestamp - end < start - before.timestamp {
                    after
                } else {
                    before
                }
            }
            (Some(before), None) => before,
            (None, Some(after)) => after,
            (None, None) => unreachable!("nearest_outside called on an empty series"),
        }
    }

    /// Counter activity within `[start, end]`: last minus first sample of
    /// the extended query result.
    pub fn delta(&self, start: i64, end: i64) -> CounterValues {
        delta(&self.query(start, end))
    }

    /// Per-sample increments of the samples with `start <= timestamp <= end`.
    ///
    /// No boundary extension happens here; only real samples are yielded.
    pub fn activity_in(
        &self,
        start: i64,
        end: i64,
    ) -> impl Iterator<Item = (i64, &CounterValues)> + '_ {
        let range = if start > end {
            0..0
        } else {
            self.range_indices(start, end)
        };
        range.map(move |position| (self.samples[position].timestamp, &self.increments[position]))
    }
}

fn went_backwards(current: &CounterValues, previous: &CounterValues) -> bool {
    current.llc_loads < previous.llc_loads
        || current.llc_misses < previous.llc_misses
        || current.instructions < previous.instructions
}

/// Difference between the last and first of `samples`.
///
/// Fewer than two samples means no measurable activity, which is zero.
pub fn delta(samples: &[CounterSample]) -> CounterValues {
    match (samples.first(), samples.last()) {
        (Some(first), Some(last)) if samples.len() > 1 => last.values.saturating_sub(&first.values),
        _ => CounterValues::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Metric;
    use rstest::rstest;

    fn sample(timestamp: i64, loads: u64, misses: u64, instructions: u64) -> CounterSample {
        CounterSample::new(timestamp, CounterValues::new(loads, misses, instructions))
    }

    fn series() -> CounterSeries {
        CounterSeries::from_cumulative(
            SourceId::from("core0"),
            vec![
                sample(100, 10, 1, 1000),
                sample(200, 20, 3, 1500),
                sample(300, 35, 4, 2600),
                sample(400, 35, 4, 2600),
            ],
        )
    }

    fn warning_count(captured_logs: &[testing_logger::CapturedLog]) -> usize {
        captured_logs
            .iter()
            .filter(|log| log.level == log::Level::Warn)
            .count()
    }

    #[test]
    fn test_query_inside_range_needs_no_extension() {
        testing_logger::setup();

        let result = series().query(100, 300);
        assert_eq!(result.len(), 3);
        assert_eq!(result[0].timestamp, 100);
        assert_eq!(result[2].timestamp, 300);

        testing_logger::validate(|captured_logs| {
            assert_eq!(warning_count(captured_logs), 0);
        });
    }

    #[test]
    fn test_query_extends_both_boundaries() {
        testing_logger::setup();

        let result = series().query(150, 250);
        assert_eq!(
            result,
            vec![
                sample(150, 20, 3, 1500),
                sample(200, 20, 3, 1500),
                sample(250, 20, 3, 1500),
            ]
        );

        testing_logger::validate(|captured_logs| {
            assert_eq!(warning_count(captured_logs), 1);
        });
    }

    #[rstest]
    #[case(1000, 2000, sample(400, 35, 4, 2600))]
    #[case(0, 50, sample(100, 10, 1, 1000))]
    #[case(210, 220, sample(200, 20, 3, 1500))]
    #[case(280, 290, sample(300, 35, 4, 2600))]
    fn test_query_outside_samples_synthesizes_two_points(
        #[case] start: i64,
        #[case] end: i64,
        #[case] nearest: CounterSample,
    ) {
        testing_logger::setup();

        let result = series().query(start, end);
        assert_eq!(
            result,
            vec![nearest.with_timestamp(start), nearest.with_timestamp(end)]
        );

        testing_logger::validate(|captured_logs| {
            assert_eq!(warning_count(captured_logs), 1);
        });
    }

    #[test]
    fn test_delta_over_range() {
        let delta = series().delta(100, 300);
        assert_eq!(delta, CounterValues::new(25, 3, 1600));
        assert_eq!(delta.get(Metric::Instructions), 1600);
    }

    #[test]
    fn test_delta_of_single_or_no_sample_is_zero() {
        assert_eq!(delta(&[]), CounterValues::default());
        assert_eq!(delta(&[sample(5, 9, 9, 9)]), CounterValues::default());
        // Window outside the data: both synthesized points carry the same values
        assert_eq!(series().delta(1000, 2000), CounterValues::default());
        assert_eq!(series().delta(1000, 2000).miss_rate(), 0.0);
    }

    #[test]
    fn test_cumulative_increments() {
        let series = series();
        let activity: Vec<(i64, u64)> = series
            .activity_in(0, 1000)
            .map(|(timestamp, values)| (timestamp, values.get(Metric::LlcLoads)))
            .collect();
        assert_eq!(activity, vec![(100, 0), (200, 10), (300, 15), (400, 0)]);
    }

    #[test]
    fn test_delta_readings_are_prefix_summed() {
        let series = CounterSeries::from_deltas(
            SourceId::from("core1"),
            vec![sample(20, 5, 1, 50), sample(10, 2, 0, 20)],
        );

        assert_eq!(
            series.samples(),
            &[sample(10, 2, 0, 20), sample(20, 7, 1, 70)]
        );
        let increments: Vec<u64> = series
            .activity_in(10, 20)
            .map(|(_, values)| values.get(Metric::LlcLoads))
            .collect();
        assert_eq!(increments, vec![2, 5]);
    }

    #[test]
    fn test_duplicate_timestamps_keep_first() {
        let series = CounterSeries::from_cumulative(
            SourceId::from("core0"),
            vec![sample(10, 1, 1, 1), sample(10, 9, 9, 9), sample(20, 2, 2, 2)],
        );
        assert_eq!(series.len(), 2);
        assert_eq!(series.samples()[0], sample(10, 1, 1, 1));
    }

    #[test]
    fn test_empty_series_query() {
        let series = CounterSeries::from_cumulative(SourceId::from("core0"), vec![]);
        assert!(series.query(0, 10).is_empty());
        assert_eq!(series.time_range(), None);
        assert_eq!(series.activity_in(0, 10).count(), 0);
    }
}
