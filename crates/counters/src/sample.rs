use std::collections::BTreeMap;

use crate::Metric;

/// One value per tracked counter
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CounterValues {
    /// Last-level cache loads
    pub llc_loads: u64,
    /// Last-level cache misses
    pub llc_misses: u64,
    /// Retired instructions
    pub instructions: u64,
}

impl CounterValues {
    pub fn new(llc_loads: u64, llc_misses: u64, instructions: u64) -> Self {
        Self {
            llc_loads,
            llc_misses,
            instructions,
        }
    }

    pub fn get(&self, metric: Metric) -> u64 {
        match metric {
            Metric::LlcLoads => self.llc_loads,
            Metric::LlcMisses => self.llc_misses,
            Metric::Instructions => self.instructions,
        }
    }

    pub fn set(&mut self, metric: Metric, value: u64) {
        match metric {
            Metric::LlcLoads => self.llc_loads = value,
            Metric::LlcMisses => self.llc_misses = value,
            Metric::Instructions => self.instructions = value,
        }
    }

    /// Add another set of values to this one
    pub fn add(&mut self, other: &CounterValues) {
        self.llc_loads += other.llc_loads;
        self.llc_misses += other.llc_misses;
        self.instructions += other.instructions;
    }

    /// Per-counter difference, clamped at zero when a counter went backwards
    pub fn saturating_sub(&self, earlier: &CounterValues) -> CounterValues {
        CounterValues {
            llc_loads: self.llc_loads.saturating_sub(earlier.llc_loads),
            llc_misses: self.llc_misses.saturating_sub(earlier.llc_misses),
            instructions: self.instructions.saturating_sub(earlier.instructions),
        }
    }

    /// LLC misses per LLC load, 0 when there were no loads
    pub fn miss_rate(&self) -> f64 {
        if self.llc_loads == 0 {
            0.0
        } else {
            self.llc_misses as f64 / self.llc_loads as f64
        }
    }
}

/// Counter values observed at one instant, in microseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterSample {
    pub timestamp: i64,
    pub values: CounterValues,
}

impl CounterSample {
    pub fn new(timestamp: i64, values: CounterValues) -> Self {
        Self { timestamp, values }
    }

    pub fn get(&self, metric: Metric) -> u64 {
        self.values.get(metric)
    }

    /// Copy of this sample moved to `timestamp`
    pub fn with_timestamp(&self, timestamp: i64) -> Self {
        Self {
            timestamp,
            values: self.values,
        }
    }
}

/// One row of a long-form counter table: `(Time, Type, Frequency)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LongFormRecord {
    pub timestamp: i64,
    pub metric: Metric,
    pub value: u64,
}

/// Pivots long-form records into one row per timestamp.
///
/// The first record seen for a `(timestamp, metric)` pair wins; metrics with
/// no record at a timestamp are zero.
pub fn pivot_long_form(records: impl IntoIterator<Item = LongFormRecord>) -> Vec<CounterSample> {
    let mut rows: BTreeMap<i64, (CounterValues, [bool; 3])> = BTreeMap::new();

    for record in records {
        let (values, seen) = rows.entry(record.timestamp).or_default();
        if !seen[record.metric.index()] {
            values.set(record.metric, record.value);
            seen[record.metric.index()] = true;
        }
    }

    rows.into_iter()
        .map(|(timestamp, (values, _))| CounterSample::new(timestamp, values))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_miss_rate_without_loads_is_zero() {
        let values = CounterValues::new(0, 5, 10);
        assert_eq!(values.miss_rate(), 0.0);
        assert_eq!(CounterValues::new(4, 1, 0).miss_rate(), 0.25);
    }

    #[test]
    fn test_saturating_sub_clamps_resets() {
        let later = CounterValues::new(10, 2, 100);
        let earlier = CounterValues::new(4, 5, 40);
        assert_eq!(later.saturating_sub(&earlier), CounterValues::new(6, 0, 60));
    }

    #[test]
    fn test_pivot_long_form() {
        let records = vec![
            LongFormRecord {
                timestamp: 20,
                metric: Metric::LlcLoads,
                value: 7,
            },
            LongFormRecord {
                timestamp: 10,
                metric: Metric::Instructions,
                value: 300,
            },
            LongFormRecord {
                timestamp: 10,
                metric: Metric::LlcLoads,
                value: 3,
            },
            LongFormRecord {
                timestamp: 10,
                metric: Metric::LlcLoads,
                value: 99,
            },
        ];

        let samples = pivot_long_form(records);
        assert_eq!(
            samples,
            vec![
                CounterSample::new(10, CounterValues::new(3, 0, 300)),
                CounterSample::new(20, CounterValues::new(7, 0, 0)),
            ]
        );
    }
}
