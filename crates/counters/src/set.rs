use std::collections::BTreeMap;

use crate::{CounterSeries, SourceId};

/// All counter series of one analysis run, keyed by source
#[derive(Debug, Clone, Default)]
pub struct CounterSet {
    series: BTreeMap<SourceId, CounterSeries>,
}

impl CounterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a series, replacing (and returning) any series of the same source
    pub fn insert(&mut self, series: CounterSeries) -> Option<CounterSeries> {
        let replaced = self.series.insert(series.source().clone(), series);
        if let Some(ref previous) = replaced {
            log::warn!("Replacing counter series of source {}", previous.source());
        }
        replaced
    }

    pub fn get(&self, source: &SourceId) -> Option<&CounterSeries> {
        self.series.get(source)
    }

    /// Iterates over the series in source order
    pub fn iter(&self) -> impl Iterator<Item = &CounterSeries> {
        self.series.values()
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// Earliest and latest sample timestamp across all sources
    pub fn time_range(&self) -> Option<(i64, i64)> {
        self.series
            .values()
            .filter_map(CounterSeries::time_range)
            .reduce(|(min, max), (start, end)| (min.min(start), max.max(end)))
    }
}

impl FromIterator<CounterSeries> for CounterSet {
    fn from_iter<I: IntoIterator<Item = CounterSeries>>(iter: I) -> Self {
        let mut set = CounterSet::new();
        for series in iter {
            set.insert(series);
        }
        set
    }
}
