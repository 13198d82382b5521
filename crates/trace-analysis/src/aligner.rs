use std::collections::BTreeMap;

use counters::{CounterSet, Metric};
use spans::{TimeRange, Window};

use crate::attribution::{AllSources, BusiestSource, SourceAttribution};
use crate::stats::Summary;
use crate::windows::{keep_median_segment_count, slot_median_durations};

/// Default gap between consecutive segment slots on the combined timeline
pub const DEFAULT_SLOT_GAP: i64 = 10;

/// Statistics of one metric in one bin of one segment slot
#[derive(Debug, Clone, PartialEq)]
pub struct BinnedStatistic {
    pub slot: usize,
    pub metric: Metric,
    /// Bin index within the slot, `0..num_bins`
    pub bin_index: usize,
    /// Bin center as a fraction of the slot, in `[0, 1)`
    pub relative_position: f64,
    /// Bin index on the combined timeline of all slots
    pub timeline_bin: usize,
    /// Bin center on the combined timeline, in microseconds
    pub timeline_position: f64,
    pub summary: Summary,
}

/// Placement of one segment slot on the combined timeline
#[derive(Debug, Clone, PartialEq)]
pub struct SlotTimeline {
    pub slot: usize,
    pub median_duration: f64,
    /// `ceil(median_duration)`, one bin per microsecond
    pub num_bins: usize,
    /// Timeline bin of this slot's first bin
    pub first_bin: usize,
    /// Timeline position of this slot's start
    pub offset: f64,
}

/// Result of aligning a set of windows
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Alignment {
    pub slots: Vec<SlotTimeline>,
    /// Non-empty bins ordered by slot, metric and bin index
    pub statistics: Vec<BinnedStatistic>,
    /// Number of windows that contributed
    pub windows: usize,
}

impl Alignment {
    pub fn is_empty(&self) -> bool {
        self.statistics.is_empty()
    }

    pub fn statistics_for(&self, metric: Metric) -> impl Iterator<Item = &BinnedStatistic> {
        self.statistics
            .iter()
            .filter(move |statistic| statistic.metric == metric)
    }
}

/// Aligns windows of different lengths onto a common relative time axis.
///
/// Each window segment is stretched onto `ceil(median duration)` bins of its
/// slot, every counter increment sampled inside the segment lands in the bin
/// of its relative position, and each bin reports the distribution of the
/// values that landed in it across all windows.
pub struct WindowAligner {
    slot_gap: i64,
    shared: Box<dyn SourceAttribution>,
    instructions: Box<dyn SourceAttribution>,
}

impl Default for WindowAligner {
    fn default() -> Self {
        Self::new()
    }
}

impl WindowAligner {
    /// Sums cache activity over all sources and reads instructions from the
    /// busiest source of each window.
    pub fn new() -> Self {
        Self {
            slot_gap: DEFAULT_SLOT_GAP,
            shared: Box::new(AllSources),
            instructions: Box::new(BusiestSource),
        }
    }

    pub fn with_slot_gap(mut self, slot_gap: i64) -> Self {
        self.slot_gap = slot_gap.max(0);
        self
    }

    pub fn with_instruction_attribution(mut self, attribution: Box<dyn SourceAttribution>) -> Self {
        self.instructions = attribution;
        self
    }

    fn attribution(&self, metric: Metric) -> &dyn SourceAttribution {
        match metric {
            Metric::Instructions => self.instructions.as_ref(),
            Metric::LlcLoads | Metric::LlcMisses => self.shared.as_ref(),
        }
    }

    /// Bins the counter activity of `windows`.
    ///
    /// Only windows with the median segment count take part. Empty input, or
    /// input where no window has the median segment count, yields an empty
    /// alignment.
    pub fn align(&self, windows: &[Window], counters: &CounterSet) -> Alignment {
        if windows.is_empty() {
            log::info!("No windows to align");
            return Alignment::default();
        }

        let (_, kept) = keep_median_segment_count(windows);
        if kept.is_empty() {
            log::info!("No window has the median segment count, nothing to align");
            return Alignment::default();
        }

        log::debug!(
            "Attributing instructions with the {} strategy",
            self.instructions.name()
        );
        let slots = self.timeline(&kept);
        let mut bins: Vec<[BTreeMap<usize, Vec<u64>>; 3]> = vec![Default::default(); slots.len()];

        for window in &kept {
            for metric in Metric::ALL {
                let sources = self.attribution(metric).select(window, counters, metric);
                if sources.is_empty() {
                    continue;
                }

                for (slot, segment) in slots.iter().zip(window.segments()) {
                    let duration = segment.duration();
                    if duration <= 0 || slot.num_bins == 0 {
                        continue;
                    }

                    let mut per_timestamp: BTreeMap<i64, u64> = BTreeMap::new();
                    for series in &sources {
                        for (timestamp, values) in series.activity_in(segment.start, segment.end) {
                            *per_timestamp.entry(timestamp).or_default() += values.get(metric);
                        }
                    }

                    for (timestamp, value) in per_timestamp {
                        let relative = ((timestamp - segment.start) as f64 / duration as f64)
                            .clamp(0.0, 1.0);
                        let bin =
                            ((relative * slot.num_bins as f64) as usize).min(slot.num_bins - 1);
                        bins[slot.slot][metric.index()]
                            .entry(bin)
                            .or_default()
                            .push(value);
                    }
                }
            }
        }

        let mut statistics = Vec::new();
        for slot in &slots {
            for metric in Metric::ALL {
                for (&bin_index, values) in &bins[slot.slot][metric.index()] {
                    let Some(summary) = Summary::of_positive(values) else {
                        continue;
                    };
                    let relative_position = (bin_index as f64 + 0.5) / slot.num_bins as f64;
                    statistics.push(BinnedStatistic {
                        slot: slot.slot,
                        metric,
                        bin_index,
                        relative_position,
                        timeline_bin: slot.first_bin + bin_index,
                        timeline_position: slot.offset + relative_position * slot.median_duration,
                        summary,
                    });
                }
            }
        }

        if statistics.is_empty() {
            log::info!("No counter activity fell inside any of {} windows", kept.len());
        }

        Alignment {
            slots,
            statistics,
            windows: kept.len(),
        }
    }

    /// Lays out the slots one after another, separated by the slot gap.
    fn timeline(&self, windows: &[&Window]) -> Vec<SlotTimeline> {
        let mut offset = 0.0;
        let mut first_bin = 0usize;
        let gap = self.slot_gap as usize;

        slot_median_durations(windows)
            .into_iter()
            .map(|duration| {
                let num_bins = duration.median_duration.ceil().max(0.0) as usize;
                let slot = SlotTimeline {
                    slot: duration.slot,
                    median_duration: duration.median_duration,
                    num_bins,
                    first_bin,
                    offset,
                };
                log::debug!(
                    "Slot {}: median duration {}us, {} bins",
                    slot.slot,
                    slot.median_duration,
                    slot.num_bins
                );
                offset += duration.median_duration + self.slot_gap as f64;
                first_bin += num_bins + gap;
                slot
            })
            .collect()
    }
}
