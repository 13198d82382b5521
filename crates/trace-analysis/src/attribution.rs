use counters::{CounterSeries, CounterSet, Metric};
use spans::Window;

/// Chooses which counter sources a window's activity is read from.
///
/// Spans carry no core affinity, so some heuristic has to decide which
/// sources belong to a window. Implementations return the series whose
/// increments are summed per timestamp for the given metric.
pub trait SourceAttribution: Send + Sync {
    fn name(&self) -> &'static str;

    fn select<'a>(
        &self,
        window: &Window,
        counters: &'a CounterSet,
        metric: Metric,
    ) -> Vec<&'a CounterSeries>;
}

/// Attributes every source to every window
#[derive(Debug, Default, Clone, Copy)]
pub struct AllSources;

impl SourceAttribution for AllSources {
    fn name(&self) -> &'static str {
        "all-sources"
    }

    fn select<'a>(
        &self,
        _window: &Window,
        counters: &'a CounterSet,
        _metric: Metric,
    ) -> Vec<&'a CounterSeries> {
        counters.iter().collect()
    }
}

/// Attributes a window to the single source with the most activity in it
#[derive(Debug, Default, Clone, Copy)]
pub struct BusiestSource;

impl SourceAttribution for BusiestSource {
    fn name(&self) -> &'static str {
        "busiest"
    }

    fn select<'a>(
        &self,
        window: &Window,
        counters: &'a CounterSet,
        metric: Metric,
    ) -> Vec<&'a CounterSeries> {
        busiest_source(window, counters, metric).into_iter().collect()
    }
}

/// Total increments of `metric` at samples inside the window's segments
pub fn window_activity(series: &CounterSeries, window: &Window, metric: Metric) -> u64 {
    window
        .segments()
        .iter()
        .flat_map(|segment| series.activity_in(segment.start, segment.end))
        .map(|(_, values)| values.get(metric))
        .sum()
}

/// Source with the highest activity of `metric` in the window.
///
/// Ties go to the first source in source order. Returns `None` if no source
/// shows any activity.
pub fn busiest_source<'a>(
    window: &Window,
    counters: &'a CounterSet,
    metric: Metric,
) -> Option<&'a CounterSeries> {
    let mut best: Option<(&CounterSeries, u64)> = None;
    for series in counters.iter() {
        let activity = window_activity(series, window, metric);
        if activity > best.map_or(0, |(_, top)| top) {
            best = Some((series, activity));
        }
    }
    best.map(|(series, _)| series)
}

#[cfg(test)]
mod tests {
    use super::*;
    use counters::{CounterSample, CounterValues, SourceId};
    use spans::Interval;

    fn series(source: &str, instructions: &[(i64, u64)]) -> CounterSeries {
        CounterSeries::from_deltas(
            SourceId::from(source),
            instructions
                .iter()
                .map(|&(timestamp, value)| {
                    CounterSample::new(timestamp, CounterValues::new(0, 0, value))
                })
                .collect(),
        )
    }

    fn window(start: i64, end: i64) -> Window {
        Window::new("t", None, vec![Interval { start, end }]).unwrap()
    }

    #[test]
    fn test_busiest_source_by_activity_inside_window() {
        let counters: CounterSet = vec![
            series("core0", &[(10, 5), (20, 5), (90, 1000)]),
            series("core1", &[(10, 7), (20, 7)]),
        ]
        .into_iter()
        .collect();

        let busiest = busiest_source(&window(0, 50), &counters, Metric::Instructions).unwrap();
        assert_eq!(busiest.source().as_str(), "core1");

        let selected = BusiestSource.select(&window(0, 100), &counters, Metric::Instructions);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].source().as_str(), "core0");
    }

    #[test]
    fn test_no_activity_means_no_source() {
        let counters: CounterSet = vec![series("core0", &[(10, 0)])].into_iter().collect();
        assert!(busiest_source(&window(0, 50), &counters, Metric::Instructions).is_none());
        assert!(BusiestSource
            .select(&window(0, 50), &counters, Metric::Instructions)
            .is_empty());
    }

    #[test]
    fn test_all_sources_selects_everything() {
        let counters: CounterSet = vec![series("core0", &[]), series("core1", &[])]
            .into_iter()
            .collect();
        assert_eq!(
            AllSources
                .select(&window(0, 1), &counters, Metric::LlcLoads)
                .len(),
            2
        );
    }

    #[test]
    fn test_window_activity_sums_segments() {
        let series = series("core0", &[(5, 1), (15, 2), (25, 4)]);
        let window = Window::new(
            "t",
            None,
            vec![Interval { start: 0, end: 10 }, Interval { start: 20, end: 30 }],
        )
        .unwrap();
        assert_eq!(window_activity(&series, &window, Metric::Instructions), 5);
    }
}
