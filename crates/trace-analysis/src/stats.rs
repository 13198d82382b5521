/// Percentile of an ascending slice using linear interpolation between the
/// two closest ranks.
pub fn percentile(sorted: &[f64], percent: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }

    let rank = (percent / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let weight = rank - lower as f64;

    Some(sorted[lower] + weight * (sorted[upper] - sorted[lower]))
}

/// Median of unordered values; the mean of the two middle values for even counts.
pub fn median(values: impl IntoIterator<Item = f64>) -> Option<f64> {
    let mut sorted: Vec<f64> = values.into_iter().collect();
    sorted.sort_by(f64::total_cmp);
    percentile(&sorted, 50.0)
}

/// Distribution summary of the strictly positive values of one bin
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Summary {
    pub median: f64,
    pub p25: f64,
    pub p75: f64,
    pub p99: f64,
    pub count: usize,
}

impl Summary {
    /// Summarizes the positive values, or `None` if there are none.
    ///
    /// Zero counter increments mean the sampler saw no activity, not a
    /// measured zero, so they are left out.
    pub fn of_positive(values: &[u64]) -> Option<Self> {
        let mut sorted: Vec<f64> = values
            .iter()
            .filter(|&&value| value > 0)
            .map(|&value| value as f64)
            .collect();
        sorted.sort_by(f64::total_cmp);

        Some(Self {
            median: percentile(&sorted, 50.0)?,
            p25: percentile(&sorted, 25.0)?,
            p75: percentile(&sorted, 75.0)?,
            p99: percentile(&sorted, 99.0)?,
            count: sorted.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(vec![3.0, 1.0, 2.0], Some(2.0))]
    #[case(vec![4.0, 1.0, 2.0, 3.0], Some(2.5))]
    #[case(vec![7.0], Some(7.0))]
    #[case(vec![], None)]
    fn test_median(#[case] values: Vec<f64>, #[case] expected: Option<f64>) {
        assert_eq!(median(values), expected);
    }

    #[test]
    fn test_percentile_interpolates() {
        let sorted = [10.0, 20.0, 30.0, 40.0, 50.0];
        assert_eq!(percentile(&sorted, 25.0), Some(20.0));
        assert_eq!(percentile(&sorted, 90.0), Some(46.0));
        assert_eq!(percentile(&sorted, 100.0), Some(50.0));
        assert_eq!(percentile(&sorted, 0.0), Some(10.0));
    }

    #[test]
    fn test_summary_ignores_zero_values() {
        let summary = Summary::of_positive(&[0, 5, 0, 1, 3]).unwrap();
        assert_eq!(summary.median, 3.0);
        assert_eq!(summary.count, 3);
    }

    #[test]
    fn test_summary_of_zeros_is_none() {
        assert_eq!(Summary::of_positive(&[0, 0]), None);
        assert_eq!(Summary::of_positive(&[]), None);
    }
}
