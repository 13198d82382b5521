use std::cmp::Reverse;

use crate::TimeRange;

/// Selects a non-overlapping subset of `candidates`, longest first.
///
/// Candidates are visited in order of descending duration, ties keeping their
/// input order. A candidate is accepted when it does not intersect any range
/// accepted before it, and rejected for good otherwise.
///
/// This greedy pass approximates maximum-weight interval scheduling; it does
/// not backtrack, so a long candidate can crowd out several shorter ones whose
/// combined duration is larger. Its result is deterministic for a given input.
///
/// Returns the indices of the accepted candidates in acceptance order.
pub fn select_non_overlapping<T: TimeRange>(candidates: &[T]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..candidates.len()).collect();
    order.sort_by_key(|&position| Reverse(candidates[position].duration()));

    let mut accepted: Vec<usize> = Vec::new();
    for position in order {
        let candidate = &candidates[position];
        let overlaps = accepted
            .iter()
            .any(|&taken| candidate.overlaps(&candidates[taken]));
        if !overlaps {
            accepted.push(position);
        }
    }

    accepted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Interval;
    use rstest::rstest;

    fn iv(start: i64, end: i64) -> Interval {
        Interval { start, end }
    }

    #[test]
    fn test_longest_candidate_wins() {
        let candidates = vec![iv(0, 10), iv(5, 50), iv(60, 70)];
        assert_eq!(select_non_overlapping(&candidates), vec![1, 2]);
    }

    #[test]
    fn test_equal_durations_keep_input_order() {
        let candidates = vec![iv(20, 30), iv(25, 35), iv(0, 10)];
        assert_eq!(select_non_overlapping(&candidates), vec![0, 2]);
    }

    #[test]
    fn test_greedy_is_not_optimal() {
        // Two short candidates would cover 80 but the 50-long one is taken first
        let candidates = vec![iv(0, 40), iv(30, 80), iv(40, 80)];
        assert_eq!(select_non_overlapping(&candidates), vec![1]);
    }

    #[rstest]
    #[case(vec![(0, 100), (10, 20), (20, 30), (95, 130)])]
    #[case(vec![(5, 6), (0, 10), (9, 11), (11, 12), (3, 4)])]
    #[case(vec![(50, 60), (40, 55), (0, 45), (58, 90), (89, 91), (0, 0)])]
    fn test_accepted_ranges_never_intersect(#[case] ranges: Vec<(i64, i64)>) {
        let candidates: Vec<Interval> = ranges.into_iter().map(|(s, e)| iv(s, e)).collect();

        let mut reversed = candidates.clone();
        reversed.reverse();

        for input in [&candidates, &reversed] {
            let accepted = select_non_overlapping(input);
            for (i, &a) in accepted.iter().enumerate() {
                for &b in &accepted[i + 1..] {
                    assert!(!input[a].overlaps(&input[b]));
                }
            }
        }
    }

    #[test]
    fn test_empty_input() {
        let candidates: Vec<Interval> = Vec::new();
        assert!(select_non_overlapping(&candidates).is_empty());
    }
}
