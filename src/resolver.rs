//! # Nearest-Sample Resolution
//!
//! Projection series cover both the past and the forecast future, so "now" sits
//! somewhere in the middle. The current value of a variable is the sample whose
//! timestamp is closest to a reference instant, in absolute time.
//!
//! Selection is a stable linear scan: among samples at equal distance the first
//! one in input order wins. Callers that care about tie-breaks must therefore
//! resolve before re-ordering their samples.

/// Index of the sample closest to `reference_ms`, or `None` for an empty input.
///
/// # Example
/// ```
/// use havvarsel_lib::resolver::nearest_index;
///
/// // 1000 and 3000 are both 1000 ms away from 2000: the first one wins
/// assert_eq!(nearest_index([1000, 3000], 2000), Some(0));
/// assert_eq!(nearest_index(std::iter::empty::<i64>(), 2000), None);
/// ```
pub fn nearest_index<I>(raw_times: I, reference_ms: i64) -> Option<usize>
where
    I: IntoIterator<Item = i64>,
{
    let mut best: Option<(usize, u64)> = None;
    for (index, raw_time) in raw_times.into_iter().enumerate() {
        let distance = raw_time.abs_diff(reference_ms);
        if best.map_or(true, |(_, best_distance)| distance < best_distance) {
            best = Some((index, distance));
        }
    }
    best.map(|(index, _)| index)
}

/// Value of the sample closest to `reference_ms`.
///
/// `samples` yields `(epoch milliseconds, value)` pairs. An empty input yields
/// `None` rather than an error.
pub fn nearest<T, I>(samples: I, reference_ms: i64) -> Option<T>
where
    I: IntoIterator<Item = (i64, T)>,
{
    let mut best: Option<(T, u64)> = None;
    for (raw_time, value) in samples {
        let distance = raw_time.abs_diff(reference_ms);
        let closer = best
            .as_ref()
            .map_or(true, |(_, best_distance)| distance < *best_distance);
        if closer {
            best = Some((value, distance));
        }
    }
    best.map(|(value, _)| value)
}
