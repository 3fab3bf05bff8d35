use std::time::Duration;

use hdrhistogram::Histogram;
use serde::Serialize;

/// HdrHistogram range: 1 μs → 60 s, 3 significant figures
const HIST_LOW: u64 = 1;
const HIST_HIGH: u64 = 60_000_000;
const HIST_SIGFIG: u8 = 3;

/// Latency percentile breakdown of one segment, in microseconds.
/// Serialized into the JSON report next to the min/max/sum/avg columns.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PercentileSet {
    pub min: u64,
    pub max: u64,
    pub mean: f64,
    pub p50: u64,
    pub p95: u64,
    pub p99: u64,
    pub p999: u64,
    pub count: u64,
}

impl PercentileSet {
    /// Histogram the given response times. Values are clamped to the
    /// 1 μs … 60 s range the histogram tracks.
    pub fn from_durations<I>(durations: I) -> Self
    where
        I: IntoIterator<Item = Duration>,
    {
        let Ok(mut hist) = Histogram::<u64>::new_with_bounds(HIST_LOW, HIST_HIGH, HIST_SIGFIG)
        else {
            return Self::empty();
        };
        for d in durations {
            let us = u64::try_from(d.as_micros()).unwrap_or(u64::MAX);
            hist.saturating_record(us.clamp(HIST_LOW, HIST_HIGH));
        }
        Self::from_histogram(&hist)
    }

    /// Returns zeroed values if the histogram is empty.
    pub fn from_histogram(hist: &Histogram<u64>) -> Self {
        if hist.len() == 0 {
            return Self::empty();
        }

        Self {
            min: hist.min(),
            max: hist.max(),
            mean: hist.mean(),
            p50: hist.value_at_percentile(50.0),
            p95: hist.value_at_percentile(95.0),
            p99: hist.value_at_percentile(99.0),
            p999: hist.value_at_percentile(99.9),
            count: hist.len(),
        }
    }

    pub fn empty() -> Self {
        Self {
            min: 0,
            max: 0,
            mean: 0.0,
            p50: 0,
            p95: 0,
            p99: 0,
            p999: 0,
            count: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_is_zeroed() {
        assert_eq!(PercentileSet::from_durations([]), PercentileSet::empty());
    }

    #[test]
    fn sub_microsecond_latencies_count_as_one() {
        let set = PercentileSet::from_durations([Duration::from_nanos(10), Duration::from_nanos(30)]);
        assert_eq!(set.count, 2);
        assert_eq!(set.min, 1);
        assert_eq!(set.max, 1);
    }

    #[test]
    fn percentiles_follow_distribution() {
        let set = PercentileSet::from_durations((1..=100).map(Duration::from_micros));
        assert_eq!(set.count, 100);
        assert_eq!(set.min, 1);
        assert_eq!(set.max, 100);
        assert_eq!(set.p50, 50);
        assert_eq!(set.p99, 99);
    }
}
