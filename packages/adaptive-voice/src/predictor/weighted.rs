//! Recency weighting by sample replication.

use super::config::WeightBucket;
use adaptive_voice_domain::Sample;

/// Build the point set the line is fitted on.
///
/// Each bucket whose range is fully covered by the history contributes its
/// samples `repeat` times; buckets reaching past the oldest sample are
/// skipped. No buckets means the history is used as is.
pub fn weighted_points(samples: &[Sample], buckets: &[WeightBucket]) -> Vec<Sample> {
    if buckets.is_empty() {
        return samples.to_vec();
    }

    let n = samples.len();
    let mut points = Vec::new();
    for bucket in buckets {
        if bucket.recent.end > n || bucket.recent.start >= bucket.recent.end {
            continue;
        }
        let slice = &samples[n - bucket.recent.end..n - bucket.recent.start];
        for _ in 0..bucket.repeat {
            points.extend_from_slice(slice);
        }
    }
    points
}
