//! Predictor tuning. Immutable once a predictor is built.

use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Replicate the samples at `recent` (0 = newest) `repeat` times in the fit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeightBucket {
    pub recent: Range<usize>,
    pub repeat: usize,
}

impl WeightBucket {
    pub fn new(recent: Range<usize>, repeat: usize) -> Self {
        Self { recent, repeat }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictorConfig {
    /// History length; the oldest sample is evicted first.
    pub max_samples: usize,
    /// Empty means every sample counts once.
    pub weight_buckets: Vec<WeightBucket>,
    pub nonnegative_slope: bool,
    /// Below this many samples the conservative predictions fall back to 0 / infinity.
    pub reliable_sample_count: usize,
    pub conservative_weight: f64,
    /// Seconds added to the high prediction and subtracted from the low one.
    pub conservative_bias: f64,
    pub low_percentile: f64,
    pub high_percentile: f64,
}

impl PredictorConfig {
    /// Text length → synthesis API latency. Short, recency-weighted memory:
    /// network conditions drift.
    pub fn api_latency() -> Self {
        Self {
            max_samples: 30,
            weight_buckets: vec![
                WeightBucket::new(0..5, 6),
                WeightBucket::new(5..10, 4),
                WeightBucket::new(10..20, 3),
                WeightBucket::new(20..30, 2),
            ],
            nonnegative_slope: true,
            reliable_sample_count: 10,
            conservative_weight: 0.2,
            conservative_bias: 1.5,
            low_percentile: 5.0,
            high_percentile: 95.0,
        }
    }

    /// Text length → audio duration. Long, unweighted memory: speaking rate is stable.
    pub fn audio_duration() -> Self {
        Self {
            max_samples: 1000,
            weight_buckets: Vec::new(),
            nonnegative_slope: true,
            reliable_sample_count: 20,
            conservative_weight: 0.2,
            conservative_bias: 0.0,
            low_percentile: 5.0,
            high_percentile: 95.0,
        }
    }
}
