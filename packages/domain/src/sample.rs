//! Observed (text length, seconds) pairs fed to the predictors.

use serde::{Deserialize, Serialize};

/// One observation: `x` is a text length in characters, `y` the elapsed
/// API time or the resulting audio duration in seconds.
///
/// Serializes as a two element array, the layout the persisted history uses.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct Sample {
    pub x: f64,
    pub y: f64,
}

impl Sample {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl From<[f64; 2]> for Sample {
    fn from([x, y]: [f64; 2]) -> Self {
        Self { x, y }
    }
}

impl From<Sample> for [f64; 2] {
    fn from(sample: Sample) -> Self {
        [sample.x, sample.y]
    }
}

impl From<(f64, f64)> for Sample {
    fn from((x, y): (f64, f64)) -> Self {
        Self { x, y }
    }
}
