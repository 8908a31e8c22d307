//! Ordinary least squares with residual percentiles.

use adaptive_voice_domain::{Sample, VoiceError};

/// A fitted line plus the sorted residuals used for percentile padding.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearFit {
    pub slope: f64,
    pub intercept: f64,
    sorted_residuals: Vec<f64>,
}

impl LinearFit {
    /// Fit `points` by OLS and compute residuals over `residual_points`.
    ///
    /// `points` may contain replicated samples (recency weighting) while
    /// `residual_points` is the plain history, so the percentile spread is
    /// not skewed by the replication.
    pub fn fit(
        points: &[Sample],
        residual_points: &[Sample],
        nonnegative_slope: bool,
    ) -> Result<Self, VoiceError> {
        if points.len() < 2 {
            return Err(VoiceError::InsufficientSamples {
                count: points.len(),
                required: 2,
            });
        }

        let n = points.len() as f64;
        let mean_x = points.iter().map(|p| p.x).sum::<f64>() / n;
        let mean_y = points.iter().map(|p| p.y).sum::<f64>() / n;

        let (numerator, denominator) =
            points.iter().fold((0.0, 0.0), |(num, den), p| {
                let dx = p.x - mean_x;
                (num + dx * (p.y - mean_y), den + dx * dx)
            });

        if denominator <= f64::EPSILON {
            return Err(VoiceError::DegenerateSamples);
        }

        let mut slope = numerator / denominator;
        if nonnegative_slope {
            slope = slope.max(0.0);
        }
        let intercept = mean_y - slope * mean_x;

        let mut sorted_residuals: Vec<f64> = residual_points
            .iter()
            .map(|p| p.y - (slope * p.x + intercept))
            .collect();
        sorted_residuals.sort_by(f64::total_cmp);

        Ok(Self {
            slope,
            intercept,
            sorted_residuals,
        })
    }

    pub fn predict(&self, x: f64) -> f64 {
        self.slope * x + self.intercept
    }

    /// `predict(x)` shifted by the residual at percentile `p` (0..=100).
    pub fn predict_at_percentile(&self, x: f64, percentile: f64) -> f64 {
        self.predict(x) + self.residual_at(percentile)
    }

    fn residual_at(&self, percentile: f64) -> f64 {
        let len = self.sorted_residuals.len();
        if len == 0 {
            return 0.0;
        }
        let index = ((percentile / 100.0) * len as f64).floor().max(0.0) as usize;
        self.sorted_residuals[index.min(len - 1)]
    }
}
