//! Online regression predictors for API latency and audio duration.
//!
//! A [`RegressionPredictor`] owns a bounded sample history, persists it on
//! every append and refits lazily. Its conservative predictions are what the
//! queue builder schedules against: high for latency, low for duration.

mod config;
mod linear;
mod weighted;

pub use config::{PredictorConfig, WeightBucket};
pub use linear::LinearFit;
pub use weighted::weighted_points;

use crate::sample_store::SampleStore;
use adaptive_voice_domain::{Sample, VoiceError};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

pub struct RegressionPredictor {
    config: PredictorConfig,
    storage_key: String,
    store: Arc<dyn SampleStore>,
    state: Mutex<PredictorState>,
    persist: Mutex<()>,
}

struct PredictorState {
    samples: VecDeque<Sample>,
    /// `None` until the next query refits.
    fit: Option<Result<LinearFit, VoiceError>>,
}

impl RegressionPredictor {
    /// Create a predictor seeded with whatever history `store` holds under `storage_key`.
    pub fn new(
        config: PredictorConfig,
        storage_key: impl Into<String>,
        store: Arc<dyn SampleStore>,
    ) -> Self {
        let storage_key = storage_key.into();
        let history = match store.load(&storage_key) {
            Ok(history) => history.unwrap_or_default(),
            Err(e) => {
                tracing::warn!(key = %storage_key, error = %e, "Failed to load predictor history");
                Vec::new()
            }
        };

        let skip = history.len().saturating_sub(config.max_samples);
        let samples: VecDeque<Sample> = history.into_iter().skip(skip).collect();
        tracing::debug!(key = %storage_key, samples = samples.len(), "Predictor initialised");

        Self {
            config,
            storage_key,
            store,
            state: Mutex::new(PredictorState { samples, fit: None }),
            persist: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &PredictorConfig {
        &self.config
    }

    pub fn storage_key(&self) -> &str {
        &self.storage_key
    }

    pub fn sample_count(&self) -> usize {
        self.state.lock().samples.len()
    }

    pub fn samples(&self) -> Vec<Sample> {
        self.state.lock().samples.iter().copied().collect()
    }

    /// Record an observation, evicting the oldest past `max_samples`, and persist.
    ///
    /// The save runs on the calling thread after the history lock is
    /// released, so file-backed stores should be fed from blocking context.
    pub fn add_sample(&self, x: f64, y: f64) {
        if !x.is_finite() || !y.is_finite() {
            tracing::warn!(key = %self.storage_key, x, y, "Ignoring non-finite sample");
            return;
        }

        // Held across the save so snapshots reach the store in append order.
        let _persist = self.persist.lock();
        let snapshot: Vec<Sample> = {
            let mut state = self.state.lock();
            state.samples.push_back(Sample::new(x, y));
            while state.samples.len() > self.config.max_samples {
                state.samples.pop_front();
            }
            state.fit = None;
            state.samples.iter().copied().collect()
        };

        if let Err(e) = self.store.save(&self.storage_key, &snapshot) {
            tracing::warn!(key = %self.storage_key, error = %e, "Failed to persist predictor samples");
        }
    }

    pub fn predict(&self, x: f64) -> Result<f64, VoiceError> {
        self.with_fit(|fit| fit.predict(x))
    }

    pub fn predict_at_percentile(&self, x: f64, percentile: f64) -> Result<f64, VoiceError> {
        self.with_fit(|fit| fit.predict_at_percentile(x, percentile))
    }

    /// Current fitted line, refitting if needed.
    pub fn fitted(&self) -> Result<LinearFit, VoiceError> {
        self.with_fit(LinearFit::clone)
    }

    /// Pessimistically short estimate; `0` until the history is reliable.
    pub fn conservative_low(&self, x: f64) -> f64 {
        if !self.is_reliable() {
            return 0.0;
        }
        match self.predict_at_percentile(x, self.config.low_percentile) {
            Ok(p) => p - self.config.conservative_weight * p.abs() - self.config.conservative_bias,
            Err(e) => {
                tracing::debug!(key = %self.storage_key, error = %e, "Low prediction unavailable");
                0.0
            }
        }
    }

    /// Pessimistically long estimate; `+inf` until the history is reliable.
    pub fn conservative_high(&self, x: f64) -> f64 {
        if !self.is_reliable() {
            return f64::INFINITY;
        }
        match self.predict_at_percentile(x, self.config.high_percentile) {
            Ok(p) => p + self.config.conservative_weight * p.abs() + self.config.conservative_bias,
            Err(e) => {
                tracing::debug!(key = %self.storage_key, error = %e, "High prediction unavailable");
                f64::INFINITY
            }
        }
    }

    fn is_reliable(&self) -> bool {
        self.sample_count() >= self.config.reliable_sample_count
    }

    fn with_fit<T>(&self, f: impl FnOnce(&LinearFit) -> T) -> Result<T, VoiceError> {
        let mut state = self.state.lock();
        if state.fit.is_none() {
            let history: Vec<Sample> = state.samples.iter().copied().collect();
            let points = weighted_points(&history, &self.config.weight_buckets);
            state.fit = Some(LinearFit::fit(
                &points,
                &history,
                self.config.nonnegative_slope,
            ));
        }
        match &state.fit {
            Some(Ok(fit)) => Ok(f(fit)),
            Some(Err(e)) => Err(e.clone()),
            None => Err(VoiceError::InsufficientSamples {
                count: state.samples.len(),
                required: 2,
            }),
        }
    }
}

impl std::fmt::Debug for RegressionPredictor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegressionPredictor")
            .field("storage_key", &self.storage_key)
            .field("samples", &self.sample_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample_store::MemorySampleStore;

    fn predictor(config: PredictorConfig) -> RegressionPredictor {
        RegressionPredictor::new(config, "test", Arc::new(MemorySampleStore::new()))
    }

    #[test]
    fn cold_predictor_assumes_best_and_worst_case() {
        let p = predictor(PredictorConfig::api_latency());
        for i in 0..9 {
            p.add_sample(10.0 * (i + 1) as f64, 0.5 * (i + 1) as f64);
        }
        assert_eq!(p.conservative_low(50.0), 0.0);
        assert_eq!(p.conservative_high(50.0), f64::INFINITY);

        p.add_sample(100.0, 5.0);
        assert!(p.conservative_high(50.0).is_finite());
    }

    #[test]
    fn slope_never_negative_when_clamped() {
        let p = predictor(PredictorConfig::audio_duration());
        let mut seed = 17u64;
        for i in 0..60 {
            // Deliberately decreasing y with some jitter.
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            let jitter = (seed >> 33) as f64 / u32::MAX as f64;
            p.add_sample(i as f64 * 3.0 + 1.0, 100.0 - i as f64 + jitter);
            if p.sample_count() >= 2 {
                assert!(p.fitted().expect("fit").slope >= 0.0);
            }
        }
    }

    #[test]
    fn conservative_bounds_bracket_prediction() {
        let p = predictor(PredictorConfig::api_latency());
        let noise = [0.1, -0.2, 0.05, 0.15, -0.1, 0.0, 0.2, -0.05, -0.15, 0.1];
        for i in 0..30 {
            let x = 20.0 + 15.0 * i as f64;
            p.add_sample(x, 0.04 * x + 0.8 + noise[i % noise.len()]);
        }
        for x in [1.0, 25.0, 100.0, 400.0, 2000.0] {
            let mid = p.predict(x).expect("predict");
            assert!(p.conservative_low(x) <= mid, "low above prediction at {x}");
            assert!(mid <= p.conservative_high(x), "high below prediction at {x}");
        }
    }

    #[test]
    fn bounds_bracket_negative_predictions() {
        let p = predictor(PredictorConfig::audio_duration());
        for i in 0..20 {
            let x = 10.0 + 10.0 * i as f64;
            let noise = if i % 2 == 0 { 0.05 } else { -0.05 };
            p.add_sample(x, 0.1 * x - 2.0 + noise);
        }
        for x in [1.0, 5.0, 15.0, 50.0] {
            let mid = p.predict(x).expect("predict");
            let low = p.conservative_low(x);
            let high = p.conservative_high(x);
            assert!(low <= mid, "low {low} above prediction {mid} at {x}");
            assert!(mid <= high, "high {high} below prediction {mid} at {x}");
        }
        assert!(p.predict(5.0).expect("predict") < 0.0);
    }

    #[test]
    fn history_is_bounded_and_persisted() {
        let store = Arc::new(MemorySampleStore::new());
        let mut config = PredictorConfig::audio_duration();
        config.max_samples = 3;
        let p = RegressionPredictor::new(config.clone(), "dur", store.clone());
        for i in 0..5 {
            p.add_sample(i as f64, i as f64);
        }
        assert_eq!(p.sample_count(), 3);
        assert_eq!(p.samples()[0], Sample::new(2.0, 2.0));

        let persisted = store.load("dur").expect("load").expect("key present");
        assert_eq!(persisted, p.samples());

        let reloaded = RegressionPredictor::new(config, "dur", store);
        assert_eq!(reloaded.samples(), p.samples());
    }

    #[derive(Default)]
    struct ObservingStore {
        predictor: std::sync::OnceLock<std::sync::Weak<RegressionPredictor>>,
        counts_seen: Mutex<Vec<usize>>,
    }

    impl SampleStore for ObservingStore {
        fn save(&self, _key: &str, samples: &[Sample]) -> Result<(), VoiceError> {
            if let Some(predictor) = self.predictor.get().and_then(std::sync::Weak::upgrade) {
                // Would deadlock if the history lock were still held.
                let count = predictor.sample_count();
                assert_eq!(count, samples.len());
                self.counts_seen.lock().push(count);
            }
            Ok(())
        }

        fn load(&self, _key: &str) -> Result<Option<Vec<Sample>>, VoiceError> {
            Ok(None)
        }
    }

    #[test]
    fn save_runs_outside_the_history_lock() {
        let store = Arc::new(ObservingStore::default());
        let p = Arc::new(RegressionPredictor::new(
            PredictorConfig::audio_duration(),
            "dur",
            store.clone(),
        ));
        let _ = store.predictor.set(Arc::downgrade(&p));

        p.add_sample(1.0, 0.1);
        p.add_sample(2.0, 0.2);
        assert_eq!(*store.counts_seen.lock(), vec![1, 2]);
    }

    #[test]
    fn refits_after_new_samples() {
        let p = predictor(PredictorConfig::audio_duration());
        p.add_sample(10.0, 1.0);
        p.add_sample(20.0, 2.0);
        let first = p.predict(30.0).expect("predict");
        p.add_sample(30.0, 6.0);
        let second = p.predict(30.0).expect("predict");
        assert!(second > first);
    }

    #[test]
    fn degenerate_history_is_an_error_not_a_panic() {
        let p = predictor(PredictorConfig::audio_duration());
        assert!(p.predict(1.0).is_err());
        p.add_sample(5.0, 1.0);
        p.add_sample(5.0, 2.0);
        assert!(matches!(p.predict(1.0), Err(VoiceError::DegenerateSamples)));
    }
}
