//! Persistence for predictor histories.
//!
//! Histories are small keyed lists of `(x, y)` pairs, rewritten whole on
//! every append. Stores are synchronous and may block; the dispatcher calls
//! them from the blocking pool. Writes for one key never interleave.

use adaptive_voice_domain::{Sample, VoiceError};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

pub trait SampleStore: Send + Sync {
    /// May block on I/O. Never called while the predictor's history is locked.
    fn save(&self, key: &str, samples: &[Sample]) -> Result<(), VoiceError>;

    /// `Ok(None)` when nothing was ever saved under `key`.
    fn load(&self, key: &str) -> Result<Option<Vec<Sample>>, VoiceError>;
}

/// Process-local store; histories are lost on exit.
#[derive(Debug, Default)]
pub struct MemorySampleStore {
    entries: Mutex<HashMap<String, Vec<Sample>>>,
}

impl MemorySampleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with one history, handy for warm starts.
    pub fn with_history(key: impl Into<String>, samples: Vec<Sample>) -> Self {
        let store = Self::new();
        store.entries.lock().insert(key.into(), samples);
        store
    }

    pub fn insert(&self, key: impl Into<String>, samples: Vec<Sample>) {
        self.entries.lock().insert(key.into(), samples);
    }
}

impl SampleStore for MemorySampleStore {
    fn save(&self, key: &str, samples: &[Sample]) -> Result<(), VoiceError> {
        self.entries.lock().insert(key.to_string(), samples.to_vec());
        Ok(())
    }

    fn load(&self, key: &str) -> Result<Option<Vec<Sample>>, VoiceError> {
        Ok(self.entries.lock().get(key).cloned())
    }
}

/// One `<key>.json` file per history inside `dir`, encoded as `[[x, y], ...]`.
#[derive(Debug, Clone)]
pub struct JsonFileSampleStore {
    dir: PathBuf,
}

impl JsonFileSampleStore {
    /// Use `dir`, creating it if missing.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, VoiceError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| {
            VoiceError::Storage(format!("Failed to create {}: {}", dir.display(), e))
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let file: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{file}.json"))
    }
}

impl SampleStore for JsonFileSampleStore {
    fn save(&self, key: &str, samples: &[Sample]) -> Result<(), VoiceError> {
        let path = self.path_for(key);
        let json = serde_json::to_vec(samples)
            .map_err(|e| VoiceError::Storage(format!("Failed to encode {key}: {e}")))?;

        // Readers only ever see a complete file.
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json)
            .and_then(|_| fs::rename(&tmp, &path))
            .map_err(|e| VoiceError::Storage(format!("Failed to write {}: {}", path.display(), e)))
    }

    fn load(&self, key: &str) -> Result<Option<Vec<Sample>>, VoiceError> {
        let path = self.path_for(key);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(VoiceError::Storage(format!(
                    "Failed to read {}: {}",
                    path.display(),
                    e
                )));
            }
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| VoiceError::Storage(format!("Corrupt history {}: {}", path.display(), e)))
    }
}
