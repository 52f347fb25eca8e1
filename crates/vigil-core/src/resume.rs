//! Resume-position store
//!
//! Keeps "continue watching" positions for VOD content, keyed by an opaque
//! movie id. The store is deliberately small: a bounded set of records, the
//! least recently updated evicted first.

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};

/// Default number of records kept
pub const DEFAULT_CAPACITY: usize = 50;

/// Saved playback position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResumeRecord {
    pub movie_id: String,
    pub position_secs: f64,
    pub duration_secs: f64,
    pub title: String,
    pub poster: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl ResumeRecord {
    /// Fraction watched, 0.0 when the duration is unknown
    pub fn progress(&self) -> f64 {
        if self.duration_secs.is_finite() && self.duration_secs > 0.0 {
            (self.position_secs / self.duration_secs).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }
}

/// Persistence collaborator
pub trait ResumeStore: Send + Sync {
    fn load(&self, movie_id: &str) -> Result<Option<ResumeRecord>>;

    fn save(&self, record: ResumeRecord) -> Result<()>;

    fn remove(&self, movie_id: &str) -> Result<()>;
}

fn insert_bounded(records: &mut HashMap<String, ResumeRecord>, record: ResumeRecord, capacity: usize) {
    records.insert(record.movie_id.clone(), record);
    while records.len() > capacity {
        let Some(oldest) = records
            .values()
            .min_by_key(|r| r.updated_at)
            .map(|r| r.movie_id.clone())
        else {
            break;
        };
        debug!(movie_id = %oldest, "Evicting resume record");
        records.remove(&oldest);
    }
}

/// In-memory store
#[derive(Debug)]
pub struct MemoryResumeStore {
    records: Mutex<HashMap<String, ResumeRecord>>,
    capacity: usize,
}

impl MemoryResumeStore {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryResumeStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ResumeStore for MemoryResumeStore {
    fn load(&self, movie_id: &str) -> Result<Option<ResumeRecord>> {
        let records = self
            .records
            .lock()
            .map_err(|_| Error::ResumeStore("store lock poisoned".into()))?;
        Ok(records.get(movie_id).cloned())
    }

    fn save(&self, record: ResumeRecord) -> Result<()> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| Error::ResumeStore("store lock poisoned".into()))?;
        insert_bounded(&mut records, record, self.capacity);
        Ok(())
    }

    fn remove(&self, movie_id: &str) -> Result<()> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| Error::ResumeStore("store lock poisoned".into()))?;
        records.remove(movie_id);
        Ok(())
    }
}

/// JSON file store; the whole file is rewritten on every change
#[derive(Debug)]
pub struct JsonFileResumeStore {
    path: PathBuf,
    capacity: usize,
    lock: Mutex<()>,
}

impl JsonFileResumeStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_capacity(path, DEFAULT_CAPACITY)
    }

    pub fn with_capacity(path: impl Into<PathBuf>, capacity: usize) -> Self {
        Self {
            path: path.into(),
            capacity,
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<HashMap<String, ResumeRecord>> {
        match std::fs::read_to_string(&self.path) {
            Ok(text) if text.trim().is_empty() => Ok(HashMap::new()),
            Ok(text) => match serde_json::from_str::<Vec<ResumeRecord>>(&text) {
                Ok(list) => Ok(list.into_iter().map(|r| (r.movie_id.clone(), r)).collect()),
                Err(e) => {
                    warn!(path = %self.path.display(), error = %e, "Discarding corrupt resume store");
                    Ok(HashMap::new())
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn write_all(&self, records: &HashMap<String, ResumeRecord>) -> Result<()> {
        let mut list: Vec<&ResumeRecord> = records.values().collect();
        list.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        let json = serde_json::to_string_pretty(&list)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn guard(&self) -> Result<std::sync::MutexGuard<'_, ()>> {
        self.lock
            .lock()
            .map_err(|_| Error::ResumeStore("store lock poisoned".into()))
    }
}

impl ResumeStore for JsonFileResumeStore {
    fn load(&self, movie_id: &str) -> Result<Option<ResumeRecord>> {
        let _guard = self.guard()?;
        Ok(self.read_all()?.remove(movie_id))
    }

    fn save(&self, record: ResumeRecord) -> Result<()> {
        let _guard = self.guard()?;
        let mut records = self.read_all()?;
        insert_bounded(&mut records, record, self.capacity);
        self.write_all(&records)
    }

    fn remove(&self, movie_id: &str) -> Result<()> {
        let _guard = self.guard()?;
        let mut records = self.read_all()?;
        if records.remove(movie_id).is_some() {
            self.write_all(&records)?;
        }
        Ok(())
    }
}
