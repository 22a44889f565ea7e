//! Favorites kept in a small key-value storage as one JSON array.
//!
//! Every operation reads the whole collection and mutations rewrite it. Nothing here is
//! async, so a read-modify-write can never be interleaved at a suspension point.
use anyhow::{Context, Result};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, warn};

use crate::models::{FavoriteEntry, MovieId};

pub const FAVORITES_KEY: &str = "favorites";

pub trait KeyValueStorage: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
}

/// One `<key>.json` file per key inside `dir`.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create storage directory {}", dir.display()))?;
        Ok(Self { dir })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl KeyValueStorage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        let text = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Ok(Some(text))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value).with_context(|| format!("Failed to write {}", tmp.display()))?;
        fs::rename(&tmp, &path)
            .with_context(|| format!("Failed to replace {}", path.display()))?;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryStorage {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStorage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[derive(Clone)]
pub struct FavoritesStore {
    storage: Arc<dyn KeyValueStorage>,
    key: String,
}

impl FavoritesStore {
    pub fn new(storage: Arc<dyn KeyValueStorage>) -> Self {
        Self {
            storage,
            key: FAVORITES_KEY.to_string(),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStorage::new()))
    }

    pub fn open(dir: &Path) -> Result<Self> {
        Ok(Self::new(Arc::new(FileStorage::new(dir)?)))
    }

    /// Stored entries, oldest first. Missing or unreadable data reads as empty.
    pub fn list(&self) -> Vec<FavoriteEntry> {
        let raw = match self.storage.get(&self.key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(e) => {
                warn!("Favorites unreadable, treating as empty: {:#}", e);
                return Vec::new();
            }
        };
        let entries: Vec<FavoriteEntry> = match serde_json::from_str(&raw) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Favorites are not valid JSON, treating as empty: {}", e);
                return Vec::new();
            }
        };
        let mut seen = HashSet::new();
        entries
            .into_iter()
            .filter(|entry| seen.insert(entry.id))
            .collect()
    }

    pub fn is_favorite(&self, id: MovieId) -> bool {
        self.list().iter().any(|entry| entry.id == id)
    }

    pub fn add(&self, entry: FavoriteEntry) -> Result<()> {
        let mut entries = self.list();
        if entries.iter().any(|e| e.id == entry.id) {
            debug!(movie_id = entry.id, "Already a favorite");
            return Ok(());
        }
        entries.push(entry);
        self.save(&entries)
    }

    pub fn remove(&self, id: MovieId) -> Result<()> {
        let mut entries = self.list();
        let before = entries.len();
        entries.retain(|e| e.id != id);
        if entries.len() == before {
            debug!(movie_id = id, "Not a favorite, nothing to remove");
            return Ok(());
        }
        self.save(&entries)
    }

    /// Flips membership and returns the new state.
    pub fn toggle(&self, entry: FavoriteEntry) -> Result<bool> {
        if self.is_favorite(entry.id) {
            self.remove(entry.id)?;
            Ok(false)
        } else {
            self.add(entry)?;
            Ok(true)
        }
    }

    fn save(&self, entries: &[FavoriteEntry]) -> Result<()> {
        let json = serde_json::to_string(entries).context("Failed to encode favorites")?;
        self.storage.set(&self.key, &json)
    }
}
