//! Per-recipient language preferences.
//!
//! Reads are lock-free of I/O; writes are serialized process-wide and hit
//! storage before the in-memory map changes, so a failed write leaves the
//! old preference in place and a completed write is visible immediately.

use std::collections::{BTreeMap, HashMap};
use std::io;
use std::path::PathBuf;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::common::error::PreferenceError;
use crate::common::types::{Language, RecipientId};

/// Durable storage for preferences.
#[async_trait]
pub trait PreferenceBackend: Send + Sync {
    /// Load every stored record.
    async fn load(&self) -> Result<HashMap<RecipientId, String>, PreferenceError>;

    /// Persist the full set of records.
    async fn store(&self, records: &BTreeMap<RecipientId, String>) -> Result<(), PreferenceError>;
}

/// Preferences stored as one JSON object in a file.
#[derive(Debug, Clone)]
pub struct JsonFileBackend {
    path: PathBuf,
}

impl JsonFileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn persist_error(&self, source: io::Error) -> PreferenceError {
        PreferenceError::Persist {
            path: self.path.display().to_string(),
            source,
        }
    }
}

#[async_trait]
impl PreferenceBackend for JsonFileBackend {
    async fn load(&self) -> Result<HashMap<RecipientId, String>, PreferenceError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("No preference file at {}, starting empty", self.path.display());
                return Ok(HashMap::new());
            }
            Err(e) => {
                return Err(PreferenceError::Load {
                    path: self.path.display().to_string(),
                    message: e.to_string(),
                })
            }
        };

        serde_json::from_str(&content).map_err(|e| PreferenceError::Load {
            path: self.path.display().to_string(),
            message: e.to_string(),
        })
    }

    async fn store(&self, records: &BTreeMap<RecipientId, String>) -> Result<(), PreferenceError> {
        let json = serde_json::to_vec_pretty(records)
            .map_err(|e| self.persist_error(io::Error::new(io::ErrorKind::InvalidData, e)))?;

        // Write-then-rename so a crash never leaves a truncated file
        let temp = self.temp_path();
        let mut file = tokio::fs::File::create(&temp)
            .await
            .map_err(|e| self.persist_error(e))?;
        file.write_all(&json).await.map_err(|e| self.persist_error(e))?;
        file.sync_all().await.map_err(|e| self.persist_error(e))?;
        drop(file);

        tokio::fs::rename(&temp, &self.path)
            .await
            .map_err(|e| self.persist_error(e))
    }
}

/// Process-wide recipient -> language mapping.
pub struct LanguagePreferenceStore {
    default: Language,
    map: RwLock<HashMap<RecipientId, Language>>,
    write_lock: Mutex<()>,
    backend: Box<dyn PreferenceBackend>,
}

impl LanguagePreferenceStore {
    /// Load stored preferences. Records with unknown codes are skipped.
    pub async fn load(default: Language, backend: Box<dyn PreferenceBackend>) -> Result<Self, PreferenceError> {
        let records = backend.load().await?;
        let mut map = HashMap::with_capacity(records.len());
        for (recipient, code) in records {
            match Language::parse(&code) {
                Ok(language) => {
                    map.insert(recipient, language);
                }
                Err(e) => warn!(recipient = %recipient, "Skipping stored preference: {}", e),
            }
        }
        info!("Loaded {} language preferences", map.len());

        Ok(Self {
            default,
            map: RwLock::new(map),
            write_lock: Mutex::new(()),
            backend,
        })
    }

    pub fn default_language(&self) -> Language {
        self.default
    }

    /// Preferred language of `recipient`, or the server default.
    pub fn get(&self, recipient: &RecipientId) -> Language {
        self.explicit(recipient).unwrap_or(self.default)
    }

    /// Preference explicitly set by `recipient`, if any.
    pub fn explicit(&self, recipient: &RecipientId) -> Option<Language> {
        self.map
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(recipient)
            .copied()
    }

    /// Set a preference and persist it before returning.
    pub async fn set(&self, recipient: &RecipientId, code: &str) -> Result<Language, PreferenceError> {
        let language = Language::parse(code)?;

        let _write = self.write_lock.lock().await;
        let mut records = self.records();
        records.insert(recipient.clone(), language.code().to_string());
        self.backend.store(&records).await?;

        self.map
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(recipient.clone(), language);
        debug!(recipient = %recipient, language = %language, "Language preference set");
        Ok(language)
    }

    /// Remove a preference. Returns whether one was set.
    pub async fn clear(&self, recipient: &RecipientId) -> Result<bool, PreferenceError> {
        let _write = self.write_lock.lock().await;
        let mut records = self.records();
        if records.remove(recipient).is_none() {
            return Ok(false);
        }
        self.backend.store(&records).await?;

        self.map
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(recipient);
        Ok(true)
    }

    /// Every explicit preference, ordered by recipient.
    pub fn all(&self) -> Vec<(RecipientId, Language)> {
        let map = self.map.read().unwrap_or_else(PoisonError::into_inner);
        let mut all: Vec<_> = map.iter().map(|(r, l)| (r.clone(), *l)).collect();
        all.sort();
        all
    }

    fn records(&self) -> BTreeMap<RecipientId, String> {
        self.map
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(r, l)| (r.clone(), l.code().to_string()))
            .collect()
    }
}
