//! Character persistence.
//!
//! The store is an opaque key-value backend keyed by character id. Two
//! implementations ship with the crate: an in-process map and a directory
//! of versioned JSON files. Writes go through [`with_retry`], which repeats
//! transient failures with exponential backoff.

use crate::character::{Character, CharacterId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::fs;
use tokio::sync::RwLock;

/// Errors from persistence operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Character already exists: {0}")]
    AlreadyExists(CharacterId),

    #[error("Character not in store: {0}")]
    NotFound(CharacterId),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },
}

impl StoreError {
    /// Whether repeating the same call may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_) | StoreError::Io(_))
    }
}

/// Key-value store of character records.
///
/// No transactions: concurrent writers to one id are last-write-wins.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CharacterBackend: Send + Sync {
    async fn list_characters(&self) -> Result<Vec<Character>, StoreError>;

    /// Write a record, replacing any existing one with the same id.
    async fn upsert(&self, id: CharacterId, character: &Character) -> Result<(), StoreError>;

    /// Write a new record; fails with `AlreadyExists` if the id is taken.
    async fn insert(&self, id: CharacterId, character: &Character) -> Result<(), StoreError>;

    async fn delete(&self, id: CharacterId) -> Result<(), StoreError>;
}

// ============================================================================
// Retry
// ============================================================================

/// Backoff policy for transient store failures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries after the first attempt (0 = try once).
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Retry without sleeping between attempts.
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Try exactly once.
    pub fn none() -> Self {
        Self::immediate(0)
    }

    /// Delay before retry `attempt` (1-based): `base * 2^(attempt-1)`, capped.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

/// Run a store operation, retrying transient failures per `policy`.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    mut call: F,
) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    let mut attempt = 0;
    loop {
        match call().await {
            Ok(value) => {
                if attempt > 0 {
                    tracing::info!(
                        attempt = attempt + 1,
                        operation,
                        "Store call succeeded after retry"
                    );
                }
                return Ok(value);
            }
            Err(e) if e.is_transient() && attempt < policy.max_retries => {
                attempt += 1;
                let delay = policy.delay_for(attempt);
                tracing::warn!(
                    attempt,
                    max_retries = policy.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    operation,
                    "Store call failed, retrying"
                );
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }
            Err(e) => {
                if e.is_transient() {
                    tracing::error!(
                        attempts = attempt + 1,
                        error = %e,
                        operation,
                        "Store call failed after all retry attempts"
                    );
                } else {
                    tracing::error!(error = %e, operation, "Store call failed with permanent error");
                }
                return Err(e);
            }
        }
    }
}

// ============================================================================
// In-memory Backend
// ============================================================================

/// Backend holding records in a process-local map.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    records: RwLock<HashMap<CharacterId, Character>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with the given records already stored.
    pub fn with_characters(characters: impl IntoIterator<Item = Character>) -> Self {
        Self {
            records: RwLock::new(characters.into_iter().map(|c| (c.id, c)).collect()),
        }
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    /// Read a stored record directly.
    pub async fn get(&self, id: CharacterId) -> Option<Character> {
        self.records.read().await.get(&id).cloned()
    }
}

#[async_trait]
impl CharacterBackend for MemoryBackend {
    async fn list_characters(&self) -> Result<Vec<Character>, StoreError> {
        Ok(self.records.read().await.values().cloned().collect())
    }

    async fn upsert(&self, id: CharacterId, character: &Character) -> Result<(), StoreError> {
        self.records.write().await.insert(id, character.clone());
        Ok(())
    }

    async fn insert(&self, id: CharacterId, character: &Character) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        if records.contains_key(&id) {
            return Err(StoreError::AlreadyExists(id));
        }
        records.insert(id, character.clone());
        Ok(())
    }

    async fn delete(&self, id: CharacterId) -> Result<(), StoreError> {
        self.records
            .write()
            .await
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::NotFound(id))
    }
}

// ============================================================================
// JSON Directory Backend
// ============================================================================

/// Current character save file version.
const CHARACTER_SAVE_VERSION: u32 = 1;

/// A character record as written to disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedCharacter {
    /// Save format version for compatibility checking.
    pub version: u32,

    /// When the record was written.
    pub saved_at: String,

    pub character: Character,

    /// Quick-access metadata.
    pub metadata: CharacterMetadata,
}

/// Metadata about a saved character for quick display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterMetadata {
    pub name: String,
    pub race: String,
    pub level: u32,
    pub hidden: bool,
    pub has_fruit: bool,
}

impl SavedCharacter {
    pub fn new(character: Character) -> Self {
        let metadata = CharacterMetadata {
            name: character.name.clone(),
            race: character.race.clone(),
            level: character.level,
            hidden: character.hidden,
            has_fruit: character.fruit.is_some(),
        };

        Self {
            version: CHARACTER_SAVE_VERSION,
            saved_at: chrono_now(),
            character,
            metadata,
        }
    }

    /// Save to a JSON file. Writes a sibling temp file first, then renames.
    pub async fn save_json(&self, path: impl AsRef<Path>) -> Result<(), StoreError> {
        let path = path.as_ref();
        let content = serde_json::to_string_pretty(self)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, content).await?;
        fs::rename(&tmp, path).await?;
        Ok(())
    }

    /// Load from a JSON file.
    pub async fn load_json(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let content = fs::read_to_string(path).await?;
        let saved: Self = serde_json::from_str(&content)?;

        if saved.version != CHARACTER_SAVE_VERSION {
            return Err(StoreError::VersionMismatch {
                expected: CHARACTER_SAVE_VERSION,
                found: saved.version,
            });
        }

        Ok(saved)
    }

    /// Get metadata without loading the full character.
    pub async fn peek_metadata(path: impl AsRef<Path>) -> Result<CharacterMetadata, StoreError> {
        let content = fs::read_to_string(path).await?;

        #[derive(Deserialize)]
        struct Partial {
            version: u32,
            metadata: CharacterMetadata,
        }

        let partial: Partial = serde_json::from_str(&content)?;

        if partial.version != CHARACTER_SAVE_VERSION {
            return Err(StoreError::VersionMismatch {
                expected: CHARACTER_SAVE_VERSION,
                found: partial.version,
            });
        }

        Ok(partial.metadata)
    }
}

/// Backend storing one `<id>.json` file per character in a directory.
#[derive(Debug, Clone)]
pub struct JsonDirBackend {
    dir: PathBuf,
}

impl JsonDirBackend {
    /// Open a directory, creating it if needed.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File that holds a given character.
    pub fn path_for(&self, id: CharacterId) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    /// Metadata for every readable record, sorted by name.
    pub async fn list_metadata(&self) -> Result<Vec<CharacterMetadata>, StoreError> {
        let mut entries = fs::read_dir(&self.dir).await?;
        let mut found = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if is_record_file(&path) {
                if let Ok(metadata) = SavedCharacter::peek_metadata(&path).await {
                    found.push(metadata);
                }
            }
        }
        found.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(found)
    }
}

fn is_record_file(path: &Path) -> bool {
    path.extension().map(|e| e == "json").unwrap_or(false)
}

#[async_trait]
impl CharacterBackend for JsonDirBackend {
    async fn list_characters(&self) -> Result<Vec<Character>, StoreError> {
        let mut entries = fs::read_dir(&self.dir).await?;
        let mut characters = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !is_record_file(&path) {
                continue;
            }
            match SavedCharacter::load_json(&path).await {
                Ok(saved) => characters.push(saved.character),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable character file");
                }
            }
        }

        Ok(characters)
    }

    async fn upsert(&self, id: CharacterId, character: &Character) -> Result<(), StoreError> {
        SavedCharacter::new(character.clone())
            .save_json(self.path_for(id))
            .await
    }

    async fn insert(&self, id: CharacterId, character: &Character) -> Result<(), StoreError> {
        if fs::try_exists(self.path_for(id)).await? {
            return Err(StoreError::AlreadyExists(id));
        }
        self.upsert(id, character).await
    }

    async fn delete(&self, id: CharacterId) -> Result<(), StoreError> {
        match fs::remove_file(self.path_for(id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StoreError::NotFound(id)),
            Err(e) => Err(e.into()),
        }
    }
}

/// Get current timestamp as seconds since the Unix epoch.
fn chrono_now() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();

    format!("{}", now.as_secs())
}
