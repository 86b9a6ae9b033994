//! The character store.
//!
//! [`Reconciler`] owns the authoritative in-memory map of characters. Every
//! mutation runs through [`Reconciler::apply`]:
//! 1. take the per-character lock
//! 2. build the next record with [`apply_command`]
//! 3. write it through to the backend, retrying transient failures
//! 4. only then replace the in-memory record
//!
//! A failed write leaves memory holding the previous record, which still
//! matches the store. Reads never touch the backend; [`Reconciler::reload`]
//! refreshes the map from it.
//!
//! Writes hold a shared gate that [`Reconciler::reload`] takes exclusively,
//! so a reload never swaps in a snapshot older than a committed write.
//!
//! The per-character lock only serializes callers sharing one `Reconciler`.
//! Several processes writing the same store still race, last write wins.

use crate::builder::{self, CharacterDraft, CustomCharacter};
use crate::catalog::{self, ActionData, ReferenceData};
use crate::character::{Ability, Character, CharacterId, EquipmentSlot, ModifierChannel};
use crate::command::{apply_command, reconcile, Command, PoolPolicy, SlotField};
use crate::config::SheetConfig;
use crate::error::SheetError;
use crate::persist::{with_retry, CharacterBackend, JsonDirBackend, RetryPolicy, StoreError};
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

/// Authoritative owner of all characters, writing through to a backend.
pub struct Reconciler {
    backend: Arc<dyn CharacterBackend>,
    data: Arc<ReferenceData>,
    retry: RetryPolicy,
    characters: RwLock<HashMap<CharacterId, Character>>,
    locks: Mutex<HashMap<CharacterId, Arc<Mutex<()>>>>,
    /// Shared by write-throughs, exclusive for reload.
    write_gate: RwLock<()>,
}

impl Reconciler {
    /// Create an empty store over `backend`. Call [`reload`](Self::reload)
    /// to pick up existing records.
    pub fn new(backend: Arc<dyn CharacterBackend>, data: Arc<ReferenceData>) -> Self {
        Self {
            backend,
            data,
            retry: RetryPolicy::default(),
            characters: RwLock::new(HashMap::new()),
            locks: Mutex::new(HashMap::new()),
            write_gate: RwLock::new(()),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Create a store and load every record from the backend.
    pub async fn open(
        backend: Arc<dyn CharacterBackend>,
        data: Arc<ReferenceData>,
        retry: RetryPolicy,
    ) -> Result<Self, SheetError> {
        let reconciler = Self::new(backend, data).with_retry(retry);
        reconciler.reload().await?;
        Ok(reconciler)
    }

    /// Open a JSON directory store as described by `config`.
    pub async fn from_config(config: &SheetConfig) -> Result<Self, SheetError> {
        let data = match &config.reference_data {
            Some(path) => ReferenceData::load_json(path).await?,
            None => ReferenceData::standard(),
        };
        let backend = JsonDirBackend::open(&config.data_dir).await?;
        tracing::info!(
            data_dir = %config.data_dir.display(),
            races = data.races.len(),
            fruits = data.fruits.len(),
            "Opening character store"
        );
        Self::open(Arc::new(backend), Arc::new(data), config.retry.clone()).await
    }

    pub fn reference_data(&self) -> &ReferenceData {
        &self.data
    }

    /// Replace the in-memory map with the backend's records.
    ///
    /// Each record is reconciled on load so a stale derived cache never
    /// escapes. Records naming an unknown race are skipped.
    pub async fn reload(&self) -> Result<usize, SheetError> {
        let _gate = self.write_gate.write().await;
        let records =
            with_retry(&self.retry, "list_characters", || self.backend.list_characters()).await?;

        let mut loaded = HashMap::with_capacity(records.len());
        for mut character in records {
            let before = character.clone();
            if let Err(e) = reconcile(&mut character, PoolPolicy::Clamp, &self.data) {
                tracing::warn!(character_id = %character.id, error = %e, "Skipping unloadable character");
                continue;
            }
            if character != before {
                tracing::debug!(character_id = %character.id, "Refreshed stale derived stats on load");
            }
            loaded.insert(character.id, character);
        }

        let count = loaded.len();
        *self.characters.write().await = loaded;
        tracing::info!(count, "Loaded characters");
        Ok(count)
    }

    // ========================================================================
    // Reads
    // ========================================================================

    pub async fn get(&self, id: CharacterId) -> Result<Character, SheetError> {
        self.characters
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(SheetError::CharacterNotFound(id))
    }

    pub async fn len(&self) -> usize {
        self.characters.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.characters.read().await.is_empty()
    }

    /// Every character, hidden ones included, sorted by name.
    pub async fn list_all(&self) -> Vec<Character> {
        let mut all: Vec<_> = self.characters.read().await.values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        all
    }

    /// Characters players can see, sorted by name.
    pub async fn list_visible(&self) -> Vec<Character> {
        let mut visible = self.list_all().await;
        visible.retain(|c| !c.hidden);
        visible
    }

    /// The character, if `passcode` matches.
    pub async fn unlock(&self, id: CharacterId, passcode: &str) -> Result<Character, SheetError> {
        let character = self.get(id).await?;
        if character.passcode != passcode {
            tracing::debug!(character_id = %id, "Passcode rejected");
            return Err(SheetError::AccessDenied);
        }
        Ok(character)
    }

    /// Default actions plus those of the character's Devil Fruit.
    pub async fn actions_for(&self, id: CharacterId) -> Result<Vec<ActionData>, SheetError> {
        let character = self.get(id).await?;
        Ok(catalog::available_actions(&character, &self.data))
    }

    // ========================================================================
    // Creation and deletion
    // ========================================================================

    /// Build a player character from a draft and store it.
    pub async fn create(&self, draft: &CharacterDraft) -> Result<Character, SheetError> {
        let character = draft.build(&self.data)?;
        self.insert_character(character, "create").await
    }

    /// Store a DM-specified character.
    pub async fn create_custom(&self, custom: &CustomCharacter) -> Result<Character, SheetError> {
        let character = builder::build_custom(custom, &self.data)?;
        self.insert_character(character, "create_custom").await
    }

    /// Roll up and store a hidden NPC.
    pub async fn create_random<R: Rng + ?Sized>(
        &self,
        name: &str,
        passcode: &str,
        rng: &mut R,
    ) -> Result<Character, SheetError> {
        let character = builder::build_random(name, passcode, &self.data, rng)?;
        self.insert_character(character, "create_random").await
    }

    /// Deep copy under a fresh id, with " (Copy)" appended to the name.
    pub async fn copy_character(&self, id: CharacterId) -> Result<Character, SheetError> {
        let original = self.get(id).await?;
        let copy = original.duplicate();
        tracing::debug!(source_id = %id, copy_id = %copy.id, "Copying character");
        self.insert_character(copy, "copy").await
    }

    /// Remove a character from the store and from memory. Irreversible.
    pub async fn delete_character(&self, id: CharacterId) -> Result<(), SheetError> {
        let _guard = self.lock_existing(id).await?;
        let _gate = self.write_gate.read().await;

        if !self.characters.read().await.contains_key(&id) {
            self.locks.lock().await.remove(&id);
            return Err(SheetError::CharacterNotFound(id));
        }

        match with_retry(&self.retry, "delete", || self.backend.delete(id)).await {
            Ok(()) => {}
            Err(StoreError::NotFound(_)) => {
                tracing::warn!(character_id = %id, "Character already absent from store");
            }
            Err(e) => return Err(e.into()),
        }

        self.characters.write().await.remove(&id);
        self.locks.lock().await.remove(&id);
        tracing::info!(character_id = %id, "Deleted character");
        Ok(())
    }

    async fn insert_character(
        &self,
        character: Character,
        operation: &str,
    ) -> Result<Character, SheetError> {
        let id = character.id;
        let _gate = self.write_gate.read().await;
        with_retry(&self.retry, "insert", || self.backend.insert(id, &character)).await?;

        self.characters.write().await.insert(id, character.clone());
        tracing::info!(
            character_id = %id,
            name = %character.name,
            race = %character.race,
            hidden = character.hidden,
            operation,
            "Created character"
        );
        Ok(character)
    }

    // ========================================================================
    // Mutation
    // ========================================================================

    /// Take the per-character lock. Entries are only created for ids that
    /// exist, so calls on unknown ids leave the lock map untouched.
    async fn lock_existing(&self, id: CharacterId) -> Result<OwnedMutexGuard<()>, SheetError> {
        if !self.characters.read().await.contains_key(&id) {
            return Err(SheetError::CharacterNotFound(id));
        }
        let lock = Arc::clone(self.locks.lock().await.entry(id).or_default());
        Ok(lock.lock_owned().await)
    }

    /// Apply one command: validate, recompute, persist, then commit.
    pub async fn apply(&self, id: CharacterId, command: Command) -> Result<Character, SheetError> {
        let _guard = self.lock_existing(id).await?;
        let _gate = self.write_gate.read().await;

        let current = match self.get(id).await {
            Ok(current) => current,
            Err(e) => {
                // Deleted while we waited for the lock
                self.locks.lock().await.remove(&id);
                return Err(e);
            }
        };
        let next = match apply_command(&current, &command, &self.data) {
            Ok(next) => next,
            Err(e) => {
                tracing::debug!(
                    character_id = %id,
                    command = command.name(),
                    error = %e,
                    "Command rejected"
                );
                return Err(e);
            }
        };

        with_retry(&self.retry, command.name(), || self.backend.upsert(id, &next)).await?;

        self.characters.write().await.insert(id, next.clone());
        tracing::info!(
            character_id = %id,
            command = command.name(),
            level = next.level,
            health = next.current_health,
            max_health = next.derived_final.max_health,
            "Applied command"
        );
        Ok(next)
    }

    pub async fn level_up(&self, id: CharacterId) -> Result<Character, SheetError> {
        self.apply(id, Command::LevelUp).await
    }

    pub async fn increase_ability_score(
        &self,
        id: CharacterId,
        ability: Ability,
    ) -> Result<Character, SheetError> {
        self.apply(id, Command::IncreaseAbilityScore { ability }).await
    }

    pub async fn apply_damage(&self, id: CharacterId, amount: i32) -> Result<Character, SheetError> {
        self.apply(id, Command::ApplyDamage { amount }).await
    }

    pub async fn heal(&self, id: CharacterId, amount: i32) -> Result<Character, SheetError> {
        self.apply(id, Command::Heal { amount }).await
    }

    pub async fn spend_resource(&self, id: CharacterId, amount: i32) -> Result<Character, SheetError> {
        self.apply(id, Command::SpendResource { amount }).await
    }

    pub async fn restore_resource(
        &self,
        id: CharacterId,
        amount: i32,
    ) -> Result<Character, SheetError> {
        self.apply(id, Command::RestoreResource { amount }).await
    }

    pub async fn full_restore(&self, id: CharacterId) -> Result<Character, SheetError> {
        self.apply(id, Command::FullRestore).await
    }

    pub async fn set_flat_modifier(
        &self,
        id: CharacterId,
        channel: ModifierChannel,
        value: i32,
    ) -> Result<Character, SheetError> {
        self.apply(id, Command::SetFlatModifier { channel, value }).await
    }

    pub async fn adjust_level(&self, id: CharacterId, delta: i32) -> Result<Character, SheetError> {
        self.apply(id, Command::AdjustLevel { delta }).await
    }

    pub async fn set_ability_score(
        &self,
        id: CharacterId,
        ability: Ability,
        delta: i32,
    ) -> Result<Character, SheetError> {
        self.apply(id, Command::SetAbilityScore { ability, delta }).await
    }

    pub async fn set_melee_profile(
        &self,
        id: CharacterId,
        dice_expression: impl Into<String>,
        flat_bonus: i32,
    ) -> Result<Character, SheetError> {
        let command = Command::SetMeleeProfile {
            dice_expression: dice_expression.into(),
            flat_bonus,
        };
        self.apply(id, command).await
    }

    pub async fn set_devil_fruit(
        &self,
        id: CharacterId,
        fruit: Option<&str>,
    ) -> Result<Character, SheetError> {
        let command = Command::SetDevilFruit {
            fruit: fruit.map(str::to_string),
        };
        self.apply(id, command).await
    }

    pub async fn set_hidden(&self, id: CharacterId, hidden: bool) -> Result<Character, SheetError> {
        self.apply(id, Command::SetHidden { hidden }).await
    }

    pub async fn add_equipment_slot(
        &self,
        id: CharacterId,
        slot: EquipmentSlot,
    ) -> Result<Character, SheetError> {
        self.apply(id, Command::AddEquipmentSlot { slot }).await
    }

    pub async fn update_equipment_slot(
        &self,
        id: CharacterId,
        index: usize,
        field: SlotField,
    ) -> Result<Character, SheetError> {
        self.apply(id, Command::UpdateEquipmentSlot { index, field }).await
    }

    pub async fn remove_equipment_slot(
        &self,
        id: CharacterId,
        index: usize,
    ) -> Result<Character, SheetError> {
        self.apply(id, Command::RemoveEquipmentSlot { index }).await
    }
}
