//! Testing utilities for the character store.
//!
//! This module provides tools for integration testing:
//! - `ScriptedBackend` for injecting store failures in a chosen order
//! - `TestHarness` wiring a `Reconciler` to a scripted backend
//! - Assertion helpers for verifying character invariants

use crate::builder::CharacterDraft;
use crate::catalog::ReferenceData;
use crate::character::{Character, CharacterId};
use crate::persist::{CharacterBackend, MemoryBackend, RetryPolicy, StoreError};
use crate::reconciler::Reconciler;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

/// A failure the scripted backend returns instead of doing the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// `StoreError::Unavailable`, which the retry loop repeats.
    Transient,
    /// `StoreError::NotFound`, which it does not.
    Permanent,
}

impl Fault {
    fn into_error(self, id: CharacterId) -> StoreError {
        match self {
            Fault::Transient => StoreError::Unavailable("scripted outage".to_string()),
            Fault::Permanent => StoreError::NotFound(id),
        }
    }
}

/// A backend that fails on cue.
///
/// Queued faults are consumed one per call, in order, before the call
/// reaches the wrapped `MemoryBackend`.
#[derive(Debug, Default)]
pub struct ScriptedBackend {
    inner: MemoryBackend,
    faults: Mutex<VecDeque<Fault>>,
    calls: AtomicUsize,
    writes: AtomicUsize,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue faults for the next calls.
    pub async fn fail_next(&self, faults: impl IntoIterator<Item = Fault>) {
        self.faults.lock().await.extend(faults);
    }

    /// Queue `count` transient faults.
    pub async fn fail_transiently(&self, count: usize) {
        self.fail_next(std::iter::repeat(Fault::Transient).take(count))
            .await;
    }

    /// Faults still queued.
    pub async fn pending_faults(&self) -> usize {
        self.faults.lock().await.len()
    }

    /// Calls made, failed ones included.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Writes that reached the store.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// The record as stored, bypassing faults.
    pub async fn stored(&self, id: CharacterId) -> Option<Character> {
        self.inner.get(id).await
    }

    pub async fn stored_count(&self) -> usize {
        self.inner.len().await
    }

    async fn check(&self, id: CharacterId) -> Result<(), StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.faults.lock().await.pop_front() {
            Some(fault) => Err(fault.into_error(id)),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl CharacterBackend for ScriptedBackend {
    async fn list_characters(&self) -> Result<Vec<Character>, StoreError> {
        self.check(CharacterId::default()).await?;
        self.inner.list_characters().await
    }

    async fn upsert(&self, id: CharacterId, character: &Character) -> Result<(), StoreError> {
        self.check(id).await?;
        self.inner.upsert(id, character).await?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn insert(&self, id: CharacterId, character: &Character) -> Result<(), StoreError> {
        self.check(id).await?;
        self.inner.insert(id, character).await?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete(&self, id: CharacterId) -> Result<(), StoreError> {
        self.check(id).await?;
        self.inner.delete(id).await?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Test harness for running store scenarios.
pub struct TestHarness {
    pub reconciler: Arc<Reconciler>,
    pub backend: Arc<ScriptedBackend>,
}

impl TestHarness {
    /// Built-in tables, two immediate retries.
    pub fn new() -> Self {
        Self::with_retry(RetryPolicy::immediate(2))
    }

    pub fn with_retry(retry: RetryPolicy) -> Self {
        let backend = Arc::new(ScriptedBackend::new());
        let reconciler = Reconciler::new(
            backend.clone(),
            Arc::new(ReferenceData::standard()),
        )
        .with_retry(retry);
        Self {
            reconciler: Arc::new(reconciler),
            backend,
        }
    }

    /// Create a level 1 character of the given race.
    pub async fn create(&self, name: &str, race: &str) -> Character {
        self.reconciler
            .create(&CharacterDraft::new(name, "test").race(race))
            .await
            .unwrap_or_else(|e| panic!("failed to create {name}: {e}"))
    }

    pub async fn create_human(&self, name: &str) -> Character {
        self.create(name, "human").await
    }

    /// The in-memory record.
    pub async fn current(&self, id: CharacterId) -> Character {
        self.reconciler
            .get(id)
            .await
            .unwrap_or_else(|e| panic!("character {id} missing: {e}"))
    }

    /// Whether memory and store hold the same record for `id`.
    pub async fn in_sync(&self, id: CharacterId) -> bool {
        let memory = self.reconciler.get(id).await.ok();
        let stored = self.backend.stored(id).await;
        memory == stored
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Assertion Helpers
// ============================================================================

/// Assert the character satisfies every record invariant.
#[track_caller]
pub fn assert_consistent(character: &Character) {
    let violations = character.invariant_violations();
    assert!(
        violations.is_empty(),
        "Character '{}' violates invariants: {violations:?}",
        character.name
    );
}

/// Assert the live pools.
#[track_caller]
pub fn assert_pools(character: &Character, health: i32, resource: i32) {
    assert_eq!(
        (character.current_health, character.current_resource),
        (health, resource),
        "Expected pools {health}/{resource}, got {}/{}",
        character.current_health,
        character.current_resource
    );
}

/// Assert the final derived stats.
#[track_caller]
pub fn assert_derived(character: &Character, max_health: i32, max_resource: i32, reflex: i32) {
    let d = &character.derived_final;
    assert_eq!(
        (d.max_health, d.max_resource, d.reflex),
        (max_health, max_resource, reflex),
        "Expected derived {max_health}/{max_resource}/{reflex}, got {}/{}/{}",
        d.max_health,
        d.max_resource,
        d.reflex
    );
}

/// Assert pools are full.
#[track_caller]
pub fn assert_full_pools(character: &Character) {
    assert_pools(character, character.max_health(), character.max_resource());
}
