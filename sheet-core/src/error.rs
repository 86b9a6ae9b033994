//! Error taxonomy for character operations.

use crate::character::CharacterId;
use crate::dice::DiceError;
use crate::persist::StoreError;
use thiserror::Error;

/// Errors from character creation and mutation.
///
/// Every variant except `Persistence` is raised before any state changes,
/// so the prior record is untouched.
#[derive(Debug, Error)]
pub enum SheetError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unknown race: {0}")]
    UnknownRace(String),

    #[error("Devil fruit not found: {0}")]
    FruitNotFound(String),

    #[error("Unknown item: {0}")]
    UnknownItem(String),

    #[error("Not enough skill points (have {available})")]
    InsufficientSkillPoints { available: u32 },

    #[error("Invalid amount: {0} (must not be negative)")]
    InvalidAmount(i32),

    #[error("Character not found: {0}")]
    CharacterNotFound(CharacterId),

    #[error("Equipment slot {index} out of range (character has {len})")]
    SlotOutOfRange { index: usize, len: usize },

    #[error("Passcode does not match")]
    AccessDenied,

    #[error("Invalid damage formula: {0}")]
    InvalidDice(#[from] DiceError),

    #[error("Persistence failure: {0}")]
    Persistence(#[from] StoreError),
}

impl SheetError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        SheetError::Validation(message.into())
    }

    /// Whether the store could not complete the operation.
    pub fn is_persistence(&self) -> bool {
        matches!(self, SheetError::Persistence(_))
    }
}
