//! Character sheet engine for a seafaring tabletop campaign.
//!
//! This crate provides:
//! - A pure derivation engine turning race, ability scores, level and DM
//!   modifiers into max health, max resource and reflex
//! - Command objects for every character mutation, applied through one
//!   entry point that keeps derived stats and live pools consistent
//! - A `Reconciler` owning the in-memory characters and writing through
//!   to a pluggable backend with retry
//! - Built-in race, Devil Fruit, equipment and action tables
//!
//! # Quick Start
//!
//! ```ignore
//! use sheet_core::{CharacterDraft, ModifierChannel, Reconciler, SheetConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Reconciler::from_config(&SheetConfig::from_env()?).await?;
//!
//!     let luffy = store
//!         .create(&CharacterDraft::new("Luffy", "meat").race("human").with_fruit(true))
//!         .await?;
//!
//!     store.set_flat_modifier(luffy.id, ModifierChannel::Health, 5).await?;
//!     let luffy = store.level_up(luffy.id).await?;
//!     println!("{} HP {}/{}", luffy.name, luffy.current_health, luffy.max_health());
//!     Ok(())
//! }
//! ```

pub mod builder;
pub mod catalog;
pub mod character;
pub mod command;
pub mod config;
pub mod derive;
pub mod dice;
pub mod error;
pub mod persist;
pub mod races;
pub mod reconciler;
pub mod testing;

// Primary public API
pub use builder::{CharacterDraft, CustomCharacter};
pub use catalog::ReferenceData;
pub use character::{
    Ability, AbilityScores, Character, CharacterId, EquipmentSlot, FlatModifiers, ModifierChannel,
};
pub use command::{apply_command, Command, SlotField};
pub use config::SheetConfig;
pub use derive::{ability_modifier, apply_modifiers, compute_baseline};
pub use error::SheetError;
pub use persist::{CharacterBackend, JsonDirBackend, MemoryBackend, RetryPolicy, StoreError};
pub use races::{RaceData, RaceTable};
pub use reconciler::Reconciler;
