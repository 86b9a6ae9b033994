//! Derivation engine.
//!
//! Pure functions turning race, ability scores, level and DM modifiers into
//! the baseline and final derived stats. Nothing here touches I/O or keeps
//! state; the same inputs always give the same outputs.
//!
//! Formulas:
//!
//! ```text
//! baseHealth   = round(max(0, raceHealth + max(0, con - 10)) * (1 + 0.2 * (level - 1)))
//! baseResource = raceResource + 2*max(0, int - 10) + 2*max(0, wis - 10) + 5*level
//! baseReflex   = raceReflex + floor(dex / 5) + floor(level / 3)
//!
//! maxHealth   = max(1, baseHealth   + healthMod)
//! maxResource = max(0, baseResource + resourceMod)
//! reflex      = max(0, baseReflex   + reflexMod)
//! ```

use crate::character::{
    Ability, AbilityScores, DerivedBaseline, DerivedFinal, FlatModifiers, MeleeProfile,
};
use crate::error::SheetError;
use crate::races::{RaceData, RaceTable};

/// Formula constants.
pub mod constants {
    /// Score at which an ability stops contributing nothing.
    pub const ABILITY_BASELINE: i32 = 10;
    /// Health growth per level above the first, in fifths (0.2).
    pub const HEALTH_GROWTH_FIFTHS_PER_LEVEL: i64 = 1;
    /// Resource gained per point of INT or WIS above the baseline.
    pub const RESOURCE_PER_MENTAL_POINT: i32 = 2;
    /// Resource gained per level.
    pub const RESOURCE_PER_LEVEL: i32 = 5;
    /// DEX points per point of reflex.
    pub const DEX_PER_REFLEX: i32 = 5;
    /// Levels per point of reflex.
    pub const LEVELS_PER_REFLEX: i32 = 3;
    /// Floors applied to the final channels.
    pub const MIN_MAX_HEALTH: i32 = 1;
    pub const MIN_MAX_RESOURCE: i32 = 0;
    pub const MIN_REFLEX: i32 = 0;
    /// Dice used by the default melee profile (unarmed strike).
    pub const DEFAULT_MELEE_DICE: &str = "1d4";
}

use constants::*;

/// `floor((score - 10) / 2)`.
pub fn ability_modifier(score: i32) -> i32 {
    (score as i64 - ABILITY_BASELINE as i64).div_euclid(2) as i32
}

fn above_baseline(score: i32) -> i64 {
    (score as i64 - ABILITY_BASELINE as i64).max(0)
}

fn saturate(value: i64) -> i32 {
    value.clamp(i32::MIN as i64, i32::MAX as i64) as i32
}

/// Compute the baseline derived stats for a race, stats and level.
///
/// `level` below 1 is treated as 1. Every channel is computed in `i64` and
/// saturates at the `i32` bounds, so it never decreases as a score or the
/// level rises.
pub fn compute_baseline(race: &RaceData, stats: &AbilityScores, level: u32) -> DerivedBaseline {
    let level = level.max(1) as i64;

    // round(h * (1 + 0.2*(level-1))) == round(h * (level + 4) / 5), kept in
    // integers so the result is exact.
    let health_root =
        (race.base_health as i64 + above_baseline(stats.get(Ability::Constitution))).max(0);
    let fifths = 5 + HEALTH_GROWTH_FIFTHS_PER_LEVEL * (level - 1);
    let base_health = health_root
        .saturating_mul(fifths)
        .saturating_mul(2)
        .saturating_add(5)
        / 10;

    let base_resource = race.base_resource as i64
        + RESOURCE_PER_MENTAL_POINT as i64 * above_baseline(stats.get(Ability::Intelligence))
        + RESOURCE_PER_MENTAL_POINT as i64 * above_baseline(stats.get(Ability::Wisdom))
        + RESOURCE_PER_LEVEL as i64 * level;

    let base_reflex = race.base_reflex as i64
        + (stats.get(Ability::Dexterity) as i64).div_euclid(DEX_PER_REFLEX as i64)
        + level.div_euclid(LEVELS_PER_REFLEX as i64);

    DerivedBaseline {
        base_health: saturate(base_health),
        base_resource: saturate(base_resource),
        base_reflex: saturate(base_reflex),
    }
}

/// Look the race up by key, then compute the baseline.
pub fn compute_baseline_for(
    races: &RaceTable,
    race_key: &str,
    stats: &AbilityScores,
    level: u32,
) -> Result<DerivedBaseline, SheetError> {
    let race = races.require(race_key)?;
    Ok(compute_baseline(race, stats, level))
}

/// Add the DM modifiers to a baseline and clamp each channel.
pub fn apply_modifiers(baseline: &DerivedBaseline, modifiers: &FlatModifiers) -> DerivedFinal {
    DerivedFinal {
        max_health: baseline
            .base_health
            .saturating_add(modifiers.health_mod)
            .max(MIN_MAX_HEALTH),
        max_resource: baseline
            .base_resource
            .saturating_add(modifiers.resource_mod)
            .max(MIN_MAX_RESOURCE),
        reflex: baseline
            .base_reflex
            .saturating_add(modifiers.reflex_mod)
            .max(MIN_REFLEX),
    }
}

/// Baseline and final in one pass.
pub fn derive_all(
    race: &RaceData,
    stats: &AbilityScores,
    level: u32,
    modifiers: &FlatModifiers,
) -> (DerivedBaseline, DerivedFinal) {
    let baseline = compute_baseline(race, stats, level);
    let derived = apply_modifiers(&baseline, modifiers);
    (baseline, derived)
}

/// Melee profile a new character starts with: an unarmed strike plus the
/// STR modifier.
pub fn default_melee_profile(stats: &AbilityScores) -> MeleeProfile {
    MeleeProfile::new(
        DEFAULT_MELEE_DICE,
        ability_modifier(stats.get(Ability::Strength)),
    )
}
