//! Character sheet types.
//!
//! Contains the persisted character record and the value types it is built
//! from: ability scores, DM flat modifiers, the two derived-stat bundles,
//! the melee damage profile, Devil Fruit reference and equipment slots.

use crate::derive;
use crate::races::RaceData;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Lowest value any ability score may take.
pub const MIN_ABILITY_SCORE: i32 = 1;

/// Lowest level a character may have.
pub const MIN_LEVEL: u32 = 1;

/// Highest level a character may have.
pub const MAX_LEVEL: u32 = i32::MAX as u32;

/// Suffix appended to the name of a copied character.
pub const COPY_SUFFIX: &str = " (Copy)";

// ============================================================================
// ID Types
// ============================================================================

/// Unique identifier for characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CharacterId(pub Uuid);

impl CharacterId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CharacterId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CharacterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Ability Scores
// ============================================================================

/// The six ability scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Ability {
    Strength,
    Dexterity,
    Constitution,
    Intelligence,
    Wisdom,
    Charisma,
}

impl Ability {
    pub fn abbreviation(&self) -> &'static str {
        match self {
            Ability::Strength => "STR",
            Ability::Dexterity => "DEX",
            Ability::Constitution => "CON",
            Ability::Intelligence => "INT",
            Ability::Wisdom => "WIS",
            Ability::Charisma => "CHA",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Ability::Strength => "Strength",
            Ability::Dexterity => "Dexterity",
            Ability::Constitution => "Constitution",
            Ability::Intelligence => "Intelligence",
            Ability::Wisdom => "Wisdom",
            Ability::Charisma => "Charisma",
        }
    }

    pub fn all() -> [Ability; 6] {
        [
            Ability::Strength,
            Ability::Dexterity,
            Ability::Constitution,
            Ability::Intelligence,
            Ability::Wisdom,
            Ability::Charisma,
        ]
    }
}

impl fmt::Display for Ability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.abbreviation())
    }
}

impl FromStr for Ability {
    type Err = String;

    /// Accepts stat keys (`str`), abbreviations (`STR`) and full names.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_lowercase();
        Ability::all()
            .into_iter()
            .find(|a| a.abbreviation().to_lowercase() == key || a.name().to_lowercase() == key)
            .ok_or_else(|| format!("unknown ability: {s}"))
    }
}

/// Ability scores container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbilityScores {
    pub strength: i32,
    pub dexterity: i32,
    pub constitution: i32,
    pub intelligence: i32,
    pub wisdom: i32,
    pub charisma: i32,
}

impl AbilityScores {
    pub fn new(str: i32, dex: i32, con: i32, int: i32, wis: i32, cha: i32) -> Self {
        Self {
            strength: str,
            dexterity: dex,
            constitution: con,
            intelligence: int,
            wisdom: wis,
            charisma: cha,
        }
    }

    pub fn get(&self, ability: Ability) -> i32 {
        match ability {
            Ability::Strength => self.strength,
            Ability::Dexterity => self.dexterity,
            Ability::Constitution => self.constitution,
            Ability::Intelligence => self.intelligence,
            Ability::Wisdom => self.wisdom,
            Ability::Charisma => self.charisma,
        }
    }

    /// Set a score, flooring it at [`MIN_ABILITY_SCORE`].
    pub fn set(&mut self, ability: Ability, value: i32) {
        let value = value.max(MIN_ABILITY_SCORE);
        match ability {
            Ability::Strength => self.strength = value,
            Ability::Dexterity => self.dexterity = value,
            Ability::Constitution => self.constitution = value,
            Ability::Intelligence => self.intelligence = value,
            Ability::Wisdom => self.wisdom = value,
            Ability::Charisma => self.charisma = value,
        }
    }

    pub fn adjust(&mut self, ability: Ability, delta: i32) {
        self.set(ability, self.get(ability).saturating_add(delta));
    }

    pub fn modifier(&self, ability: Ability) -> i32 {
        derive::ability_modifier(self.get(ability))
    }

    pub fn all_at_least_minimum(&self) -> bool {
        Ability::all()
            .iter()
            .all(|a| self.get(*a) >= MIN_ABILITY_SCORE)
    }
}

impl Default for AbilityScores {
    fn default() -> Self {
        Self::new(10, 10, 10, 10, 10, 10)
    }
}

// ============================================================================
// DM Modifiers and Derived Stats
// ============================================================================

/// A derived channel the DM can offset with a flat modifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModifierChannel {
    Health,
    Resource,
    Reflex,
}

impl ModifierChannel {
    pub fn name(&self) -> &'static str {
        match self {
            ModifierChannel::Health => "healthMod",
            ModifierChannel::Resource => "resourceMod",
            ModifierChannel::Reflex => "reflexMod",
        }
    }

    pub fn all() -> [ModifierChannel; 3] {
        [
            ModifierChannel::Health,
            ModifierChannel::Resource,
            ModifierChannel::Reflex,
        ]
    }
}

impl fmt::Display for ModifierChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// DM-only additive overrides. They survive level and stat changes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlatModifiers {
    pub health_mod: i32,
    pub resource_mod: i32,
    pub reflex_mod: i32,
}

impl FlatModifiers {
    pub fn get(&self, channel: ModifierChannel) -> i32 {
        match channel {
            ModifierChannel::Health => self.health_mod,
            ModifierChannel::Resource => self.resource_mod,
            ModifierChannel::Reflex => self.reflex_mod,
        }
    }

    pub fn set(&mut self, channel: ModifierChannel, value: i32) {
        match channel {
            ModifierChannel::Health => self.health_mod = value,
            ModifierChannel::Resource => self.resource_mod = value,
            ModifierChannel::Reflex => self.reflex_mod = value,
        }
    }
}

/// Derived stats before DM modifiers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedBaseline {
    pub base_health: i32,
    pub base_resource: i32,
    pub base_reflex: i32,
}

/// Effective derived stats: baseline plus modifiers, clamped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedFinal {
    pub max_health: i32,
    pub max_resource: i32,
    pub reflex: i32,
}

// ============================================================================
// Melee, Devil Fruit and Equipment
// ============================================================================

/// Melee damage formula. Describes the roll; never resolves it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeleeProfile {
    pub dice_expression: String,
    pub flat_bonus: i32,
}

impl MeleeProfile {
    pub fn new(dice_expression: impl Into<String>, flat_bonus: i32) -> Self {
        Self {
            dice_expression: dice_expression.into(),
            flat_bonus,
        }
    }

    /// Render as notation, e.g. `1d4+2` or `2d6-1`.
    pub fn describe(&self) -> String {
        match self.flat_bonus {
            0 => self.dice_expression.clone(),
            b if b > 0 => format!("{}+{b}", self.dice_expression),
            b => format!("{}-{}", self.dice_expression, b.abs()),
        }
    }
}

impl fmt::Display for MeleeProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.describe())
    }
}

/// Reference to an entry in the Devil Fruit Table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FruitRef {
    pub name: String,
    pub ability_text: String,
}

/// One line of a character's equipment list.
///
/// A slot either names a catalog item (`item_key`) or is free text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EquipmentSlot {
    pub item_key: Option<String>,
    pub quantity: u32,
    pub custom_description: String,
}

impl EquipmentSlot {
    pub fn catalog(item_key: impl Into<String>, quantity: u32) -> Self {
        Self {
            item_key: Some(item_key.into()),
            quantity,
            custom_description: String::new(),
        }
    }

    pub fn custom(description: impl Into<String>) -> Self {
        Self {
            item_key: None,
            quantity: 1,
            custom_description: description.into(),
        }
    }

    pub fn is_custom(&self) -> bool {
        self.item_key.is_none()
    }
}

impl Default for EquipmentSlot {
    fn default() -> Self {
        Self::custom("")
    }
}

// ============================================================================
// Character
// ============================================================================

/// A persisted character sheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Character {
    pub id: CharacterId,
    pub name: String,
    /// Plaintext shared secret gating player access. Not authentication.
    pub passcode: String,

    /// Key into the race table.
    pub race: String,
    pub level: u32,
    pub base_stats: AbilityScores,
    pub skill_points: u32,

    pub flat_modifiers: FlatModifiers,
    /// Cache of the recomputable baseline.
    pub derived_baseline: DerivedBaseline,
    pub derived_final: DerivedFinal,

    // Live pools
    pub current_health: i32,
    pub current_resource: i32,

    pub melee: MeleeProfile,
    pub fruit: Option<FruitRef>,
    #[serde(default)]
    pub equipment: Vec<EquipmentSlot>,
    #[serde(default)]
    pub hidden: bool,
}

impl Character {
    /// Recompute both derived bundles from race, stats, level and modifiers.
    pub fn recalculate(&mut self, race: &RaceData) {
        let (baseline, derived) =
            derive::derive_all(race, &self.base_stats, self.level, &self.flat_modifiers);
        self.derived_baseline = baseline;
        self.derived_final = derived;
    }

    /// Pull the live pools into `[0, max]` without raising them.
    pub fn clamp_pools(&mut self) {
        self.current_health = self
            .current_health
            .clamp(0, self.derived_final.max_health);
        self.current_resource = self
            .current_resource
            .clamp(0, self.derived_final.max_resource);
    }

    /// Refill both pools to their maxima.
    pub fn restore_pools(&mut self) {
        self.current_health = self.derived_final.max_health;
        self.current_resource = self.derived_final.max_resource;
    }

    pub fn max_health(&self) -> i32 {
        self.derived_final.max_health
    }

    pub fn max_resource(&self) -> i32 {
        self.derived_final.max_resource
    }

    pub fn reflex(&self) -> i32 {
        self.derived_final.reflex
    }

    pub fn is_conscious(&self) -> bool {
        self.current_health > 0
    }

    pub fn health_ratio(&self) -> f32 {
        if self.derived_final.max_health <= 0 {
            return 0.0;
        }
        (self.current_health as f32 / self.derived_final.max_health as f32).max(0.0)
    }

    /// Deep copy under a fresh id with the copy suffix on the name.
    pub fn duplicate(&self) -> Character {
        let mut copy = self.clone();
        copy.id = CharacterId::new();
        copy.name = format!("{}{COPY_SUFFIX}", self.name);
        copy
    }

    /// Check the record against the invariants every mutation must keep.
    ///
    /// Returns a description of each violation found; empty when consistent.
    pub fn invariant_violations(&self) -> Vec<String> {
        let mut violations = Vec::new();
        let max_health = self.derived_final.max_health;
        let max_resource = self.derived_final.max_resource;

        if !(0..=max_health).contains(&self.current_health) {
            violations.push(format!(
                "current health {} outside [0, {max_health}]",
                self.current_health
            ));
        }
        if !(0..=max_resource).contains(&self.current_resource) {
            violations.push(format!(
                "current resource {} outside [0, {max_resource}]",
                self.current_resource
            ));
        }
        let expected = derive::apply_modifiers(&self.derived_baseline, &self.flat_modifiers);
        if expected != self.derived_final {
            violations.push(format!(
                "derived final {:?} does not match baseline plus modifiers {:?}",
                self.derived_final, expected
            ));
        }
        if !(MIN_LEVEL..=MAX_LEVEL).contains(&self.level) {
            violations.push(format!(
                "level {} outside [{MIN_LEVEL}, {MAX_LEVEL}]",
                self.level
            ));
        }
        if !self.base_stats.all_at_least_minimum() {
            violations.push(format!(
                "ability score below {MIN_ABILITY_SCORE}: {:?}",
                self.base_stats
            ));
        }
        violations
    }

    pub fn is_consistent(&self) -> bool {
        self.invariant_violations().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::races::RaceTable;

    fn human() -> Character {
        let races = RaceTable::standard();
        let race = races.get("human").unwrap();
        let mut character = Character {
            id: CharacterId::new(),
            name: "Koby".to_string(),
            passcode: "marine".to_string(),
            race: race.key.clone(),
            level: 1,
            base_stats: AbilityScores::default(),
            skill_points: 0,
            flat_modifiers: FlatModifiers::default(),
            derived_baseline: DerivedBaseline::default(),
            derived_final: DerivedFinal::default(),
            current_health: 0,
            current_resource: 0,
            melee: MeleeProfile::new("1d4", 0),
            fruit: None,
            equipment: Vec::new(),
            hidden: false,
        };
        character.recalculate(race);
        character.restore_pools();
        character
    }

    #[test]
    fn test_ability_parse() {
        assert_eq!("str".parse::<Ability>().unwrap(), Ability::Strength);
        assert_eq!("DEX".parse::<Ability>().unwrap(), Ability::Dexterity);
        assert_eq!("Wisdom".parse::<Ability>().unwrap(), Ability::Wisdom);
        assert!("luck".parse::<Ability>().is_err());
    }

    #[test]
    fn test_ability_scores_floor() {
        let mut scores = AbilityScores::default();
        scores.adjust(Ability::Strength, -50);
        assert_eq!(scores.strength, MIN_ABILITY_SCORE);

        scores.set(Ability::Charisma, 0);
        assert_eq!(scores.charisma, MIN_ABILITY_SCORE);
        assert!(scores.all_at_least_minimum());
    }

    #[test]
    fn test_ability_modifier() {
        let scores = AbilityScores::new(16, 14, 12, 10, 8, 9);
        assert_eq!(scores.modifier(Ability::Strength), 3);
        assert_eq!(scores.modifier(Ability::Dexterity), 2);
        assert_eq!(scores.modifier(Ability::Constitution), 1);
        assert_eq!(scores.modifier(Ability::Intelligence), 0);
        assert_eq!(scores.modifier(Ability::Wisdom), -1);
        assert_eq!(scores.modifier(Ability::Charisma), -1); // 9 -> -1, floor not truncation
    }

    #[test]
    fn test_melee_describe() {
        assert_eq!(MeleeProfile::new("1d4", 0).describe(), "1d4");
        assert_eq!(MeleeProfile::new("1d4", 2).describe(), "1d4+2");
        assert_eq!(MeleeProfile::new("2d6", -1).describe(), "2d6-1");
    }

    #[test]
    fn test_clamp_does_not_raise() {
        let mut character = human();
        character.current_health = 3;
        character.clamp_pools();
        assert_eq!(character.current_health, 3);

        character.current_health = 500;
        character.current_resource = -4;
        character.clamp_pools();
        assert_eq!(character.current_health, character.max_health());
        assert_eq!(character.current_resource, 0);
    }

    #[test]
    fn test_duplicate_is_independent() {
        let original = human();
        let mut copy = original.duplicate();

        assert_ne!(copy.id, original.id);
        assert_eq!(copy.name, "Koby (Copy)");
        assert_eq!(copy.base_stats, original.base_stats);

        copy.base_stats.adjust(Ability::Strength, 5);
        copy.equipment.push(EquipmentSlot::custom("Marine cap"));
        assert_eq!(original.base_stats.strength, 10);
        assert!(original.equipment.is_empty());
    }

    #[test]
    fn test_invariant_violations() {
        let mut character = human();
        assert!(character.is_consistent());

        character.current_health = character.max_health() + 1;
        character.derived_final.reflex += 3;
        let violations = character.invariant_violations();
        assert_eq!(violations.len(), 2);
        assert!(violations[0].contains("current health"));
    }
}
