//! Character creation.
//!
//! A [`CharacterDraft`] collects the player's choices before a race is
//! picked; building it produces an active, fully derived character. DM
//! tools create characters directly from a [`CustomCharacter`] or at random.

use crate::catalog::ReferenceData;
use crate::character::{
    Ability, AbilityScores, Character, CharacterId, FlatModifiers, MAX_LEVEL, MIN_ABILITY_SCORE,
    MIN_LEVEL,
};
use crate::derive;
use crate::error::SheetError;
use crate::races::RaceData;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Builder for player-created characters.
#[derive(Debug, Clone, Default)]
pub struct CharacterDraft {
    name: String,
    passcode: String,
    race: Option<String>,
    start_with_fruit: bool,
}

impl CharacterDraft {
    pub fn new(name: impl Into<String>, passcode: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passcode: passcode.into(),
            ..Self::default()
        }
    }

    /// Set the race key.
    pub fn race(mut self, race_key: impl Into<String>) -> Self {
        self.race = Some(race_key.into());
        self
    }

    /// Start with a Devil Fruit picked at random from the catalog.
    pub fn with_fruit(mut self, start_with_fruit: bool) -> Self {
        self.start_with_fruit = start_with_fruit;
        self
    }

    pub fn has_race(&self) -> bool {
        self.race.is_some()
    }

    /// Build using the thread-local RNG for the fruit pick.
    pub fn build(&self, data: &ReferenceData) -> Result<Character, SheetError> {
        self.build_with_rng(data, &mut rand::thread_rng())
    }

    /// Build the character.
    pub fn build_with_rng<R: Rng + ?Sized>(
        &self,
        data: &ReferenceData,
        rng: &mut R,
    ) -> Result<Character, SheetError> {
        validate_identity(&self.name, &self.passcode)?;
        let race_key = self
            .race
            .as_deref()
            .ok_or_else(|| SheetError::validation("race selection is required"))?;
        let race = data.races.require(race_key)?;

        let mut stats = AbilityScores::default();
        race.apply_ability_bonuses(&mut stats);

        let fruit = if self.start_with_fruit {
            data.random_fruit(rng).map(|f| f.to_ref())
        } else {
            None
        };

        let mut character = assemble(&self.name, &self.passcode, race, MIN_LEVEL, stats);
        character.skill_points = race.starting_skill_points;
        character.fruit = fruit;
        Ok(character)
    }
}

/// Parameters for a DM-created character.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomCharacter {
    pub name: String,
    pub passcode: String,
    pub race: String,
    pub level: u32,
    /// Used as given; race bonuses are not applied on top.
    pub base_stats: AbilityScores,
    pub skill_points: u32,
    pub hidden: bool,
    pub fruit: Option<String>,
}

impl CustomCharacter {
    pub fn new(name: impl Into<String>, passcode: impl Into<String>, race: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passcode: passcode.into(),
            race: race.into(),
            level: MIN_LEVEL,
            base_stats: AbilityScores::default(),
            skill_points: 0,
            hidden: false,
            fruit: None,
        }
    }
}

/// Build a character from explicit DM parameters.
pub fn build_custom(custom: &CustomCharacter, data: &ReferenceData) -> Result<Character, SheetError> {
    validate_identity(&custom.name, &custom.passcode)?;
    if !(MIN_LEVEL..=MAX_LEVEL).contains(&custom.level) {
        return Err(SheetError::validation(format!(
            "level must be between {MIN_LEVEL} and {MAX_LEVEL}"
        )));
    }
    if !custom.base_stats.all_at_least_minimum() {
        return Err(SheetError::validation(format!(
            "ability scores must be at least {MIN_ABILITY_SCORE}"
        )));
    }
    let race = data.races.require(&custom.race)?;

    let fruit = match custom.fruit.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(name) => Some(
            data.find_fruit(name)
                .ok_or_else(|| SheetError::FruitNotFound(name.to_string()))?
                .to_ref(),
        ),
    };

    let mut character = assemble(
        &custom.name,
        &custom.passcode,
        race,
        custom.level,
        custom.base_stats.clone(),
    );
    character.skill_points = custom.skill_points;
    character.hidden = custom.hidden;
    character.fruit = fruit;
    Ok(character)
}

/// Roll up a hidden NPC: random race, its starting skill points spent at
/// random, and an even chance of a Devil Fruit.
pub fn build_random<R: Rng + ?Sized>(
    name: &str,
    passcode: &str,
    data: &ReferenceData,
    rng: &mut R,
) -> Result<Character, SheetError> {
    validate_identity(name, passcode)?;
    let race = data
        .races
        .all()
        .choose(rng)
        .ok_or_else(|| SheetError::validation("race table is empty"))?;

    let mut stats = AbilityScores::default();
    race.apply_ability_bonuses(&mut stats);
    let abilities = Ability::all();
    for _ in 0..race.starting_skill_points {
        if let Some(ability) = abilities.choose(rng) {
            stats.adjust(*ability, 1);
        }
    }

    let fruit = if rng.gen_bool(0.5) {
        data.random_fruit(rng).map(|f| f.to_ref())
    } else {
        None
    };

    let mut character = assemble(name, passcode, race, MIN_LEVEL, stats);
    character.hidden = true;
    character.fruit = fruit;
    Ok(character)
}

fn validate_identity(name: &str, passcode: &str) -> Result<(), SheetError> {
    if name.trim().is_empty() {
        return Err(SheetError::validation("name must not be empty"));
    }
    if passcode.is_empty() {
        return Err(SheetError::validation("passcode must not be empty"));
    }
    Ok(())
}

/// Fresh active character with derived stats computed and full pools.
fn assemble(
    name: &str,
    passcode: &str,
    race: &RaceData,
    level: u32,
    base_stats: AbilityScores,
) -> Character {
    let flat_modifiers = FlatModifiers::default();
    let (derived_baseline, derived_final) =
        derive::derive_all(race, &base_stats, level, &flat_modifiers);
    let melee = derive::default_melee_profile(&base_stats);

    let mut character = Character {
        id: CharacterId::new(),
        name: name.trim().to_string(),
        passcode: passcode.to_string(),
        race: race.key.clone(),
        level,
        base_stats,
        skill_points: 0,
        flat_modifiers,
        derived_baseline,
        derived_final,
        current_health: 0,
        current_resource: 0,
        melee,
        fruit: None,
        equipment: Vec::new(),
        hidden: false,
    };
    character.restore_pools();
    character
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_human_creation() {
        let data = ReferenceData::standard();
        let character = CharacterDraft::new("Monkey D. Luffy", "meat")
            .race("human")
            .build(&data)
            .unwrap();

        assert_eq!(character.level, 1);
        assert_eq!(character.skill_points, 5);
        assert_eq!(character.base_stats, AbilityScores::default());
        assert_eq!(character.flat_modifiers, FlatModifiers::default());
        assert_eq!(character.max_health(), 20);
        assert_eq!(character.max_resource(), 105);
        assert_eq!(character.reflex(), 7);
        assert_eq!(character.current_health, 20);
        assert_eq!(character.current_resource, 105);
        assert_eq!(character.melee.describe(), "1d4");
        assert!(character.fruit.is_none());
        assert!(character.is_consistent());
    }

    #[test]
    fn test_race_bonuses_applied() {
        let data = ReferenceData::standard();
        let character = CharacterDraft::new("Jinbe", "firstson")
            .race("Fishman")
            .build(&data)
            .unwrap();

        assert_eq!(character.race, "fishman");
        assert_eq!(character.base_stats.strength, 12);
        assert_eq!(character.base_stats.constitution, 11);
        // 26 + 1 from CON
        assert_eq!(character.max_health(), 27);
        assert_eq!(character.melee.flat_bonus, 1);
    }

    #[test]
    fn test_validation_errors() {
        let data = ReferenceData::standard();
        assert!(matches!(
            CharacterDraft::new("", "pw").race("human").build(&data),
            Err(SheetError::Validation(_))
        ));
        assert!(matches!(
            CharacterDraft::new("Zoro", "").race("human").build(&data),
            Err(SheetError::Validation(_))
        ));
        assert!(matches!(
            CharacterDraft::new("Zoro", "pw").build(&data),
            Err(SheetError::Validation(_))
        ));
        assert!(matches!(
            CharacterDraft::new("Zoro", "pw").race("skeleton").build(&data),
            Err(SheetError::UnknownRace(_))
        ));
    }

    #[test]
    fn test_start_with_fruit() {
        let data = ReferenceData::standard();
        let mut rng = StdRng::seed_from_u64(7);
        let character = CharacterDraft::new("Ace", "fire")
            .race("human")
            .with_fruit(true)
            .build_with_rng(&data, &mut rng)
            .unwrap();

        let fruit = character.fruit.expect("fruit should be assigned");
        assert!(data.find_fruit(&fruit.name).is_some());
    }

    #[test]
    fn test_build_custom() {
        let data = ReferenceData::standard();
        let mut custom = CustomCharacter::new("Smoker", "white", "human");
        custom.level = 5;
        custom.base_stats = AbilityScores::new(14, 12, 15, 10, 10, 10);
        custom.hidden = true;
        custom.fruit = Some("moku moku no mi".to_string());

        assert!(matches!(
            build_custom(&custom, &data),
            Err(SheetError::FruitNotFound(_))
        ));

        custom.fruit = Some("suna suna no mi".to_string());
        let character = build_custom(&custom, &data).unwrap();
        assert_eq!(character.level, 5);
        assert!(character.hidden);
        assert_eq!(character.fruit.as_ref().unwrap().name, "Suna Suna no Mi");
        // round((20 + 5) * 1.8)
        assert_eq!(character.max_health(), 45);
        assert_eq!(character.current_health, 45);

        custom.level = 0;
        assert!(matches!(
            build_custom(&custom, &data),
            Err(SheetError::Validation(_))
        ));

        custom.level = MAX_LEVEL + 1;
        assert!(matches!(
            build_custom(&custom, &data),
            Err(SheetError::Validation(_))
        ));

        custom.level = 1;
        custom.base_stats.wisdom = 0;
        assert!(matches!(
            build_custom(&custom, &data),
            Err(SheetError::Validation(_))
        ));
    }

    #[test]
    fn test_build_random_is_hidden_and_consistent() {
        let data = ReferenceData::standard();
        for seed in 0..50 {
            let mut rng = StdRng::seed_from_u64(seed);
            let character = build_random("Bandit", "npc", &data, &mut rng).unwrap();

            assert!(character.hidden);
            assert_eq!(character.skill_points, 0);
            assert!(character.is_consistent());

            let race = data.races.get(&character.race).unwrap();
            let mut expected = AbilityScores::default();
            race.apply_ability_bonuses(&mut expected);
            let spent: i32 = Ability::all()
                .iter()
                .map(|a| character.base_stats.get(*a) - expected.get(*a))
                .sum();
            assert_eq!(spent, race.starting_skill_points as i32);
        }
    }
}
