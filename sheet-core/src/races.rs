//! Race table.
//!
//! Each race carries the base numbers the derivation engine starts from,
//! plus ability bonuses applied once at creation and the starting pool of
//! skill points.

use crate::character::{Ability, AbilityScores};
use crate::error::SheetError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One row of the race table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RaceData {
    /// Lookup key, e.g. `human`.
    pub key: String,
    /// Display name, e.g. `Human`.
    pub name: String,
    pub description: String,
    /// Ability score adjustments applied at creation.
    #[serde(default)]
    pub stat_bonuses: BTreeMap<Ability, i32>,
    pub base_health: i32,
    pub base_resource: i32,
    pub base_reflex: i32,
    /// Run speed in feet per turn.
    pub run_speed: u32,
    pub starting_skill_points: u32,
}

impl RaceData {
    /// Apply racial ability score bonuses to base scores.
    pub fn apply_ability_bonuses(&self, scores: &mut AbilityScores) {
        for (ability, bonus) in &self.stat_bonuses {
            scores.adjust(*ability, *bonus);
        }
    }

    /// Get ability bonus description for display.
    pub fn ability_bonuses(&self) -> String {
        if self.stat_bonuses.is_empty() {
            return "No ability adjustments".to_string();
        }
        self.stat_bonuses
            .iter()
            .map(|(ability, bonus)| format!("{bonus:+} {}", ability.name()))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn validate(&self) -> Result<(), SheetError> {
        if self.key.trim().is_empty() {
            return Err(SheetError::Validation("race key must not be empty".into()));
        }
        if self.base_health < 0 || self.base_resource < 0 || self.base_reflex < 0 {
            return Err(SheetError::Validation(format!(
                "race {} has negative base stats",
                self.key
            )));
        }
        Ok(())
    }
}

/// Immutable mapping from race key to race data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RaceTable {
    races: Vec<RaceData>,
}

impl RaceTable {
    pub fn new(races: Vec<RaceData>) -> Result<Self, SheetError> {
        for (i, race) in races.iter().enumerate() {
            race.validate()?;
            if races[..i]
                .iter()
                .any(|r| r.key.eq_ignore_ascii_case(&race.key))
            {
                return Err(SheetError::Validation(format!(
                    "duplicate race key: {}",
                    race.key
                )));
            }
        }
        Ok(Self { races })
    }

    /// The built-in race table.
    pub fn standard() -> Self {
        Self {
            races: STANDARD_RACES.clone(),
        }
    }

    /// Look up a race by key (case-insensitive).
    pub fn get(&self, key: &str) -> Option<&RaceData> {
        let key = key.trim();
        self.races.iter().find(|r| r.key.eq_ignore_ascii_case(key))
    }

    /// Look up a race by key, failing with `UnknownRace`.
    pub fn require(&self, key: &str) -> Result<&RaceData, SheetError> {
        self.get(key)
            .ok_or_else(|| SheetError::UnknownRace(key.to_string()))
    }

    pub fn all(&self) -> &[RaceData] {
        &self.races
    }

    pub fn len(&self) -> usize {
        self.races.len()
    }

    pub fn is_empty(&self) -> bool {
        self.races.is_empty()
    }

    pub(crate) fn validate(&self) -> Result<(), SheetError> {
        Self::new(self.races.clone()).map(|_| ())
    }
}

#[allow(clippy::too_many_arguments)]
fn race(
    key: &str,
    name: &str,
    description: &str,
    bonuses: &[(Ability, i32)],
    base_health: i32,
    base_resource: i32,
    base_reflex: i32,
    run_speed: u32,
    starting_skill_points: u32,
) -> RaceData {
    RaceData {
        key: key.to_string(),
        name: name.to_string(),
        description: description.to_string(),
        stat_bonuses: bonuses.iter().copied().collect(),
        base_health,
        base_resource,
        base_reflex,
        run_speed,
        starting_skill_points,
    }
}

lazy_static::lazy_static! {
    /// Built-in playable races.
    pub static ref STANDARD_RACES: Vec<RaceData> = vec![
        race(
            "human", "Human",
            "Adaptable and stubborn, humans sail every sea of the world.",
            &[],
            20, 100, 5, 30, 5,
        ),
        race(
            "fishman", "Fishman",
            "Born beneath the waves with ten times the strength of a human.",
            &[(Ability::Strength, 2), (Ability::Constitution, 1)],
            26, 90, 4, 30, 3,
        ),
        race(
            "mink", "Mink",
            "Furred warriors of Zou, natural wielders of Electro.",
            &[(Ability::Dexterity, 2), (Ability::Wisdom, 1)],
            22, 95, 7, 40, 3,
        ),
        race(
            "giant", "Giant",
            "Towering folk of Elbaph whose every step shakes the deck.",
            &[(Ability::Strength, 3), (Ability::Constitution, 2), (Ability::Dexterity, -2)],
            40, 80, 2, 45, 2,
        ),
        race(
            "skypiean", "Skypiean",
            "Winged people of the sky islands, attuned to dials and mantra.",
            &[(Ability::Dexterity, 1), (Ability::Intelligence, 1), (Ability::Wisdom, 1)],
            18, 110, 6, 30, 4,
        ),
        race(
            "tontatta", "Tontatta",
            "Tiny and impossibly quick dwarves from Green Bit.",
            &[(Ability::Dexterity, 3), (Ability::Strength, -1)],
            14, 100, 9, 35, 3,
        ),
        race(
            "lunarian", "Lunarian",
            "A near-extinct race wreathed in flame, said to be hard to kill.",
            &[(Ability::Constitution, 2), (Ability::Charisma, 1)],
            30, 100, 5, 30, 2,
        ),
        race(
            "longarm", "Longarm Tribe",
            "Every arm has an extra joint, lending reach and leverage.",
            &[(Ability::Strength, 1), (Ability::Dexterity, 1)],
            20, 100, 6, 30, 4,
        ),
        race(
            "cyborg", "Cyborg",
            "Flesh rebuilt with steel and cola-fuelled machinery.",
            &[(Ability::Constitution, 2), (Ability::Intelligence, 1)],
            28, 85, 4, 30, 3,
        ),
    ];
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_table_lookup() {
        let table = RaceTable::standard();
        assert_eq!(table.len(), STANDARD_RACES.len());

        let human = table.get("human").unwrap();
        assert_eq!(human.base_health, 20);
        assert_eq!(human.base_resource, 100);
        assert_eq!(human.base_reflex, 5);

        // Case-insensitive
        assert!(table.get("Fishman").is_some());
        assert!(matches!(
            table.require("sea king"),
            Err(SheetError::UnknownRace(key)) if key == "sea king"
        ));
    }

    #[test]
    fn test_standard_table_is_valid() {
        assert!(RaceTable::standard().validate().is_ok());
    }

    #[test]
    fn test_apply_ability_bonuses() {
        let table = RaceTable::standard();

        let mut scores = AbilityScores::default();
        table.get("human").unwrap().apply_ability_bonuses(&mut scores);
        assert_eq!(scores, AbilityScores::default());

        let mut scores = AbilityScores::default();
        table.get("giant").unwrap().apply_ability_bonuses(&mut scores);
        assert_eq!(scores.strength, 13);
        assert_eq!(scores.constitution, 12);
        assert_eq!(scores.dexterity, 8);
    }

    #[test]
    fn test_ability_bonuses_description() {
        let table = RaceTable::standard();
        assert_eq!(
            table.get("fishman").unwrap().ability_bonuses(),
            "+2 Strength, +1 Constitution"
        );
        assert_eq!(
            table.get("human").unwrap().ability_bonuses(),
            "No ability adjustments"
        );
    }

    #[test]
    fn test_rejects_duplicate_and_negative() {
        let mut races = STANDARD_RACES.clone();
        races.push(races[0].clone());
        assert!(RaceTable::new(races).is_err());

        let mut bad = STANDARD_RACES[0].clone();
        bad.key = "ghost".to_string();
        bad.base_health = -1;
        assert!(RaceTable::new(vec![bad]).is_err());
    }
}
