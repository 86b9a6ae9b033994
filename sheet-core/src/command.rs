//! Character mutations as command objects.
//!
//! Every change to a character is a [`Command`]. [`apply_command`] is the
//! only place a command turns into a new record:
//! 1. validate the command against the current record and reference data
//! 2. edit a copy of the record
//! 3. recompute the derived bundles from race, stats, level and modifiers
//! 4. reconcile the live pools (clamp, or full restore for level-ups)
//!
//! The input record is never touched, so a rejected command or a failed
//! write leaves the caller holding the previous, still-valid record.

use crate::catalog::ReferenceData;
use crate::character::{
    Ability, Character, EquipmentSlot, ModifierChannel, MAX_LEVEL, MIN_LEVEL,
};
use crate::dice;
use crate::error::SheetError;
use serde::{Deserialize, Serialize};

/// Skill points granted per level gained.
pub const SKILL_POINTS_PER_LEVEL: u32 = 3;

/// A field of an equipment slot to overwrite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlotField {
    /// Point the slot at a catalog item, or `None` to make it free text.
    ItemKey(Option<String>),
    Quantity(u32),
    CustomDescription(String),
}

/// A single validated change to a character.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    /// Gain a level and refill both pools.
    LevelUp,

    /// Spend one skill point on an ability.
    IncreaseAbilityScore { ability: Ability },

    ApplyDamage { amount: i32 },

    Heal { amount: i32 },

    SpendResource { amount: i32 },

    RestoreResource { amount: i32 },

    /// Refill both pools without changing anything else.
    FullRestore,

    /// Set a DM modifier to an absolute value.
    SetFlatModifier { channel: ModifierChannel, value: i32 },

    /// DM level change. Grants or removes a flat block of skill points.
    AdjustLevel { delta: i32 },

    /// DM ability change, not gated by skill points.
    SetAbilityScore { ability: Ability, delta: i32 },

    SetMeleeProfile { dice_expression: String, flat_bonus: i32 },

    /// Assign a Devil Fruit by name, or clear it with `None` / empty name.
    SetDevilFruit { fruit: Option<String> },

    SetHidden { hidden: bool },

    AddEquipmentSlot { slot: EquipmentSlot },

    UpdateEquipmentSlot { index: usize, field: SlotField },

    RemoveEquipmentSlot { index: usize },

    /// DM rewrite of the race key. Ability bonuses are not reapplied.
    SetRace { race_key: String },

    Rename { name: String },

    SetPasscode { passcode: String },
}

/// How live pools follow a change in their maxima.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolPolicy {
    /// Pull current values down to the new maxima, never raise them.
    Clamp,
    /// Set current values to the new maxima.
    Restore,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::LevelUp => "level_up",
            Command::IncreaseAbilityScore { .. } => "increase_ability_score",
            Command::ApplyDamage { .. } => "apply_damage",
            Command::Heal { .. } => "heal",
            Command::SpendResource { .. } => "spend_resource",
            Command::RestoreResource { .. } => "restore_resource",
            Command::FullRestore => "full_restore",
            Command::SetFlatModifier { .. } => "set_flat_modifier",
            Command::AdjustLevel { .. } => "adjust_level",
            Command::SetAbilityScore { .. } => "set_ability_score",
            Command::SetMeleeProfile { .. } => "set_melee_profile",
            Command::SetDevilFruit { .. } => "set_devil_fruit",
            Command::SetHidden { .. } => "set_hidden",
            Command::AddEquipmentSlot { .. } => "add_equipment_slot",
            Command::UpdateEquipmentSlot { .. } => "update_equipment_slot",
            Command::RemoveEquipmentSlot { .. } => "remove_equipment_slot",
            Command::SetRace { .. } => "set_race",
            Command::Rename { .. } => "rename",
            Command::SetPasscode { .. } => "set_passcode",
        }
    }

    /// Commands only the DM tools issue.
    pub fn is_dm_only(&self) -> bool {
        matches!(
            self,
            Command::SetFlatModifier { .. }
                | Command::AdjustLevel { .. }
                | Command::SetAbilityScore { .. }
                | Command::SetMeleeProfile { .. }
                | Command::SetHidden { .. }
                | Command::SetRace { .. }
                | Command::SetPasscode { .. }
        )
    }

    pub fn pool_policy(&self) -> PoolPolicy {
        match self {
            Command::LevelUp | Command::FullRestore => PoolPolicy::Restore,
            _ => PoolPolicy::Clamp,
        }
    }
}

/// Produce the record that results from applying `command` to `character`.
pub fn apply_command(
    character: &Character,
    command: &Command,
    data: &ReferenceData,
) -> Result<Character, SheetError> {
    let mut next = character.clone();
    edit(&mut next, command, data)?;
    reconcile(&mut next, command.pool_policy(), data)?;
    Ok(next)
}

/// Recompute derived stats and bring the pools back within bounds.
pub fn reconcile(
    character: &mut Character,
    policy: PoolPolicy,
    data: &ReferenceData,
) -> Result<(), SheetError> {
    let race = data.races.require(&character.race)?;
    character.recalculate(race);
    match policy {
        PoolPolicy::Clamp => character.clamp_pools(),
        PoolPolicy::Restore => character.restore_pools(),
    }
    Ok(())
}

fn non_negative(amount: i32) -> Result<i32, SheetError> {
    if amount < 0 {
        return Err(SheetError::InvalidAmount(amount));
    }
    Ok(amount)
}

fn check_slot(character: &Character, index: usize) -> Result<(), SheetError> {
    if index >= character.equipment.len() {
        return Err(SheetError::SlotOutOfRange {
            index,
            len: character.equipment.len(),
        });
    }
    Ok(())
}

/// Catalog spelling of an item key, or `UnknownItem`.
fn catalog_key(data: &ReferenceData, key: &str) -> Result<String, SheetError> {
    data.find_item(key)
        .map(|item| item.name.clone())
        .ok_or_else(|| SheetError::UnknownItem(key.to_string()))
}

fn edit(c: &mut Character, command: &Command, data: &ReferenceData) -> Result<(), SheetError> {
    match command {
        Command::LevelUp => {
            c.level = c.level.saturating_add(1).min(MAX_LEVEL);
            c.skill_points = c.skill_points.saturating_add(SKILL_POINTS_PER_LEVEL);
        }

        Command::IncreaseAbilityScore { ability } => {
            if c.skill_points == 0 {
                return Err(SheetError::InsufficientSkillPoints { available: 0 });
            }
            c.base_stats.adjust(*ability, 1);
            c.skill_points -= 1;
        }

        Command::ApplyDamage { amount } => {
            let amount = non_negative(*amount)?;
            c.current_health = c.current_health.saturating_sub(amount).max(0);
        }

        Command::Heal { amount } => {
            let amount = non_negative(*amount)?;
            c.current_health = c
                .current_health
                .saturating_add(amount)
                .min(c.derived_final.max_health);
        }

        Command::SpendResource { amount } => {
            let amount = non_negative(*amount)?;
            if amount > c.current_resource {
                return Err(SheetError::validation(format!(
                    "not enough resource: have {}, need {amount}",
                    c.current_resource
                )));
            }
            c.current_resource -= amount;
        }

        Command::RestoreResource { amount } => {
            let amount = non_negative(*amount)?;
            c.current_resource = c
                .current_resource
                .saturating_add(amount)
                .min(c.derived_final.max_resource);
        }

        Command::FullRestore => {}

        Command::SetFlatModifier { channel, value } => {
            c.flat_modifiers.set(*channel, *value);
        }

        Command::AdjustLevel { delta } => {
            let level = (c.level as i64 + *delta as i64)
                .clamp(MIN_LEVEL as i64, MAX_LEVEL as i64);
            c.level = level as u32;
            c.skill_points = if *delta > 0 {
                c.skill_points.saturating_add(SKILL_POINTS_PER_LEVEL)
            } else {
                c.skill_points.saturating_sub(SKILL_POINTS_PER_LEVEL)
            };
        }

        Command::SetAbilityScore { ability, delta } => {
            c.base_stats.adjust(*ability, *delta);
        }

        Command::SetMeleeProfile {
            dice_expression,
            flat_bonus,
        } => {
            let dice_expression = dice_expression.trim();
            if dice_expression.is_empty() {
                return Err(SheetError::validation("dice expression must not be empty"));
            }
            dice::validate(dice_expression)?;
            c.melee.dice_expression = dice_expression.to_string();
            c.melee.flat_bonus = *flat_bonus;
        }

        Command::SetDevilFruit { fruit } => {
            c.fruit = match fruit.as_deref().map(str::trim) {
                None | Some("") => None,
                Some(name) => Some(
                    data.find_fruit(name)
                        .ok_or_else(|| SheetError::FruitNotFound(name.to_string()))?
                        .to_ref(),
                ),
            };
        }

        Command::SetHidden { hidden } => c.hidden = *hidden,

        Command::AddEquipmentSlot { slot } => {
            let mut slot = slot.clone();
            if let Some(key) = &slot.item_key {
                slot.item_key = Some(catalog_key(data, key)?);
            }
            c.equipment.push(slot);
        }

        Command::UpdateEquipmentSlot { index, field } => {
            check_slot(c, *index)?;
            let slot = &mut c.equipment[*index];
            match field {
                SlotField::ItemKey(Some(key)) => slot.item_key = Some(catalog_key(data, key)?),
                SlotField::ItemKey(None) => slot.item_key = None,
                SlotField::Quantity(quantity) => slot.quantity = *quantity,
                SlotField::CustomDescription(text) => slot.custom_description = text.clone(),
            }
        }

        Command::RemoveEquipmentSlot { index } => {
            check_slot(c, *index)?;
            c.equipment.remove(*index);
        }

        Command::SetRace { race_key } => {
            c.race = data.races.require(race_key)?.key.clone();
        }

        Command::Rename { name } => {
            let name = name.trim();
            if name.is_empty() {
                return Err(SheetError::validation("name must not be empty"));
            }
            c.name = name.to_string();
        }

        Command::SetPasscode { passcode } => {
            if passcode.is_empty() {
                return Err(SheetError::validation("passcode must not be empty"));
            }
            c.passcode = passcode.clone();
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::CharacterDraft;

    fn setup() -> (ReferenceData, Character) {
        let data = ReferenceData::standard();
        let character = CharacterDraft::new("Sanji", "allblue")
            .race("human")
            .build(&data)
            .unwrap();
        (data, character)
    }

    fn apply(data: &ReferenceData, c: &Character, command: Command) -> Character {
        apply_command(c, &command, data).unwrap()
    }

    #[test]
    fn test_level_up_restores_pools() {
        let (data, c) = setup();
        let hurt = apply(&data, &c, Command::ApplyDamage { amount: 15 });
        let hurt = apply(&data, &hurt, Command::SpendResource { amount: 50 });

        let leveled = apply(&data, &hurt, Command::LevelUp);
        assert_eq!(leveled.level, 2);
        assert_eq!(leveled.skill_points, c.skill_points + 3);
        assert_eq!(leveled.derived_baseline.base_health, 24);
        assert_eq!(leveled.derived_baseline.base_resource, 110);
        assert_eq!(leveled.derived_baseline.base_reflex, 7);
        assert_eq!(leveled.current_health, 24);
        assert_eq!(leveled.current_resource, 110);
    }

    #[test]
    fn test_increase_ability_score_clamps_only() {
        let (data, c) = setup();
        let hurt = apply(&data, &c, Command::ApplyDamage { amount: 5 });

        let raised = apply(
            &data,
            &hurt,
            Command::IncreaseAbilityScore {
                ability: Ability::Constitution,
            },
        );
        assert_eq!(raised.base_stats.constitution, 11);
        assert_eq!(raised.skill_points, c.skill_points - 1);
        assert_eq!(raised.max_health(), 21);
        // Max rose; current stays where it was
        assert_eq!(raised.current_health, 15);
    }

    #[test]
    fn test_skill_point_gating() {
        let (data, mut c) = setup();
        c.skill_points = 0;
        let result = apply_command(
            &c,
            &Command::IncreaseAbilityScore {
                ability: Ability::Strength,
            },
            &data,
        );
        assert!(matches!(
            result,
            Err(SheetError::InsufficientSkillPoints { available: 0 })
        ));
        assert_eq!(c.base_stats.strength, 10);
    }

    #[test]
    fn test_damage_and_heal() {
        let (data, c) = setup();
        let c = apply(&data, &c, Command::ApplyDamage { amount: 12 });
        assert_eq!(c.current_health, 8);
        let c = apply(&data, &c, Command::Heal { amount: 100 });
        assert_eq!(c.current_health, 20);
        let c = apply(&data, &c, Command::ApplyDamage { amount: 1000 });
        assert_eq!(c.current_health, 0);
        assert!(!c.is_conscious());

        assert!(matches!(
            apply_command(&c, &Command::ApplyDamage { amount: -3 }, &data),
            Err(SheetError::InvalidAmount(-3))
        ));
        assert!(matches!(
            apply_command(&c, &Command::Heal { amount: -1 }, &data),
            Err(SheetError::InvalidAmount(-1))
        ));
    }

    #[test]
    fn test_resource_pool() {
        let (data, c) = setup();
        let c = apply(&data, &c, Command::SpendResource { amount: 100 });
        assert_eq!(c.current_resource, 5);
        assert!(matches!(
            apply_command(&c, &Command::SpendResource { amount: 6 }, &data),
            Err(SheetError::Validation(_))
        ));
        let c = apply(&data, &c, Command::RestoreResource { amount: 1000 });
        assert_eq!(c.current_resource, 105);
    }

    #[test]
    fn test_full_restore() {
        let (data, c) = setup();
        let tired = apply(&data, &c, Command::ApplyDamage { amount: 19 });
        let tired = apply(&data, &tired, Command::SpendResource { amount: 99 });
        let rested = apply(&data, &tired, Command::FullRestore);
        assert_eq!(rested.current_health, rested.max_health());
        assert_eq!(rested.current_resource, rested.max_resource());
        assert_eq!(rested.level, tired.level);
        assert_eq!(rested.skill_points, tired.skill_points);
    }

    #[test]
    fn test_flat_modifier_then_damage() {
        let (data, c) = setup();
        let c = apply(
            &data,
            &c,
            Command::SetFlatModifier {
                channel: ModifierChannel::Health,
                value: 5,
            },
        );
        assert_eq!(c.max_health(), 25);
        // Modifier raises the max, not the current pool
        assert_eq!(c.current_health, 20);

        let c = apply(&data, &c, Command::ApplyDamage { amount: 35 });
        assert_eq!(c.current_health, 0);
    }

    #[test]
    fn test_negative_modifier_clamps_pool_down() {
        let (data, c) = setup();
        let c = apply(
            &data,
            &c,
            Command::SetFlatModifier {
                channel: ModifierChannel::Resource,
                value: -200,
            },
        );
        assert_eq!(c.max_resource(), 0);
        assert_eq!(c.current_resource, 0);

        let c = apply(
            &data,
            &c,
            Command::SetFlatModifier {
                channel: ModifierChannel::Health,
                value: -100,
            },
        );
        assert_eq!(c.max_health(), 1);
        assert_eq!(c.current_health, 1);
    }

    #[test]
    fn test_adjust_level() {
        let (data, c) = setup();
        let hurt = apply(&data, &c, Command::ApplyDamage { amount: 10 });

        let up = apply(&data, &hurt, Command::AdjustLevel { delta: 2 });
        assert_eq!(up.level, 3);
        assert_eq!(up.skill_points, c.skill_points + 3);
        // No full restore for DM adjustments
        assert_eq!(up.current_health, 10);

        let down = apply(&data, &up, Command::AdjustLevel { delta: -10 });
        assert_eq!(down.level, 1);
        assert_eq!(down.skill_points, c.skill_points);

        let mut broke = down.clone();
        broke.skill_points = 1;
        let floored = apply(&data, &broke, Command::AdjustLevel { delta: -1 });
        assert_eq!(floored.skill_points, 0);
    }

    #[test]
    fn test_adjust_level_by_zero_still_costs_skill_points() {
        let (data, c) = setup();
        let same = apply(&data, &c, Command::AdjustLevel { delta: 0 });
        assert_eq!(same.level, c.level);
        assert_eq!(same.skill_points, c.skill_points.saturating_sub(3));
    }

    #[test]
    fn test_level_is_capped() {
        let (data, c) = setup();
        let huge = apply(&data, &c, Command::AdjustLevel { delta: i32::MAX });
        let huge = apply(&data, &huge, Command::AdjustLevel { delta: i32::MAX });
        assert_eq!(huge.level, MAX_LEVEL);
        assert!(huge.derived_baseline.base_resource >= c.derived_baseline.base_resource);
        assert!(huge.derived_baseline.base_reflex >= c.derived_baseline.base_reflex);
        assert!(huge.is_consistent());

        let still = apply(&data, &huge, Command::LevelUp);
        assert_eq!(still.level, MAX_LEVEL);
        assert_eq!(still.current_health, still.max_health());

        let floor = apply(&data, &huge, Command::AdjustLevel { delta: i32::MIN });
        assert_eq!(floor.level, MIN_LEVEL);
    }

    #[test]
    fn test_extreme_ability_scores_do_not_overflow() {
        let (data, c) = setup();
        let mut c = c;
        for ability in Ability::all() {
            c = apply(
                &data,
                &c,
                Command::SetAbilityScore {
                    ability,
                    delta: i32::MAX,
                },
            );
        }
        assert_eq!(c.base_stats.intelligence, i32::MAX);
        assert_eq!(c.derived_baseline.base_resource, i32::MAX);
        assert_eq!(c.derived_baseline.base_health, i32::MAX);
        assert!(c.is_consistent());

        let c = apply(
            &data,
            &c,
            Command::SetAbilityScore {
                ability: Ability::Wisdom,
                delta: i32::MIN,
            },
        );
        assert_eq!(c.base_stats.wisdom, 1);
        assert!(c.is_consistent());
    }

    #[test]
    fn test_set_ability_score_ignores_skill_points() {
        let (data, mut c) = setup();
        c.skill_points = 0;
        let c = apply(
            &data,
            &c,
            Command::SetAbilityScore {
                ability: Ability::Dexterity,
                delta: 5,
            },
        );
        assert_eq!(c.base_stats.dexterity, 15);
        assert_eq!(c.reflex(), 5 + 3);

        let c = apply(
            &data,
            &c,
            Command::SetAbilityScore {
                ability: Ability::Dexterity,
                delta: -40,
            },
        );
        assert_eq!(c.base_stats.dexterity, 1);
        assert_eq!(c.skill_points, 0);
    }

    #[test]
    fn test_set_melee_profile() {
        let (data, c) = setup();
        let c = apply(
            &data,
            &c,
            Command::SetMeleeProfile {
                dice_expression: " 2d6 ".to_string(),
                flat_bonus: 3,
            },
        );
        assert_eq!(c.melee.describe(), "2d6+3");

        assert!(matches!(
            apply_command(
                &c,
                &Command::SetMeleeProfile {
                    dice_expression: "".to_string(),
                    flat_bonus: 0
                },
                &data
            ),
            Err(SheetError::Validation(_))
        ));
        assert!(matches!(
            apply_command(
                &c,
                &Command::SetMeleeProfile {
                    dice_expression: "2d7".to_string(),
                    flat_bonus: 0
                },
                &data
            ),
            Err(SheetError::InvalidDice(_))
        ));
    }

    #[test]
    fn test_set_devil_fruit() {
        let (data, c) = setup();
        let c = apply(
            &data,
            &c,
            Command::SetDevilFruit {
                fruit: Some("MERA MERA NO MI".to_string()),
            },
        );
        assert_eq!(c.fruit.as_ref().unwrap().name, "Mera Mera no Mi");

        assert!(matches!(
            apply_command(
                &c,
                &Command::SetDevilFruit {
                    fruit: Some("Banana Banana no Mi".to_string())
                },
                &data
            ),
            Err(SheetError::FruitNotFound(_))
        ));

        let cleared = apply(
            &data,
            &c,
            Command::SetDevilFruit {
                fruit: Some("  ".to_string()),
            },
        );
        assert!(cleared.fruit.is_none());
    }

    #[test]
    fn test_equipment_slots() {
        let (data, c) = setup();
        let c = apply(
            &data,
            &c,
            Command::AddEquipmentSlot {
                slot: EquipmentSlot::catalog("cutlass", 1),
            },
        );
        assert_eq!(c.equipment[0].item_key.as_deref(), Some("Cutlass"));

        let c = apply(
            &data,
            &c,
            Command::UpdateEquipmentSlot {
                index: 0,
                field: SlotField::Quantity(2),
            },
        );
        assert_eq!(c.equipment[0].quantity, 2);

        let c = apply(
            &data,
            &c,
            Command::UpdateEquipmentSlot {
                index: 0,
                field: SlotField::CustomDescription("Kitchen knife, really".to_string()),
            },
        );
        assert_eq!(c.equipment[0].custom_description, "Kitchen knife, really");

        assert!(matches!(
            apply_command(
                &c,
                &Command::UpdateEquipmentSlot {
                    index: 0,
                    field: SlotField::ItemKey(Some("Rocket boots".to_string()))
                },
                &data
            ),
            Err(SheetError::UnknownItem(_))
        ));
        assert!(matches!(
            apply_command(
                &c,
                &Command::UpdateEquipmentSlot {
                    index: 3,
                    field: SlotField::Quantity(1)
                },
                &data
            ),
            Err(SheetError::SlotOutOfRange { index: 3, len: 1 })
        ));

        // Equipment never moves derived stats
        assert_eq!(c.derived_final.max_health, 20);

        let c = apply(&data, &c, Command::RemoveEquipmentSlot { index: 0 });
        assert!(c.equipment.is_empty());
    }

    #[test]
    fn test_set_race_keeps_stats() {
        let (data, c) = setup();
        let c = apply(
            &data,
            &c,
            Command::SetRace {
                race_key: "Giant".to_string(),
            },
        );
        assert_eq!(c.race, "giant");
        assert_eq!(c.base_stats.strength, 10);
        assert_eq!(c.max_health(), 40);
        // Current pool does not jump with the new max
        assert_eq!(c.current_health, 20);

        assert!(matches!(
            apply_command(
                &c,
                &Command::SetRace {
                    race_key: "ghost".to_string()
                },
                &data
            ),
            Err(SheetError::UnknownRace(_))
        ));
    }

    #[test]
    fn test_identity_commands() {
        let (data, c) = setup();
        let c = apply(
            &data,
            &c,
            Command::Rename {
                name: " Black Leg ".to_string(),
            },
        );
        assert_eq!(c.name, "Black Leg");
        assert!(apply_command(&c, &Command::Rename { name: " ".into() }, &data).is_err());
        assert!(apply_command(&c, &Command::SetPasscode { passcode: "".into() }, &data).is_err());

        let c = apply(&data, &c, Command::SetHidden { hidden: true });
        assert!(c.hidden);
    }

    #[test]
    fn test_rejected_command_leaves_input_untouched() {
        let (data, c) = setup();
        let before = c.clone();
        let _ = apply_command(&c, &Command::ApplyDamage { amount: -1 }, &data);
        assert_eq!(c, before);
    }

    #[test]
    fn test_command_metadata() {
        assert_eq!(Command::LevelUp.name(), "level_up");
        assert_eq!(Command::LevelUp.pool_policy(), PoolPolicy::Restore);
        assert_eq!(
            Command::AdjustLevel { delta: 1 }.pool_policy(),
            PoolPolicy::Clamp
        );
        assert!(Command::AdjustLevel { delta: 1 }.is_dm_only());
        assert!(!Command::Heal { amount: 1 }.is_dm_only());
    }
}
