//! Reference data: Devil Fruits, equipment and the default action list.
//!
//! The tables are immutable once loaded. `ReferenceData` bundles them with
//! the race table so the rest of the crate takes a single handle.

use crate::character::{Character, EquipmentSlot, FruitRef};
use crate::dice;
use crate::error::SheetError;
use crate::races::RaceTable;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tokio::fs;

/// A Devil Fruit in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FruitData {
    pub name: String,
    pub ability_text: String,
}

impl FruitData {
    pub fn to_ref(&self) -> FruitRef {
        FruitRef {
            name: self.name.clone(),
            ability_text: self.ability_text.clone(),
        }
    }
}

/// An action granted by a Devil Fruit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FruitAction {
    pub action_name: String,
    pub resource_cost: u32,
    /// Upkeep while the action is sustained.
    #[serde(default)]
    pub per_turn_resource_cost: u32,
}

/// An entry in the equipment catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemData {
    pub name: String,
    pub damage_expression: Option<String>,
    pub durability: Option<u32>,
    /// Resource spent per use.
    #[serde(default)]
    pub use_cost: u32,
    pub ammo_capacity: Option<u32>,
    /// Range in feet; `None` for melee or non-weapons.
    pub range: Option<u32>,
    pub weight: f32,
    pub description: String,
}

/// A universally available action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionData {
    pub name: String,
    pub resource_cost: u32,
}

impl From<&FruitAction> for ActionData {
    fn from(action: &FruitAction) -> Self {
        Self {
            name: action.action_name.clone(),
            resource_cost: action.resource_cost,
        }
    }
}

/// All lookup tables the engine consumes, loaded once at startup.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReferenceData {
    pub races: RaceTable,
    #[serde(default)]
    pub fruits: Vec<FruitData>,
    /// Fruit name -> fruit-specific actions.
    #[serde(default)]
    pub fruit_actions: HashMap<String, Vec<FruitAction>>,
    #[serde(default)]
    pub items: Vec<ItemData>,
    #[serde(default)]
    pub actions: Vec<ActionData>,
}

impl ReferenceData {
    /// The built-in tables.
    pub fn standard() -> Self {
        Self {
            races: RaceTable::standard(),
            fruits: FRUITS.clone(),
            fruit_actions: FRUIT_ACTIONS.clone(),
            items: ITEMS.clone(),
            actions: DEFAULT_ACTIONS.clone(),
        }
    }

    /// Parse and validate tables from JSON.
    pub fn from_json_str(json: &str) -> Result<Self, SheetError> {
        let data: Self = serde_json::from_str(json)
            .map_err(|e| SheetError::validation(format!("reference data: {e}")))?;
        data.validate()?;
        Ok(data)
    }

    /// Load and validate tables from a JSON file.
    pub async fn load_json(path: impl AsRef<Path>) -> Result<Self, SheetError> {
        let content = fs::read_to_string(path.as_ref())
            .await
            .map_err(|e| {
                SheetError::validation(format!(
                    "cannot read reference data {}: {e}",
                    path.as_ref().display()
                ))
            })?;
        Self::from_json_str(&content)
    }

    /// Check the tables are internally consistent.
    pub fn validate(&self) -> Result<(), SheetError> {
        self.races.validate()?;
        if self.races.is_empty() {
            return Err(SheetError::validation("reference data has no races"));
        }
        for item in &self.items {
            if let Some(expr) = &item.damage_expression {
                dice::validate(expr)?;
            }
        }
        for fruit in self.fruit_actions.keys() {
            if self.find_fruit(fruit).is_none() {
                return Err(SheetError::FruitNotFound(fruit.clone()));
            }
        }
        Ok(())
    }

    /// Look up a Devil Fruit by name (case-insensitive).
    pub fn find_fruit(&self, name: &str) -> Option<&FruitData> {
        let name = name.trim();
        self.fruits.iter().find(|f| f.name.eq_ignore_ascii_case(name))
    }

    /// Pick a fruit uniformly at random.
    pub fn random_fruit<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<&FruitData> {
        self.fruits.choose(rng)
    }

    /// Actions granted by a fruit, empty if it grants none.
    pub fn fruit_actions_for(&self, fruit_name: &str) -> &[FruitAction] {
        self.fruit_actions
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(fruit_name.trim()))
            .map(|(_, actions)| actions.as_slice())
            .unwrap_or(&[])
    }

    /// Look up a catalog item by name (case-insensitive).
    pub fn find_item(&self, key: &str) -> Option<&ItemData> {
        let key = key.trim();
        self.items.iter().find(|i| i.name.eq_ignore_ascii_case(key))
    }
}

/// An equipment slot paired with its catalog entry, when it names one.
#[derive(Debug, Clone)]
pub struct ResolvedSlot<'a> {
    pub slot: &'a EquipmentSlot,
    pub item: Option<&'a ItemData>,
}

impl ResolvedSlot<'_> {
    /// Text to show for the slot: catalog description or the custom entry.
    pub fn description(&self) -> &str {
        if !self.slot.custom_description.is_empty() {
            return &self.slot.custom_description;
        }
        self.item.map(|i| i.description.as_str()).unwrap_or("")
    }
}

/// Pair each equipment slot with its catalog entry.
pub fn resolve_equipment<'a>(
    character: &'a Character,
    data: &'a ReferenceData,
) -> Vec<ResolvedSlot<'a>> {
    character
        .equipment
        .iter()
        .map(|slot| ResolvedSlot {
            slot,
            item: slot.item_key.as_deref().and_then(|key| data.find_item(key)),
        })
        .collect()
}

/// Default actions followed by those of the character's Devil Fruit.
pub fn available_actions(character: &Character, data: &ReferenceData) -> Vec<ActionData> {
    let mut actions = data.actions.clone();
    if let Some(fruit) = &character.fruit {
        actions.extend(data.fruit_actions_for(&fruit.name).iter().map(ActionData::from));
    }
    actions
}

// ============================================================================
// Built-in Tables
// ============================================================================

fn fruit(name: &str, ability_text: &str) -> FruitData {
    FruitData {
        name: name.to_string(),
        ability_text: ability_text.to_string(),
    }
}

fn fruit_action(action_name: &str, resource_cost: u32, per_turn_resource_cost: u32) -> FruitAction {
    FruitAction {
        action_name: action_name.to_string(),
        resource_cost,
        per_turn_resource_cost,
    }
}

fn action(name: &str, resource_cost: u32) -> ActionData {
    ActionData {
        name: name.to_string(),
        resource_cost,
    }
}

lazy_static::lazy_static! {
    /// Standard Devil Fruits.
    pub static ref FRUITS: Vec<FruitData> = vec![
        fruit("Gomu Gomu no Mi", "The body becomes rubber: stretch limbs for reach and shrug off blunt force."),
        fruit("Mera Mera no Mi", "Create, control and become fire."),
        fruit("Hie Hie no Mi", "Create, control and become ice; freeze water and foes alike."),
        fruit("Bara Bara no Mi", "Split the body into floating pieces; slashing attacks pass harmlessly."),
        fruit("Hana Hana no Mi", "Sprout copies of your limbs from any surface in sight."),
        fruit("Suna Suna no Mi", "Become sand and draw the moisture out of anything touched."),
        fruit("Goro Goro no Mi", "Become lightning; strike anywhere within sight."),
        fruit("Ope Ope no Mi", "Create a ROOM in which you rearrange anything within it at will."),
        fruit("Bari Bari no Mi", "Raise impenetrable barriers."),
        fruit("Supa Supa no Mi", "Turn any part of the body into a blade."),
    ];

    /// Fruit-specific actions.
    pub static ref FRUIT_ACTIONS: HashMap<String, Vec<FruitAction>> = {
        let mut m = HashMap::new();
        m.insert("Gomu Gomu no Mi".to_string(), vec![
            fruit_action("Gomu Gomu no Pistol", 5, 0),
            fruit_action("Gomu Gomu no Gatling", 15, 0),
            fruit_action("Gear Second", 20, 5),
        ]);
        m.insert("Mera Mera no Mi".to_string(), vec![
            fruit_action("Hiken", 15, 0),
            fruit_action("Hotarubi", 10, 0),
            fruit_action("Flame Body", 10, 3),
        ]);
        m.insert("Hie Hie no Mi".to_string(), vec![
            fruit_action("Ice Age", 25, 0),
            fruit_action("Ice Saber", 8, 0),
        ]);
        m.insert("Bara Bara no Mi".to_string(), vec![
            fruit_action("Bara Bara Cannon", 6, 0),
            fruit_action("Emergency Escape", 10, 0),
        ]);
        m.insert("Hana Hana no Mi".to_string(), vec![
            fruit_action("Clutch", 10, 0),
            fruit_action("Cien Fleur", 20, 4),
        ]);
        m.insert("Suna Suna no Mi".to_string(), vec![
            fruit_action("Desert Spada", 12, 0),
            fruit_action("Sables", 18, 0),
        ]);
        m.insert("Goro Goro no Mi".to_string(), vec![
            fruit_action("El Thor", 30, 0),
            fruit_action("Mamaragan", 25, 0),
        ]);
        m.insert("Ope Ope no Mi".to_string(), vec![
            fruit_action("ROOM", 10, 5),
            fruit_action("Shambles", 8, 0),
            fruit_action("Gamma Knife", 35, 0),
        ]);
        m.insert("Bari Bari no Mi".to_string(), vec![
            fruit_action("Barrier", 10, 4),
            fruit_action("Barrier Bulldozer", 20, 0),
        ]);
        m.insert("Supa Supa no Mi".to_string(), vec![
            fruit_action("Spiral Hollow", 12, 0),
            fruit_action("Steel Body", 8, 2),
        ]);
        m
    };

    /// Standard equipment catalog.
    pub static ref ITEMS: Vec<ItemData> = vec![
        ItemData {
            name: "Cutlass".to_string(),
            damage_expression: Some("1d8".to_string()),
            durability: Some(40),
            use_cost: 0,
            ammo_capacity: None,
            range: None,
            weight: 3.0,
            description: "A curved sailor's sword.".to_string(),
        },
        ItemData {
            name: "Katana".to_string(),
            damage_expression: Some("1d10".to_string()),
            durability: Some(60),
            use_cost: 0,
            ammo_capacity: None,
            range: None,
            weight: 3.0,
            description: "A single-edged blade from Wano.".to_string(),
        },
        ItemData {
            name: "Flintlock Pistol".to_string(),
            damage_expression: Some("1d10".to_string()),
            durability: Some(30),
            use_cost: 2,
            ammo_capacity: Some(1),
            range: Some(60),
            weight: 3.0,
            description: "Slow to reload but easy to hide.".to_string(),
        },
        ItemData {
            name: "Musket".to_string(),
            damage_expression: Some("1d12".to_string()),
            durability: Some(30),
            use_cost: 3,
            ammo_capacity: Some(1),
            range: Some(120),
            weight: 10.0,
            description: "Standard issue for Marine riflemen.".to_string(),
        },
        ItemData {
            name: "Slingshot".to_string(),
            damage_expression: Some("1d4".to_string()),
            durability: Some(20),
            use_cost: 1,
            ammo_capacity: Some(10),
            range: Some(80),
            weight: 1.0,
            description: "Fires lead stars, eggs or anything else that fits.".to_string(),
        },
        ItemData {
            name: "Clima-Tact".to_string(),
            damage_expression: Some("2d6".to_string()),
            durability: Some(25),
            use_cost: 5,
            ammo_capacity: None,
            range: Some(60),
            weight: 2.0,
            description: "A weather-manipulating staff in three parts.".to_string(),
        },
        ItemData {
            name: "Seastone Cuffs".to_string(),
            damage_expression: None,
            durability: Some(100),
            use_cost: 0,
            ammo_capacity: None,
            range: None,
            weight: 4.0,
            description: "Kairoseki restraints that drain a fruit user's strength.".to_string(),
        },
        ItemData {
            name: "Den Den Mushi".to_string(),
            damage_expression: None,
            durability: None,
            use_cost: 0,
            ammo_capacity: None,
            range: None,
            weight: 1.0,
            description: "A snail telephone.".to_string(),
        },
        ItemData {
            name: "Eternal Pose".to_string(),
            damage_expression: None,
            durability: None,
            use_cost: 0,
            ammo_capacity: None,
            range: None,
            weight: 0.5,
            description: "Always points to one island.".to_string(),
        },
        ItemData {
            name: "Medical Kit".to_string(),
            damage_expression: None,
            durability: Some(5),
            use_cost: 0,
            ammo_capacity: None,
            range: None,
            weight: 3.0,
            description: "Bandages, splints and rumble-free remedies.".to_string(),
        },
    ];

    /// Actions every character can take.
    pub static ref DEFAULT_ACTIONS: Vec<ActionData> = vec![
        action("Move", 0),
        action("Attack", 0),
        action("Dodge", 5),
        action("Block", 5),
        action("Dash", 10),
        action("Grapple", 5),
        action("Help", 0),
        action("Hide", 0),
    ];
}
