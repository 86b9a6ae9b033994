//! Damage formula notation.
//!
//! Parses standard dice notation (`XdY+Z`, several components, keep
//! highest/lowest) so formulas on sheets and in the item catalog can be
//! validated and summarised. Resolving a roll belongs to the table, not here.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error type for dice parsing.
#[derive(Debug, Error)]
pub enum DiceError {
    #[error("Invalid dice notation: {0}")]
    InvalidNotation(String),
    #[error("Invalid die size: {0}")]
    InvalidDieSize(u32),
    #[error("No dice specified")]
    NoDice,
    #[error("Cannot keep {keep} dice when only rolling {count} (in {notation})")]
    InvalidKeepCount {
        keep: u32,
        count: u32,
        notation: String,
    },
}

/// Standard die types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DieType {
    D4,
    D6,
    D8,
    D10,
    D12,
    D20,
    D100,
}

impl DieType {
    pub fn sides(&self) -> u32 {
        match self {
            DieType::D4 => 4,
            DieType::D6 => 6,
            DieType::D8 => 8,
            DieType::D10 => 10,
            DieType::D12 => 12,
            DieType::D20 => 20,
            DieType::D100 => 100,
        }
    }

    pub fn from_sides(sides: u32) -> Option<DieType> {
        match sides {
            4 => Some(DieType::D4),
            6 => Some(DieType::D6),
            8 => Some(DieType::D8),
            10 => Some(DieType::D10),
            12 => Some(DieType::D12),
            20 => Some(DieType::D20),
            100 => Some(DieType::D100),
            _ => None,
        }
    }
}

impl fmt::Display for DieType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "d{}", self.sides())
    }
}

/// Whether a term is added to or subtracted from the total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Sign {
    #[default]
    Plus,
    Minus,
}

impl Sign {
    fn from_char(ch: char) -> Option<Sign> {
        match ch {
            '+' => Some(Sign::Plus),
            '-' => Some(Sign::Minus),
            _ => None,
        }
    }

    fn apply(self, value: i64) -> i64 {
        match self {
            Sign::Plus => value,
            Sign::Minus => -value,
        }
    }
}

/// A single die component of a dice expression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiceComponent {
    pub count: u32,
    pub die_type: DieType,
    pub keep_highest: Option<u32>,
    pub keep_lowest: Option<u32>,
    pub sign: Sign,
}

impl DiceComponent {
    /// Number of dice that count toward the total.
    pub fn kept(&self) -> u32 {
        self.keep_highest.or(self.keep_lowest).unwrap_or(self.count)
    }

    fn bounds(&self) -> (i64, i64) {
        let low = self.kept() as i64;
        let high = low * self.die_type.sides() as i64;
        match self.sign {
            Sign::Plus => (low, high),
            Sign::Minus => (-high, -low),
        }
    }
}

/// One parsed term before it is folded into the expression.
enum Term {
    Dice(DiceComponent),
    Flat(i64),
}

/// Split `2d6-1d4+3` into signed terms. Only the first term may omit its
/// sign; an empty term anywhere else is malformed.
fn signed_terms(notation: &str) -> Result<Vec<(Sign, &str)>, DiceError> {
    let mut terms = Vec::new();
    let mut sign = Sign::Plus;
    let mut start = 0;

    for (pos, ch) in notation.char_indices() {
        if let Some(next) = Sign::from_char(ch) {
            let term = &notation[start..pos];
            if term.is_empty() && !(pos == 0 && terms.is_empty()) {
                return Err(DiceError::InvalidNotation(notation.to_string()));
            }
            if !term.is_empty() {
                terms.push((sign, term));
            }
            sign = next;
            start = pos + ch.len_utf8();
        }
    }

    let last = &notation[start..];
    if last.is_empty() {
        return Err(DiceError::InvalidNotation(notation.to_string()));
    }
    terms.push((sign, last));
    Ok(terms)
}

fn parse_number(digits: &str, term: &str) -> Result<u32, DiceError> {
    digits
        .parse()
        .map_err(|_| DiceError::InvalidNotation(term.to_string()))
}

fn parse_term(sign: Sign, term: &str) -> Result<Term, DiceError> {
    let Some((count, rest)) = term.split_once('d') else {
        return Ok(Term::Flat(sign.apply(parse_number(term, term)? as i64)));
    };

    let count = if count.is_empty() {
        1
    } else {
        parse_number(count, term)?
    };
    if count == 0 {
        return Err(DiceError::InvalidNotation(term.to_string()));
    }

    let (sides, keep_highest, keep_lowest) = if let Some((sides, keep)) = rest.split_once("kh") {
        (sides, Some(parse_number(keep, term)?), None)
    } else if let Some((sides, keep)) = rest.split_once("kl") {
        (sides, None, Some(parse_number(keep, term)?))
    } else {
        (rest, None, None)
    };

    let sides = parse_number(sides, term)?;
    let die_type = DieType::from_sides(sides).ok_or(DiceError::InvalidDieSize(sides))?;

    if let Some(keep) = keep_highest.or(keep_lowest) {
        if keep > count {
            return Err(DiceError::InvalidKeepCount {
                keep,
                count,
                notation: term.to_string(),
            });
        }
    }

    Ok(Term::Dice(DiceComponent {
        count,
        die_type,
        keep_highest,
        keep_lowest,
        sign,
    }))
}

/// A complete dice expression (e.g., 2d6+3).
///
/// Parsing guarantees the minimum and maximum totals fit in an `i32`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiceExpression {
    pub components: Vec<DiceComponent>,
    pub modifier: i32,
    pub original: String,
}

impl DiceExpression {
    /// Parse a dice notation string.
    pub fn parse(notation: &str) -> Result<Self, DiceError> {
        let original = notation.trim().to_lowercase();
        let compact: String = original.chars().filter(|c| !c.is_whitespace()).collect();
        if compact.is_empty() {
            return Err(DiceError::NoDice);
        }

        let mut components = Vec::new();
        let mut modifier: i64 = 0;

        for (sign, term) in signed_terms(&compact)? {
            match parse_term(sign, term)? {
                Term::Dice(component) => components.push(component),
                Term::Flat(value) => {
                    modifier = modifier
                        .checked_add(value)
                        .ok_or_else(|| out_of_range(&original))?;
                }
            }
        }

        if components.is_empty() && modifier == 0 {
            return Err(DiceError::NoDice);
        }

        let modifier = i32::try_from(modifier).map_err(|_| out_of_range(&original))?;
        let expression = DiceExpression {
            components,
            modifier,
            original,
        };
        let (low, high) = expression.totals();
        if i32::try_from(low).is_err() || i32::try_from(high).is_err() {
            return Err(out_of_range(&expression.original));
        }
        Ok(expression)
    }

    fn totals(&self) -> (i64, i64) {
        self.components.iter().map(DiceComponent::bounds).fold(
            (self.modifier as i64, self.modifier as i64),
            |(low, high), (l, h)| (low.saturating_add(l), high.saturating_add(h)),
        )
    }

    /// Lowest total the expression can produce.
    pub fn minimum(&self) -> i32 {
        saturate(self.totals().0)
    }

    /// Highest total the expression can produce.
    pub fn maximum(&self) -> i32 {
        saturate(self.totals().1)
    }

    /// Expected total, ignoring the skew keep-highest/lowest introduces.
    pub fn average(&self) -> f32 {
        let dice: f32 = self
            .components
            .iter()
            .map(|c| {
                let per_die = (c.die_type.sides() as f32 + 1.0) / 2.0;
                let total = per_die * c.kept() as f32;
                match c.sign {
                    Sign::Plus => total,
                    Sign::Minus => -total,
                }
            })
            .sum();
        dice + self.modifier as f32
    }

    /// Combine with an extra flat bonus, as a sheet's melee line does.
    pub fn with_bonus(mut self, bonus: i32) -> Self {
        self.modifier = self.modifier.saturating_add(bonus);
        self
    }
}

fn out_of_range(notation: &str) -> DiceError {
    DiceError::InvalidNotation(format!("{notation} is out of range"))
}

fn saturate(value: i64) -> i32 {
    value.clamp(i32::MIN as i64, i32::MAX as i64) as i32
}

impl FromStr for DiceExpression {
    type Err = DiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DiceExpression::parse(s)
    }
}

impl fmt::Display for DiceExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.original)
    }
}

/// Check that a notation string parses.
pub fn validate(notation: &str) -> Result<(), DiceError> {
    DiceExpression::parse(notation).map(|_| ())
}
