//! Nutrition reference lookup used to refine vision estimates.

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::models::{NutritionInfo, ReferenceFood};

/// Source of canonical per-portion nutrition values.
pub trait NutritionReference {
    fn lookup(&self, name: &str) -> Option<ReferenceFood>;
}

impl<T: NutritionReference + ?Sized> NutritionReference for &T {
    fn lookup(&self, name: &str) -> Option<ReferenceFood> {
        (**self).lookup(name)
    }
}

/// A reference that never matches; plates keep the vision estimates.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoReference;

impl NutritionReference for NoReference {
    fn lookup(&self, _name: &str) -> Option<ReferenceFood> {
        None
    }
}

/// In-memory reference table.
#[derive(Debug, Clone, Default)]
pub struct ReferenceTable {
    foods: Vec<ReferenceFood>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TableDocument {
    List(Vec<ReferenceFood>),
    Wrapped { foods: Vec<ReferenceFood> },
}

impl ReferenceTable {
    pub fn new(foods: Vec<ReferenceFood>) -> Self {
        Self { foods }
    }

    /// Accepts either a JSON array of foods or `{ "foods": [...] }`.
    pub fn from_json(json: &str) -> Result<Self> {
        let doc: TableDocument = serde_json::from_str(json)
            .map_err(|e| Error::Validation(format!("invalid reference table: {}", e)))?;
        let foods = match doc {
            TableDocument::List(foods) | TableDocument::Wrapped { foods } => foods,
        };
        Ok(Self::new(foods))
    }

    pub fn len(&self) -> usize {
        self.foods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.foods.is_empty()
    }

    pub fn foods(&self) -> &[ReferenceFood] {
        &self.foods
    }
}

impl NutritionReference for ReferenceTable {
    /// Exact (case- and spacing-insensitive) match first, then the longest
    /// entry whose name contains or is contained in the query.
    fn lookup(&self, name: &str) -> Option<ReferenceFood> {
        let query = normalize(name);
        if query.is_empty() {
            return None;
        }

        if let Some(food) = self.foods.iter().find(|f| normalize(&f.name) == query) {
            return Some(food.clone());
        }

        self.foods
            .iter()
            .map(|f| (normalize(&f.name), f))
            .filter(|(entry, _)| {
                !entry.is_empty() && (query.contains(entry.as_str()) || entry.contains(&query))
            })
            .max_by_key(|(entry, _)| entry.len())
            .map(|(_, f)| f.clone())
    }
}

fn normalize(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// First number in a portion description and the text after it.
///
/// Understands `2`, `1.5`, `1,5` and `1/2`.
fn leading_amount(portion: &str) -> Option<(f64, &str)> {
    let start = portion.find(|c: char| c.is_ascii_digit())?;
    let rest = &portion[start..];

    let int_len = rest.bytes().take_while(u8::is_ascii_digit).count();
    let mut end = int_len;
    let mut value: f64 = rest[..int_len].parse().ok()?;

    let tail = &rest[int_len..];
    if let Some(frac) = tail.strip_prefix(['.', ',']) {
        let frac_len = frac.bytes().take_while(u8::is_ascii_digit).count();
        if frac_len > 0 {
            value = format!("{}.{}", &rest[..int_len], &frac[..frac_len])
                .parse()
                .ok()?;
            end += 1 + frac_len;
        }
    } else if let Some(denom) = tail.strip_prefix('/') {
        let denom_len = denom.bytes().take_while(u8::is_ascii_digit).count();
        let d: f64 = denom[..denom_len].parse().unwrap_or(0.0);
        if d > 0.0 {
            value /= d;
            end += 1 + denom_len;
        }
    }

    Some((value, rest[end..].trim()))
}

/// Number of portions described, defaulting to one.
pub fn extract_quantity_from_portion(portion: &str) -> f64 {
    match leading_amount(portion) {
        Some((value, _)) if value > 0.0 => value,
        _ => 1.0,
    }
}

pub(crate) fn mass_unit(unit: &str) -> Option<&'static str> {
    let word = unit
        .split(|c: char| !c.is_alphabetic())
        .next()
        .unwrap_or_default()
        .to_lowercase();
    match word.as_str() {
        "g" | "gr" | "gram" | "grams" | "gramas" => Some("g"),
        "ml" => Some("ml"),
        _ => None,
    }
}

/// How many reference portions an estimated portion amounts to.
///
/// Weighed portions ("150g") are divided by a weighed reference ("100g");
/// otherwise the leading count of the estimate is used.
pub fn portions_of(estimated_portion: &str, reference: &ReferenceFood) -> f64 {
    if let (Some((amount, unit)), Some((ref_amount, ref_unit))) = (
        leading_amount(estimated_portion),
        leading_amount(&reference.portion_reference),
    ) {
        if let (Some(a), Some(b)) = (mass_unit(unit), mass_unit(ref_unit)) {
            if a == b && amount > 0.0 && ref_amount > 0.0 {
                return amount / ref_amount;
            }
        }
    }
    extract_quantity_from_portion(estimated_portion)
}

/// Reference nutrition scaled to `quantity` portions.
///
/// Calories are rounded to whole kcal, macros to one decimal.
pub fn calculate_nutrition(food: &ReferenceFood, quantity: f64) -> NutritionInfo {
    NutritionInfo {
        calories: (food.calories * quantity).round(),
        protein: round_tenth(food.protein * quantity),
        carbs: round_tenth(food.carbs * quantity),
        fat: round_tenth(food.fat * quantity),
    }
}

pub(crate) fn round_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
