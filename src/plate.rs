//! A photographed plate: vision estimates refined by the reference table and
//! adjustable by the user before the meal is logged.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::{FoodAnalysis, FoodItem, NutritionInfo, ReferenceFood};
use crate::reference::{
    calculate_nutrition, extract_quantity_from_portion, mass_unit, portions_of, round_tenth,
    NutritionReference,
};

const QUANTITY_STEP: f64 = 0.5;
const MIN_QUANTITY: f64 = 0.5;
const SCALE_UP: f64 = 1.25;
const SCALE_DOWN: f64 = 0.75;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlateItem {
    pub name: String,
    pub estimated_portion: String,
    pub nutrition: NutritionInfo,
    pub confidence: f64,
    /// Set when the nutrition comes from the reference table
    pub reference: Option<ReferenceFood>,
    /// Number of reference portions (or the leading count of the estimate)
    pub quantity: f64,
}

impl PlateItem {
    fn from_food<R: NutritionReference + ?Sized>(food: &FoodItem, reference: &R) -> Self {
        match reference.lookup(&food.name) {
            Some(entry) => {
                let quantity = portions_of(&food.estimated_portion, &entry);
                Self {
                    name: entry.name.clone(),
                    estimated_portion: food.estimated_portion.clone(),
                    nutrition: calculate_nutrition(&entry, quantity),
                    confidence: food.confidence,
                    reference: Some(entry),
                    quantity,
                }
            }
            None => Self {
                name: food.name.clone(),
                estimated_portion: food.estimated_portion.clone(),
                nutrition: food.nutrition(),
                confidence: food.confidence,
                reference: None,
                quantity: extract_quantity_from_portion(&food.estimated_portion),
            },
        }
    }

    fn step(&mut self, increment: bool) {
        match self.reference {
            Some(ref entry) => {
                let quantity = if increment {
                    self.quantity + QUANTITY_STEP
                } else {
                    (self.quantity - QUANTITY_STEP).max(MIN_QUANTITY)
                };
                self.nutrition = calculate_nutrition(entry, quantity);
                self.estimated_portion = describe_portion(quantity, &entry.portion_reference);
                self.quantity = quantity;
            }
            None => {
                let factor = if increment { SCALE_UP } else { SCALE_DOWN };
                self.nutrition = NutritionInfo {
                    calories: (self.nutrition.calories * factor).round(),
                    protein: round_tenth(self.nutrition.protein * factor),
                    carbs: round_tenth(self.nutrition.carbs * factor),
                    fat: round_tenth(self.nutrition.fat * factor),
                };
            }
        }
    }
}

fn format_quantity(quantity: f64) -> String {
    if quantity.fract() == 0.0 {
        format!("{}", quantity as i64)
    } else {
        format!("{}", quantity)
    }
}

/// "1.5 cups" from a "1 cup" reference; weighed references become "1.5 x 100g".
fn describe_portion(quantity: f64, portion_reference: &str) -> String {
    let reference = portion_reference.trim();
    let number_len = reference
        .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == ','))
        .unwrap_or(reference.len());

    let unit = match reference[number_len..].strip_prefix(char::is_whitespace) {
        Some(unit) if number_len > 0 => unit.trim(),
        _ => "",
    };

    if unit.is_empty() || mass_unit(unit).is_some() {
        return format!("{} x {}", format_quantity(quantity), reference);
    }

    let plural = if quantity != 1.0 && !unit.ends_with('s') {
        "s"
    } else {
        ""
    };
    format!("{} {}{}", format_quantity(quantity), unit, plural)
}

/// Foods on one photographed plate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Plate {
    items: Vec<PlateItem>,
}

impl Plate {
    /// Prefer reference values for foods the table knows; keep the vision estimate otherwise.
    pub fn from_analysis<R: NutritionReference + ?Sized>(
        analysis: &FoodAnalysis,
        reference: &R,
    ) -> Self {
        Self {
            items: analysis
                .foods
                .iter()
                .map(|food| PlateItem::from_food(food, reference))
                .collect(),
        }
    }

    pub fn items(&self) -> &[PlateItem] {
        &self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Step an item's portion up or down.
    ///
    /// Reference-backed items move by half a portion (never below half);
    /// the rest scale their estimate by 25%.
    pub fn adjust_quantity(&mut self, index: usize, increment: bool) -> Result<&PlateItem> {
        let len = self.items.len();
        let item = self.items.get_mut(index).ok_or_else(|| {
            Error::Validation(format!("no item {} on a plate of {}", index, len))
        })?;
        item.step(increment);
        Ok(item)
    }

    pub fn remove_item(&mut self, index: usize) -> Result<PlateItem> {
        if index >= self.items.len() {
            return Err(Error::Validation(format!(
                "no item {} on a plate of {}",
                index,
                self.items.len()
            )));
        }
        Ok(self.items.remove(index))
    }

    pub fn totals(&self) -> NutritionInfo {
        self.items.iter().map(|item| item.nutrition).sum()
    }

    /// Whole calories on the plate, the unit the goal engine works in.
    pub fn total_calories(&self) -> i64 {
        self.totals().calories.round() as i64
    }

    pub fn to_analysis(&self) -> FoodAnalysis {
        FoodAnalysis {
            foods: self
                .items
                .iter()
                .map(|item| FoodItem {
                    name: item.name.clone(),
                    estimated_portion: item.estimated_portion.clone(),
                    calories: item.nutrition.calories,
                    protein: item.nutrition.protein,
                    carbs: item.nutrition.carbs,
                    fat: item.nutrition.fat,
                    confidence: item.confidence,
                })
                .collect(),
            total_nutrition: self.totals(),
        }
    }
}
