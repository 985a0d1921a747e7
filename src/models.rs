use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One temporary reduction of the daily goal, created by a single excess day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalorieAdjustment {
    pub id: String,
    /// When the triggering excess was registered
    pub start_date: DateTime<Utc>,
    /// Calories above the goal that was in effect at trigger time
    pub excess_amount: i64,
    /// Subtracted from the base goal every day; always a positive multiple of 10
    pub daily_reduction: i64,
    /// Counts down from 7 to 0
    pub days_remaining: u32,
    pub previous_goal: i64,
    pub adjusted_goal: i64,
    /// Whether the "goal adjusted" notice has been surfaced for this adjustment
    pub notification_shown: bool,
}

/// The durable goal state for one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalorieGoalState {
    pub base_goal: i64,
    pub current_goal: i64,
    #[serde(default)]
    pub active_adjustments: Vec<CalorieAdjustment>,
    #[serde(default)]
    pub last_excess_date: Option<DateTime<Utc>>,
}

impl CalorieGoalState {
    /// A fresh state with no adjustments and the effective goal equal to `base_goal`.
    pub fn new(base_goal: i64) -> Self {
        Self {
            base_goal,
            current_goal: base_goal,
            active_adjustments: Vec::new(),
            last_excess_date: None,
        }
    }

    pub fn total_daily_reduction(&self) -> i64 {
        self.active_adjustments
            .iter()
            .fold(0i64, |total, adj| total.saturating_add(adj.daily_reduction))
    }
}

/// A notice the presentation layer should show once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GoalNotification {
    /// A new adjustment lowered the goal
    AdjustmentApplied { current_goal: i64 },
    /// At least one adjustment ran its course
    AdjustmentCompleted { current_goal: i64 },
}

impl GoalNotification {
    pub fn current_goal(&self) -> i64 {
        match self {
            GoalNotification::AdjustmentApplied { current_goal }
            | GoalNotification::AdjustmentCompleted { current_goal } => *current_goal,
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            GoalNotification::AdjustmentApplied { .. } => "Days like this happen.",
            GoalNotification::AdjustmentCompleted { .. } => "Your pace is back to normal.",
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            GoalNotification::AdjustmentApplied { .. } => {
                "We adjusted your goals automatically to keep your progress on track."
            }
            GoalNotification::AdjustmentCompleted { .. } => "We're back on plan.",
        }
    }
}

/// Calories and macros of a food or a whole plate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct NutritionInfo {
    /// Calories (kcal)
    pub calories: f64,
    /// Protein (g)
    pub protein: f64,
    /// Carbs (g)
    pub carbs: f64,
    /// Fat (g)
    pub fat: f64,
}

impl std::ops::Add for NutritionInfo {
    type Output = NutritionInfo;

    fn add(self, rhs: NutritionInfo) -> NutritionInfo {
        NutritionInfo {
            calories: self.calories + rhs.calories,
            protein: self.protein + rhs.protein,
            carbs: self.carbs + rhs.carbs,
            fat: self.fat + rhs.fat,
        }
    }
}

impl std::iter::Sum for NutritionInfo {
    fn sum<I: Iterator<Item = NutritionInfo>>(iter: I) -> Self {
        iter.fold(NutritionInfo::default(), |acc, n| acc + n)
    }
}

/// A food recognised in a photo by the vision service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FoodItem {
    pub name: String,
    /// Free-form portion, e.g. "2 tablespoons" or "100g"
    #[serde(default)]
    pub estimated_portion: String,
    #[serde(default)]
    pub calories: f64,
    #[serde(default)]
    pub protein: f64,
    #[serde(default)]
    pub carbs: f64,
    #[serde(default)]
    pub fat: f64,
    /// 0.0 to 1.0
    #[serde(default)]
    pub confidence: f64,
}

impl FoodItem {
    pub fn nutrition(&self) -> NutritionInfo {
        NutritionInfo {
            calories: self.calories,
            protein: self.protein,
            carbs: self.carbs,
            fat: self.fat,
        }
    }
}

/// Full result of analysing one photo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FoodAnalysis {
    pub foods: Vec<FoodItem>,
    pub total_nutrition: NutritionInfo,
}

/// Canonical nutrition values for one portion of a food.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceFood {
    pub name: String,
    /// Describes one portion, e.g. "1 cup" or "1 unit"
    pub portion_reference: String,
    pub calories: f64,
    pub protein: f64,
    pub carbs: f64,
    pub fat: f64,
}
