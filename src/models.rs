use std::fmt;

use anyhow::bail;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One self-reported measurement for a single calendar day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEntry {
    pub date: NaiveDate,
    pub weight: Option<f64>,
    pub energy_level: i32,
    pub adherence_score: i32,
    pub notes: Option<String>,
}

impl ProgressEntry {
    /// Range checks applied before an entry is written.
    pub fn validate(&self) -> anyhow::Result<()> {
        if let Some(weight) = self.weight {
            if !weight.is_finite() || weight <= 0.0 {
                bail!("weight must be a positive number, got {weight}");
            }
        }
        if !(1..=10).contains(&self.energy_level) {
            bail!(
                "energy level must be between 1 and 10, got {}",
                self.energy_level
            );
        }
        if !(0..=100).contains(&self.adherence_score) {
            bail!(
                "adherence score must be between 0 and 100, got {}",
                self.adherence_score
            );
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Increasing,
    Decreasing,
    Stable,
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Trend::Increasing => "increasing",
            Trend::Decreasing => "decreasing",
            Trend::Stable => "stable",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressStats {
    pub current_weight: Option<f64>,
    pub weight_change: f64,
    pub average_energy_level: f64,
    pub average_adherence: i32,
    pub progress_toward_goal: f64,
    pub trend: Trend,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeeklySummary {
    pub week_index: u32,
    pub week_start: NaiveDate,
    pub week_end: NaiveDate,
    /// `None` when no entry in the week recorded a weight.
    pub average_weight: Option<f64>,
    pub average_energy: f64,
    pub average_adherence: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default)]
    pub health_goals: Vec<String>,
    #[serde(default)]
    pub dietary_preferences: Vec<String>,
    #[serde(default)]
    pub allergies: Vec<String>,
    #[serde(default)]
    pub disliked_ingredients: Vec<String>,
    pub cooking_time: Option<String>,
    pub skill_level: Option<String>,
}

#[derive(Debug, Clone)]
pub struct UserRecord {
    pub user_id: Uuid,
    pub email: String,
    pub profile: UserProfile,
    pub target_weight: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Meal {
    pub name: String,
    pub description: String,
    pub prep_time: u32,
    pub calories: u32,
    pub protein: u32,
    pub carbs: u32,
    pub fat: u32,
    pub difficulty: String,
    #[serde(default)]
    pub completed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snack {
    pub name: String,
    pub calories: u32,
    pub description: String,
    #[serde(default)]
    pub completed: bool,
}

/// The structured body of a daily plan, stored as JSONB.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyMeals {
    pub breakfast: Meal,
    pub lunch: Meal,
    pub dinner: Meal,
    #[serde(default)]
    pub snacks: Vec<Snack>,
}

impl DailyMeals {
    pub fn total_calories(&self) -> u32 {
        self.breakfast.calories
            + self.lunch.calories
            + self.dinner.calories
            + self.snacks.iter().map(|snack| snack.calories).sum::<u32>()
    }

    pub fn set_completed(&mut self, slot: MealSlot, completed: bool) {
        match slot {
            MealSlot::Breakfast => self.breakfast.completed = completed,
            MealSlot::Lunch => self.lunch.completed = completed,
            MealSlot::Dinner => self.dinner.completed = completed,
            MealSlot::Snacks => {
                for snack in self.snacks.iter_mut() {
                    snack.completed = completed;
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum MealSlot {
    Breakfast,
    Lunch,
    Dinner,
    Snacks,
}

#[derive(Debug, Clone, Serialize)]
pub struct MealPlanRecord {
    pub plan_id: Uuid,
    pub user_id: Uuid,
    pub plan_date: NaiveDate,
    pub meals: DailyMeals,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NutritionInfo {
    pub calories: u32,
    pub protein: u32,
    pub carbs: u32,
    pub fat: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recipe {
    pub ingredients: Vec<String>,
    pub instructions: Vec<String>,
    pub prep_time: u32,
    pub cook_time: u32,
    pub difficulty: String,
    pub nutrition_info: NutritionInfo,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry() -> ProgressEntry {
        ProgressEntry {
            date: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
            weight: Some(70.5),
            energy_level: 8,
            adherence_score: 90,
            notes: None,
        }
    }

    #[test]
    fn accepts_entry_within_ranges() {
        assert!(entry().validate().is_ok());
        let without_weight = ProgressEntry {
            weight: None,
            ..entry()
        };
        assert!(without_weight.validate().is_ok());
    }

    #[test]
    fn rejects_out_of_range_fields() {
        let low_energy = ProgressEntry {
            energy_level: 0,
            ..entry()
        };
        assert!(low_energy.validate().is_err());

        let high_adherence = ProgressEntry {
            adherence_score: 101,
            ..entry()
        };
        assert!(high_adherence.validate().is_err());

        let zero_weight = ProgressEntry {
            weight: Some(0.0),
            ..entry()
        };
        assert!(zero_weight.validate().is_err());

        let nan_weight = ProgressEntry {
            weight: Some(f64::NAN),
            ..entry()
        };
        assert!(nan_weight.validate().is_err());
    }

    #[test]
    fn trend_serializes_lowercase() {
        let value = serde_json::to_string(&Trend::Decreasing).unwrap();
        assert_eq!(value, "\"decreasing\"");
        assert_eq!(Trend::Stable.to_string(), "stable");
    }

    #[test]
    fn parses_meal_plan_json_with_camel_case_fields() {
        let raw = r#"{
            "breakfast": {"name": "Oats", "description": "Rolled oats", "prepTime": 10,
                          "calories": 350, "protein": 12, "carbs": 55, "fat": 8,
                          "difficulty": "Easy"},
            "lunch": {"name": "Salad", "description": "Greens", "prepTime": 15,
                      "calories": 400, "protein": 20, "carbs": 30, "fat": 18, "difficulty": "Easy"},
            "dinner": {"name": "Curry", "description": "Lentil curry", "prepTime": 35,
                       "calories": 520, "protein": 24, "carbs": 70, "fat": 14,
                       "difficulty": "Medium"},
            "snacks": [{"name": "Apple", "calories": 90, "description": "Fresh apple"}]
        }"#;
        let meals: DailyMeals = serde_json::from_str(raw).unwrap();
        assert_eq!(meals.breakfast.prep_time, 10);
        assert!(!meals.dinner.completed);
        assert_eq!(meals.total_calories(), 350 + 400 + 520 + 90);
    }

    #[test]
    fn marking_snacks_completes_every_snack() {
        let snack = Snack {
            name: "Nuts".to_string(),
            calories: 180,
            description: "Mixed nuts".to_string(),
            completed: false,
        };
        let meal = Meal {
            name: "Toast".to_string(),
            description: "Toast".to_string(),
            prep_time: 5,
            calories: 200,
            protein: 6,
            carbs: 30,
            fat: 4,
            difficulty: "Easy".to_string(),
            completed: false,
        };
        let mut meals = DailyMeals {
            breakfast: meal.clone(),
            lunch: meal.clone(),
            dinner: meal,
            snacks: vec![snack.clone(), snack],
        };

        meals.set_completed(MealSlot::Snacks, true);
        meals.set_completed(MealSlot::Lunch, true);

        assert!(meals.snacks.iter().all(|snack| snack.completed));
        assert!(meals.lunch.completed);
        assert!(!meals.breakfast.completed);
    }
}
