use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::mods::ModInputs;
use crate::portion::{self, validate_positive};

/// Calories and macronutrients. Calories are whole numbers; the rest are grams.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Macros {
    pub calories: i64,
    pub protein: f64,
    pub carbs: f64,
    pub fat: f64,
}

impl Macros {
    #[must_use]
    pub const fn new(calories: i64, protein: f64, carbs: f64, fat: f64) -> Self {
        Self {
            calories,
            protein,
            carbs,
            fat,
        }
    }

    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.calories == 0 && self.protein == 0.0 && self.carbs == 0.0 && self.fat == 0.0
    }

    /// Round every field the way calculated values are stored.
    #[must_use]
    pub fn rounded(&self) -> Self {
        Self {
            calories: self.calories,
            protein: portion::round1(self.protein),
            carbs: portion::round1(self.carbs),
            fat: portion::round1(self.fat),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.calories < 0 {
            return Err(EngineError::Validation(
                "calories must not be negative".to_string(),
            ));
        }
        for (field, value) in [
            ("protein", self.protein),
            ("carbs", self.carbs),
            ("fat", self.fat),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(EngineError::invalid_quantity(field, value));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ingredient {
    pub id: i64,
    #[serde(default)]
    pub uuid: String,
    pub name: String,
    pub calories: i64,
    pub protein: f64,
    pub carbs: f64,
    pub fat: f64,
    pub unit: String,
    pub is_staple: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub barcode: Option<String>,
    pub source: String,
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

impl Ingredient {
    /// Facts for one `unit` of this ingredient.
    #[must_use]
    pub fn macros(&self) -> Macros {
        Macros::new(self.calories, self.protein, self.carbs, self.fat)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewIngredient {
    pub name: String,
    pub calories: i64,
    pub protein: f64,
    pub carbs: f64,
    pub fat: f64,
    pub unit: String,
    #[serde(default)]
    pub is_staple: bool,
    #[serde(default)]
    pub barcode: Option<String>,
    #[serde(default = "default_source")]
    pub source: String,
}

fn default_source() -> String {
    "manual".to_string()
}

impl NewIngredient {
    #[must_use]
    pub fn macros(&self) -> Macros {
        Macros::new(self.calories, self.protein, self.carbs, self.fat)
    }
}

/// Result of adding an ingredient. `duplicate_of` points at an existing
/// ingredient with the same name, which usually means a user mistake.
#[derive(Debug, Clone, Serialize)]
pub struct IngredientAdded {
    pub ingredient: Ingredient,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duplicate_of: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IngredientRef {
    pub ingredient_id: i64,
    pub quantity: f64,
}

/// Inputs and baseline snapshot recorded by a mod when it generated a meal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModData {
    pub inputs: ModInputs,
    /// `calculate` output at portion 1.
    pub baseline: Macros,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "meal_type", rename_all = "snake_case")]
pub enum MealKind {
    Composed {
        ingredients: Vec<IngredientRef>,
    },
    Standalone {
        macros: Macros,
    },
    Mod {
        mod_id: String,
        mod_data: ModData,
        portion: f64,
    },
}

pub const MEAL_TYPE_COMPOSED: &str = "composed";
pub const MEAL_TYPE_STANDALONE: &str = "standalone";
pub const MEAL_TYPE_MOD: &str = "mod";

impl MealKind {
    #[must_use]
    pub fn meal_type(&self) -> &'static str {
        match self {
            Self::Composed { .. } => MEAL_TYPE_COMPOSED,
            Self::Standalone { .. } => MEAL_TYPE_STANDALONE,
            Self::Mod { .. } => MEAL_TYPE_MOD,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Meal {
    pub id: i64,
    #[serde(default)]
    pub uuid: String,
    pub name: String,
    #[serde(flatten)]
    pub kind: MealKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMeal {
    pub name: String,
    #[serde(flatten)]
    pub kind: MealKind,
    pub notes: Option<String>,
    pub instructions: Option<String>,
}

impl From<&Meal> for NewMeal {
    fn from(meal: &Meal) -> Self {
        Self {
            name: meal.name.clone(),
            kind: meal.kind.clone(),
            notes: meal.notes.clone(),
            instructions: meal.instructions.clone(),
        }
    }
}

/// A composed meal's ingredient line, resolved against the store.
#[derive(Debug, Clone, Serialize)]
pub struct MealLine {
    pub ingredient_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    pub quantity: f64,
    /// Unrounded contribution; zero for a missing ingredient.
    pub calories: f64,
    pub protein: f64,
    pub carbs: f64,
    pub fat: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MealDetail {
    #[serde(flatten)]
    pub meal: Meal,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub lines: Vec<MealLine>,
    pub totals: Macros,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

// --- Goals ---

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DailyGoal {
    pub calories: i64,
    pub protein: Option<f64>,
    pub carbs: Option<f64>,
    pub fat: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Progress {
    pub date: String,
    pub eaten: Macros,
    pub entry_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub goal: Option<DailyGoal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calories_remaining: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protein_remaining: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub carbs_remaining: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fat_remaining: Option<f64>,
}

impl Progress {
    #[must_use]
    pub fn new(date: String, eaten: Macros, entry_count: usize, goal: Option<DailyGoal>) -> Self {
        let remaining = |target: Option<f64>, have: f64| target.map(|t| portion::round1(t - have));
        Self {
            date,
            eaten,
            entry_count,
            calories_remaining: goal.map(|g| g.calories - eaten.calories),
            protein_remaining: goal.and_then(|g| remaining(g.protein, eaten.protein)),
            carbs_remaining: goal.and_then(|g| remaining(g.carbs, eaten.carbs)),
            fat_remaining: goal.and_then(|g| remaining(g.fat, eaten.fat)),
            goal,
        }
    }
}

pub fn validate_goal(goal: &DailyGoal) -> Result<()> {
    if goal.calories <= 0 {
        return Err(EngineError::Validation(
            "Goal calories must be greater than 0".to_string(),
        ));
    }
    for (field, value) in [
        ("protein", goal.protein),
        ("carbs", goal.carbs),
        ("fat", goal.fat),
    ] {
        if let Some(v) = value {
            if !v.is_finite() || v < 0.0 {
                return Err(EngineError::invalid_quantity(field, v));
            }
        }
    }
    Ok(())
}

// --- Validation ---

/// Validate ingredient data: name and unit must not be empty, macros must not be negative.
pub fn validate_ingredient(ingredient: &NewIngredient) -> Result<()> {
    if ingredient.name.trim().is_empty() {
        return Err(EngineError::Validation(
            "Ingredient name must not be empty".to_string(),
        ));
    }
    if ingredient.unit.trim().is_empty() {
        return Err(EngineError::Validation(
            "Ingredient unit must not be empty".to_string(),
        ));
    }
    ingredient.macros().validate()
}

pub fn validate_ingredient_refs(refs: &[IngredientRef]) -> Result<()> {
    for r in refs {
        validate_positive("quantity", r.quantity)?;
    }
    Ok(())
}

/// Validate a meal before it is written. Nothing is persisted when this fails.
pub fn validate_new_meal(meal: &NewMeal) -> Result<()> {
    if meal.name.trim().is_empty() {
        return Err(EngineError::Validation(
            "Meal name must not be empty".to_string(),
        ));
    }
    match &meal.kind {
        MealKind::Composed { ingredients } => {
            if ingredients.is_empty() {
                return Err(EngineError::IncompleteMeal(format!(
                    "'{}' has no ingredients",
                    meal.name
                )));
            }
            validate_ingredient_refs(ingredients)
        }
        MealKind::Standalone { macros } => {
            macros.validate()?;
            if macros.is_zero() {
                return Err(EngineError::IncompleteMeal(format!(
                    "'{}' has no calories or macros",
                    meal.name
                )));
            }
            Ok(())
        }
        MealKind::Mod {
            portion, mod_data, ..
        } => {
            portion::validate_portion(*portion)?;
            mod_data.baseline.validate()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oats() -> NewIngredient {
        NewIngredient {
            name: "Oats".to_string(),
            calories: 389,
            protein: 16.9,
            carbs: 66.3,
            fat: 6.9,
            unit: "100g".to_string(),
            is_staple: true,
            barcode: None,
            source: "manual".to_string(),
        }
    }

    fn standalone(macros: Macros) -> NewMeal {
        NewMeal {
            name: "Burrito".to_string(),
            kind: MealKind::Standalone { macros },
            notes: None,
            instructions: None,
        }
    }

    #[test]
    fn test_validate_ingredient_valid() {
        assert!(validate_ingredient(&oats()).is_ok());
    }

    #[test]
    fn test_validate_ingredient_empty_name() {
        let mut i = oats();
        i.name = "  ".to_string();
        assert!(matches!(
            validate_ingredient(&i),
            Err(EngineError::Validation(_))
        ));
    }

    #[test]
    fn test_validate_ingredient_negative_macros() {
        let mut i = oats();
        i.fat = -1.0;
        assert!(validate_ingredient(&i).is_err());
        let mut i = oats();
        i.calories = -5;
        assert!(validate_ingredient(&i).is_err());
        let mut i = oats();
        i.protein = f64::NAN;
        assert!(validate_ingredient(&i).is_err());
    }

    #[test]
    fn test_composed_without_ingredients_is_incomplete() {
        let meal = NewMeal {
            name: "Empty".to_string(),
            kind: MealKind::Composed {
                ingredients: vec![],
            },
            notes: None,
            instructions: None,
        };
        assert!(matches!(
            validate_new_meal(&meal),
            Err(EngineError::IncompleteMeal(_))
        ));
    }

    #[test]
    fn test_composed_with_zero_quantity_is_invalid() {
        let meal = NewMeal {
            name: "Bowl".to_string(),
            kind: MealKind::Composed {
                ingredients: vec![IngredientRef {
                    ingredient_id: 1,
                    quantity: 0.0,
                }],
            },
            notes: None,
            instructions: None,
        };
        assert!(matches!(
            validate_new_meal(&meal),
            Err(EngineError::InvalidQuantity { .. })
        ));
    }

    #[test]
    fn test_standalone_all_zero_is_incomplete() {
        assert!(matches!(
            validate_new_meal(&standalone(Macros::default())),
            Err(EngineError::IncompleteMeal(_))
        ));
        assert!(validate_new_meal(&standalone(Macros::new(0, 0.0, 0.0, 3.0))).is_ok());
    }

    #[test]
    fn test_meal_kind_serializes_with_tag() {
        let meal = standalone(Macros::new(500, 20.0, 60.0, 15.0));
        let json = serde_json::to_value(&meal).unwrap();
        assert_eq!(json["meal_type"], "standalone");
        assert_eq!(json["macros"]["calories"], 500);

        let back: NewMeal = serde_json::from_value(json).unwrap();
        assert_eq!(back, meal);
    }

    #[test]
    fn test_progress_remaining() {
        let goal = DailyGoal {
            calories: 2000,
            protein: Some(150.0),
            carbs: None,
            fat: Some(60.0),
        };
        let p = Progress::new(
            "2024-06-15".to_string(),
            Macros::new(2100, 120.5, 200.0, 30.0),
            3,
            Some(goal),
        );
        assert_eq!(p.calories_remaining, Some(-100));
        assert_eq!(p.protein_remaining, Some(29.5));
        assert!(p.carbs_remaining.is_none());
        assert_eq!(p.fat_remaining, Some(30.0));
    }

    #[test]
    fn test_validate_goal() {
        let mut goal = DailyGoal {
            calories: 1800,
            protein: Some(120.0),
            carbs: None,
            fat: None,
        };
        assert!(validate_goal(&goal).is_ok());
        goal.calories = 0;
        assert!(validate_goal(&goal).is_err());
        goal.calories = 1800;
        goal.protein = Some(-1.0);
        assert!(validate_goal(&goal).is_err());
    }
}
