use crate::error::{EngineError, Result};
use crate::models::Macros;
use crate::portion::{round1, round_calories};

use super::{InputKind, InputSpec, ModContext, ModDefinition, ModInputs};

const GRAMS_PER_OUNCE: f64 = 28.349_523_125;

/// Reference foods, per 100 g.
const REFERENCE_FOODS: &[(&str, Macros)] = &[
    ("chicken-breast", Macros::new(165, 31.0, 0.0, 3.6)),
    ("salmon", Macros::new(208, 20.0, 0.0, 13.0)),
    ("white-rice-cooked", Macros::new(130, 2.7, 28.0, 0.3)),
    ("oats", Macros::new(389, 16.9, 66.3, 6.9)),
    ("banana", Macros::new(89, 1.1, 22.8, 0.3)),
    ("egg", Macros::new(155, 13.0, 1.1, 11.0)),
];

const REFERENCE_NAMES: &[&str] = &[
    "chicken-breast",
    "salmon",
    "white-rice-cooked",
    "oats",
    "banana",
    "egg",
];

/// `macro = per_100g × weight / 100`.
pub struct WeightScaledMod;

impl WeightScaledMod {
    fn per_100g(inputs: &ModInputs) -> Result<Macros> {
        if let Some(custom) = inputs.get_macros("per_100g")? {
            return Ok(custom);
        }
        let food = inputs.get_str("food").ok_or_else(|| {
            EngineError::Validation("Provide either 'food' or 'per_100g'".to_string())
        })?;
        REFERENCE_FOODS
            .iter()
            .find(|(name, _)| *name == food)
            .map(|(_, m)| *m)
            .ok_or_else(|| EngineError::Validation(format!("Unknown reference food '{food}'")))
    }

    fn grams(inputs: &ModInputs) -> Result<f64> {
        let weight = inputs
            .get_f64("weight")?
            .ok_or_else(|| EngineError::Validation("Missing required input 'weight'".to_string()))?;
        let weight = crate::portion::validate_positive("weight", weight)?;
        Ok(match inputs.get_str("unit") {
            Some("oz") => weight * GRAMS_PER_OUNCE,
            _ => weight,
        })
    }
}

impl ModDefinition for WeightScaledMod {
    fn id(&self) -> &'static str {
        "weight-scaled"
    }

    fn name(&self) -> &'static str {
        "Weighed food"
    }

    fn description(&self) -> &'static str {
        "Scale per-100 g nutrition facts by a weighed amount"
    }

    fn input_schema(&self) -> Vec<InputSpec> {
        vec![
            InputSpec::new("name", "Meal name", InputKind::Text),
            InputSpec::new(
                "food",
                "Reference food",
                InputKind::Select {
                    options: REFERENCE_NAMES,
                },
            ),
            InputSpec::new("per_100g", "Per 100 g", InputKind::GridMacros),
            InputSpec::new(
                "weight",
                "Weight",
                InputKind::Number {
                    min: Some(0.0),
                    max: Some(10_000.0),
                },
            )
            .required(),
            InputSpec::new(
                "unit",
                "Unit",
                InputKind::Radio {
                    options: &["g", "oz"],
                },
            ),
        ]
    }

    fn calculate(&self, inputs: &ModInputs, _ctx: &ModContext<'_>) -> Result<Macros> {
        let base = Self::per_100g(inputs)?;
        let factor = Self::grams(inputs)? / 100.0;
        #[allow(clippy::cast_precision_loss)]
        let calories = base.calories as f64 * factor;
        Ok(Macros {
            calories: round_calories(calories),
            protein: round1(base.protein * factor),
            carbs: round1(base.carbs * factor),
            fat: round1(base.fat * factor),
        })
    }

    fn meal_name(&self, inputs: &ModInputs) -> String {
        if let Some(name) = inputs.get_str("name") {
            return name.to_string();
        }
        let unit = inputs.get_str("unit").unwrap_or("g");
        let weight = inputs.get_f64("weight").ok().flatten().unwrap_or_default();
        match inputs.get_str("food") {
            Some(food) => format!("{food} {weight}{unit}"),
            None => format!("{} {weight}{unit}", self.name()),
        }
    }
}
