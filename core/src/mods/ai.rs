//! AI-assisted entry.
//!
//! Runs in two steps: the description goes to the estimator first, then
//! [`inputs_from_estimate`] turns the result into ordinary mod inputs so that
//! `calculate` stays a pure function.

use serde_json::json;

use crate::error::{EngineError, Result};
use crate::estimate::Estimate;
use crate::models::Macros;

use super::{InputKind, InputSpec, ModContext, ModDefinition, ModInputs};

pub struct AiAssistedMod;

#[must_use]
pub fn inputs_from_estimate(
    description: &str,
    estimate: &Estimate,
    portion: Option<f64>,
) -> ModInputs {
    let mut inputs = ModInputs::new()
        .with("description", description.trim())
        .with("name", estimate.name.as_str())
        .with(
            "macros",
            json!({
                "calories": estimate.calories,
                "protein": estimate.protein,
                "carbs": estimate.carbs,
                "fat": estimate.fat,
            }),
        )
        .with("unit", estimate.unit.as_str())
        .with("confidence", estimate.confidence)
        .with("degraded", estimate.degraded);
    if let Some(p) = portion {
        inputs.insert("portion", p);
    }
    inputs
}

impl ModDefinition for AiAssistedMod {
    fn id(&self) -> &'static str {
        "ai-assisted"
    }

    fn name(&self) -> &'static str {
        "Describe a meal"
    }

    fn description(&self) -> &'static str {
        "Estimate nutrition from a free-text description"
    }

    fn input_schema(&self) -> Vec<InputSpec> {
        vec![
            InputSpec::new("description", "What did you eat?", InputKind::Text).required(),
            InputSpec::new("name", "Meal name", InputKind::Text),
            InputSpec::new("macros", "Estimated macros", InputKind::GridMacros).required(),
            InputSpec::new(
                "confidence",
                "Confidence",
                InputKind::Number {
                    min: Some(0.0),
                    max: Some(1.0),
                },
            ),
        ]
    }

    fn calculate(&self, inputs: &ModInputs, _ctx: &ModContext<'_>) -> Result<Macros> {
        inputs.get_macros("macros")?.ok_or_else(|| {
            EngineError::Validation("Estimate the description before saving".to_string())
        })
    }

    fn meal_name(&self, inputs: &ModInputs) -> String {
        inputs
            .get_str("name")
            .or_else(|| inputs.get_str("description"))
            .unwrap_or(self.name())
            .to_string()
    }
}
