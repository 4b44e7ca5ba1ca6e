use crate::aggregate;
use crate::error::{EngineError, Result};
use crate::models::{IngredientRef, Macros, validate_ingredient_refs};

use super::{InputKind, InputSpec, ModContext, ModDefinition, ModInputs};

/// A one-off mix of stored ingredients, e.g. a smoothie.
pub struct IngredientMixMod;

/// Parse `"3:2, 7:0.5"` into ingredient refs.
pub fn parse_items(raw: &str) -> Result<Vec<IngredientRef>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|item| {
            let (id, qty) = item.split_once(':').unwrap_or((item, "1"));
            let ingredient_id = id.trim().parse::<i64>().map_err(|_| {
                EngineError::Validation(format!("Invalid ingredient id in '{item}'"))
            })?;
            let quantity = qty
                .trim()
                .parse::<f64>()
                .map_err(|_| EngineError::invalid_quantity("quantity", f64::NAN))?;
            Ok(IngredientRef {
                ingredient_id,
                quantity,
            })
        })
        .collect()
}

impl ModDefinition for IngredientMixMod {
    fn id(&self) -> &'static str {
        "ingredient-mix"
    }

    fn name(&self) -> &'static str {
        "Ingredient mix"
    }

    fn description(&self) -> &'static str {
        "Combine stored ingredients without saving a composed meal"
    }

    fn input_schema(&self) -> Vec<InputSpec> {
        vec![
            InputSpec::new("name", "Meal name", InputKind::Text),
            InputSpec::new("items", "Ingredients (id:quantity, ...)", InputKind::Text).required(),
        ]
    }

    fn calculate(&self, inputs: &ModInputs, ctx: &ModContext<'_>) -> Result<Macros> {
        let refs = parse_items(inputs.get_str("items").unwrap_or_default())?;
        if refs.is_empty() {
            return Err(EngineError::IncompleteMeal(
                "ingredient mix has no ingredients".to_string(),
            ));
        }
        validate_ingredient_refs(&refs)?;
        let agg = aggregate::compose(&refs, ctx.ingredients);
        if let Some(id) = agg.missing.first() {
            return Err(EngineError::NotFound(format!("Ingredient {id}")));
        }
        Ok(agg.totals)
    }
}
