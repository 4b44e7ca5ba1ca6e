use crate::error::{EngineError, Result};
use crate::models::Macros;

use super::{InputKind, InputSpec, ModContext, ModDefinition, ModInputs};

/// Macros typed in by hand, e.g. from a restaurant menu.
pub struct DirectEntryMod;

impl ModDefinition for DirectEntryMod {
    fn id(&self) -> &'static str {
        "direct-entry"
    }

    fn name(&self) -> &'static str {
        "Quick entry"
    }

    fn description(&self) -> &'static str {
        "Enter calories and macros directly"
    }

    fn input_schema(&self) -> Vec<InputSpec> {
        vec![
            InputSpec::new("name", "Meal name", InputKind::Text),
            InputSpec::new("macros", "Calories / protein / carbs / fat", InputKind::GridMacros)
                .required(),
        ]
    }

    fn calculate(&self, inputs: &ModInputs, _ctx: &ModContext<'_>) -> Result<Macros> {
        inputs
            .get_macros("macros")?
            .ok_or_else(|| EngineError::Validation("Missing required input 'macros'".to_string()))
    }
}
