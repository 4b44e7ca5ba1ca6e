//! Pluggable meal generators.
//!
//! A mod turns a small set of user inputs into a meal-shaped object. Every mod
//! is registered once in a [`ModRegistry`]; callers look definitions up by id
//! and never branch on a particular mod.

pub mod ai;
pub mod direct;
pub mod mix;
pub mod weight;

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::aggregate::IngredientLookup;
use crate::error::{EngineError, Result};
use crate::models::{Ingredient, Macros, MealKind, ModData, NewMeal};
use crate::portion;

/// Raw inputs collected for a mod, keyed by input name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModInputs(BTreeMap<String, Value>);

impl ModInputs {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: &str, value: impl Into<Value>) {
        self.0.insert(key.to_string(), value.into());
    }

    /// Insert a value typed on a command line. JSON literals keep their type,
    /// anything else is stored as a string.
    pub fn insert_raw(&mut self, key: &str, raw: &str) {
        let value = serde_json::from_str::<Value>(raw)
            .unwrap_or_else(|_| Value::String(raw.to_string()));
        self.0.insert(key.to_string(), value);
    }

    /// Build inputs from `key=value` strings. Text-like inputs are kept
    /// verbatim so a name such as "2024" stays a string.
    #[must_use]
    pub fn from_pairs(schema: &[InputSpec], pairs: &[(String, String)]) -> Self {
        let mut inputs = Self::new();
        for (key, raw) in pairs {
            let textual = schema.iter().any(|s| {
                s.key == key
                    && matches!(
                        s.kind,
                        InputKind::Text | InputKind::Select { .. } | InputKind::Radio { .. }
                    )
            });
            if textual {
                inputs.insert(key, raw.as_str());
            } else {
                inputs.insert_raw(key, raw);
            }
        }
        inputs
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key).filter(|v| !is_blank(v))
    }

    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str).map(str::trim)
    }

    /// Numeric input. Numeric strings are accepted.
    pub fn get_f64(&self, key: &str) -> Result<Option<f64>> {
        self.get(key).map(|v| number(key, v)).transpose()
    }

    pub fn get_macros(&self, key: &str) -> Result<Option<Macros>> {
        self.get(key).map(|v| grid_macros(key, v)).transpose()
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.get(key)? {
            Value::Bool(b) => Some(*b),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// The optional `portion` input, defaulting to one.
    pub fn portion(&self) -> Result<f64> {
        match self.get_f64("portion")? {
            Some(p) => portion::validate_portion(p),
            None => Ok(1.0),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }
}

fn is_blank(v: &Value) -> bool {
    match v {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

fn number(key: &str, v: &Value) -> Result<f64> {
    let parsed = match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match parsed {
        Some(n) if n.is_finite() => Ok(n),
        Some(n) => Err(EngineError::invalid_quantity(key, n)),
        None => Err(EngineError::invalid_quantity(key, f64::NAN)),
    }
}

/// A macro grid is either an object with the four fields or a
/// `calories,protein,carbs,fat` string.
#[allow(clippy::cast_possible_truncation)]
fn grid_macros(key: &str, v: &Value) -> Result<Macros> {
    let fields: Vec<f64> = match v {
        Value::Object(map) => ["calories", "protein", "carbs", "fat"]
            .iter()
            .map(|f| {
                map.get(*f)
                    .map_or(Ok(0.0), |x| number(&format!("{key}.{f}"), x))
            })
            .collect::<Result<_>>()?,
        Value::String(s) => {
            let parts: Vec<&str> = s.split(',').map(str::trim).collect();
            if parts.len() != 4 {
                return Err(EngineError::Validation(format!(
                    "Input '{key}' expects calories,protein,carbs,fat"
                )));
            }
            parts
                .iter()
                .map(|p| number(key, &Value::String((*p).to_string())))
                .collect::<Result<_>>()?
        }
        _ => {
            return Err(EngineError::Validation(format!(
                "Input '{key}' expects a macro grid"
            )));
        }
    };
    let macros = Macros {
        calories: portion::round_calories(fields[0]),
        protein: portion::round1(fields[1]),
        carbs: portion::round1(fields[2]),
        fat: portion::round1(fields[3]),
    };
    macros.validate()?;
    Ok(macros)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum InputKind {
    Text,
    Number {
        #[serde(skip_serializing_if = "Option::is_none")]
        min: Option<f64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        max: Option<f64>,
    },
    Select {
        options: &'static [&'static str],
    },
    Radio {
        options: &'static [&'static str],
    },
    GridMacros,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InputSpec {
    pub key: &'static str,
    pub label: &'static str,
    #[serde(flatten)]
    pub kind: InputKind,
    pub required: bool,
}

impl InputSpec {
    #[must_use]
    pub const fn new(key: &'static str, label: &'static str, kind: InputKind) -> Self {
        Self {
            key,
            label,
            kind,
            required: false,
        }
    }

    #[must_use]
    pub const fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

/// Check `inputs` against a schema. Unknown keys are left alone.
pub fn validate_inputs(schema: &[InputSpec], inputs: &ModInputs) -> Result<()> {
    for spec in schema {
        let Some(value) = inputs.get(spec.key) else {
            if spec.required {
                return Err(EngineError::Validation(format!(
                    "Missing required input '{}'",
                    spec.key
                )));
            }
            continue;
        };
        match &spec.kind {
            InputKind::Text => {
                if !value.is_string() {
                    return Err(EngineError::Validation(format!(
                        "Input '{}' must be text",
                        spec.key
                    )));
                }
            }
            InputKind::Number { min, max } => {
                let n = number(spec.key, value)?;
                let below = min.is_some_and(|m| n < m);
                let above = max.is_some_and(|m| n > m);
                if below || above {
                    return Err(EngineError::invalid_quantity(spec.key, n));
                }
            }
            InputKind::Select { options } | InputKind::Radio { options } => {
                let chosen = value.as_str().map(str::trim).unwrap_or_default();
                if !options.iter().any(|o| *o == chosen) {
                    return Err(EngineError::Validation(format!(
                        "Input '{}' must be one of: {}",
                        spec.key,
                        options.join(", ")
                    )));
                }
            }
            InputKind::GridMacros => {
                grid_macros(spec.key, value)?;
            }
        }
    }
    Ok(())
}

static NO_INGREDIENTS: Vec<Ingredient> = Vec::new();

/// What a calculator may read besides its own inputs.
#[derive(Clone, Copy)]
pub struct ModContext<'a> {
    pub ingredients: &'a dyn IngredientLookup,
}

impl<'a> ModContext<'a> {
    #[must_use]
    pub fn new(ingredients: &'a dyn IngredientLookup) -> Self {
        Self { ingredients }
    }

    #[must_use]
    pub fn empty() -> ModContext<'static> {
        ModContext {
            ingredients: &NO_INGREDIENTS,
        }
    }
}

/// A meal produced by a mod, not yet persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModMeal {
    pub name: String,
    pub mod_id: String,
    pub mod_data: ModData,
    pub portion: f64,
}

impl ModMeal {
    #[must_use]
    pub fn totals(&self) -> Macros {
        portion::scale(&self.mod_data.baseline, self.portion)
    }

    #[must_use]
    pub fn into_new_meal(self) -> NewMeal {
        NewMeal {
            name: self.name,
            kind: MealKind::Mod {
                mod_id: self.mod_id,
                mod_data: self.mod_data,
                portion: self.portion,
            },
            notes: None,
            instructions: None,
        }
    }
}

pub trait ModDefinition: Send + Sync {
    fn id(&self) -> &'static str;
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    fn input_schema(&self) -> Vec<InputSpec>;

    /// Macros for one portion. Must be a pure function of `inputs` and `ctx`.
    fn calculate(&self, inputs: &ModInputs, ctx: &ModContext<'_>) -> Result<Macros>;

    fn meal_name(&self, inputs: &ModInputs) -> String {
        inputs
            .get_str("name")
            .map_or_else(|| self.name().to_string(), ToString::to_string)
    }

    fn generate_meal(&self, inputs: &ModInputs, ctx: &ModContext<'_>) -> Result<ModMeal> {
        validate_inputs(&self.input_schema(), inputs)?;
        let portion = inputs.portion()?;
        let baseline = self.calculate(inputs, ctx)?;
        Ok(ModMeal {
            name: self.meal_name(inputs),
            mod_id: self.id().to_string(),
            mod_data: ModData {
                inputs: inputs.clone(),
                baseline,
            },
            portion,
        })
    }
}

/// Serializable view of a registered mod.
#[derive(Debug, Clone, Serialize)]
pub struct ModInfo {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub enabled: bool,
    pub inputs: Vec<InputSpec>,
}

pub struct ModRegistry {
    mods: BTreeMap<&'static str, Arc<dyn ModDefinition>>,
}

impl Default for ModRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl ModRegistry {
    #[must_use]
    pub fn empty() -> Self {
        Self {
            mods: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(weight::WeightScaledMod));
        registry.register(Arc::new(direct::DirectEntryMod));
        registry.register(Arc::new(mix::IngredientMixMod));
        registry.register(Arc::new(ai::AiAssistedMod));
        registry
    }

    pub fn register(&mut self, definition: Arc<dyn ModDefinition>) {
        let id = definition.id();
        if self.mods.insert(id, definition).is_some() {
            warn!(mod_id = id, "mod registered twice, keeping the latest");
        }
    }

    pub fn get(&self, id: &str) -> Result<Arc<dyn ModDefinition>> {
        self.mods
            .get(id)
            .cloned()
            .ok_or_else(|| EngineError::UnsupportedMod(id.to_string()))
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.mods.contains_key(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.mods.keys().copied()
    }

    pub fn definitions(&self) -> impl Iterator<Item = &Arc<dyn ModDefinition>> {
        self.mods.values()
    }

    /// Generate a meal through the mod registered under `id`.
    ///
    /// An unknown id is logged and yields `Ok(None)`.
    pub fn dispatch(
        &self,
        id: &str,
        inputs: &ModInputs,
        ctx: &ModContext<'_>,
    ) -> Result<Option<ModMeal>> {
        let definition = match self.get(id) {
            Ok(d) => d,
            Err(err) => {
                warn!(mod_id = id, "{err}");
                return Ok(None);
            }
        };
        let meal = definition.generate_meal(inputs, ctx)?;
        debug!(mod_id = id, calories = meal.mod_data.baseline.calories, "mod generated meal");
        Ok(Some(meal))
    }
}

// --- Enabled flags ---

/// Where mod enabled flags live between runs.
pub trait ModConfigStore {
    fn load_mod_config(&self) -> anyhow::Result<BTreeMap<String, bool>>;
    fn save_mod_config(&self, config: &BTreeMap<String, bool>) -> anyhow::Result<()>;
}

#[derive(Debug, Default)]
pub struct InMemoryModConfigStore {
    saved: RefCell<BTreeMap<String, bool>>,
    saves: RefCell<usize>,
}

impl InMemoryModConfigStore {
    #[must_use]
    pub fn with(config: BTreeMap<String, bool>) -> Self {
        Self {
            saved: RefCell::new(config),
            saves: RefCell::new(0),
        }
    }

    #[must_use]
    pub fn save_count(&self) -> usize {
        *self.saves.borrow()
    }
}

impl ModConfigStore for InMemoryModConfigStore {
    fn load_mod_config(&self) -> anyhow::Result<BTreeMap<String, bool>> {
        Ok(self.saved.borrow().clone())
    }

    fn save_mod_config(&self, config: &BTreeMap<String, bool>) -> anyhow::Result<()> {
        *self.saved.borrow_mut() = config.clone();
        *self.saves.borrow_mut() += 1;
        Ok(())
    }
}

/// Enabled flag per registered mod.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModConfig {
    enabled: BTreeMap<String, bool>,
}

impl ModConfig {
    /// Load stored flags. Ids that are no longer registered are dropped and
    /// registered ids without a stored flag start enabled.
    pub fn load(registry: &ModRegistry, store: &dyn ModConfigStore) -> Result<Self> {
        let stored = store.load_mod_config()?;
        for id in stored.keys().filter(|id| !registry.contains(id)) {
            debug!(mod_id = %id, "ignoring config for unregistered mod");
        }
        let enabled = registry
            .ids()
            .map(|id| (id.to_string(), stored.get(id).copied().unwrap_or(true)))
            .collect();
        Ok(Self { enabled })
    }

    #[must_use]
    pub fn is_enabled(&self, id: &str) -> bool {
        self.enabled.get(id).copied().unwrap_or(true)
    }

    pub fn set_enabled(
        &mut self,
        registry: &ModRegistry,
        store: &dyn ModConfigStore,
        id: &str,
        enabled: bool,
    ) -> Result<()> {
        registry.get(id)?;
        let mut next = self.enabled.clone();
        next.insert(id.to_string(), enabled);
        store.save_mod_config(&next)?;
        self.enabled = next;
        Ok(())
    }

    #[must_use]
    pub fn as_map(&self) -> &BTreeMap<String, bool> {
        &self.enabled
    }
}

#[must_use]
pub fn describe(registry: &ModRegistry, config: &ModConfig) -> Vec<ModInfo> {
    registry
        .definitions()
        .map(|d| ModInfo {
            id: d.id(),
            name: d.name(),
            description: d.description(),
            enabled: config.is_enabled(d.id()),
            inputs: d.input_schema(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins_registered() {
        let registry = ModRegistry::with_builtins();
        let ids: Vec<&str> = registry.ids().collect();
        assert_eq!(
            ids,
            vec!["ai-assisted", "direct-entry", "ingredient-mix", "weight-scaled"]
        );
    }

    #[test]
    fn test_unknown_mod_is_unsupported() {
        let registry = ModRegistry::with_builtins();
        assert!(matches!(
            registry.get("nope"),
            Err(EngineError::UnsupportedMod(id)) if id == "nope"
        ));
    }

    #[test]
    fn test_dispatch_unknown_is_noop() {
        let registry = ModRegistry::with_builtins();
        let out = registry
            .dispatch("nope", &ModInputs::new(), &ModContext::empty())
            .unwrap();
        assert!(out.is_none());
    }

    #[test]
    fn test_dispatch_propagates_input_errors() {
        let registry = ModRegistry::with_builtins();
        let inputs = ModInputs::new()
            .with("name", "Shake")
            .with("macros", "300,30,20,5")
            .with("portion", 0.0);
        let err = registry
            .dispatch("direct-entry", &inputs, &ModContext::empty())
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidQuantity { .. }));
    }

    #[test]
    fn test_validate_inputs() {
        let schema = vec![
            InputSpec::new("name", "Name", InputKind::Text).required(),
            InputSpec::new(
                "grams",
                "Grams",
                InputKind::Number {
                    min: Some(1.0),
                    max: Some(5000.0),
                },
            ),
            InputSpec::new(
                "unit",
                "Unit",
                InputKind::Radio {
                    options: &["g", "oz"],
                },
            ),
        ];

        let ok = ModInputs::new().with("name", "x").with("grams", "150").with("unit", "oz");
        assert!(validate_inputs(&schema, &ok).is_ok());

        let missing = ModInputs::new().with("grams", 150);
        assert!(matches!(
            validate_inputs(&schema, &missing),
            Err(EngineError::Validation(_))
        ));

        let blank = ModInputs::new().with("name", "  ");
        assert!(validate_inputs(&schema, &blank).is_err());

        let too_big = ModInputs::new().with("name", "x").with("grams", 9000);
        assert!(matches!(
            validate_inputs(&schema, &too_big),
            Err(EngineError::InvalidQuantity { .. })
        ));

        let not_a_number = ModInputs::new().with("name", "x").with("grams", "lots");
        assert!(matches!(
            validate_inputs(&schema, &not_a_number),
            Err(EngineError::InvalidQuantity { .. })
        ));

        let bad_option = ModInputs::new().with("name", "x").with("unit", "lb");
        assert!(matches!(
            validate_inputs(&schema, &bad_option),
            Err(EngineError::Validation(_))
        ));
    }

    #[test]
    fn test_grid_macros_parsing() {
        let inputs = ModInputs::new()
            .with("a", "500, 40, 50, 20")
            .with(
                "b",
                serde_json::json!({"calories": 95.4, "protein": 0.46, "carbs": 25.1}),
            )
            .with("c", "1,2,3");
        assert_eq!(
            inputs.get_macros("a").unwrap(),
            Some(Macros::new(500, 40.0, 50.0, 20.0))
        );
        assert_eq!(
            inputs.get_macros("b").unwrap(),
            Some(Macros::new(95, 0.5, 25.1, 0.0))
        );
        assert!(inputs.get_macros("c").is_err());
        assert_eq!(inputs.get_macros("missing").unwrap(), None);
    }

    #[test]
    fn test_insert_raw_keeps_json_types() {
        let mut inputs = ModInputs::new();
        inputs.insert_raw("weight", "150");
        inputs.insert_raw("name", "Chicken breast");
        assert_eq!(inputs.get("weight"), Some(&serde_json::json!(150)));
        assert_eq!(inputs.get_str("name"), Some("Chicken breast"));
    }

    #[test]
    fn test_from_pairs_keeps_text_inputs_as_strings() {
        let schema = direct::DirectEntryMod.input_schema();
        let pairs = vec![
            ("name".to_string(), "2024".to_string()),
            ("macros".to_string(), "500,40,50,20".to_string()),
            ("portion".to_string(), "0.5".to_string()),
        ];
        let inputs = ModInputs::from_pairs(&schema, &pairs);
        assert_eq!(inputs.get_str("name"), Some("2024"));
        assert_eq!(inputs.get("portion"), Some(&serde_json::json!(0.5)));
        assert!(validate_inputs(&schema, &inputs).is_ok());
    }

    #[test]
    fn test_portion_defaults_to_one() {
        assert!((ModInputs::new().portion().unwrap() - 1.0).abs() < f64::EPSILON);
        let half = ModInputs::new().with("portion", "1/2");
        // fractions are a display concern; the stored input is numeric
        assert!(half.portion().is_err());
        let half = ModInputs::new().with("portion", 0.5);
        assert!((half.portion().unwrap() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_mod_config_defaults_and_ignores_unknown() {
        let registry = ModRegistry::with_builtins();
        let store = InMemoryModConfigStore::with(BTreeMap::from([
            ("weight-scaled".to_string(), false),
            ("retired-mod".to_string(), true),
        ]));
        let config = ModConfig::load(&registry, &store).unwrap();
        assert!(!config.is_enabled("weight-scaled"));
        assert!(config.is_enabled("direct-entry"));
        assert!(!config.as_map().contains_key("retired-mod"));
    }

    #[test]
    fn test_mod_config_saves_on_every_mutation() {
        let registry = ModRegistry::with_builtins();
        let store = InMemoryModConfigStore::default();
        let mut config = ModConfig::load(&registry, &store).unwrap();

        config
            .set_enabled(&registry, &store, "ai-assisted", false)
            .unwrap();
        config
            .set_enabled(&registry, &store, "ai-assisted", true)
            .unwrap();
        assert_eq!(store.save_count(), 2);

        assert!(config.set_enabled(&registry, &store, "nope", false).is_err());
        assert_eq!(store.save_count(), 2);

        config
            .set_enabled(&registry, &store, "direct-entry", false)
            .unwrap();
        let reloaded = ModConfig::load(&registry, &store).unwrap();
        assert_eq!(reloaded, config);
    }

    struct ReadOnlyStore;

    impl ModConfigStore for ReadOnlyStore {
        fn load_mod_config(&self) -> anyhow::Result<BTreeMap<String, bool>> {
            Ok(BTreeMap::new())
        }

        fn save_mod_config(&self, _config: &BTreeMap<String, bool>) -> anyhow::Result<()> {
            anyhow::bail!("settings are read-only")
        }
    }

    #[test]
    fn test_failed_save_keeps_previous_flag() {
        let registry = ModRegistry::with_builtins();
        let mut config = ModConfig::load(&registry, &ReadOnlyStore).unwrap();
        assert!(
            config
                .set_enabled(&registry, &ReadOnlyStore, "weight-scaled", false)
                .is_err()
        );
        assert!(config.is_enabled("weight-scaled"));
        assert!(config.as_map().get("weight-scaled").is_none_or(|on| *on));
    }
}
