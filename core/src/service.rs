use std::collections::HashMap;
use std::path::Path;

use chrono::Local;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::aggregate;
use crate::db::Database;
use crate::error::{ConflictDetail, EngineError, Result};
use crate::estimate::Estimate;
use crate::form::MealForm;
use crate::ledger::{self, DailyLedger, EntryEdit, LoggedEntry, MealSnapshot};
use crate::models::{
    DailyGoal, Ingredient, IngredientAdded, IngredientRef, Macros, Meal, MealDetail, MealKind,
    NewIngredient, NewMeal, Progress, validate_goal, validate_ingredient, validate_new_meal,
};
use crate::mods::{
    self, ModConfig, ModContext, ModDefinition, ModInfo, ModInputs, ModMeal, ModRegistry,
};

/// Platform-native barcode lookup.
///
/// The CLI implements this with reqwest against OpenFoodFacts. Called
/// synchronously from Rust.
pub trait BarcodeProvider: Send + Sync {
    fn lookup_barcode(&self, barcode: &str) -> anyhow::Result<Option<NewIngredient>>;
}

/// Fresh totals for a meal that uses an edited ingredient.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DependentTotals {
    pub meal_id: i64,
    pub totals: Macros,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngredientUpdated {
    pub ingredient: Ingredient,
    pub dependents: Vec<DependentTotals>,
}

pub struct PlateService {
    db: Database,
    registry: ModRegistry,
    mod_config: ModConfig,
    ledger: DailyLedger,
}

fn today() -> String {
    Local::now().date_naive().format("%Y-%m-%d").to_string()
}

impl PlateService {
    pub fn new(db_path: &str) -> Result<Self> {
        let db = Database::open(Path::new(db_path))?;
        Self::with_database(db, ModRegistry::with_builtins(), &today())
    }

    pub fn new_in_memory() -> Result<Self> {
        let db = Database::open_in_memory()?;
        Self::with_database(db, ModRegistry::with_builtins(), &today())
    }

    /// Build a service over `db`, loading mod flags and the ledger for `date`.
    pub fn with_database(db: Database, registry: ModRegistry, date: &str) -> Result<Self> {
        let mod_config = ModConfig::load(&registry, &db)?;
        let ledger = DailyLedger::from_entries(date, db.get_logged_entries(date)?);
        debug!(date, entries = ledger.entries().len(), "loaded ledger");
        Ok(Self {
            db,
            registry,
            mod_config,
            ledger,
        })
    }

    #[must_use]
    pub fn registry(&self) -> &ModRegistry {
        &self.registry
    }

    fn ingredient_map(&self) -> Result<HashMap<i64, Ingredient>> {
        Ok(self
            .db
            .list_ingredients(None)?
            .into_iter()
            .map(|i| (i.id, i))
            .collect())
    }

    fn lookup_for(&self, kind: &MealKind) -> Result<HashMap<i64, Ingredient>> {
        match kind {
            MealKind::Composed { ingredients } => {
                let ids: Vec<i64> = ingredients.iter().map(|r| r.ingredient_id).collect();
                Ok(self.db.ingredients_by_ids(&ids)?)
            }
            _ => Ok(HashMap::new()),
        }
    }

    // --- Ingredients ---

    pub fn add_ingredient(&self, ingredient: &NewIngredient) -> Result<IngredientAdded> {
        validate_ingredient(ingredient)?;
        let duplicate_of = self
            .db
            .find_ingredient_by_name(&ingredient.name)?
            .map(|existing| existing.id);
        if let Some(existing) = duplicate_of {
            warn!(
                name = %ingredient.name.trim(),
                existing,
                "an ingredient with this name already exists"
            );
        }
        let ingredient = self.db.insert_ingredient(ingredient)?;
        Ok(IngredientAdded {
            ingredient,
            duplicate_of,
        })
    }

    pub fn get_ingredient(&self, id: i64) -> Result<Ingredient> {
        self.db
            .get_ingredient(id)?
            .ok_or_else(|| EngineError::NotFound(format!("Ingredient {id}")))
    }

    pub fn list_ingredients(&self, search: Option<&str>) -> Result<Vec<Ingredient>> {
        Ok(self.db.list_ingredients(search)?)
    }

    /// Replace an ingredient's facts and recompute every meal that uses it.
    pub fn update_ingredient(
        &mut self,
        id: i64,
        ingredient: &NewIngredient,
    ) -> Result<IngredientUpdated> {
        validate_ingredient(ingredient)?;
        self.get_ingredient(id)?;
        let (updated, dependent_ids) = self.db.update_ingredient(id, ingredient)?;

        let mut meals = Vec::with_capacity(dependent_ids.len());
        for meal_id in dependent_ids {
            if let Some(meal) = self.db.get_meal(meal_id)? {
                meals.push(meal);
            }
        }
        let lookup = self.ingredient_map()?;
        let dependents = aggregate::recompute_dependents(id, &meals, &lookup)
            .into_iter()
            .map(|(meal_id, totals)| DependentTotals { meal_id, totals })
            .collect();
        Ok(IngredientUpdated {
            ingredient: updated,
            dependents,
        })
    }

    /// Delete an ingredient that no meal uses.
    pub fn delete_ingredient(&self, id: i64) -> Result<()> {
        let ingredient = self.get_ingredient(id)?;
        let users = self.db.meals_using_ingredient(id)?;
        if !users.is_empty() {
            let meals: Vec<String> = users.into_iter().map(|(_, name)| name).collect();
            let mut suggestions: Vec<String> = meals
                .iter()
                .map(|m| format!("Remove '{}' from '{m}' first", ingredient.name))
                .collect();
            suggestions.push(format!(
                "Edit '{}' instead of deleting it",
                ingredient.name
            ));
            return Err(EngineError::Conflict(Box::new(ConflictDetail {
                ingredient_id: id,
                ingredient_name: ingredient.name,
                meals,
                suggestions,
            })));
        }
        self.db.delete_ingredient(id)?;
        Ok(())
    }

    /// Look up a barcode: check the store first, then call the provider and
    /// keep the result.
    pub fn lookup_barcode(
        &self,
        provider: &dyn BarcodeProvider,
        code: &str,
    ) -> Result<Option<Ingredient>> {
        if let Some(cached) = self.db.get_ingredient_by_barcode(code)? {
            return Ok(Some(cached));
        }
        match provider.lookup_barcode(code)? {
            Some(mut draft) => {
                draft.barcode.get_or_insert_with(|| code.to_string());
                Ok(Some(self.add_ingredient(&draft)?.ingredient))
            }
            None => Ok(None),
        }
    }

    // --- Meals ---

    fn check_mod_registered(&self, kind: &MealKind) -> Result<()> {
        if let MealKind::Mod { mod_id, .. } = kind {
            self.registry.get(mod_id)?;
        }
        Ok(())
    }

    /// Every ref of a composed meal must point at a stored ingredient.
    fn check_refs_resolve(&self, meal: &NewMeal) -> Result<()> {
        let MealKind::Composed { ingredients } = &meal.kind else {
            return Ok(());
        };
        let ids: Vec<i64> = ingredients.iter().map(|r| r.ingredient_id).collect();
        let found = self.db.ingredients_by_ids(&ids)?;
        if found.is_empty() {
            return Err(EngineError::IncompleteMeal(format!(
                "none of the ingredients of '{}' exist",
                meal.name
            )));
        }
        match ids.iter().find(|id| !found.contains_key(id)) {
            Some(missing) => Err(EngineError::NotFound(format!("Ingredient {missing}"))),
            None => Ok(()),
        }
    }

    pub fn create_meal(&mut self, meal: &NewMeal) -> Result<Meal> {
        validate_new_meal(meal)?;
        self.check_mod_registered(&meal.kind)?;
        self.check_refs_resolve(meal)?;
        let meal = self.db.insert_meal(meal)?;
        info!(meal_id = meal.id, meal_type = meal.kind.meal_type(), "created meal");
        Ok(meal)
    }

    pub fn get_meal(&self, id: i64) -> Result<Meal> {
        self.db
            .get_meal(id)?
            .ok_or_else(|| EngineError::NotFound(format!("Meal {id}")))
    }

    /// A meal with its resolved lines and totals derived from current
    /// ingredient facts.
    pub fn meal_detail(&self, id: i64) -> Result<MealDetail> {
        let meal = self.get_meal(id)?;
        self.detail(meal)
    }

    fn detail(&self, meal: Meal) -> Result<MealDetail> {
        if let MealKind::Mod { mod_id, .. } = &meal.kind {
            assert!(
                self.registry.contains(mod_id),
                "meal {} references unregistered mod '{mod_id}'",
                meal.id
            );
        }
        let lookup = self.lookup_for(&meal.kind)?;
        let aggregate = aggregate::meal_totals(&meal.kind, &lookup);
        Ok(MealDetail {
            warnings: aggregate.warnings(),
            lines: aggregate.lines,
            totals: aggregate.totals,
            meal,
        })
    }

    pub fn list_meals(&self) -> Result<Vec<MealDetail>> {
        self.db
            .list_meals()?
            .into_iter()
            .map(|m| self.detail(m))
            .collect()
    }

    pub fn update_meal(&mut self, id: i64, meal: &NewMeal) -> Result<Meal> {
        validate_new_meal(meal)?;
        self.check_mod_registered(&meal.kind)?;
        self.get_meal(id)?;
        self.check_refs_resolve(meal)?;
        Ok(self.db.update_meal(id, meal)?)
    }

    pub fn duplicate_meal(&mut self, id: i64) -> Result<Meal> {
        let original = self.get_meal(id)?;
        let mut copy = NewMeal::from(&original);
        copy.name = format!("{} (copy)", original.name);
        Ok(self.db.insert_meal(&copy)?)
    }

    pub fn delete_meal(&mut self, id: i64) -> Result<()> {
        if !self.db.delete_meal(id)? {
            return Err(EngineError::NotFound(format!("Meal {id}")));
        }
        Ok(())
    }

    /// Open a stored meal for staged editing.
    pub fn edit_form(&self, id: i64) -> Result<MealForm> {
        MealForm::from_meal(&self.get_meal(id)?)
    }

    /// Everything a form needs to preview totals or switch type.
    pub fn form_lookup(&self) -> Result<HashMap<i64, Ingredient>> {
        self.ingredient_map()
    }

    /// Persist a form in one write. New forms create a meal, loaded forms
    /// replace theirs.
    pub fn save_form(&mut self, form: &mut MealForm) -> Result<Meal> {
        let meal = form.submit()?;
        let saved = match form.meal_id() {
            Some(id) => self.update_meal(id, &meal)?,
            None => self.create_meal(&meal)?,
        };
        form.committed(&saved);
        Ok(saved)
    }

    // --- Mods ---

    #[must_use]
    pub fn mods(&self) -> Vec<ModInfo> {
        mods::describe(&self.registry, &self.mod_config)
    }

    pub fn set_mod_enabled(&mut self, id: &str, enabled: bool) -> Result<()> {
        self.mod_config
            .set_enabled(&self.registry, &self.db, id, enabled)?;
        info!(mod_id = id, enabled, "mod toggled");
        Ok(())
    }

    /// Generate a meal through a mod without saving it. Unknown ids yield
    /// `Ok(None)`.
    pub fn generate_mod_meal(&self, id: &str, inputs: &ModInputs) -> Result<Option<ModMeal>> {
        if self.registry.contains(id) && !self.mod_config.is_enabled(id) {
            return Err(EngineError::Validation(format!("Mod '{id}' is disabled")));
        }
        let lookup = self.ingredient_map()?;
        self.registry
            .dispatch(id, inputs, &ModContext::new(&lookup))
    }

    /// Generate and save a meal through a mod.
    pub fn run_mod(&mut self, id: &str, inputs: &ModInputs) -> Result<Option<Meal>> {
        match self.generate_mod_meal(id, inputs)? {
            Some(generated) => Ok(Some(self.create_meal(&generated.into_new_meal())?)),
            None => Ok(None),
        }
    }

    /// Save a meal from a finished estimate through the AI-assisted mod.
    pub fn create_ai_meal(
        &mut self,
        description: &str,
        estimate: &Estimate,
        portion: Option<f64>,
    ) -> Result<Meal> {
        if estimate.degraded || estimate.macros().is_zero() {
            return Err(EngineError::IncompleteMeal(format!(
                "no usable estimate for '{}'",
                description.trim()
            )));
        }
        let inputs = mods::ai::inputs_from_estimate(description, estimate, portion);
        let id = mods::ai::AiAssistedMod.id();
        self.run_mod(id, &inputs)?
            .ok_or_else(|| EngineError::UnsupportedMod(id.to_string()))
    }

    // --- Daily ledger ---

    #[must_use]
    pub fn ledger(&self) -> &DailyLedger {
        &self.ledger
    }

    pub fn log_meal(&mut self, meal_id: i64, portion: f64) -> Result<LoggedEntry> {
        let meal = self.get_meal(meal_id)?;
        let lookup = self.lookup_for(&meal.kind)?;
        let snapshot = MealSnapshot::capture(&meal, &lookup);
        self.log_snapshot(snapshot, portion)
    }

    /// Log a one-off that is not saved as a meal.
    pub fn log_adhoc(&mut self, name: &str, macros: Macros, portion: f64) -> Result<LoggedEntry> {
        if name.trim().is_empty() {
            return Err(EngineError::Validation(
                "Entry name must not be empty".to_string(),
            ));
        }
        macros.validate()?;
        self.log_snapshot(MealSnapshot::adhoc(name.trim(), macros.rounded()), portion)
    }

    fn log_snapshot(&mut self, snapshot: MealSnapshot, portion: f64) -> Result<LoggedEntry> {
        let entry = self.ledger.add(snapshot, portion)?;
        if let Err(err) = self.db.insert_logged_entry(self.ledger.date(), &entry) {
            self.ledger.remove(&entry.unique_id);
            return Err(err.into());
        }
        Ok(entry)
    }

    /// Change an entry's portion and/or its ingredient list. New ingredients
    /// are read from the store; existing lines keep their logged facts.
    pub fn edit_entry(
        &mut self,
        unique_id: &str,
        portion: Option<f64>,
        refs: Option<&[IngredientRef]>,
    ) -> Result<LoggedEntry> {
        let lines = match refs {
            Some(refs) => {
                let current = self
                    .ledger
                    .get(unique_id)
                    .ok_or_else(|| EngineError::NotFound(format!("Entry {unique_id}")))?;
                let ids: Vec<i64> = refs.iter().map(|r| r.ingredient_id).collect();
                let lookup = self.db.ingredients_by_ids(&ids)?;
                Some(ledger::relines(&current.snapshot, refs, &lookup)?)
            }
            None => None,
        };
        let before = self
            .ledger
            .get(unique_id)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(format!("Entry {unique_id}")))?;
        let entry = self
            .ledger
            .edit_entry(unique_id, EntryEdit { portion, lines })?;
        if let Err(err) = self.db.update_logged_entry(&entry) {
            self.ledger.restore(before);
            return Err(err.into());
        }
        Ok(entry)
    }

    /// Remove one entry. Unknown ids are ignored.
    pub fn remove_entry(&mut self, unique_id: &str) -> Result<Option<LoggedEntry>> {
        self.db.delete_logged_entry(unique_id)?;
        Ok(self.ledger.remove(unique_id))
    }

    pub fn clear_today(&mut self) -> Result<usize> {
        self.db.clear_logged_entries(self.ledger.date())?;
        Ok(self.ledger.remove_all())
    }

    pub fn progress(&self) -> Result<Progress> {
        Ok(Progress::new(
            self.ledger.date().to_string(),
            self.ledger.totals(),
            self.ledger.entries().len(),
            self.db.get_goal()?,
        ))
    }

    // --- Goal ---

    pub fn set_goal(&self, goal: &DailyGoal) -> Result<()> {
        validate_goal(goal)?;
        Ok(self.db.set_goal(goal)?)
    }

    pub fn get_goal(&self) -> Result<Option<DailyGoal>> {
        Ok(self.db.get_goal()?)
    }

    pub fn clear_goal(&self) -> Result<bool> {
        Ok(self.db.clear_goal()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::form::FormMode;

    struct MockProvider {
        products: Vec<NewIngredient>,
    }

    impl BarcodeProvider for MockProvider {
        fn lookup_barcode(&self, barcode: &str) -> anyhow::Result<Option<NewIngredient>> {
            Ok(self
                .products
                .iter()
                .find(|p| p.barcode.as_deref() == Some(barcode))
                .cloned())
        }
    }

    struct FailingProvider;

    impl BarcodeProvider for FailingProvider {
        fn lookup_barcode(&self, _barcode: &str) -> anyhow::Result<Option<NewIngredient>> {
            anyhow::bail!("network down")
        }
    }

    fn new_ingredient(name: &str, m: Macros) -> NewIngredient {
        NewIngredient {
            name: name.to_string(),
            calories: m.calories,
            protein: m.protein,
            carbs: m.carbs,
            fat: m.fat,
            unit: "serving".to_string(),
            is_staple: false,
            barcode: None,
            source: "manual".to_string(),
        }
    }

    fn composed(name: &str, refs: &[(i64, f64)]) -> NewMeal {
        NewMeal {
            name: name.to_string(),
            kind: MealKind::Composed {
                ingredients: refs
                    .iter()
                    .map(|&(ingredient_id, quantity)| IngredientRef {
                        ingredient_id,
                        quantity,
                    })
                    .collect(),
            },
            notes: None,
            instructions: None,
        }
    }

    fn svc_with_meal() -> (PlateService, Ingredient, Meal) {
        let mut svc = PlateService::new_in_memory().unwrap();
        let a = svc
            .add_ingredient(&new_ingredient("A", Macros::new(100, 10.0, 5.0, 2.0)))
            .unwrap()
            .ingredient;
        let meal = svc.create_meal(&composed("M", &[(a.id, 2.0)])).unwrap();
        (svc, a, meal)
    }

    #[test]
    fn test_composed_meal_totals() {
        let (svc, _, meal) = svc_with_meal();
        let detail = svc.meal_detail(meal.id).unwrap();
        assert_eq!(detail.totals, Macros::new(200, 20.0, 10.0, 4.0));
        assert_eq!(detail.lines.len(), 1);
        assert_eq!(detail.lines[0].name.as_deref(), Some("A"));
        assert!(detail.warnings.is_empty());
    }

    #[test]
    fn test_log_half_portion_and_remove() {
        let (mut svc, _, meal) = svc_with_meal();
        let before = svc.ledger().totals();
        let entry = svc.log_meal(meal.id, 0.5).unwrap();
        assert_eq!(entry.macros, Macros::new(100, 10.0, 5.0, 2.0));
        assert_eq!(svc.ledger().totals(), Macros::new(100, 10.0, 5.0, 2.0));

        svc.remove_entry(&entry.unique_id).unwrap();
        assert_eq!(svc.ledger().totals(), before);
        assert!(svc.remove_entry("nope").unwrap().is_none());
    }

    #[test]
    fn test_direct_entry_mod_half_portion() {
        let mut svc = PlateService::new_in_memory().unwrap();
        let inputs = ModInputs::new()
            .with("name", "Shake")
            .with("macros", "500,40,50,20")
            .with("portion", 0.5);
        let meal = svc.run_mod("direct-entry", &inputs).unwrap().unwrap();
        let detail = svc.meal_detail(meal.id).unwrap();
        assert_eq!(detail.totals, Macros::new(250, 20.0, 25.0, 10.0));
    }

    #[test]
    fn test_unknown_mod_is_a_no_op() {
        let mut svc = PlateService::new_in_memory().unwrap();
        assert!(svc.run_mod("teleport", &ModInputs::new()).unwrap().is_none());
        assert!(svc.list_meals().unwrap().is_empty());
    }

    #[test]
    fn test_disabled_mod_is_rejected_and_persisted() {
        let mut svc = PlateService::new_in_memory().unwrap();
        svc.set_mod_enabled("direct-entry", false).unwrap();
        let inputs = ModInputs::new().with("macros", "100,1,1,1");
        assert!(matches!(
            svc.run_mod("direct-entry", &inputs),
            Err(EngineError::Validation(_))
        ));
        let info = svc.mods();
        let direct = info.iter().find(|m| m.id == "direct-entry").unwrap();
        assert!(!direct.enabled);
        assert!(info.iter().filter(|m| m.id != "direct-entry").all(|m| m.enabled));
        assert!(matches!(
            svc.set_mod_enabled("teleport", true),
            Err(EngineError::UnsupportedMod(_))
        ));
    }

    #[test]
    fn test_ingredient_mix_reads_store() {
        let mut svc = PlateService::new_in_memory().unwrap();
        let a = svc
            .add_ingredient(&new_ingredient("Rice", Macros::new(200, 4.0, 44.0, 0.4)))
            .unwrap()
            .ingredient;
        let inputs = ModInputs::new()
            .with("name", "Rice bowl")
            .with("items", format!("{}:1.5", a.id));
        let meal = svc.run_mod("ingredient-mix", &inputs).unwrap().unwrap();
        assert_eq!(
            svc.meal_detail(meal.id).unwrap().totals,
            Macros::new(300, 6.0, 66.0, 0.6)
        );
    }

    #[test]
    fn test_delete_referenced_ingredient_conflicts() {
        let (svc, a, _) = svc_with_meal();
        match svc.delete_ingredient(a.id) {
            Err(EngineError::Conflict(detail)) => {
                assert_eq!(detail.meals, vec!["M".to_string()]);
                assert_eq!(detail.suggestions.len(), 2);
            }
            other => panic!("expected conflict, got {other:?}"),
        }
        assert!(svc.get_ingredient(a.id).is_ok());
    }

    #[test]
    fn test_delete_unreferenced_ingredient() {
        let (mut svc, a, meal) = svc_with_meal();
        svc.delete_meal(meal.id).unwrap();
        svc.delete_ingredient(a.id).unwrap();
        assert!(matches!(
            svc.get_ingredient(a.id),
            Err(EngineError::NotFound(_))
        ));
        assert!(matches!(
            svc.delete_ingredient(a.id),
            Err(EngineError::NotFound(_))
        ));
    }

    #[test]
    fn test_ghost_reference_counts_zero() {
        let (mut svc, a, _) = svc_with_meal();
        let gone = svc
            .add_ingredient(&new_ingredient("Saffron", Macros::new(3, 0.1, 0.6, 0.0)))
            .unwrap()
            .ingredient;
        let meal = svc
            .create_meal(&composed("Ghostly", &[(a.id, 1.0), (gone.id, 3.0)]))
            .unwrap();
        // Bypass the guard, as data written before it would.
        svc.db.delete_ingredient(gone.id).unwrap();

        let detail = svc.meal_detail(meal.id).unwrap();
        assert_eq!(detail.totals, Macros::new(100, 10.0, 5.0, 2.0));
        assert_eq!(detail.warnings.len(), 1);
        assert!(detail.warnings[0].contains(&gone.id.to_string()));
    }

    #[test]
    fn test_meal_refs_must_resolve() {
        let (mut svc, a, meal) = svc_with_meal();
        assert!(matches!(
            svc.create_meal(&composed("Nothing", &[(4242, 1.0)])),
            Err(EngineError::IncompleteMeal(_))
        ));
        match svc.create_meal(&composed("Half", &[(a.id, 1.0), (4242, 1.0)])) {
            Err(EngineError::NotFound(what)) => assert_eq!(what, "Ingredient 4242"),
            other => panic!("expected not found, got {other:?}"),
        }
        assert!(matches!(
            svc.update_meal(meal.id, &composed("M", &[(4242, 2.0)])),
            Err(EngineError::IncompleteMeal(_))
        ));
        assert_eq!(svc.list_meals().unwrap().len(), 1);
    }

    #[test]
    fn test_update_ingredient_recomputes_dependents() {
        let (mut svc, a, meal) = svc_with_meal();
        let updated = svc
            .update_ingredient(a.id, &new_ingredient("A", Macros::new(150, 12.0, 5.0, 2.0)))
            .unwrap();
        assert_eq!(
            updated.dependents,
            vec![DependentTotals {
                meal_id: meal.id,
                totals: Macros::new(300, 24.0, 10.0, 4.0)
            }]
        );
        assert_eq!(
            svc.meal_detail(meal.id).unwrap().totals,
            Macros::new(300, 24.0, 10.0, 4.0)
        );
    }

    #[test]
    fn test_logged_entry_survives_template_edit() {
        let (mut svc, a, meal) = svc_with_meal();
        let entry = svc.log_meal(meal.id, 1.0).unwrap();
        svc.update_ingredient(a.id, &new_ingredient("A", Macros::new(500, 50.0, 5.0, 2.0)))
            .unwrap();
        assert_eq!(svc.ledger().get(&entry.unique_id).unwrap().macros, entry.macros);
        assert_eq!(svc.ledger().totals(), Macros::new(200, 20.0, 10.0, 4.0));
    }

    #[test]
    fn test_edit_entry_portion_and_ingredients() {
        let (mut svc, a, meal) = svc_with_meal();
        let b = svc
            .add_ingredient(&new_ingredient("B", Macros::new(50, 1.0, 10.0, 0.0)))
            .unwrap()
            .ingredient;
        let entry = svc.log_meal(meal.id, 1.0).unwrap();

        let edited = svc.edit_entry(&entry.unique_id, Some(0.5), None).unwrap();
        assert_eq!(edited.macros, Macros::new(100, 10.0, 5.0, 2.0));

        let refs = [
            IngredientRef {
                ingredient_id: a.id,
                quantity: 1.0,
            },
            IngredientRef {
                ingredient_id: b.id,
                quantity: 2.0,
            },
        ];
        let edited = svc.edit_entry(&entry.unique_id, None, Some(&refs)).unwrap();
        assert_eq!(edited.macros, Macros::new(100, 6.0, 12.5, 1.0));
        assert_eq!(svc.ledger().totals(), edited.macros);

        assert!(matches!(
            svc.edit_entry("missing", Some(1.0), None),
            Err(EngineError::NotFound(_))
        ));
    }

    #[test]
    fn test_invalid_portion_rejected_before_logging() {
        let (mut svc, _, meal) = svc_with_meal();
        for bad in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                svc.log_meal(meal.id, bad),
                Err(EngineError::InvalidQuantity { .. })
            ));
        }
        assert!(svc.ledger().entries().is_empty());
    }

    #[test]
    fn test_clear_today_and_progress() {
        let (mut svc, _, meal) = svc_with_meal();
        svc.set_goal(&DailyGoal {
            calories: 2000,
            protein: Some(100.0),
            carbs: None,
            fat: None,
        })
        .unwrap();
        svc.log_meal(meal.id, 1.0).unwrap();
        svc.log_adhoc("Apple", Macros::new(95, 0.5, 25.1, 0.3), 1.0)
            .unwrap();

        let progress = svc.progress().unwrap();
        assert_eq!(progress.entry_count, 2);
        assert_eq!(progress.calories_remaining, Some(1705));
        assert_eq!(progress.protein_remaining, Some(79.5));

        assert_eq!(svc.clear_today().unwrap(), 2);
        assert_eq!(svc.progress().unwrap().eaten, Macros::default());
    }

    #[test]
    fn test_incomplete_meals_are_not_written() {
        let mut svc = PlateService::new_in_memory().unwrap();
        assert!(matches!(
            svc.create_meal(&composed("Empty", &[])),
            Err(EngineError::IncompleteMeal(_))
        ));
        assert!(svc.list_meals().unwrap().is_empty());
    }

    #[test]
    fn test_duplicate_meal() {
        let (mut svc, _, meal) = svc_with_meal();
        let copy = svc.duplicate_meal(meal.id).unwrap();
        assert_ne!(copy.id, meal.id);
        assert_eq!(copy.name, "M (copy)");
        assert_eq!(copy.kind, meal.kind);
        assert_eq!(svc.list_meals().unwrap().len(), 2);
    }

    #[test]
    fn test_form_switch_and_save() {
        let (mut svc, _, meal) = svc_with_meal();
        let lookup = svc.form_lookup().unwrap();
        let mut form = svc.edit_form(meal.id).unwrap();
        form.switch_to_standalone(&lookup);
        assert_eq!(form.macros(), Macros::new(200, 20.0, 10.0, 4.0));

        let saved = svc.save_form(&mut form).unwrap();
        assert_eq!(saved.id, meal.id);
        assert_eq!(
            saved.kind,
            MealKind::Standalone {
                macros: Macros::new(200, 20.0, 10.0, 4.0)
            }
        );
        assert!(!form.is_dirty());

        let mut fresh = MealForm::new("Snack", FormMode::Standalone);
        assert!(svc.save_form(&mut fresh).is_err());
        fresh.set_macros(Macros::new(150, 3.0, 20.0, 6.0)).unwrap();
        let created = svc.save_form(&mut fresh).unwrap();
        assert_eq!(fresh.meal_id(), Some(created.id));
    }

    #[test]
    fn test_duplicate_name_is_flagged() {
        let svc = PlateService::new_in_memory().unwrap();
        let first = svc
            .add_ingredient(&new_ingredient("Oats", Macros::new(389, 16.9, 66.3, 6.9)))
            .unwrap();
        assert!(first.duplicate_of.is_none());
        let second = svc
            .add_ingredient(&new_ingredient("oats", Macros::new(389, 16.9, 66.3, 6.9)))
            .unwrap();
        assert_eq!(second.duplicate_of, Some(first.ingredient.id));
    }

    #[test]
    fn test_barcode_lookup_cache() {
        let svc = PlateService::new_in_memory().unwrap();
        let mut skyr = new_ingredient("Skyr", Macros::new(63, 11.0, 4.0, 0.2));
        skyr.barcode = Some("1234567890".to_string());
        skyr.source = "openfoodfacts".to_string();
        let provider = MockProvider {
            products: vec![skyr],
        };

        let found = svc
            .lookup_barcode(&provider, "1234567890")
            .unwrap()
            .unwrap();
        assert_eq!(found.name, "Skyr");

        let cached = svc
            .lookup_barcode(&FailingProvider, "1234567890")
            .unwrap()
            .unwrap();
        assert_eq!(cached.id, found.id);

        assert!(svc.lookup_barcode(&provider, "0000").unwrap().is_none());
        assert!(matches!(
            svc.lookup_barcode(&FailingProvider, "0000"),
            Err(EngineError::Storage(_))
        ));
    }

    #[test]
    fn test_ai_meal_from_estimate() {
        let mut svc = PlateService::new_in_memory().unwrap();
        let estimate = crate::estimate::extract_estimate(
            "```json\n{\"name\":\"Apple\",\"calories\":95,\"protein\":0.5,\"carbs\":25,\"fat\":0.3,\"confidence\":0.9}\n```",
        )
        .unwrap();
        let meal = svc.create_ai_meal("an apple", &estimate, None).unwrap();
        assert_eq!(meal.name, "Apple");
        let detail = svc.meal_detail(meal.id).unwrap();
        assert_eq!(detail.totals, Macros::new(95, 0.5, 25.0, 0.3));
    }

    #[test]
    fn test_ai_meal_refuses_placeholder_estimate() {
        let mut svc = PlateService::new_in_memory().unwrap();
        let fallback = crate::estimate::fallback_estimate();
        assert!(matches!(
            svc.create_ai_meal("mystery stew", &fallback, None),
            Err(EngineError::IncompleteMeal(_))
        ));

        let empty = crate::estimate::Estimate {
            degraded: false,
            confidence: 0.9,
            ..fallback
        };
        assert!(matches!(
            svc.create_ai_meal("water", &empty, None),
            Err(EngineError::IncompleteMeal(_))
        ));
        assert!(svc.list_meals().unwrap().is_empty());
    }

    #[test]
    fn test_ledger_reloads_for_date() {
        let db = Database::open_in_memory().unwrap();
        let mut svc =
            PlateService::with_database(db, ModRegistry::with_builtins(), "2024-06-15").unwrap();
        svc.log_adhoc("Toast", Macros::new(120, 4.0, 20.0, 2.0), 1.0)
            .unwrap();
        let PlateService { db, .. } = svc;
        let svc =
            PlateService::with_database(db, ModRegistry::with_builtins(), "2024-06-15").unwrap();
        assert_eq!(svc.ledger().totals(), Macros::new(120, 4.0, 20.0, 2.0));
        assert_eq!(svc.progress().unwrap().date, "2024-06-15");
    }

    #[test]
    #[should_panic(expected = "unregistered mod")]
    fn test_meal_with_unregistered_mod_panics() {
        let mut svc = PlateService::new_in_memory().unwrap();
        let meal = svc
            .run_mod("direct-entry", &ModInputs::new().with("macros", "100,1,1,1"))
            .unwrap()
            .unwrap();
        let PlateService { db, .. } = svc;
        let svc = PlateService::with_database(db, ModRegistry::empty(), "2024-06-15").unwrap();
        let _ = svc.meal_detail(meal.id);
    }
}
