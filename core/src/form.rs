//! Staged meal editing.
//!
//! A [`MealForm`] holds unsaved changes to a composed or standalone meal,
//! including a switch between the two. Nothing reaches storage until
//! [`MealForm::submit`] succeeds; [`MealForm::cancel`] returns to the last
//! persisted state.

use serde::Serialize;
use tracing::warn;

use crate::aggregate::{self, Aggregate, IngredientLookup};
use crate::error::{EngineError, Result};
use crate::models::{IngredientRef, Macros, Meal, MealKind, NewMeal, validate_new_meal};
use crate::portion::validate_positive;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FormMode {
    Composed,
    Standalone,
}

#[derive(Debug, Clone)]
pub struct MealForm {
    meal_id: Option<i64>,
    persisted: Option<NewMeal>,
    pub name: String,
    pub notes: Option<String>,
    pub instructions: Option<String>,
    mode: FormMode,
    ingredients: Vec<IngredientRef>,
    macros: Macros,
    original_ingredients: Option<Vec<IngredientRef>>,
    original_standalone_macros: Option<Macros>,
}

impl MealForm {
    #[must_use]
    pub fn new(name: &str, mode: FormMode) -> Self {
        Self {
            meal_id: None,
            persisted: None,
            name: name.to_string(),
            notes: None,
            instructions: None,
            mode,
            ingredients: Vec::new(),
            macros: Macros::default(),
            original_ingredients: None,
            original_standalone_macros: None,
        }
    }

    /// Start editing a stored meal. Mod meals are regenerated through their
    /// mod instead.
    pub fn from_meal(meal: &Meal) -> Result<Self> {
        let mut form = Self::new(&meal.name, FormMode::Composed);
        form.meal_id = Some(meal.id);
        form.load(&NewMeal::from(meal))?;
        form.persisted = Some(NewMeal::from(meal));
        Ok(form)
    }

    fn load(&mut self, meal: &NewMeal) -> Result<()> {
        self.name.clone_from(&meal.name);
        self.notes.clone_from(&meal.notes);
        self.instructions.clone_from(&meal.instructions);
        self.original_ingredients = None;
        self.original_standalone_macros = None;
        match &meal.kind {
            MealKind::Composed { ingredients } => {
                self.mode = FormMode::Composed;
                self.ingredients.clone_from(ingredients);
                self.macros = Macros::default();
            }
            MealKind::Standalone { macros } => {
                self.mode = FormMode::Standalone;
                self.ingredients.clear();
                self.macros = *macros;
            }
            MealKind::Mod { mod_id, .. } => {
                return Err(EngineError::Validation(format!(
                    "'{}' was generated by mod '{mod_id}' and cannot be edited as a form",
                    meal.name
                )));
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn meal_id(&self) -> Option<i64> {
        self.meal_id
    }

    #[must_use]
    pub fn mode(&self) -> FormMode {
        self.mode
    }

    #[must_use]
    pub fn ingredients(&self) -> &[IngredientRef] {
        &self.ingredients
    }

    #[must_use]
    pub fn macros(&self) -> Macros {
        self.macros
    }

    #[must_use]
    pub fn original_ingredients(&self) -> Option<&[IngredientRef]> {
        self.original_ingredients.as_deref()
    }

    #[must_use]
    pub fn original_standalone_macros(&self) -> Option<Macros> {
        self.original_standalone_macros
    }

    /// composed → standalone. The current ingredient list and its totals are
    /// kept aside; the totals become the editable macros.
    pub fn switch_to_standalone<L: IngredientLookup + ?Sized>(&mut self, lookup: &L) {
        if self.mode == FormMode::Standalone {
            return;
        }
        let totals = aggregate::compose(&self.ingredients, lookup).totals;
        self.original_ingredients = Some(std::mem::take(&mut self.ingredients));
        self.original_standalone_macros = Some(totals);
        self.macros = totals;
        self.mode = FormMode::Standalone;
    }

    /// standalone → composed. Restores the ingredient list set aside by the
    /// last switch, if any, and drops manually entered macros.
    pub fn switch_to_composed(&mut self) {
        if self.mode == FormMode::Composed {
            return;
        }
        self.ingredients = self.original_ingredients.take().unwrap_or_default();
        self.original_standalone_macros = None;
        self.macros = Macros::default();
        self.mode = FormMode::Composed;
    }

    fn require(&self, mode: FormMode) -> Result<()> {
        if self.mode == mode {
            Ok(())
        } else {
            Err(EngineError::Validation(format!(
                "'{}' is not a {} meal",
                self.name,
                match mode {
                    FormMode::Composed => "composed",
                    FormMode::Standalone => "standalone",
                }
            )))
        }
    }

    /// Add an ingredient, or change its quantity if already present.
    pub fn set_ingredient(&mut self, ingredient_id: i64, quantity: f64) -> Result<()> {
        self.require(FormMode::Composed)?;
        let quantity = validate_positive("quantity", quantity)?;
        match self
            .ingredients
            .iter_mut()
            .find(|r| r.ingredient_id == ingredient_id)
        {
            Some(r) => r.quantity = quantity,
            None => self.ingredients.push(IngredientRef {
                ingredient_id,
                quantity,
            }),
        }
        Ok(())
    }

    pub fn remove_ingredient(&mut self, ingredient_id: i64) -> Result<bool> {
        self.require(FormMode::Composed)?;
        let before = self.ingredients.len();
        self.ingredients.retain(|r| r.ingredient_id != ingredient_id);
        Ok(self.ingredients.len() != before)
    }

    pub fn set_macros(&mut self, macros: Macros) -> Result<()> {
        self.require(FormMode::Standalone)?;
        macros.validate()?;
        self.macros = macros;
        Ok(())
    }

    /// Live totals for display.
    pub fn preview<L: IngredientLookup + ?Sized>(&self, lookup: &L) -> Aggregate {
        aggregate::meal_totals(&self.kind(), lookup)
    }

    fn kind(&self) -> MealKind {
        match self.mode {
            FormMode::Composed => MealKind::Composed {
                ingredients: self.ingredients.clone(),
            },
            FormMode::Standalone => MealKind::Standalone {
                macros: self.macros,
            },
        }
    }

    #[must_use]
    pub fn to_new_meal(&self) -> NewMeal {
        NewMeal {
            name: self.name.trim().to_string(),
            kind: self.kind(),
            notes: self.notes.clone(),
            instructions: self.instructions.clone(),
        }
    }

    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.persisted.as_ref() != Some(&self.to_new_meal())
    }

    /// Discard every staged change, including a type switch.
    pub fn cancel(&mut self) {
        match self.persisted.clone() {
            Some(meal) => {
                if let Err(err) = self.load(&meal) {
                    warn!(meal = %meal.name, error = %err, "could not restore form");
                }
            }
            None => {
                let mode = self.mode;
                *self = Self::new(&self.name, mode);
            }
        }
    }

    /// Validated meal ready to persist. The form keeps its state so a failed
    /// save can be corrected.
    pub fn submit(&self) -> Result<NewMeal> {
        let meal = self.to_new_meal();
        validate_new_meal(&meal)?;
        Ok(meal)
    }

    /// Record a successful save.
    pub fn committed(&mut self, meal: &Meal) {
        self.meal_id = Some(meal.id);
        self.persisted = Some(NewMeal::from(meal));
        self.original_ingredients = None;
        self.original_standalone_macros = None;
    }
}
