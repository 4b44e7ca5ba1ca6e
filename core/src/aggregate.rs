//! Meal aggregation.
//!
//! Composed totals are always recomputed from the full ingredient list and
//! rounded once, after summation.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::models::{Ingredient, IngredientRef, Macros, Meal, MealKind, MealLine};
use crate::portion::{self, round_calories, round1};

/// Read access to ingredient facts by id.
pub trait IngredientLookup {
    fn ingredient(&self, id: i64) -> Option<Ingredient>;
}

impl IngredientLookup for HashMap<i64, Ingredient> {
    fn ingredient(&self, id: i64) -> Option<Ingredient> {
        self.get(&id).cloned()
    }
}

impl IngredientLookup for [Ingredient] {
    fn ingredient(&self, id: i64) -> Option<Ingredient> {
        self.iter().find(|i| i.id == id).cloned()
    }
}

impl IngredientLookup for Vec<Ingredient> {
    fn ingredient(&self, id: i64) -> Option<Ingredient> {
        self.as_slice().ingredient(id)
    }
}

#[derive(Debug, Clone)]
pub struct Aggregate {
    pub totals: Macros,
    pub lines: Vec<MealLine>,
    /// Ingredient ids that no longer exist; each contributed zero.
    pub missing: Vec<i64>,
}

impl Aggregate {
    fn literal(totals: Macros) -> Self {
        Self {
            totals,
            lines: Vec::new(),
            missing: Vec::new(),
        }
    }

    #[must_use]
    pub fn warnings(&self) -> Vec<String> {
        self.missing
            .iter()
            .map(|id| format!("ingredient {id} no longer exists and was counted as zero"))
            .collect()
    }
}

/// `Σ ingredient.macro × quantity`, rounded per field.
#[allow(clippy::cast_precision_loss)]
pub fn compose<L: IngredientLookup + ?Sized>(refs: &[IngredientRef], lookup: &L) -> Aggregate {
    let mut lines = Vec::with_capacity(refs.len());
    let mut missing = Vec::new();
    let (mut cal, mut pro, mut carb, mut fat) = (0.0_f64, 0.0_f64, 0.0_f64, 0.0_f64);

    for r in refs {
        if let Some(ing) = lookup.ingredient(r.ingredient_id) {
            let line = MealLine {
                ingredient_id: r.ingredient_id,
                name: Some(ing.name),
                unit: Some(ing.unit),
                quantity: r.quantity,
                calories: ing.calories as f64 * r.quantity,
                protein: ing.protein * r.quantity,
                carbs: ing.carbs * r.quantity,
                fat: ing.fat * r.quantity,
            };
            cal += line.calories;
            pro += line.protein;
            carb += line.carbs;
            fat += line.fat;
            lines.push(line);
        } else {
            warn!(
                ingredient_id = r.ingredient_id,
                "ghost ingredient reference counted as zero"
            );
            missing.push(r.ingredient_id);
            lines.push(MealLine {
                ingredient_id: r.ingredient_id,
                name: None,
                unit: None,
                quantity: r.quantity,
                calories: 0.0,
                protein: 0.0,
                carbs: 0.0,
                fat: 0.0,
            });
        }
    }

    Aggregate {
        totals: Macros {
            calories: round_calories(cal),
            protein: round1(pro),
            carbs: round1(carb),
            fat: round1(fat),
        },
        lines,
        missing,
    }
}

/// Totals for any meal kind. Mod meals are scaled from their baseline snapshot.
pub fn meal_totals<L: IngredientLookup + ?Sized>(kind: &MealKind, lookup: &L) -> Aggregate {
    match kind {
        MealKind::Composed { ingredients } => compose(ingredients, lookup),
        MealKind::Standalone { macros } => Aggregate::literal(*macros),
        MealKind::Mod {
            mod_data, portion, ..
        } => Aggregate::literal(portion::scale(&mod_data.baseline, *portion)),
    }
}

#[must_use]
pub fn references(kind: &MealKind, ingredient_id: i64) -> bool {
    match kind {
        MealKind::Composed { ingredients } => {
            ingredients.iter().any(|r| r.ingredient_id == ingredient_id)
        }
        _ => false,
    }
}

/// Recompute, from scratch, every composed meal that references `ingredient_id`.
pub fn recompute_dependents<L: IngredientLookup + ?Sized>(
    ingredient_id: i64,
    meals: &[Meal],
    lookup: &L,
) -> Vec<(i64, Macros)> {
    let recomputed: Vec<(i64, Macros)> = meals
        .iter()
        .filter(|m| references(&m.kind, ingredient_id))
        .map(|m| (m.id, meal_totals(&m.kind, lookup).totals))
        .collect();
    debug!(
        ingredient_id,
        dependents = recomputed.len(),
        "recomputed dependent meals"
    );
    recomputed
}
