use anyhow::Result;

use plate_core::PlateService;
use plate_core::models::NewIngredient;
use plate_core::service::BarcodeProvider;

use super::helpers::{format_macros, print_ingredient_table, print_json};

/// Fields to change on an existing ingredient. Unset fields keep their value.
#[derive(Debug, Default)]
pub(crate) struct IngredientChanges {
    pub name: Option<String>,
    pub calories: Option<i64>,
    pub protein: Option<f64>,
    pub carbs: Option<f64>,
    pub fat: Option<f64>,
    pub unit: Option<String>,
    pub staple: Option<bool>,
}

impl IngredientChanges {
    fn apply(self, mut base: NewIngredient) -> NewIngredient {
        if let Some(v) = self.name {
            base.name = v;
        }
        if let Some(v) = self.calories {
            base.calories = v;
        }
        if let Some(v) = self.protein {
            base.protein = v;
        }
        if let Some(v) = self.carbs {
            base.carbs = v;
        }
        if let Some(v) = self.fat {
            base.fat = v;
        }
        if let Some(v) = self.unit {
            base.unit = v;
        }
        if let Some(v) = self.staple {
            base.is_staple = v;
        }
        base
    }
}

pub(crate) fn cmd_ingredient_add(
    svc: &PlateService,
    ingredient: &NewIngredient,
    json: bool,
) -> Result<()> {
    let added = svc.add_ingredient(ingredient)?;

    if json {
        print_json(&added)?;
    } else {
        let i = &added.ingredient;
        println!(
            "Added ingredient #{}: {} per {} ({})",
            i.id,
            i.name,
            i.unit,
            format_macros(&i.macros())
        );
        if let Some(existing) = added.duplicate_of {
            eprintln!("Warning: ingredient #{existing} already has this name");
        }
    }
    Ok(())
}

pub(crate) fn cmd_ingredient_list(
    svc: &PlateService,
    search: Option<&str>,
    json: bool,
) -> Result<()> {
    let ingredients = svc.list_ingredients(search)?;

    if json {
        print_json(&ingredients)?;
    } else if ingredients.is_empty() {
        eprintln!("No ingredients found.");
    } else {
        print_ingredient_table(&ingredients);
    }
    Ok(())
}

pub(crate) fn cmd_ingredient_update(
    svc: &mut PlateService,
    id: i64,
    changes: IngredientChanges,
    json: bool,
) -> Result<()> {
    let current = svc.get_ingredient(id)?;
    let base = NewIngredient {
        name: current.name,
        calories: current.calories,
        protein: current.protein,
        carbs: current.carbs,
        fat: current.fat,
        unit: current.unit,
        is_staple: current.is_staple,
        barcode: current.barcode,
        source: current.source,
    };
    let updated = svc.update_ingredient(id, &changes.apply(base))?;

    if json {
        print_json(&updated)?;
    } else {
        let i = &updated.ingredient;
        println!(
            "Updated ingredient #{}: {} per {} ({})",
            i.id,
            i.name,
            i.unit,
            format_macros(&i.macros())
        );
        for dep in &updated.dependents {
            println!("  meal #{} now {}", dep.meal_id, format_macros(&dep.totals));
        }
    }
    Ok(())
}

pub(crate) fn cmd_ingredient_delete(svc: &PlateService, id: i64, json: bool) -> Result<()> {
    svc.delete_ingredient(id)?;
    if json {
        println!("{}", serde_json::json!({ "deleted": id }));
    } else {
        println!("Deleted ingredient #{id}");
    }
    Ok(())
}

pub(crate) fn cmd_ingredient_barcode(
    svc: &PlateService,
    provider: &dyn BarcodeProvider,
    code: &str,
    json: bool,
) -> Result<()> {
    let Some(ingredient) = svc.lookup_barcode(provider, code)? else {
        anyhow::bail!("No product found for barcode '{code}'");
    };

    if json {
        print_json(&ingredient)?;
    } else {
        println!(
            "#{} {} per {} ({})",
            ingredient.id,
            ingredient.name,
            ingredient.unit,
            format_macros(&ingredient.macros())
        );
    }
    Ok(())
}
