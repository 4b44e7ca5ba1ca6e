use anyhow::{Result, bail};

use plate_core::PlateService;
use plate_core::form::{FormMode, MealForm};
use plate_core::models::{Macros, MealDetail, MealKind};
use plate_core::portion::portion_label;

use super::helpers::{format_macros, parse_ref, print_json, print_meal_table};
use crate::MacroArgs;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub(crate) enum TargetType {
    Composed,
    Standalone,
}

/// Staged changes for `meal edit`, applied to a form and saved once.
#[derive(Debug, Default)]
pub(crate) struct MealEdits {
    pub name: Option<String>,
    pub notes: Option<String>,
    pub instructions: Option<String>,
    pub to: Option<TargetType>,
    pub set: Vec<String>,
    pub remove: Vec<i64>,
    pub macros: MacroArgs,
}

fn print_detail(detail: &MealDetail) {
    let meal = &detail.meal;
    println!("#{} {} [{}]", meal.id, meal.name, meal.kind.meal_type());
    match &meal.kind {
        MealKind::Composed { .. } => {
            for line in &detail.lines {
                let name = line.name.as_deref().unwrap_or("(missing)");
                let unit = line.unit.as_deref().unwrap_or("");
                println!("  {} x {name} ({unit})  {:.0} kcal", line.quantity, line.calories);
            }
        }
        MealKind::Mod {
            mod_id, portion, ..
        } => println!("  via {mod_id}, portion {}", portion_label(*portion)),
        MealKind::Standalone { .. } => {}
    }
    println!("  Total: {}", format_macros(&detail.totals));
    if let Some(notes) = &meal.notes {
        println!("  Notes: {notes}");
    }
    if let Some(instructions) = &meal.instructions {
        println!("  Instructions: {instructions}");
    }
    for w in &detail.warnings {
        eprintln!("Warning: {w}");
    }
}

pub(crate) fn cmd_meal_create(
    svc: &mut PlateService,
    name: &str,
    refs: &[String],
    macros: &MacroArgs,
    notes: Option<String>,
    instructions: Option<String>,
    json: bool,
) -> Result<()> {
    if !refs.is_empty() && !macros.is_empty() {
        bail!("Give either --ingredient or macro values, not both");
    }
    let mut form = if refs.is_empty() {
        let mut form = MealForm::new(name, FormMode::Standalone);
        form.set_macros(macros.apply(Macros::default()))?;
        form
    } else {
        let mut form = MealForm::new(name, FormMode::Composed);
        for r in refs {
            let r = parse_ref(r)?;
            form.set_ingredient(r.ingredient_id, r.quantity)?;
        }
        form
    };
    form.notes = notes;
    form.instructions = instructions;

    let meal = svc.save_form(&mut form)?;
    let detail = svc.meal_detail(meal.id)?;
    if json {
        print_json(&detail)?;
    } else {
        print_detail(&detail);
    }
    Ok(())
}

pub(crate) fn cmd_meal_show(svc: &PlateService, id: i64, json: bool) -> Result<()> {
    let detail = svc.meal_detail(id)?;
    if json {
        print_json(&detail)?;
    } else {
        print_detail(&detail);
    }
    Ok(())
}

pub(crate) fn cmd_meal_list(svc: &PlateService, json: bool) -> Result<()> {
    let meals = svc.list_meals()?;
    if json {
        print_json(&meals)?;
    } else if meals.is_empty() {
        eprintln!("No meals yet. Use `plate meal create` to add one.");
    } else {
        print_meal_table(&meals);
    }
    Ok(())
}

pub(crate) fn cmd_meal_duplicate(svc: &mut PlateService, id: i64, json: bool) -> Result<()> {
    let copy = svc.duplicate_meal(id)?;
    if json {
        print_json(&copy)?;
    } else {
        println!("Created #{} {}", copy.id, copy.name);
    }
    Ok(())
}

pub(crate) fn cmd_meal_delete(svc: &mut PlateService, id: i64, json: bool) -> Result<()> {
    svc.delete_meal(id)?;
    if json {
        println!("{}", serde_json::json!({ "deleted": id }));
    } else {
        println!("Deleted meal #{id}");
    }
    Ok(())
}

/// Stage every requested change on the form. Type switches run first so that
/// ingredient and macro edits apply to the target type.
fn stage(form: &mut MealForm, svc: &PlateService, edits: MealEdits) -> Result<()> {
    if let Some(name) = edits.name {
        form.name = name;
    }
    if edits.notes.is_some() {
        form.notes = edits.notes;
    }
    if edits.instructions.is_some() {
        form.instructions = edits.instructions;
    }
    match edits.to {
        Some(TargetType::Standalone) => form.switch_to_standalone(&svc.form_lookup()?),
        Some(TargetType::Composed) => form.switch_to_composed(),
        None => {}
    }
    for id in edits.remove {
        if !form.remove_ingredient(id)? {
            eprintln!("Note: ingredient #{id} was not in the meal");
        }
    }
    for r in &edits.set {
        let r = parse_ref(r)?;
        form.set_ingredient(r.ingredient_id, r.quantity)?;
    }
    if !edits.macros.is_empty() {
        form.set_macros(edits.macros.apply(form.macros()))?;
    }
    Ok(())
}

pub(crate) fn cmd_meal_edit(
    svc: &mut PlateService,
    id: i64,
    edits: MealEdits,
    json: bool,
) -> Result<()> {
    let mut form = svc.edit_form(id)?;
    stage(&mut form, svc, edits)?;

    if !form.is_dirty() {
        eprintln!("Nothing to change.");
        return Ok(());
    }
    // A failed save leaves the stored meal untouched.
    svc.save_form(&mut form)?;
    let detail = svc.meal_detail(id)?;
    if json {
        print_json(&detail)?;
    } else {
        print_detail(&detail);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use plate_core::models::NewIngredient;

    fn svc_with_oats() -> (PlateService, i64) {
        let svc = PlateService::new_in_memory().unwrap();
        let id = svc
            .add_ingredient(&NewIngredient {
                name: "Oats".to_string(),
                calories: 150,
                protein: 5.0,
                carbs: 27.0,
                fat: 2.5,
                unit: "40g".to_string(),
                is_staple: true,
                barcode: None,
                source: "manual".to_string(),
            })
            .unwrap()
            .ingredient
            .id;
        (svc, id)
    }

    #[test]
    fn test_create_composed_then_switch_to_standalone() {
        let (mut svc, oats) = svc_with_oats();
        cmd_meal_create(
            &mut svc,
            "Porridge",
            &[format!("{oats}:2")],
            &MacroArgs::default(),
            None,
            None,
            true,
        )
        .unwrap();
        let meal_id = svc.list_meals().unwrap()[0].meal.id;

        cmd_meal_edit(
            &mut svc,
            meal_id,
            MealEdits {
                to: Some(TargetType::Standalone),
                macros: MacroArgs {
                    fat: Some(6.0),
                    ..MacroArgs::default()
                },
                ..MealEdits::default()
            },
            true,
        )
        .unwrap();

        let detail = svc.meal_detail(meal_id).unwrap();
        assert_eq!(detail.meal.kind.meal_type(), "standalone");
        assert_eq!(detail.totals, Macros::new(300, 10.0, 54.0, 6.0));
    }

    #[test]
    fn test_create_rejects_mixed_arguments() {
        let (mut svc, oats) = svc_with_oats();
        let macros = MacroArgs {
            calories: Some(100),
            ..MacroArgs::default()
        };
        assert!(
            cmd_meal_create(&mut svc, "Both", &[format!("{oats}")], &macros, None, None, true)
                .is_err()
        );
        assert!(svc.list_meals().unwrap().is_empty());
    }

    #[test]
    fn test_failed_edit_leaves_meal_untouched() {
        let (mut svc, oats) = svc_with_oats();
        cmd_meal_create(
            &mut svc,
            "Porridge",
            &[format!("{oats}:1")],
            &MacroArgs::default(),
            None,
            None,
            true,
        )
        .unwrap();
        let meal_id = svc.list_meals().unwrap()[0].meal.id;
        let before = svc.get_meal(meal_id).unwrap();

        let result = cmd_meal_edit(
            &mut svc,
            meal_id,
            MealEdits {
                remove: vec![oats],
                ..MealEdits::default()
            },
            true,
        );
        assert!(result.is_err());
        assert_eq!(svc.get_meal(meal_id).unwrap(), before);
    }
}
