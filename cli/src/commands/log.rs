use anyhow::{Result, bail};

use plate_core::PlateService;
use plate_core::models::Progress;
use plate_core::portion::portion_label;

use super::helpers::{format_macros, parse_portion_arg, parse_ref, print_entry_table, print_json};

/// Expand a unique id prefix (as shown by `plate today`) to the full id.
/// Unknown prefixes are returned unchanged.
fn resolve_entry(svc: &PlateService, prefix: &str) -> Result<String> {
    let matches: Vec<&str> = svc
        .ledger()
        .entries()
        .iter()
        .map(|e| e.unique_id.as_str())
        .filter(|id| id.starts_with(prefix))
        .collect();
    match matches.as_slice() {
        [] => Ok(prefix.to_string()),
        [one] => Ok((*one).to_string()),
        _ => bail!("Entry id '{prefix}' is ambiguous; use more characters"),
    }
}

pub(crate) fn cmd_log(
    svc: &mut PlateService,
    meal_id: i64,
    portion: Option<&str>,
    json: bool,
) -> Result<()> {
    let portion = parse_portion_arg(portion)?;
    let entry = svc.log_meal(meal_id, portion)?;

    if json {
        print_json(&entry)?;
    } else {
        println!(
            "Logged: {} x{} ({})",
            entry.snapshot.name,
            portion_label(entry.portion),
            format_macros(&entry.macros)
        );
    }
    Ok(())
}

fn print_progress(p: &Progress) {
    println!("Eaten:     {}", format_macros(&p.eaten));
    if let Some(goal) = &p.goal {
        let remaining = p.calories_remaining.unwrap_or_default();
        print!("Goal:      {} kcal  ({remaining} left", goal.calories);
        for (label, left) in [
            ("P", p.protein_remaining),
            ("C", p.carbs_remaining),
            ("F", p.fat_remaining),
        ] {
            if let Some(left) = left {
                print!(", {label} {left:.1}g");
            }
        }
        println!(")");
    }
}

pub(crate) fn cmd_today(svc: &PlateService, json: bool) -> Result<()> {
    let progress = svc.progress()?;
    if json {
        return print_json(&serde_json::json!({
            "entries": svc.ledger().entries(),
            "progress": progress,
        }));
    }

    println!("{}", progress.date);
    if svc.ledger().entries().is_empty() {
        println!("Nothing logged yet.");
    } else {
        print_entry_table(svc.ledger().entries());
    }
    print_progress(&progress);
    Ok(())
}

pub(crate) fn cmd_entry_remove(svc: &mut PlateService, id: &str, json: bool) -> Result<()> {
    let id = resolve_entry(svc, id)?;
    let removed = svc.remove_entry(&id)?;

    if json {
        println!("{}", serde_json::json!({ "removed": removed.is_some(), "unique_id": id }));
    } else if let Some(entry) = removed {
        println!("Removed {} ({} kcal)", entry.snapshot.name, entry.macros.calories);
    } else {
        eprintln!("No entry '{id}' today");
    }
    Ok(())
}

pub(crate) fn cmd_entry_edit(
    svc: &mut PlateService,
    id: &str,
    portion: Option<&str>,
    refs: &[String],
    json: bool,
) -> Result<()> {
    if portion.is_none() && refs.is_empty() {
        bail!("Nothing to change. Give --portion and/or --ingredient");
    }
    let id = resolve_entry(svc, id)?;
    let portion = portion.map(|p| parse_portion_arg(Some(p))).transpose()?;
    let refs = refs
        .iter()
        .map(|r| parse_ref(r))
        .collect::<Result<Vec<_>>>()?;
    let refs = (!refs.is_empty()).then_some(refs.as_slice());

    let entry = svc.edit_entry(&id, portion, refs)?;
    if json {
        print_json(&entry)?;
    } else {
        println!(
            "Updated: {} x{} ({})",
            entry.snapshot.name,
            portion_label(entry.portion),
            format_macros(&entry.macros)
        );
    }
    Ok(())
}

pub(crate) fn cmd_clear(svc: &mut PlateService, json: bool) -> Result<()> {
    let removed = svc.clear_today()?;
    if json {
        println!("{}", serde_json::json!({ "removed": removed }));
    } else {
        println!("Cleared {removed} entr{}", if removed == 1 { "y" } else { "ies" });
    }
    Ok(())
}
