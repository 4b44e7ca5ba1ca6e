use anyhow::{Context, Result, bail};
use serde::Serialize;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use plate_core::error::{EngineError, ErrorReport};
use plate_core::ledger::LoggedEntry;
use plate_core::models::{Ingredient, IngredientRef, Macros, MealDetail};
use plate_core::portion::{self, portion_label};

/// Parse an ingredient reference like "3:1.5". The quantity defaults to 1.
pub(crate) fn parse_ref(s: &str) -> Result<IngredientRef> {
    let (id, qty) = match s.split_once(':') {
        Some((id, qty)) => (id, Some(qty)),
        None => (s, None),
    };
    let ingredient_id: i64 = id
        .trim()
        .parse()
        .with_context(|| format!("Invalid ingredient id in '{s}'. Use 'ID' or 'ID:QTY'"))?;
    let quantity = match qty {
        Some(q) => q
            .trim()
            .parse::<f64>()
            .with_context(|| format!("Invalid quantity in '{s}'"))?,
        None => 1.0,
    };
    portion::validate_positive("quantity", quantity)?;
    Ok(IngredientRef {
        ingredient_id,
        quantity,
    })
}

/// Parse a mod input like "weight=150".
pub(crate) fn parse_input(s: &str) -> Result<(String, String)> {
    let Some((key, value)) = s.split_once('=') else {
        bail!("Invalid input '{s}'. Use KEY=VALUE");
    };
    let key = key.trim();
    if key.is_empty() {
        bail!("Invalid input '{s}'. Key must not be empty");
    }
    Ok((key.to_string(), value.trim().to_string()))
}

pub(crate) fn parse_portion_arg(s: Option<&str>) -> Result<f64> {
    match s {
        Some(s) => {
            let p = portion::parse_portion(s)?;
            if !portion::is_recommended(p) {
                eprintln!(
                    "Note: portion {} is outside the usual range ({}-{})",
                    portion_label(p),
                    portion::RECOMMENDED_MIN,
                    portion::RECOMMENDED_MAX
                );
            }
            Ok(p)
        }
        None => Ok(1.0),
    }
}

pub(crate) fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub(crate) fn format_macros(m: &Macros) -> String {
    format!(
        "{} kcal  P {:.1}g  C {:.1}g  F {:.1}g",
        m.calories,
        no_neg_zero(m.protein),
        no_neg_zero(m.carbs),
        no_neg_zero(m.fat)
    )
}

pub(crate) fn print_ingredient_table(ingredients: &[Ingredient]) {
    #[derive(Tabled)]
    struct IngredientRow {
        #[tabled(rename = "ID")]
        id: i64,
        #[tabled(rename = "Name")]
        name: String,
        #[tabled(rename = "Unit")]
        unit: String,
        #[tabled(rename = "Cal")]
        calories: i64,
        #[tabled(rename = "P")]
        protein: String,
        #[tabled(rename = "C")]
        carbs: String,
        #[tabled(rename = "F")]
        fat: String,
        #[tabled(rename = "Source")]
        source: String,
    }

    let rows: Vec<IngredientRow> = ingredients
        .iter()
        .map(|i| IngredientRow {
            id: i.id,
            name: truncate(&i.name, 35),
            unit: truncate(&i.unit, 12),
            calories: i.calories,
            protein: format!("{:.1}", i.protein),
            carbs: format!("{:.1}", i.carbs),
            fat: format!("{:.1}", i.fat),
            source: if i.is_staple {
                format!("{} *", i.source)
            } else {
                i.source.clone()
            },
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(3..7)).with(Alignment::right()))
        .to_string();
    println!("{table}");
}

pub(crate) fn print_meal_table(meals: &[MealDetail]) {
    #[derive(Tabled)]
    struct MealRow {
        #[tabled(rename = "ID")]
        id: i64,
        #[tabled(rename = "Name")]
        name: String,
        #[tabled(rename = "Type")]
        meal_type: String,
        #[tabled(rename = "Cal")]
        calories: i64,
        #[tabled(rename = "P")]
        protein: String,
        #[tabled(rename = "C")]
        carbs: String,
        #[tabled(rename = "F")]
        fat: String,
    }

    let rows: Vec<MealRow> = meals
        .iter()
        .map(|d| MealRow {
            id: d.meal.id,
            name: truncate(&d.meal.name, 35),
            meal_type: d.meal.kind.meal_type().to_string(),
            calories: d.totals.calories,
            protein: format!("{:.1}", d.totals.protein),
            carbs: format!("{:.1}", d.totals.carbs),
            fat: format!("{:.1}", d.totals.fat),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(3..7)).with(Alignment::right()))
        .to_string();
    println!("{table}");
}

pub(crate) fn print_entry_table(entries: &[LoggedEntry]) {
    #[derive(Tabled)]
    struct EntryRow {
        #[tabled(rename = "Entry")]
        id: String,
        #[tabled(rename = "Time")]
        time: String,
        #[tabled(rename = "Meal")]
        name: String,
        #[tabled(rename = "Portion")]
        portion: String,
        #[tabled(rename = "Cal")]
        calories: i64,
        #[tabled(rename = "P")]
        protein: String,
        #[tabled(rename = "C")]
        carbs: String,
        #[tabled(rename = "F")]
        fat: String,
    }

    let rows: Vec<EntryRow> = entries
        .iter()
        .map(|e| EntryRow {
            id: e.unique_id.chars().take(8).collect(),
            time: logged_time(&e.logged_at),
            name: truncate(&e.snapshot.name, 30),
            portion: portion_label(e.portion),
            calories: e.macros.calories,
            protein: format!("{:.1}", e.macros.protein),
            carbs: format!("{:.1}", e.macros.carbs),
            fat: format!("{:.1}", e.macros.fat),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(3..8)).with(Alignment::right()))
        .to_string();
    println!("{table}");
}

/// Local wall-clock time of an RFC 3339 timestamp, or "" if it does not parse.
fn logged_time(stamp: &str) -> String {
    chrono::DateTime::parse_from_rfc3339(stamp)
        .map(|t| t.with_timezone(&chrono::Local).format("%H:%M").to_string())
        .unwrap_or_default()
}

/// Render any CLI error as JSON. Engine errors keep their kind and detail.
pub(crate) fn json_error(err: &anyhow::Error) -> String {
    let report = match err.downcast_ref::<EngineError>() {
        Some(engine) => engine.to_report(),
        None => ErrorReport {
            kind: "error",
            message: format!("{err:#}"),
            detail: None,
        },
    };
    serde_json::to_string(&report)
        .unwrap_or_else(|_| format!("{{\"kind\":\"error\",\"message\":\"{}\"}}", report.message))
}

pub(crate) fn no_neg_zero(v: f64) -> f64 {
    if v == 0.0 { 0.0 } else { v }
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let end = s.char_indices().nth(max - 3).map_or(s.len(), |(i, _)| i);
        format!("{}...", &s[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ref() {
        let r = parse_ref("3:1.5").unwrap();
        assert_eq!(r.ingredient_id, 3);
        assert!((r.quantity - 1.5).abs() < f64::EPSILON);

        let r = parse_ref(" 7 ").unwrap();
        assert_eq!(r.ingredient_id, 7);
        assert!((r.quantity - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_parse_ref_invalid() {
        assert!(parse_ref("oats").is_err());
        assert!(parse_ref("3:x").is_err());
        assert!(parse_ref("3:0").is_err());
        assert!(parse_ref("3:-1").is_err());
    }

    #[test]
    fn test_parse_input() {
        assert_eq!(
            parse_input("weight = 150").unwrap(),
            ("weight".to_string(), "150".to_string())
        );
        assert_eq!(
            parse_input("macros=500,40,50,20").unwrap().1,
            "500,40,50,20"
        );
        assert!(parse_input("weight").is_err());
        assert!(parse_input("=3").is_err());
    }

    #[test]
    fn test_parse_portion_arg() {
        assert!((parse_portion_arg(None).unwrap() - 1.0).abs() < f64::EPSILON);
        assert!((parse_portion_arg(Some("1/2")).unwrap() - 0.5).abs() < f64::EPSILON);
        assert!(parse_portion_arg(Some("0")).is_err());
    }

    #[test]
    fn test_json_error_keeps_engine_kind() {
        let err = anyhow::Error::new(EngineError::UnsupportedMod("teleport".to_string()));
        let json: serde_json::Value = serde_json::from_str(&json_error(&err)).unwrap();
        assert_eq!(json["kind"], "unsupported_mod");
        assert_eq!(json["detail"]["mod_id"], "teleport");

        let err = anyhow::anyhow!("disk on fire");
        let json: serde_json::Value = serde_json::from_str(&json_error(&err)).unwrap();
        assert_eq!(json["kind"], "error");
        assert_eq!(json["message"], "disk on fire");
    }

    #[test]
    fn test_format_macros() {
        assert_eq!(
            format_macros(&Macros::new(200, 20.0, 10.0, -0.0)),
            "200 kcal  P 20.0g  C 10.0g  F 0.0g"
        );
    }

    #[test]
    fn test_logged_time() {
        assert_eq!(logged_time("not a time"), "");
        assert_eq!(logged_time("2024-03-01T08:30:00+00:00").len(), 5);
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("hello", 10), "hello");
        assert_eq!(truncate("hello world this is long", 10), "hello w...");
    }

    #[test]
    fn test_truncate_utf8() {
        assert_eq!(truncate("Crème fraîche", 10), "Crème f...");
        assert_eq!(truncate("Müsli", 10), "Müsli");
    }

    #[test]
    fn test_no_neg_zero() {
        assert_eq!(no_neg_zero(-0.0).to_bits(), 0.0_f64.to_bits());
        assert_eq!(no_neg_zero(5.0), 5.0);
    }
}
