use anyhow::Result;
use tabled::{Table, Tabled, settings::Style};

use plate_core::PlateService;
use plate_core::mods::{InputKind, InputSpec, ModInputs};

use super::helpers::{format_macros, parse_input, parse_portion_arg, print_json, truncate};

fn describe_input(spec: &InputSpec) -> String {
    let hint = match &spec.kind {
        InputKind::Text => String::new(),
        InputKind::Number { min, max } => match (min, max) {
            (Some(lo), Some(hi)) => format!(" {lo}..{hi}"),
            (Some(lo), None) => format!(" >={lo}"),
            (None, Some(hi)) => format!(" <={hi}"),
            (None, None) => String::new(),
        },
        InputKind::Select { options } | InputKind::Radio { options } => {
            format!(" {}", options.join("|"))
        }
        InputKind::GridMacros => " cal,p,c,f".to_string(),
    };
    let marker = if spec.required { "*" } else { "" };
    format!("{}{marker}{hint}", spec.key)
}

pub(crate) fn cmd_mod_list(svc: &PlateService, json: bool) -> Result<()> {
    let mods = svc.mods();
    if json {
        return print_json(&mods);
    }

    #[derive(Tabled)]
    struct ModRow {
        #[tabled(rename = "ID")]
        id: &'static str,
        #[tabled(rename = "Name")]
        name: &'static str,
        #[tabled(rename = "On")]
        enabled: &'static str,
        #[tabled(rename = "Inputs")]
        inputs: String,
        #[tabled(rename = "Description")]
        description: String,
    }

    let rows: Vec<ModRow> = mods
        .iter()
        .map(|m| ModRow {
            id: m.id,
            name: m.name,
            enabled: if m.enabled { "yes" } else { "no" },
            inputs: m
                .inputs
                .iter()
                .map(describe_input)
                .collect::<Vec<_>>()
                .join("\n"),
            description: truncate(m.description, 40),
        })
        .collect();
    println!("{}", Table::new(&rows).with(Style::rounded()));
    Ok(())
}

pub(crate) fn cmd_mod_toggle(
    svc: &mut PlateService,
    id: &str,
    enabled: bool,
    json: bool,
) -> Result<()> {
    svc.set_mod_enabled(id, enabled)?;
    if json {
        println!("{}", serde_json::json!({ "mod_id": id, "enabled": enabled }));
    } else {
        println!("{} {id}", if enabled { "Enabled" } else { "Disabled" });
    }
    Ok(())
}

pub(crate) fn cmd_mod_run(
    svc: &mut PlateService,
    id: &str,
    inputs: &[String],
    portion: Option<&str>,
    json: bool,
) -> Result<()> {
    let pairs = inputs
        .iter()
        .map(|s| parse_input(s))
        .collect::<Result<Vec<_>>>()?;
    let schema = svc
        .registry()
        .get(id)
        .map(|d| d.input_schema())
        .unwrap_or_default();
    let mut inputs = ModInputs::from_pairs(&schema, &pairs);
    if portion.is_some() {
        inputs.insert("portion", parse_portion_arg(portion)?);
    }

    let Some(meal) = svc.run_mod(id, &inputs)? else {
        if json {
            println!("{}", serde_json::json!({ "mod_id": id, "meal": null }));
        } else {
            eprintln!("No mod named '{id}'. Nothing was created.");
        }
        return Ok(());
    };

    let detail = svc.meal_detail(meal.id)?;
    if json {
        print_json(&detail)?;
    } else {
        println!("Created #{} {}: {}", meal.id, meal.name, format_macros(&detail.totals));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_input() {
        let spec = InputSpec::new(
            "weight",
            "Weight",
            InputKind::Number {
                min: Some(0.0),
                max: Some(10000.0),
            },
        )
        .required();
        assert_eq!(describe_input(&spec), "weight* 0..10000");

        let spec = InputSpec::new("unit", "Unit", InputKind::Radio { options: &["g", "oz"] });
        assert_eq!(describe_input(&spec), "unit g|oz");
    }

    #[test]
    fn test_run_weight_mod_from_pairs() {
        let mut svc = PlateService::new_in_memory().unwrap();
        cmd_mod_run(
            &mut svc,
            "weight-scaled",
            &["food=oats".to_string(), "weight=50".to_string()],
            Some("1/2"),
            true,
        )
        .unwrap();
        let meals = svc.list_meals().unwrap();
        assert_eq!(meals.len(), 1);
        assert_eq!(meals[0].totals.calories, 98);
    }

    #[test]
    fn test_run_unknown_mod_is_a_no_op() {
        let mut svc = PlateService::new_in_memory().unwrap();
        cmd_mod_run(&mut svc, "teleport", &[], None, true).unwrap();
        assert!(svc.list_meals().unwrap().is_empty());
    }
}
