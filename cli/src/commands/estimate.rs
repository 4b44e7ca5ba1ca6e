use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;

use plate_core::PlateService;
use plate_core::estimate::{Estimate, NutritionEstimator};
use plate_core::models::Meal;

use super::helpers::{format_macros, parse_portion_arg, print_json};
use crate::config::EstimatorConfig;
use crate::estimator::HttpEstimator;

#[derive(Serialize)]
struct EstimateOutput<'a> {
    estimate: &'a Estimate,
    usable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    meal: Option<&'a Meal>,
}

pub(crate) fn cmd_estimate(
    svc: &mut PlateService,
    rt: &tokio::runtime::Handle,
    config: &EstimatorConfig,
    text: &str,
    save: bool,
    portion: Option<&str>,
    json: bool,
) -> Result<()> {
    let provider = HttpEstimator::from_config(config)?;
    let estimator = NutritionEstimator::with_timeout(Arc::new(provider), config.timeout());
    let estimate = rt.block_on(estimator.estimate(text));

    let meal = if save {
        let portion = portion.map(|p| parse_portion_arg(Some(p))).transpose()?;
        Some(svc.create_ai_meal(text, &estimate, portion)?)
    } else {
        None
    };

    if json {
        return print_json(&EstimateOutput {
            estimate: &estimate,
            usable: estimate.is_usable(),
            meal: meal.as_ref(),
        });
    }

    println!(
        "{} per {}: {} (confidence {:.0}%)",
        estimate.name,
        estimate.unit,
        format_macros(&estimate.macros()),
        estimate.confidence * 100.0
    );
    if estimate.degraded {
        eprintln!("Warning: the estimator did not answer usefully; this is a placeholder");
    } else if !estimate.is_usable() {
        eprintln!("Warning: low confidence estimate, double-check before logging");
    }
    if let Some(meal) = meal {
        println!("Saved as meal #{}", meal.id);
    }
    Ok(())
}
