use serde::Deserialize;

use crate::models::NewIngredient;
use crate::portion::{round_calories, round1};

#[derive(Debug, Deserialize)]
pub struct ProductResponse {
    pub status: i32,
    pub product: Option<ProductData>,
}

#[derive(Debug, Deserialize)]
pub struct ProductData {
    pub product_name: Option<String>,
    pub brands: Option<String>,
    pub code: Option<String>,
    pub serving_size: Option<String>,
    pub nutriments: Option<Nutriments>,
}

#[derive(Debug, Default, Deserialize)]
#[allow(clippy::struct_field_names)]
pub struct Nutriments {
    #[serde(rename = "energy-kcal_100g")]
    pub energy_kcal_100g: Option<f64>,
    pub proteins_100g: Option<f64>,
    pub carbohydrates_100g: Option<f64>,
    pub fat_100g: Option<f64>,
    #[serde(rename = "energy-kcal_serving")]
    pub energy_kcal_serving: Option<f64>,
    pub proteins_serving: Option<f64>,
    pub carbohydrates_serving: Option<f64>,
    pub fat_serving: Option<f64>,
}

/// Map a product into an ingredient draft. Products that declare a serving
/// size and all four per-serving values use one serving as the unit;
/// everything else falls back to 100 g, unless per-serving energy is all
/// there is.
#[must_use]
pub fn product_to_ingredient(p: ProductData) -> Option<NewIngredient> {
    let name = p.product_name.filter(|n| !n.trim().is_empty())?;
    let n = p.nutriments?;
    let serving = p
        .serving_size
        .filter(|s| !s.trim().is_empty() && n.energy_kcal_serving.is_some());
    let serving_complete = n.proteins_serving.is_some()
        && n.carbohydrates_serving.is_some()
        && n.fat_serving.is_some();

    let (unit, calories, protein, carbs, fat) = match serving {
        Some(size) if serving_complete || n.energy_kcal_100g.is_none() => (
            size.trim().to_string(),
            n.energy_kcal_serving?,
            n.proteins_serving,
            n.carbohydrates_serving,
            n.fat_serving,
        ),
        _ => (
            "100g".to_string(),
            n.energy_kcal_100g?,
            n.proteins_100g,
            n.carbohydrates_100g,
            n.fat_100g,
        ),
    };
    if !calories.is_finite() || calories < 0.0 {
        return None;
    }
    let grams = |v: Option<f64>| v.filter(|g| g.is_finite() && *g >= 0.0).map_or(0.0, round1);

    let name = match p.brands.as_deref().map(str::trim) {
        Some(brand) if !brand.is_empty() => format!("{} ({brand})", name.trim()),
        _ => name.trim().to_string(),
    };

    Some(NewIngredient {
        name,
        calories: round_calories(calories),
        protein: grams(protein),
        carbs: grams(carbs),
        fat: grams(fat),
        unit,
        is_staple: false,
        barcode: p.code.filter(|c| !c.is_empty()),
        source: "openfoodfacts".to_string(),
    })
}
