//! Portion scaling.
//!
//! Every scaled value is derived from a per-one-portion baseline. Callers keep
//! the baseline next to the portion and never feed a scaled result back in.

use crate::error::{EngineError, Result};
use crate::models::Macros;

pub const RECOMMENDED_MIN: f64 = 0.1;
pub const RECOMMENDED_MAX: f64 = 2.0;

/// Display presets. The stored portion is always the float value.
pub const PRESETS: &[(&str, f64)] = &[
    ("1", 1.0),
    ("½", 1.0 / 2.0),
    ("⅓", 1.0 / 3.0),
    ("¼", 1.0 / 4.0),
    ("¾", 3.0 / 4.0),
    ("⅔", 2.0 / 3.0),
];

#[must_use]
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[must_use]
pub fn round_calories(value: f64) -> i64 {
    value.round() as i64
}

/// Scale baseline macros by `portion`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn scale(baseline: &Macros, portion: f64) -> Macros {
    Macros {
        calories: round_calories(baseline.calories as f64 * portion),
        protein: round1(baseline.protein * portion),
        carbs: round1(baseline.carbs * portion),
        fat: round1(baseline.fat * portion),
    }
}

/// Reject portions and quantities that would poison a calculation.
pub fn validate_positive(field: &str, value: f64) -> Result<f64> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(EngineError::invalid_quantity(field, value))
    }
}

pub fn validate_portion(portion: f64) -> Result<f64> {
    validate_positive("portion", portion)
}

#[must_use]
pub fn is_recommended(portion: f64) -> bool {
    (RECOMMENDED_MIN..=RECOMMENDED_MAX).contains(&portion)
}

/// Parse a portion from a number, a fraction ("1/2") or a preset label.
pub fn parse_portion(s: &str) -> Result<f64> {
    let s = s.trim();
    let value = match s.to_lowercase().as_str() {
        "half" => 0.5,
        "third" => 1.0 / 3.0,
        "quarter" => 0.25,
        "full" | "whole" => 1.0,
        other => {
            if let Some((_, v)) = PRESETS.iter().find(|(label, _)| *label == other) {
                *v
            } else if let Some((num, den)) = other.split_once('/') {
                let num: f64 = num
                    .trim()
                    .parse()
                    .map_err(|_| EngineError::Validation(format!("Invalid portion '{s}'")))?;
                let den: f64 = den
                    .trim()
                    .parse()
                    .map_err(|_| EngineError::Validation(format!("Invalid portion '{s}'")))?;
                num / den
            } else {
                other
                    .parse()
                    .map_err(|_| EngineError::Validation(format!("Invalid portion '{s}'")))?
            }
        }
    };
    validate_portion(value)
}

/// Label for a portion, using a preset glyph when one matches.
#[must_use]
pub fn portion_label(portion: f64) -> String {
    PRESETS
        .iter()
        .find(|(_, v)| (v - portion).abs() < 1e-9)
        .map_or_else(|| format!("{portion}"), |(label, _)| (*label).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meal() -> Macros {
        Macros::new(100, 10.0, 5.0, 2.0)
    }

    #[test]
    fn test_scale_half() {
        assert_eq!(scale(&meal(), 0.5), Macros::new(50, 5.0, 2.5, 1.0));
    }

    #[test]
    fn test_scale_rounds_per_field() {
        let m = Macros::new(95, 0.5, 25.1, 0.3);
        let third = scale(&m, 1.0 / 3.0);
        assert_eq!(third.calories, 32);
        assert!((third.protein - 0.2).abs() < 1e-9);
        assert!((third.carbs - 8.4).abs() < 1e-9);
        assert!((third.fat - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_scale_from_baseline_does_not_compound() {
        let portions = [0.1, 0.25, 1.0 / 3.0, 0.5, 2.0 / 3.0, 0.75, 1.0, 1.3, 2.0];
        let bases = [
            Macros::new(95, 0.5, 25.1, 0.3),
            Macros::new(733, 41.7, 88.9, 19.3),
            Macros::new(1, 0.1, 0.1, 0.1),
        ];
        for base in &bases {
            for &p2 in &portions {
                assert_eq!(scale(&scale(base, 1.0), p2), scale(base, p2));
            }
        }
    }

    #[test]
    fn test_scaling_scaled_values_drifts() {
        // Going 1 -> 1/3 -> 1 through the displayed value loses precision,
        // which is why every rescale starts from the baseline.
        let base = Macros::new(100, 10.0, 10.0, 10.0);
        let third = scale(&base, 1.0 / 3.0);
        let back = scale(&third, 3.0);
        assert_ne!(back, base);
        assert_eq!(scale(&base, 1.0), base);
    }

    #[test]
    fn test_validate_portion() {
        assert!(validate_portion(0.5).is_ok());
        assert!(validate_portion(5.0).is_ok());
        assert!(validate_portion(0.0).is_err());
        assert!(validate_portion(-1.0).is_err());
        assert!(validate_portion(f64::NAN).is_err());
        assert!(validate_portion(f64::INFINITY).is_err());
    }

    #[test]
    fn test_parse_portion() {
        assert!((parse_portion("1/2").unwrap() - 0.5).abs() < 1e-9);
        assert!((parse_portion("½").unwrap() - 0.5).abs() < 1e-9);
        assert!((parse_portion("⅔").unwrap() - 2.0 / 3.0).abs() < 1e-9);
        assert!((parse_portion("half").unwrap() - 0.5).abs() < 1e-9);
        assert!((parse_portion("1.25").unwrap() - 1.25).abs() < 1e-9);
        assert!(parse_portion("0").is_err());
        assert!(parse_portion("1/0").is_err());
        assert!(parse_portion("lots").is_err());
    }

    #[test]
    fn test_portion_label() {
        assert_eq!(portion_label(0.5), "½");
        assert_eq!(portion_label(1.0), "1");
        assert_eq!(portion_label(1.5), "1.5");
        assert!(is_recommended(0.5));
        assert!(!is_recommended(3.0));
    }
}
