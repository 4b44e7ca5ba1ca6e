use serde::Serialize;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

/// Why an ingredient could not be deleted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConflictDetail {
    pub ingredient_id: i64,
    pub ingredient_name: String,
    pub meals: Vec<String>,
    pub suggestions: Vec<String>,
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Ingredient '{}' is used by {} meal(s): {}", .0.ingredient_name, .0.meals.len(), .0.meals.join(", "))]
    Conflict(Box<ConflictDetail>),

    #[error("Incomplete meal: {0}")]
    IncompleteMeal(String),

    #[error("Invalid quantity for {field}: {value}")]
    InvalidQuantity { field: String, value: f64 },

    #[error("Unsupported mod '{0}'")]
    UnsupportedMod(String),

    #[error("Nutrition estimation failed: {0}")]
    UpstreamEstimation(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl EngineError {
    pub fn invalid_quantity(field: impl Into<String>, value: f64) -> Self {
        Self::InvalidQuantity {
            field: field.into(),
            value,
        }
    }

    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Conflict(_) => "conflict",
            Self::IncompleteMeal(_) => "incomplete_meal",
            Self::InvalidQuantity { .. } => "invalid_quantity",
            Self::UnsupportedMod(_) => "unsupported_mod",
            Self::UpstreamEstimation(_) => "upstream_estimation",
            Self::NotFound(_) => "not_found",
            Self::Validation(_) => "validation",
            Self::Storage(_) => "storage",
        }
    }

    /// Storage failures are the only errors a caller cannot act on.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Storage(_))
    }

    #[must_use]
    pub fn to_report(&self) -> ErrorReport {
        let detail = match self {
            Self::Conflict(detail) => serde_json::to_value(detail.as_ref()).ok(),
            Self::InvalidQuantity { field, value } => {
                // NaN and infinities have no JSON number form
                let value = if value.is_finite() {
                    serde_json::json!(value)
                } else {
                    serde_json::json!(value.to_string())
                };
                Some(serde_json::json!({ "field": field, "value": value }))
            }
            Self::UnsupportedMod(id) => Some(serde_json::json!({ "mod_id": id })),
            _ => None,
        };
        let message = match self {
            Self::Storage(err) => format!("{err:#}"),
            other => other.to_string(),
        };
        ErrorReport {
            kind: self.kind(),
            message,
            detail,
        }
    }
}

/// Renderable form of an [`EngineError`].
#[derive(Debug, Clone, Serialize)]
pub struct ErrorReport {
    pub kind: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_report_lists_meals_and_suggestions() {
        let err = EngineError::Conflict(Box::new(ConflictDetail {
            ingredient_id: 3,
            ingredient_name: "Oats".to_string(),
            meals: vec!["Porridge".to_string(), "Granola".to_string()],
            suggestions: vec!["Remove Oats from Porridge first".to_string()],
        }));
        assert_eq!(
            err.to_string(),
            "Ingredient 'Oats' is used by 2 meal(s): Porridge, Granola"
        );

        let report = err.to_report();
        assert_eq!(report.kind, "conflict");
        let detail = report.detail.unwrap();
        assert_eq!(detail["meals"][1], "Granola");
        assert_eq!(detail["suggestions"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_invalid_quantity_report_handles_nan() {
        let report = EngineError::invalid_quantity("portion", f64::NAN).to_report();
        assert_eq!(report.kind, "invalid_quantity");
        assert_eq!(report.detail.unwrap()["value"], "NaN");
    }

    #[test]
    fn test_storage_is_not_recoverable() {
        let err = EngineError::from(anyhow::anyhow!("disk full"));
        assert!(!err.is_recoverable());
        assert!(EngineError::UnsupportedMod("x".into()).is_recoverable());
    }
}
