//! Free-text nutrition estimation.
//!
//! The provider is an outside service whose replies are loosely shaped. The
//! estimator bounds the call with one timeout and always hands back an
//! [`Estimate`]: parsed when possible, a low-confidence placeholder otherwise.

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::{EngineError, Result};
use crate::models::Macros;
use crate::portion::{round_calories, round1};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(8);
pub const FALLBACK_CONFIDENCE: f64 = 0.1;
/// Estimates below this confidence should be reviewed before use.
pub const USABLE_CONFIDENCE: f64 = 0.5;
pub const FALLBACK_NAME: &str = "Unrecognized food";
const DEFAULT_UNIT: &str = "serving";

/// Keys under which providers nest the actual payload.
const WRAPPER_KEYS: &[&str] = &["result", "content", "response", "text"];

/// Where an embedded JSON object or array may begin.
static JSON_START: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"[\{\[]").ok());

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Estimate {
    pub name: String,
    pub calories: i64,
    pub protein: f64,
    pub carbs: f64,
    pub fat: f64,
    pub unit: String,
    pub confidence: f64,
    /// Set when the value is the placeholder rather than a parsed reply.
    #[serde(default)]
    pub degraded: bool,
}

impl Estimate {
    #[must_use]
    pub fn macros(&self) -> Macros {
        Macros::new(self.calories, self.protein, self.carbs, self.fat)
    }

    #[must_use]
    pub fn is_usable(&self) -> bool {
        !self.degraded && self.confidence >= USABLE_CONFIDENCE
    }
}

#[must_use]
pub fn fallback_estimate() -> Estimate {
    Estimate {
        name: FALLBACK_NAME.to_string(),
        calories: 0,
        protein: 0.0,
        carbs: 0.0,
        fat: 0.0,
        unit: DEFAULT_UNIT.to_string(),
        confidence: FALLBACK_CONFIDENCE,
        degraded: true,
    }
}

/// Pull an estimate out of a raw provider reply.
///
/// Tries the whole reply as JSON first, then each embedded `{...}` or
/// `[...]` value in order (which covers markdown fences and chatty
/// preambles). Only one value is read from each start, so trailing text
/// with braces of its own does not spoil an earlier match.
#[must_use]
pub fn extract_estimate(raw: &str) -> Option<Estimate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(value) = serde_json::from_str::<Value>(raw) {
        return from_value(&value);
    }
    JSON_START
        .as_ref()?
        .find_iter(raw)
        .find_map(|m| first_value(&raw[m.start()..]).as_ref().and_then(from_value))
}

/// The single JSON value at the start of `text`, ignoring whatever follows.
fn first_value(text: &str) -> Option<Value> {
    serde_json::Deserializer::from_str(text)
        .into_iter::<Value>()
        .next()?
        .ok()
}

fn from_value(value: &Value) -> Option<Estimate> {
    match value {
        Value::Array(items) => items.iter().find_map(from_value),
        Value::Object(map) => {
            if map.contains_key("calories") {
                return from_object(map);
            }
            WRAPPER_KEYS
                .iter()
                .filter_map(|k| map.get(*k))
                .find_map(from_value)
        }
        Value::String(s) => extract_estimate(s),
        _ => None,
    }
}

fn field(map: &Map<String, Value>, key: &str) -> Option<f64> {
    let n = match map.get(key)? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().trim_end_matches('g').trim().parse().ok()?,
        _ => return None,
    };
    (n.is_finite() && n >= 0.0).then_some(n)
}

fn from_object(map: &Map<String, Value>) -> Option<Estimate> {
    let calories = field(map, "calories")?;
    let name = map
        .get("name")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(FALLBACK_NAME);
    let unit = map
        .get("unit")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_UNIT);
    Some(Estimate {
        name: name.to_string(),
        calories: round_calories(calories),
        protein: round1(field(map, "protein").unwrap_or_default()),
        carbs: round1(field(map, "carbs").unwrap_or_default()),
        fat: round1(field(map, "fat").unwrap_or_default()),
        unit: unit.to_string(),
        confidence: field(map, "confidence").map_or(USABLE_CONFIDENCE, |c| c.clamp(0.0, 1.0)),
        degraded: false,
    })
}

/// A text-to-nutrition service.
///
/// Implementations return the reply body as-is; parsing belongs to
/// [`NutritionEstimator`].
#[async_trait]
pub trait EstimationProvider: Send + Sync {
    async fn estimate(&self, text: &str) -> Result<String>;
}

pub struct NutritionEstimator {
    provider: Arc<dyn EstimationProvider>,
    timeout: Duration,
}

impl NutritionEstimator {
    pub fn new(provider: Arc<dyn EstimationProvider>) -> Self {
        Self::with_timeout(provider, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(provider: Arc<dyn EstimationProvider>, timeout: Duration) -> Self {
        Self { provider, timeout }
    }

    /// Estimate nutrition for `text`. Never fails.
    pub async fn estimate(&self, text: &str) -> Estimate {
        match self.try_estimate(text).await {
            Ok(est) => {
                debug!(name = %est.name, confidence = est.confidence, "estimate parsed");
                est
            }
            Err(err) => {
                warn!(error = %err, "using fallback estimate");
                fallback_estimate()
            }
        }
    }

    async fn try_estimate(&self, text: &str) -> Result<Estimate> {
        let text = text.trim();
        if text.is_empty() {
            return Err(EngineError::UpstreamEstimation("empty description".to_string()));
        }
        let raw = tokio::time::timeout(self.timeout, self.provider.estimate(text))
            .await
            .map_err(|_| {
                EngineError::UpstreamEstimation(format!(
                    "timed out after {}ms",
                    self.timeout.as_millis()
                ))
            })?
            .map_err(|e| match e {
                EngineError::UpstreamEstimation(_) => e,
                other => EngineError::UpstreamEstimation(other.to_string()),
            })?;
        extract_estimate(&raw)
            .ok_or_else(|| EngineError::UpstreamEstimation("unparseable reply".to_string()))
    }
}
