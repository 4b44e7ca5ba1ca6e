//! Today's logged meals and their running totals.

use chrono::Local;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::aggregate::IngredientLookup;
use crate::error::{EngineError, Result};
use crate::models::{IngredientRef, Macros, Meal, MealKind};
use crate::portion::{self, round1, round_calories};

/// One ingredient line of a composed meal, frozen at log time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotLine {
    pub ingredient_id: i64,
    pub name: String,
    pub unit: String,
    pub quantity: f64,
    /// Facts for one unit at log time.
    pub per_unit: Macros,
}

/// What a meal looked like when it was logged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MealSnapshot {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meal_id: Option<i64>,
    pub name: String,
    pub meal_type: String,
    /// Macros for one portion of the meal.
    pub baseline: Macros,
    /// Portion baked into the meal itself (mod meals); one otherwise.
    #[serde(default = "one")]
    pub meal_portion: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub lines: Vec<SnapshotLine>,
}

fn one() -> f64 {
    1.0
}

impl MealSnapshot {
    /// Freeze `meal` against the current ingredient facts. Missing
    /// ingredients are left out, matching how they aggregate.
    pub fn capture<L: IngredientLookup + ?Sized>(meal: &Meal, lookup: &L) -> Self {
        let (baseline, meal_portion, lines) = match &meal.kind {
            MealKind::Composed { ingredients } => {
                let lines = snapshot_lines(ingredients, lookup);
                (baseline_from_lines(&lines), 1.0, lines)
            }
            MealKind::Standalone { macros } => (*macros, 1.0, Vec::new()),
            MealKind::Mod {
                mod_data, portion, ..
            } => (mod_data.baseline, *portion, Vec::new()),
        };
        Self {
            meal_id: Some(meal.id),
            name: meal.name.clone(),
            meal_type: meal.kind.meal_type().to_string(),
            baseline,
            meal_portion,
            lines,
        }
    }

    /// An unsaved one-off, e.g. a quick-add.
    #[must_use]
    pub fn adhoc(name: &str, macros: Macros) -> Self {
        Self {
            meal_id: None,
            name: name.to_string(),
            meal_type: crate::models::MEAL_TYPE_STANDALONE.to_string(),
            baseline: macros,
            meal_portion: 1.0,
            lines: Vec::new(),
        }
    }

    #[must_use]
    pub fn scaled(&self, portion: f64) -> Macros {
        portion::scale(&self.baseline, self.meal_portion * portion)
    }
}

/// Snapshot lines for `refs`. Unknown ingredients are skipped.
pub fn snapshot_lines<L: IngredientLookup + ?Sized>(
    refs: &[IngredientRef],
    lookup: &L,
) -> Vec<SnapshotLine> {
    refs.iter()
        .filter_map(|r| {
            lookup.ingredient(r.ingredient_id).map(|ing| SnapshotLine {
                ingredient_id: ing.id,
                per_unit: ing.macros(),
                name: ing.name,
                unit: ing.unit,
                quantity: r.quantity,
            })
        })
        .collect()
}

#[allow(clippy::cast_precision_loss)]
fn baseline_from_lines(lines: &[SnapshotLine]) -> Macros {
    let mut sum = (0.0_f64, 0.0_f64, 0.0_f64, 0.0_f64);
    for l in lines {
        sum.0 += l.per_unit.calories as f64 * l.quantity;
        sum.1 += l.per_unit.protein * l.quantity;
        sum.2 += l.per_unit.carbs * l.quantity;
        sum.3 += l.per_unit.fat * l.quantity;
    }
    Macros {
        calories: round_calories(sum.0),
        protein: round1(sum.1),
        carbs: round1(sum.2),
        fat: round1(sum.3),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggedEntry {
    pub unique_id: String,
    pub snapshot: MealSnapshot,
    pub portion: f64,
    /// `snapshot` scaled by `portion`.
    pub macros: Macros,
    pub logged_at: String,
}

/// Replacement values for an entry. Unset fields keep their value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntryEdit {
    pub portion: Option<f64>,
    /// Only valid for composed snapshots.
    pub lines: Option<Vec<SnapshotLine>>,
}

/// Running sum kept in whole calories and tenths of a gram so that adding
/// and subtracting never drifts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Tally {
    calories: i64,
    protein: i64,
    carbs: i64,
    fat: i64,
}

fn tenths(grams: f64) -> i64 {
    (grams * 10.0).round() as i64
}

impl Tally {
    fn of(m: &Macros) -> Self {
        Self {
            calories: m.calories,
            protein: tenths(m.protein),
            carbs: tenths(m.carbs),
            fat: tenths(m.fat),
        }
    }

    fn add(&mut self, m: &Macros) {
        let t = Self::of(m);
        self.calories += t.calories;
        self.protein += t.protein;
        self.carbs += t.carbs;
        self.fat += t.fat;
    }

    fn sub(&mut self, m: &Macros) {
        let t = Self::of(m);
        self.calories -= t.calories;
        self.protein -= t.protein;
        self.carbs -= t.carbs;
        self.fat -= t.fat;
    }

    #[allow(clippy::cast_precision_loss)]
    fn macros(self) -> Macros {
        Macros {
            calories: self.calories,
            protein: self.protein as f64 / 10.0,
            carbs: self.carbs as f64 / 10.0,
            fat: self.fat as f64 / 10.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DailyLedger {
    date: String,
    entries: Vec<LoggedEntry>,
    tally: Tally,
}

impl DailyLedger {
    #[must_use]
    pub fn new(date: &str) -> Self {
        Self {
            date: date.to_string(),
            entries: Vec::new(),
            tally: Tally::default(),
        }
    }

    /// Rebuild a ledger from stored entries.
    #[must_use]
    pub fn from_entries(date: &str, entries: Vec<LoggedEntry>) -> Self {
        let mut tally = Tally::default();
        for e in &entries {
            tally.add(&e.macros);
        }
        Self {
            date: date.to_string(),
            entries,
            tally,
        }
    }

    #[must_use]
    pub fn date(&self) -> &str {
        &self.date
    }

    #[must_use]
    pub fn entries(&self) -> &[LoggedEntry] {
        &self.entries
    }

    #[must_use]
    pub fn get(&self, unique_id: &str) -> Option<&LoggedEntry> {
        self.entries.iter().find(|e| e.unique_id == unique_id)
    }

    #[must_use]
    pub fn totals(&self) -> Macros {
        self.tally.macros()
    }

    /// Totals summed from scratch.
    #[must_use]
    pub fn recomputed_totals(&self) -> Macros {
        let mut tally = Tally::default();
        for e in &self.entries {
            tally.add(&e.snapshot.scaled(e.portion));
        }
        tally.macros()
    }

    pub fn add(&mut self, snapshot: MealSnapshot, portion: f64) -> Result<LoggedEntry> {
        let portion = portion::validate_portion(portion)?;
        let macros = snapshot.scaled(portion);
        let entry = LoggedEntry {
            unique_id: Uuid::new_v4().to_string(),
            snapshot,
            portion,
            macros,
            logged_at: Local::now().to_rfc3339(),
        };
        self.tally.add(&entry.macros);
        self.entries.push(entry.clone());
        debug!(entry = %entry.unique_id, calories = macros.calories, "logged entry");
        Ok(entry)
    }

    /// Remove one entry. Unknown ids are ignored.
    pub fn remove(&mut self, unique_id: &str) -> Option<LoggedEntry> {
        let idx = self.entries.iter().position(|e| e.unique_id == unique_id)?;
        let entry = self.entries.remove(idx);
        self.tally.sub(&entry.macros);
        debug!(entry = %entry.unique_id, "removed entry");
        Some(entry)
    }

    /// Put back an earlier copy of an entry, e.g. after a failed write.
    /// Returns the version it replaced; unknown ids are ignored.
    pub fn restore(&mut self, entry: LoggedEntry) -> Option<LoggedEntry> {
        let slot = self
            .entries
            .iter_mut()
            .find(|e| e.unique_id == entry.unique_id)?;
        self.tally.sub(&slot.macros);
        self.tally.add(&entry.macros);
        Some(std::mem::replace(slot, entry))
    }

    pub fn remove_all(&mut self) -> usize {
        let n = self.entries.len();
        self.entries.clear();
        self.tally = Tally::default();
        n
    }

    /// Replace an entry's portion and/or ingredient lines, recomputing from
    /// the snapshot baseline.
    pub fn edit_entry(&mut self, unique_id: &str, edit: EntryEdit) -> Result<LoggedEntry> {
        let idx = self
            .entries
            .iter()
            .position(|e| e.unique_id == unique_id)
            .ok_or_else(|| EngineError::NotFound(format!("Entry {unique_id}")))?;

        let current = &self.entries[idx];
        let portion = match edit.portion {
            Some(p) => portion::validate_portion(p)?,
            None => current.portion,
        };
        let mut snapshot = current.snapshot.clone();
        if let Some(lines) = edit.lines {
            if snapshot.meal_type != crate::models::MEAL_TYPE_COMPOSED {
                return Err(EngineError::Validation(format!(
                    "Only composed entries have ingredients; '{}' is {}",
                    snapshot.name, snapshot.meal_type
                )));
            }
            if lines.is_empty() {
                return Err(EngineError::IncompleteMeal(format!(
                    "'{}' would have no ingredients",
                    snapshot.name
                )));
            }
            for l in &lines {
                portion::validate_positive("quantity", l.quantity)?;
            }
            snapshot.baseline = baseline_from_lines(&lines);
            snapshot.lines = lines;
        }

        let macros = snapshot.scaled(portion);
        let entry = &mut self.entries[idx];
        self.tally.sub(&entry.macros);
        entry.snapshot = snapshot;
        entry.portion = portion;
        entry.macros = macros;
        self.tally.add(&entry.macros);
        debug!(entry = %unique_id, portion, "edited entry");
        Ok(entry.clone())
    }
}

/// Build replacement lines for a composed entry: quantities for ingredients
/// already in the snapshot keep their logged facts, new ones are read from
/// `lookup`.
pub fn relines<L: IngredientLookup + ?Sized>(
    snapshot: &MealSnapshot,
    refs: &[IngredientRef],
    lookup: &L,
) -> Result<Vec<SnapshotLine>> {
    refs.iter()
        .map(|r| {
            if let Some(existing) = snapshot
                .lines
                .iter()
                .find(|l| l.ingredient_id == r.ingredient_id)
            {
                return Ok(SnapshotLine {
                    quantity: r.quantity,
                    ..existing.clone()
                });
            }
            snapshot_lines(std::slice::from_ref(r), lookup)
                .pop()
                .ok_or_else(|| EngineError::NotFound(format!("Ingredient {}", r.ingredient_id)))
        })
        .collect()
}
