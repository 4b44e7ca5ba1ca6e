use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use anyhow::{Context, Result, bail};
use chrono::Local;
use rusqlite::{Connection, OptionalExtension, Transaction, params};
use uuid::Uuid;

use crate::ledger::{LoggedEntry, MealSnapshot};
use crate::models::{
    DailyGoal, Ingredient, IngredientRef, MEAL_TYPE_COMPOSED, MEAL_TYPE_MOD, MEAL_TYPE_STANDALONE,
    Macros, Meal, MealKind, ModData, NewIngredient, NewMeal,
};
use crate::mods::ModConfigStore;

const GOAL_KEY: &str = "daily_goal";
const MOD_CONFIG_KEY: &str = "mod_config";

const INGREDIENT_COLUMNS: &str = "id, uuid, name, calories, protein, carbs, fat, unit, is_staple, barcode, source, created_at, updated_at";
const MEAL_COLUMNS: &str = "id, uuid, name, meal_type, calories, protein, carbs, fat, mod_id, mod_data, portion, notes, instructions, created_at, updated_at";

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<()> {
        self.conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        let version: i64 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?;

        if version < 1 {
            self.conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS ingredients (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    uuid TEXT NOT NULL UNIQUE,
                    name TEXT NOT NULL,
                    calories INTEGER NOT NULL,
                    protein REAL NOT NULL DEFAULT 0,
                    carbs REAL NOT NULL DEFAULT 0,
                    fat REAL NOT NULL DEFAULT 0,
                    unit TEXT NOT NULL,
                    is_staple INTEGER NOT NULL DEFAULT 0,
                    barcode TEXT,
                    source TEXT NOT NULL DEFAULT 'manual',
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_ingredients_barcode ON ingredients(barcode);

                CREATE TABLE IF NOT EXISTS meals (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    uuid TEXT NOT NULL UNIQUE,
                    name TEXT NOT NULL,
                    meal_type TEXT NOT NULL,
                    calories INTEGER,
                    protein REAL,
                    carbs REAL,
                    fat REAL,
                    mod_id TEXT,
                    mod_data TEXT,
                    portion REAL,
                    notes TEXT,
                    instructions TEXT,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS meal_ingredients (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    meal_id INTEGER NOT NULL REFERENCES meals(id) ON DELETE CASCADE,
                    ingredient_id INTEGER NOT NULL,
                    quantity REAL NOT NULL,
                    position INTEGER NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_meal_ingredients_meal ON meal_ingredients(meal_id);
                CREATE INDEX IF NOT EXISTS idx_meal_ingredients_ingredient ON meal_ingredients(ingredient_id);

                CREATE TABLE IF NOT EXISTS logged_entries (
                    unique_id TEXT PRIMARY KEY NOT NULL,
                    date TEXT NOT NULL,
                    snapshot TEXT NOT NULL,
                    portion REAL NOT NULL,
                    calories INTEGER NOT NULL,
                    protein REAL NOT NULL,
                    carbs REAL NOT NULL,
                    fat REAL NOT NULL,
                    logged_at TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_logged_entries_date ON logged_entries(date);

                CREATE TABLE IF NOT EXISTS user_settings (
                    key TEXT PRIMARY KEY NOT NULL,
                    value TEXT NOT NULL,
                    updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
                );

                PRAGMA user_version = 1;",
            )?;
        }

        Ok(())
    }

    // --- Row mapping helpers ---

    fn ingredient_from_row(row: &rusqlite::Row) -> rusqlite::Result<Ingredient> {
        Ok(Ingredient {
            id: row.get(0)?,
            uuid: row.get(1)?,
            name: row.get(2)?,
            calories: row.get(3)?,
            protein: row.get(4)?,
            carbs: row.get(5)?,
            fat: row.get(6)?,
            unit: row.get(7)?,
            is_staple: row.get(8)?,
            barcode: row.get(9)?,
            source: row.get(10)?,
            created_at: row.get(11)?,
            updated_at: row.get(12)?,
        })
    }

    // Expects MEAL_COLUMNS. Composed meals come back with an empty ingredient
    // list; callers fill it from meal_ingredients.
    fn meal_from_row(row: &rusqlite::Row) -> rusqlite::Result<Meal> {
        let id: i64 = row.get(0)?;
        let meal_type: String = row.get(3)?;
        let kind = match meal_type.as_str() {
            MEAL_TYPE_COMPOSED => MealKind::Composed {
                ingredients: Vec::new(),
            },
            MEAL_TYPE_STANDALONE => MealKind::Standalone {
                macros: Macros {
                    calories: row.get::<_, Option<i64>>(4)?.unwrap_or_default(),
                    protein: row.get::<_, Option<f64>>(5)?.unwrap_or_default(),
                    carbs: row.get::<_, Option<f64>>(6)?.unwrap_or_default(),
                    fat: row.get::<_, Option<f64>>(7)?.unwrap_or_default(),
                },
            },
            MEAL_TYPE_MOD => {
                let raw: String = row.get::<_, Option<String>>(9)?.unwrap_or_default();
                let mod_data: ModData = serde_json::from_str(&raw).map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(
                        9,
                        rusqlite::types::Type::Text,
                        Box::new(e),
                    )
                })?;
                MealKind::Mod {
                    mod_id: row.get::<_, Option<String>>(8)?.unwrap_or_default(),
                    mod_data,
                    portion: row.get::<_, Option<f64>>(10)?.unwrap_or(1.0),
                }
            }
            other => panic!("meal {id} has unknown meal_type '{other}'"),
        };
        Ok(Meal {
            id,
            uuid: row.get(1)?,
            name: row.get(2)?,
            kind,
            notes: row.get(11)?,
            instructions: row.get(12)?,
            created_at: row.get(13)?,
            updated_at: row.get(14)?,
        })
    }

    // 0: unique_id, 1: snapshot, 2: portion, 3..=6: macros, 7: logged_at
    fn logged_entry_from_row(row: &rusqlite::Row) -> rusqlite::Result<LoggedEntry> {
        let raw: String = row.get(1)?;
        let snapshot: MealSnapshot = serde_json::from_str(&raw).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e))
        })?;
        Ok(LoggedEntry {
            unique_id: row.get(0)?,
            snapshot,
            portion: row.get(2)?,
            macros: Macros {
                calories: row.get(3)?,
                protein: row.get(4)?,
                carbs: row.get(5)?,
                fat: row.get(6)?,
            },
            logged_at: row.get(7)?,
        })
    }

    // --- Ingredients ---

    pub fn insert_ingredient(&self, ingredient: &NewIngredient) -> Result<Ingredient> {
        let now = Local::now().to_rfc3339();
        let uuid = Uuid::new_v4().to_string();
        self.conn.execute(
            "INSERT INTO ingredients (uuid, name, calories, protein, carbs, fat, unit, is_staple, barcode, source, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                uuid,
                ingredient.name.trim(),
                ingredient.calories,
                ingredient.protein,
                ingredient.carbs,
                ingredient.fat,
                ingredient.unit.trim(),
                ingredient.is_staple,
                ingredient.barcode,
                ingredient.source,
                now,
                now,
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        self.get_ingredient(id)?
            .context("Ingredient vanished after insert")
    }

    pub fn get_ingredient(&self, id: i64) -> Result<Option<Ingredient>> {
        let ingredient = self
            .conn
            .query_row(
                &format!("SELECT {INGREDIENT_COLUMNS} FROM ingredients WHERE id = ?1"),
                params![id],
                Self::ingredient_from_row,
            )
            .optional()?;
        Ok(ingredient)
    }

    pub fn get_ingredient_by_barcode(&self, barcode: &str) -> Result<Option<Ingredient>> {
        let ingredient = self
            .conn
            .query_row(
                &format!(
                    "SELECT {INGREDIENT_COLUMNS} FROM ingredients WHERE barcode = ?1 ORDER BY id LIMIT 1"
                ),
                params![barcode],
                Self::ingredient_from_row,
            )
            .optional()?;
        Ok(ingredient)
    }

    /// Case-insensitive exact name match.
    pub fn find_ingredient_by_name(&self, name: &str) -> Result<Option<Ingredient>> {
        let ingredient = self
            .conn
            .query_row(
                &format!(
                    "SELECT {INGREDIENT_COLUMNS} FROM ingredients WHERE LOWER(name) = LOWER(?1) ORDER BY id LIMIT 1"
                ),
                params![name.trim()],
                Self::ingredient_from_row,
            )
            .optional()?;
        Ok(ingredient)
    }

    pub fn list_ingredients(&self, search: Option<&str>) -> Result<Vec<Ingredient>> {
        let ingredients = if let Some(query) = search {
            let escaped = query
                .replace('\\', "\\\\")
                .replace('%', "\\%")
                .replace('_', "\\_");
            let pattern = format!("%{escaped}%");
            let mut stmt = self.conn.prepare(&format!(
                "SELECT {INGREDIENT_COLUMNS} FROM ingredients WHERE name LIKE ?1 ESCAPE '\\' ORDER BY name"
            ))?;
            stmt.query_map(params![pattern], Self::ingredient_from_row)?
                .collect::<Result<Vec<_>, _>>()?
        } else {
            let mut stmt = self.conn.prepare(&format!(
                "SELECT {INGREDIENT_COLUMNS} FROM ingredients ORDER BY name"
            ))?;
            stmt.query_map([], Self::ingredient_from_row)?
                .collect::<Result<Vec<_>, _>>()?
        };
        Ok(ingredients)
    }

    /// Ingredients keyed by id, for the given ids only.
    pub fn ingredients_by_ids(&self, ids: &[i64]) -> Result<HashMap<i64, Ingredient>> {
        let mut found = HashMap::with_capacity(ids.len());
        for &id in ids {
            if found.contains_key(&id) {
                continue;
            }
            if let Some(ingredient) = self.get_ingredient(id)? {
                found.insert(id, ingredient);
            }
        }
        Ok(found)
    }

    /// Update an ingredient and touch every meal that uses it, in one
    /// transaction. Returns the ids of the touched meals.
    pub fn update_ingredient(
        &mut self,
        id: i64,
        ingredient: &NewIngredient,
    ) -> Result<(Ingredient, Vec<i64>)> {
        let now = Local::now().to_rfc3339();
        let tx = self.conn.transaction()?;
        let rows = tx.execute(
            "UPDATE ingredients SET name = ?1, calories = ?2, protein = ?3, carbs = ?4, fat = ?5,
             unit = ?6, is_staple = ?7, barcode = ?8, source = ?9, updated_at = ?10 WHERE id = ?11",
            params![
                ingredient.name.trim(),
                ingredient.calories,
                ingredient.protein,
                ingredient.carbs,
                ingredient.fat,
                ingredient.unit.trim(),
                ingredient.is_staple,
                ingredient.barcode,
                ingredient.source,
                now,
                id,
            ],
        )?;
        if rows == 0 {
            bail!("Ingredient {id} not found");
        }
        let dependents = Self::meal_ids_using_tx(&tx, id)?;
        for meal_id in &dependents {
            tx.execute(
                "UPDATE meals SET updated_at = ?1 WHERE id = ?2",
                params![now, meal_id],
            )?;
        }
        tx.commit()?;
        let updated = self
            .get_ingredient(id)?
            .context("Ingredient vanished after update")?;
        Ok((updated, dependents))
    }

    pub fn delete_ingredient(&self, id: i64) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM ingredients WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    fn meal_ids_using_tx(tx: &Transaction, ingredient_id: i64) -> Result<Vec<i64>> {
        let mut stmt = tx.prepare(
            "SELECT DISTINCT meal_id FROM meal_ingredients WHERE ingredient_id = ?1 ORDER BY meal_id",
        )?;
        let ids = stmt
            .query_map(params![ingredient_id], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    /// `(id, name)` of every meal whose ingredient list contains `ingredient_id`.
    pub fn meals_using_ingredient(&self, ingredient_id: i64) -> Result<Vec<(i64, String)>> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT m.id, m.name FROM meals m
             JOIN meal_ingredients mi ON mi.meal_id = m.id
             WHERE mi.ingredient_id = ?1
             ORDER BY m.name",
        )?;
        let meals = stmt
            .query_map(params![ingredient_id], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(meals)
    }

    // --- Meals ---

    fn insert_refs(tx: &Transaction, meal_id: i64, refs: &[IngredientRef]) -> Result<()> {
        let mut stmt = tx.prepare(
            "INSERT INTO meal_ingredients (meal_id, ingredient_id, quantity, position) VALUES (?1, ?2, ?3, ?4)",
        )?;
        for (position, r) in refs.iter().enumerate() {
            stmt.execute(params![meal_id, r.ingredient_id, r.quantity, position as i64])?;
        }
        Ok(())
    }

    /// Columns 4..=10 of `meals` for a meal kind.
    #[allow(clippy::type_complexity)]
    fn kind_columns(
        kind: &MealKind,
    ) -> Result<(
        Option<i64>,
        Option<f64>,
        Option<f64>,
        Option<f64>,
        Option<&str>,
        Option<String>,
        Option<f64>,
    )> {
        Ok(match kind {
            MealKind::Composed { .. } => (None, None, None, None, None, None, None),
            MealKind::Standalone { macros } => (
                Some(macros.calories),
                Some(macros.protein),
                Some(macros.carbs),
                Some(macros.fat),
                None,
                None,
                None,
            ),
            MealKind::Mod {
                mod_id,
                mod_data,
                portion,
            } => (
                None,
                None,
                None,
                None,
                Some(mod_id.as_str()),
                Some(serde_json::to_string(mod_data)?),
                Some(*portion),
            ),
        })
    }

    pub fn insert_meal(&mut self, meal: &NewMeal) -> Result<Meal> {
        let now = Local::now().to_rfc3339();
        let uuid = Uuid::new_v4().to_string();
        let (calories, protein, carbs, fat, mod_id, mod_data, portion) =
            Self::kind_columns(&meal.kind)?;
        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO meals (uuid, name, meal_type, calories, protein, carbs, fat, mod_id, mod_data, portion, notes, instructions, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                uuid,
                meal.name.trim(),
                meal.kind.meal_type(),
                calories,
                protein,
                carbs,
                fat,
                mod_id,
                mod_data,
                portion,
                meal.notes,
                meal.instructions,
                now,
                now,
            ],
        )?;
        let id = tx.last_insert_rowid();
        if let MealKind::Composed { ingredients } = &meal.kind {
            Self::insert_refs(&tx, id, ingredients)?;
        }
        tx.commit()?;
        self.get_meal(id)?.context("Meal vanished after insert")
    }

    pub fn get_meal(&self, id: i64) -> Result<Option<Meal>> {
        let meal = self
            .conn
            .query_row(
                &format!("SELECT {MEAL_COLUMNS} FROM meals WHERE id = ?1"),
                params![id],
                Self::meal_from_row,
            )
            .optional()?;
        match meal {
            Some(meal) => Ok(Some(self.with_refs(meal)?)),
            None => Ok(None),
        }
    }

    pub fn list_meals(&self) -> Result<Vec<Meal>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {MEAL_COLUMNS} FROM meals ORDER BY name, id"))?;
        let meals = stmt
            .query_map([], Self::meal_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        meals.into_iter().map(|m| self.with_refs(m)).collect()
    }

    fn with_refs(&self, mut meal: Meal) -> Result<Meal> {
        if let MealKind::Composed { ingredients } = &mut meal.kind {
            *ingredients = self.get_meal_refs(meal.id)?;
        }
        Ok(meal)
    }

    pub fn get_meal_refs(&self, meal_id: i64) -> Result<Vec<IngredientRef>> {
        let mut stmt = self.conn.prepare(
            "SELECT ingredient_id, quantity FROM meal_ingredients WHERE meal_id = ?1 ORDER BY position, id",
        )?;
        let refs = stmt
            .query_map(params![meal_id], |row| {
                Ok(IngredientRef {
                    ingredient_id: row.get(0)?,
                    quantity: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(refs)
    }

    /// Replace a meal wholesale: row, type and ingredient refs.
    pub fn update_meal(&mut self, id: i64, meal: &NewMeal) -> Result<Meal> {
        let now = Local::now().to_rfc3339();
        let (calories, protein, carbs, fat, mod_id, mod_data, portion) =
            Self::kind_columns(&meal.kind)?;
        let tx = self.conn.transaction()?;
        let rows = tx.execute(
            "UPDATE meals SET name = ?1, meal_type = ?2, calories = ?3, protein = ?4, carbs = ?5, fat = ?6,
             mod_id = ?7, mod_data = ?8, portion = ?9, notes = ?10, instructions = ?11, updated_at = ?12
             WHERE id = ?13",
            params![
                meal.name.trim(),
                meal.kind.meal_type(),
                calories,
                protein,
                carbs,
                fat,
                mod_id,
                mod_data,
                portion,
                meal.notes,
                meal.instructions,
                now,
                id,
            ],
        )?;
        if rows == 0 {
            bail!("Meal {id} not found");
        }
        tx.execute(
            "DELETE FROM meal_ingredients WHERE meal_id = ?1",
            params![id],
        )?;
        if let MealKind::Composed { ingredients } = &meal.kind {
            Self::insert_refs(&tx, id, ingredients)?;
        }
        tx.commit()?;
        self.get_meal(id)?.context("Meal vanished after update")
    }

    pub fn delete_meal(&mut self, id: i64) -> Result<bool> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "DELETE FROM meal_ingredients WHERE meal_id = ?1",
            params![id],
        )?;
        let rows = tx.execute("DELETE FROM meals WHERE id = ?1", params![id])?;
        tx.commit()?;
        Ok(rows > 0)
    }

    // --- Logged entries ---

    pub fn insert_logged_entry(&self, date: &str, entry: &LoggedEntry) -> Result<()> {
        self.conn.execute(
            "INSERT INTO logged_entries (unique_id, date, snapshot, portion, calories, protein, carbs, fat, logged_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                entry.unique_id,
                date,
                serde_json::to_string(&entry.snapshot)?,
                entry.portion,
                entry.macros.calories,
                entry.macros.protein,
                entry.macros.carbs,
                entry.macros.fat,
                entry.logged_at,
            ],
        )?;
        Ok(())
    }

    pub fn update_logged_entry(&self, entry: &LoggedEntry) -> Result<bool> {
        let rows = self.conn.execute(
            "UPDATE logged_entries SET snapshot = ?1, portion = ?2, calories = ?3, protein = ?4, carbs = ?5, fat = ?6
             WHERE unique_id = ?7",
            params![
                serde_json::to_string(&entry.snapshot)?,
                entry.portion,
                entry.macros.calories,
                entry.macros.protein,
                entry.macros.carbs,
                entry.macros.fat,
                entry.unique_id,
            ],
        )?;
        Ok(rows > 0)
    }

    pub fn delete_logged_entry(&self, unique_id: &str) -> Result<bool> {
        let rows = self.conn.execute(
            "DELETE FROM logged_entries WHERE unique_id = ?1",
            params![unique_id],
        )?;
        Ok(rows > 0)
    }

    pub fn clear_logged_entries(&self, date: &str) -> Result<usize> {
        let rows = self
            .conn
            .execute("DELETE FROM logged_entries WHERE date = ?1", params![date])?;
        Ok(rows)
    }

    pub fn get_logged_entries(&self, date: &str) -> Result<Vec<LoggedEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT unique_id, snapshot, portion, calories, protein, carbs, fat, logged_at
             FROM logged_entries WHERE date = ?1 ORDER BY logged_at, rowid",
        )?;
        let entries = stmt
            .query_map(params![date], Self::logged_entry_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    // --- User Settings ---

    pub fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        let now = Local::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO user_settings (key, value, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, now],
        )?;
        Ok(())
    }

    pub fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM user_settings WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    pub fn delete_setting(&self, key: &str) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM user_settings WHERE key = ?1", params![key])?;
        Ok(rows > 0)
    }

    pub fn set_goal(&self, goal: &DailyGoal) -> Result<()> {
        self.set_setting(GOAL_KEY, &serde_json::to_string(goal)?)
    }

    pub fn get_goal(&self) -> Result<Option<DailyGoal>> {
        match self.get_setting(GOAL_KEY)? {
            Some(raw) => Ok(Some(
                serde_json::from_str(&raw).context("Stored daily goal is not valid JSON")?,
            )),
            None => Ok(None),
        }
    }

    pub fn clear_goal(&self) -> Result<bool> {
        self.delete_setting(GOAL_KEY)
    }
}

impl ModConfigStore for Database {
    fn load_mod_config(&self) -> Result<BTreeMap<String, bool>> {
        match self.get_setting(MOD_CONFIG_KEY)? {
            Some(raw) => serde_json::from_str(&raw).context("Stored mod config is not valid JSON"),
            None => Ok(BTreeMap::new()),
        }
    }

    fn save_mod_config(&self, config: &BTreeMap<String, bool>) -> Result<()> {
        self.set_setting(MOD_CONFIG_KEY, &serde_json::to_string(config)?)
    }
}
