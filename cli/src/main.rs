mod commands;
mod config;
mod estimator;
mod openfoodfacts;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::process;
use tracing_subscriber::EnvFilter;

use crate::commands::{
    IngredientChanges, MealEdits, TargetType, cmd_clear, cmd_entry_edit, cmd_entry_remove,
    cmd_estimate, cmd_goal_clear, cmd_goal_set, cmd_goal_show, cmd_ingredient_add,
    cmd_ingredient_barcode, cmd_ingredient_delete, cmd_ingredient_list, cmd_ingredient_update,
    cmd_log, cmd_meal_create, cmd_meal_delete, cmd_meal_duplicate, cmd_meal_edit, cmd_meal_list,
    cmd_meal_show, cmd_mod_list, cmd_mod_run, cmd_mod_toggle, cmd_today, json_error,
};
use crate::config::Config;
use crate::openfoodfacts::OpenFoodFactsClient;
use plate_core::PlateService;
use plate_core::models::{DailyGoal, Macros, NewIngredient};

#[derive(Parser)]
#[command(
    name = "plate",
    version,
    about = "A local-first meal and macro tracker",
    long_about = "Build meals from ingredients, log portions, and watch today's macros.\n\
                  Data lives in a local SQLite file; nothing leaves your machine unless\n\
                  you look up a barcode or ask the estimator."
)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

/// Macro values given on the command line. Unset fields keep their old value.
#[derive(Args, Debug, Default, Clone)]
pub(crate) struct MacroArgs {
    /// Calories (kcal)
    #[arg(long)]
    pub calories: Option<i64>,
    /// Protein (g)
    #[arg(long)]
    pub protein: Option<f64>,
    /// Carbohydrates (g)
    #[arg(long)]
    pub carbs: Option<f64>,
    /// Fat (g)
    #[arg(long)]
    pub fat: Option<f64>,
}

impl MacroArgs {
    pub(crate) fn is_empty(&self) -> bool {
        self.calories.is_none()
            && self.protein.is_none()
            && self.carbs.is_none()
            && self.fat.is_none()
    }

    pub(crate) fn apply(&self, base: Macros) -> Macros {
        Macros::new(
            self.calories.unwrap_or(base.calories),
            self.protein.unwrap_or(base.protein),
            self.carbs.unwrap_or(base.carbs),
            self.fat.unwrap_or(base.fat),
        )
        .rounded()
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Manage the ingredient library
    Ingredient {
        #[command(subcommand)]
        command: IngredientCommands,
    },
    /// Create, inspect and edit saved meals
    Meal {
        #[command(subcommand)]
        command: MealCommands,
    },
    /// List, toggle and run meal generators
    Mod {
        #[command(subcommand)]
        command: ModCommands,
    },
    /// Ask the estimator for the macros of a free-text description
    Estimate {
        /// What you ate, e.g. "two slices of pepperoni pizza"
        text: String,
        /// Save the result as a meal
        #[arg(long)]
        save: bool,
        /// Portion of the saved meal (e.g. "1/2", "half", "1.5")
        #[arg(short, long, requires = "save")]
        portion: Option<String>,
    },
    /// Log a saved meal to today
    Log {
        /// Meal ID
        meal_id: i64,
        /// Portion (e.g. "1/2", "half", "¾", "1.5"; default 1)
        #[arg(short, long)]
        portion: Option<String>,
    },
    /// Show today's entries and progress against the goal
    Today,
    /// Change or remove one of today's entries
    Entry {
        #[command(subcommand)]
        command: EntryCommands,
    },
    /// Remove every entry logged today
    Clear,
    /// Set, show or clear the daily goal
    Goal {
        #[command(subcommand)]
        command: GoalCommands,
    },
}

#[derive(Subcommand)]
enum IngredientCommands {
    /// Add an ingredient
    Add {
        /// Ingredient name
        name: String,
        /// Calories per unit
        #[arg(long)]
        calories: i64,
        /// Protein per unit (g)
        #[arg(long, default_value = "0")]
        protein: f64,
        /// Carbohydrates per unit (g)
        #[arg(long, default_value = "0")]
        carbs: f64,
        /// Fat per unit (g)
        #[arg(long, default_value = "0")]
        fat: f64,
        /// What one unit is (e.g. "100g", "1 slice")
        #[arg(short, long, default_value = "serving")]
        unit: String,
        /// Mark as a pantry staple
        #[arg(long)]
        staple: bool,
    },
    /// List ingredients
    List {
        /// Filter by name
        #[arg(short, long)]
        search: Option<String>,
    },
    /// Change an ingredient; meals that use it pick up the new values
    Update {
        /// Ingredient ID
        id: i64,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        calories: Option<i64>,
        #[arg(long)]
        protein: Option<f64>,
        #[arg(long)]
        carbs: Option<f64>,
        #[arg(long)]
        fat: Option<f64>,
        #[arg(short, long)]
        unit: Option<String>,
        #[arg(long)]
        staple: Option<bool>,
    },
    /// Delete an ingredient that no meal uses
    Delete {
        /// Ingredient ID
        id: i64,
    },
    /// Look up a barcode on `OpenFoodFacts` and save it as an ingredient
    Barcode {
        /// Barcode number
        code: String,
    },
}

#[derive(Subcommand)]
enum MealCommands {
    /// Create a meal from ingredients or from macro values
    Create {
        /// Meal name
        name: String,
        /// Ingredient as ID[:QTY], repeatable
        #[arg(short, long = "ingredient")]
        ingredients: Vec<String>,
        #[command(flatten)]
        macros: MacroArgs,
        #[arg(long)]
        notes: Option<String>,
        #[arg(long)]
        instructions: Option<String>,
    },
    /// Show a meal with its computed totals
    Show {
        /// Meal ID
        id: i64,
    },
    /// List saved meals
    List,
    /// Copy a meal under a new name
    Duplicate {
        /// Meal ID
        id: i64,
    },
    /// Delete a meal
    Delete {
        /// Meal ID
        id: i64,
    },
    /// Edit a meal; all changes are saved together
    Edit {
        /// Meal ID
        id: i64,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        notes: Option<String>,
        #[arg(long)]
        instructions: Option<String>,
        /// Convert the meal to another type first
        #[arg(long, value_enum)]
        to: Option<TargetType>,
        /// Add or change an ingredient as ID[:QTY], repeatable
        #[arg(long)]
        set: Vec<String>,
        /// Remove an ingredient by ID, repeatable
        #[arg(long)]
        remove: Vec<i64>,
        #[command(flatten)]
        macros: MacroArgs,
    },
}

#[derive(Subcommand)]
enum ModCommands {
    /// List available mods and their inputs
    List,
    /// Enable a mod
    Enable { id: String },
    /// Disable a mod
    Disable { id: String },
    /// Generate and save a meal with a mod
    Run {
        /// Mod ID (see `plate mod list`)
        id: String,
        /// Mod input as KEY=VALUE, repeatable
        #[arg(short, long = "input")]
        inputs: Vec<String>,
        /// Portion of the generated meal
        #[arg(short, long)]
        portion: Option<String>,
    },
}

#[derive(Subcommand)]
enum EntryCommands {
    /// Remove an entry
    Remove {
        /// Entry ID or a unique prefix of it
        id: String,
    },
    /// Change an entry's portion or ingredients
    Edit {
        /// Entry ID or a unique prefix of it
        id: String,
        #[arg(short, long)]
        portion: Option<String>,
        /// Replacement ingredient list as ID[:QTY], repeatable
        #[arg(short, long = "ingredient")]
        ingredients: Vec<String>,
    },
}

#[derive(Subcommand)]
enum GoalCommands {
    /// Set the daily goal
    Set {
        /// Calories per day
        calories: i64,
        #[arg(long)]
        protein: Option<f64>,
        #[arg(long)]
        carbs: Option<f64>,
        #[arg(long)]
        fat: Option<f64>,
    },
    /// Show the daily goal
    Show,
    /// Remove the daily goal
    Clear,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("PLATE_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing();

    let json = cli.json;
    if let Err(e) = run(cli) {
        if json {
            println!("{}", json_error(&e));
            process::exit(2);
        }
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

#[allow(clippy::too_many_lines)]
fn run(cli: Cli) -> Result<()> {
    let rt = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    let config = Config::load()?;
    let db_path = config
        .db_path
        .to_str()
        .context("Database path is not valid UTF-8")?;
    tracing::debug!(db = db_path, "opening database");
    let mut svc = PlateService::new(db_path)?;
    let json = cli.json;

    match cli.command {
        Commands::Ingredient { command } => match command {
            IngredientCommands::Add {
                name,
                calories,
                protein,
                carbs,
                fat,
                unit,
                staple,
            } => {
                let ingredient = NewIngredient {
                    name,
                    calories,
                    protein,
                    carbs,
                    fat,
                    unit,
                    is_staple: staple,
                    barcode: None,
                    source: "manual".to_string(),
                };
                cmd_ingredient_add(&svc, &ingredient, json)
            }
            IngredientCommands::List { search } => {
                cmd_ingredient_list(&svc, search.as_deref(), json)
            }
            IngredientCommands::Update {
                id,
                name,
                calories,
                protein,
                carbs,
                fat,
                unit,
                staple,
            } => {
                let changes = IngredientChanges {
                    name,
                    calories,
                    protein,
                    carbs,
                    fat,
                    unit,
                    staple,
                };
                cmd_ingredient_update(&mut svc, id, changes, json)
            }
            IngredientCommands::Delete { id } => cmd_ingredient_delete(&svc, id, json),
            IngredientCommands::Barcode { code } => {
                let off = OpenFoodFactsClient::new(rt.handle().clone())?;
                cmd_ingredient_barcode(&svc, &off, &code, json)
            }
        },
        Commands::Meal { command } => match command {
            MealCommands::Create {
                name,
                ingredients,
                macros,
                notes,
                instructions,
            } => cmd_meal_create(
                &mut svc,
                &name,
                &ingredients,
                &macros,
                notes,
                instructions,
                json,
            ),
            MealCommands::Show { id } => cmd_meal_show(&svc, id, json),
            MealCommands::List => cmd_meal_list(&svc, json),
            MealCommands::Duplicate { id } => cmd_meal_duplicate(&mut svc, id, json),
            MealCommands::Delete { id } => cmd_meal_delete(&mut svc, id, json),
            MealCommands::Edit {
                id,
                name,
                notes,
                instructions,
                to,
                set,
                remove,
                macros,
            } => {
                let edits = MealEdits {
                    name,
                    notes,
                    instructions,
                    to,
                    set,
                    remove,
                    macros,
                };
                cmd_meal_edit(&mut svc, id, edits, json)
            }
        },
        Commands::Mod { command } => match command {
            ModCommands::List => cmd_mod_list(&svc, json),
            ModCommands::Enable { id } => cmd_mod_toggle(&mut svc, &id, true, json),
            ModCommands::Disable { id } => cmd_mod_toggle(&mut svc, &id, false, json),
            ModCommands::Run {
                id,
                inputs,
                portion,
            } => cmd_mod_run(&mut svc, &id, &inputs, portion.as_deref(), json),
        },
        Commands::Estimate {
            text,
            save,
            portion,
        } => cmd_estimate(
            &mut svc,
            rt.handle(),
            &config.estimator,
            &text,
            save,
            portion.as_deref(),
            json,
        ),
        Commands::Log { meal_id, portion } => {
            cmd_log(&mut svc, meal_id, portion.as_deref(), json)
        }
        Commands::Today => cmd_today(&svc, json),
        Commands::Entry { command } => match command {
            EntryCommands::Remove { id } => cmd_entry_remove(&mut svc, &id, json),
            EntryCommands::Edit {
                id,
                portion,
                ingredients,
            } => cmd_entry_edit(&mut svc, &id, portion.as_deref(), &ingredients, json),
        },
        Commands::Clear => cmd_clear(&mut svc, json),
        Commands::Goal { command } => match command {
            GoalCommands::Set {
                calories,
                protein,
                carbs,
                fat,
            } => {
                let goal = DailyGoal {
                    calories,
                    protein,
                    carbs,
                    fat,
                };
                cmd_goal_set(&svc, &goal, json)
            }
            GoalCommands::Show => cmd_goal_show(&svc, json),
            GoalCommands::Clear => cmd_goal_clear(&svc, json),
        },
    }
}
