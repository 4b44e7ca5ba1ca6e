mod estimate;
mod goal;
mod helpers;
mod ingredient;
mod log;
mod meal;
mod mods;

pub(crate) use estimate::cmd_estimate;
pub(crate) use goal::{cmd_goal_clear, cmd_goal_set, cmd_goal_show};
pub(crate) use helpers::json_error;
pub(crate) use ingredient::{
    IngredientChanges, cmd_ingredient_add, cmd_ingredient_barcode, cmd_ingredient_delete,
    cmd_ingredient_list, cmd_ingredient_update,
};
pub(crate) use log::{cmd_clear, cmd_entry_edit, cmd_entry_remove, cmd_log, cmd_today};
pub(crate) use meal::{
    MealEdits, TargetType, cmd_meal_create, cmd_meal_delete, cmd_meal_duplicate, cmd_meal_edit,
    cmd_meal_list, cmd_meal_show,
};
pub(crate) use mods::{cmd_mod_list, cmd_mod_run, cmd_mod_toggle};
