use anyhow::Result;

use plate_core::PlateService;
use plate_core::models::DailyGoal;

fn print_goal(goal: &DailyGoal) {
    print!("Daily goal: {} kcal", goal.calories);
    for (label, grams) in [
        ("Protein", goal.protein),
        ("Carbs", goal.carbs),
        ("Fat", goal.fat),
    ] {
        if let Some(g) = grams {
            print!("  {label}: {g:.0}g");
        }
    }
    println!();
}

pub(crate) fn cmd_goal_set(svc: &PlateService, goal: &DailyGoal, json: bool) -> Result<()> {
    svc.set_goal(goal)?;
    if json {
        println!("{}", serde_json::to_string_pretty(goal)?);
    } else {
        print_goal(goal);
    }
    Ok(())
}

pub(crate) fn cmd_goal_show(svc: &PlateService, json: bool) -> Result<()> {
    let goal = svc.get_goal()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&goal)?);
    } else if let Some(goal) = goal {
        print_goal(&goal);
    } else {
        eprintln!("No goal set. Use `plate goal set <calories>` to set one.");
    }
    Ok(())
}

pub(crate) fn cmd_goal_clear(svc: &PlateService, json: bool) -> Result<()> {
    let cleared = svc.clear_goal()?;
    if json {
        println!("{}", serde_json::json!({ "cleared": cleared }));
    } else if cleared {
        println!("Goal cleared");
    } else {
        eprintln!("No goal was set");
    }
    Ok(())
}
