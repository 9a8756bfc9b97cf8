use colored::Colorize;
use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Attribute, Cell, Color, ContentArrangement, Table};

use crate::core::models::{StepStatus, StepView};

fn status_color(status: StepStatus) -> Color {
    match status {
        StepStatus::Pending => Color::DarkGrey,
        StepStatus::Running => Color::Cyan,
        StepStatus::Done => Color::Green,
        StepStatus::Skipped => Color::Yellow,
        StepStatus::Error => Color::Red,
    }
}

pub fn steps_table(steps: &[StepView]) -> String {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("#").add_attribute(Attribute::Bold),
            Cell::new("Step").add_attribute(Attribute::Bold),
            Cell::new("Status").add_attribute(Attribute::Bold),
        ]);

    for (i, step) in steps.iter().enumerate() {
        table.add_row(vec![
            Cell::new(i + 1),
            Cell::new(step.label),
            Cell::new(step.status.as_str()).fg(status_color(step.status)),
        ]);
    }
    table.to_string()
}

pub fn print_summary(steps: &[StepView], status: &str, failed: bool) {
    let rule = "═══════════════════════════════════════";
    let title = if failed { "bflow run failed" } else { "bflow run complete" };
    if failed {
        println!("\n{}", rule.red().bold());
        println!("{}", title.red().bold());
        println!("{}", rule.red().bold());
    } else {
        println!("\n{}", rule.green().bold());
        println!("{}", title.green().bold());
        println!("{}", rule.green().bold());
    }

    println!("\n{}", steps_table(steps));

    let count = |wanted: StepStatus| steps.iter().filter(|s| s.status == wanted).count();
    println!(
        "\n  {}: {}  {}: {}  {}: {}",
        "Done".cyan().bold(),
        count(StepStatus::Done).to_string().green().bold(),
        "Skipped".cyan().bold(),
        count(StepStatus::Skipped).to_string().yellow(),
        "Errors".cyan().bold(),
        count(StepStatus::Error).to_string().red().bold(),
    );
    println!("\n{}", status.dimmed());
}
