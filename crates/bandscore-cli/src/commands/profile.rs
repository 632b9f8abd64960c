//! The `bandscore profile` command.

use std::path::PathBuf;

use anyhow::Result;
use comfy_table::{Cell, Table};

use bandscore_store::Stores;

pub async fn execute(user: String, config_path: Option<PathBuf>) -> Result<()> {
    let config = bandscore_providers::load_config_from(config_path.as_deref())?;
    let stores = Stores::open(&config.data_dir)?;

    let Some(profile) = stores.profiles.load(&user).await? else {
        println!("No profile for '{user}' yet. Score a writing or speaking response first.");
        return Ok(());
    };
    let reports = stores.reports.list_for(&user).await?;

    println!(
        "Learner: {} ({} report(s), updated {})\n",
        profile.user_id,
        reports.len(),
        profile.updated_at.format("%Y-%m-%d %H:%M")
    );

    if !profile.ability_history.is_empty() {
        let mut table = Table::new();
        table.set_header(vec!["When", "Module", "Overall", "Criteria"]);
        for point in &profile.ability_history {
            let criteria = point
                .criteria
                .iter()
                .map(|(c, band)| format!("{c} {band:.1}"))
                .collect::<Vec<_>>()
                .join(", ");
            table.add_row(vec![
                Cell::new(point.at.format("%Y-%m-%d %H:%M")),
                Cell::new(point.module),
                Cell::new(format!("{:.1}", point.overall_band)),
                Cell::new(criteria),
            ]);
        }
        println!("Ability history");
        println!("{table}\n");
    }

    if !profile.recurring_weaknesses.is_empty() {
        let mut table = Table::new();
        table.set_header(vec!["Area", "Pattern", "Seen", "Last impact"]);
        for weakness in &profile.recurring_weaknesses {
            table.add_row(vec![
                Cell::new(&weakness.area),
                Cell::new(&weakness.pattern),
                Cell::new(weakness.count),
                Cell::new(&weakness.impact),
            ]);
        }
        println!("Recurring weaknesses");
        println!("{table}\n");
    }

    if !profile.plan.is_empty() {
        println!("Next 7 days");
        for step in &profile.plan {
            println!(
                "  - {}: {} (done when: {})",
                step.focus, step.exercise, step.success_metric
            );
        }
    }

    Ok(())
}
