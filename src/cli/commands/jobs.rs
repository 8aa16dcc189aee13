//! Job listing command.

use console::style;

use crate::config::Config;
use crate::jobs::PlanEnv;

use super::helpers::{table_store, truncate};

/// List configured jobs with the cycles each would run today.
pub async fn cmd_jobs(config: &Config) -> anyhow::Result<()> {
    if config.jobs.is_empty() {
        println!(
            "{} No jobs configured. Add [[jobs]] entries to {}",
            style("!").yellow(),
            config
                .source_path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| crate::config::DEFAULT_CONFIG_FILE.to_string())
        );
        return Ok(());
    }

    let env = PlanEnv {
        store: table_store(config),
        today: chrono::Local::now().date_naive(),
    };

    println!("\n{}", style("Harvest Jobs").bold());
    println!("{}", "-".repeat(60));
    println!("{:<20} {:<14} {:<18} Collections", "Job", "Kind", "Table");
    println!("{}", "-".repeat(60));

    for job in &config.jobs {
        match job.plan(&env).await {
            Ok(plans) if plans.is_empty() => {
                println!(
                    "{:<20} {:<14} {}",
                    truncate(&job.name, 19),
                    job.kind.as_str(),
                    style("(nothing to harvest yet)").dim()
                );
            }
            Ok(plans) => {
                for (i, plan) in plans.iter().enumerate() {
                    let (name, kind) = if i == 0 {
                        (truncate(&job.name, 19), job.kind.as_str())
                    } else {
                        (String::new(), "")
                    };
                    println!(
                        "{:<20} {:<14} {:<18} {}",
                        name,
                        kind,
                        truncate(&plan.table.name, 17),
                        plan.tasks.len()
                    );
                }
            }
            Err(e) => {
                println!(
                    "{:<20} {:<14} {} {}",
                    truncate(&job.name, 19),
                    job.kind.as_str(),
                    style("✗").red(),
                    e
                );
            }
        }
    }

    Ok(())
}
