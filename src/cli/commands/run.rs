//! Run command.

use std::sync::Arc;

use anyhow::bail;
use console::style;

use crate::config::Config;
use crate::harvest::{CancelToken, Harvester, HttpPageFetcher, Paginator};
use crate::jobs::{select_jobs, PlanEnv};
use crate::sink::{MergeSink, ScratchStore, TableStore};

use super::helpers::{
    cancel_on_ctrl_c, http_client, open_credentials, print_report, table_store,
};

/// Harvest the selected jobs. Fails if any cycle failed.
pub async fn cmd_run(
    config: &Config,
    names: &[String],
    all: bool,
    dry_run: bool,
) -> anyhow::Result<()> {
    if config.jobs.is_empty() {
        bail!("No jobs configured");
    }
    if names.is_empty() && !all {
        bail!("Name the jobs to run, or pass --all");
    }
    let jobs = select_jobs(&config.jobs, names)?;

    let client = http_client(config)?;
    let credentials = open_credentials(config, &client).await?;

    let mut store = table_store(config);
    if dry_run {
        println!(
            "{} Dry run: nothing will be written to {}",
            style("!").yellow(),
            store.describe()
        );
        store = Arc::new(ScratchStore::new(store)) as Arc<dyn TableStore>;
    }

    let cancel = CancelToken::new();
    cancel_on_ctrl_c(cancel.clone());

    let fetcher = Arc::new(HttpPageFetcher::new(client, credentials.clone()));
    let paginator = Paginator::new(fetcher, credentials)
        .with_max_pages(config.http.max_pages)
        .with_cancel(cancel.clone());
    let sink = MergeSink::new(store.clone(), config.http.storage_timeout());
    let harvester = Harvester::new(paginator, sink, cancel);

    let env = PlanEnv {
        store,
        today: chrono::Local::now().date_naive(),
    };

    let mut total = 0;
    let mut failed = 0;
    for job in jobs {
        println!(
            "{} {} ({})",
            style("→").cyan(),
            style(&job.name).bold(),
            job.kind.as_str()
        );

        let plans = match job.plan(&env).await {
            Ok(plans) => plans,
            Err(e) => {
                println!("  {} cannot plan: {}", style("✗").red(), e);
                failed += 1;
                continue;
            }
        };
        if plans.is_empty() {
            println!("  {} nothing to harvest", style("○").dim());
            continue;
        }

        total += plans.len();
        for report in harvester.run_all(plans, config.http.concurrency).await {
            print_report(&report);
            if !report.is_success() {
                failed += 1;
            }
        }
    }

    if failed > 0 {
        bail!("{} of {} cycle(s) failed", failed, total.max(failed));
    }
    println!("{} Harvested {} table(s)", style("✓").green(), total);
    Ok(())
}
