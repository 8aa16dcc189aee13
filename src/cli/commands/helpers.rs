//! Shared helpers for CLI commands.

use std::sync::Arc;

use anyhow::Context;
use console::style;
use tracing::warn;

use crate::config::{Config, StorageBackend};
use crate::credentials::{
    CredentialStore, DisabledExchange, OAuthTokenExchange, TokenExchange, TokenFiles,
};
use crate::harvest::{CancelToken, CycleReport};
use crate::http_client::HttpClient;
use crate::rate_limit::RequestThrottle;
use crate::sink::{TableStore, TsvTableStore, WorkbookStore};

/// Build the run's HTTP client. All requests share one throttle.
pub fn http_client(config: &Config) -> anyhow::Result<HttpClient> {
    let mut builder = HttpClient::builder(config.http.timeout())
        .throttle(RequestThrottle::new(config.http.throttle()));
    if let Some(ref ua) = config.http.user_agent {
        builder = builder.user_agent(ua);
    }
    Ok(builder.build()?)
}

/// Load the credential from the token files and wire up the refresh grant.
pub async fn open_credentials(
    config: &Config,
    client: &HttpClient,
) -> anyhow::Result<CredentialStore> {
    let files = TokenFiles::new(
        config.resolve(&config.credentials.access_token_file),
        config.resolve(&config.credentials.refresh_token_file),
    );

    let exchange: Arc<dyn TokenExchange> = match config.oauth.secrets(&config.base_dir()).await? {
        Some(secrets) => Arc::new(OAuthTokenExchange::new(
            client.clone(),
            config.oauth.token_url.as_str(),
            secrets,
        )),
        None => {
            warn!("No OAuth client configured; expired tokens cannot be refreshed");
            Arc::new(DisabledExchange::new(
                "no OAuth client configured (set [oauth] client_id/client_secret or client_secrets_file)",
            ))
        }
    };

    CredentialStore::open(Arc::new(files), exchange)
        .await
        .context("Failed to load credentials")
}

/// Open the configured table store.
pub fn table_store(config: &Config) -> Arc<dyn TableStore> {
    let timeout = config.http.storage_timeout();
    match config.storage.backend {
        StorageBackend::Tsv => Arc::new(
            TsvTableStore::new(config.resolve(&config.storage.dir)).with_write_timeout(timeout),
        ),
        StorageBackend::Workbook => Arc::new(
            WorkbookStore::new(config.resolve(&config.storage.path)).with_write_timeout(timeout),
        ),
    }
}

/// Trip `cancel` on Ctrl-C.
pub fn cancel_on_ctrl_c(cancel: CancelToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!(
                "\n{} Interrupted, finishing current writes...",
                style("!").yellow()
            );
            cancel.cancel();
        }
    });
}

/// One summary line per cycle, plus any skipped-record reasons.
pub fn print_report(report: &CycleReport) {
    match report.result {
        Ok(ref outcome) => {
            println!(
                "  {} {:<24} {:>5} fetched, {:>5} new/updated, {:>6} rows ({} pages)",
                style("✓").green(),
                report.table,
                report.fetched,
                outcome.incoming_rows,
                outcome.persisted_rows,
                report.pages
            );
            if outcome.dropped_rows > 0 {
                println!(
                    "    {} dropped {} stored row(s) without a key",
                    style("!").yellow(),
                    outcome.dropped_rows
                );
            }
            if outcome.replaced_rows > 0 {
                println!(
                    "    {} replaced {} stored row(s) with the current listing",
                    style("~").dim(),
                    outcome.replaced_rows
                );
            }
        }
        Err(ref e) => {
            println!("  {} {:<24} {}", style("✗").red(), report.table, e);
        }
    }

    if report.skipped > 0 {
        println!(
            "    {} skipped {} record(s)",
            style("!").yellow(),
            report.skipped
        );
        for reason in &report.skip_reasons {
            println!("      {}", style(reason).dim());
        }
    }
}

/// Truncate a string for tabular output.
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("reviews", 10), "reviews");
        assert_eq!(truncate("reviews_detail_archive", 10), "reviews...");
    }
}
