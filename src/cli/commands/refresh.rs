//! Refresh-token command.

use console::style;

use crate::config::Config;

use super::helpers::{http_client, open_credentials};

/// Force one credential refresh and persist the new access token.
pub async fn cmd_refresh_token(config: &Config) -> anyhow::Result<()> {
    let client = http_client(config)?;
    let credentials = open_credentials(config, &client).await?;

    credentials.refresh().await?;

    println!(
        "{} Access token refreshed and saved to {}",
        style("✓").green(),
        config.resolve(&config.credentials.access_token_file).display()
    );
    Ok(())
}
