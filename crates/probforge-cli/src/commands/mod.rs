pub mod check_config;
pub mod generate;
pub mod init;
pub mod lineage;
pub mod list_models;
pub mod serve;

use std::sync::Arc;

use anyhow::{Context, Result};

use probforge_providers::ProbforgeConfig;
use probforge_store::SqliteStore;

/// Open the content database named by `override_url` or the config.
pub(crate) async fn open_store(
    config: &ProbforgeConfig,
    override_url: Option<String>,
) -> Result<Arc<SqliteStore>> {
    let url = override_url.unwrap_or_else(|| config.server.database_url.clone());
    let store = SqliteStore::connect(&url)
        .await
        .with_context(|| format!("failed to open database {url}"))?;
    Ok(Arc::new(store))
}
