//! The `probforge generate` command: one orchestrator run from the shell.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use uuid::Uuid;

use probforge_core::model::VariantOverrides;
use probforge_core::{LineageManager, VariantGateway, VariantOrchestrator};

pub async fn execute(
    config_path: Option<PathBuf>,
    problem_id: Uuid,
    subject: Option<String>,
    difficulty: Option<i32>,
    database_url: Option<String>,
) -> Result<()> {
    let config = probforge_providers::load_config_from(config_path.as_deref())?;
    let provider = config
        .generation_provider()
        .context("invalid generation configuration")?;
    let store = super::open_store(&config, database_url).await?;

    let lineage = Arc::new(
        LineageManager::new(store.clone()).with_delete_policy(config.delete_policy),
    );
    let gateway = Arc::new(VariantGateway::new(provider, config.gateway_settings()));
    let orchestrator = VariantOrchestrator::new(store, gateway, lineage)
        .with_retry(config.generation_retry());

    let overrides = VariantOverrides {
        subject,
        difficulty,
    };
    let variant = orchestrator
        .generate_similar(problem_id, &overrides)
        .await
        .with_context(|| format!("failed to generate a variant of {problem_id}"))?;

    println!("{}", serde_json::to_string_pretty(&variant)?);
    Ok(())
}
