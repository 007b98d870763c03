//! The `probforge check-config` command.

use std::path::PathBuf;

use anyhow::{Context, Result};

pub fn execute(config_path: Option<PathBuf>) -> Result<()> {
    let config = probforge_providers::load_config_from(config_path.as_deref())?;
    config
        .validate_generation()
        .context("configuration is not usable for variant generation")?;

    println!("Configuration OK");
    println!("  provider:       {}", config.default_provider);
    println!("  model:          {}", config.default_model);
    println!("  attempts:       {}", config.max_generation_attempts);
    println!("  delete policy:  {}", config.delete_policy);
    println!("  database:       {}", config.server.database_url);
    println!("  bind:           {}", config.server.bind);
    Ok(())
}
