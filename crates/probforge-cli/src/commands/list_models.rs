//! The `probforge list-models` command.

use std::path::PathBuf;

use anyhow::Result;
use comfy_table::{Cell, Table};

use probforge_core::traits::ModelInfo;
use probforge_providers::create_provider;
use probforge_providers::ollama::OllamaProvider;
use probforge_providers::ProviderConfig;

pub async fn execute(provider_filter: Option<String>, config_path: Option<PathBuf>) -> Result<()> {
    let config = probforge_providers::load_config_from(config_path.as_deref())?;

    let mut names: Vec<&String> = config.providers.keys().collect();
    names.sort();

    let mut table = Table::new();
    table.set_header(vec!["Provider", "Model", "Name", "Context", "$/1K in", "$/1K out"]);
    let mut found_any = false;

    for name in names {
        if provider_filter.as_ref().is_some_and(|filter| filter != name) {
            continue;
        }
        let provider_config = &config.providers[name];

        let models: Vec<ModelInfo> = match provider_config {
            // Installed models are only known to the running Ollama instance.
            ProviderConfig::Ollama { base_url } => {
                match OllamaProvider::new(base_url)?.list_models_async().await {
                    Ok(models) => models,
                    Err(e) => {
                        eprintln!("{name}: {e}");
                        continue;
                    }
                }
            }
            _ => create_provider(name, provider_config)?.available_models(),
        };

        for model in &models {
            found_any = true;
            table.add_row(vec![
                Cell::new(name),
                Cell::new(&model.id),
                Cell::new(&model.name),
                Cell::new(format!("{}K", model.max_context / 1000)),
                Cell::new(format!("{:.4}", model.cost_per_1k_input)),
                Cell::new(format!("{:.4}", model.cost_per_1k_output)),
            ]);
        }
    }

    if found_any {
        println!("{table}");
    } else {
        println!("No providers configured. Run `probforge init` to create a config file.");
    }

    Ok(())
}
