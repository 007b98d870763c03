//! The `probforge lineage` command.

use std::path::PathBuf;

use anyhow::Result;
use comfy_table::{Cell, Table};
use uuid::Uuid;

use probforge_core::model::Problem;
use probforge_core::LineageManager;

const PREVIEW_CHARS: usize = 60;

pub async fn execute(
    config_path: Option<PathBuf>,
    problem_id: Uuid,
    database_url: Option<String>,
) -> Result<()> {
    let config = probforge_providers::load_config_from(config_path.as_deref())?;
    let store = super::open_store(&config, database_url).await?;
    let lineage = LineageManager::new(store);

    let problem = lineage.get_problem(problem_id).await?;
    let ancestors = lineage.list_ancestors(problem_id).await?;
    let children = lineage.list_children(problem_id).await?;

    let mut table = Table::new();
    table.set_header(vec!["Relation", "Id", "Subject", "Difficulty", "Content"]);
    for ancestor in &ancestors {
        table.add_row(row("ancestor", ancestor));
    }
    table.add_row(row("self", &problem));
    for child in &children {
        table.add_row(row("variant", child));
    }

    println!("{table}");
    println!(
        "{} ancestor(s), {} direct variant(s)",
        ancestors.len(),
        children.len()
    );
    Ok(())
}

fn row(relation: &str, problem: &Problem) -> Vec<Cell> {
    vec![
        Cell::new(relation),
        Cell::new(problem.id),
        Cell::new(&problem.subject),
        Cell::new(problem.difficulty),
        Cell::new(preview(&problem.content)),
    ]
}

fn preview(content: &str) -> String {
    let line = content.lines().next().unwrap_or_default();
    if line.chars().count() > PREVIEW_CHARS || content.lines().nth(1).is_some() {
        let cut: String = line.chars().take(PREVIEW_CHARS).collect();
        format!("{cut}…")
    } else {
        line.to_string()
    }
}
