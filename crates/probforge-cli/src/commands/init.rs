//! The `probforge init` command.

use std::path::Path;

use anyhow::Result;

use probforge_providers::config::CONFIG_FILE_NAME;

pub fn execute() -> Result<()> {
    write_if_missing(Path::new(CONFIG_FILE_NAME), SAMPLE_CONFIG)?;
    write_if_missing(Path::new(".env.example"), SAMPLE_ENV)?;

    println!("\nNext steps:");
    println!("  1. Export OPENAI_API_KEY (or edit {CONFIG_FILE_NAME})");
    println!("  2. Run: probforge check-config");
    println!("  3. Run: probforge serve");

    Ok(())
}

fn write_if_missing(path: &Path, content: &str) -> Result<()> {
    if path.exists() {
        println!("{} already exists, skipping.", path.display());
    } else {
        std::fs::write(path, content)?;
        println!("Created {}", path.display());
    }
    Ok(())
}

const SAMPLE_CONFIG: &str = r#"# probforge configuration

default_provider = "openai"
default_model = "gpt-4o"
temperature = 0.7
max_tokens = 2048
max_generation_attempts = 2
retry_delay_ms = 1000
# "reject" refuses to delete problems used in exams, "cascade" unlinks them.
delete_policy = "reject"

[providers.openai]
type = "openai"
api_key = "${OPENAI_API_KEY}"

[providers.anthropic]
type = "anthropic"
api_key = "${ANTHROPIC_API_KEY}"

[providers.gemini]
type = "gemini"
api_key = "${GEMINI_API_KEY}"

[providers.ollama]
type = "ollama"
base_url = "http://localhost:11434"

[server]
bind = "127.0.0.1:8000"
database_url = "sqlite://probforge.db"
# log_level = "probforge=debug,tower_http=info"
"#;

const SAMPLE_ENV: &str = r#"OPENAI_API_KEY=
# ANTHROPIC_API_KEY=
# GEMINI_API_KEY=
# PROBFORGE_DATABASE_URL=sqlite://probforge.db
# PROBFORGE_BIND=127.0.0.1:8000
# RUST_LOG=probforge=debug
"#;
