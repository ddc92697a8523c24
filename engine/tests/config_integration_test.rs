//! Loading configuration files from disk

use concierge_engine::config::Config;
use sdk::AccessTier;
use std::time::Duration;
use tempfile::TempDir;

fn write_config(dir: &TempDir, body: &str) -> std::path::PathBuf {
    let path = dir.path().join("config.toml");
    std::fs::write(&path, body).unwrap();
    path
}

#[test]
fn test_load_full_config() {
    let dir = TempDir::new().unwrap();
    let data_dir = dir.path().join("data");
    let path = write_config(
        &dir,
        &format!(
            r#"
[core]
log_level = "debug"
data_dir = "{}"

[llm]
default_provider = "anthropic"
timeout_secs = 10

[orchestrator]
handler_timeout_secs = 45

[reasoning]
max_iterations = 2
confidence_threshold = 0.75

[parallel]
max_concurrency = 5
timeout_ms = 2000

[memory]
sweep_interval_secs = 60

[[auth.tokens]]
token = "ops-token"
user_id = "ops"
tier = "admin"
"#,
            data_dir.display()
        ),
    );

    let config = Config::load_from_path(&path).unwrap();

    assert_eq!(config.core.log_level, "debug");
    assert!(data_dir.exists(), "data dir is created on load");
    assert_eq!(config.database_path(), data_dir.join("concierge.db"));
    assert_eq!(config.llm.default_provider, "anthropic");
    assert_eq!(config.handler_timeout(), Duration::from_secs(45));
    assert_eq!(config.memory_sweep_interval(), Duration::from_secs(60));
    assert_eq!(config.reasoning.max_iterations, 2);
    assert_eq!(config.parallel.max_concurrency, 5);
    assert_eq!(config.auth.tokens.len(), 1);
    assert_eq!(config.auth.tokens[0].tier, AccessTier::Admin);
    // untouched sections keep their defaults
    assert_eq!(config.llm.ollama.base_url, "http://localhost:11434");
}

#[test]
fn test_rejects_unknown_provider() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        &format!(
            "[core]\ndata_dir = \"{}\"\n\n[llm]\ndefault_provider = \"gemini\"\n",
            dir.path().join("data").display()
        ),
    );

    let err = Config::load_from_path(&path).unwrap_err();
    assert!(err.to_string().contains("gemini"));
}

#[test]
fn test_rejects_empty_token() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        &format!(
            "[core]\ndata_dir = \"{}\"\n\n[llm]\ndefault_provider = \"ollama\"\n\n[[auth.tokens]]\ntoken = \"\"\nuser_id = \"x\"\ntier = \"guest\"\n",
            dir.path().join("data").display()
        ),
    );

    assert!(Config::load_from_path(&path).is_err());
}

#[test]
fn test_existing_file_is_not_overwritten() {
    let dir = TempDir::new().unwrap();
    let body = format!(
        "[core]\nlog_level = \"warn\"\ndata_dir = \"{}\"\n\n[llm]\ndefault_provider = \"ollama\"\n",
        dir.path().join("data").display()
    );
    let path = write_config(&dir, &body);

    let config = Config::load_or_create_at(&path).unwrap();

    assert_eq!(config.core.log_level, "warn");
    assert_eq!(std::fs::read_to_string(&path).unwrap(), body);
}

#[test]
fn test_malformed_file_is_config_error() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "[core\nlog_level = ");

    let err = Config::load_from_path(&path).unwrap_err();
    assert!(err.to_string().contains("Failed to parse config"));
}

#[test]
fn test_rejects_zero_sweep_interval() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        &format!(
            "[core]\ndata_dir = \"{}\"\n\n[llm]\ndefault_provider = \"ollama\"\n\n[memory]\nsweep_interval_secs = 0\n",
            dir.path().join("data").display()
        ),
    );

    let err = Config::load_from_path(&path).unwrap_err();
    assert!(err.to_string().contains("sweep_interval_secs"));
}

#[test]
fn test_rejects_zero_completion_timeout() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        &format!(
            "[core]\ndata_dir = \"{}\"\n\n[llm]\ndefault_provider = \"ollama\"\ntimeout_secs = 0\n",
            dir.path().join("data").display()
        ),
    );

    let err = Config::load_from_path(&path).unwrap_err();
    assert!(err.to_string().contains("timeouts must be greater than zero"));
}
