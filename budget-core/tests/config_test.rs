/// Configuration loading and wiring

use budget_core::{CompletionDispatcher, EngineConfig, EngineError};
use std::io::Write;
use std::time::Duration;

#[tokio::test]
async fn test_load_config_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
default_model = "gpt-4"
api_base_url = "http://localhost:9999/v1"
request_timeout_secs = 5
"#
    )
    .unwrap();

    let config = EngineConfig::load(file.path()).await.unwrap();
    assert_eq!(config.default_model, "gpt-4");
    assert_eq!(config.request_timeout(), Duration::from_secs(5));

    let dispatcher = CompletionDispatcher::from_config(
        &config.with_overrides(None, Some("sk-test".to_string())),
    )
    .unwrap();
    assert_eq!(dispatcher.model(), "gpt-4");
    assert_eq!(dispatcher.registry().default_model(), "gpt-4");
}

#[tokio::test]
async fn test_missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let result = EngineConfig::load(dir.path().join("absent.toml")).await;
    assert!(matches!(result, Err(EngineError::Io(_))));
}

#[test]
fn test_dispatcher_requires_api_key() {
    let result = CompletionDispatcher::from_config(&EngineConfig::default());
    assert!(matches!(result, Err(EngineError::InvalidConfig(_))));
}

#[test]
fn test_malformed_toml() {
    let result = EngineConfig::from_toml_str("default_model = ");
    assert!(matches!(result, Err(EngineError::ConfigParse(_))));
}
