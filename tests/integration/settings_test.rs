//! Settings Integration Tests
//!
//! Engine construction from TOML settings files.

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use medpanel::{DiagnosticEngine, EngineError, EngineSettings, MemoryUsageSink, Specialty};

fn write_settings(temp: &TempDir, content: &str) -> std::path::PathBuf {
    let path = temp.path().join("medpanel.toml");
    fs::write(&path, content).unwrap();
    path
}

const CLINIC_SETTINGS: &str = r#"
[provider]
provider = "gemini"
model = "gemini-2.5-pro"
api_key = "test-key"
fallback_models = ["gemini-2.5-flash"]
fallback_delay_ms = 250

[panel]
max_retries = 1
approval_threshold = 80
max_concurrency = 4
urgency_triage = false
default_specialties = ["endocrinology", "nutrition", "cardiology"]

[timeouts]
analyzer_call_secs = 30
fan_out_deadline_secs = 120

[usage]
enabled = true
queue_capacity = 64
"#;

#[tokio::test]
async fn test_engine_from_settings_file() {
    let temp = TempDir::new().unwrap();
    let path = write_settings(&temp, CLINIC_SETTINGS);

    let settings = EngineSettings::load(&path).unwrap();
    let engine = DiagnosticEngine::from_settings(&settings, Arc::new(MemoryUsageSink::new())).unwrap();

    let config = engine.config();
    assert_eq!(config.max_retries, 1);
    assert_eq!(config.max_attempts(), 2);
    assert_eq!(config.approval_threshold, 80);
    assert_eq!(config.max_concurrency, 4);
    assert!(!config.urgency_triage);
    assert!(config.inject_feedback);
    assert_eq!(config.analyzer_timeout(), Duration::from_secs(30));
    assert_eq!(config.fan_out_deadline(), Some(Duration::from_secs(120)));

    assert_eq!(
        engine.default_panel(),
        &[Specialty::Endocrinology, Specialty::Nutrition, Specialty::Cardiology]
    );
    assert_eq!(engine.pool().len(), 26);
    assert!(engine.usage_tracker().is_some());
}

#[tokio::test]
async fn test_usage_disabled_builds_no_tracker() {
    let settings = EngineSettings::from_toml_str(
        r#"
[provider]
api_key = "test-key"

[usage]
enabled = false
"#,
    )
    .unwrap();
    let engine = DiagnosticEngine::from_settings(&settings, Arc::new(MemoryUsageSink::new())).unwrap();
    assert!(engine.usage_tracker().is_none());
    assert!(engine.default_panel().len() == 26);
}

#[tokio::test]
async fn test_unknown_default_specialty_is_rejected() {
    let settings = EngineSettings::from_toml_str(
        r#"
[provider]
api_key = "test-key"

[panel]
default_specialties = ["cardiology", "astrology"]
"#,
    )
    .unwrap();
    let err = DiagnosticEngine::from_settings(&settings, Arc::new(MemoryUsageSink::new()))
        .err()
        .unwrap();
    assert!(matches!(err, EngineError::Config(_)));
    assert!(err.to_string().contains("astrology"));
}

#[tokio::test]
async fn test_missing_api_key_is_rejected() {
    let settings = EngineSettings::from_toml_str(
        r#"
[provider]
api_key_env = "MEDPANEL_INTEGRATION_KEY_THAT_IS_NEVER_SET"
"#,
    )
    .unwrap();
    let err = DiagnosticEngine::from_settings(&settings, Arc::new(MemoryUsageSink::new()))
        .err()
        .unwrap();
    assert!(matches!(err, EngineError::Config(_)));
}

#[test]
fn test_out_of_range_panel_values_fail_to_load() {
    let temp = TempDir::new().unwrap();
    let path = write_settings(&temp, "[panel]\nmax_retries = 9\n");
    assert!(EngineSettings::load(&path).is_err());

    let path = write_settings(&temp, "[panel]\nmax_concurrency = 0\n");
    assert!(EngineSettings::load(&path).is_err());
}

#[test]
fn test_missing_file_is_an_io_error() {
    let temp = TempDir::new().unwrap();
    let err = EngineSettings::load(temp.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, EngineError::Io(_)));
}
