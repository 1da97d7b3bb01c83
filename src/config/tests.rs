//! Tests for config module.

use super::*;
use std::io::Write;
use std::time::Duration;
use tempfile::NamedTempFile;

// ==================== Duration parsing tests ====================

#[test]
fn test_parse_duration_seconds() {
    let d = duration::parse_duration("30s").unwrap();
    assert_eq!(d, Duration::from_secs(30));
}

#[test]
fn test_parse_duration_minutes() {
    let d = duration::parse_duration("5m").unwrap();
    assert_eq!(d, Duration::from_secs(300));
}

#[test]
fn test_parse_duration_milliseconds() {
    let d = duration::parse_duration("750ms").unwrap();
    assert_eq!(d, Duration::from_millis(750));
}

#[test]
fn test_parse_duration_compound() {
    let d = duration::parse_duration("1m30s").unwrap();
    assert_eq!(d, Duration::from_secs(90));
}

#[test]
fn test_parse_duration_bare_number_is_seconds() {
    let d = duration::parse_duration("12").unwrap();
    assert_eq!(d, Duration::from_secs(12));
}

#[test]
fn test_parse_duration_empty() {
    let d = duration::parse_duration("").unwrap();
    assert_eq!(d, Duration::ZERO);
}

#[test]
fn test_parse_duration_invalid_unit() {
    let result = duration::parse_duration("10x");
    assert!(result.is_err());
    assert!(result.unwrap_err().contains("unknown duration unit"));
}

#[test]
fn test_parse_duration_missing_number() {
    assert!(duration::parse_duration("s").is_err());
}

// ==================== YAML field loading tests ====================

/// Parse config from YAML string (for testing).
fn from_yaml(yaml: &str) -> Result<Config, ConfigError> {
    let config: Config = serde_yaml::from_str(yaml)?;
    Ok(config)
}

fn minimal_valid_yaml() -> String {
    r#"
app:
  name: desk
  env: development

api:
  base_url: "https://portal.example.com/api"
"#
    .to_string()
}

#[test]
fn test_load_app_fields() {
    let yaml = r#"
app:
  name: desk
  env: production
  log_level: debug

api:
  base_url: "https://portal.example.com/api"
"#;
    let cfg = from_yaml(yaml).unwrap();

    assert_eq!(cfg.app.name, "desk");
    assert_eq!(cfg.app.env, "production");
    assert_eq!(cfg.app.log_level, Some("debug".to_string()));
}

#[test]
fn test_env_defaults_to_development() {
    let yaml = r#"
app:
  name: desk

api:
  base_url: "https://portal.example.com/api"
"#;
    let cfg = from_yaml(yaml).unwrap();
    assert_eq!(cfg.app.env, "development");
}

#[test]
fn test_optional_sections_default() {
    let cfg = from_yaml(&minimal_valid_yaml()).unwrap();

    assert!(cfg.broker.cluster.is_none());
    assert!(!cfg.feed.enabled);
    assert_eq!(cfg.polling.user_interval, Duration::ZERO);
    assert!(cfg.notification.chat_sound);
    assert!(cfg.notification.toasts);
}

#[test]
fn test_load_broker_fields() {
    let yaml = r#"
app:
  name: desk

api:
  base_url: "https://portal.example.com/api"
  timeout: 20s

broker:
  cluster: eu
  auth_endpoint: /broadcasting/auth
  event_namespace: "App\\Events\\"
  reconnect_delay: 3s
  max_reconnect_attempts: 4
"#;
    let cfg = from_yaml(yaml).unwrap();

    assert_eq!(cfg.api.timeout, Duration::from_secs(20));
    assert_eq!(cfg.broker.cluster.as_deref(), Some("eu"));
    assert_eq!(cfg.broker.auth_endpoint.as_deref(), Some("/broadcasting/auth"));
    assert_eq!(cfg.broker.event_namespace.as_deref(), Some("App\\Events\\"));
    assert_eq!(cfg.broker.reconnect_delay, Duration::from_secs(3));
    assert_eq!(cfg.broker.max_reconnect_attempts, Some(4));
    // secrets never come from yaml
    assert!(cfg.broker.app_key.is_empty());
}

#[test]
fn test_load_feed_and_polling_fields() {
    let yaml = r#"
app:
  name: desk

api:
  base_url: "https://portal.example.com/api"

feed:
  enabled: true
  url: "wss://feed.example.com/stream"
  reconnect_delay: 2s
  max_reconnect_attempts: 5

polling:
  user_interval: 15
  chat_unread_interval: 1m
"#;
    let cfg = from_yaml(yaml).unwrap();

    assert!(cfg.feed.enabled);
    assert_eq!(cfg.feed.url.as_deref(), Some("wss://feed.example.com/stream"));
    assert_eq!(cfg.feed.reconnect_delay, Duration::from_secs(2));
    assert_eq!(cfg.feed.max_reconnect_attempts, Some(5));
    assert_eq!(cfg.polling.user_interval, Duration::from_secs(15));
    assert_eq!(cfg.polling.chat_unread_interval, Duration::from_secs(60));
}

#[test]
fn test_load_notification_fields() {
    let yaml = r#"
app:
  name: desk

api:
  base_url: "https://portal.example.com/api"

notification:
  chat_sound: false
"#;
    let cfg = from_yaml(yaml).unwrap();

    assert!(!cfg.notification.chat_sound);
    assert!(cfg.notification.toasts);
    assert!(cfg.notification.banners);
}

#[test]
fn test_missing_api_section_fails_to_parse() {
    let yaml = r#"
app:
  name: desk
"#;
    assert!(from_yaml(yaml).is_err());
}

// ==================== Validation tests ====================

#[test]
fn test_validate_minimal_config() {
    let cfg = from_yaml(&minimal_valid_yaml()).unwrap();
    assert!(cfg.validate().is_ok());
}

#[test]
fn test_validate_empty_name() {
    let mut cfg = from_yaml(&minimal_valid_yaml()).unwrap();
    cfg.app.name = String::new();

    let err = cfg.validate().unwrap_err();
    assert!(err.to_string().contains("app.name is required"));
}

#[test]
fn test_validate_non_http_base_url() {
    let mut cfg = from_yaml(&minimal_valid_yaml()).unwrap();
    cfg.api.base_url = "ftp://portal.example.com".to_string();

    let err = cfg.validate().unwrap_err();
    assert!(err.to_string().contains("http(s)"));
}

#[test]
fn test_validate_production_requires_token() {
    let mut cfg = from_yaml(&minimal_valid_yaml()).unwrap();
    cfg.app.env = "production".to_string();

    let err = cfg.validate().unwrap_err();
    assert!(err.to_string().contains("PORTAL_API_TOKEN"));

    cfg.api.token = "secret".to_string();
    assert!(cfg.validate().is_ok());
}

#[test]
fn test_validate_enabled_feed_requires_url() {
    let mut cfg = from_yaml(&minimal_valid_yaml()).unwrap();
    cfg.feed.enabled = true;

    let err = cfg.validate().unwrap_err();
    assert!(err.to_string().contains("feed.url"));
}

#[test]
fn test_validate_missing_broker_key_is_not_an_error() {
    let cfg = from_yaml(&minimal_valid_yaml()).unwrap();
    assert!(cfg.broker.app_key.is_empty());
    assert!(cfg.validate().is_ok());
}

#[test]
fn test_validate_zero_reconnect_attempts() {
    let mut cfg = from_yaml(&minimal_valid_yaml()).unwrap();
    cfg.broker.max_reconnect_attempts = Some(0);
    assert!(cfg.validate().is_err());
}

// ==================== File loading tests ====================

#[test]
fn test_load_from_file() {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(minimal_valid_yaml().as_bytes()).unwrap();

    let cfg = Config::load(file.path().to_str().unwrap()).unwrap();
    assert_eq!(cfg.app.name, "desk");
    assert_eq!(cfg.api.base_url, "https://portal.example.com/api");
}

#[test]
fn test_load_missing_file() {
    let result = Config::load("/nonexistent/wallet-desk.yaml");
    assert!(matches!(result, Err(ConfigError::ReadFile(_))));
}

#[test]
fn test_load_invalid_yaml() {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(b"app: [unclosed").unwrap();

    let result = Config::load(file.path().to_str().unwrap());
    assert!(matches!(result, Err(ConfigError::Parse(_))));
}

// ==================== Credentials loading tests ====================

#[test]
fn test_load_credentials_from_env() {
    let yaml = r#"
app:
  name: desk

api:
  base_url: "https://portal.example.com/api"

feed:
  enabled: true
  url: "wss://feed.example.com/stream"
"#;
    let mut cfg = from_yaml(yaml).unwrap();

    // Set env vars (unsafe because modifying env is not thread-safe)
    unsafe {
        env::set_var("PORTAL_API_TOKEN", "token_123");
        env::set_var("BROKER_APP_KEY", "app_key_456");
        env::set_var("BROKER_APP_SECRET", "app_secret_789");
        env::set_var("FEED_API_KEY", "feed_key_012");
    }

    cfg.load_credentials_from_env();

    assert_eq!(cfg.api.token, "token_123");
    assert_eq!(cfg.broker.app_key, "app_key_456");
    assert_eq!(cfg.broker.app_secret, "app_secret_789");
    assert_eq!(cfg.feed.api_key, "feed_key_012");

    unsafe {
        env::remove_var("PORTAL_API_TOKEN");
        env::remove_var("BROKER_APP_KEY");
        env::remove_var("BROKER_APP_SECRET");
        env::remove_var("FEED_API_KEY");
    }
}
