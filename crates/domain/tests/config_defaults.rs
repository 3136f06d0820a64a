use cg_domain::config::{Config, StorageBackend};

#[test]
fn default_host_is_localhost() {
    let config = Config::default();
    assert_eq!(config.server.host, "127.0.0.1");
}

#[test]
fn explicit_zero_host_parses() {
    let toml_str = r#"
[server]
host = "0.0.0.0"
port = 3210
"#;
    let config: Config = toml::from_str(toml_str).unwrap();
    assert_eq!(config.server.host, "0.0.0.0");
    assert_eq!(config.server.port, 3210);
}

#[test]
fn default_cors_allows_only_localhost() {
    let config = Config::default();
    assert!(config.server.cors.allowed_origins.contains(&"http://localhost:*".to_string()));
    assert!(config.server.cors.allowed_origins.contains(&"http://127.0.0.1:*".to_string()));
}

#[test]
fn llm_defaults_match_upstream_contract() {
    let config = Config::default();
    assert_eq!(config.llm.model, "gpt-3.5-turbo");
    assert_eq!(config.llm.max_tokens, 300);
    assert_eq!(config.llm.api_key_env, "OPENAI_API_KEY");
    assert_eq!(config.llm.system_prompt, "You are a helpful assistant.");
}

#[test]
fn context_defaults() {
    let config = Config::default();
    assert_eq!(config.context.max_turns, 10);
    assert_eq!(config.context.max_input_chars, 2000);
    assert_eq!(config.context.name_max_chars, 20);
}

#[test]
fn entitlements_parse_from_partial_table() {
    let toml_str = r#"
[entitlements]
guest_daily_minutes = 5
"#;
    let config: Config = toml::from_str(toml_str).unwrap();
    assert_eq!(config.entitlements.guest_daily_minutes, 5);
    assert_eq!(config.entitlements.unsubscribed_daily_minutes, 30);
    assert_eq!(config.entitlements.period_timezone, "UTC");
}

#[test]
fn storage_backend_parses_lowercase() {
    let toml_str = r#"
[storage]
backend = "memory"
"#;
    let config: Config = toml::from_str(toml_str).unwrap();
    assert_eq!(config.storage.backend, StorageBackend::Memory);
    assert_eq!(Config::default().storage.backend, StorageBackend::Sqlite);
}

#[test]
fn unknown_storage_backend_is_rejected() {
    let toml_str = r#"
[storage]
backend = "postgres"
"#;
    assert!(toml::from_str::<Config>(toml_str).is_err());
}
