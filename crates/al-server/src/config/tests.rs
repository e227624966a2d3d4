use super::*;

#[test]
fn test_parse_full_config() {
    let toml_str = r#"
[server]
listen = "127.0.0.1:9090"

[storage]
path = "/var/lib/autolabel/projects.db"

[models]
seed = 42

[logging]
level = "debug"
format = "pretty"

[[users]]
id = "alice"
api_key = "al-sk-alice0000000000000000"
admin = true

[[users]]
id = "bob"
api_key = "al-sk-bob000000000000000000"
"#;

    let config: AppConfig = toml::from_str(toml_str).unwrap();

    assert_eq!(config.server.listen, "127.0.0.1:9090");
    assert_eq!(config.storage.path, "/var/lib/autolabel/projects.db");
    assert_eq!(config.models.seed, Some(42));
    assert_eq!(config.logging.level, "debug");
    assert_eq!(config.logging.format, "pretty");

    assert_eq!(config.users.len(), 2);
    assert_eq!(config.users[0].id, "alice");
    assert!(config.users[0].admin);
    assert_eq!(config.users[1].api_key, "al-sk-bob000000000000000000");
    assert!(!config.users[1].admin);
}

#[test]
fn test_defaults_applied() {
    let toml_str = r#"
[[users]]
id = "alice"
api_key = "al-sk-alice0000000000000000"
"#;

    let config: AppConfig = toml::from_str(toml_str).unwrap();

    assert_eq!(config.server.listen, "0.0.0.0:8000");
    assert_eq!(config.storage.path, "autolabel.db");
    assert_eq!(config.models.seed, None);
    assert_eq!(config.logging.level, "info");
    assert_eq!(config.logging.format, "json");
}

#[test]
fn test_missing_users_rejected() {
    let toml_str = r#"
[server]
listen = "127.0.0.1:9090"
"#;

    let result: Result<AppConfig, _> = toml::from_str(toml_str);
    assert!(result.is_err());
}

#[test]
fn test_user_without_api_key_rejected() {
    let toml_str = r#"
[[users]]
id = "alice"
"#;

    let result: Result<AppConfig, _> = toml::from_str(toml_str);
    assert!(result.is_err());
}
