use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use mediadupe::config::{Config, ConfigError};
use std::fs;
use std::path::PathBuf;
use tempfile::tempdir;

#[test]
fn test_config_load_defaults() {
    // Use figment directly without Env to avoid interference from other tests
    let figment = Figment::from(Serialized::defaults(Config::default()));
    let config: Config = figment.extract().unwrap();
    assert_eq!(config, Config::default());
    assert_eq!(config.database_path(), PathBuf::from("./mediadupe.db"));
}

#[test]
fn test_config_load_from_toml() {
    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    fs::write(
        &config_path,
        r#"
base_dir = "/srv/media"
hash_size = 16
idle_interval_secs = 0.25
"#,
    )
    .unwrap();

    let figment =
        Figment::from(Serialized::defaults(Config::default())).merge(Toml::file(&config_path));
    let config: Config = figment.extract().unwrap();

    assert_eq!(config.base_dir, PathBuf::from("/srv/media"));
    assert_eq!(config.hash_size, 16);
    assert_eq!(config.idle_interval_secs, 0.25);
    // Untouched keys keep their defaults.
    assert_eq!(config.match_threshold, 4);
    assert_eq!(config.database_path(), PathBuf::from("/srv/media/mediadupe.db"));
}

#[test]
fn test_config_env_overrides_file() {
    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    fs::write(&config_path, "match_threshold = 6\nchunk_size = 4096\n").unwrap();

    std::env::set_var("MDTEST_MATCH_THRESHOLD", "3");

    let figment = Figment::from(Serialized::defaults(Config::default()))
        .merge(Toml::file(&config_path))
        .merge(Env::prefixed("MDTEST_").split("__"));
    let config: Config = figment.extract().unwrap();

    assert_eq!(config.match_threshold, 3);
    assert_eq!(config.chunk_size, 4096);

    std::env::remove_var("MDTEST_MATCH_THRESHOLD");
}

#[test]
fn test_config_load_validates() {
    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    fs::write(&config_path, "hash_size = 10\n").unwrap();

    match Config::load(Some(&config_path)) {
        Err(ConfigError::InvalidHashSize(10)) => {}
        other => panic!("Expected InvalidHashSize, got {:?}", other),
    }
}

#[test]
fn test_config_load_rejects_wrong_types() {
    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    fs::write(&config_path, "hash_size = \"big\"\n").unwrap();

    assert!(matches!(
        Config::load(Some(&config_path)),
        Err(ConfigError::Extract(_))
    ));
}

#[test]
fn test_config_missing_file_uses_defaults() {
    let temp_dir = tempdir().unwrap();
    let config = Config::load(Some(&temp_dir.path().join("absent.toml"))).unwrap();
    assert_eq!(config.hash_size, 8);
}
