//! 配置加載集成測試

use std::io::Write;
use std::sync::Mutex;

use trading_engine::config::{
    ApplicationConfig, ConfigExt, ConfigLoader, EngineConfig, Environment, Validator,
};

// CONFIG_DIR 是進程級狀態，兩個測試不能並行改動
static ENV_LOCK: Mutex<()> = Mutex::new(());

fn write_config(dir: &std::path::Path, contents: &str) {
    let mut file = std::fs::File::create(dir.join("development.toml")).unwrap();
    writeln!(file, "{}", contents).unwrap();
}

#[test]
fn test_load_development_config_from_dir() {
    let _guard = ENV_LOCK.lock().unwrap();
    let dir = tempfile::tempdir().unwrap();
    write_config(
        dir.path(),
        r#"
[engine]
poll_interval_secs = 2
price_retry_limit = 5
price_retry_interval_secs = 1
live_price_feed = "tick"

[log]
level = "debug"
format = "pretty"
"#,
    );

    std::env::set_var("CONFIG_DIR", dir.path());
    let config = ConfigLoader::load(Environment::Development).unwrap();
    std::env::remove_var("CONFIG_DIR");

    let engine: EngineConfig = config.get_section("engine").unwrap();
    assert_eq!(engine.poll_interval_secs, 2);
    assert_eq!(engine.price_retry_limit, 5);

    let app: ApplicationConfig = config.try_deserialize().unwrap();
    assert!(app.validate().is_ok());
    assert_eq!(app.log.level, "debug");
}

#[test]
fn test_partial_config_falls_back_to_defaults() {
    let _guard = ENV_LOCK.lock().unwrap();
    let dir = tempfile::tempdir().unwrap();
    write_config(
        dir.path(),
        r#"
[engine]
poll_interval_secs = 3
"#,
    );

    std::env::set_var("CONFIG_DIR", dir.path());
    let config = ConfigLoader::load(Environment::Development).unwrap();
    std::env::remove_var("CONFIG_DIR");

    let app: ApplicationConfig = config.try_deserialize().unwrap();
    assert_eq!(app.engine.poll_interval_secs, 3);
    assert_eq!(app.engine.price_retry_limit, 20);
    assert_eq!(app.engine.live_price_feed, "tick");
    assert_eq!(app.log.level, "info");
}
