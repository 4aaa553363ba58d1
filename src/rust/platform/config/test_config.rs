use super::*;
use crate::services::compile::BackendKind;

#[test]
fn test_defaults_when_no_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let config = AppConfig::load(dir.path()).unwrap();
    assert_eq!(config, AppConfig::default());
    assert!(AppConfig::find(dir.path()).is_none());

    assert_eq!(config.sample_rate(), 44_100);
    assert_eq!(config.channels(), 2);
    assert_eq!(config.buffer_size(), 128);
    assert_eq!(config.paths.entry, PathBuf::from("src/user.h"));
    assert!(config.local.enabled);
    assert!(!config.toolchain.enabled);
    assert!(!config.remote.enabled);
}

#[test]
fn test_priority_toml_over_json_over_dotfile() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join(DOT_CONFIG), "[audio]\nsample_rate = 22050\n").unwrap();
    assert_eq!(AppConfig::load(dir.path()).unwrap().audio.sample_rate, 22_050);

    fs::write(
        dir.path().join(JSON_CONFIG),
        r#"{"audio": {"sample_rate": 32000}}"#,
    )
    .unwrap();
    assert_eq!(AppConfig::load(dir.path()).unwrap().audio.sample_rate, 32_000);

    fs::write(dir.path().join(TOML_CONFIG), "[audio]\nsample_rate = 48000\n").unwrap();
    assert_eq!(AppConfig::load(dir.path()).unwrap().audio.sample_rate, 48_000);
    assert_eq!(
        AppConfig::find(dir.path()).unwrap(),
        dir.path().join(TOML_CONFIG)
    );
}

#[test]
fn test_dotfile_may_hold_json() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join(DOT_CONFIG),
        r#"{"compilation": {"mode": "serverless"}, "remote": {"enabled": true}}"#,
    )
    .unwrap();
    let config = AppConfig::load(dir.path()).unwrap();
    assert_eq!(config.compilation.mode, CompileMode::Remote);
    assert!(config.remote.enabled);
    // untouched sections keep their defaults
    assert_eq!(config.audio, AudioSection::default());
}

#[test]
fn test_invalid_config_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join(TOML_CONFIG), "[audio\nsample_rate = ").unwrap();
    let err = AppConfig::load(dir.path()).unwrap_err();
    assert!(format!("{err:#}").contains("invalid TOML config"));
}

#[test]
fn test_write_toml_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = AppConfig::default();
    config.toolchain.enabled = true;
    config.toolchain.cache_dir = Some(PathBuf::from("/tmp/hear-c-cache"));
    config.compilation.additional_flags = vec!["-Wall".to_string()];

    let path = dir.path().join(TOML_CONFIG);
    config.write_toml(&path).unwrap();
    assert_eq!(AppConfig::load(dir.path()).unwrap(), config);
}

#[test]
fn test_dispatcher_config_mapping() {
    let mut config = AppConfig::default();
    config.toolchain.enabled = true;
    config.toolchain.cdn_url = "https://cdn.example/tc/".to_string();
    config.remote.timeout_ms = 5_000;
    config.local.url = "http://127.0.0.1:9000".to_string();
    config.audio.sample_rate = 48_000;

    let dispatcher = config.dispatcher_config();
    assert_eq!(
        BackendKind::select(
            dispatcher.mode,
            dispatcher.toolchain_enabled,
            dispatcher.remote_enabled
        ),
        BackendKind::Toolchain
    );
    assert_eq!(dispatcher.toolchain.cdn_url, "https://cdn.example/tc/");
    assert_eq!(dispatcher.toolchain.timeout, Duration::from_secs(300));
    assert_eq!(dispatcher.remote.timeout, Duration::from_secs(5));
    assert_eq!(
        dispatcher.local_settings().endpoint,
        "http://127.0.0.1:9000/rebuild"
    );
    assert_eq!(
        dispatcher.options.additional_flags,
        vec!["-DSAMPLE_RATE=48000".to_string()]
    );
}

#[test]
fn test_explicit_sample_rate_flag_is_kept() {
    let mut config = AppConfig::default();
    config.compilation.additional_flags = vec!["-DSAMPLE_RATE=96000".to_string()];
    assert_eq!(
        config.compile_options().additional_flags,
        vec!["-DSAMPLE_RATE=96000".to_string()]
    );
}

#[test]
fn test_audio_values_are_clamped() {
    let mut config = AppConfig::default();
    config.audio.sample_rate = 10;
    config.audio.channels = 0;
    config.audio.buffer_size = 1;
    config.audio.volume = 3.0;
    config.live.debounce_ms = 0;
    assert_eq!(config.sample_rate(), 8_000);
    assert_eq!(config.channels(), 1);
    assert_eq!(config.buffer_size(), 16);
    assert_eq!(config.volume(), 1.0);
    assert_eq!(config.debounce(), Duration::from_millis(10));
}
