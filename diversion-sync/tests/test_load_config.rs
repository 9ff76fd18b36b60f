use diversion_sync::gateway::{HttpGateway, API_URL_ENV, TOKEN_ENV};
use diversion_sync::load_config::load_config;
use diversion_sync_core::session::SourceRole;
use serial_test::serial;
use std::env;
use std::fs::write;
use std::path::Path;
use tempfile::NamedTempFile;

fn config_file(yaml: &str) -> NamedTempFile {
    let config_file = NamedTempFile::new().expect("temp file");
    write(config_file.path(), yaml).unwrap();
    config_file
}

/// A full config with both sections and two sources loads with every field in place.
#[tokio::test]
#[serial]
async fn test_load_config_success_with_primary_and_library() {
    let config_file = config_file(
        r#"
api:
  base_url: https://dv.example.test/v0
settings:
  commit_window: 25
sources:
  - role: primary
    repository_id: dv.repo.1
    script_path: ci/build.groovy
  - role: auxiliary
    repository_id: dv.repo.2
    branch: dv.branch.8
    library_path: Meta/Jenkins/SharedLibs
"#,
    );

    let config = load_config(config_file.path()).expect("Config should load");

    assert_eq!(config.api.base_url.as_deref(), Some("https://dv.example.test/v0"));
    assert_eq!(config.settings.commit_window, 25);
    assert_eq!(config.settings.script_extension, "groovy");
    assert_eq!(config.sources.len(), 2);

    let primary = &config.sources[0];
    assert_eq!(primary.role, Some(SourceRole::Primary));
    assert_eq!(primary.branch, "main");
    assert_eq!(primary.script_path.as_deref(), Some("ci/build.groovy"));

    let library = &config.sources[1];
    assert_eq!(library.role, Some(SourceRole::Auxiliary));
    assert_eq!(library.branch, "dv.branch.8");
    assert_eq!(library.library_path.as_deref(), Some("Meta/Jenkins/SharedLibs"));
    assert_eq!(
        config.primary_repository_id(Path::new("/builds/app")),
        Some("dv.repo.1")
    );
}

/// Omitted sections take their defaults.
#[tokio::test]
#[serial]
async fn test_load_config_defaults() {
    let config_file = config_file("sources:\n  - repository_id: dv.repo.1\n");

    let config = load_config(config_file.path()).expect("Minimal config should load");
    assert_eq!(config.api.base_url, None);
    assert_eq!(config.settings.commit_window, 100);
    assert_eq!(config.settings.default_script_name, "Jenkinsfile");
    assert_eq!(
        config.settings.conventional_dirs,
        vec!["vars".to_string(), "src".to_string(), "resources".to_string()]
    );
    assert_eq!(config.sources[0].role, None);
}

#[tokio::test]
#[serial]
async fn test_load_config_errors_on_empty_sources() {
    let config_file = config_file("sources: []\n");

    let err = load_config(config_file.path()).unwrap_err();
    assert!(
        err.to_string().contains("at least one source"),
        "Validation error expected, got: {err}"
    );
}

#[tokio::test]
#[serial]
async fn test_load_config_errors_on_two_primaries() {
    let config_file = config_file(
        "sources:\n  - role: primary\n    repository_id: a\n  - role: primary\n    repository_id: b\n",
    );

    let err = load_config(config_file.path()).unwrap_err();
    assert!(err.to_string().contains("primary"), "got: {err}");
}

/// If the config file is not valid YAML, load_config errors and reports as such.
#[tokio::test]
#[serial]
async fn test_load_config_errors_for_invalid_file() {
    let config_file = config_file("not-yaml: [:::");

    let err = load_config(config_file.path()).unwrap_err();
    let msg = err.to_string();
    assert!(
        msg.contains("parse") || msg.contains("YAML"),
        "Parse error expected, got: {msg}"
    );
}

#[tokio::test]
#[serial]
async fn test_gateway_requires_access_token() {
    env::remove_var(TOKEN_ENV);
    let err = HttpGateway::new_from_env(None).err().expect("missing token must fail");
    assert!(err.to_string().contains(TOKEN_ENV));

    env::set_var(TOKEN_ENV, "token-for-tests");
    env::set_var(API_URL_ENV, "http://127.0.0.1:9/v0");
    assert!(HttpGateway::new_from_env(Some("https://ignored.example")).is_ok());
    env::remove_var(API_URL_ENV);
    env::remove_var(TOKEN_ENV);
}
