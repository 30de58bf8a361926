use std::time::Duration;

use assert_matches::assert_matches;

use jacow_harvester::config::{Config, ConfigLoader, ConfigOverrides};
use jacow_harvester::error::HarvestError;

#[test]
fn file_values_then_cli_overrides() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("harvest.json");
    std::fs::write(
        &path,
        r#"{
            "base_url": "https://proceedings.jacow.org/srf2023/",
            "conference": "SRF2023",
            "max_retries": 5,
            "min_delay_ms": 0,
            "max_delay_ms": 250,
            "sessions": ["mopmb"],
            "limit": 4
        }"#,
    )
    .unwrap();

    let resolved = ConfigLoader::resolve_with(
        path.to_str(),
        ConfigOverrides {
            output_dir: Some("custom_out".to_string()),
            sessions: vec!["tupta".to_string(), "SUSPB".to_string()],
            limit: None,
            no_download: true,
            save_page_text: true,
        },
    )
    .unwrap();

    assert_eq!(resolved.conference, "SRF2023");
    assert_eq!(resolved.output_dir.as_str(), "custom_out");
    assert_eq!(resolved.max_retries, 5);
    assert_eq!(resolved.max_delay, Duration::from_millis(250));
    assert_eq!(resolved.limit, Some(4));
    let codes: Vec<_> = resolved.sessions.iter().map(|code| code.as_str()).collect();
    assert_eq!(codes, vec!["TUPTA", "SUSPB"]);
    assert!(!resolved.download);
    assert!(resolved.save_page_text);
    assert_eq!(
        resolved.session_url(&resolved.sessions[0]).unwrap().as_str(),
        "https://proceedings.jacow.org/srf2023/html/tupta.htm"
    );
}

#[test]
fn default_output_dir_follows_conference() {
    let resolved = ConfigLoader::resolve_config(Config {
        conference: Some("IPAC2024".to_string()),
        ..Config::default()
    })
    .unwrap();
    assert_eq!(resolved.output_dir.as_str(), "IPAC2024_Data");
    assert!(resolved.download);
    assert!(!resolved.save_page_text);
}

#[test]
fn explicit_missing_file_is_an_error() {
    let temp = tempfile::tempdir().unwrap();
    let missing = temp.path().join("nope.json");
    assert_matches!(
        ConfigLoader::resolve(missing.to_str()),
        Err(HarvestError::ConfigRead(_))
    );
}

#[test]
fn malformed_json_is_a_parse_error() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("bad.json");
    std::fs::write(&path, "{ not json").unwrap();
    assert_matches!(
        ConfigLoader::resolve(path.to_str()),
        Err(HarvestError::ConfigParse(_))
    );
}

#[test]
fn invalid_values_are_rejected() {
    assert_matches!(
        ConfigLoader::resolve_config(Config {
            base_url: Some("https://proceedings.jacow.org/srf2019".to_string()),
            ..Config::default()
        }),
        Err(HarvestError::InvalidConfig(_))
    );
    assert_matches!(
        ConfigLoader::resolve_config(Config {
            min_delay_ms: Some(3000),
            max_delay_ms: Some(1000),
            ..Config::default()
        }),
        Err(HarvestError::InvalidConfig(_))
    );
    assert_matches!(
        ConfigLoader::resolve_config(Config {
            max_retries: Some(0),
            ..Config::default()
        }),
        Err(HarvestError::InvalidConfig(_))
    );
    assert_matches!(
        ConfigLoader::resolve_config(Config {
            sessions: vec!["not a code".to_string()],
            ..Config::default()
        }),
        Err(HarvestError::InvalidSessionCode(_))
    );
}
