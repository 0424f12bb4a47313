use std::io::Write;

use fieldwright_runtime::{ConfigError, RuntimeConfig};
use tempfile::Builder;

fn write(suffix: &str, contents: &str) -> tempfile::NamedTempFile {
    let mut file = Builder::new().suffix(suffix).tempfile().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn loads_yaml_by_extension() {
    let file = write(
        ".yaml",
        "scheduler:\n  rps: 2\n  maxAttempts: 7\nbackfill:\n  maxRangeDays: 31\novertime:\n  otThresholdHours: 8\n",
    );
    let config = RuntimeConfig::load(file.path()).unwrap();
    assert_eq!(config.scheduler.rps, 2.0);
    assert_eq!(config.scheduler.max_attempts, 7);
    assert_eq!(config.backfill.max_range_days, 31);
    assert_eq!(config.overtime.ot_threshold_hours, 8.0);
}

#[test]
fn loads_json_by_extension() {
    let file = write(".json", r#"{"backfill": {"pageSize": 25, "lookbackHours": 12}}"#);
    let config = RuntimeConfig::load(file.path()).unwrap();
    assert_eq!(config.backfill.page_size, 25);
    assert_eq!(config.backfill.lookback_hours, 12);
    assert_eq!(config.scheduler, RuntimeConfig::default().scheduler);
}

#[test]
fn rejects_unknown_formats_and_bad_files() {
    let file = write(".toml", "[scheduler]\nrps = 2\n");
    assert!(matches!(
        RuntimeConfig::load(file.path()),
        Err(ConfigError::UnsupportedFormat(_))
    ));

    let file = write(".yml", "scheduler: [not, a, map]\n");
    assert!(matches!(RuntimeConfig::load(file.path()), Err(ConfigError::Yaml(_))));

    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(
        RuntimeConfig::load(dir.path().join("missing.json")),
        Err(ConfigError::Io { .. })
    ));
}
