//! Configuration loading through figment: file, environment, validation.

use std::io::Write;

use microloop::domain::models::Severity;
use microloop::ConfigLoader;
use tempfile::NamedTempFile;

fn config_file(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn test_file_values_override_defaults() {
    let file = config_file(
        r"
loop_policy:
  retry_ceiling: 5
  tunneling_threshold: 6.5
polling:
  initial_interval_ms: 500
  max_interval_ms: 4000
reviewer:
  min_quality_score: 7.0
  blocking_severity: major
",
    );

    let config = temp_env::with_vars_unset(
        ["MICROLOOP_LOOP_POLICY__RETRY_CEILING", "MICROLOOP_WORKER__BASE_URL"],
        || ConfigLoader::load_from_file(file.path()).unwrap(),
    );

    assert_eq!(config.loop_policy.retry_ceiling, 5);
    assert!((config.loop_policy.tunneling_threshold - 6.5).abs() < f64::EPSILON);
    assert_eq!(config.loop_policy.window_size, 3);
    assert_eq!(config.loop_policy.tunneling_retry_cost, 2);
    assert_eq!(config.polling.initial_interval_ms, 500);
    assert_eq!(config.polling.max_interval_ms, 4000);
    assert_eq!(config.reviewer.blocking_severity, Severity::Major);
}

#[test]
fn test_environment_overrides_file() {
    let file = config_file("loop_policy:\n  retry_ceiling: 5\n");

    let config = temp_env::with_vars(
        [
            ("MICROLOOP_LOOP_POLICY__RETRY_CEILING", Some("1")),
            ("MICROLOOP_WORKER__BASE_URL", Some("http://worker.internal:9000")),
        ],
        || ConfigLoader::load_from_file(file.path()).unwrap(),
    );

    assert_eq!(config.loop_policy.retry_ceiling, 1);
    assert_eq!(config.worker.base_url, "http://worker.internal:9000");
}

#[test]
fn test_invalid_values_are_rejected() {
    let file = config_file("loop_policy:\n  window_size: 1\n");
    let err = temp_env::with_vars_unset(["MICROLOOP_LOOP_POLICY__WINDOW_SIZE"], || {
        ConfigLoader::load_from_file(file.path()).unwrap_err()
    });
    assert!(format!("{err:#}").contains("window_size"));

    let file = config_file("polling:\n  initial_interval_ms: 9000\n  max_interval_ms: 100\n");
    let err = ConfigLoader::load_from_file(file.path()).unwrap_err();
    assert!(format!("{err:#}").contains("initial_interval_ms"));
}

#[test]
fn test_malformed_yaml_is_an_error() {
    let file = config_file("loop_policy: [not, a, map\n");
    assert!(ConfigLoader::load_from_file(file.path()).is_err());
}
