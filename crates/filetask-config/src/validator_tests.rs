use super::*;

#[test]
fn test_validate_default_config() {
    let config = Config::default();
    let result = ConfigValidator::validate(&config);
    assert!(result.is_valid());
    assert!(result.warnings.is_empty());
}

#[test]
fn test_validate_empty_db_path() {
    let mut config = Config::default();
    config.storage.db_path = Default::default();

    let result = ConfigValidator::validate(&config);
    assert!(!result.is_valid());
    assert!(result.errors.iter().any(|e| e.path == "storage.db_path"));
}

#[test]
fn test_validate_progress_step_bounds() {
    let mut config = Config::default();
    config.worker.progress_step = 0;
    assert!(!ConfigValidator::validate(&config).is_valid());

    config.worker.progress_step = 101;
    assert!(!ConfigValidator::validate(&config).is_valid());

    config.worker.progress_step = 10;
    assert!(ConfigValidator::validate(&config).is_valid());
}

#[test]
fn test_validate_empty_media_suffixes() {
    let mut config = Config::default();
    config.worker.media_suffixes.clear();

    let result = ConfigValidator::validate(&config);
    assert!(result.errors.iter().any(|e| e.path == "worker.media_suffixes"));
}

#[test]
fn test_overlapping_suffix_is_warning() {
    let mut config = Config::default();
    config.worker.copy_suffixes.push("MKV".to_string());

    let result = ConfigValidator::validate(&config);
    assert!(result.is_valid());
    assert_eq!(result.warnings.len(), 1);
    assert_eq!(result.warnings[0].path, "worker.copy_suffixes");
}

#[test]
fn test_zero_shutdown_timeout_is_warning() {
    let mut config = Config::default();
    config.queue.shutdown_timeout_secs = 0;

    let result = ConfigValidator::validate(&config);
    assert!(result.is_valid());
    assert!(
        result
            .warnings
            .iter()
            .any(|w| w.path == "queue.shutdown_timeout_secs")
    );
}

#[test]
fn test_into_result_reports_first_error() {
    let mut config = Config::default();
    config.worker.progress_step = 0;

    let err = ConfigValidator::validate(&config).into_result().unwrap_err();
    assert!(err.to_string().contains("worker.progress_step"));
}

#[test]
fn test_validate_api_address() {
    let mut config = Config::default();
    config.api.port = 0;
    let result = ConfigValidator::validate(&config);
    assert!(result.errors.iter().any(|e| e.path == "api.port"));

    config.api.port = 7979;
    config.api.host = " ".into();
    let result = ConfigValidator::validate(&config);
    assert!(result.errors.iter().any(|e| e.path == "api.host"));
}
