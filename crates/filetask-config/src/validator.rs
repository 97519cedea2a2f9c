//! Configuration validation.

use crate::error::ConfigError;
use crate::schema::Config;

/// Validation result.
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: ValidationWarning) {
        self.warnings.push(warning);
    }

    /// Collapse into the first error, if any.
    pub fn into_result(self) -> Result<Vec<ValidationWarning>, ConfigError> {
        match self.errors.into_iter().next() {
            Some(err) => Err(ConfigError::InvalidValue {
                field: err.path,
                message: err.message,
            }),
            None => Ok(self.warnings),
        }
    }
}

/// A validation error.
#[derive(Debug)]
pub struct ValidationError {
    pub path: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// A validation warning.
#[derive(Debug)]
pub struct ValidationWarning {
    pub path: String,
    pub message: String,
}

impl ValidationWarning {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Configuration validator.
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration.
    pub fn validate(config: &Config) -> ValidationResult {
        let mut result = ValidationResult::default();

        Self::validate_storage(config, &mut result);
        Self::validate_queue(config, &mut result);
        Self::validate_worker(config, &mut result);
        Self::validate_api(config, &mut result);

        result
    }

    fn validate_storage(config: &Config, result: &mut ValidationResult) {
        if config.storage.db_path.as_os_str().is_empty() {
            result.add_error(ValidationError::new(
                "storage.db_path",
                "Database path cannot be empty",
            ));
        }
    }

    fn validate_queue(config: &Config, result: &mut ValidationResult) {
        if config.queue.shutdown_timeout_secs == 0 {
            result.add_warning(ValidationWarning::new(
                "queue.shutdown_timeout_secs",
                "shutdown_timeout_secs is 0; running jobs will not get a chance to stop cleanly",
            ));
        }
    }

    fn validate_worker(config: &Config, result: &mut ValidationResult) {
        let worker = &config.worker;

        if worker.progress_step == 0 || worker.progress_step > 100 {
            result.add_error(ValidationError::new(
                "worker.progress_step",
                "progress_step must be between 1 and 100",
            ));
        }

        if worker.media_suffixes.is_empty() {
            result.add_error(ValidationError::new(
                "worker.media_suffixes",
                "At least one media suffix is required",
            ));
        }

        for suffix in &worker.media_suffixes {
            if worker
                .copy_suffixes
                .iter()
                .any(|s| s.eq_ignore_ascii_case(suffix))
            {
                result.add_warning(ValidationWarning::new(
                    "worker.copy_suffixes",
                    format!("'{}' is listed as both media and copy suffix; media wins", suffix),
                ));
            }
        }
    }

    fn validate_api(config: &Config, result: &mut ValidationResult) {
        if config.api.host.trim().is_empty() {
            result.add_error(ValidationError::new("api.host", "API host cannot be empty"));
        }
        if config.api.port == 0 {
            result.add_error(ValidationError::new(
                "api.port",
                "API port must be fixed so other commands can find the running engine",
            ));
        }
    }
}

#[cfg(test)]
#[path = "validator_tests.rs"]
mod tests;
