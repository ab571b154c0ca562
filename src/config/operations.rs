//! Config loading, validation, and derived values.

use super::model::Config;
use super::types::FAILURE_LOG_DIR_NAME;
use crate::error::{RadorchError, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;

impl Config {
    /// Load config from a YAML file.
    ///
    /// Unknown fields in the YAML are silently ignored for forward compatibility.
    ///
    /// # Returns
    ///
    /// * `Ok(Config)` - Successfully loaded and validated config
    /// * `Err(RadorchError::UserError)` - Read error, parse error, or validation failure
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path).map_err(|e| {
            RadorchError::UserError(format!(
                "failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;

        Self::from_yaml(&content)
    }

    /// Load config if the file exists, otherwise return defaults.
    ///
    /// A file that exists but does not parse or validate is reported and
    /// ignored.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            return Self::default();
        }

        Self::load(path).unwrap_or_else(|e| {
            tracing::warn!(path = %path.display(), error = %e, "ignoring invalid config");
            Self::default()
        })
    }

    /// Parse config from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        // An empty file deserializes to unit, not a mapping.
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Config = serde_yaml::from_str(yaml)
            .map_err(|e| RadorchError::UserError(format!("failed to parse config YAML: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate config values and return error on invalid values.
    ///
    /// Validation rules:
    /// - `max_concurrency`, `activity_preview_chars`, `reject_reason_max_chars`,
    ///   `command_timeout_seconds` and `dashboard_interval_ms` must be positive
    /// - every command name must be non-empty
    /// - `worker_command` must split into at least one word
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("max_concurrency", self.max_concurrency as u64),
            ("activity_preview_chars", self.activity_preview_chars as u64),
            ("reject_reason_max_chars", self.reject_reason_max_chars as u64),
            ("command_timeout_seconds", self.command_timeout_seconds),
            ("dashboard_interval_ms", self.dashboard_interval_ms),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(RadorchError::UserError(format!(
                    "config validation failed: {} must be greater than 0",
                    name
                )));
            }
        }

        let commands = [
            ("plan_command", &self.plan_command),
            ("rad_command", &self.rad_command),
            ("context_command", &self.context_command),
            ("remote", &self.remote),
            ("patch_refspec", &self.patch_refspec),
        ];
        for (name, value) in commands {
            if value.trim().is_empty() {
                return Err(RadorchError::UserError(format!(
                    "config validation failed: {} must not be empty",
                    name
                )));
            }
        }

        self.worker_invocation().map(|_| ())
    }

    /// Worker program and leading arguments.
    ///
    /// `worker_command` is split with shell quoting rules, then `worker_args`
    /// are appended.
    pub fn worker_invocation(&self) -> Result<(String, Vec<String>)> {
        let mut words = shell_words::split(&self.worker_command).map_err(|e| {
            RadorchError::UserError(format!(
                "config validation failed: worker_command '{}' is not valid shell syntax: {}",
                self.worker_command, e
            ))
        })?;

        if words.is_empty() {
            return Err(RadorchError::UserError(
                "config validation failed: worker_command must not be empty".to_string(),
            ));
        }

        let program = words.remove(0);
        words.extend(self.worker_args.iter().cloned());
        Ok((program, words))
    }

    /// Directory holding per-plan failure logs.
    pub fn failure_log_root(&self) -> PathBuf {
        match &self.failure_log_dir {
            Some(dir) if !dir.is_empty() => PathBuf::from(dir),
            _ => std::env::temp_dir().join(FAILURE_LOG_DIR_NAME),
        }
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_seconds)
    }

    pub fn terminate_grace(&self) -> Duration {
        Duration::from_secs(self.terminate_grace_seconds)
    }

    pub fn dashboard_interval(&self) -> Duration {
        Duration::from_millis(self.dashboard_interval_ms)
    }

    pub fn wait_poll(&self) -> Duration {
        Duration::from_secs(self.wait_poll_seconds)
    }
}
