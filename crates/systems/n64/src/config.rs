//! Session configuration.

use crate::interpreter::RunLimits;
use crate::{HleError, HleResult};
use emu_core::logging::{self, LogConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HleConfig {
    /// Commands per run before bailing out; `None` runs until the list ends
    pub step_budget: Option<u64>,
    pub max_display_list_depth: usize,
    /// Decoded textures kept alive on the backend
    pub texture_cache_capacity: usize,
    pub vi_width: u32,
    pub vi_height: u32,
    /// Log filter such as `"texture=debug,warn"`; `None` leaves logging as is
    pub log_filter: Option<String>,
}

impl Default for HleConfig {
    fn default() -> Self {
        Self {
            step_budget: Some(1_000_000),
            max_display_list_depth: 18,
            texture_cache_capacity: 512,
            vi_width: 320,
            vi_height: 240,
            log_filter: None,
        }
    }
}

impl HleConfig {
    /// Parse a JSON config. Missing fields keep their defaults.
    pub fn from_json_str(json: &str) -> HleResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> HleResult<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    pub fn to_json(&self) -> HleResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> HleResult<()> {
        fs::write(path, self.to_json()?)?;
        Ok(())
    }

    fn validate(&self) -> HleResult<()> {
        if self.max_display_list_depth == 0 {
            return Err(HleError::Config(
                "max_display_list_depth must be at least 1".to_string(),
            ));
        }
        if self.texture_cache_capacity == 0 {
            return Err(HleError::Config(
                "texture_cache_capacity must be at least 1".to_string(),
            ));
        }
        if let Some(filter) = &self.log_filter {
            logging::parse_filter(filter).map_err(HleError::Config)?;
        }
        Ok(())
    }

    /// Apply `log_filter` to the process-wide log levels
    pub fn apply_log_filter(&self) -> HleResult<()> {
        match &self.log_filter {
            Some(filter) => LogConfig::global()
                .apply_filter(filter)
                .map_err(HleError::Config),
            None => Ok(()),
        }
    }

    /// Run limits with an explicit budget taking precedence over `step_budget`
    pub fn run_limits(&self, budget: Option<u64>) -> RunLimits {
        RunLimits {
            max_display_list_depth: self.max_display_list_depth,
            bail_after: budget.or(self.step_budget),
            vi_width: self.vi_width,
            vi_height: self.vi_height,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = HleConfig::default();
        assert_eq!(config.step_budget, Some(1_000_000));
        assert_eq!(config.max_display_list_depth, 18);
        assert_eq!(config.texture_cache_capacity, 512);
        assert_eq!((config.vi_width, config.vi_height), (320, 240));
        assert_eq!(config.log_filter, None);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = HleConfig::from_json_str(r#"{ "vi_width": 640, "step_budget": null }"#).unwrap();
        assert_eq!(config.vi_width, 640);
        assert_eq!(config.vi_height, 240);
        assert_eq!(config.step_budget, None);
        assert_eq!(config.max_display_list_depth, 18);
    }

    #[test]
    fn test_invalid_config() {
        assert!(matches!(
            HleConfig::from_json_str("{ not json"),
            Err(HleError::Json(_))
        ));
        assert!(matches!(
            HleConfig::from_json_str(r#"{ "texture_cache_capacity": 0 }"#),
            Err(HleError::Config(_))
        ));
        assert!(matches!(
            HleConfig::from_file("/nonexistent/hle.json"),
            Err(HleError::Io(_))
        ));
    }

    #[test]
    fn test_log_filter_is_validated() {
        let config =
            HleConfig::from_json_str(r#"{ "log_filter": "texture=debug,stubs=warn" }"#).unwrap();
        assert_eq!(config.log_filter.as_deref(), Some("texture=debug,stubs=warn"));

        assert!(matches!(
            HleConfig::from_json_str(r#"{ "log_filter": "shader=debug" }"#),
            Err(HleError::Config(_))
        ));

        let unvalidated = HleConfig {
            log_filter: Some("rdp=loud".to_string()),
            ..HleConfig::default()
        };
        assert!(matches!(
            unvalidated.apply_log_filter(),
            Err(HleError::Config(_))
        ));
    }

    #[test]
    fn test_run_limits() {
        let config = HleConfig::default();
        assert_eq!(config.run_limits(None).bail_after, Some(1_000_000));
        assert_eq!(config.run_limits(Some(5)).bail_after, Some(5));

        let json = config.to_json().unwrap();
        assert_eq!(HleConfig::from_json_str(&json).unwrap(), config);
    }
}
