use crate::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

/// Link configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkConfig {
    /// Meters per host world unit, applied to positions only
    #[serde(default = "default_metres_per_unit")]
    pub metres_per_unit: f32,

    /// Name shown by the voice client for the linked application
    #[serde(default = "default_application_name")]
    pub application_name: String,

    /// Longer description written next to the name
    #[serde(default = "default_application_description")]
    pub application_description: String,

    /// Segment name override; the platform default is used when unset
    #[serde(default)]
    pub segment_name: Option<String>,
}

fn default_metres_per_unit() -> f32 {
    crate::DEFAULT_METRES_PER_UNIT
}

fn default_application_name() -> String {
    "OpenSpades".to_string()
}

fn default_application_description() -> String {
    "OpenSpades Link plugin.".to_string()
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            metres_per_unit: default_metres_per_unit(),
            application_name: default_application_name(),
            application_description: default_application_description(),
            segment_name: None,
        }
    }
}

impl LinkConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: LinkConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading link configuration from {}", path.display());

        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)
            .map_err(|e| CoreError::Config(format!("{}: {}", path.display(), e)))?;

        info!("Loaded link configuration from {}", path.display());
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if !self.metres_per_unit.is_finite() || self.metres_per_unit <= 0.0 {
            return Err(CoreError::Config(format!(
                "metres_per_unit must be a positive number, got {}",
                self.metres_per_unit
            )));
        }

        if let Some(name) = &self.segment_name {
            if name.is_empty() {
                return Err(CoreError::Config("segment_name must not be empty".to_string()));
            }
        }

        Ok(())
    }
}
