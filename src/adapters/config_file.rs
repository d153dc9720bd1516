//! JSON config file adapter.
//!
//! Implements [`ConfigPort`] over a single JSON file.  A missing file
//! yields defaults; a file that does not parse or does not validate is an
//! error, never silently replaced.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::app::ports::{ConfigError, ConfigPort};
use crate::config::DeviceConfig;

pub struct JsonConfigFile {
    path: PathBuf,
}

impl JsonConfigFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigPort for JsonConfigFile {
    fn load(&self) -> Result<DeviceConfig, ConfigError> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("ConfigFile: {} not found, using defaults", self.path.display());
                return Ok(DeviceConfig::default());
            }
            Err(e) => {
                warn!("ConfigFile: cannot read {}: {}", self.path.display(), e);
                return Err(ConfigError::IoError);
            }
        };
        let cfg: DeviceConfig = serde_json::from_slice(&bytes).map_err(|e| {
            warn!("ConfigFile: {} is corrupt: {}", self.path.display(), e);
            ConfigError::Corrupted
        })?;
        cfg.validate()?;
        info!("ConfigFile: loaded {}", self.path.display());
        Ok(cfg)
    }

    fn save(&self, config: &DeviceConfig) -> Result<(), ConfigError> {
        config.validate()?;
        let text = serde_json::to_string(config).map_err(|_| ConfigError::IoError)?;
        std::fs::write(&self.path, text).map_err(|e| {
            warn!("ConfigFile: cannot write {}: {}", self.path.display(), e);
            ConfigError::IoError
        })?;
        info!("ConfigFile: saved {}", self.path.display());
        Ok(())
    }
}
