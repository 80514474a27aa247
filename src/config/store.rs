use std::fs::File;
use std::path::{Path, PathBuf};

use super::error::ConfigError;
use super::operator_config::OperatorConfig;

#[cfg_attr(test, mockall::automock)]
pub trait ConfigStore {
    fn load(&self) -> Result<OperatorConfig, ConfigError>;
}

/// Configuration read from a YAML file on every load, so edits are picked up by the next
/// reconciliation.
pub struct ConfigStoreFile {
    path: PathBuf,
}

impl ConfigStoreFile {
    pub fn new(file_path: &Path) -> Self {
        Self {
            path: file_path.to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigStore for ConfigStoreFile {
    fn load(&self) -> Result<OperatorConfig, ConfigError> {
        let file = File::open(&self.path)?;
        Ok(serde_yaml::from_reader(file)?)
    }
}
