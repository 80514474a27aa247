use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::package::PackageName;

#[derive(Error, Debug)]
pub enum StateError {
    #[error("error accessing the state file: `{0}`")]
    IOError(#[from] std::io::Error),

    #[error("invalid state file: `{0}`")]
    SerdeYamlError(#[from] serde_yaml::Error),
}

/// What this unit installed, kept across restarts so a package no longer desired can be released.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct ManagedState {
    pub package: Option<PackageName>,
}

#[cfg_attr(test, mockall::automock)]
pub trait StateStore {
    /// Stored state, the default one when nothing was stored yet.
    fn get(&self) -> Result<ManagedState, StateError>;
    fn set(&self, state: &ManagedState) -> Result<(), StateError>;
}

pub struct StateFile {
    path: PathBuf,
}

impl StateFile {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }
}

impl StateStore for StateFile {
    fn get(&self) -> Result<ManagedState, StateError> {
        match fs::read_to_string(&self.path) {
            Ok(content) => Ok(serde_yaml::from_str(&content)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(ManagedState::default()),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, state: &ManagedState) -> Result<(), StateError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        debug!(path = %self.path.display(), ?state, "persisting managed state");
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, serde_yaml::to_string(state)?)?;
        fs::rename(tmp, &self.path)?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use assert_matches::assert_matches;
    use mockall::predicate;
    use tempfile::tempdir;

    impl MockStateStore {
        pub fn should_get(&mut self, package: Option<&str>) {
            let state = ManagedState {
                package: package.map(|p| PackageName::new(p).unwrap()),
            };
            self.expect_get().returning(move || Ok(state.clone()));
        }

        pub fn should_set(&mut self, package: Option<&str>) {
            let state = ManagedState {
                package: package.map(|p| PackageName::new(p).unwrap()),
            };
            self.expect_set()
                .with(predicate::eq(state))
                .once()
                .returning(|_| Ok(()));
        }
    }

    #[test]
    fn test_missing_state_file_is_empty_state() {
        let dir = tempdir().unwrap();
        let store = StateFile::new(&dir.path().join("state.yaml"));

        assert_eq!(ManagedState::default(), store.get().unwrap());
    }

    #[test]
    fn test_state_is_persisted() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("state.yaml");
        let store = StateFile::new(&path);
        let state = ManagedState {
            package: Some(PackageName::new("node-exporter").unwrap()),
        };

        store.set(&state).unwrap();

        assert_eq!("package: node-exporter\n", fs::read_to_string(&path).unwrap());
        assert_eq!(state, StateFile::new(&path).get().unwrap());
    }

    #[test]
    fn test_corrupted_state_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.yaml");
        fs::write(&path, "package: Not A Package").unwrap();

        assert_matches!(
            StateFile::new(&path).get(),
            Err(StateError::SerdeYamlError(_))
        );
    }
}
