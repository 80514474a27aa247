use std::collections::BTreeSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use regex::Regex;
use thiserror::Error;
use tracing::debug;

use super::PackageName;
use crate::validation_regexes::REGEX_UNIT_NAME_DISALLOWED;

const REGISTRATION_PREFIX: &str = "LCK..";
const UNIT_SEPARATOR: &str = "__";
const REPLACEMENT: &str = "_";

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("registry io error: `{0}`")]
    IOError(#[from] std::io::Error),

    #[error("invalid unit name pattern: `{0}`")]
    InvalidPattern(#[from] regex::Error),
}

/// Tracks which units on this host make use of a package, so a package shared by several units is
/// only removed by the last of them.
#[cfg_attr(test, mockall::automock)]
pub trait UnitRegistry {
    fn register(&self, package: &PackageName) -> Result<(), RegistryError>;
    fn unregister(&self, package: &PackageName) -> Result<(), RegistryError>;
    /// Registered unit names for the package, normalized.
    fn units(&self, package: &PackageName) -> Result<BTreeSet<String>, RegistryError>;
    fn is_used_by_other_units(&self, package: &PackageName) -> Result<bool, RegistryError>;
}

/// Registry keeping one empty `LCK..<package>__<unit>` file per registration in a shared directory.
pub struct FileUnitRegistry {
    lock_dir: PathBuf,
    unit_name: String,
}

impl FileUnitRegistry {
    pub fn try_new(lock_dir: &Path, unit_name: &str) -> Result<Self, RegistryError> {
        Ok(Self {
            lock_dir: lock_dir.to_path_buf(),
            unit_name: normalize_unit_name(unit_name)?,
        })
    }

    fn registration_file(&self, package: &PackageName) -> PathBuf {
        self.lock_dir.join(format!(
            "{REGISTRATION_PREFIX}{package}{UNIT_SEPARATOR}{}",
            self.unit_name
        ))
    }
}

/// Restricts a unit name to alphanumerics, `_` and `-`: `node-exporter/0` is `node-exporter_0`.
pub fn normalize_unit_name(unit_name: &str) -> Result<String, RegistryError> {
    let disallowed = Regex::new(REGEX_UNIT_NAME_DISALLOWED)?;
    Ok(disallowed.replace_all(unit_name, REPLACEMENT).into_owned())
}

// `LCK..node-exporter__node-exporter_0` is `("node-exporter", "node-exporter_0")`
fn parse_registration(filename: &str) -> Option<(&str, &str)> {
    filename
        .strip_prefix(REGISTRATION_PREFIX)?
        .split_once(UNIT_SEPARATOR)
}

impl UnitRegistry for FileUnitRegistry {
    fn register(&self, package: &PackageName) -> Result<(), RegistryError> {
        fs::create_dir_all(&self.lock_dir)?;
        let path = self.registration_file(package);
        debug!(path = %path.display(), "registering unit");
        fs::write(path, "")?;
        Ok(())
    }

    fn unregister(&self, package: &PackageName) -> Result<(), RegistryError> {
        let path = self.registration_file(package);
        debug!(path = %path.display(), "unregistering unit");
        match fs::remove_file(path) {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }

    fn units(&self, package: &PackageName) -> Result<BTreeSet<String>, RegistryError> {
        let entries = match fs::read_dir(&self.lock_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(BTreeSet::new()),
            Err(e) => return Err(e.into()),
        };

        let mut units = BTreeSet::new();
        for entry in entries {
            let filename = entry?.file_name();
            let Some(filename) = filename.to_str() else {
                continue;
            };
            if let Some((registered, unit)) = parse_registration(filename) {
                if registered == package.as_str() {
                    units.insert(unit.to_string());
                }
            }
        }
        Ok(units)
    }

    fn is_used_by_other_units(&self, package: &PackageName) -> Result<bool, RegistryError> {
        Ok(self
            .units(package)?
            .iter()
            .any(|unit| *unit != self.unit_name))
    }
}
