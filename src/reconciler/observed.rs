use std::collections::{BTreeMap, BTreeSet};

use serde_json::{Map, Value};
use tracing::debug;

use crate::config::values::flatten;
use crate::package::{InstalledPackage, PackageBackend, PackageError, PackageName};
use crate::render::{canonicalize, ConfigBlob};

/// State of the managed package as reported by the backend. Only built by querying it.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservedState {
    package: PackageName,
    installed: Option<InstalledPackage>,
    running: bool,
    applied_config: ConfigBlob,
    connected_plugs: BTreeSet<String>,
    last_error: Option<PackageError>,
}

impl ObservedState {
    fn empty(package: PackageName) -> Self {
        Self {
            package,
            installed: None,
            running: false,
            applied_config: ConfigBlob::default(),
            connected_plugs: BTreeSet::new(),
            last_error: None,
        }
    }

    pub fn package(&self) -> &PackageName {
        &self.package
    }

    pub fn is_installed(&self) -> bool {
        self.installed.is_some()
    }

    pub fn installed(&self) -> Option<&InstalledPackage> {
        self.installed.as_ref()
    }

    pub fn version(&self) -> Option<&str> {
        self.installed.as_ref().map(|i| i.version.as_str())
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Options currently applied, flattened and canonical so they compare with a rendered blob.
    pub fn applied_config(&self) -> &ConfigBlob {
        &self.applied_config
    }

    pub fn connected_plugs(&self) -> &BTreeSet<String> {
        &self.connected_plugs
    }

    /// Error of the first failed query. The remaining fields are unreliable when set.
    pub fn last_error(&self) -> Option<&PackageError> {
        self.last_error.as_ref()
    }
}

/// Queries every observable aspect of the package. Query failures are kept in `last_error`
/// instead of being returned, so the status can still be derived from them.
pub(crate) fn observe<B: PackageBackend>(backend: &B, package: &PackageName) -> ObservedState {
    let mut observed = ObservedState::empty(package.clone());
    if let Err(err) = query(backend, &mut observed) {
        debug!(%package, "could not observe the package: {}", err);
        observed.last_error = Some(err);
    }
    observed
}

fn query<B: PackageBackend>(backend: &B, observed: &mut ObservedState) -> Result<(), PackageError> {
    let package = observed.package.clone();
    observed.installed = backend.installed(&package)?;
    if observed.installed.is_none() {
        return Ok(());
    }

    observed.running = backend.is_running(&package)?;
    let applied = flatten_applied(&backend.config(&package)?)?;
    observed.applied_config =
        canonicalize(applied).map_err(|e| PackageError::UnexpectedOutput(e.to_string()))?;
    observed.connected_plugs = backend.connections(&package)?;
    Ok(())
}

/// Options applied to a package, flattened to dotted keys.
pub(crate) fn flatten_applied(
    config: &Map<String, Value>,
) -> Result<BTreeMap<String, Value>, PackageError> {
    flatten(config).map_err(|key| {
        PackageError::UnexpectedOutput(format!("option `{key}` reported more than once"))
    })
}
