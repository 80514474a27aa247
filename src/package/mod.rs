pub mod error;
pub mod parser;
pub mod registry;
pub mod snap;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Display;
use std::ops::Deref;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::ConfigError;
use crate::defaults::DEFAULT_CHANNEL;
use crate::validation_regexes::REGEX_SNAP_NAME;

pub use error::PackageError;

const MAX_PACKAGE_NAME_LEN: usize = 40;
const RISK_LEVELS: [&str; 4] = ["stable", "candidate", "beta", "edge"];

/// Validated name of an installable package.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Hash, Eq, PartialOrd, Ord)]
#[serde(try_from = "String", into = "String")]
pub struct PackageName(String);

impl TryFrom<String> for PackageName {
    type Error = ConfigError;

    fn try_from(name: String) -> Result<Self, Self::Error> {
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(ConfigError::EmptyPackageName);
        }
        let valid_chars = Regex::new(REGEX_SNAP_NAME)
            .map_err(|_| ConfigError::InvalidPackageName(name.clone()))?
            .is_match(&name);
        let has_letter = name.chars().any(|c| c.is_ascii_lowercase());
        if !valid_chars || !has_letter || name.len() > MAX_PACKAGE_NAME_LEN {
            return Err(ConfigError::InvalidPackageName(name));
        }
        Ok(Self(name))
    }
}

impl From<PackageName> for String {
    fn from(value: PackageName) -> Self {
        value.0
    }
}

impl PackageName {
    pub fn new(name: &str) -> Result<Self, ConfigError> {
        Self::try_from(name.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Deref for PackageName {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Display for PackageName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Release of a package to track: a channel (`latest/stable`, `edge`, `1.x`) or a pinned revision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Release {
    Channel(String),
    Revision(u64),
}

impl Default for Release {
    fn default() -> Self {
        Release::Channel(DEFAULT_CHANNEL.to_string())
    }
}

impl Release {
    /// Returns whether the installed package already follows this release.
    pub fn is_satisfied_by(&self, installed: &InstalledPackage) -> bool {
        match self {
            Release::Channel(channel) => installed
                .tracking
                .as_deref()
                .is_some_and(|tracking| normalize_channel(tracking) == normalize_channel(channel)),
            Release::Revision(revision) => installed.revision == revision.to_string(),
        }
    }

    /// Command line flag selecting this release.
    pub fn as_flag(&self) -> String {
        match self {
            Release::Channel(channel) => format!("--channel={channel}"),
            Release::Revision(revision) => format!("--revision={revision}"),
        }
    }
}

impl Display for Release {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Release::Channel(channel) => write!(f, "channel {channel}"),
            Release::Revision(revision) => write!(f, "revision {revision}"),
        }
    }
}

/// Expands a channel to its `track/risk[/branch]` form: `stable` is `latest/stable` and a bare
/// track like `1.x` is `1.x/stable`.
pub fn normalize_channel(channel: &str) -> String {
    let channel = channel.trim();
    match channel.split('/').count() {
        1 if RISK_LEVELS.contains(&channel) => format!("latest/{channel}"),
        1 => format!("{channel}/stable"),
        _ => channel.to_string(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Confinement {
    #[default]
    Strict,
    Classic,
    Devmode,
}

/// Release published on a channel of the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelRelease {
    pub version: String,
    pub revision: u64,
}

/// Store information about a package, whether installed or not.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PackageInfo {
    pub confinement: Confinement,
    pub channels: BTreeMap<String, ChannelRelease>,
}

impl PackageInfo {
    pub fn channel(&self, channel: &str) -> Option<&ChannelRelease> {
        self.channels.get(&normalize_channel(channel))
    }
}

/// Package as currently installed on the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledPackage {
    pub version: String,
    pub revision: String,
    pub tracking: Option<String>,
}

/// Capabilities the reconciler needs from the host package manager.
#[cfg_attr(test, mockall::automock)]
pub trait PackageBackend {
    /// Store information about the package.
    fn info(&self, name: &PackageName) -> Result<PackageInfo, PackageError>;
    /// Installs the package at the given release and holds its automatic refreshes. Services are
    /// left stopped until [`PackageBackend::start`].
    fn install(
        &self,
        name: &PackageName,
        release: &Release,
        classic: bool,
    ) -> Result<(), PackageError>;
    /// Moves an installed package to the given release, leaving its services stopped.
    fn refresh(
        &self,
        name: &PackageName,
        release: &Release,
        classic: bool,
    ) -> Result<(), PackageError>;
    fn remove(&self, name: &PackageName) -> Result<(), PackageError>;
    /// Enables and starts every service of the package.
    fn start(&self, name: &PackageName) -> Result<(), PackageError>;
    /// Disables and stops every service of the package.
    fn stop(&self, name: &PackageName) -> Result<(), PackageError>;
    fn restart(&self, name: &PackageName) -> Result<(), PackageError>;
    /// `None` when the package is not installed.
    fn installed(&self, name: &PackageName) -> Result<Option<InstalledPackage>, PackageError>;
    /// Whether the package has services and all of them are active.
    fn is_running(&self, name: &PackageName) -> Result<bool, PackageError>;
    /// Options currently applied to the package, as nested JSON.
    fn config(&self, name: &PackageName) -> Result<serde_json::Map<String, Value>, PackageError>;
    /// Sets the given dotted options.
    fn set_config(
        &self,
        name: &PackageName,
        options: &BTreeMap<String, Value>,
    ) -> Result<(), PackageError>;
    fn unset_config(&self, name: &PackageName, keys: &[String]) -> Result<(), PackageError>;
    /// Names of the plugs of the package currently connected to a slot.
    fn connections(&self, name: &PackageName) -> Result<BTreeSet<String>, PackageError>;
    fn connect(&self, name: &PackageName, plug: &str) -> Result<(), PackageError>;
    /// Whether running services only pick configuration changes up after a restart.
    fn restart_on_config_change(&self) -> bool;
}
