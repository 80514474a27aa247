use std::fmt::Debug;
use thiserror::Error;

use crate::file_reader::FileReaderError;
use crate::render::RenderError;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required configuration fields: {}", .0.join(", "))]
    MissingRequired(Vec<String>),

    #[error("snap-name must be a non-empty string")]
    EmptyPackageName,

    #[error("invalid snap-name `{0}`: only lowercase letters, digits and dashes are allowed")]
    InvalidPackageName(String),

    #[error("exporter-port must be between 1 and 65535, got {0}")]
    PortOutOfRange(i64),

    #[error("snap-channel must be a non-empty string")]
    EmptyChannel,

    #[error("snap-revision must be a positive integer, got {0}")]
    InvalidRevision(i64),

    #[error("snap-channel and snap-revision cannot both be set")]
    ChannelAndRevision,

    #[error("snap-plugs must contain at least one valid plug name")]
    EmptyPlugs,

    #[error("invalid plug name `{0}`")]
    InvalidPlug(String),

    #[error("snap-config {0}")]
    InvalidSnapConfig(String),

    #[error("The configs conflict at key: {0}")]
    ConflictingOptions(String),

    #[error("could not read snap-config-file: {0}")]
    ConfigFile(#[from] FileReaderError),

    #[error("metrics-path `{0}` must not contain whitespace")]
    InvalidMetricsPath(String),

    #[error("exporter-host must be a non-empty string")]
    EmptyHost,

    #[error("exporter-host `{0}` is not a valid host")]
    InvalidHost(String),

    #[error("Could not determine revision for snap {package} on channel {channel}.")]
    ChannelUnavailable { package: String, channel: String },

    #[error("Snap {0} requires classic confinement. Please enable 'snap-classic'.")]
    ClassicRequired(String),

    #[error("invalid exporter configuration: {0}")]
    InvalidConfig(#[from] RenderError),

    #[error("invalid configuration file: {0}")]
    InvalidYaml(#[from] serde_yaml::Error),

    #[error("error loading config: {0}")]
    IOError(#[from] std::io::Error),
}
