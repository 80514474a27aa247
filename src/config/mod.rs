pub mod desired;
pub mod error;
pub mod operator_config;
pub mod store;
pub mod values;

pub use desired::{DesiredSpec, ExporterConfig};
pub use error::ConfigError;
pub use operator_config::{OperatorConfig, OperatorSettings};
