//! Rendering of the exporter options into the canonical form handed to the package.
//!
//! Nested options are flattened into dotted keys (`web.listen-address`), checked against the
//! exporter schema and serialized as sorted, compact JSON. Two configurations holding the same
//! options always render to the same bytes, whatever their insertion order, so comparing blobs is
//! enough to know whether the package needs to be reconfigured.
pub mod schema;

use std::collections::BTreeMap;
use std::fmt::Display;

use regex::Regex;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::config::values::flatten;
use crate::validation_regexes::REGEX_SNAP_OPTION_SEGMENT;
use schema::ConfigSchema;

const KEY_SEPARATOR: char = '.';
const EMPTY_OBJECT: &[u8] = b"{}";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RenderError {
    #[error("invalid option name `{0}`: only lowercase letters, digits and dashes are allowed in each dotted segment")]
    InvalidKey(String),

    #[error("option `{0}` is set more than once")]
    DuplicateKey(String),

    #[error("option `{0}` has no value")]
    MissingValue(String),

    #[error("required option `{0}` is not set")]
    MissingRequired(String),

    #[error("option `{key}` expects a `{expected_type}`, got `{actual_value}`")]
    TypeMismatch {
        key: String,
        expected_type: String,
        actual_value: String,
    },

    #[error("option `{key}` value {value} is out of range")]
    OutOfRange { key: String, value: f64 },

    #[error("invalid exporter schema: {0}")]
    InvalidSchema(String),

    #[error("could not serialize options: {0}")]
    Serialization(String),
}

/// Canonical bytes of a rendered configuration together with the options they encode.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigBlob {
    bytes: Vec<u8>,
    options: BTreeMap<String, Value>,
}

/// The blob of no options at all, as rendered: `{}`.
impl Default for ConfigBlob {
    fn default() -> Self {
        Self {
            bytes: EMPTY_OBJECT.to_vec(),
            options: BTreeMap::new(),
        }
    }
}

impl ConfigBlob {
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Flattened options, sorted by key.
    pub fn options(&self) -> &BTreeMap<String, Value> {
        &self.options
    }

    pub fn is_empty(&self) -> bool {
        self.options.is_empty()
    }
}

impl Display for ConfigBlob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.bytes))
    }
}

/// Validates the exporter options against the schema and renders them canonically. Options the
/// schema defines with a default are filled in when missing.
pub fn render(
    config: &BTreeMap<String, Value>,
    schema: &ConfigSchema,
) -> Result<ConfigBlob, RenderError> {
    let nested: Map<String, Value> = config
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    let mut options = flatten(&nested).map_err(RenderError::DuplicateKey)?;

    let segment = Regex::new(REGEX_SNAP_OPTION_SEGMENT)
        .map_err(|e| RenderError::InvalidSchema(e.to_string()))?;
    for (key, value) in options.iter() {
        if !key.split(KEY_SEPARATOR).all(|s| segment.is_match(s)) {
            return Err(RenderError::InvalidKey(key.clone()));
        }
        if value.is_null() {
            return Err(RenderError::MissingValue(key.clone()));
        }
    }

    for (key, spec) in schema.iter() {
        match options.get(key) {
            Some(value) => spec.check(key, value)?,
            None if spec.required => return Err(RenderError::MissingRequired(key.clone())),
            None => {
                if let Some(default) = &spec.default {
                    options.insert(key.clone(), default.clone());
                }
            }
        }
    }

    canonicalize(options)
}

/// Serializes already flattened options; used as well to compare against the options a package
/// currently has applied.
pub fn canonicalize(options: BTreeMap<String, Value>) -> Result<ConfigBlob, RenderError> {
    let bytes =
        serde_json::to_vec(&options).map_err(|e| RenderError::Serialization(e.to_string()))?;
    Ok(ConfigBlob { bytes, options })
}
