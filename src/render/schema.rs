use std::collections::BTreeMap;
use std::fmt::Display;

use serde::Deserialize;
use serde_json::Value;

use super::RenderError;

/// Definitions of the options an exporter accepts, keyed by their dotted name.
#[derive(Debug, Deserialize, Default, PartialEq, Clone)]
#[serde(transparent)]
pub struct ConfigSchema(BTreeMap<String, OptionSpec>);

impl ConfigSchema {
    pub fn iter(&self) -> impl Iterator<Item = (&String, &OptionSpec)> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<BTreeMap<String, OptionSpec>> for ConfigSchema {
    fn from(value: BTreeMap<String, OptionSpec>) -> Self {
        Self(value)
    }
}

#[derive(Debug, PartialEq, Clone, Copy, Deserialize)]
pub enum OptionType {
    #[serde(rename = "string")]
    String,
    #[serde(rename = "bool")]
    Bool,
    #[serde(rename = "number")]
    Number,
}

impl Display for OptionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            OptionType::String => "string",
            OptionType::Bool => "bool",
            OptionType::Number => "number",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, PartialEq, Clone, Deserialize)]
#[serde(try_from = "IntermediateOptionSpec")]
pub struct OptionSpec {
    pub description: String,
    pub type_: OptionType,
    pub required: bool,
    pub default: Option<Value>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct IntermediateOptionSpec {
    #[serde(default)]
    description: String,
    #[serde(rename = "type")]
    type_: OptionType,
    #[serde(default)]
    required: bool,
    default: Option<Value>,
    min: Option<f64>,
    max: Option<f64>,
}

impl TryFrom<IntermediateOptionSpec> for OptionSpec {
    type Error = RenderError;

    /// The default value, when present, must satisfy the definition itself.
    fn try_from(ios: IntermediateOptionSpec) -> Result<Self, Self::Error> {
        if let (Some(min), Some(max)) = (ios.min, ios.max) {
            if min > max {
                return Err(RenderError::InvalidSchema(format!(
                    "min {min} is greater than max {max}"
                )));
            }
        }
        if (ios.min.is_some() || ios.max.is_some()) && ios.type_ != OptionType::Number {
            return Err(RenderError::InvalidSchema(format!(
                "min and max only apply to numbers, not to {}",
                ios.type_
            )));
        }

        let spec = OptionSpec {
            description: ios.description,
            type_: ios.type_,
            required: ios.required,
            default: None,
            min: ios.min,
            max: ios.max,
        };
        let default = ios
            .default
            .map(|d| spec.check("default", &d).map(|_| d))
            .transpose()?;

        Ok(OptionSpec { default, ..spec })
    }
}

impl OptionSpec {
    /// Checks a value against the type and range of this definition.
    pub fn check(&self, key: &str, value: &Value) -> Result<(), RenderError> {
        let matches_type = matches!(
            (self.type_, value),
            (OptionType::String, Value::String(_))
                | (OptionType::Bool, Value::Bool(_))
                | (OptionType::Number, Value::Number(_))
        );
        if !matches_type {
            return Err(RenderError::TypeMismatch {
                key: key.to_string(),
                expected_type: self.type_.to_string(),
                actual_value: value.to_string(),
            });
        }

        if let Some(number) = value.as_f64() {
            let below = self.min.is_some_and(|min| number < min);
            let above = self.max.is_some_and(|max| number > max);
            if below || above {
                return Err(RenderError::OutOfRange {
                    key: key.to_string(),
                    value: number,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    const SCHEMA: &str = r#"
web.listen-address:
  description: address the exporter listens on
  type: string
  required: true
collector.ntp:
  type: bool
  default: false
log.max-files:
  type: number
  min: 1
  max: 10
"#;

    #[test]
    fn test_schema_parsing() {
        let schema: ConfigSchema = serde_yaml::from_str(SCHEMA).unwrap();
        let specs: BTreeMap<_, _> = schema.iter().collect();

        assert_eq!(3, specs.len());
        let address = specs.get(&"web.listen-address".to_string()).unwrap();
        assert!(address.required);
        assert_eq!(OptionType::String, address.type_);

        let ntp = specs.get(&"collector.ntp".to_string()).unwrap();
        assert_eq!(Some(json!(false)), ntp.default);

        let files = specs.get(&"log.max-files".to_string()).unwrap();
        assert_eq!(Some(1.0), files.min);
        assert_eq!(Some(10.0), files.max);
    }

    #[test]
    fn test_default_with_wrong_type_is_rejected() {
        let schema = r#"
collector.ntp:
  type: bool
  default: "yes"
"#;
        assert!(serde_yaml::from_str::<ConfigSchema>(schema).is_err());
    }

    #[test]
    fn test_inverted_range_is_rejected() {
        let schema = r#"
log.max-files:
  type: number
  min: 10
  max: 1
"#;
        assert!(serde_yaml::from_str::<ConfigSchema>(schema).is_err());
    }

    #[test]
    fn test_range_on_string_is_rejected() {
        let schema = r#"
web.listen-address:
  type: string
  max: 1
"#;
        assert!(serde_yaml::from_str::<ConfigSchema>(schema).is_err());
    }

    #[test]
    fn test_check_values() {
        let spec = OptionSpec {
            description: String::new(),
            type_: OptionType::Number,
            required: false,
            default: None,
            min: Some(1.0),
            max: Some(10.0),
        };

        assert!(spec.check("log.max-files", &json!(5)).is_ok());
        assert_matches!(
            spec.check("log.max-files", &json!(11)),
            Err(RenderError::OutOfRange { .. })
        );
        assert_matches!(
            spec.check("log.max-files", &json!("5")),
            Err(RenderError::TypeMismatch { .. })
        );
    }
}
