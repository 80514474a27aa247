use std::collections::BTreeMap;

use regex::Regex;
use serde_json::{Map, Value};
use tracing::{info, warn};
use url::Url;

use super::error::ConfigError;
use super::operator_config::OperatorConfig;
use super::values::merge;
use crate::file_reader::FileReader;
use crate::package::{PackageName, Release};
use crate::publisher::ScrapeTarget;
use crate::render::schema::ConfigSchema;
use crate::render::{render, ConfigBlob};
use crate::validation_regexes::REGEX_PLUG_NAME;

/// Exporter options as given by the user, possibly nested.
pub type ExporterConfig = BTreeMap<String, Value>;

const PLUG_SEPARATOR: char = ',';
const MIN_PORT: i64 = 1;
const MAX_PORT: i64 = 65535;

/// Desired state of the managed exporter as read from the configuration, before validation.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DesiredSpec {
    pub package_name: Option<String>,
    pub channel: Option<String>,
    pub revision: Option<i64>,
    pub classic: bool,
    /// comma separated plug names
    pub plugs: Option<String>,
    pub exporter_config: ExporterConfig,
    pub schema: ConfigSchema,
    pub scrape_host: String,
    pub scrape_port: Option<i64>,
    pub scrape_path: String,
    pub job_name: Option<String>,
    pub alert_rules: Option<String>,
    /// Remove whatever this unit manages instead of converging to the fields above.
    pub teardown: bool,
}

/// Desired state once every field has been checked.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedSpec {
    pub package: PackageName,
    pub release: Release,
    pub classic: bool,
    pub plugs: Vec<String>,
    pub config: ConfigBlob,
    pub target: ScrapeTarget,
    pub alert_rules: Option<String>,
}

impl DesiredSpec {
    /// Desired state asking to remove everything this unit manages.
    pub fn teardown() -> Self {
        Self {
            teardown: true,
            ..Default::default()
        }
    }

    /// Builds the desired state from the configuration file, reading the referenced files.
    pub fn from_config<F: FileReader>(
        config: &OperatorConfig,
        reader: &F,
    ) -> Result<Self, ConfigError> {
        let mut exporter_config = parse_snap_config(config.snap_config.as_ref())?;
        if let Some(path) = &config.snap_config_file {
            let secret = parse_snap_config_file(&reader.read(path)?)?;
            exporter_config = merge(&exporter_config, &secret).map_err(ConfigError::ConflictingOptions)?;
        }

        let alert_rules = config
            .alert_rules
            .as_ref()
            .and_then(|path| match reader.read(path) {
                Ok(content) => valid_alert_rules(content),
                Err(err) => {
                    warn!("Failed to read alert rules: {}; skipping alerts configuration.", err);
                    None
                }
            });

        Ok(Self {
            package_name: config.snap_name.clone(),
            channel: config.snap_channel.clone(),
            revision: config.snap_revision,
            classic: config.snap_classic,
            plugs: config.snap_plugs.clone(),
            exporter_config: exporter_config.into_iter().collect(),
            schema: config.exporter_schema.clone(),
            scrape_host: config.exporter_host.clone(),
            scrape_port: config.exporter_port,
            scrape_path: config.metrics_path.clone(),
            job_name: config.job_name.clone(),
            alert_rules,
            teardown: false,
        })
    }

    /// Checks every field, returning the first violation found.
    pub fn validate(&self) -> Result<ValidatedSpec, ConfigError> {
        let mut missing = Vec::new();
        if self.package_name.is_none() {
            missing.push("snap-name".to_string());
        }
        if self.scrape_port.is_none() {
            missing.push("exporter-port".to_string());
        }
        let (Some(package_name), Some(port)) = (&self.package_name, self.scrape_port) else {
            return Err(ConfigError::MissingRequired(missing));
        };

        let package = PackageName::new(package_name)?;
        let port = u16::try_from(port)
            .ok()
            .filter(|p| (MIN_PORT..=MAX_PORT).contains(&i64::from(*p)))
            .ok_or(ConfigError::PortOutOfRange(port))?;
        let release = self.release()?;
        let plugs = self.plugs()?;

        let host = self.scrape_host.trim();
        if host.is_empty() {
            return Err(ConfigError::EmptyHost);
        }
        let path = self.scrape_path.trim().trim_start_matches('/');
        if path.chars().any(char::is_whitespace) {
            return Err(ConfigError::InvalidMetricsPath(self.scrape_path.clone()));
        }

        let config = render(&self.exporter_config, &self.schema)?;
        let job = self
            .job_name
            .clone()
            .filter(|j| !j.trim().is_empty())
            .unwrap_or_else(|| package.to_string());

        let target = ScrapeTarget::new(host, port, path, Some(job));
        Url::parse(&target.url()).map_err(|_| ConfigError::InvalidHost(host.to_string()))?;

        Ok(ValidatedSpec {
            target,
            package,
            release,
            classic: self.classic,
            plugs,
            config,
            alert_rules: self.alert_rules.clone(),
        })
    }

    fn release(&self) -> Result<Release, ConfigError> {
        let channel = match &self.channel {
            Some(channel) if channel.trim().is_empty() => return Err(ConfigError::EmptyChannel),
            Some(channel) => Some(channel.trim().to_string()),
            None => None,
        };
        let revision = match self.revision {
            Some(revision) if revision <= 0 => return Err(ConfigError::InvalidRevision(revision)),
            Some(revision) => Some(revision.unsigned_abs()),
            None => None,
        };

        match (channel, revision) {
            (Some(_), Some(_)) => Err(ConfigError::ChannelAndRevision),
            (Some(channel), None) => Ok(Release::Channel(channel)),
            (None, Some(revision)) => Ok(Release::Revision(revision)),
            (None, None) => Ok(Release::default()),
        }
    }

    fn plugs(&self) -> Result<Vec<String>, ConfigError> {
        let Some(raw) = &self.plugs else {
            return Ok(Vec::new());
        };
        let mut plugs: Vec<String> = raw
            .split(PLUG_SEPARATOR)
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(String::from)
            .collect();
        if plugs.is_empty() {
            return Err(ConfigError::EmptyPlugs);
        }

        let valid =
            Regex::new(REGEX_PLUG_NAME).map_err(|_| ConfigError::InvalidPlug(raw.clone()))?;
        if let Some(invalid) = plugs.iter().find(|p| !valid.is_match(p)) {
            return Err(ConfigError::InvalidPlug(invalid.clone()));
        }
        plugs.dedup();
        Ok(plugs)
    }
}

fn parse_snap_config(snap_config: Option<&Value>) -> Result<Map<String, Value>, ConfigError> {
    match snap_config {
        None | Some(Value::Null) => Ok(Map::new()),
        Some(Value::Object(map)) => Ok(map.clone()),
        Some(Value::String(raw)) if raw.trim().is_empty() => Ok(Map::new()),
        Some(Value::String(raw)) => match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Err(ConfigError::InvalidSnapConfig(
                "JSON must decode to a dictionary".to_string(),
            )),
            Err(_) => Err(ConfigError::InvalidSnapConfig(
                "must be valid JSON".to_string(),
            )),
        },
        Some(_) => Err(ConfigError::InvalidSnapConfig(
            "must be a JSON object".to_string(),
        )),
    }
}

fn parse_snap_config_file(content: &str) -> Result<Map<String, Value>, ConfigError> {
    match serde_json::from_str::<Value>(content) {
        Ok(Value::Object(map)) => Ok(map),
        _ => Err(ConfigError::InvalidSnapConfig(
            "file must hold a JSON object".to_string(),
        )),
    }
}

/// Alert rules must be a YAML mapping or sequence; anything else is ignored.
fn valid_alert_rules(content: String) -> Option<String> {
    let content = content.trim();
    if content.is_empty() {
        info!("Alert rules file is empty; skipping configuration.");
        return None;
    }
    match serde_yaml::from_str::<serde_yaml::Value>(content) {
        Ok(serde_yaml::Value::Mapping(_)) | Ok(serde_yaml::Value::Sequence(_)) => {
            Some(content.to_string())
        }
        Ok(_) => {
            warn!("Alert rules are not a YAML mapping or list; skipping alerts configuration.");
            None
        }
        Err(err) => {
            warn!("YAML parsing error for alert rules: {}; skipping alerts configuration.", err);
            None
        }
    }
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use crate::file_reader::MockFileReader;
    use assert_matches::assert_matches;
    use serde_json::json;
    use std::path::{Path, PathBuf};

    /// The node-exporter example: the exporter listening on 9100 with its default options.
    pub fn node_exporter_spec() -> DesiredSpec {
        DesiredSpec {
            package_name: Some("node-exporter".to_string()),
            exporter_config: BTreeMap::from([(
                "web".to_string(),
                json!({"listen-address": ":9100"}),
            )]),
            scrape_host: "localhost".to_string(),
            scrape_port: Some(9100),
            scrape_path: "metrics".to_string(),
            ..Default::default()
        }
    }

    fn config(yaml: &str) -> OperatorConfig {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_node_exporter_example_validates() {
        let valid = node_exporter_spec().validate().unwrap();

        assert_eq!("node-exporter", valid.package.as_str());
        assert_eq!(Release::Channel("latest/stable".to_string()), valid.release);
        assert_eq!(
            r#"{"web.listen-address":":9100"}"#,
            valid.config.to_string()
        );
        assert_eq!("http://localhost:9100/metrics", valid.target.url());
        assert_eq!(Some("node-exporter"), valid.target.job());
    }

    #[test]
    fn test_missing_required_fields() {
        let err = DesiredSpec::default().validate().unwrap_err();
        assert_eq!(
            "Missing required configuration fields: snap-name, exporter-port",
            err.to_string()
        );

        let spec = DesiredSpec {
            scrape_port: None,
            ..node_exporter_spec()
        };
        assert_matches!(
            spec.validate(),
            Err(ConfigError::MissingRequired(fields)) if fields == vec!["exporter-port".to_string()]
        );
    }

    #[test]
    fn test_invalid_fields() {
        struct TestCase {
            name: &'static str,
            spec: DesiredSpec,
            expected: fn(&ConfigError) -> bool,
        }
        impl TestCase {
            fn run(self) {
                let err = self.spec.validate().unwrap_err();
                assert!((self.expected)(&err), "{}: unexpected {err:?}", self.name);
            }
        }

        let test_cases = vec![
            TestCase {
                name: "empty package name",
                spec: DesiredSpec {
                    package_name: Some("  ".to_string()),
                    ..node_exporter_spec()
                },
                expected: |e| matches!(e, ConfigError::EmptyPackageName),
            },
            TestCase {
                name: "port zero",
                spec: DesiredSpec {
                    scrape_port: Some(0),
                    ..node_exporter_spec()
                },
                expected: |e| matches!(e, ConfigError::PortOutOfRange(0)),
            },
            TestCase {
                name: "port too big",
                spec: DesiredSpec {
                    scrape_port: Some(65536),
                    ..node_exporter_spec()
                },
                expected: |e| matches!(e, ConfigError::PortOutOfRange(65536)),
            },
            TestCase {
                name: "channel and revision",
                spec: DesiredSpec {
                    channel: Some("latest/edge".to_string()),
                    revision: Some(12),
                    ..node_exporter_spec()
                },
                expected: |e| matches!(e, ConfigError::ChannelAndRevision),
            },
            TestCase {
                name: "blank channel",
                spec: DesiredSpec {
                    channel: Some(" ".to_string()),
                    ..node_exporter_spec()
                },
                expected: |e| matches!(e, ConfigError::EmptyChannel),
            },
            TestCase {
                name: "negative revision",
                spec: DesiredSpec {
                    revision: Some(-3),
                    ..node_exporter_spec()
                },
                expected: |e| matches!(e, ConfigError::InvalidRevision(-3)),
            },
            TestCase {
                name: "only separators in plugs",
                spec: DesiredSpec {
                    plugs: Some(" , ,".to_string()),
                    ..node_exporter_spec()
                },
                expected: |e| matches!(e, ConfigError::EmptyPlugs),
            },
            TestCase {
                name: "invalid plug",
                spec: DesiredSpec {
                    plugs: Some("hardware-observe, Bad Plug".to_string()),
                    ..node_exporter_spec()
                },
                expected: |e| matches!(e, ConfigError::InvalidPlug(p) if p == "Bad Plug"),
            },
            TestCase {
                name: "invalid option key",
                spec: DesiredSpec {
                    exporter_config: BTreeMap::from([("Web".to_string(), json!(1))]),
                    ..node_exporter_spec()
                },
                expected: |e| matches!(e, ConfigError::InvalidConfig(_)),
            },
            TestCase {
                name: "empty host",
                spec: DesiredSpec {
                    scrape_host: String::new(),
                    ..node_exporter_spec()
                },
                expected: |e| matches!(e, ConfigError::EmptyHost),
            },
            TestCase {
                name: "host with spaces",
                spec: DesiredSpec {
                    scrape_host: "node 1".to_string(),
                    ..node_exporter_spec()
                },
                expected: |e| matches!(e, ConfigError::InvalidHost(h) if h == "node 1"),
            },
        ];

        test_cases.into_iter().for_each(|tc| tc.run());
    }

    #[test]
    fn test_release_and_plugs() {
        let spec = DesiredSpec {
            revision: Some(1904),
            plugs: Some("hardware-observe, network-observe,,".to_string()),
            scrape_path: "//custom/metrics".to_string(),
            job_name: Some("nodes".to_string()),
            ..node_exporter_spec()
        };
        let valid = spec.validate().unwrap();

        assert_eq!(Release::Revision(1904), valid.release);
        assert_eq!(
            vec!["hardware-observe".to_string(), "network-observe".to_string()],
            valid.plugs
        );
        assert_eq!("/custom/metrics", valid.target.path());
        assert_eq!(Some("nodes"), valid.target.job());
    }

    #[test]
    fn test_from_config_parses_json_options() {
        let config = config(
            r#"
snap-name: node-exporter
exporter-port: 9100
snap-config: '{"web": {"listen-address": ":9100"}, "collector": {"ntp": true}}'
"#,
        );
        let spec = DesiredSpec::from_config(&config, &MockFileReader::new()).unwrap();

        assert_eq!(Some("node-exporter".to_string()), spec.package_name);
        assert_eq!(Some(&json!({"ntp": true})), spec.exporter_config.get("collector"));
        assert!(!spec.teardown);
    }

    #[test]
    fn test_from_config_rejects_non_object_json() {
        let invalid = config("snap-config: '[1, 2]'");
        assert_eq!(
            "snap-config JSON must decode to a dictionary",
            DesiredSpec::from_config(&invalid, &MockFileReader::new())
                .unwrap_err()
                .to_string()
        );

        let broken = config("snap-config: '{\"web\": '");
        assert_eq!(
            "snap-config must be valid JSON",
            DesiredSpec::from_config(&broken, &MockFileReader::new())
                .unwrap_err()
                .to_string()
        );
    }

    #[test]
    fn test_from_config_merges_sensitive_options() {
        let config = config(
            r#"
snap-config: '{"web": {"user": "admin"}}'
snap-config-file: /etc/exporter/secret.json
"#,
        );
        let mut reader = MockFileReader::new();
        reader.should_read(
            Path::new("/etc/exporter/secret.json"),
            r#"{"web": {"password": "s3cret"}}"#.to_string(),
        );

        let spec = DesiredSpec::from_config(&config, &reader).unwrap();
        assert_eq!(
            Some(&json!({"user": "admin", "password": "s3cret"})),
            spec.exporter_config.get("web")
        );
    }

    #[test]
    fn test_from_config_conflicting_sensitive_options() {
        let config = config(
            r#"
snap-config: '{"web": {"password": "plain"}}'
snap-config-file: /etc/exporter/secret.json
"#,
        );
        let mut reader = MockFileReader::new();
        reader.should_read(
            Path::new("/etc/exporter/secret.json"),
            r#"{"web": {"password": "s3cret"}}"#.to_string(),
        );

        let err = DesiredSpec::from_config(&config, &reader).unwrap_err();
        assert_eq!("The configs conflict at key: web.password", err.to_string());
    }

    #[test]
    fn test_from_config_unreadable_sensitive_options() {
        let config = config("snap-config-file: /etc/exporter/secret.json");
        let mut reader = MockFileReader::new();
        reader.should_not_read(Path::new("/etc/exporter/secret.json"));

        assert_matches!(
            DesiredSpec::from_config(&config, &reader),
            Err(ConfigError::ConfigFile(_))
        );
    }

    #[test]
    fn test_alert_rules_are_validated() {
        let rules_path = PathBuf::from("/etc/exporter/alerts.yaml");
        let config = OperatorConfig {
            alert_rules: Some(rules_path.clone()),
            ..Default::default()
        };

        let mut reader = MockFileReader::new();
        reader.should_read(&rules_path, "groups:\n  - name: node\n".to_string());
        let spec = DesiredSpec::from_config(&config, &reader).unwrap();
        assert_eq!(Some("groups:\n  - name: node".to_string()), spec.alert_rules);

        let mut reader = MockFileReader::new();
        reader.should_read(&rules_path, "just a string".to_string());
        let spec = DesiredSpec::from_config(&config, &reader).unwrap();
        assert_eq!(None, spec.alert_rules);

        let mut reader = MockFileReader::new();
        reader.should_not_read(&rules_path);
        let spec = DesiredSpec::from_config(&config, &reader).unwrap();
        assert_eq!(None, spec.alert_rules);
    }
}
