use std::path::PathBuf;
use std::time::Duration;

use duration_str::deserialize_duration;
use serde::Deserialize;

use crate::backoff::BackoffConfig;
use crate::defaults::{
    DEFAULT_COMMAND_TIMEOUT, DEFAULT_EXPORTER_HOST, DEFAULT_METRICS_PATH, DEFAULT_PROBE_ATTEMPTS,
    DEFAULT_PROBE_INTERVAL, DEFAULT_PROBE_TIMEOUT, DEFAULT_UNIT_NAME,
    DEFAULT_UPDATE_STATUS_INTERVAL, FILE_SD_FILENAME, OPERATOR_DATA_DIR, RULES_PARENT_DIR,
    SINGLETON_LOCK_DIR, SNAP_BINARY, STATE_FILENAME, STATUS_FILENAME,
};
use crate::render::schema::ConfigSchema;

/// OperatorConfig represents the whole configuration file: the desired state of the managed
/// exporter plus the runtime settings of the operator itself.
#[derive(Debug, Deserialize, PartialEq, Clone)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct OperatorConfig {
    /// snap to install, e.g. `node-exporter`
    pub snap_name: Option<String>,
    /// channel to track; mutually exclusive with `snap-revision`
    pub snap_channel: Option<String>,
    /// revision to pin; mutually exclusive with `snap-channel`
    pub snap_revision: Option<i64>,
    #[serde(default)]
    pub snap_classic: bool,
    /// comma separated list of plugs to connect
    pub snap_plugs: Option<String>,
    /// snap options, either a JSON object string or a mapping
    pub snap_config: Option<serde_json::Value>,
    /// JSON file holding sensitive snap options, merged with `snap-config`
    pub snap_config_file: Option<PathBuf>,

    pub exporter_port: Option<i64>,
    #[serde(default = "default_exporter_host")]
    pub exporter_host: String,
    #[serde(default = "default_metrics_path")]
    pub metrics_path: String,
    pub job_name: Option<String>,
    #[serde(default)]
    pub exporter_schema: ConfigSchema,

    /// alerting rules handed to the consumers together with the scrape target
    pub alert_rules: Option<PathBuf>,

    #[serde(default)]
    pub operator: OperatorSettings,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            snap_name: None,
            snap_channel: None,
            snap_revision: None,
            snap_classic: false,
            snap_plugs: None,
            snap_config: None,
            snap_config_file: None,
            exporter_port: None,
            exporter_host: default_exporter_host(),
            metrics_path: default_metrics_path(),
            job_name: None,
            exporter_schema: ConfigSchema::default(),
            alert_rules: None,
            operator: OperatorSettings::default(),
        }
    }
}

fn default_exporter_host() -> String {
    DEFAULT_EXPORTER_HOST.to_string()
}

fn default_metrics_path() -> String {
    DEFAULT_METRICS_PATH.to_string()
}

/// Runtime settings of the operator process.
#[derive(Debug, Deserialize, PartialEq, Clone)]
#[serde(deny_unknown_fields, rename_all = "kebab-case", default)]
pub struct OperatorSettings {
    pub unit_name: String,
    pub snap_binary: String,
    pub data_dir: PathBuf,
    pub lock_dir: PathBuf,
    pub rules_dir: Option<PathBuf>,
    pub file_sd_path: Option<PathBuf>,
    pub status_file: Option<PathBuf>,
    #[serde(deserialize_with = "deserialize_duration")]
    pub update_status_interval: Duration,
    #[serde(deserialize_with = "deserialize_duration")]
    pub command_timeout: Duration,
    pub retry: BackoffConfig,
    pub probe: ProbeConfig,
}

impl Default for OperatorSettings {
    fn default() -> Self {
        Self {
            unit_name: DEFAULT_UNIT_NAME.to_string(),
            snap_binary: SNAP_BINARY.to_string(),
            data_dir: PathBuf::from(OPERATOR_DATA_DIR),
            lock_dir: PathBuf::from(SINGLETON_LOCK_DIR),
            rules_dir: None,
            file_sd_path: None,
            status_file: None,
            update_status_interval: DEFAULT_UPDATE_STATUS_INTERVAL,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            retry: BackoffConfig::default(),
            probe: ProbeConfig::default(),
        }
    }
}

impl OperatorSettings {
    pub fn state_file(&self) -> PathBuf {
        self.data_dir.join(STATE_FILENAME)
    }

    pub fn status_file(&self) -> PathBuf {
        self.status_file
            .clone()
            .unwrap_or_else(|| self.data_dir.join(STATUS_FILENAME))
    }

    pub fn file_sd_path(&self) -> PathBuf {
        self.file_sd_path
            .clone()
            .unwrap_or_else(|| self.data_dir.join(FILE_SD_FILENAME))
    }

    /// Rules directory, unique per unit: `/run/<app>-<unit number>` unless configured.
    pub fn rules_dir(&self) -> PathBuf {
        self.rules_dir.clone().unwrap_or_else(|| {
            PathBuf::from(RULES_PARENT_DIR).join(self.unit_name.replace('/', "-"))
        })
    }
}

/// Settings of the metrics endpoint probe run before reporting the unit as active.
#[derive(Debug, Deserialize, PartialEq, Clone)]
#[serde(deny_unknown_fields, rename_all = "kebab-case", default)]
pub struct ProbeConfig {
    pub enabled: bool,
    pub attempts: usize,
    #[serde(deserialize_with = "deserialize_duration")]
    pub interval: Duration,
    #[serde(deserialize_with = "deserialize_duration")]
    pub timeout: Duration,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            attempts: DEFAULT_PROBE_ATTEMPTS,
            interval: DEFAULT_PROBE_INTERVAL,
            timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::backoff::BackoffStrategy;

    const EXAMPLE_CONFIG: &str = r#"
snap-name: node-exporter
snap-channel: latest/edge
snap-plugs: hardware-observe, network-observe
snap-config: '{"web": {"listen-address": ":9100"}}'
exporter-port: 9100
metrics-path: /metrics
exporter-schema:
  web.listen-address:
    type: string
    required: true
operator:
  unit-name: node-exporter/3
  update-status-interval: 1m
  retry:
    type: fixed
    initial-delay: 5s
    max-retries: 3
"#;

    const CONFIG_UNKNOWN_FIELDS: &str = r#"
snap-name: node-exporter
random-field: random-value
"#;

    const CONFIG_UNKNOWN_OPERATOR_FIELDS: &str = r#"
operator:
  random-field: random-value
"#;

    #[test]
    fn test_config_is_deserialized() {
        let config: OperatorConfig = serde_yaml::from_str(EXAMPLE_CONFIG).unwrap();

        assert_eq!(Some("node-exporter".to_string()), config.snap_name);
        assert_eq!(Some("latest/edge".to_string()), config.snap_channel);
        assert_eq!(Some(9100), config.exporter_port);
        assert_eq!("localhost", config.exporter_host);
        assert_eq!(
            Some(serde_json::Value::String(
                r#"{"web": {"listen-address": ":9100"}}"#.to_string()
            )),
            config.snap_config
        );
        assert_eq!("node-exporter/3", config.operator.unit_name);
        assert_eq!(
            Duration::from_secs(60),
            config.operator.update_status_interval
        );
        assert_eq!(BackoffStrategy::Fixed, config.operator.retry.strategy);
        assert_eq!(3, config.operator.retry.max_retries);
        // not set, defaults apply
        assert_eq!(DEFAULT_COMMAND_TIMEOUT, config.operator.command_timeout);
        assert!(config.operator.probe.enabled);
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: OperatorConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(OperatorConfig::default(), config);
    }

    #[test]
    fn test_unknown_fields_are_rejected() {
        assert!(serde_yaml::from_str::<OperatorConfig>(CONFIG_UNKNOWN_FIELDS).is_err());
        assert!(serde_yaml::from_str::<OperatorConfig>(CONFIG_UNKNOWN_OPERATOR_FIELDS).is_err());
    }

    #[test]
    fn test_derived_paths() {
        let settings = OperatorSettings {
            unit_name: "node-exporter/1".to_string(),
            data_dir: PathBuf::from("/tmp/operator"),
            ..Default::default()
        };

        assert_eq!(PathBuf::from("/run/node-exporter-1"), settings.rules_dir());
        assert_eq!(
            PathBuf::from("/tmp/operator/targets.json"),
            settings.file_sd_path()
        );
        assert_eq!(PathBuf::from("/tmp/operator/state.yaml"), settings.state_file());
        assert_eq!(
            PathBuf::from("/tmp/operator/status.yaml"),
            settings.status_file()
        );
    }
}
