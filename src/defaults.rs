use std::time::Duration;

pub const OPERATOR_NAME: &str = "snap-exporter-operator";
pub const OPERATOR_VERSION: &str = env!("CARGO_PKG_VERSION");

// Paths
pub const OPERATOR_CONFIG_PATH: &str = "/etc/snap-exporter-operator/config.yaml";
pub const OPERATOR_DATA_DIR: &str = "/var/lib/snap-exporter-operator";
pub const STATE_FILENAME: &str = "state.yaml";
pub const STATUS_FILENAME: &str = "status.yaml";
pub const FILE_SD_FILENAME: &str = "targets.json";
pub const SINGLETON_LOCK_DIR: &str = "/opt/singleton_snaps";
pub const RULES_PARENT_DIR: &str = "/run";
pub const ALERTS_TARGET_FILE: &str = "alerts.yaml";

// Unit
pub const DEFAULT_UNIT_NAME: &str = "snap-exporter-operator/0";

// Package defaults
pub const SNAP_BINARY: &str = "snap";
pub const DEFAULT_CHANNEL: &str = "latest/stable";
pub const DEFAULT_METRICS_PATH: &str = "metrics";
pub const DEFAULT_EXPORTER_HOST: &str = "localhost";

// Timings
pub const DEFAULT_UPDATE_STATUS_INTERVAL: Duration = Duration::from_secs(300);
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(300);
pub const DEFAULT_RETRY_INITIAL_DELAY: Duration = Duration::from_secs(2);
pub const DEFAULT_RETRY_MAX_RETRIES: usize = 5;
pub const DEFAULT_PROBE_ATTEMPTS: usize = 5;
pub const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_secs(2);
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(2);
