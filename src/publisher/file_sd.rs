use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info};

use super::{EndpointPublisher, PublishError, ScrapeTarget};
use crate::defaults::ALERTS_TARGET_FILE;
use crate::utils::hostname::{HostnameGetter, SystemHostnameGetter};

#[derive(Debug, Serialize)]
struct TargetGroup<'a> {
    targets: Vec<String>,
    labels: Labels<'a>,
}

#[derive(Debug, Serialize)]
struct Labels<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    job: Option<&'a str>,
    instance: String,
    #[serde(rename = "__metrics_path__")]
    metrics_path: &'a str,
}

/// Publishes the scrape target as a Prometheus `file_sd` document and the alerting rules as a
/// YAML file in the rules directory read by the consumers.
pub struct FileSdPublisher<H = SystemHostnameGetter>
where
    H: HostnameGetter,
{
    targets_path: PathBuf,
    rules_dir: PathBuf,
    hostname_getter: H,
}

impl FileSdPublisher<SystemHostnameGetter> {
    pub fn new(targets_path: &Path, rules_dir: &Path) -> Self {
        Self::with_hostname_getter(targets_path, rules_dir, SystemHostnameGetter::default())
    }
}

impl<H: HostnameGetter> FileSdPublisher<H> {
    pub fn with_hostname_getter(targets_path: &Path, rules_dir: &Path, hostname_getter: H) -> Self {
        Self {
            targets_path: targets_path.to_path_buf(),
            rules_dir: rules_dir.to_path_buf(),
            hostname_getter,
        }
    }

    pub fn alerts_path(&self) -> PathBuf {
        self.rules_dir.join(ALERTS_TARGET_FILE)
    }

    fn render_targets(&self, target: &ScrapeTarget) -> Result<String, PublishError> {
        let instance = self
            .hostname_getter
            .get()
            .map_err(|e| PublishError::Hostname(e.to_string()))?
            .to_string_lossy()
            .into_owned();
        let groups = [TargetGroup {
            targets: vec![target.address()],
            labels: Labels {
                job: target.job(),
                instance,
                metrics_path: target.path(),
            },
        }];
        Ok(serde_json::to_string_pretty(&groups)?)
    }
}

/// Writes `content` unless the file already holds it. Returns whether the file was written.
fn write_if_changed(path: &Path, content: &str) -> Result<bool, PublishError> {
    match fs::read_to_string(path) {
        Ok(current) if current == content => return Ok(false),
        Err(e) if e.kind() != ErrorKind::NotFound => return Err(e.into()),
        _ => {}
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, content)?;
    fs::rename(tmp, path)?;
    Ok(true)
}

fn remove_if_exists(path: &Path) -> Result<bool, PublishError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

impl<H: HostnameGetter> EndpointPublisher for FileSdPublisher<H> {
    fn publish(&self, target: &ScrapeTarget, rules: Option<String>) -> Result<(), PublishError> {
        let targets = self.render_targets(target)?;
        if write_if_changed(&self.targets_path, &targets)? {
            info!(%target, path = %self.targets_path.display(), "scrape target published");
        } else {
            debug!(%target, "scrape target unchanged");
        }

        match rules {
            Some(rules) => {
                if write_if_changed(&self.alerts_path(), &rules)? {
                    info!(path = %self.alerts_path().display(), "alert rules published");
                }
            }
            None => {
                if remove_if_exists(&self.alerts_path())? {
                    info!("alert rules withdrawn");
                }
            }
        }
        Ok(())
    }

    fn retract(&self) -> Result<(), PublishError> {
        if remove_if_exists(&self.targets_path)? {
            info!(path = %self.targets_path.display(), "scrape target retracted");
        }
        remove_if_exists(&self.alerts_path())?;
        // the rules directory belongs to this unit, only drop it once empty
        if let Err(e) = fs::remove_dir(&self.rules_dir) {
            debug!(path = %self.rules_dir.display(), "rules directory kept: {}", e);
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::utils::hostname::MockHostnameGetter;
    use assert_matches::assert_matches;
    use nix::errno::Errno;
    use serde_json::{json, Value};
    use std::time::SystemTime;
    use tempfile::tempdir;

    fn target() -> ScrapeTarget {
        ScrapeTarget::new("localhost", 9100, "metrics", Some("node-exporter".to_string()))
    }

    fn modified(path: &Path) -> SystemTime {
        fs::metadata(path).unwrap().modified().unwrap()
    }

    #[test]
    fn test_publish_writes_file_sd_document() {
        let dir = tempdir().unwrap();
        let targets_path = dir.path().join("targets.json");
        let mut hostname = MockHostnameGetter::new();
        hostname.should_get("node-1".to_string());
        let publisher =
            FileSdPublisher::with_hostname_getter(&targets_path, &dir.path().join("rules"), hostname);

        publisher.publish(&target(), None).unwrap();

        let document: Value =
            serde_json::from_str(&fs::read_to_string(&targets_path).unwrap()).unwrap();
        assert_eq!(
            json!([{
                "targets": ["localhost:9100"],
                "labels": {
                    "job": "node-exporter",
                    "instance": "node-1",
                    "__metrics_path__": "/metrics"
                }
            }]),
            document
        );
    }

    #[test]
    fn test_publish_is_idempotent() {
        let dir = tempdir().unwrap();
        let targets_path = dir.path().join("targets.json");
        let mut hostname = MockHostnameGetter::new();
        hostname.should_get("node-1".to_string());
        hostname.should_get("node-1".to_string());
        let publisher =
            FileSdPublisher::with_hostname_getter(&targets_path, &dir.path().join("rules"), hostname);

        publisher.publish(&target(), None).unwrap();
        let first = modified(&targets_path);
        std::thread::sleep(std::time::Duration::from_millis(20));
        publisher.publish(&target(), None).unwrap();

        assert_eq!(first, modified(&targets_path));
    }

    #[test]
    fn test_publish_and_retract_rules() {
        let dir = tempdir().unwrap();
        let targets_path = dir.path().join("targets.json");
        let rules_dir = dir.path().join("node-exporter-0");
        let mut hostname = MockHostnameGetter::new();
        hostname.should_get("node-1".to_string());
        let publisher = FileSdPublisher::with_hostname_getter(&targets_path, &rules_dir, hostname);
        let rules = "groups:\n- name: node\n  rules: []\n".to_string();

        publisher.publish(&target(), Some(rules.clone())).unwrap();
        assert_eq!(
            rules,
            fs::read_to_string(rules_dir.join(ALERTS_TARGET_FILE)).unwrap()
        );

        publisher.retract().unwrap();
        assert!(!targets_path.exists());
        assert!(!rules_dir.exists());
        // retracting twice is fine
        publisher.retract().unwrap();
    }

    #[test]
    fn test_publish_fails_without_hostname() {
        let dir = tempdir().unwrap();
        let mut hostname = MockHostnameGetter::new();
        hostname.should_not_get(Errno::ENOENT);
        let publisher = FileSdPublisher::with_hostname_getter(
            &dir.path().join("targets.json"),
            dir.path(),
            hostname,
        );

        assert_matches!(
            publisher.publish(&target(), None),
            Err(PublishError::Hostname(_))
        );
    }
}
