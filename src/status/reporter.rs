use std::fs;
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use super::{StatusKind, UnitStatus};
use crate::event::channel::EventConsumer;

#[derive(Error, Debug)]
pub enum StatusWriteError {
    #[error("error writing status: `{0}`")]
    IOError(#[from] std::io::Error),

    #[error("error serializing status: `{0}`")]
    SerdeYamlError(#[from] serde_yaml::Error),
}

/// Status of a finished reconciliation, sent to the reporter.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusReport {
    pub status: UnitStatus,
    /// Version of the managed package, empty when nothing is installed.
    pub workload_version: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "kebab-case")]
struct StatusDocument<'a> {
    status: StatusKind,
    message: &'a str,
    workload_version: &'a str,
    updated_at: u64,
}

#[cfg_attr(test, mockall::automock)]
pub trait StatusWriter {
    fn write(&self, report: &StatusReport) -> Result<(), StatusWriteError>;
}

/// Writes the latest status as a small YAML document, replacing the previous one.
pub struct StatusFile {
    path: PathBuf,
}

impl StatusFile {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }
}

impl StatusWriter for StatusFile {
    fn write(&self, report: &StatusReport) -> Result<(), StatusWriteError> {
        let updated_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        let document = StatusDocument {
            status: report.status.kind(),
            message: report.status.message(),
            workload_version: &report.workload_version,
            updated_at,
        };
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        // write aside and rename so readers never see a partial document
        let tmp = self.path.with_extension("yaml.tmp");
        fs::write(&tmp, serde_yaml::to_string(&document)?)?;
        fs::rename(tmp, &self.path)?;
        Ok(())
    }
}

/// Spawns the thread that logs and persists every status report. The thread ends once every
/// publisher of the channel has been dropped.
pub fn spawn_reporter<W>(consumer: EventConsumer<StatusReport>, writer: W) -> JoinHandle<()>
where
    W: StatusWriter + Send + 'static,
{
    thread::spawn(move || {
        debug!("status reporter started");
        while let Ok(report) = consumer.consume() {
            report.status.log();
            if let Err(err) = writer.write(&report) {
                warn!("could not persist status: {}", err);
            }
        }
        debug!("status reporter finished");
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::event::channel::pub_sub;
    use mockall::predicate;
    use tempfile::tempdir;

    impl MockStatusWriter {
        pub fn should_write(&mut self, report: StatusReport) {
            self.expect_write()
                .with(predicate::eq(report))
                .once()
                .returning(|_| Ok(()));
        }
    }

    #[test]
    fn test_status_file_content() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state").join("status.yaml");
        let file = StatusFile::new(&path);

        file.write(&StatusReport {
            status: UnitStatus::Active("node-exporter 1.8.2".to_string()),
            workload_version: "1.8.2".to_string(),
        })
        .unwrap();

        let content: serde_yaml::Value =
            serde_yaml::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!("active", content["status"].as_str().unwrap());
        assert_eq!("node-exporter 1.8.2", content["message"].as_str().unwrap());
        assert_eq!("1.8.2", content["workload-version"].as_str().unwrap());
        assert!(content["updated-at"].as_u64().is_some());
    }

    #[test]
    fn test_reporter_writes_every_report() {
        let (publisher, consumer) = pub_sub();
        let blocked = StatusReport {
            status: UnitStatus::Blocked("Missing required configuration fields: snap-name".into()),
            workload_version: String::new(),
        };
        let active = StatusReport {
            status: UnitStatus::Active("node-exporter 1.8.2".into()),
            workload_version: "1.8.2".into(),
        };

        let mut writer = MockStatusWriter::new();
        writer.should_write(blocked.clone());
        writer.should_write(active.clone());

        let handle = spawn_reporter(consumer, writer);
        publisher.publish(blocked).unwrap();
        publisher.publish(active).unwrap();
        drop(publisher);
        handle.join().unwrap();
    }
}
