pub mod file_sd;

use std::fmt::Display;

use thiserror::Error;

pub use file_sd::FileSdPublisher;

const DEFAULT_SCHEME: &str = "http";

#[derive(Error, Debug)]
pub enum PublishError {
    #[error("error writing published files: `{0}`")]
    IOError(#[from] std::io::Error),

    #[error("error serializing scrape targets: `{0}`")]
    SerdeJsonError(#[from] serde_json::Error),

    #[error("could not resolve the hostname: `{0}`")]
    Hostname(String),
}

/// Where consumers scrape the exporter from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrapeTarget {
    host: String,
    port: u16,
    path: String,
    job: Option<String>,
}

impl ScrapeTarget {
    /// `path` is taken relative to the root: `metrics`, `/metrics` and `//metrics` are equivalent.
    pub fn new(host: &str, port: u16, path: &str, job: Option<String>) -> Self {
        Self {
            host: host.to_string(),
            port,
            path: format!("/{}", path.trim_start_matches('/')),
            job,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Metrics path, always starting with `/`.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn job(&self) -> Option<&str> {
        self.job.as_deref()
    }

    /// `host:port` as scrapers expect it.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn url(&self) -> String {
        format!("{DEFAULT_SCHEME}://{}{}", self.address(), self.path)
    }
}

impl Display for ScrapeTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.address(), self.path)
    }
}

/// Announces the scrape target of the exporter to its consumers.
#[cfg_attr(test, mockall::automock)]
pub trait EndpointPublisher {
    /// Publishes the target, together with the alerting rules when given. Publishing the same
    /// content again leaves the published files untouched.
    fn publish(&self, target: &ScrapeTarget, rules: Option<String>) -> Result<(), PublishError>;
    /// Withdraws any published target and rules.
    fn retract(&self) -> Result<(), PublishError>;
}
