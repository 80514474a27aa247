use std::thread;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

use super::EndpointProbe;
use crate::config::operator_config::ProbeConfig;
use crate::publisher::ScrapeTarget;
use crate::status::EndpointCheck;

const HEALTHY_STATUS_CODE: u16 = 200;

/// An enumeration of potential errors related to the HTTP client.
#[derive(Error, Debug)]
pub enum HttpClientError {
    #[error("internal HTTP client error: `{0}`")]
    HttpClientError(String),
}

/// The `HttpClient` trait defines the HTTP get interface to be implemented by HTTP clients.
#[cfg_attr(test, mockall::automock)]
pub trait HttpClient {
    /// Returns the status code of the response, whatever it is.
    fn get(&self, url: &str) -> Result<u16, HttpClientError>;
}

/// An implementation of the `HttpClient` trait using the ureq library.
impl HttpClient for ureq::Agent {
    fn get(&self, url: &str) -> Result<u16, HttpClientError> {
        match self.get(url).call() {
            Ok(response) | Err(ureq::Error::Status(_, response)) => Ok(response.status()),
            Err(ureq::Error::Transport(e)) => Err(HttpClientError::HttpClientError(e.to_string())),
        }
    }
}

/// Probes the metrics endpoint over HTTP a bounded number of times, a fixed interval apart.
pub struct HttpEndpointProbe<C = ureq::Agent>
where
    C: HttpClient,
{
    client: C,
    enabled: bool,
    attempts: usize,
    interval: Duration,
}

impl HttpEndpointProbe<ureq::Agent> {
    pub fn new(config: &ProbeConfig) -> Self {
        let client = ureq::AgentBuilder::new()
            .timeout_connect(config.timeout)
            .timeout(config.timeout)
            .build();
        Self::with_client(client, config)
    }
}

impl<C: HttpClient> HttpEndpointProbe<C> {
    pub fn with_client(client: C, config: &ProbeConfig) -> Self {
        Self {
            client,
            enabled: config.enabled,
            attempts: config.attempts.max(1),
            interval: config.interval,
        }
    }

    fn check(&self, url: &str) -> bool {
        match self.client.get(url) {
            Ok(HEALTHY_STATUS_CODE) => true,
            Ok(code) => {
                debug!(url, code, "metrics endpoint answered with an unexpected status");
                false
            }
            Err(err) => {
                warn!(url, "Metrics endpoint is not reachable yet: {}", err);
                false
            }
        }
    }
}

impl<C: HttpClient> EndpointProbe for HttpEndpointProbe<C> {
    fn probe(&self, target: &ScrapeTarget) -> EndpointCheck {
        if !self.enabled {
            return EndpointCheck::Skipped;
        }

        let url = target.url();
        for attempt in 1..=self.attempts {
            if self.check(&url) {
                return EndpointCheck::Reachable(target.clone());
            }
            if attempt < self.attempts {
                thread::sleep(self.interval);
            }
        }
        EndpointCheck::Unreachable(target.clone())
    }
}
