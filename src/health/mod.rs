pub mod http;

use crate::publisher::ScrapeTarget;
use crate::status::EndpointCheck;

pub use http::HttpEndpointProbe;

/// Checks that the metrics endpoint of the exporter answers before the unit is reported active.
#[cfg_attr(test, mockall::automock)]
pub trait EndpointProbe {
    fn probe(&self, target: &ScrapeTarget) -> EndpointCheck;
}
