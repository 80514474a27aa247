pub mod reporter;

use std::fmt::Display;

use serde::Serialize;
use tracing::{error, info, warn};

use crate::config::ConfigError;
use crate::publisher::ScrapeTarget;
use crate::reconciler::observed::ObservedState;
use crate::reconciler::Outcome;

/// Status of the unit, derived from scratch on every reconciliation and never stored as a source
/// of truth.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitStatus {
    /// Input needs a human: invalid or incomplete configuration.
    Blocked(String),
    /// Nothing is wrong yet but the exporter is not serving.
    Waiting(String),
    /// An activity is in progress or will be retried.
    Maintenance(String),
    Active(String),
    /// An action failed and will not be retried without a new trigger.
    Error(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusKind {
    Blocked,
    Waiting,
    Maintenance,
    Active,
    Error,
}

impl Display for StatusKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self {
            StatusKind::Blocked => "blocked",
            StatusKind::Waiting => "waiting",
            StatusKind::Maintenance => "maintenance",
            StatusKind::Active => "active",
            StatusKind::Error => "error",
        };
        write!(f, "{kind}")
    }
}

impl UnitStatus {
    pub fn kind(&self) -> StatusKind {
        match self {
            UnitStatus::Blocked(_) => StatusKind::Blocked,
            UnitStatus::Waiting(_) => StatusKind::Waiting,
            UnitStatus::Maintenance(_) => StatusKind::Maintenance,
            UnitStatus::Active(_) => StatusKind::Active,
            UnitStatus::Error(_) => StatusKind::Error,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            UnitStatus::Blocked(m)
            | UnitStatus::Waiting(m)
            | UnitStatus::Maintenance(m)
            | UnitStatus::Active(m)
            | UnitStatus::Error(m) => m,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, UnitStatus::Active(_))
    }

    /// Logs the status at a level matching its severity.
    pub fn log(&self) {
        match self {
            UnitStatus::Blocked(_) => warn!(status = %self.kind(), "{}", self.message()),
            UnitStatus::Error(_) => error!(status = %self.kind(), "{}", self.message()),
            _ => info!(status = %self.kind(), "{}", self.message()),
        }
    }
}

impl Display for UnitStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind(), self.message())
    }
}

/// Result of probing the metrics endpoint of the exporter.
#[derive(Debug, Clone, PartialEq)]
pub enum EndpointCheck {
    /// The package was not running, or probing is disabled.
    Skipped,
    Reachable(ScrapeTarget),
    Unreachable(ScrapeTarget),
}

/// Derives the unit status from the validity of the desired state, the outcome of the last plan
/// execution, the state observed afterwards and the endpoint probe. The first matching rule wins:
///
/// 1. invalid desired state is `Blocked`.
/// 2. a failed action is `Maintenance` when transient, `Error` otherwise.
/// 3. a completed teardown is `Waiting`.
/// 4. a package that is missing, stopped or not serving metrics is `Waiting`.
/// 5. everything else is `Active`.
pub fn derive_status(
    validity: Result<(), &ConfigError>,
    outcome: &Outcome,
    observed: Option<&ObservedState>,
    endpoint: &EndpointCheck,
) -> UnitStatus {
    if let Err(err) = validity {
        return UnitStatus::Blocked(err.to_string());
    }

    match outcome {
        Outcome::Failed { action, error } if error.is_transient() => {
            return UnitStatus::Maintenance(format!("Retrying {action}: {error}"));
        }
        Outcome::Failed { action, error } => {
            return UnitStatus::Error(format!("{action} failed: {error}"));
        }
        Outcome::TornDown => {
            return UnitStatus::Waiting("Exporter removed".to_string());
        }
        Outcome::Completed => {}
    }

    let Some(observed) = observed else {
        return UnitStatus::Waiting("Waiting for the package state".to_string());
    };
    let package = observed.package();

    if let Some(err) = observed.last_error() {
        if err.is_transient() {
            return UnitStatus::Maintenance(format!("Querying snap {package}: {err}"));
        }
        return UnitStatus::Error(format!("Could not query snap {package}: {err}"));
    }
    if !observed.is_installed() {
        return UnitStatus::Waiting(format!("Snap {package} is not installed."));
    }
    if !observed.is_running() {
        return UnitStatus::Waiting(format!("Snap services for {package} are not active."));
    }

    match endpoint {
        EndpointCheck::Unreachable(_) => {
            UnitStatus::Waiting(format!("Metrics endpoint for {package} is not reachable."))
        }
        EndpointCheck::Reachable(target) => UnitStatus::Active(format!(
            "{package} {} serving {target}",
            observed.version().unwrap_or_default()
        )),
        EndpointCheck::Skipped => UnitStatus::Active(format!(
            "{package} {}",
            observed.version().unwrap_or_default()
        )),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::package::{InstalledPackage, PackageError, PackageName};
    use crate::reconciler::plan::Action;
    use crate::reconciler::ReconcileError;
    use tracing_test::traced_test;

    fn node_exporter() -> PackageName {
        PackageName::new("node-exporter").unwrap()
    }

    fn target() -> ScrapeTarget {
        ScrapeTarget::new("localhost", 9100, "metrics", None)
    }

    fn running() -> ObservedState {
        ObservedState::fake(node_exporter())
            .with_installed(InstalledPackage {
                version: "1.8.2".to_string(),
                revision: "1904".to_string(),
                tracking: Some("latest/stable".to_string()),
            })
            .with_running(true)
    }

    #[test]
    fn test_display() {
        assert_eq!(
            "blocked: snap-name must be a non-empty string",
            UnitStatus::Blocked("snap-name must be a non-empty string".to_string()).to_string()
        );
        assert_eq!(StatusKind::Maintenance, UnitStatus::Maintenance(String::new()).kind());
    }

    #[traced_test]
    #[test]
    fn test_log_level_follows_severity() {
        UnitStatus::Blocked("Missing required configuration fields: snap-name".to_string()).log();
        UnitStatus::Error("Install(node-exporter) failed".to_string()).log();
        UnitStatus::Active("node-exporter 1.8.2".to_string()).log();

        logs_assert(|lines: &[&str]| {
            let logged_at = |level: &str, message: &str| {
                lines
                    .iter()
                    .any(|line| line.contains(level) && line.contains(message))
            };
            match (
                logged_at("WARN", "Missing required configuration fields"),
                logged_at("ERROR", "Install(node-exporter) failed"),
                logged_at("INFO", "node-exporter 1.8.2"),
            ) {
                (true, true, true) => Ok(()),
                found => Err(format!("unexpected log levels: {found:?}")),
            }
        });
    }

    #[test]
    fn test_invalid_desired_state_is_blocked() {
        let err = ConfigError::MissingRequired(vec!["snap-name".to_string()]);
        let status = derive_status(
            Err(&err),
            &Outcome::Completed,
            Some(&running()),
            &EndpointCheck::Reachable(target()),
        );
        assert_eq!(
            UnitStatus::Blocked("Missing required configuration fields: snap-name".to_string()),
            status
        );
    }

    #[test]
    fn test_failed_action_is_error() {
        let outcome = Outcome::Failed {
            action: Action::WriteConfig(node_exporter()),
            error: ReconcileError::Package(PackageError::PermissionDenied("denied".to_string())),
        };
        let status = derive_status(Ok(()), &outcome, None, &EndpointCheck::Skipped);

        assert_eq!(StatusKind::Error, status.kind());
        assert!(status.message().starts_with("WriteConfig(node-exporter) failed"));
    }

    #[test]
    fn test_transient_failure_is_maintenance() {
        let outcome = Outcome::Failed {
            action: Action::Install(node_exporter()),
            error: ReconcileError::Package(PackageError::TransientIO("busy".to_string())),
        };
        let status = derive_status(Ok(()), &outcome, None, &EndpointCheck::Skipped);

        assert_eq!(StatusKind::Maintenance, status.kind());
    }

    #[test]
    fn test_stopped_package_is_waiting() {
        let observed = running().with_running(false);
        let status = derive_status(
            Ok(()),
            &Outcome::Completed,
            Some(&observed),
            &EndpointCheck::Skipped,
        );
        assert_eq!(
            UnitStatus::Waiting("Snap services for node-exporter are not active.".to_string()),
            status
        );
    }

    #[test]
    fn test_unreachable_endpoint_is_waiting() {
        let status = derive_status(
            Ok(()),
            &Outcome::Completed,
            Some(&running()),
            &EndpointCheck::Unreachable(target()),
        );
        assert_eq!(
            UnitStatus::Waiting("Metrics endpoint for node-exporter is not reachable.".to_string()),
            status
        );
    }

    #[test]
    fn test_running_and_serving_is_active() {
        let status = derive_status(
            Ok(()),
            &Outcome::Completed,
            Some(&running()),
            &EndpointCheck::Reachable(target()),
        );
        assert_eq!(
            UnitStatus::Active("node-exporter 1.8.2 serving localhost:9100/metrics".to_string()),
            status
        );
    }

    #[test]
    fn test_query_error_is_reported() {
        let observed = running().with_last_error(PackageError::TransientIO("busy".to_string()));
        let status = derive_status(
            Ok(()),
            &Outcome::Completed,
            Some(&observed),
            &EndpointCheck::Skipped,
        );
        assert_eq!(StatusKind::Maintenance, status.kind());
    }
}
