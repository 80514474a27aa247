//! Convergence of the host towards the desired exporter.
//!
//! Every reconciliation observes the package from scratch, diffs it against the validated desired
//! state into a [`Plan`] and executes the plan in order, stopping at the first failing action. The
//! unit status is derived at the end from what was observed and executed; nothing of a cycle
//! outlives it besides the name of the managed package.
pub mod observed;
pub mod plan;
pub mod state;

use thiserror::Error;
use tracing::{debug, info, info_span, warn};
use ulid::Ulid;

use crate::config::desired::ValidatedSpec;
use crate::config::{ConfigError, DesiredSpec};
use crate::health::EndpointProbe;
use crate::logging::ssdlc::{log_system_event, SystemEvent};
use crate::package::registry::{RegistryError, UnitRegistry};
use crate::package::{Confinement, PackageBackend, PackageError, PackageName, Release};
use crate::publisher::EndpointPublisher;
use crate::render::ConfigBlob;
use crate::status::{derive_status, EndpointCheck, UnitStatus};
use observed::{flatten_applied, observe, ObservedState};
use plan::{Action, Plan};
use state::{ManagedState, StateError, StateStore};

#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("{0}")]
    Package(#[from] PackageError),

    #[error("unit registry: {0}")]
    Registry(#[from] RegistryError),

    #[error("managed state: {0}")]
    State(#[from] StateError),

    #[error("`{0}` cannot run without a desired package")]
    Unsupported(String),
}

impl ReconcileError {
    pub fn is_transient(&self) -> bool {
        match self {
            ReconcileError::Package(err) => err.is_transient(),
            _ => false,
        }
    }
}

/// How the execution of a plan ended.
#[derive(Debug)]
pub enum Outcome {
    /// Every action succeeded, including the empty plan.
    Completed,
    /// `action` failed and the actions after it were not attempted.
    Failed {
        action: Action,
        error: ReconcileError,
    },
    /// The managed package was released on request.
    TornDown,
}

impl Outcome {
    pub fn is_transient_failure(&self) -> bool {
        matches!(self, Outcome::Failed { error, .. } if error.is_transient())
    }
}

/// Everything a reconciliation did, for callers needing more than the status.
#[derive(Debug)]
pub struct Reconciliation {
    pub plan: Plan,
    pub executed: Vec<Action>,
    pub outcome: Outcome,
    pub status: UnitStatus,
    /// Version of the package once reconciled, if installed.
    pub workload_version: Option<String>,
}

impl Reconciliation {
    fn blocked(err: &ConfigError) -> Self {
        Self {
            plan: Plan::default(),
            executed: Vec::new(),
            outcome: Outcome::Completed,
            status: derive_status(Err(err), &Outcome::Completed, None, &EndpointCheck::Skipped),
            workload_version: None,
        }
    }

    /// Whether the caller should try again later with the same desired state.
    pub fn should_retry(&self) -> bool {
        matches!(self.status, UnitStatus::Maintenance(_))
    }
}

/// Converges the host to a desired state, reporting what was done.
#[cfg_attr(test, mockall::automock)]
pub trait Reconcile {
    fn reconcile_report(&self, desired: &DesiredSpec) -> Reconciliation;
}

pub struct Reconciler<B, P, S, R, H>
where
    B: PackageBackend,
    P: EndpointPublisher,
    S: StateStore,
    R: UnitRegistry,
    H: EndpointProbe,
{
    backend: B,
    publisher: P,
    state_store: S,
    registry: R,
    probe: H,
}

impl<B, P, S, R, H> Reconciler<B, P, S, R, H>
where
    B: PackageBackend,
    P: EndpointPublisher,
    S: StateStore,
    R: UnitRegistry,
    H: EndpointProbe,
{
    pub fn new(backend: B, publisher: P, state_store: S, registry: R, probe: H) -> Self {
        Self {
            backend,
            publisher,
            state_store,
            registry,
            probe,
        }
    }

    pub fn reconcile(&self, desired: &DesiredSpec) -> UnitStatus {
        self.converge(desired).status
    }

    fn converge(&self, desired: &DesiredSpec) -> Reconciliation {
        let span = info_span!("reconcile", cycle = %Ulid::new());
        let _guard = span.enter();

        if desired.teardown {
            return self.teardown();
        }

        // nothing touches the host before the desired state is known to be valid
        let valid = match desired.validate() {
            Ok(valid) => valid,
            Err(err) => return Reconciliation::blocked(&err),
        };
        let package = &valid.package;

        let observed = observe(&self.backend, package);
        if observed.last_error().is_some() {
            return self.finish(Plan::default(), Vec::new(), Outcome::Completed, &valid, observed);
        }

        let converge = Plan::converge(&valid, &observed, self.backend.restart_on_config_change());
        if let Some(action) = converge
            .actions()
            .iter()
            .find(|a| matches!(a, Action::Install(_) | Action::Refresh(_)))
        {
            match self.check_release(&valid) {
                Ok(None) => {}
                Ok(Some(err)) => return Reconciliation::blocked(&err),
                Err(error) => {
                    let outcome = Outcome::Failed {
                        action: action.clone(),
                        error: error.into(),
                    };
                    return self.finish(converge, Vec::new(), outcome, &valid, observed);
                }
            }
        }

        let release = self.release_plan(package);
        let mut plan = release.clone();
        plan.extend(converge.clone());
        debug!(%plan, "plan computed");

        let (mut executed, outcome) = self.execute(&release, |action| self.apply_release(action));
        let outcome = match outcome {
            Outcome::Completed => {
                self.track(package);
                let (converged, outcome) =
                    self.execute(&converge, |action| self.apply(action, &valid));
                executed.extend(converged);
                outcome
            }
            failed => failed,
        };

        self.finish(plan, executed, outcome, &valid, observed)
    }

    /// Derives the status of a cycle, re-observing the package and publishing its endpoint when
    /// every action succeeded.
    fn finish(
        &self,
        plan: Plan,
        executed: Vec<Action>,
        outcome: Outcome,
        valid: &ValidatedSpec,
        observed: ObservedState,
    ) -> Reconciliation {
        let observed = match outcome {
            Outcome::Completed if !executed.is_empty() => observe(&self.backend, &valid.package),
            _ => observed,
        };

        let endpoint = match outcome {
            Outcome::Completed if observed.is_running() && observed.last_error().is_none() => {
                self.probe.probe(&valid.target)
            }
            _ => EndpointCheck::Skipped,
        };

        let status = derive_status(Ok(()), &outcome, Some(&observed), &endpoint);
        if status.is_active() {
            if let Err(err) = self
                .publisher
                .publish(&valid.target, valid.alert_rules.clone())
            {
                warn!(scrape_target = %valid.target, "could not publish the scrape target: {}", err);
            }
        }

        Reconciliation {
            plan,
            executed,
            outcome,
            status,
            workload_version: observed.version().map(String::from),
        }
    }

    fn teardown(&self) -> Reconciliation {
        info!("tearing down the managed exporter");
        let plan = match self.managed_package() {
            Some(package) => {
                let shared = self.is_shared(&package);
                Plan::release(&package, shared)
            }
            None => Plan::default(),
        };

        let (executed, outcome) = self.execute(&plan, |action| self.apply_release(action));
        if let Err(err) = self.publisher.retract() {
            warn!("could not retract the scrape target: {}", err);
        }

        let outcome = match outcome {
            Outcome::Completed => Outcome::TornDown,
            failed => failed,
        };
        Reconciliation {
            status: derive_status(Ok(()), &outcome, None, &EndpointCheck::Skipped),
            plan,
            executed,
            outcome,
            workload_version: None,
        }
    }

    /// Runs the actions in order, stopping at the first failure.
    fn execute<F>(&self, plan: &Plan, apply: F) -> (Vec<Action>, Outcome)
    where
        F: Fn(&Action) -> Result<(), ReconcileError>,
    {
        let mut executed = Vec::with_capacity(plan.len());
        for action in plan.actions() {
            info!(%action, "executing");
            if let Err(error) = apply(action) {
                return (
                    executed,
                    Outcome::Failed {
                        action: action.clone(),
                        error,
                    },
                );
            }
            executed.push(action.clone());
        }
        (executed, Outcome::Completed)
    }

    fn apply(&self, action: &Action, desired: &ValidatedSpec) -> Result<(), ReconcileError> {
        match action {
            Action::Install(package) => {
                self.backend
                    .install(package, &desired.release, desired.classic)?;
            }
            Action::Refresh(package) => {
                self.backend
                    .refresh(package, &desired.release, desired.classic)?;
            }
            Action::WriteConfig(package) => self.write_config(package, &desired.config)?,
            Action::ConnectPlug(package, plug) => self.backend.connect(package, plug)?,
            Action::Start(package) => {
                self.backend.start(package)?;
                log_system_event(SystemEvent::Startup, package, "");
            }
            Action::Restart(package) => {
                self.backend.restart(package)?;
                log_system_event(SystemEvent::Restart, package, "to apply configuration");
            }
            Action::Stop(_) | Action::Remove(_) => self.apply_release(action)?,
        }
        Ok(())
    }

    fn apply_release(&self, action: &Action) -> Result<(), ReconcileError> {
        match action {
            Action::Stop(package) => {
                ignore_missing(self.backend.stop(package))?;
                log_system_event(SystemEvent::Shutdown, package, "");
            }
            Action::Remove(package) => self.remove(package)?,
            other => return Err(ReconcileError::Unsupported(other.to_string())),
        }
        Ok(())
    }

    /// Sets the rendered options, unsetting first the applied ones no longer desired.
    fn write_config(&self, package: &PackageName, config: &ConfigBlob) -> Result<(), PackageError> {
        let applied = flatten_applied(&self.backend.config(package)?)?;
        let stale: Vec<String> = applied
            .into_keys()
            .filter(|key| !config.options().contains_key(key))
            .collect();
        if !stale.is_empty() {
            debug!(%package, ?stale, "unsetting options");
        }
        self.backend.unset_config(package, &stale)?;
        self.backend.set_config(package, config.options())
    }

    /// Releases the unit's hold on the package, uninstalling it when no other unit uses it.
    fn remove(&self, package: &PackageName) -> Result<(), ReconcileError> {
        self.registry.unregister(package)?;
        if self.registry.is_used_by_other_units(package)? {
            info!(%package, "package kept, other units still use it");
        } else {
            ignore_missing(self.backend.remove(package))?;
        }

        let state = self.state_store.get()?;
        if state.package.as_ref() == Some(package) {
            self.state_store.set(&ManagedState::default())?;
        }
        Ok(())
    }

    /// Actions releasing a previously managed package other than `desired`.
    fn release_plan(&self, desired: &PackageName) -> Plan {
        match self.managed_package() {
            Some(previous) if previous != *desired => {
                info!(%previous, %desired, "managed package changed");
                let shared = self.is_shared(&previous);
                Plan::release(&previous, shared)
            }
            _ => Plan::default(),
        }
    }

    /// Records the package as managed by this unit.
    fn track(&self, package: &PackageName) {
        if let Err(err) = self.registry.register(package) {
            warn!(%package, "could not register the unit: {}", err);
        }
        if self.managed_package().as_ref() == Some(package) {
            return;
        }
        let state = ManagedState {
            package: Some(package.clone()),
        };
        if let Err(err) = self.state_store.set(&state) {
            warn!(%package, "could not persist the managed package: {}", err);
        }
    }

    fn managed_package(&self) -> Option<PackageName> {
        match self.state_store.get() {
            Ok(state) => state.package,
            Err(err) => {
                warn!("could not read the managed state: {}", err);
                None
            }
        }
    }

    // an unknown registry keeps the package around
    fn is_shared(&self, package: &PackageName) -> bool {
        self.registry
            .is_used_by_other_units(package)
            .unwrap_or_else(|err| {
                warn!(%package, "could not read the unit registry: {}", err);
                true
            })
    }

    /// Checks the desired release against the store: the channel must publish a revision and a
    /// classic package needs classic confinement enabled.
    fn check_release(&self, desired: &ValidatedSpec) -> Result<Option<ConfigError>, PackageError> {
        let info = self.backend.info(&desired.package)?;
        if let Release::Channel(channel) = &desired.release {
            if info.channel(channel).is_none() {
                return Ok(Some(ConfigError::ChannelUnavailable {
                    package: desired.package.to_string(),
                    channel: channel.clone(),
                }));
            }
        }
        if info.confinement == Confinement::Classic && !desired.classic {
            return Ok(Some(ConfigError::ClassicRequired(desired.package.to_string())));
        }
        Ok(None)
    }
}

impl<B, P, S, R, H> Reconcile for Reconciler<B, P, S, R, H>
where
    B: PackageBackend,
    P: EndpointPublisher,
    S: StateStore,
    R: UnitRegistry,
    H: EndpointProbe,
{
    fn reconcile_report(&self, desired: &DesiredSpec) -> Reconciliation {
        self.converge(desired)
    }
}

fn ignore_missing(result: Result<(), PackageError>) -> Result<(), PackageError> {
    match result {
        Err(PackageError::NotFound(reason)) => {
            debug!("nothing to do, package is missing: {}", reason);
            Ok(())
        }
        other => other,
    }
}
