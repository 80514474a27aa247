use std::cell::RefCell;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::backoff::{Backoff, BackoffConfig};
use crate::config::operator_config::OperatorConfig;
use crate::config::store::ConfigStore;
use crate::config::{ConfigError, DesiredSpec, OperatorSettings};
use crate::context::{Context, ContextError};
use crate::event::channel::EventPublisher;
use crate::event::{OperatorEvent, Trigger};
use crate::file_reader::FileReader;
use crate::reconciler::Reconcile;
use crate::status::reporter::StatusReport;
use crate::status::UnitStatus;

#[derive(Error, Debug)]
pub enum OperatorError {
    #[error("waiting for events: `{0}`")]
    Context(#[from] ContextError),
}

/// Drives the reconciliations of one unit: a single one in flight, triggered at startup, on every
/// status update tick and on retries of transient failures.
pub struct Operator<C, F, R>
where
    C: ConfigStore,
    F: FileReader,
    R: Reconcile,
{
    config_store: C,
    file_reader: F,
    reconciler: R,
    update_status_interval: Duration,
    retry: BackoffConfig,
    status_publisher: EventPublisher<StatusReport>,
    last_config: RefCell<Option<OperatorConfig>>,
}

impl<C, F, R> Operator<C, F, R>
where
    C: ConfigStore,
    F: FileReader,
    R: Reconcile,
{
    pub fn new(
        config_store: C,
        file_reader: F,
        reconciler: R,
        settings: &OperatorSettings,
        status_publisher: EventPublisher<StatusReport>,
    ) -> Self {
        Self {
            config_store,
            file_reader,
            reconciler,
            update_status_interval: settings.update_status_interval,
            retry: settings.retry.clone(),
            status_publisher,
            last_config: RefCell::new(None),
        }
    }

    /// Reconciles until `Stop` is received. Pending reconcile requests coalesce in
    /// the context, and an event arriving while a retry is pending preempts the retry.
    pub fn run(&self, ctx: Context<OperatorEvent>) -> Result<(), OperatorError> {
        info!("Starting the operator loop");
        let mut next = Some(OperatorEvent::Reconcile(Trigger::Startup));

        loop {
            let event = match next.take() {
                Some(event) => event,
                None => ctx
                    .wait_timeout(self.update_status_interval)?
                    .unwrap_or(OperatorEvent::Reconcile(Trigger::UpdateStatus)),
            };

            match event {
                OperatorEvent::Stop => {
                    info!("Stop requested, leaving the exporter as it is");
                    break;
                }
                OperatorEvent::Reconcile(trigger) => {
                    next = self.reconcile_with_retries(&ctx, trigger)?;
                }
            }
        }

        info!("Operator loop finished");
        Ok(())
    }

    /// Runs a single reconciliation of the configured desired state and reports its status.
    pub fn reconcile_once(&self, trigger: Trigger) -> StatusReport {
        self.reconcile(trigger).0
    }

    /// Removes everything the unit manages and reports the resulting status.
    pub fn teardown(&self) -> StatusReport {
        info!("Tearing down");
        let reconciliation = self.reconciler.reconcile_report(&DesiredSpec::teardown());
        self.report(StatusReport {
            status: reconciliation.status,
            workload_version: String::new(),
        })
    }

    fn reconcile_with_retries(
        &self,
        ctx: &Context<OperatorEvent>,
        trigger: Trigger,
    ) -> Result<Option<OperatorEvent>, OperatorError> {
        let mut backoff = Backoff::from(&self.retry);
        let mut trigger = trigger;

        loop {
            let (_, retry) = self.reconcile(trigger);
            if !retry {
                return Ok(None);
            }
            let Some(delay) = backoff.next_delay() else {
                warn!(
                    tries = backoff.tries().saturating_sub(1),
                    "Giving up retrying until the next status update"
                );
                return Ok(None);
            };

            debug!(?delay, "retrying the reconciliation");
            if let Some(event) = ctx.wait_timeout(delay)? {
                return Ok(Some(event));
            }
            trigger = Trigger::Retry;
        }
    }

    fn reconcile(&self, trigger: Trigger) -> (StatusReport, bool) {
        let desired = match self.desired(trigger) {
            Ok(desired) => desired,
            Err(err) => {
                let report = self.report(StatusReport {
                    status: UnitStatus::Blocked(err.to_string()),
                    workload_version: String::new(),
                });
                return (report, false);
            }
        };

        let reconciliation = self.reconciler.reconcile_report(&desired);
        let retry = reconciliation.should_retry();
        let report = self.report(StatusReport {
            status: reconciliation.status,
            workload_version: reconciliation.workload_version.unwrap_or_default(),
        });
        (report, retry)
    }

    fn desired(&self, trigger: Trigger) -> Result<DesiredSpec, ConfigError> {
        let config = self.config_store.load()?;
        let previous = self.last_config.replace(Some(config.clone()));
        let trigger = match previous {
            Some(previous) if previous != config => Trigger::ConfigChanged,
            _ => trigger,
        };
        info!(%trigger, "Reconciling");
        DesiredSpec::from_config(&config, &self.file_reader)
    }

    fn report(&self, report: StatusReport) -> StatusReport {
        if let Err(err) = self.status_publisher.publish(report.clone()) {
            warn!("status reporter is gone: {}", err);
        }
        report
    }
}
