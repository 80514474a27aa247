pub mod channel;

use std::fmt::Display;

use crate::context::Coalesce;

/// Reasons a reconciliation is requested.
#[derive(Clone, Debug, PartialEq)]
pub enum Trigger {
    Startup,
    UpdateStatus,
    ConfigChanged,
    Retry,
}

impl Display for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Trigger::Startup => "startup",
            Trigger::UpdateStatus => "update-status",
            Trigger::ConfigChanged => "config-changed",
            Trigger::Retry => "retry",
        };
        write!(f, "{name}")
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum OperatorEvent {
    Reconcile(Trigger),
    // exit leaving the package as it is
    Stop,
}

/// Only the latest desired state matters: reconcile requests collapse into the newest one,
/// while `Stop` is never dropped in favour of a reconcile request.
impl Coalesce for OperatorEvent {
    fn coalesce(self, pending: Self) -> Self {
        match (self, pending) {
            (_, OperatorEvent::Stop) => OperatorEvent::Stop,
            (newest, _) => newest,
        }
    }
}
