use std::collections::BTreeSet;
use std::fmt::Display;

use super::observed::ObservedState;
use crate::config::desired::ValidatedSpec;
use crate::package::PackageName;

/// A single step towards the desired state. Every action is idempotent: executing it twice leaves
/// the package as executing it once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Install(PackageName),
    Refresh(PackageName),
    WriteConfig(PackageName),
    ConnectPlug(PackageName, String),
    Start(PackageName),
    Restart(PackageName),
    Stop(PackageName),
    /// Releases the package for this unit, uninstalling it when no other unit uses it.
    Remove(PackageName),
}

impl Action {
    pub fn package(&self) -> &PackageName {
        match self {
            Action::Install(p)
            | Action::Refresh(p)
            | Action::WriteConfig(p)
            | Action::ConnectPlug(p, _)
            | Action::Start(p)
            | Action::Restart(p)
            | Action::Stop(p)
            | Action::Remove(p) => p,
        }
    }
}

impl Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Action::Install(p) => write!(f, "Install({p})"),
            Action::Refresh(p) => write!(f, "Refresh({p})"),
            Action::WriteConfig(p) => write!(f, "WriteConfig({p})"),
            Action::ConnectPlug(p, plug) => write!(f, "ConnectPlug({p}:{plug})"),
            Action::Start(p) => write!(f, "Start({p})"),
            Action::Restart(p) => write!(f, "Restart({p})"),
            Action::Stop(p) => write!(f, "Stop({p})"),
            Action::Remove(p) => write!(f, "Remove({p})"),
        }
    }
}

/// Ordered actions of one reconciliation. Built and discarded within the cycle.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Plan(Vec<Action>);

impl Plan {
    /// Actions releasing a package this unit no longer wants. A package other units still use is
    /// left running.
    pub fn release(package: &PackageName, shared: bool) -> Self {
        let mut actions = Vec::with_capacity(2);
        if !shared {
            actions.push(Action::Stop(package.clone()));
        }
        actions.push(Action::Remove(package.clone()));
        Self(actions)
    }

    /// Actions converging the observed package to the desired one.
    ///
    /// An install or refresh is always followed by the configuration and ends with a start. A
    /// configuration or plug change on a running package needs a restart only when the backend
    /// does not pick changes up by itself.
    pub fn converge(
        desired: &ValidatedSpec,
        observed: &ObservedState,
        restart_on_config_change: bool,
    ) -> Self {
        let package = &desired.package;
        let mut actions = Vec::new();

        let fresh = match observed.installed() {
            None => {
                actions.push(Action::Install(package.clone()));
                true
            }
            Some(installed) if !desired.release.is_satisfied_by(installed) => {
                actions.push(Action::Refresh(package.clone()));
                true
            }
            Some(_) => false,
        };

        let config_changed = observed.applied_config() != &desired.config;
        if fresh || config_changed {
            actions.push(Action::WriteConfig(package.clone()));
        }

        let connected: &BTreeSet<String> = observed.connected_plugs();
        let missing_plugs: Vec<&String> = desired
            .plugs
            .iter()
            .filter(|plug| !connected.contains(*plug))
            .collect();
        for plug in &missing_plugs {
            actions.push(Action::ConnectPlug(package.clone(), plug.to_string()));
        }

        if fresh || !observed.is_running() {
            actions.push(Action::Start(package.clone()));
        } else if (config_changed || !missing_plugs.is_empty()) && restart_on_config_change {
            actions.push(Action::Restart(package.clone()));
        }

        Self(actions)
    }

    pub fn extend(&mut self, other: Plan) {
        self.0.extend(other.0);
    }

    pub fn actions(&self) -> &[Action] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl From<Vec<Action>> for Plan {
    fn from(actions: Vec<Action>) -> Self {
        Self(actions)
    }
}

impl Display for Plan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let actions: Vec<String> = self.0.iter().map(Action::to_string).collect();
        write!(f, "[{}]", actions.join(", "))
    }
}
