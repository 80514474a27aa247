//! Secure development lifecycle system events.
//!
//! Service lifecycle transitions of the managed exporter (start, stop, restart) are logged at WARN
//! level in a fixed structured shape, so unapproved restarts or shutdowns can be told apart from
//! regular operator activity when auditing the host logs.
use std::fmt::Display;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SystemEvent {
    Startup,
    Shutdown,
    Restart,
}

impl SystemEvent {
    fn code(&self) -> &'static str {
        match self {
            SystemEvent::Startup => "sys_startup",
            SystemEvent::Shutdown => "sys_shutdown",
            SystemEvent::Restart => "sys_restart",
        }
    }

    pub fn description(&self, service: &str) -> String {
        match self {
            SystemEvent::Startup => format!("snap-exporter start service {service}"),
            SystemEvent::Shutdown => format!("snap-exporter shutdown service {service}"),
            SystemEvent::Restart => format!("snap-exporter restart service {service}"),
        }
    }
}

impl Display for SystemEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

pub fn log_system_event(event: SystemEvent, service: &str, msg: &str) {
    let unix_time = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    let description = format!("{} {}", event.description(service), msg);

    warn!(
        datetime = unix_time,
        appid = %format!("service.{service}"),
        event = %format!("{event}:{service}"),
        level = "WARN",
        description = description.trim(),
        "ssdlc system event"
    );
}
