use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use serde_json::{Map, Value};
use tracing::{debug, info};

use super::parser::{parse_connections, parse_info, parse_list, parse_services};
use super::{
    InstalledPackage, PackageBackend, PackageError, PackageInfo, PackageName, Release,
};
use crate::command::{CommandOutput, CommandRunner, ProcessRunner};
use crate::defaults::{DEFAULT_COMMAND_TIMEOUT, SNAP_BINARY};

const NO_CONFIGURATION: &str = "has no configuration";
const NO_SERVICES: &str = "no services";

/// Package backend driving the host `snap` command line.
pub struct SnapBackend<R = ProcessRunner>
where
    R: CommandRunner,
{
    runner: R,
    snap_binary: String,
    timeout: Duration,
}

impl Default for SnapBackend<ProcessRunner> {
    fn default() -> Self {
        Self::new(ProcessRunner)
    }
}

impl<R: CommandRunner> SnapBackend<R> {
    pub fn new(runner: R) -> Self {
        Self {
            runner,
            snap_binary: SNAP_BINARY.to_string(),
            timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    pub fn with_snap_binary(self, snap_binary: String) -> Self {
        Self {
            snap_binary,
            ..self
        }
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        Self { timeout, ..self }
    }

    /// Runs a snap subcommand, returning its output whatever the exit code.
    fn exec(&self, args: Vec<String>) -> Result<CommandOutput, PackageError> {
        let command = self.command_line(&args);
        debug!(command, "executing snap command");
        self.runner
            .run(&self.snap_binary, &args, self.timeout)
            .map_err(|e| PackageError::from_command_error(&command, e))
    }

    /// Runs a snap subcommand that must succeed.
    fn exec_ok(&self, args: Vec<String>) -> Result<CommandOutput, PackageError> {
        let command = self.command_line(&args);
        let output = self.exec(args)?;
        if !output.success() {
            return Err(PackageError::from_stderr(&command, &output.stderr));
        }
        Ok(output)
    }

    fn command_line(&self, args: &[String]) -> String {
        format!("{} {}", self.snap_binary, args.join(" "))
    }

    fn release_args(subcommand: &str, name: &PackageName, release: &Release, classic: bool) -> Vec<String> {
        let mut args = vec![subcommand.to_string(), name.to_string(), release.as_flag()];
        if classic {
            args.push("--classic".to_string());
        }
        args
    }

    fn hold(&self, name: &PackageName) -> Result<(), PackageError> {
        self.exec_ok(args(&["refresh", "--hold", name.as_str()]))?;
        Ok(())
    }

    /// Holds the package and leaves its services stopped: snapd starts them on install and refresh,
    /// before options and plugs are applied.
    fn settle(&self, name: &PackageName) -> Result<(), PackageError> {
        // installed snaps are only moved by the operator, never by the store refresh timer
        self.hold(name)?;
        self.stop(name)
    }
}

fn args(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

impl<R: CommandRunner> PackageBackend for SnapBackend<R> {
    fn info(&self, name: &PackageName) -> Result<PackageInfo, PackageError> {
        let output = self.exec_ok(args(&["info", "--verbose", name.as_str()]))?;
        parse_info(&output.stdout)
    }

    fn install(
        &self,
        name: &PackageName,
        release: &Release,
        classic: bool,
    ) -> Result<(), PackageError> {
        info!(package = %name, %release, "installing snap");
        self.exec_ok(Self::release_args("install", name, release, classic))?;
        self.settle(name)
    }

    fn refresh(
        &self,
        name: &PackageName,
        release: &Release,
        classic: bool,
    ) -> Result<(), PackageError> {
        info!(package = %name, %release, "refreshing snap");
        self.exec_ok(Self::release_args("refresh", name, release, classic))?;
        self.settle(name)
    }

    fn remove(&self, name: &PackageName) -> Result<(), PackageError> {
        info!(package = %name, "removing snap");
        self.exec_ok(args(&["remove", name.as_str()]))?;
        Ok(())
    }

    fn start(&self, name: &PackageName) -> Result<(), PackageError> {
        self.exec_ok(args(&["start", "--enable", name.as_str()]))?;
        Ok(())
    }

    fn stop(&self, name: &PackageName) -> Result<(), PackageError> {
        self.exec_ok(args(&["stop", "--disable", name.as_str()]))?;
        Ok(())
    }

    fn restart(&self, name: &PackageName) -> Result<(), PackageError> {
        self.exec_ok(args(&["restart", name.as_str()]))?;
        Ok(())
    }

    fn installed(&self, name: &PackageName) -> Result<Option<InstalledPackage>, PackageError> {
        let command_args = args(&["list", name.as_str()]);
        let command = self.command_line(&command_args);
        let output = self.exec(command_args)?;
        if output.success() {
            return Ok(parse_list(&output.stdout, name));
        }
        match PackageError::from_stderr(&command, &output.stderr) {
            PackageError::NotFound(_) => Ok(None),
            err => Err(err),
        }
    }

    fn is_running(&self, name: &PackageName) -> Result<bool, PackageError> {
        let command_args = args(&["services", name.as_str()]);
        let command = self.command_line(&command_args);
        let output = self.exec(command_args)?;
        if !output.success() {
            if output.stderr.to_lowercase().contains(NO_SERVICES) {
                return Ok(false);
            }
            return Err(PackageError::from_stderr(&command, &output.stderr));
        }
        let services = parse_services(&output.stdout);
        Ok(!services.is_empty() && services.values().all(|active| *active))
    }

    fn config(&self, name: &PackageName) -> Result<Map<String, Value>, PackageError> {
        let command_args = args(&["get", "-d", name.as_str()]);
        let command = self.command_line(&command_args);
        let output = self.exec(command_args)?;
        if !output.success() {
            if output.stderr.contains(NO_CONFIGURATION) {
                return Ok(Map::new());
            }
            return Err(PackageError::from_stderr(&command, &output.stderr));
        }
        match serde_json::from_str::<Value>(&output.stdout) {
            Ok(Value::Object(config)) => Ok(config),
            Ok(_) => Err(PackageError::UnexpectedOutput(format!(
                "`{command}` did not return an object"
            ))),
            Err(e) => Err(PackageError::UnexpectedOutput(e.to_string())),
        }
    }

    fn set_config(
        &self,
        name: &PackageName,
        options: &BTreeMap<String, Value>,
    ) -> Result<(), PackageError> {
        if options.is_empty() {
            return Ok(());
        }
        let mut command_args = args(&["set", "-t", name.as_str()]);
        // typed values: each option is passed as its JSON representation
        command_args.extend(
            options
                .iter()
                .map(|(key, value)| format!("{key}={value}")),
        );
        self.exec_ok(command_args)?;
        Ok(())
    }

    fn unset_config(&self, name: &PackageName, keys: &[String]) -> Result<(), PackageError> {
        if keys.is_empty() {
            return Ok(());
        }
        let mut command_args = args(&["unset", name.as_str()]);
        command_args.extend(keys.iter().cloned());
        self.exec_ok(command_args)?;
        Ok(())
    }

    fn connections(&self, name: &PackageName) -> Result<BTreeSet<String>, PackageError> {
        let output = self.exec_ok(args(&["connections", name.as_str()]))?;
        Ok(parse_connections(&output.stdout, name))
    }

    fn connect(&self, name: &PackageName, plug: &str) -> Result<(), PackageError> {
        info!(package = %name, plug, "connecting plug");
        self.exec_ok(vec!["connect".to_string(), format!("{name}:{plug}")])?;
        Ok(())
    }

    fn restart_on_config_change(&self) -> bool {
        // snap services read their options at startup
        true
    }
}
