use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::defaults::OPERATOR_CONFIG_PATH;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)] // Read from `Cargo.toml`
pub struct Cli {
    /// Configuration file holding the desired exporter and the operator settings
    #[arg(short, long, default_value_t = String::from(OPERATOR_CONFIG_PATH))]
    config: String,

    /// Unit name, overriding `operator.unit-name` from the configuration
    #[arg(short, long)]
    unit: Option<String>,

    #[arg(long)]
    print_debug_info: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Reconcile continuously until stopped (default)
    Run,
    /// Reconcile once and print the resulting status
    Reconcile,
    /// Stop and remove the managed exporter, retracting its scrape target
    Remove,
    /// Print the alert rules currently published for the unit
    DumpAlerts,
}

impl Cli {
    /// Parses command line arguments
    pub fn init_operator_cli() -> Self {
        // Get command line args
        Self::parse()
    }

    pub fn get_config_path(&self) -> PathBuf {
        PathBuf::from(&self.config)
    }

    pub fn unit(&self) -> Option<&str> {
        self.unit.as_deref()
    }

    pub fn print_debug_info(&self) -> bool {
        self.print_debug_info
    }

    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Run)
    }
}
