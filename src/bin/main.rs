use std::error::Error;
use std::fs;
use std::io::ErrorKind;
use std::process;

use tracing::{error, info, warn};

use snap_exporter_operator::cli::{Cli, Command};
use snap_exporter_operator::config::store::{ConfigStore, ConfigStoreFile};
use snap_exporter_operator::config::OperatorSettings;
use snap_exporter_operator::context::Context;
use snap_exporter_operator::defaults::{ALERTS_TARGET_FILE, OPERATOR_NAME, OPERATOR_VERSION};
use snap_exporter_operator::event::channel::pub_sub;
use snap_exporter_operator::event::{OperatorEvent, Trigger};
use snap_exporter_operator::file_reader::FSFileReader;
use snap_exporter_operator::health::HttpEndpointProbe;
use snap_exporter_operator::logging::Logging;
use snap_exporter_operator::operator::Operator;
use snap_exporter_operator::package::registry::FileUnitRegistry;
use snap_exporter_operator::package::snap::SnapBackend;
use snap_exporter_operator::publisher::FileSdPublisher;
use snap_exporter_operator::reconciler::state::StateFile;
use snap_exporter_operator::reconciler::Reconciler;
use snap_exporter_operator::status::reporter::{spawn_reporter, StatusFile};
use snap_exporter_operator::status::StatusKind;

fn main() -> Result<(), Box<dyn Error>> {
    // init logging singleton
    Logging::try_init()?;

    let cli = Cli::init_operator_cli();

    if cli.print_debug_info() {
        println!("Printing debug info");
        println!("CLI: {:#?}", cli);
        return Ok(());
    }

    let config_store = ConfigStoreFile::new(&cli.get_config_path());
    let settings = load_settings(&config_store, cli.unit());

    if cli.command() == Command::DumpAlerts {
        return dump_alerts(&settings);
    }

    // Program must run as root, but should accept simple behaviors such as --version, --help, etc
    #[cfg(unix)]
    if !nix::unistd::Uid::effective().is_root() {
        return Err("Program must run as root".into());
    }

    info!(version = OPERATOR_VERSION, unit = %settings.unit_name, "Starting {}", OPERATOR_NAME);

    let backend = SnapBackend::default()
        .with_snap_binary(settings.snap_binary.clone())
        .with_timeout(settings.command_timeout);
    let publisher = FileSdPublisher::new(&settings.file_sd_path(), &settings.rules_dir());
    let state_store = StateFile::new(&settings.state_file());
    let registry = FileUnitRegistry::try_new(&settings.lock_dir, &settings.unit_name)?;
    let probe = HttpEndpointProbe::new(&settings.probe);
    let reconciler = Reconciler::new(backend, publisher, state_store, registry, probe);

    let (status_publisher, status_consumer) = pub_sub();
    let reporter = spawn_reporter(status_consumer, StatusFile::new(&settings.status_file()));
    let operator = Operator::new(
        config_store,
        FSFileReader,
        reconciler,
        &settings,
        status_publisher,
    );

    let mut failed = false;
    match cli.command() {
        Command::Run => {
            info!("Creating the global context");
            let ctx: Context<OperatorEvent> = Context::new();

            info!("Creating the signal handler");
            ctrlc::set_handler({
                let ctx = ctx.clone();
                move || {
                    if let Err(err) = ctx.notify(OperatorEvent::Stop) {
                        error!("Could not notify the stop request: {}", err);
                    }
                }
            })
            .map_err(|e| {
                error!("Could not set signal handler: {}", e);
                e
            })?;

            operator.run(ctx)?;
        }
        Command::Reconcile => {
            let report = operator.reconcile_once(Trigger::Startup);
            println!("{}", report.status);
            failed = matches!(report.status.kind(), StatusKind::Blocked | StatusKind::Error);
        }
        Command::Remove => {
            let report = operator.teardown();
            println!("{}", report.status);
            failed = report.status.kind() == StatusKind::Error;
        }
        Command::DumpAlerts => {}
    }

    // the reporter ends once the last status publisher is gone
    drop(operator);
    if reporter.join().is_err() {
        error!("status reporter panicked");
    }

    info!("Exiting gracefully");
    if failed {
        process::exit(1);
    }
    Ok(())
}

/// Operator settings from the configuration file, the defaults when it cannot be loaded: an
/// invalid configuration is reported as a blocked status by the reconciliation.
fn load_settings<C: ConfigStore>(config_store: &C, unit: Option<&str>) -> OperatorSettings {
    let mut settings = match config_store.load() {
        Ok(config) => config.operator,
        Err(err) => {
            warn!("Using default operator settings: {}", err);
            OperatorSettings::default()
        }
    };
    if let Some(unit) = unit {
        settings.unit_name = unit.to_string();
    }
    settings
}

fn dump_alerts(settings: &OperatorSettings) -> Result<(), Box<dyn Error>> {
    let path = settings.rules_dir().join(ALERTS_TARGET_FILE);
    match fs::read_to_string(&path) {
        Ok(rules) => println!("{}", rules.trim_end()),
        Err(e) if e.kind() == ErrorKind::NotFound => println!("no alerts configured"),
        Err(e) => return Err(format!("could not read {}: {}", path.display(), e).into()),
    }
    Ok(())
}
