//! ClickHouse Converge - brings a host's ClickHouse server to a declared state.

use std::env;
use std::process::ExitCode;
use std::time::Instant;

use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

use clickhouse_converge::attributes::AttributeResolver;
use clickhouse_converge::audit::{run_params, AuditEntry, AuditLogger, NullAuditLogger};
use clickhouse_converge::config::{OsFamily, Settings, SupervisorKind};
use clickhouse_converge::error::{ConvergeError, ConvergeResult};
use clickhouse_converge::host::{
    detect_os_family, detect_supervisor, package_manager_for, supervisor_for, CommandVerifier,
    Host, LocalFileSystem,
};
use clickhouse_converge::resources::{
    CompressionConfig, Convergence, ConvergenceReport, ServiceConvergence,
};
use clickhouse_converge::templates::TemplateEngine;

const VERSION: &str = env!("CARGO_PKG_VERSION");
const NAME: &str = env!("CARGO_PKG_NAME");
const DEFAULT_CONFIG_PATH: &str = "/etc/clickhouse-converge/settings.toml";
const DEFAULT_SERVICE_NAME: &str = "clickhouse-server";

#[derive(Debug, Clone, Copy)]
enum Command {
    Install,
    Delete,
    Status,
    Restart,
}

impl Command {
    fn parse(arg: &str) -> Option<Self> {
        match arg {
            "install" => Some(Self::Install),
            "delete" => Some(Self::Delete),
            "status" => Some(Self::Status),
            "restart" => Some(Self::Restart),
            _ => None,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Install => "install",
            Self::Delete => "delete",
            Self::Status => "status",
            Self::Restart => "restart",
        }
    }
}

fn main() -> ExitCode {
    let args: Vec<String> = env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_help();
        return ExitCode::SUCCESS;
    }

    if args.iter().any(|a| a == "--version" || a == "-V") {
        println!("{} {}", NAME, VERSION);
        return ExitCode::SUCCESS;
    }

    let command = match get_command(&args) {
        Some(command) => command,
        None => {
            eprintln!("Missing or unknown command; expected one of install, delete, status, restart");
            print_help();
            return ExitCode::from(2);
        }
    };

    let config_path = get_config_path(&args);

    let settings = match Settings::load(&config_path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error loading configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = init_logging(&settings) {
        eprintln!("Error initializing logging: {}", e);
        return ExitCode::FAILURE;
    }

    info!("Starting {} v{}", NAME, VERSION);
    info!("Configuration loaded from: {}", config_path);

    let run_id = Uuid::new_v4();
    let started = Instant::now();
    let resource = settings
        .service
        .service_name
        .clone()
        .unwrap_or_else(|| DEFAULT_SERVICE_NAME.to_string());
    let params = run_params(&settings.service, settings.compression.as_ref());

    let outcome = execute(&settings, command);
    let duration_ms = started.elapsed().as_millis() as u64;

    let entry = match &outcome {
        Ok(reports) => AuditEntry::success(
            run_id,
            &resource,
            command.as_str(),
            params,
            reports,
            duration_ms,
        ),
        Err(e) => AuditEntry::failure(run_id, &resource, command.as_str(), params, e, duration_ms),
    };
    write_audit(&settings, &entry);

    match outcome {
        Ok(reports) => {
            for report in &reports {
                match serde_json::to_string_pretty(report) {
                    Ok(json) => println!("{}", json),
                    Err(e) => error!(error = %e, "Failed to serialize report"),
                }
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(
                error = %e,
                code = e.code(),
                step = ?e.step(),
                "Convergence failed"
            );
            ExitCode::FAILURE
        }
    }
}

/// Resolve attributes, wire up host collaborators and run one command.
fn execute(settings: &Settings, command: Command) -> ConvergeResult<Vec<ConvergenceReport>> {
    let family = match settings.host.os_family.fixed() {
        Some(family) => family,
        None => detect_os_family()?,
    };
    let supervisor_kind = match settings.host.supervisor.fixed() {
        Some(kind) => kind,
        None => detect_supervisor(settings.limits.supervisor_timeout())?,
    };
    log_host(family, supervisor_kind);

    let templates = TemplateEngine::new(&settings.paths.templates_dir)?;
    let packages = package_manager_for(family, settings.limits.package_timeout());
    let supervisor = supervisor_for(
        supervisor_kind,
        family,
        &settings.paths,
        templates.clone(),
        settings.limits.supervisor_timeout(),
    );
    let fs = LocalFileSystem::new();
    let verifier = CommandVerifier::new(settings.limits.verify_timeout());
    let host = Host {
        packages: packages.as_ref(),
        supervisor: supervisor.as_ref(),
        fs: &fs,
        verifier: &verifier,
        templates: &templates,
    };

    let spec = AttributeResolver::new(&settings.attributes).resolve(settings.service.clone())?;
    let compression = settings
        .compression
        .as_ref()
        .map(|input| CompressionConfig::from_input(input, &spec))
        .transpose()?;
    let server = ServiceConvergence::new(spec);

    match command {
        Command::Install => {
            let mut reports = vec![server.install(&host)?];
            if let Some(compression) = &compression {
                reports.push(compression.install(&host)?);
            }
            Ok(reports)
        }
        Command::Delete => {
            let mut reports = Vec::new();
            if let Some(compression) = &compression {
                reports.push(compression.delete(&host)?);
            }
            reports.push(server.delete(&host)?);
            Ok(reports)
        }
        Command::Status => {
            let status = server.status(&host)?;
            println!("{}", serde_json::to_string_pretty(&status)?);
            Ok(Vec::new())
        }
        Command::Restart => {
            server.restart(&host)?;
            info!(service = %server.name(), "Service restarted");
            Ok(Vec::new())
        }
    }
}

fn log_host(family: OsFamily, supervisor: SupervisorKind) {
    info!(os_family = ?family, supervisor = ?supervisor, "Host facts resolved");
}

fn write_audit(settings: &Settings, entry: &AuditEntry) {
    let result: Result<(), ConvergeError> = if settings.audit.enabled {
        AuditLogger::new(&settings.audit.log_path).and_then(|logger| logger.log(entry))
    } else {
        NullAuditLogger::new().log(entry)
    };
    if let Err(e) = result {
        error!(error = %e, "Failed to write audit entry");
    }
}

/// Print help message.
fn print_help() {
    println!(
        r#"{} {}
Converge a host's ClickHouse server to the declared state.

USAGE:
    {} [OPTIONS] <COMMAND>

COMMANDS:
    install    Install, configure, enable and start the server
    delete     Stop and disable the server and remove its main config
    status     Print whether the server is enabled and running
    restart    Restart the server

OPTIONS:
    -c, --config <PATH>    Path to configuration file
                           [default: {}]
    -h, --help             Print help information
    -V, --version          Print version information
"#,
        NAME, VERSION, NAME, DEFAULT_CONFIG_PATH
    );
}

/// Get configuration file path from command line arguments.
fn get_config_path(args: &[String]) -> String {
    for (i, arg) in args.iter().enumerate() {
        if (arg == "--config" || arg == "-c") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
        if let Some(path) = arg.strip_prefix("--config=") {
            return path.to_string();
        }
    }
    DEFAULT_CONFIG_PATH.to_string()
}

/// First positional argument, skipping the value of `--config`.
fn get_command(args: &[String]) -> Option<Command> {
    let mut skip_next = false;
    for arg in args.iter().skip(1) {
        if skip_next {
            skip_next = false;
            continue;
        }
        if arg == "--config" || arg == "-c" {
            skip_next = true;
            continue;
        }
        if arg.starts_with('-') {
            continue;
        }
        return Command::parse(arg);
    }
    None
}

/// Initialize logging based on settings.
fn init_logging(settings: &Settings) -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.logging.level));

    // Reports go to stdout; logs stay on stderr.
    match settings.logging.format.to_lowercase().as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().pretty().with_writer(std::io::stderr))
                .init();
        }
    }

    Ok(())
}
