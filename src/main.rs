//! initiocs - EPICS IOC deployment tool
//!
//! Main entry point for the command-line application.
//!
//! # Overview
//!
//! Reads a CONFIGURE file describing global deployment settings and a list
//! of IOCs, then clones and customizes an IOC template for each one. The
//! binary initializes:
//! - Logging infrastructure (file rotation + console output)
//! - A current-thread tokio runtime for `git clone` and cleanup scripts
//! - Configuration loading ([`ConfigManager`])
//!
//! # Commands
//!
//! - `run`: provision every IOC in the configuration
//! - `show`: print the global settings and the IOC table
//! - `set`, `add-ioc`: edit the configuration without disturbing comments
//! - `new`: write a documented configuration to fill in
//! - `locate`: show which IOC binary a driver type resolves to
//!
//! # Exit Codes
//!
//! - `0`: every IOC was provisioned
//! - `1`: at least one IOC failed
//! - `2`: the configuration itself is unusable

use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};
use initiocs::config::{DEFAULT_CONFIG_FILE, DEFAULT_SETTINGS_FILE};
use initiocs::models::config::BINARIES_FLAT_KEY;
use initiocs::models::{CONFIG_SCHEMA, schema_field};
use initiocs::services::locate_ioc_binary;
use initiocs::{
    APP_NAME, ConfigError, ConfigManager, DeviceEntry, RunMetrics, VERSION, run_deployment,
};
use std::process::ExitCode;

/// Deploy EPICS IOCs from a CONFIGURE file
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the CONFIGURE file
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: Utf8PathBuf,

    /// Path to the tool settings YAML file
    #[arg(short, long, global = true, default_value = DEFAULT_SETTINGS_FILE)]
    settings: Utf8PathBuf,

    /// Directory for log files
    #[arg(long, global = true, default_value = "logs")]
    log_dir: Utf8PathBuf,

    /// Log at debug level
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Provision every IOC listed in the configuration
    Run {
        /// Git URL or local directory to use as the IOC template
        #[arg(short, long)]
        template: Option<String>,
    },

    /// Print the global settings and the IOC table
    Show,

    /// Set a global configuration value
    Set { key: String, value: String },

    /// Add an IOC line to the configuration
    AddIoc {
        /// Driver type, e.g. ADProsilica
        ioc_type: String,
        /// IOC name, also the output directory name
        name: String,
        /// procServ control port
        port: String,
        /// Camera connection string (IP, serial number, ...)
        connection: String,
    },

    /// Write a documented configuration with default values
    New,

    /// Show which IOC binary a driver type resolves to
    Locate { ioc_type: String },
}

fn main() -> Result<ExitCode> {
    let args = Args::parse();

    let _guard = initiocs::logging::setup_logging_with_console(
        args.log_dir.as_str(),
        APP_NAME,
        args.debug,
        true,
    )?;

    tracing::info!("Starting {} v{}", APP_NAME, VERSION);

    let manager = ConfigManager::new(&args.config, &args.settings);

    match args.command {
        Command::Run { template } => run(&manager, template),
        Command::Show => show(&manager).map(|_| ExitCode::SUCCESS),
        Command::Set { key, value } => set(&manager, &key, &value).map(|_| ExitCode::SUCCESS),
        Command::AddIoc {
            ioc_type,
            name,
            port,
            connection,
        } => add_ioc(&manager, &ioc_type, &name, &port, &connection).map(|_| ExitCode::SUCCESS),
        Command::New => new_config(&manager).map(|_| ExitCode::SUCCESS),
        Command::Locate { ioc_type } => locate(&manager, &ioc_type).map(|_| ExitCode::SUCCESS),
    }
}

fn run(manager: &ConfigManager, template: Option<String>) -> Result<ExitCode> {
    let parsed = match manager.load_config() {
        Ok(parsed) => parsed,
        Err(e) if e.downcast_ref::<ConfigError>().is_some() => {
            tracing::error!("{:#}", e);
            return Ok(ExitCode::from(2));
        }
        Err(e) => return Err(e),
    };

    let mut deployer = manager.load_settings()?;
    if let Some(template) = template {
        deployer.template_source = template;
    }
    tracing::info!("Using IOC template {}", deployer.template_source);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to create tokio runtime")?;

    let metrics = RunMetrics::new();
    let results = match runtime.block_on(run_deployment(&parsed, &deployer, &metrics)) {
        Ok(results) => results,
        Err(e) => {
            tracing::error!("Configuration error: {}", e);
            return Ok(ExitCode::from(2));
        }
    };

    for result in results.iter().filter(|r| !r.success) {
        tracing::warn!("{}: {}", result.device_name, result.message);
    }
    metrics.log_summary();

    if metrics.has_failures() {
        Ok(ExitCode::from(1))
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

fn show(manager: &ConfigManager) -> Result<()> {
    let parsed = manager.load_config()?;

    for field in CONFIG_SCHEMA {
        let value = if field.key == BINARIES_FLAT_KEY {
            parsed.layout.as_toggle()
        } else {
            parsed.globals.get(field.key).unwrap_or("<unset>")
        };
        println!("{:<34} {}", format!("{}:", field.label), value);
    }

    for (key, value) in parsed
        .globals
        .iter()
        .filter(|(key, _)| schema_field(key).is_none())
    {
        println!("{:<34} {}", format!("{}:", key), value);
    }

    println!();
    println!(
        "{:<4} {:<20} {:<20} {:<7} Connection",
        "#", "IOC Type", "IOC Name", "Port"
    );
    for device in &parsed.devices {
        println!(
            "{:<4} {:<20} {:<20} {:<7} {}",
            device.sequence_number,
            device.device_type,
            device.device_name,
            device.control_port,
            device.connection_string
        );
    }

    Ok(())
}

fn set(manager: &ConfigManager, key: &str, value: &str) -> Result<()> {
    if schema_field(key).is_none() {
        tracing::warn!("{} is not a known setting, adding it anyway", key);
    }

    let mut document = manager.load_document()?;
    document.set_value(key, value);
    manager.save_document(&document)?;

    tracing::info!("Set {}={}", key, value);
    Ok(())
}

fn add_ioc(
    manager: &ConfigManager,
    ioc_type: &str,
    name: &str,
    port: &str,
    connection: &str,
) -> Result<()> {
    let entry = DeviceEntry::new(ioc_type, name, port, connection)?;

    let mut document = manager.load_document()?;
    let parsed = document.parsed()?;
    if parsed.devices.iter().any(|d| d.device_name == entry.device_name) {
        anyhow::bail!("An IOC named {} is already configured", entry.device_name);
    }

    document.add_device(&entry);
    manager.save_document(&document)?;

    tracing::info!("Added IOC {} ({})", entry.device_name, entry.device_type);
    Ok(())
}

fn new_config(manager: &ConfigManager) -> Result<()> {
    manager.create_default_config()?;

    if !manager.settings_path().exists() {
        manager.save_settings(&Default::default())?;
    }

    println!(
        "Wrote {}; fill in the settings and IOC lines, then run `{} run`",
        manager.config_path(),
        APP_NAME
    );
    Ok(())
}

fn locate(manager: &ConfigManager, ioc_type: &str) -> Result<()> {
    let parsed = manager.load_config()?;
    let settings = parsed.settings()?;

    let binary = locate_ioc_binary(&settings.binary_root, settings.layout, ioc_type)?;
    println!("{}", binary);
    Ok(())
}
