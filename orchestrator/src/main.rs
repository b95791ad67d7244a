//! Deployment Orchestrator - Entry Point
//!
//! Runs the deployment pipeline orchestrator: a bounded job queue, the
//! per-environment registry, periodic health monitoring and the HTTP API.

use std::collections::HashMap;
use std::env;

use colored::*;
use deploy_orchestrator::app::options::AppOptions;
use deploy_orchestrator::app::run::run;
use deploy_orchestrator::filesys::file::File;
use deploy_orchestrator::logs::{init_logging, LogOptions};
use deploy_orchestrator::storage::layout::StorageLayout;
use deploy_orchestrator::storage::settings::Settings;
use deploy_orchestrator::utils::version_info;

use tracing::{error, info};

#[tokio::main]
async fn main() {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();
    let mut cli_args: HashMap<String, String> = HashMap::new();

    for arg in args.iter().skip(1) {
        if let Some((key, value)) = arg.split_once('=') {
            // Handle --key=value format
            let clean_key = key.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), value.to_string());
        } else if arg.starts_with("--") {
            // Handle standalone flags like --version
            let clean_key = arg.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), "true".to_string());
        }
    }

    // Print version and exit
    let version = version_info();
    if cli_args.contains_key("version") {
        match serde_json::to_string_pretty(&version) {
            Ok(json) => println!("{}", json),
            Err(_) => println!("{}", version.version),
        }
        return;
    }

    let layout = match cli_args.get("base-dir") {
        Some(dir) => StorageLayout::new(dir),
        None => StorageLayout::default(),
    };

    // Retrieve the settings file
    let settings_file = match cli_args.get("config") {
        Some(path) => File::new(path),
        None => layout.settings_file(),
    };
    let settings = match settings_file.read_json_or_default::<Settings>().await {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Unable to read settings file: {}", e);
            std::process::exit(1);
        }
    };

    if cli_args.contains_key("check-config") {
        let ok = print_config_summary(&settings_file, &layout, &settings);
        std::process::exit(if ok { 0 } else { 1 });
    }

    if let Err(e) = settings.validate() {
        eprintln!("Invalid settings: {}", e);
        std::process::exit(1);
    }

    // Initialize logging
    let log_dir = if settings.log_to_file {
        let dir = layout.logs_dir();
        if let Err(e) = dir.create().await {
            eprintln!("Unable to create log directory: {}", e);
        }
        Some(dir.path().to_path_buf())
    } else {
        None
    };
    let log_options = LogOptions {
        log_level: settings.log_level.clone(),
        log_dir,
        json_format: settings.log_json,
        ..Default::default()
    };
    // Held until exit so buffered file output is flushed
    let _log_guard = match init_logging(log_options) {
        Ok(guard) => guard,
        Err(e) => {
            println!("Failed to initialize logging: {e}");
            None
        }
    };

    let options = AppOptions::from_settings(&settings, layout);

    info!(
        "Running deployd {} with options: {:?}",
        version.version, options
    );
    if let Err(e) = run(options, await_shutdown_signal()).await {
        error!("Failed to run the orchestrator: {e}");
        std::process::exit(1);
    }
}

/// Print the resolved settings. Returns false when they fail validation.
fn print_config_summary(settings_file: &File, layout: &StorageLayout, settings: &Settings) -> bool {
    println!("{}", "deployd configuration".bold());
    println!("  Settings file: {}", settings_file.path().display());
    println!("  Base dir:      {}", layout.base_dir.display());
    let server = if settings.enable_server {
        format!("{}:{}", settings.server.host, settings.server.port)
    } else {
        "disabled".dimmed().to_string()
    };
    println!("  Server:        {}", server);
    println!(
        "  Concurrency:   {} deployment(s), queue tick {}s",
        settings.max_concurrent_deployments, settings.queue_interval_secs
    );
    println!(
        "  Health:        every {}s, timeout {}ms, degraded above {}ms ({})",
        settings.health_interval_secs,
        settings.health_probe_timeout_ms,
        settings.health_degraded_threshold_ms,
        if settings.use_http_probe { "http" } else { "simulated" }
    );
    println!(
        "  Requestors:    {}",
        if settings.allowed_requestors.is_empty() {
            "any".to_string()
        } else {
            settings.allowed_requestors.join(", ")
        }
    );

    match settings.validate() {
        Ok(()) => {
            println!("{} configuration is valid", "✓".green());
            true
        }
        Err(e) => {
            println!("{} {}", "✗".red(), e);
            false
        }
    }
}

async fn await_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let (mut sigterm, mut sigint) =
            match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                (Ok(term), Ok(int)) => (term, int),
                _ => {
                    error!("Unable to install signal handlers, falling back to Ctrl+C");
                    let _ = tokio::signal::ctrl_c().await;
                    return;
                }
            };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("SIGTERM received, shutting down...");
            }
            _ = sigint.recv() => {
                info!("SIGINT received, shutting down...");
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl+C received, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
        }
        info!("Ctrl+C received, shutting down...");
    }
}
