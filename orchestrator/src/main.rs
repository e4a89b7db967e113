//! Beanstalk orchestrator - Entry Point
//!
//! Runs compose deployments for isolated tenants on the local container
//! engine and serves the deployment API.

use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use beanstalk::app::options::AppOptions;
use beanstalk::app::run::run;
use beanstalk::deploy::manifest::validate_manifest_text;
use beanstalk::docker::engine::DockerEngine;
use beanstalk::filesys::file::File;
use beanstalk::logs::{init_logging, LogOptions};
use beanstalk::storage::settings::{Settings, DEFAULT_SETTINGS_PATH};
use beanstalk::utils::version_info;

use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
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
    if cli_args.contains_key("version") {
        match serde_json::to_string_pretty(&version_info()) {
            Ok(json) => println!("{}", json),
            Err(e) => eprintln!("Failed to render version: {}", e),
        }
        return ExitCode::SUCCESS;
    }

    // Validate a manifest and exit
    if let Some(path) = cli_args.get("check-manifest") {
        return check_manifest(path).await;
    }

    // Retrieve the settings file
    let settings_path = cli_args
        .get("config")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SETTINGS_PATH));
    let settings = match Settings::load(&settings_path).await {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Unable to read settings file: {}", e);
            return ExitCode::FAILURE;
        }
    };

    // Initialize logging
    let log_options = LogOptions {
        log_level: settings.log_level.clone(),
        json_format: settings.log_json,
        log_dir: settings.log_dir.clone(),
        ..Default::default()
    };
    let _log_guard = match init_logging(log_options) {
        Ok(guard) => guard,
        Err(e) => {
            println!("Failed to initialize logging: {e}");
            None
        }
    };

    let engine = match DockerEngine::connect() {
        Ok(engine) => Arc::new(engine),
        Err(e) => {
            error!("Unable to connect to the container engine: {}", e);
            return ExitCode::FAILURE;
        }
    };

    // Run the orchestrator
    let options = AppOptions::from_settings(&settings);
    info!("Running beanstalk with options: {:?}", options);
    match run(options, engine, await_shutdown_signal()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Failed to run the orchestrator: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn check_manifest(path: &str) -> ExitCode {
    let text = match File::new(path).read_string().await {
        Ok(text) => text,
        Err(e) => {
            eprintln!("Unable to read {}: {}", path, e);
            return ExitCode::FAILURE;
        }
    };

    let result = validate_manifest_text(&text);
    match serde_json::to_string_pretty(&result.to_response()) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Failed to render result: {}", e),
    }

    if result.valid {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

async fn await_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let (mut sigterm, mut sigint) =
            match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
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
