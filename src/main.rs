// Main entry point
mod interfaces;
mod presentation;

use clap::Parser;
use colored::Colorize;
use interfaces::cli::{Cli, Command};
use presentation::render;
use presentation::theme::Theme;
use serde::Serialize;
use sukl_registry::infrastructure::config::{self, load_config, Logging};
use sukl_registry::{AppState, PharmacyCriteria, RegistryError, SearchFilters};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Setup graceful shutdown handler
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            eprintln!("Failed to listen for shutdown signal: {}", e);
        } else {
            eprintln!("\nInterrupted, shutting down...");
            let _ = shutdown_tx.send(());
        }
    });

    let cli = Cli::parse();

    if let Command::Config { generate } = &cli.command {
        if *generate {
            config::generate_config_sample()?;
        } else {
            match config::get_config_path() {
                Some(path) => println!("{}", path.display()),
                None => eprintln!("{}", "No configuration directory".red()),
            }
        }
        return Ok(());
    }

    let config = load_config()?;
    if config.logging.enable {
        init_logging(&config.logging)?;
    }

    let state = AppState::new(config)?;
    let theme = Theme::terminal();

    let outcome = tokio::select! {
        result = run(&state, &cli, &theme) => result,
        _ = shutdown_rx => {
            eprintln!("Operation aborted");
            Ok(())
        }
    };
    state.shutdown();

    if let Err(e) = outcome {
        eprintln!("{} {}", "✘".red(), e);
        let hint = if e.kind().is_retry_later() {
            "(temporary, try again later)"
        } else {
            ""
        };
        if !hint.is_empty() {
            eprintln!("  {}", hint.bright_black());
        }
        std::process::exit(1);
    }
    Ok(())
}

fn emit<T: Serialize>(
    json: bool,
    value: &T,
    text: impl FnOnce(&T) -> String,
) -> Result<(), RegistryError> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        print!("{}", text(value));
    }
    Ok(())
}

async fn run(state: &AppState, cli: &Cli, theme: &Theme) -> Result<(), RegistryError> {
    let resolver = &state.resolver;
    match &cli.command {
        Command::Search {
            query,
            available,
            reimbursed,
            limit,
        } => {
            let filters = SearchFilters {
                only_available: *available,
                only_reimbursed: *reimbursed,
            };
            let result = resolver.search(&query.join(" "), filters, *limit).await?;
            emit(cli.json, &result, |r| render::format_search(r, theme))
        }
        Command::Detail { code } => {
            let result = resolver.get_detail(code).await?;
            emit(cli.json, &result, |r| render::format_detail(r, theme))
        }
        Command::Availability { code } => {
            let info = resolver.check_availability(code).await?;
            emit(cli.json, &info, |i| render::format_availability(i, theme))
        }
        Command::Reimbursement { code } => {
            let info = resolver.get_reimbursement(code).await?;
            emit(cli.json, &info, |i| render::format_reimbursement(i, theme))
        }
        Command::Pharmacies {
            city,
            postal_code,
            nonstop,
            online,
            limit,
        } => {
            let criteria = PharmacyCriteria {
                city: city.clone(),
                postal_code: postal_code.clone(),
                has_24h: *nonstop,
                has_online_sales: *online,
                limit: *limit,
            };
            let result = resolver.find_pharmacies(&criteria).await?;
            emit(cli.json, &result, |r| render::format_pharmacies(r, theme))
        }
        Command::Atc { code } => {
            let info = resolver.get_atc_info(code).await?;
            emit(cli.json, &info, |i| render::format_atc(i, theme))
        }
        Command::Health => {
            let report = resolver.health().await;
            emit(cli.json, &report, |r| render::format_health(r, theme))
        }
        Command::Config { .. } => Ok(()),
    }
}

/// Initialize logging with path and level configuration
fn init_logging(logging: &Logging) -> anyhow::Result<()> {
    use tracing_subscriber::EnvFilter;

    let level = match logging.level.as_str() {
        "DEBUG" => "debug",
        "INFO" => "info",
        "WARN" => "warn",
        "ERROR" => "error",
        _ => "warn",
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if let Some(path) = &logging.path {
        if !path.is_empty() {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(file)
                .with_ansi(false)
                .init();
            return Ok(());
        }
    }

    // Log to stderr (default)
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    Ok(())
}
