use clap::Parser;
use surety_common::{units::format_units, StatusCode};
use surety_node::{
    cli::{Cli, Command},
    run_demo,
    runtime::oracle_pool::Responder,
    setup::{ensure_config, init_config},
};
use tracing::{error, info};
use tracing_subscriber::prelude::*;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    std::panic::set_hook(Box::new(|info| {
        let location = info
            .location()
            .map(|l| format!("at {}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_else(|| "unknown location".to_string());
        eprintln!("CRASH: {} {}", info, location);
    }));

    std::fs::create_dir_all(&cli.log_dir)?;
    let file_appender = tracing_appender::rolling::never(&cli.log_dir, "surety-audit.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    let audit_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_filter(tracing_subscriber::filter::filter_fn(|metadata| {
            metadata.target() == "surety"
        }));

    let stdout_layer = tracing_subscriber::fmt::layer().with_filter(
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "info,surety_node=debug".into()),
    );

    tracing_subscriber::registry()
        .with(audit_layer)
        .with(stdout_layer)
        .init();

    match cli.command {
        Command::InitConfig { out, force } => {
            if !init_config(&out, force)? {
                info!("{} exists; pass --force to overwrite", out.display());
            }
        }
        Command::Run { config, status } => {
            info!("--- starting surety node ---");
            let config = match ensure_config(&config) {
                Ok(c) => c,
                Err(e) => {
                    error!("invalid configuration {}: {}", config.display(), e);
                    return Err(e.into());
                }
            };

            let responder = match status {
                Some(code) => Responder::Fixed(StatusCode(code)),
                None => Responder::random(config.rng_seed),
            };

            let report = run_demo(&config, responder).await?;
            match report.status {
                Some(status) => info!("flight {} resolved as {}", report.flight.code, status),
                None => info!("flight {} did not reach a quorum", report.flight.code),
            }
            for (passenger, amount) in &report.paid {
                info!("paid {} to {}", format_units(*amount), passenger);
            }
            info!("pool balance: {}", format_units(report.pool_balance));
        }
    }

    Ok(())
}
