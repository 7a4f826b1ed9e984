mod client;
mod error;
mod media;
mod models;
mod views;

use std::process::exit;

use clap::Parser;
use client::Client;
use client::Color;
use client::Commands;
use client::TelemetryKind;
use client::api_token;
use client::create_admin;
use client::diagnose;
use client::diagnose_policies;
use client::healthcheck;
use client::install;
use client::runserver;
use client::update;
use colored::Colorize as _;
use common::tracing::LogFormat;
use common::tracing::SpanUploading;
use common::tracing::Stream;
use common::tracing::TracingConfig;
use common::tracing::create_tracing_subscriber;
use opentelemetry_otlp::WithExportConfig as _;
use tracing_subscriber::util::SubscriberInitExt as _;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("{}", format!("{e:#}").red());
        exit(1);
    }
}

fn init_tracing(client: &Client) -> anyhow::Result<()> {
    // the server logs for operators, the other commands print for humans
    let (stream, format) = match client.command {
        Commands::Runserver(_) => (Stream::Stdout, LogFormat::Pretty),
        _ => (Stream::Stderr, LogFormat::Compact),
    };
    let telemetry = client.telemetry_config.clone().telemetry();
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(client.telemetry_config.telemetry_endpoint.as_str())
        .build()?;
    let tracing_config = TracingConfig {
        stream,
        format,
        telemetry,
        directives: vec![],
        span_uploading: SpanUploading::BackgroundBatched,
    };
    let level = if client.telemetry_config.telemetry_kind == TelemetryKind::Opentelemetry {
        tracing_subscriber::filter::LevelFilter::DEBUG
    } else {
        tracing_subscriber::filter::LevelFilter::INFO
    };
    create_tracing_subscriber(tracing_config, level, exporter).try_init()?;
    Ok(())
}

async fn run() -> anyhow::Result<()> {
    let client = Client::parse();

    match client.color {
        Color::Never => colored::control::set_override(false),
        Color::Always => colored::control::set_override(true),
        Color::Auto => (),
    }
    init_tracing(&client)?;

    let Client {
        postgres_config,
        app_config,
        app_version,
        command,
        ..
    } = client;

    match command {
        Commands::Runserver(args) => {
            runserver::runserver(args, postgres_config, app_config, app_version).await
        }
        Commands::Healthcheck => {
            healthcheck::healthcheck_cmd(postgres_config.into_pool().await?).await
        }
        Commands::Openapi => client::print_openapi(),
        Commands::Install(args) => install::install(args, app_config, postgres_config).await,
        Commands::Update(args) => update::update(args, app_config, postgres_config).await,
        Commands::CreateAdmin(args) => {
            create_admin::create_admin(args, postgres_config.into_pool().await?).await
        }
        Commands::ApiToken(args) => {
            api_token::issue_api_token(args, postgres_config.into_pool().await?).await
        }
        Commands::Diagnose(args) => {
            diagnose::diagnose(args, app_config, postgres_config.into_pool().await?).await
        }
        Commands::DiagnosePolicies(args) => {
            diagnose_policies::diagnose_policies(args, postgres_config.into_pool().await?).await
        }
    }
}
