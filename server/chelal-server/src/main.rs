use anyhow::{Context, Result};
use clap::Parser;
use colored::*;
use std::env;
use std::fmt;
use tracing::{info, Level};
use tracing_subscriber::{
    fmt::{format::Writer, time::ChronoUtc, FmtContext, FormatEvent, FormatFields},
    layer::SubscriberExt,
    registry::LookupSpan,
    util::SubscriberInitExt,
    EnvFilter,
};

use chelal_server::{config::DEFAULT_CONFIG_FILE, create_app, AppConfig, ChelalServer};

/// Chelal HMS HTTP server
#[derive(Parser, Debug)]
#[command(name = "chelal-server")]
#[command(about = "Hospital management REST API server")]
struct Args {
    /// Server bind address, overrides the config file
    #[arg(long, env = "CHELAL_HOST")]
    host: Option<String>,

    /// Server port, overrides the config file
    #[arg(short, long, env = "CHELAL_PORT")]
    port: Option<u16>,

    /// Configuration file path
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON log lines regardless of environment
    #[arg(long)]
    json_logs: bool,

    /// Apply pending database migrations before serving
    #[arg(long)]
    migrate: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is normal outside development.
    let _ = dotenvy::dotenv();
    let args = Args::parse();

    init_tracing(args.verbose, args.json_logs);

    let mut config = AppConfig::load(&args.config).context("Invalid configuration")?;
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    let bind_address = config.bind_address();

    info!("🏥 {}", "Starting Chelal HMS server".bright_cyan());
    info!("📋 Version: {}", env!("CARGO_PKG_VERSION").bright_white());
    info!("🌐 Bind address: {}", bind_address.bright_yellow());

    let server = ChelalServer::new(config).await?;
    if args.migrate {
        info!("🗄️  {}", "Applying database migrations".bright_cyan());
        database_layer::run_migrations(&server.db_pool)
            .await
            .context("Database migration failed")?;
    }

    let app = create_app(server);
    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_address))?;

    info!("🚀 {}", format!("Chelal HMS running on http://{}", bind_address).bright_green());
    info!("📋 {}", format!("Health check: http://{}/health", bind_address).bright_blue());
    info!("📚 {}", format!("API docs: http://{}/docs", bind_address).bright_blue());

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    info!("👋 {}", "Server stopped".bright_white());
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

/// Colored human output on a development terminal, JSON lines otherwise.
fn init_tracing(verbose: bool, json_logs: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };

    let is_development =
        env::var("CHELAL_ENV").unwrap_or_else(|_| "development".to_string()) == "development";
    let use_colors = env::var("NO_COLOR").is_err() && atty::is(atty::Stream::Stdout);

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("chelal_server={},database_layer={},tower_http=info,sqlx=warn", level, level).into()
    });

    if is_development && use_colors && !json_logs {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_ansi(true)
                    .event_format(ColoredFormatter),
            )
            .init();
        print_startup_banner();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_ansi(false)
                    .json(),
            )
            .init();
    }
}

fn print_startup_banner() {
    println!("{}", "╔══════════════════════════════════════════════╗".bright_cyan());
    println!("{}", "║                🏥 CHELAL HMS                 ║".bright_cyan());
    println!("{}", "║        Hospital Management System API        ║".bright_cyan());
    println!("{}", "╚══════════════════════════════════════════════╝".bright_cyan());
    println!();
}

/// Compact colored line: time, level, module, message and fields.
struct ColoredFormatter;

impl<S, N> FormatEvent<S, N> for ColoredFormatter
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> fmt::Result {
        let metadata = event.metadata();

        write!(
            writer,
            "{} ",
            chrono::Utc::now().format("%H:%M:%S%.3f").to_string().bright_black()
        )?;

        let level = match *metadata.level() {
            Level::TRACE => "TRACE".bright_purple(),
            Level::DEBUG => "DEBUG".bright_blue(),
            Level::INFO => " INFO".bright_green(),
            Level::WARN => " WARN".bright_yellow(),
            Level::ERROR => "ERROR".bright_red(),
        };
        write!(writer, "[{}] ", level)?;

        if let Some(module) = metadata.target().rsplit("::").next() {
            write!(writer, "{:<15} ", module.bright_cyan())?;
        }

        ctx.format_fields(writer.by_ref(), event)?;

        if *metadata.level() >= Level::DEBUG {
            if let (Some(file), Some(line)) = (metadata.file(), metadata.line()) {
                let file = file.rsplit('/').next().unwrap_or(file);
                write!(writer, " {}", format!("({}:{})", file, line).bright_black())?;
            }
        }

        writeln!(writer)
    }
}
