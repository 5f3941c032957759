mod logging;
mod server;

use anyhow::Context;
use clap::Parser;
use megalog_core::ini::{ChannelTable, Schema, RECORD_FLAG_BYTES};
use megalog_core::protocol::{
    list_ports, PayloadStream, SerialConnector, SerialSession, SessionConfig,
};
use megalog_core::realtime::LatestSnapshot;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use crate::logging::{init_logging, LogFormat, LogLevel};

#[derive(Parser, Debug)]
#[command(name = "megalog", version, about = "MegaSquirt realtime data logger")]
struct Cli {
    /// Serial port to communicate with the ECU.
    #[arg(long, env = "MEGALOG_PORT", required_unless_present = "list_ports")]
    port: Option<String>,

    /// ECU INI definition file.
    #[arg(long, value_name = "PATH", default_value = "config/mainController.ini")]
    config_file: PathBuf,

    /// Debug HTTP server address.
    #[arg(long, default_value = "0.0.0.0:8080")]
    addr: String,

    /// Realtime record length requested from the ECU, in bytes.
    #[arg(long, default_value_t = megalog_core::protocol::commands::DEFAULT_RECORD_LENGTH)]
    record_length: u16,

    /// List available serial ports and exit.
    #[arg(long)]
    list_ports: bool,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text")]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(long, value_name = "LEVEL", default_value = "info")]
    log_level: LogLevel,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    if cli.list_ports {
        for port in list_ports() {
            println!(
                "{}\t{}",
                port.name,
                port.product.as_deref().unwrap_or("-")
            );
        }
        return Ok(());
    }

    tracing::info!("starting logger");
    let port = cli.port.context("--port is required")?;

    let schema = Schema::from_file(&cli.config_file)
        .with_context(|| format!("reading {}", cli.config_file.display()))?;
    for entry in schema.datalog_entries() {
        tracing::info!(channel = %entry.channel, label = %entry.label, "datalog entry");
    }
    let table = Arc::new(
        schema
            .compile()
            .with_context(|| format!("compiling output channels of {}", cli.config_file.display()))?,
    );

    let record_len = cli.record_length as usize + RECORD_FLAG_BYTES;
    if table.required_len() > record_len {
        tracing::warn!(
            required = table.required_len(),
            record_len,
            "some channels lie beyond the fetched record and will not decode"
        );
    }

    let config = SessionConfig {
        record_length: cli.record_length,
        ..SessionConfig::for_port(port)
    };
    let connector = SerialConnector::new(&config.port_name, config.baud_rate, config.timeout());
    let (session, payloads) = SerialSession::new(config, Box::new(connector))
        .spawn()
        .context("starting serial session")?;

    let latest = LatestSnapshot::new();
    let reader = latest.reader();
    let consumer = tokio::spawn(consume(payloads, table, latest));

    let listener = tokio::net::TcpListener::bind(&cli.addr)
        .await
        .with_context(|| format!("binding {}", cli.addr))?;
    tracing::info!(addr = %cli.addr, "debug server listening");
    axum::serve(listener, server::router(reader))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("debug server")?;

    tracing::info!("shutting down");
    tokio::task::spawn_blocking(move || session.shutdown()).await?;
    consumer.await?;
    Ok(())
}

/// Decode each record and publish it as the latest snapshot
async fn consume(mut payloads: PayloadStream, table: Arc<ChannelTable>, latest: LatestSnapshot) {
    while let Some(raw) = payloads.recv().await {
        let record = table.decode(&raw);
        for error in &record.errors {
            tracing::debug!(%error, "channel not decoded");
        }
        let sequence = latest.publish(raw, record);
        tracing::trace!(sequence, "published record");
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}
