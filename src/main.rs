// MIT License - Copyright (c) 2026 Peter Wright
// TPI monitor

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use tokio::signal::unix::{SignalKind, signal};
use tokio::time::Duration;
use tracing::{error, info, warn};

use envisalink_tpi::{Code, ConnectionState, ServerCode, ServerMessage, TpiClient, TpiConfig};

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Parser)]
#[command(name = "tpi-monitor")]
#[command(about = "Monitor and command an Envisalink TPI")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, default_value = "tpi.toml")]
    config: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Print every panel event as a JSON line (default)
    Monitor,
    /// Send one command by name and print the reply
    Send {
        /// Client code name, e.g. StatusReport
        name: String,
        /// Command payload
        data: Option<String>,
        /// Server code name to wait for, e.g. Ack
        #[arg(long)]
        expect: Option<String>,
        /// How long to wait for the reply
        #[arg(long, default_value_t = 5000)]
        timeout_ms: u64,
    },
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct Config {
    panel: PanelToml,
}

#[derive(Debug, Deserialize)]
struct PanelToml {
    host: String,
    #[serde(default = "default_port")]
    port: u16,
    #[serde(default = "default_password")]
    password: String,
    #[serde(default = "default_keepalive_interval")]
    keepalive_interval_ms: u64,
    #[serde(default = "default_read_retry_unit")]
    read_retry_unit_ms: u64,
    #[serde(default = "default_max_read_retries")]
    max_read_retries: u32,
    #[serde(default = "default_auth_timeout")]
    auth_timeout_ms: u64,
    #[serde(default = "default_reply_timeout")]
    reply_timeout_ms: u64,
    #[serde(default = "default_inbox_capacity")]
    inbox_capacity: usize,
    #[serde(default = "default_reconnect_delay")]
    reconnect_delay_ms: u64,
    #[serde(default = "default_max_frame_len")]
    max_frame_len: usize,
}

fn default_port() -> u16 {
    envisalink_tpi::config::DEFAULT_PORT
}
fn default_password() -> String {
    "user".to_string()
}
fn default_keepalive_interval() -> u64 {
    5000
}
fn default_read_retry_unit() -> u64 {
    1000
}
fn default_max_read_retries() -> u32 {
    10
}
fn default_auth_timeout() -> u64 {
    10000
}
fn default_reply_timeout() -> u64 {
    5000
}
fn default_inbox_capacity() -> usize {
    256
}
fn default_reconnect_delay() -> u64 {
    10000
}
fn default_max_frame_len() -> usize {
    envisalink_tpi::frame::DEFAULT_MAX_FRAME_LEN
}

fn build_tpi_config(toml: &PanelToml) -> TpiConfig {
    TpiConfig::builder()
        .host(&toml.host)
        .port(toml.port)
        .password(&toml.password)
        .keepalive_interval(Duration::from_millis(toml.keepalive_interval_ms))
        .read_retry_unit(Duration::from_millis(toml.read_retry_unit_ms))
        .max_read_retries(toml.max_read_retries)
        .auth_timeout(Duration::from_millis(toml.auth_timeout_ms))
        .reply_timeout(Duration::from_millis(toml.reply_timeout_ms))
        .inbox_capacity(toml.inbox_capacity)
        .reconnect_delay(Duration::from_millis(toml.reconnect_delay_ms))
        .max_frame_len(toml.max_frame_len)
        .build()
}

fn load_config(path: &str) -> Result<TpiConfig> {
    let text = std::fs::read_to_string(path).context("Failed to read config file")?;
    let config: Config = toml::from_str(&text).context("Failed to parse config file")?;
    Ok(build_tpi_config(&config.panel))
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct OutputLine<'a> {
    now: u64,
    op: &'static str,
    message: &'a ServerMessage,
}

fn now_epoch_ms() -> u64 {
    Utc::now().timestamp_millis() as u64
}

fn print_message(op: &'static str, message: &ServerMessage) {
    let line = OutputLine {
        now: now_epoch_ms(),
        op,
        message,
    };
    match serde_json::to_string(&line) {
        Ok(json) => println!("{json}"),
        Err(e) => warn!("Failed to serialize {}: {e}", message),
    }
}

/// Exponential backoff capped at 16x the base delay.
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base * (1u32 << attempt.saturating_sub(1).min(4))
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

async fn connect_with_retry(config: &TpiConfig) -> Result<TpiClient> {
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        info!(
            "Connecting to TPI at {}:{} (attempt {attempt})",
            config.host, config.port
        );
        match TpiClient::connect(config.clone()).await {
            Ok(client) => return Ok(client),
            Err(e) if e.is_retryable() => {
                let delay = backoff_delay(config.reconnect_delay, attempt);
                error!("Connection failed: {e}. Retrying in {:.1}s...", delay.as_secs_f64());
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e).context("Failed to connect to TPI"),
        }
    }
}

async fn run_send(
    config: &TpiConfig,
    name: &str,
    data: Option<&str>,
    expect: Option<&str>,
    timeout_ms: u64,
) -> Result<()> {
    let client = TpiClient::connect(config.clone())
        .await
        .context("Failed to connect to TPI")?;

    let result = client
        .send_by_name(
            name,
            data.unwrap_or("").as_bytes(),
            expect,
            Duration::from_millis(timeout_ms),
        )
        .await;
    client.close().await;

    match result.with_context(|| format!("Command {name} failed"))? {
        Some(reply) => print_message("REPLY", &reply),
        None => info!("{name} sent"),
    }
    Ok(())
}

async fn run_monitor(config: &TpiConfig) -> Result<()> {
    let client = Arc::new(connect_with_retry(config).await?);

    for &code in ServerCode::ALL {
        client.on(code, |msg| print_message("EVENT", msg));
    }
    if let Err(e) = client.status_report().await {
        warn!("Initial status report failed: {e}");
    }

    // Reconnect whenever the session faults
    let watcher_client = Arc::clone(&client);
    let reconnect_delay = config.reconnect_delay;
    let watcher = tokio::spawn(async move {
        let mut state_rx = watcher_client.subscribe_state();
        loop {
            if state_rx
                .wait_for(|s| matches!(s, ConnectionState::Faulted(_)))
                .await
                .is_err()
            {
                break;
            }
            warn!("TPI connection faulted, will attempt reconnection");

            let mut attempt: u32 = 0;
            loop {
                attempt += 1;
                let delay = backoff_delay(reconnect_delay, attempt);
                tokio::time::sleep(delay).await;
                info!("Attempting reconnection (attempt {attempt})...");
                match watcher_client.reconnect().await {
                    Ok(()) => {
                        info!("Reconnected");
                        if let Err(e) = watcher_client.status_report().await {
                            warn!("Status report after reconnect failed: {e}");
                        }
                        break;
                    }
                    Err(e) if e.is_retryable() => warn!("Reconnection error: {e}"),
                    Err(e) => {
                        error!("Giving up on reconnection: {e}");
                        return;
                    }
                }
            }
        }
    });

    let mut sighup = signal(SignalKind::hangup())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    info!("Monitor running. Send SIGHUP to reconnect, SIGINT/SIGTERM to stop.");
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received SIGINT, shutting down...");
                break;
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down...");
                break;
            }
            _ = sighup.recv() => {
                info!("Received SIGHUP, reconnecting...");
                if let Err(e) = client.reconnect().await {
                    warn!("Reconnect failed: {e}");
                }
            }
        }
    }

    watcher.abort();
    client.close().await;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // RUST_LOG controls verbosity (e.g. RUST_LOG=debug or RUST_LOG=envisalink_tpi=trace).
    // Default: info. Logs go to stderr so stdout carries only JSON lines.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    // systemd journal already adds timestamps, so omit them when running under systemd
    if std::env::var_os("JOURNAL_STREAM").is_some() {
        tracing_subscriber::fmt()
            .without_time()
            .with_writer(std::io::stderr)
            .with_env_filter(env_filter)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_env_filter(env_filter)
            .init();
    }

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    match cli.command.unwrap_or(Command::Monitor) {
        Command::Monitor => run_monitor(&config).await?,
        Command::Send {
            name,
            data,
            expect,
            timeout_ms,
        } => run_send(&config, &name, data.as_deref(), expect.as_deref(), timeout_ms).await?,
    }

    info!("Shutdown complete");
    Ok(())
}
