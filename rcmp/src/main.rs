//! Entry point for `rcmp`.
//!
//! Parses CLI arguments and dispatches into either **send** or **receive** mode.
//! All protocol work is delegated to library modules; `main.rs` owns only
//! process setup (logging, argument parsing, opening files and sockets) and
//! the mapping from transfer outcome to exit status.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use rcmp::{ReceiverConfig, ReceiverSession, SenderConfig, SenderSession, Socket, TransferError};

/// Help section for flags that replace protocol constants. They exist for
/// testing and diagnosis; the defaults are the protocol.
const OVERRIDES: &str = "Protocol overrides (testing and diagnosis)";

/// Reliable whole-file transfer over UDP.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand)]
enum Mode {
    /// Send a file to a listening receiver.
    Send {
        /// Receiver host name or address.
        host: String,
        /// Receiver UDP port.
        port: u16,
        /// File to send.
        file: PathBuf,
        /// How long to wait for a requested acknowledgment.
        #[arg(long, default_value_t = 1000, help_heading = OVERRIDES)]
        ack_timeout_ms: u64,
        /// Give up after this many consecutive acknowledgment timeouts.
        #[arg(long, default_value_t = 5, help_heading = OVERRIDES)]
        max_timeouts: u32,
        /// Ignore acknowledgments that cannot answer an outstanding request.
        #[arg(long)]
        validate_acks: bool,
    },
    /// Receive one file on a local UDP port.
    Receive {
        /// Local UDP port to listen on.
        port: u16,
        /// Where to write the received file.
        file: PathBuf,
        /// Give up when the sender is silent this long after the first packet.
        #[arg(long, default_value_t = 10_000, help_heading = OVERRIDES)]
        idle_timeout_ms: u64,
        /// Probability that a requested acknowledgment is withheld.
        #[arg(long, default_value_t = 0.2, help_heading = OVERRIDES)]
        drop_probability: f64,
        /// Seed for the acknowledgment loss simulator.
        #[arg(long, help_heading = OVERRIDES)]
        seed: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    // Initialise env_logger; set RUST_LOG to control verbosity.
    env_logger::init();

    let cli = Cli::parse();

    let outcome = match cli.mode {
        Mode::Send {
            host,
            port,
            file,
            ack_timeout_ms,
            max_timeouts,
            validate_acks,
        } => {
            let config = SenderConfig {
                ack_timeout: Duration::from_millis(ack_timeout_ms),
                max_consecutive_timeouts: max_timeouts,
                validate_acks,
            };
            send(&host, port, &file, config).await
        }
        Mode::Receive {
            port,
            file,
            idle_timeout_ms,
            drop_probability,
            seed,
        } => {
            let config = ReceiverConfig {
                idle_timeout: Duration::from_millis(idle_timeout_ms),
                ack_drop_probability: drop_probability,
                seed,
            };
            receive(port, &file, config).await
        }
    };

    match outcome {
        Ok(line) => {
            println!("{line}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{}", describe(&e));
            ExitCode::from(exit_status(&e))
        }
    }
}

async fn send(host: &str, port: u16, path: &Path, config: SenderConfig) -> Result<String> {
    let peer: SocketAddr = tokio::net::lookup_host((host, port))
        .await
        .with_context(|| format!("resolving {host}:{port}"))?
        .next()
        .with_context(|| format!("{host}:{port} did not resolve to any address"))?;

    let file = tokio::fs::File::open(path)
        .await
        .with_context(|| format!("opening {}", path.display()))?;
    let len = file.metadata().await?.len();
    log::info!("File {} opened for reading ({len} bytes)", path.display());

    let socket = Socket::bind_for(peer).await.context("binding local UDP socket")?;
    log::info!("Sending from {} to {peer}", socket.local_addr);

    let mut session = SenderSession::new(socket, peer, file, len, config)?;
    let report = session.run().await?;
    Ok(format!(
        "File transfer complete: {} bytes in {} packets ({} retransmitted)",
        report.total_size, report.packets_sent, report.retransmissions
    ))
}

async fn receive(port: u16, path: &Path, config: ReceiverConfig) -> Result<String> {
    let bind: SocketAddr = (std::net::Ipv4Addr::UNSPECIFIED, port).into();
    let socket = Socket::bind(bind)
        .await
        .with_context(|| format!("binding UDP port {port}"))?;
    log::info!("Listening on {}", socket.local_addr);

    let file = tokio::fs::File::create(path)
        .await
        .with_context(|| format!("creating {}", path.display()))?;

    let mut session = ReceiverSession::new(socket, file, config)?;
    let report = session.run().await?;
    Ok(format!(
        "Reached end of expected data: {} bytes written to {}",
        report.bytes_written,
        path.display()
    ))
}

/// One operator-facing line for a failed run.
fn describe(e: &anyhow::Error) -> String {
    match e.downcast_ref::<TransferError>() {
        Some(TransferError::ReceiverUnresponsive { timeouts }) => format!(
            "ReceiverNotResponding: {timeouts} consecutive acknowledgments not received; \
             file transfer success unknown"
        ),
        Some(TransferError::ReceiverIdleTimeout { .. }) => {
            "No messages from sender, closing connection".to_string()
        }
        _ => format!("error: {e:#}"),
    }
}

fn exit_status(e: &anyhow::Error) -> u8 {
    match e.downcast_ref::<TransferError>() {
        Some(TransferError::ReceiverUnresponsive { .. }) => 2,
        Some(TransferError::ReceiverIdleTimeout { .. }) => 3,
        _ => 1,
    }
}
