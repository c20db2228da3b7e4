//! sealpipe: two-party encrypted chat over TCP with a pre-shared secret.
//!
//! One peer runs `sealpipe serve`, the other `sealpipe connect`; lines typed
//! on stdin are sent to the peer, and received messages are printed.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sealstream::{
    ConnectionState, ErrorKind, Role, SecurePipe, SessionConfig, SessionHandle, Stage, StageHook,
    StateChange,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info};

#[derive(Parser)]
#[command(name = "sealpipe", version)]
#[command(about = "Mutually authenticated, encrypted two-party pipe over TCP")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Pre-shared secret; both peers must use the same value
    #[arg(short, long, env = "SEALPIPE_SECRET", hide_env_values = true)]
    secret: String,

    /// JSON file with session settings; flags override it
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Pause before each handshake stage until Enter is pressed
    #[arg(long, global = true)]
    step: bool,

    /// Debug-level logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Dial a listening peer (initiator)
    Connect {
        /// Peer address
        #[arg(short, long)]
        address: Option<String>,
        /// Peer port
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Wait for one peer to connect (responder)
    Serve {
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,
    },
}

fn init_tracing(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<SessionConfig> {
    match path {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            serde_json::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))
        }
        None => Ok(SessionConfig::default()),
    }
}

/// Waits for Enter on stdin before each stage.
struct StdinStepHook;

impl StageHook for StdinStepHook {
    fn before<'a>(&'a self, stage: Stage) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {
            eprintln!("[step] next: {stage} (press Enter)");
            let _ = tokio::task::spawn_blocking(|| {
                let mut line = String::new();
                std::io::stdin().read_line(&mut line)
            })
            .await;
        })
    }
}

fn remediation(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::Transport => "check the address and port, and that the peer is running",
        ErrorKind::Authentication => "check that both peers use the same shared secret",
        ErrorKind::Framing | ErrorKind::Cipher => "the peer sent data this session cannot read",
        ErrorKind::ProtocolState => "the session was used out of order",
    }
}

async fn report_states(mut states: mpsc::UnboundedReceiver<StateChange>) {
    while let Some(change) = states.recv().await {
        match (change.state, change.error_kind) {
            (ConnectionState::Failed, Some(kind)) => {
                eprintln!(
                    "[status] Failed ({kind}): {}",
                    change.reason.as_deref().unwrap_or("unknown cause")
                );
                eprintln!("[status] hint: {}", remediation(kind));
            }
            (state, _) => eprintln!("[status] {state}"),
        }
        if change.state.is_terminal() {
            break;
        }
    }
}

/// Drop the zero padding the cipher leaves on each message.
fn without_padding(data: &[u8]) -> &[u8] {
    let end = data.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
    &data[..end]
}

async fn chat(mut session: SessionHandle) -> Result<()> {
    let mut inbound = session
        .inbound()
        .context("inbound stream already taken")?;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            message = inbound.recv() => match message {
                Some(message) => {
                    println!("peer> {}", String::from_utf8_lossy(without_padding(&message)));
                }
                None => {
                    info!("session ended by peer");
                    break;
                }
            },
            line = lines.next_line() => match line.context("reading stdin")? {
                Some(line) if line.trim().is_empty() => continue,
                Some(line) => session.send(line.as_bytes()).await?,
                None => {
                    debug!("stdin closed");
                    break;
                }
            },
        }
    }
    session.close().await;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = load_config(cli.config.as_deref())?;
    let role = match cli.command {
        Commands::Connect { address, port } => {
            if let Some(address) = address {
                config.address = address;
            }
            if let Some(port) = port {
                config.port = port;
            }
            Role::Initiator
        }
        Commands::Serve { port } => {
            if let Some(port) = port {
                config.port = port;
            }
            Role::Responder
        }
    };

    let mut pipe = SecurePipe::new(role, cli.secret, config);
    if cli.step {
        pipe = pipe.with_hook(StdinStepHook);
    }
    let states = pipe.states().context("state stream already taken")?;
    let status = tokio::spawn(report_states(states));

    let result = match pipe.open().await {
        Ok(session) => chat(session).await,
        Err(e) => Err(anyhow::Error::new(e).context(format!("{role} handshake failed"))),
    };
    let _ = status.await;
    result
}
