//! ipcmsg - send one framed message to a Unix-socket IPC server.
//!
//! Locates a listening server (explicit socket path, explicit pid, or
//! probe-based discovery), sends the message arguments as a single frame, and
//! prints the server's response. Exits zero only when the server reports
//! success.

mod client;
mod config;
mod discovery;
mod error;
mod protocol;

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use config::Config;
use discovery::DiscoveryFilter;
use protocol::Message;

#[derive(Parser)]
#[command(name = "ipcmsg")]
#[command(author, version, about = "Send a framed message to a Unix-socket IPC server")]
#[command(
    long_about = "Sends one message to a server listening on a Unix domain socket and prints \
the response.\n\nWithout --socket or --pid, the runtime directory is scanned and each candidate \
socket is probed until one matches the given filters."
)]
struct Cli {
    /// Be quiet: do not print the response text
    #[arg(short, long)]
    quiet: bool,

    /// Use an alternative socket path (skips discovery)
    #[arg(short, long, value_name = "PATH")]
    socket: Option<PathBuf>,

    /// Pid of the server process to target
    #[arg(short, long)]
    pid: Option<u32>,

    /// Select the server associated with this username
    #[arg(short = 'u', long = "by-username", value_name = "NAME")]
    username: Option<String>,

    /// Select the server connected to this address
    #[arg(short = 'i', long = "by-ip", value_name = "ADDR")]
    server_ip: Option<String>,

    /// Override the configured socket-name prefix
    #[arg(long, value_name = "PREFIX")]
    prefix: Option<String>,

    /// Message strings to send, in order
    #[arg(value_name = "MESSAGE", required = true)]
    message: Vec<String>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = match Config::load() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{err:#}");
            std::process::exit(1);
        }
    };
    if let Some(prefix) = cli.prefix {
        config.socket.prefix = prefix;
    }

    let filter = DiscoveryFilter {
        pid: cli.pid,
        username: cli.username,
        server_ip: cli.server_ip,
    };
    let message = Message::new(cli.message);

    match client::resolve_and_send(&config, cli.socket, &filter, &message).await {
        Ok(response) => {
            if !cli.quiet {
                println!("{}", response.text);
            }
            if !response.success {
                std::process::exit(1);
            }
        }
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(1);
        }
    }
}
