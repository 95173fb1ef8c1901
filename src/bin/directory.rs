//! `parchment-directory` — the central coordinator (spec §6 CLI surface:
//! `<ip> <port>`).

use clap::Parser;
use tokio::net::TcpListener;
use tracing::error;

use parchment::directory::registry::DEFAULT_SLOTS;
use parchment::directory::server::{self, Directory};

#[derive(Parser)]
#[command(name = "parchment-directory")]
struct Args {
    /// IP address to bind the Directory's listener to.
    ip: String,

    /// Port to bind to, in [1025, 65535].
    #[arg(value_parser = parse_port)]
    port: u16,

    /// Enables `EXEC`, which runs a file's contents as a command
    /// (spec §4.4, §9 open question) — off by default.
    #[arg(long)]
    enable_exec: bool,
}

fn parse_port(raw: &str) -> Result<u16, String> {
    let port: u16 = raw.parse().map_err(|_| "port must be a number".to_string())?;
    if port < 1025 {
        return Err("port must be in [1025, 65535]".to_string());
    }
    Ok(port)
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let listener = match TcpListener::bind((args.ip.as_str(), args.port)).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(ip = %args.ip, port = args.port, error = %e, "failed to bind");
            std::process::exit(1);
        }
    };

    let directory = std::sync::Arc::new(Directory::new(DEFAULT_SLOTS, args.enable_exec));
    if let Err(e) = server::run(directory, listener).await {
        error!(error = %e, "directory server exited with an error");
        std::process::exit(1);
    }
}
