//! `parchment-node` — a storage Node (spec §6 CLI surface:
//! `<node_ip> <node_port> <directory_ip> <directory_port>`).

use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::{error, info};

use parchment::node::server::{self, Node};

#[derive(Parser)]
#[command(name = "parchment-node")]
struct Args {
    /// IP address Clients will use to reach this Node.
    node_ip: String,

    /// Port to listen for direct Client connections on, in [1025, 65535].
    #[arg(value_parser = parse_port)]
    node_port: u16,

    /// The Directory's IP address.
    directory_ip: String,

    /// The Directory's port, in [1025, 65535].
    #[arg(value_parser = parse_port)]
    directory_port: u16,
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

    let listener = match TcpListener::bind((args.node_ip.as_str(), args.node_port)).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(ip = %args.node_ip, port = args.node_port, error = %e, "failed to bind");
            std::process::exit(1);
        }
    };

    let node = Arc::new(Node::new(args.node_ip.clone(), args.node_port as i32));

    let signal_node = node.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received SIGINT, shutting down node");
            signal_node.shutdown().await;
        }
    });

    if let Err(e) = server::run(node, listener, (args.directory_ip, args.directory_port)).await {
        error!(error = %e, "node exited with an error");
        std::process::exit(1);
    }
}
