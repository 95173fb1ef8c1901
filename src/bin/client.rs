//! `parchment-client` — interactive Client (spec §6 CLI surface:
//! `<directory_ip> <directory_port>`, prompts for identity).

use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::error;

use parchment::client::repl;
use parchment::client::DirectoryClient;

#[derive(Parser)]
#[command(name = "parchment-client")]
struct Args {
    directory_ip: String,

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

    let identity = match prompt_identity().await {
        Ok(identity) => identity,
        Err(e) => {
            error!(error = %e, "failed to read identity");
            std::process::exit(1);
        }
    };

    let directory = match DirectoryClient::connect(&args.directory_ip, args.directory_port, identity).await {
        Ok(directory) => directory,
        Err(e) => {
            error!(error = %e, "failed to register with directory");
            std::process::exit(1);
        }
    };

    if let Err(e) = repl::run(directory).await {
        error!(error = %e, "client session ended with an error");
        std::process::exit(1);
    }
}

async fn prompt_identity() -> std::io::Result<String> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(b"identity: ").await?;
    stdout.flush().await?;

    let mut stdin = BufReader::new(tokio::io::stdin());
    let mut line = String::new();
    stdin.read_line(&mut line).await?;
    Ok(line.trim().to_string())
}
