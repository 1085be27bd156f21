//! Capas CLI — Rust-native map layer compiler.

use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "capas",
    version,
    about = "Rust-native map layer compiler — declarative step graphs, bounded parallelism, BLAKE3 provenance"
)]
struct Cli {
    #[command(subcommand)]
    command: capas::cli::Commands,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = capas::cli::dispatch(cli.command).await {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}
