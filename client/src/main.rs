mod cli;

use anyhow::Result;
use clap::Parser;
use reqwest::Client;
use std::env;

/// Igual que en el worker:
/// - En Docker: MASTER_URL=http://master:8080
/// - Local: default http://localhost:8080
fn master_base_url() -> String {
    env::var("MASTER_URL").unwrap_or_else(|_| "http://localhost:8080".to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = cli::Cli::parse();
    let client = Client::new();
    let base_url = master_base_url();

    cli::run(cli, &client, base_url.trim_end_matches('/')).await
}
