//! pocket — pair with a Pocket wallet and sign payloads over the relay.
//!
//! `pocket pair` creates (or resumes) a pairing session, renders the QR /
//! pairing code in the terminal and waits for the wallet to approve.
//! `pocket sign` submits a payload for the paired wallet to sign.

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use pocket_signer::{
    ArtifactPresenter, EngineConfig, FileSessionStore, PairingArtifact, PocketSigningManager,
    Relay,
};

#[derive(Parser)]
#[command(name = "pocket", about = "Remote signing via the Pocket wallet app")]
struct Args {
    /// Application name shown in the wallet's pairing screen.
    #[arg(long, default_value = "pocket-cli")]
    app_name: String,
    /// Network to operate on: testnet or mainnet.
    #[arg(long, default_value = "testnet")]
    network: String,
    /// Relay base URL override.
    #[arg(long)]
    relay_url: Option<String>,
    /// Path of the session store file.
    #[arg(long)]
    store: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Pair with a wallet and list its addresses.
    Pair,
    /// Submit a payload for signing and print the signature.
    Sign {
        /// Address that must sign, as shown by `pair`.
        #[arg(long)]
        address: String,
        /// Payload as a hex string (with or without 0x prefix).
        #[arg(long, conflicts_with = "message")]
        payload_hex: Option<String>,
        /// Payload as a UTF-8 message.
        #[arg(long)]
        message: Option<String>,
    },
}

/// Renders the pairing artifact as a terminal QR plus a copyable code.
struct TerminalPresenter;

impl ArtifactPresenter for TerminalPresenter {
    fn present(&self, artifact: &PairingArtifact) {
        let code = artifact.encode();
        println!();
        println!(
            "Scan this QR with the Pocket wallet app for {}:",
            artifact.network
        );
        println!();
        if let Err(e) = qr2term::print_qr(&code) {
            tracing::warn!(error = %e, "failed to render QR code");
        }
        println!();
        println!("Or paste this pairing code in the app:");
        println!("{code}");
        println!();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "pocket=info,pocket_signer=info".to_string()),
        )
        .init();

    let args = Args::parse();

    let mut config = EngineConfig::default();
    if let Some(url) = args.relay_url {
        config.relay_url = url;
    }
    let store = match args.store {
        Some(path) => FileSessionStore::new(path),
        None => FileSessionStore::default(),
    };
    let relay: Arc<dyn Relay> =
        Arc::new(pocket_signer::HttpRelay::new(config.relay_url.clone()));
    let mut manager = PocketSigningManager::new(
        args.app_name,
        config,
        relay,
        Box::new(store),
        Arc::new(TerminalPresenter),
    );
    manager
        .select_network(&args.network)
        .await
        .context("invalid --network")?;

    // Ctrl-C aborts a pending pairing wait cleanly.
    let cancel = manager.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    match args.command {
        Command::Pair => {
            let wallets = manager.accounts().await?;
            println!("Connected wallets on {}:", manager.network());
            for wallet in wallets {
                println!("  {wallet}");
            }
        }
        Command::Sign {
            address,
            payload_hex,
            message,
        } => {
            // Make sure the pairing exists before submitting.
            let wallets = manager.accounts().await?;
            if !wallets.iter().any(|w| w == &address) {
                bail!("address {address} is not among the paired wallets: {wallets:?}");
            }

            let payload = match (payload_hex, message) {
                (Some(hex_str), None) => {
                    let stripped = hex_str.trim_start_matches("0x");
                    hex::decode(stripped).context("invalid --payload-hex")?
                }
                (None, Some(text)) => text.into_bytes(),
                _ => bail!("exactly one of --payload-hex or --message is required"),
            };

            println!("Waiting for the wallet to sign ({} bytes)...", payload.len());
            let signature = manager.sign_raw(&address, &payload).await?;
            println!("{signature}");
        }
    }

    Ok(())
}
