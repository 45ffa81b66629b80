//! Validator key generator.
//!
//! Writes a fresh hex-encoded 32-byte ed25519 seed, the format the node
//! loads its signing key from, and prints the matching public key for the
//! `[[validators]]` section of the node config.
//!
//! ```bash
//! chainbft-keygen --out validator.key
//! chainbft-keygen --config node.toml   # writes to [node].key_path
//! ```

use anyhow::{bail, Context, Result};
use chainbft_production::{init_tracing, NodeConfig};
use chainbft_types::KeyPair;
use clap::Parser;
use rand::RngCore;
use std::fs;
use std::path::PathBuf;
use tracing::info;

/// Generate a validator signing key
#[derive(Parser, Debug)]
#[command(name = "chainbft-keygen")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Where to write the hex-encoded seed [default: validator.key, or the
    /// config's key_path]
    #[arg(short, long)]
    out: Option<PathBuf>,

    /// Node config to take the key path and log filter from
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Overwrite an existing key file
    #[arg(long)]
    force: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Some(
            NodeConfig::load(path)
                .with_context(|| format!("Failed to load config: {}", path.display()))?,
        ),
        None => None,
    };
    let filter = config
        .as_ref()
        .map_or("warn", |config| config.logging.filter.as_str());
    init_tracing(filter).context("Failed to initialise logging")?;

    let out = cli
        .out
        .or_else(|| config.map(|config| config.node.key_path))
        .unwrap_or_else(|| PathBuf::from("validator.key"));
    if out.exists() && !cli.force {
        bail!("{} already exists; pass --force to overwrite", out.display());
    }

    let mut seed = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut seed);
    let keypair = KeyPair::from_seed(&seed);

    if let Some(parent) = out.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    fs::write(&out, format!("{}\n", hex::encode(seed)))
        .with_context(|| format!("Failed to write key file: {}", out.display()))?;
    info!(path = %out.display(), "Wrote signing key");

    println!("key_file   = {}", out.display());
    println!("public_key = {}", hex::encode(keypair.public_key().as_bytes()));
    Ok(())
}
