//! Print the persisted result cache
//! Run with: cargo run --bin cache_inspect -- [--settings-dir <dir>] [--fingerprint <hex>] [--image <path>]

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

use manga_translator::{core::Config, fingerprint, ResultCache};

#[derive(Parser, Debug)]
#[command(name = "cache_inspect", about = "List records in the result cache")]
struct Args {
    /// Settings directory holding the cache (defaults to the configured one)
    #[arg(long)]
    settings_dir: Option<PathBuf>,

    /// Only show records for this fingerprint
    #[arg(long, conflicts_with = "image")]
    fingerprint: Option<String>,

    /// Only show records for this image file
    #[arg(long)]
    image: Option<PathBuf>,

    /// Print every block, not just the record summary
    #[arg(long)]
    blocks: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("manga_translator=info")
        .with_target(false)
        .init();

    let args = Args::parse();

    let settings_dir = match args.settings_dir {
        Some(dir) => dir,
        None => Config::new()
            .context("Failed to load configuration")?
            .settings_dir()
            .to_path_buf(),
    };

    let wanted = match (&args.fingerprint, &args.image) {
        (Some(hex), _) => Some(hex.to_lowercase()),
        (None, Some(path)) => {
            let bytes = std::fs::read(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let hex = fingerprint(&bytes);
            info!("{} -> {}", path.display(), hex);
            Some(hex)
        }
        (None, None) => None,
    };

    let cache = ResultCache::open(&settings_dir, None)
        .await
        .with_context(|| format!("Failed to open cache in {}", settings_dir.display()))?;
    let (count, size_bytes) = cache.stats().await?;
    let records = cache.records().await?;

    println!("\n=== Result cache ===");
    println!("Path: {}", cache.path().await.display());
    println!("Records: {} ({} bytes)", count, size_bytes);

    let mut shown = 0;
    for record in records
        .iter()
        .filter(|r| wanted.as_deref().map_or(true, |fp| r.fingerprint == fp))
    {
        shown += 1;
        println!(
            "\n{}  [{}]  {} blocks",
            record.fingerprint,
            record.service,
            record.blocks.len()
        );
        if args.blocks {
            for block in &record.blocks {
                let (width, height) = block.size();
                let [r, g, b, _] = block.color.rgba();
                println!(
                    "  {}. (#{:02x}{:02x}{:02x}, {}x{}) {} => {}",
                    block.ordinal + 1,
                    r,
                    g,
                    b,
                    width,
                    height,
                    block.text,
                    if block.translated.is_empty() {
                        "(untranslated)"
                    } else {
                        block.translated.as_str()
                    }
                );
            }
        }
    }

    if shown == 0 && wanted.is_some() {
        println!("\n  (no records for this image)");
    }

    Ok(())
}
