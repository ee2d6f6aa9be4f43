//! claimtrie-replay: rebuild a claim index from a JSON-lines block file.
//!
//! Usage: `claimtrie-replay <config.toml> <blocks.jsonl> [url ...]`
//!
//! Each line of the block file is one parsed block. Blocks are applied in
//! file order, one database transaction per block. Any URLs given after the
//! block file are resolved against the finished index and printed as JSON.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;

use anyhow::Context;
use claimtrie_index::{ClaimIndex, IndexConfig};
use claimtrie_types::tx::Block;
use tracing::{info, warn};

fn main() -> anyhow::Result<()> {
    let mut args = std::env::args().skip(1);
    let (Some(config_path), Some(blocks_path)) = (args.next(), args.next()) else {
        anyhow::bail!("usage: claimtrie-replay <config.toml> <blocks.jsonl> [url ...]");
    };
    let urls: Vec<String> = args.collect();

    let config = IndexConfig::load(&PathBuf::from(&config_path))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("claimtrie={}", config.logging.level).parse()?),
        )
        .init();

    info!(config = %config_path, blocks = %blocks_path, "replay starting");

    let blocks = read_blocks(&blocks_path)?;
    let tip = blocks.last().map(|b| b.header.height).unwrap_or(0);

    let mut index = ClaimIndex::open(config)?;
    let mut takeovers = 0usize;
    for block in &blocks {
        if index.height().is_some_and(|h| block.header.height <= h) {
            warn!(height = block.header.height, "block already indexed, skipping");
            continue;
        }
        let summary = index
            .advance_block(block, tip)
            .with_context(|| format!("applying block {}", block.header.height))?;
        takeovers += summary.takeovers.len();
    }
    info!(blocks = blocks.len(), takeovers, height = ?index.height(), "replay finished");

    if !urls.is_empty() {
        let reader = index.reader()?;
        let outcome = reader.resolve(&urls)?;
        for (url, result) in urls.iter().zip(&outcome.results) {
            let line = match result {
                Ok(row) => serde_json::json!({ "url": url, "claim": row }),
                Err(e) => serde_json::json!({ "url": url, "error": e.to_string() }),
            };
            println!("{line}");
        }
    }

    index.close()?;
    Ok(())
}

fn read_blocks(path: &str) -> anyhow::Result<Vec<Block>> {
    let file = File::open(path).with_context(|| format!("opening {path}"))?;
    let mut blocks = Vec::new();
    for (number, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let block: Block = serde_json::from_str(&line)
            .with_context(|| format!("{path}:{}: invalid block", number + 1))?;
        blocks.push(block);
    }
    Ok(blocks)
}
