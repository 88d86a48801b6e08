//! Loader for the mentions file produced by the post-listing scraper.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use tracing::{info, warn};

use crate::model::RawMention;

/// Accepted top-level shapes: a bare array, or an object wrapping one.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum MentionsFile {
    List(Vec<RawMention>),
    Wrapped { mentions: Vec<RawMention> },
}

/// Parse mentions from JSON text. Mentions with a blank short link are dropped.
pub fn parse_mentions(json: &str) -> Result<Vec<RawMention>> {
    let parsed: MentionsFile =
        serde_json::from_str(json).context("mentions file is not a JSON array or {\"mentions\": [...]}")?;
    let raw = match parsed {
        MentionsFile::List(list) => list,
        MentionsFile::Wrapped { mentions } => mentions,
    };

    let total = raw.len();
    let kept: Vec<RawMention> = raw
        .into_iter()
        .enumerate()
        .filter_map(|(idx, mut m)| {
            m.short_link = m.short_link.trim().to_string();
            if m.short_link.is_empty() {
                warn!(index = idx, post_title = %m.post_title, "mention has no short link; dropping");
                None
            } else {
                Some(m)
            }
        })
        .collect();

    if kept.len() != total {
        info!(total, kept = kept.len(), "filtered mentions without links");
    }
    Ok(kept)
}

/// Read and parse a mentions file from disk.
pub async fn load_mentions(path: &Path) -> Result<Vec<RawMention>> {
    let body = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading mentions file {}", path.display()))?;
    parse_mentions(&body).with_context(|| format!("parsing mentions file {}", path.display()))
}
