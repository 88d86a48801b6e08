//! Atomic JSON output: write a sibling temp file, fsync, rename over the target.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::model::DealRecord;

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "deals.json".into());
    name.push(".tmp");
    path.with_file_name(name)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PriorDeal {
    id: String,
    date_added: DateTime<Utc>,
}

/// `dateAdded` per deal id from a previous output file. A missing or
/// unreadable file yields an empty map.
pub async fn previous_dates(path: &Path) -> BTreeMap<String, DateTime<Utc>> {
    let Ok(body) = tokio::fs::read_to_string(path).await else {
        debug!(path = %path.display(), "no previous output");
        return BTreeMap::new();
    };
    match serde_json::from_str::<Vec<PriorDeal>>(&body) {
        Ok(prior) => prior.into_iter().map(|d| (d.id, d.date_added)).collect(),
        Err(err) => {
            warn!(path = %path.display(), error = %err, "ignoring unreadable previous output");
            BTreeMap::new()
        }
    }
}

/// Pretty-printed array with a trailing newline.
pub fn render(records: &[DealRecord]) -> Result<String> {
    let mut body = serde_json::to_string_pretty(records).context("serializing deals")?;
    body.push('\n');
    Ok(body)
}

async fn write_and_sync(tmp: &Path, body: &[u8]) -> Result<()> {
    let mut file = tokio::fs::File::create(tmp)
        .await
        .with_context(|| format!("creating {}", tmp.display()))?;
    file.write_all(body)
        .await
        .with_context(|| format!("writing {}", tmp.display()))?;
    file.flush().await?;
    file.sync_all()
        .await
        .with_context(|| format!("syncing {}", tmp.display()))?;
    Ok(())
}

/// Replace `path` with the serialized records. Readers see either the old
/// file or the complete new one.
pub async fn write_deals(path: &Path, records: &[DealRecord]) -> Result<()> {
    let body = render(records)?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("creating output directory {}", parent.display()))?;
    }

    let tmp = temp_path_for(path);
    let result = async {
        write_and_sync(&tmp, body.as_bytes()).await?;
        tokio::fs::rename(&tmp, path)
            .await
            .with_context(|| format!("renaming {} to {}", tmp.display(), path.display()))
    }
    .await;

    if let Err(err) = result {
        if let Err(cleanup) = tokio::fs::remove_file(&tmp).await {
            if cleanup.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %tmp.display(), error = %cleanup, "failed to remove temp file");
            }
        }
        return Err(err);
    }

    info!(path = %path.display(), deals = records.len(), bytes = body.len(), "wrote deals");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Deal, Tier};
    use chrono::{DateTime, Utc};

    fn record(asin: &str) -> DealRecord {
        DealRecord {
            deal: Deal {
                id: format!("deal_{asin}"),
                asin: asin.into(),
                title: "Kettle".into(),
                image_url: "https://m.media-amazon.com/images/I/k.jpg".into(),
                price: 49.99,
                original_price: Some(99.99),
                discount_percent: Some(50),
                category: "Home & Garden".into(),
                description: "Save 50% on Kettle in Home & Garden.".into(),
                affiliate_url: format!("https://www.amazon.ca/dp/{asin}?tag=tag-20"),
                featured: true,
                date_added: DateTime::parse_from_rfc3339("2024-12-11T10:00:00Z")
                    .unwrap()
                    .with_timezone(&Utc),
                data_source: Tier::Api,
            },
            show_price: false,
        }
    }

    #[tokio::test]
    async fn writes_and_replaces_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/public/deals.json");

        write_deals(&path, &[record("B000000001")]).await.unwrap();
        let first = std::fs::read_to_string(&path).unwrap();
        assert!(first.ends_with("]\n"));
        let parsed: Vec<DealRecord> = serde_json::from_str(&first).unwrap();
        assert_eq!(parsed, vec![record("B000000001")]);

        write_deals(&path, &[record("B000000002"), record("B000000003")])
            .await
            .unwrap();
        let parsed: Vec<DealRecord> =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed.len(), 2);
        assert!(!temp_path_for(&path).exists());
    }

    #[tokio::test]
    async fn failed_write_leaves_target_and_no_temp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deals.json");
        write_deals(&path, &[record("B000000001")]).await.unwrap();
        let before = std::fs::read_to_string(&path).unwrap();

        // A directory squatting on the temp name makes the create fail.
        std::fs::create_dir(temp_path_for(&path)).unwrap();
        assert!(write_deals(&path, &[]).await.is_err());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), before);
    }

    #[tokio::test]
    async fn previous_dates_round_trip_through_output() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deals.json");
        assert!(previous_dates(&path).await.is_empty());

        write_deals(&path, &[record("B000000001")]).await.unwrap();
        let dates = previous_dates(&path).await;
        assert_eq!(
            dates.get("deal_B000000001").map(|d| d.to_rfc3339()),
            Some("2024-12-11T10:00:00+00:00".to_string())
        );

        std::fs::write(&path, "not json").unwrap();
        assert!(previous_dates(&path).await.is_empty());
    }

    #[test]
    fn empty_run_renders_empty_array() {
        assert_eq!(render(&[]).unwrap(), "[]\n");
    }

    #[test]
    fn temp_file_is_a_sibling() {
        assert_eq!(
            temp_path_for(Path::new("public/deals.json")),
            PathBuf::from("public/deals.json.tmp")
        );
    }
}
