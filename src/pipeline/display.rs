//! Deterministic display hints: final ordering, price visibility buckets and
//! the featured flag.

use anyhow::{Context, Result};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

use crate::model::{Deal, DealRecord};

#[derive(Debug, Clone, PartialEq)]
pub struct DisplayConfig {
    pub featured_threshold: u8,
    pub featured_top_n: usize,
    /// Modulus for the price-visibility hash; bucket 0 shows the price.
    pub price_buckets: u32,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            featured_threshold: 40,
            featured_top_n: 20,
            price_buckets: 10,
        }
    }
}

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

/// FNV-1a, 32 bit.
pub fn fnv1a_32(bytes: &[u8]) -> u32 {
    bytes.iter().fold(FNV_OFFSET_BASIS, |hash, b| {
        (hash ^ u32::from(*b)).wrapping_mul(FNV_PRIME)
    })
}

pub fn should_show_price(id: &str, buckets: u32) -> bool {
    buckets != 0 && fnv1a_32(id.as_bytes()) % buckets == 0
}

/// Explicit per-id visibility decisions that win over the hash.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VisibilityOverrides {
    entries: BTreeMap<String, bool>,
}

impl VisibilityOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: impl Into<String>, show_price: bool) {
        self.entries.insert(id.into(), show_price);
    }

    pub fn get(&self, id: &str) -> Option<bool> {
        self.entries.get(id).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Load a JSON object of `{ "<deal id>": true|false }`.
    pub async fn load(path: &Path) -> Result<Self> {
        let body = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading overrides file {}", path.display()))?;
        let entries: BTreeMap<String, bool> = serde_json::from_str(&body)
            .with_context(|| format!("parsing overrides file {}", path.display()))?;
        Ok(Self { entries })
    }

    pub fn show_price(&self, id: &str, buckets: u32) -> bool {
        self.get(id).unwrap_or_else(|| should_show_price(id, buckets))
    }
}

impl FromIterator<(String, bool)> for VisibilityOverrides {
    fn from_iter<I: IntoIterator<Item = (String, bool)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// Discount descending (undiscounted last), then ASIN ascending.
pub fn display_order(a: &Deal, b: &Deal) -> Ordering {
    match (a.discount_percent, b.discount_percent) {
        (Some(x), Some(y)) => y.cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
    .then_with(|| a.asin.cmp(&b.asin))
}

/// Deals removed by [`apply_limits`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LimitStats {
    pub below_min_discount: usize,
    pub over_cap: usize,
}

/// Sort, drop discounted deals under `min_discount`, then cap at `max_deals`
/// (0 keeps everything). Undiscounted deals are never dropped by the floor.
pub fn apply_limits(mut deals: Vec<Deal>, min_discount: u8, max_deals: usize) -> (Vec<Deal>, LimitStats) {
    deals.sort_by(display_order);
    let before = deals.len();
    deals.retain(|d| d.discount_percent.map_or(true, |p| p >= min_discount));
    let below_min_discount = before - deals.len();

    let over_cap = if max_deals > 0 && deals.len() > max_deals {
        let extra = deals.len() - max_deals;
        deals.truncate(max_deals);
        extra
    } else {
        0
    };
    (
        deals,
        LimitStats {
            below_min_discount,
            over_cap,
        },
    )
}

/// Final ordering plus `featured` and `showPrice`.
pub fn assign_display(
    mut deals: Vec<Deal>,
    cfg: &DisplayConfig,
    overrides: &VisibilityOverrides,
) -> Vec<DealRecord> {
    deals.sort_by(display_order);
    deals
        .into_iter()
        .enumerate()
        .map(|(rank, mut deal)| {
            deal.featured = match deal.discount_percent {
                Some(pct) => pct >= cfg.featured_threshold || rank < cfg.featured_top_n,
                None => false,
            };
            let show_price = overrides.show_price(&deal.id, cfg.price_buckets);
            debug!(asin = %deal.asin, rank, featured = deal.featured, show_price, "display assigned");
            DealRecord { deal, show_price }
        })
        .collect()
}
