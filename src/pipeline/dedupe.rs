//! Collapse verified observations to one canonical record per identifier.

use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use tracing::debug;

use super::guard::VerifiedObservation;
use crate::model::{PriceObservation, ProductIdentifier};

/// The winning observation for one identifier plus the post context that
/// enrichment may fall back on.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalProduct {
    pub observation: PriceObservation,
    /// Earliest `observedAt` across the mentions; becomes `dateAdded`.
    pub first_seen: Option<DateTime<Utc>>,
    /// First non-empty category in input order.
    pub category: String,
    /// Title and image from the earliest mention. Cosmetic only.
    pub post_title: String,
    pub post_image_url: Option<String>,
    /// Observations folded into this one.
    pub merged: usize,
}

impl CanonicalProduct {
    pub fn identifier(&self) -> &ProductIdentifier {
        &self.observation.identifier
    }
}

/// Higher tier, then newer observation, then lexically smallest title, then
/// lowest price, then earliest input position. `Less` sorts first = wins.
fn trust_order(a: &VerifiedObservation, b: &VerifiedObservation) -> Ordering {
    let (oa, ob) = (a.observation(), b.observation());
    ob.tier
        .trust_rank()
        .cmp(&oa.tier.trust_rank())
        .then_with(|| ob.observed_at.cmp(&oa.observed_at))
        .then_with(|| match (&oa.title, &ob.title) {
            (Some(x), Some(y)) => x.cmp(y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
        .then_with(|| oa.current_price.total_cmp(&ob.current_price))
        .then_with(|| a.index().cmp(&b.index()))
}

/// Order mentions by timestamp, undated ones last, then input position.
fn mention_age(v: &VerifiedObservation) -> (bool, Option<DateTime<Utc>>, usize) {
    let at = v.mention().observed_at;
    (at.is_none(), at, v.index())
}

fn collapse(mut group: Vec<VerifiedObservation>) -> Option<CanonicalProduct> {
    let merged = group.len().saturating_sub(1);

    let first_seen = group.iter().filter_map(|v| v.mention().observed_at).min();

    let mut by_input = group.iter().collect::<Vec<_>>();
    by_input.sort_by_key(|v| v.index());
    let category = by_input
        .iter()
        .map(|v| v.mention().category.trim())
        .find(|c| !c.is_empty())
        .unwrap_or_default()
        .to_string();

    let (post_title, post_image_url) = group
        .iter()
        .min_by_key(|v| mention_age(v))
        .map(|v| {
            (
                v.mention().post_title.clone(),
                v.mention().post_image_url.clone(),
            )
        })
        .unwrap_or_default();

    group.sort_by(trust_order);
    let mut members = group.into_iter().map(|v| v.into_parts().2);
    let mut winner = members.next()?;
    for loser in members {
        if winner.title.is_none() {
            winner.title = loser.title.clone();
        }
        if winner.image_url.is_none() {
            winner.image_url = loser.image_url.clone();
        }
    }

    Some(CanonicalProduct {
        observation: winner,
        first_seen,
        category,
        post_title,
        post_image_url,
        merged,
    })
}

/// Group by identifier and keep one canonical record each, in identifier order.
pub fn deduplicate(verified: Vec<VerifiedObservation>) -> Vec<CanonicalProduct> {
    let mut groups: BTreeMap<ProductIdentifier, Vec<VerifiedObservation>> = BTreeMap::new();
    for v in verified {
        groups.entry(v.identifier().clone()).or_default().push(v);
    }

    groups
        .into_iter()
        .filter_map(|(asin, group)| {
            if group.len() > 1 {
                debug!(asin = %asin, count = group.len(), "merging duplicate observations");
            }
            collapse(group)
        })
        .collect()
}
