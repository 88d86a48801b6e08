//! Core records that flow through the pipeline.
//!
//! A [`RawMention`] is what the post-listing scraper hands us; a
//! [`PriceObservation`] is what a pricing tier returned for a resolved
//! [`ProductIdentifier`]; a [`Deal`] is the persisted contract the front end reads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::ValidationError;

/// Upper bound on identifier length. ASINs are 10 characters; other storefront
/// identifiers are accepted as long as they stay short and alphanumeric.
const MAX_IDENTIFIER_LEN: usize = 20;

/// One observation of a product from a source post.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawMention {
    #[serde(default)]
    pub source_url: String,
    pub short_link: String,
    #[serde(default)]
    pub post_title: String,
    #[serde(default)]
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_at: Option<DateTime<Utc>>,
    /// Image attached to the post itself. Cosmetic only; lowest trust.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_image_url: Option<String>,
}

/// Canonical product key (ASIN-equivalent), upper-case alphanumeric.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProductIdentifier(String);

impl ProductIdentifier {
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let normalized = raw.trim().to_ascii_uppercase();
        if normalized.is_empty()
            || normalized.len() > MAX_IDENTIFIER_LEN
            || !normalized.chars().all(|c| c.is_ascii_alphanumeric())
        {
            return Err(ValidationError::InvalidIdentifier(raw.to_string()));
        }
        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProductIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ProductIdentifier {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ProductIdentifier> for String {
    fn from(value: ProductIdentifier) -> Self {
        value.0
    }
}

/// Ranked pricing source. There is deliberately no "fallback"/"unknown" variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tier {
    #[serde(rename = "PAAPI")]
    Api,
    #[serde(rename = "SCRAPED")]
    Scraped,
}

/// Name used by the persisted contract for the tier that produced a deal.
pub type DataSource = Tier;

impl Tier {
    /// Higher is more trusted.
    pub fn trust_rank(self) -> u8 {
        match self {
            Tier::Api => 2,
            Tier::Scraped => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Api => "PAAPI",
            Tier::Scraped => "SCRAPED",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pricing data returned by one tier for one identifier. Every populated field
/// was read from an external response.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceObservation {
    pub identifier: ProductIdentifier,
    pub tier: Tier,
    pub current_price: f64,
    pub list_price: Option<f64>,
    pub title: Option<String>,
    pub image_url: Option<String>,
    pub observed_at: DateTime<Utc>,
}

/// Final persisted entity consumed by the front end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deal {
    pub id: String,
    pub asin: String,
    pub title: String,
    pub image_url: String,
    pub price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discount_percent: Option<u8>,
    pub category: String,
    pub description: String,
    pub affiliate_url: String,
    pub featured: bool,
    pub date_added: DateTime<Utc>,
    pub data_source: DataSource,
}

impl Deal {
    /// Stable id derived only from the identifier.
    pub fn id_for(identifier: &ProductIdentifier) -> String {
        format!("deal_{}", identifier.as_str())
    }

    /// Affiliate link built from the storefront and partner tag, never from the post.
    pub fn affiliate_url_for(
        storefront: &str,
        identifier: &ProductIdentifier,
        partner_tag: &str,
    ) -> String {
        format!(
            "{}/dp/{}?tag={}",
            storefront.trim_end_matches('/'),
            identifier.as_str(),
            partner_tag
        )
    }
}

/// What the writer persists: the deal contract plus the display hint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DealRecord {
    #[serde(flatten)]
    pub deal: Deal,
    pub show_price: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifier_normalizes_case_and_rejects_garbage() {
        assert_eq!(
            ProductIdentifier::parse(" b08n5wrwnw ").unwrap().as_str(),
            "B08N5WRWNW"
        );
        assert!(ProductIdentifier::parse("").is_err());
        assert!(ProductIdentifier::parse("B08-5WRWNW").is_err());
        assert!(ProductIdentifier::parse(&"A".repeat(21)).is_err());
    }

    #[test]
    fn tier_serializes_to_contract_names() {
        assert_eq!(serde_json::to_string(&Tier::Api).unwrap(), "\"PAAPI\"");
        assert_eq!(serde_json::to_string(&Tier::Scraped).unwrap(), "\"SCRAPED\"");
        assert!(serde_json::from_str::<Tier>("\"FALLBACK\"").is_err());
        assert!(Tier::Api.trust_rank() > Tier::Scraped.trust_rank());
    }

    #[test]
    fn id_and_affiliate_url_depend_only_on_identifier() {
        let id = ProductIdentifier::parse("B08N5WRWNW").unwrap();
        assert_eq!(Deal::id_for(&id), "deal_B08N5WRWNW");
        assert_eq!(
            Deal::affiliate_url_for("https://www.amazon.ca/", &id, "tag-20"),
            "https://www.amazon.ca/dp/B08N5WRWNW?tag=tag-20"
        );
    }

    #[test]
    fn optional_fields_are_omitted_not_null() {
        let deal = Deal {
            id: "deal_X".into(),
            asin: "X".into(),
            title: "t".into(),
            image_url: "i".into(),
            price: 29.99,
            original_price: None,
            discount_percent: None,
            category: "General".into(),
            description: "d".into(),
            affiliate_url: "a".into(),
            featured: false,
            date_added: DateTime::parse_from_rfc3339("2024-12-11T10:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
            data_source: Tier::Scraped,
        };
        let json = serde_json::to_value(DealRecord {
            deal,
            show_price: true,
        })
        .unwrap();
        let obj = json.as_object().unwrap();
        assert!(!obj.contains_key("originalPrice"));
        assert!(!obj.contains_key("discountPercent"));
        assert_eq!(obj["dataSource"], "SCRAPED");
        assert_eq!(obj["dateAdded"], "2024-12-11T10:00:00Z");
        assert_eq!(obj["showPrice"], true);
    }
}
