//! Turn canonical observations into persisted deals.

use chrono::{DateTime, Utc};

use super::dedupe::CanonicalProduct;
use crate::model::{Deal, ProductIdentifier};
use crate::normalization::category::resolve_category;
use crate::normalization::price::round_cents;
use crate::normalization::text::{clean_text, non_empty_clean, truncate_chars};

pub const PLACEHOLDER_TITLE: &str = "Product details unavailable";
pub const PLACEHOLDER_IMAGE: &str = "https://m.media-amazon.com/images/I/placeholder.jpg";

const MAX_TITLE_CHARS: usize = 200;
const DESCRIPTION_TITLE_CHARS: usize = 60;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Discount {
    pub percent: u8,
    pub savings: f64,
}

/// `None` unless the list price is a usable number strictly above the current price.
pub fn compute_discount(current: f64, list: Option<f64>) -> Option<Discount> {
    let list = list.filter(|l| l.is_finite() && *l > 0.0 && *l > current)?;
    // f64::round rounds halves away from zero.
    let percent = ((list - current) / list * 100.0).round().clamp(0.0, 100.0) as u8;
    Some(Discount {
        percent,
        savings: round_cents(list - current),
    })
}

/// Values enrichment needs from outside the observation.
#[derive(Debug, Clone)]
pub struct EnrichContext<'a> {
    pub storefront: &'a str,
    pub partner_tag: &'a str,
    /// `dateAdded` for products whose mentions carried no timestamp.
    pub fallback_date: DateTime<Utc>,
}

fn pick_title(product: &CanonicalProduct) -> String {
    let title = non_empty_clean(product.observation.title.as_deref())
        .or_else(|| non_empty_clean(Some(&product.post_title)))
        .unwrap_or_else(|| PLACEHOLDER_TITLE.to_string());
    truncate_chars(&title, MAX_TITLE_CHARS)
}

fn pick_image(product: &CanonicalProduct) -> String {
    [
        product.observation.image_url.as_deref(),
        product.post_image_url.as_deref(),
    ]
    .into_iter()
    .flatten()
    .map(str::trim)
    .find(|u| !u.is_empty())
    .unwrap_or(PLACEHOLDER_IMAGE)
    .to_string()
}

pub fn describe(title: &str, category: &str, discount: Option<Discount>) -> String {
    let short = truncate_chars(title, DESCRIPTION_TITLE_CHARS);
    match discount {
        Some(d) => format!("Save {}% on {short} in {category}.", d.percent),
        None => format!("Great deal on {short} in {category}."),
    }
}

/// Build the deal. `featured` is left unset; the display assigner owns it.
pub fn enrich(product: CanonicalProduct, ctx: &EnrichContext<'_>) -> Deal {
    let obs = &product.observation;
    let asin: &ProductIdentifier = &obs.identifier;
    let discount = compute_discount(obs.current_price, obs.list_price);

    let title = pick_title(&product);
    let image_url = pick_image(&product);
    let category = resolve_category(&product.category, &clean_text(&product.post_title));
    let description = describe(&title, &category, discount);

    Deal {
        id: Deal::id_for(asin),
        asin: asin.to_string(),
        title,
        image_url,
        price: obs.current_price,
        original_price: discount.and(obs.list_price),
        discount_percent: discount.map(|d| d.percent),
        category,
        description,
        affiliate_url: Deal::affiliate_url_for(ctx.storefront, asin, ctx.partner_tag),
        featured: false,
        date_added: product.first_seen.unwrap_or(ctx.fallback_date),
        data_source: obs.tier,
    }
}
