//! Tier 2: live product page scrape.

pub mod provider;
pub mod selectors;

pub use provider::{parse_product_page, ProductPage, ScrapeProvider};
