//! CSS selectors for product detail pages.
//!
//! Each list is tried in order and the first element whose text yields a
//! value wins. Only price-bearing elements are listed so unrelated numbers on
//! the page (ratings, shipping thresholds) never turn into prices.

use scraper::Selector;
use std::sync::LazyLock;

fn parse_all(raw: &[&str]) -> Vec<Selector> {
    raw.iter()
        .map(|s| Selector::parse(s).expect("static selector"))
        .collect()
}

/// Current (buy box) price.
pub static CURRENT_PRICE: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    parse_all(&[
        "#corePrice_feature_div .priceToPay .a-offscreen",
        "#corePriceDisplay_desktop_feature_div .priceToPay .a-offscreen",
        ".priceToPay .a-offscreen",
        "#corePrice_feature_div .a-price:not(.a-text-price) .a-offscreen",
        "#price_inside_buybox",
        "#priceblock_dealprice",
        "#priceblock_ourprice",
    ])
});

/// Struck-through list price.
pub static LIST_PRICE: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    parse_all(&[
        ".basisPrice .a-offscreen",
        ".a-price.a-text-price[data-a-strike] .a-offscreen",
        "#listPrice",
        "#priceblock_listprice",
    ])
});

pub static TITLE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("#productTitle").expect("static selector"));

pub static IMAGE: LazyLock<Vec<Selector>> =
    LazyLock::new(|| parse_all(&["#landingImage", "#imgBlkFront"]));

/// Image attributes in preference order.
pub const IMAGE_ATTRS: &[&str] = &["data-old-hires", "src"];

/// Markers of a bot-check interstitial.
pub static CAPTCHA_FORM: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("form[action*='validateCaptcha'], #captchacharacters").expect("static selector")
});

pub const CAPTCHA_PHRASES: &[&str] = &[
    "enter the characters you see below",
    "type the characters you see in this image",
    "sorry, we just need to make sure you're not a robot",
];
