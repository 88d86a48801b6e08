//! Price text parsing for values read out of a matched page element.

use regex::Regex;
use std::sync::LazyLock;

static AMOUNT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\d{1,3}(?:,\d{3})+(?:\.\d{1,2})?|\d+(?:\.\d{1,2})?").expect("static regex")
});

/// Parse the first monetary amount in `text`, e.g. `"CDN$ 1,299.99"`, `"$49.99"`
/// or `"49.99"`. Returns `None` when there is no amount or it is not positive.
pub fn parse_price_text(text: &str) -> Option<f64> {
    let matched = AMOUNT.find(text)?;
    let value: f64 = matched.as_str().replace(',', "").parse().ok()?;
    (value.is_finite() && value > 0.0).then_some(value)
}

/// Round to whole cents.
pub fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
