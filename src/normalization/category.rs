//! Keyword-based category inference for mentions posted without one.

/// Used when nothing in the title matches.
pub const DEFAULT_CATEGORY: &str = "General";

/// Checked in order; the first table entry with a matching keyword wins.
const CATEGORY_KEYWORDS: &[(&str, &[&str])] = &[
    (
        "Electronics",
        &[
            "electronics", "tech", "computer", "laptop", "phone", "tablet", "camera", "tv",
            "headphone", "earbud", "monitor",
        ],
    ),
    (
        "Home & Garden",
        &["home", "kitchen", "garden", "furniture", "decor", "appliance", "knife"],
    ),
    (
        "Clothing",
        &["clothing", "fashion", "shirt", "dress", "shoes", "jacket"],
    ),
    ("Books", &["book", "novel", "kindle", "ebook", "reading"]),
    (
        "Toys & Games",
        &["toy", "game", "kids", "children", "play", "lego"],
    ),
    (
        "Health & Beauty",
        &["health", "beauty", "skincare", "makeup", "supplement"],
    ),
    (
        "Sports",
        &["sport", "fitness", "gym", "exercise", "outdoor", "yoga"],
    ),
];

/// Map a post title onto one of the fixed categories.
pub fn categorize(title: &str) -> &'static str {
    let lowered = title.to_lowercase();
    CATEGORY_KEYWORDS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| lowered.contains(k)))
        .map(|(name, _)| *name)
        .unwrap_or(DEFAULT_CATEGORY)
}

/// The mention's own category when it has one, otherwise inferred from the title.
pub fn resolve_category(explicit: &str, post_title: &str) -> String {
    let explicit = explicit.trim();
    if explicit.is_empty() {
        categorize(post_title).to_string()
    } else {
        explicit.to_string()
    }
}
