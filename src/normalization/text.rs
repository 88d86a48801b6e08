//! Display text cleanup for titles pulled from API payloads or product pages.

const ENTITIES: &[(&str, &str)] = &[
    ("&amp;", "&"),
    ("&quot;", "\""),
    ("&#39;", "'"),
    ("&#039;", "'"),
    ("&apos;", "'"),
    ("&lt;", "<"),
    ("&gt;", ">"),
    ("&nbsp;", " "),
    ("&ndash;", "-"),
    ("&mdash;", "-"),
    ("&reg;", "®"),
    ("&trade;", "™"),
];

/// Collapse runs of whitespace and decode the handful of entities that show
/// up in product titles. `&amp;` is decoded last so `&amp;lt;` stays literal.
pub fn clean_text(raw: &str) -> String {
    let mut decoded = raw.to_string();
    for (entity, replacement) in ENTITIES.iter().filter(|(e, _)| *e != "&amp;") {
        if decoded.contains(entity) {
            decoded = decoded.replace(entity, replacement);
        }
    }
    decoded = decoded.replace("&amp;", "&");
    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Truncate to at most `max_chars` characters, never splitting a code point.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => text[..byte_idx].trim_end().to_string(),
        None => text.to_string(),
    }
}

/// `Some(cleaned)` when anything is left after cleanup.
pub fn non_empty_clean(raw: Option<&str>) -> Option<String> {
    raw.map(clean_text).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapses_whitespace_and_decodes_entities() {
        assert_eq!(
            clean_text("  Salt &amp; Pepper\n\t Grinder &quot;Pro&quot; "),
            "Salt & Pepper Grinder \"Pro\""
        );
        assert_eq!(clean_text("a &amp;lt; b"), "a &lt; b");
    }

    #[test]
    fn truncation_is_char_safe() {
        assert_eq!(truncate_chars("héllo wörld", 5), "héllo");
        assert_eq!(truncate_chars("short", 60), "short");
        assert_eq!(truncate_chars("ab cd", 3), "ab");
    }

    #[test]
    fn blank_text_is_none() {
        assert_eq!(non_empty_clean(Some("  \n ")), None);
        assert_eq!(non_empty_clean(None), None);
        assert_eq!(non_empty_clean(Some(" x ")), Some("x".into()));
    }
}
