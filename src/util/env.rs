//! Environment helpers: centralized dotenv loading and ergonomic getters.
//! Call `init_env()` once early in the binary (or rely on lazy Once).
use std::str::FromStr;
use std::sync::Once;
use tracing::{info, warn};

static INIT: Once = Once::new();

/// Load .env exactly once. Safe to call many times.
pub fn init_env() {
    INIT.call_once(|| {
        if dotenv::dotenv().is_ok() {
            return;
        }
        // Fallback to the crate root so `cargo run` from a subdirectory still finds it.
        let candidate = format!("{}/.env", env!("CARGO_MANIFEST_DIR"));
        let _ = dotenv::from_filename(candidate);
    });
}

/// Common bootstrap for the CLI: load the environment and report which
/// credential groups are present (never their values).
pub fn bootstrap_cli(bin_name: &str) {
    init_env();

    let has_api = env_opt("AMZ_ACCESS_KEY").is_some() && env_opt("AMZ_SECRET_KEY").is_some();
    let has_tag = env_opt("AMZ_PARTNER_TAG").is_some();
    if has_api {
        info!(target = "bootstrap", bin = bin_name, "PA-API credentials detected");
    } else {
        warn!(
            target = "bootstrap",
            bin = bin_name,
            "no PA-API credentials configured; structured tier will be unavailable"
        );
    }
    if !has_tag {
        warn!(target = "bootstrap", bin = bin_name, "AMZ_PARTNER_TAG is not set");
    }
}

/// Get optional env var (None if unset or empty).
pub fn env_opt(key: &str) -> Option<String> {
    init_env();
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => Some(v.trim().to_string()),
        _ => None,
    }
}

/// Get parsed value with default fallback. Unparseable values are logged and ignored.
pub fn env_parse<T>(key: &str, default: T) -> T
where
    T: FromStr + Clone + std::fmt::Debug,
{
    init_env();
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => match raw.trim().parse::<T>() {
            Ok(value) => value,
            Err(_) => {
                warn!(
                    env_key = key,
                    raw_value = %raw,
                    fallback = ?default,
                    "invalid env value; using default"
                );
                default
            }
        },
        _ => default,
    }
}

/// Boolean flag; accepts 1/true/on/yes (case-insensitive) as true.
pub fn env_flag(key: &str, default: bool) -> bool {
    init_env();
    match std::env::var(key) {
        Ok(raw) => {
            let v = raw.trim().to_ascii_lowercase();
            matches!(v.as_str(), "1" | "true" | "on" | "yes")
        }
        Err(_) => default,
    }
}

fn redact_value(key: &str, val: &str) -> String {
    let k = key.to_ascii_uppercase();
    if k.contains("SECRET") || k.contains("KEY") || k.contains("TOKEN") {
        return "***".to_string();
    }
    val.trim().to_string()
}

/// Validate required keys and log a consolidated, redacted snapshot of configuration.
/// Returns error if any required key is missing.
pub fn preflight_check(title: &str, required: &[&str], also_log: &[&str]) -> anyhow::Result<()> {
    init_env();
    let missing: Vec<&str> = required
        .iter()
        .copied()
        .filter(|k| env_opt(k).is_none())
        .collect();
    let snapshot: Vec<(String, String)> = also_log
        .iter()
        .map(|&k| {
            let v = env_opt(k).unwrap_or_default();
            (k.to_string(), redact_value(k, &v))
        })
        .collect();
    info!(target = "preflight", title, snapshot = ?snapshot, "configuration snapshot");
    if !missing.is_empty() {
        return Err(anyhow::anyhow!("missing required env: {:?}", missing));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redacts_secret_like_keys() {
        assert_eq!(redact_value("AMZ_SECRET_KEY", "abc"), "***");
        assert_eq!(redact_value("AMZ_ACCESS_KEY", "abc"), "***");
        assert_eq!(redact_value("AMZ_MARKETPLACE", " CA "), "CA");
    }

    #[test]
    fn env_parse_falls_back_on_garbage() {
        std::env::set_var("DEALS_TEST_PARSE_GARBAGE", "not-a-number");
        assert_eq!(env_parse("DEALS_TEST_PARSE_GARBAGE", 7u32), 7);
        std::env::set_var("DEALS_TEST_PARSE_OK", " 12 ");
        assert_eq!(env_parse("DEALS_TEST_PARSE_OK", 7u32), 12);
    }

    #[test]
    fn env_flag_accepts_common_truthy_values() {
        std::env::set_var("DEALS_TEST_FLAG_ON", "Yes");
        assert!(env_flag("DEALS_TEST_FLAG_ON", false));
        std::env::set_var("DEALS_TEST_FLAG_OFF", "0");
        assert!(!env_flag("DEALS_TEST_FLAG_OFF", true));
        assert!(env_flag("DEALS_TEST_FLAG_UNSET", true));
    }
}
