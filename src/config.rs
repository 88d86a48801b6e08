//! Runtime configuration. Every knob has a default and an env override;
//! the CLI applies its flags on top of [`PipelineConfig::from_env`].

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::errors::ConfigError;
use crate::pipeline::display::DisplayConfig;
use crate::providers::retry::RetryPolicy;
use crate::util::env::{env_flag, env_opt, env_parse};

/// Storefront region. Decides PA-API host/region and the public product URLs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marketplace {
    Ca,
    Us,
    Uk,
}

impl Marketplace {
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "CA" => Ok(Marketplace::Ca),
            "US" => Ok(Marketplace::Us),
            "UK" | "GB" => Ok(Marketplace::Uk),
            _ => Err(ConfigError::UnknownMarketplace(raw.to_string())),
        }
    }

    pub fn paapi_host(self) -> &'static str {
        match self {
            Marketplace::Ca => "webservices.amazon.ca",
            Marketplace::Us => "webservices.amazon.com",
            Marketplace::Uk => "webservices.amazon.co.uk",
        }
    }

    pub fn paapi_region(self) -> &'static str {
        match self {
            Marketplace::Ca | Marketplace::Us => "us-east-1",
            Marketplace::Uk => "eu-west-1",
        }
    }

    /// Value of the `Marketplace` field in PA-API request bodies.
    pub fn marketplace_name(self) -> &'static str {
        match self {
            Marketplace::Ca => "www.amazon.ca",
            Marketplace::Us => "www.amazon.com",
            Marketplace::Uk => "www.amazon.co.uk",
        }
    }

    pub fn storefront(self) -> &'static str {
        match self {
            Marketplace::Ca => "https://www.amazon.ca",
            Marketplace::Us => "https://www.amazon.com",
            Marketplace::Uk => "https://www.amazon.co.uk",
        }
    }
}

/// PA-API key pair.
#[derive(Clone)]
pub struct Credentials {
    pub access_key: String,
    pub secret_key: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key", &"***")
            .field("secret_key", &"***")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub marketplace: Marketplace,
    pub partner_tag: String,
    pub credentials: Option<Credentials>,
    pub use_paapi: bool,

    pub workers: usize,
    pub retry: RetryPolicy,
    pub max_redirect_hops: u8,
    pub resolve_timeout: Duration,
    pub paapi_timeout: Duration,
    pub scrape_timeout: Duration,
    pub paapi_min_interval: Duration,
    pub scrape_min_interval: Duration,
    pub run_deadline: Duration,

    pub display: DisplayConfig,
    /// 0 keeps every deal.
    pub max_deals: usize,
    /// Discounted deals below this percentage are dropped; undiscounted deals are kept.
    pub min_discount: u8,

    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub overrides_path: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            marketplace: Marketplace::Ca,
            partner_tag: String::new(),
            credentials: None,
            use_paapi: true,
            workers: 5,
            retry: RetryPolicy::default(),
            max_redirect_hops: 5,
            resolve_timeout: Duration::from_secs(10),
            paapi_timeout: Duration::from_secs(15),
            scrape_timeout: Duration::from_secs(20),
            paapi_min_interval: Duration::from_millis(1000),
            scrape_min_interval: Duration::ZERO,
            run_deadline: Duration::from_secs(600),
            display: DisplayConfig::default(),
            max_deals: 120,
            min_discount: 0,
            input_path: PathBuf::from("data/mentions.json"),
            output_path: PathBuf::from("public/deals.json"),
            overrides_path: None,
        }
    }
}

impl PipelineConfig {
    /// Build from the environment on top of the defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let d = Self::default();

        let marketplace = match env_opt("AMZ_MARKETPLACE") {
            Some(raw) => Marketplace::parse(&raw)?,
            None => d.marketplace,
        };
        let credentials = match (env_opt("AMZ_ACCESS_KEY"), env_opt("AMZ_SECRET_KEY")) {
            (Some(access_key), Some(secret_key)) => Some(Credentials {
                access_key,
                secret_key,
            }),
            _ => None,
        };

        let retry = RetryPolicy {
            max_attempts: env_parse("DEALS_MAX_RETRIES", d.retry.max_attempts),
            base_delay: Duration::from_millis(env_parse(
                "DEALS_BACKOFF_MS",
                d.retry.base_delay.as_millis() as u64,
            )),
            max_delay: Duration::from_millis(env_parse(
                "DEALS_BACKOFF_MAX_MS",
                d.retry.max_delay.as_millis() as u64,
            )),
            rate_limit_cooldown: Duration::from_secs(env_parse(
                "DEALS_RATE_LIMIT_COOLDOWN_SECS",
                d.retry.rate_limit_cooldown.as_secs(),
            )),
        };

        let display = DisplayConfig {
            featured_threshold: env_parse(
                "DEALS_FEATURED_THRESHOLD",
                d.display.featured_threshold,
            ),
            featured_top_n: env_parse("DEALS_FEATURED_TOP_N", d.display.featured_top_n),
            price_buckets: env_parse("DEALS_PRICE_BUCKETS", d.display.price_buckets),
        };

        let cfg = Self {
            marketplace,
            partner_tag: env_opt("AMZ_PARTNER_TAG").unwrap_or_default(),
            credentials,
            use_paapi: !env_flag("DEALS_NO_PAAPI", false),
            workers: env_parse("DEALS_WORKERS", d.workers),
            retry,
            max_redirect_hops: env_parse("DEALS_MAX_REDIRECTS", d.max_redirect_hops),
            resolve_timeout: Duration::from_secs(env_parse(
                "DEALS_RESOLVE_TIMEOUT_SECS",
                d.resolve_timeout.as_secs(),
            )),
            paapi_timeout: Duration::from_secs(env_parse(
                "DEALS_PAAPI_TIMEOUT_SECS",
                d.paapi_timeout.as_secs(),
            )),
            scrape_timeout: Duration::from_secs(env_parse(
                "DEALS_SCRAPE_TIMEOUT_SECS",
                d.scrape_timeout.as_secs(),
            )),
            paapi_min_interval: Duration::from_millis(env_parse(
                "DEALS_PAAPI_MIN_INTERVAL_MS",
                d.paapi_min_interval.as_millis() as u64,
            )),
            scrape_min_interval: Duration::from_millis(env_parse(
                "DEALS_SCRAPE_MIN_INTERVAL_MS",
                d.scrape_min_interval.as_millis() as u64,
            )),
            run_deadline: Duration::from_secs(env_parse(
                "DEALS_RUN_DEADLINE_SECS",
                d.run_deadline.as_secs(),
            )),
            display,
            max_deals: env_parse("DEALS_MAX_COUNT", d.max_deals),
            min_discount: env_parse("DEALS_MIN_DISCOUNT", d.min_discount),
            input_path: env_opt("DEALS_INPUT")
                .map(PathBuf::from)
                .unwrap_or(d.input_path),
            output_path: env_opt("DEALS_OUTPUT")
                .map(PathBuf::from)
                .unwrap_or(d.output_path),
            overrides_path: env_opt("DEALS_OVERRIDES").map(PathBuf::from),
        };
        Ok(cfg)
    }

    /// Checks that must pass before any network work starts.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.partner_tag.trim().is_empty() {
            return Err(ConfigError::MissingPartnerTag);
        }
        if self.use_paapi && self.credentials.is_none() {
            return Err(ConfigError::MissingCredentials);
        }
        if self.workers == 0 {
            return Err(ConfigError::MustBePositive {
                key: "DEALS_WORKERS",
            });
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::MustBePositive {
                key: "DEALS_MAX_RETRIES",
            });
        }
        if self.display.price_buckets == 0 {
            return Err(ConfigError::MustBePositive {
                key: "DEALS_PRICE_BUCKETS",
            });
        }
        Ok(())
    }
}
