use reqwest::StatusCode;
use std::time::Duration;
use thiserror::Error;

/// A short link could not be turned into a product identifier.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolutionError {
    #[error("invalid link {0:?}")]
    InvalidUrl(String),
    #[error("more than {max} redirects while resolving {link}")]
    TooManyRedirects { link: String, max: u8 },
    #[error("terminal host {host:?} is not a recognised storefront")]
    UnrecognizedHost { host: String },
    #[error("no product identifier in {0}")]
    NoIdentifier(String),
    #[error("network error resolving {link}: {message}")]
    Network { link: String, message: String },
}

/// One failed attempt against a pricing tier.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum FetchError {
    /// Transport failure, timeout, 5xx or a bot-check page. Retried with backoff.
    #[error("transient failure: {0}")]
    Transient(String),
    /// Upstream throttling. Pauses the tier, then retries.
    #[error("rate limited (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },
    /// Non-retryable rejection (auth, bad request, not found).
    #[error("request rejected: {0}")]
    Rejected(String),
}

impl FetchError {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, FetchError::Rejected(_))
    }

    /// Classify a non-success HTTP status.
    pub fn from_status(status: StatusCode, retry_after: Option<Duration>, context: &str) -> Self {
        if status == StatusCode::TOO_MANY_REQUESTS {
            FetchError::RateLimited { retry_after }
        } else if status.is_server_error() || status == StatusCode::REQUEST_TIMEOUT {
            FetchError::Transient(format!("{context}: {status}"))
        } else {
            FetchError::Rejected(format!("{context}: {status}"))
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_builder() {
            FetchError::Rejected(err.to_string())
        } else if err.is_timeout() {
            FetchError::Transient(format!("timed out: {err}"))
        } else {
            FetchError::Transient(err.to_string())
        }
    }
}

/// A record failed the integrity checks on its way into deduplication.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ValidationError {
    #[error("invalid product identifier {0:?}")]
    InvalidIdentifier(String),
    #[error("observation for {found} does not match resolved identifier {expected}")]
    IdentifierMismatch { expected: String, found: String },
    #[error("non-positive price {price} for {asin}")]
    NonPositivePrice { asin: String, price: f64 },
    #[error("non-finite price for {asin}")]
    NonFinitePrice { asin: String },
}

/// Unrecoverable setup problems. These abort the run with a non-zero exit.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("AMZ_PARTNER_TAG must be set")]
    MissingPartnerTag,
    #[error("AMZ_ACCESS_KEY and AMZ_SECRET_KEY must be set (or run with --no-paapi)")]
    MissingCredentials,
    #[error("unsupported marketplace {0:?} (expected CA, US or UK)")]
    UnknownMarketplace(String),
    #[error("{key} must be greater than zero")]
    MustBePositive { key: &'static str },
}

/// Parse a `Retry-After` header given in seconds.
pub fn retry_after_from(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}
