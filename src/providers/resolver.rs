//! Affiliate short-link resolution by bounded manual redirect following.

use async_trait::async_trait;
use regex::Regex;
use reqwest::{header, redirect, Client};
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{debug, trace};
use url::Url;

use crate::errors::ResolutionError;
use crate::model::ProductIdentifier;

static PRODUCT_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)/(?:dp|gp/product)/([a-z0-9]{10})(?:[/?#]|$)").expect("static regex")
});

/// Public suffixes the storefront operates under.
const STOREFRONT_TLDS: &[&str] = &[
    "ca", "com", "co.uk", "de", "fr", "it", "es", "nl", "se", "pl", "in", "sg", "ae", "sa",
    "co.jp", "com.au", "com.mx", "com.br", "com.tr", "com.be",
];

const RESOLVER_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

/// Anything that can turn a short link into a product identifier.
#[async_trait]
pub trait LinkResolve: Send + Sync {
    async fn resolve(&self, link: &str) -> Result<ProductIdentifier, ResolutionError>;
}

/// `amazon.<tld>` or any subdomain of it.
pub fn is_storefront_host(host: &str) -> bool {
    let host = host.trim_end_matches('.').to_ascii_lowercase();
    STOREFRONT_TLDS.iter().any(|tld| {
        let apex = format!("amazon.{tld}");
        host == apex || host.ends_with(&format!(".{apex}"))
    })
}

/// Identifier from a `/dp/<id>` or `/gp/product/<id>` path.
pub fn extract_identifier(url: &Url) -> Option<ProductIdentifier> {
    let caps = PRODUCT_PATH.captures(url.path())?;
    ProductIdentifier::parse(caps.get(1)?.as_str()).ok()
}

/// Follows redirects one hop at a time so the chain length and every
/// intermediate host can be checked.
pub struct LinkResolver {
    client: Client,
    max_hops: u8,
}

impl LinkResolver {
    pub fn new(timeout: Duration, max_hops: u8) -> anyhow::Result<Self> {
        let client = Client::builder()
            .redirect(redirect::Policy::none())
            .timeout(timeout)
            .user_agent(RESOLVER_USER_AGENT)
            .build()?;
        Ok(Self { client, max_hops })
    }

    #[cfg(test)]
    fn with_client(client: Client, max_hops: u8) -> Self {
        Self { client, max_hops }
    }
}

#[async_trait]
impl LinkResolve for LinkResolver {
    async fn resolve(&self, link: &str) -> Result<ProductIdentifier, ResolutionError> {
        let mut current =
            Url::parse(link.trim()).map_err(|_| ResolutionError::InvalidUrl(link.to_string()))?;
        if !matches!(current.scheme(), "http" | "https") {
            return Err(ResolutionError::InvalidUrl(link.to_string()));
        }

        let mut hops: u8 = 0;
        loop {
            let on_storefront = current.host_str().is_some_and(is_storefront_host);
            if on_storefront {
                if let Some(id) = extract_identifier(&current) {
                    debug!(link, asin = %id, hops, "resolved short link");
                    return Ok(id);
                }
            }

            let resp = self
                .client
                .get(current.clone())
                .send()
                .await
                .map_err(|e| ResolutionError::Network {
                    link: link.to_string(),
                    message: e.to_string(),
                })?;

            let location = resp
                .status()
                .is_redirection()
                .then(|| resp.headers().get(header::LOCATION))
                .flatten()
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);

            let Some(location) = location else {
                break;
            };
            if hops >= self.max_hops {
                return Err(ResolutionError::TooManyRedirects {
                    link: link.to_string(),
                    max: self.max_hops,
                });
            }
            hops += 1;
            current = current
                .join(&location)
                .map_err(|_| ResolutionError::InvalidUrl(location.clone()))?;
            trace!(link, hop = hops, next = %current, "following redirect");
        }

        let host = current.host_str().unwrap_or_default().to_string();
        if !is_storefront_host(&host) {
            return Err(ResolutionError::UnrecognizedHost { host });
        }
        extract_identifier(&current).ok_or_else(|| ResolutionError::NoIdentifier(current.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::stub_server::{self, reply};

    /// `/hop/<n>` redirects to `/hop/<n+1>`, `/to-store` redirects to a
    /// storefront product URL, `/rel` issues a relative redirect, anything
    /// else answers 200.
    async fn spawn_redirect_server() -> String {
        stub_server::serve(|raw| {
            let path = stub_server::request_path(raw);
            if let Some(n) = path.strip_prefix("/hop/") {
                let next = format!("/hop/{}", n.parse::<u32>().unwrap_or(0) + 1);
                reply("302 Found", &[("Location", next.as_str())], "")
            } else if path == "/to-store" {
                reply(
                    "301 Moved Permanently",
                    &[("Location", "https://www.amazon.ca/Some-Product/dp/b08n5wrwnw?ref=x")],
                    "",
                )
            } else if path == "/rel" {
                reply("302 Found", &[("Location", "/to-store")], "")
            } else {
                reply("200 OK", &[], "ok")
            }
        })
        .await
    }

    fn resolver() -> LinkResolver {
        let client = stub_server::client_builder(Duration::from_secs(5))
            .redirect(redirect::Policy::none())
            .build()
            .unwrap();
        LinkResolver::with_client(client, 5)
    }

    #[test]
    fn storefront_hosts() {
        assert!(is_storefront_host("www.amazon.ca"));
        assert!(is_storefront_host("amazon.co.uk"));
        assert!(is_storefront_host("smile.amazon.com"));
        assert!(!is_storefront_host("amzn.to"));
        assert!(!is_storefront_host("amazon.ca.evil.example"));
        assert!(!is_storefront_host("notamazon.ca"));
    }

    #[test]
    fn identifier_extraction() {
        let dp = Url::parse("https://www.amazon.ca/Widget/dp/B08N5WRWNW/ref=sr_1").unwrap();
        assert_eq!(extract_identifier(&dp).unwrap().as_str(), "B08N5WRWNW");
        let gp = Url::parse("https://www.amazon.com/gp/product/b07xjd8l7z?th=1").unwrap();
        assert_eq!(extract_identifier(&gp).unwrap().as_str(), "B07XJD8L7Z");
        let none = Url::parse("https://www.amazon.ca/deals").unwrap();
        assert!(extract_identifier(&none).is_none());
        let long = Url::parse("https://www.amazon.ca/dp/B08N5WRWNWX").unwrap();
        assert!(extract_identifier(&long).is_none());
    }

    #[tokio::test]
    async fn storefront_url_resolves_without_network() {
        let id = resolver()
            .resolve("https://www.amazon.ca/dp/B08N5WRWNW")
            .await
            .unwrap();
        assert_eq!(id.as_str(), "B08N5WRWNW");
    }

    #[tokio::test]
    async fn rejects_malformed_links() {
        assert!(matches!(
            resolver().resolve("not a url").await,
            Err(ResolutionError::InvalidUrl(_))
        ));
        assert!(matches!(
            resolver().resolve("ftp://amzn.to/abc").await,
            Err(ResolutionError::InvalidUrl(_))
        ));
    }

    #[tokio::test]
    async fn follows_relative_and_absolute_redirects() {
        let base = spawn_redirect_server().await;
        let id = resolver().resolve(&format!("{base}/rel")).await.unwrap();
        assert_eq!(id.as_str(), "B08N5WRWNW");
    }

    #[tokio::test]
    async fn redirect_chain_is_bounded() {
        let base = spawn_redirect_server().await;
        let err = resolver().resolve(&format!("{base}/hop/0")).await.unwrap_err();
        assert_eq!(
            err,
            ResolutionError::TooManyRedirects {
                link: format!("{base}/hop/0"),
                max: 5
            }
        );
    }

    #[tokio::test]
    async fn terminal_non_storefront_host_is_rejected() {
        let base = spawn_redirect_server().await;
        let err = resolver().resolve(&format!("{base}/landing")).await.unwrap_err();
        assert_eq!(
            err,
            ResolutionError::UnrecognizedHost {
                host: "127.0.0.1".into()
            }
        );
    }
}
