use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use rand::seq::SliceRandom;
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Client, StatusCode};
use scraper::{ElementRef, Html, Selector};
use std::time::Duration;
use tracing::{debug, trace};

use super::selectors;
use crate::errors::{retry_after_from, FetchError};
use crate::model::{PriceObservation, ProductIdentifier, Tier};
use crate::normalization::price::parse_price_text;
use crate::normalization::text::non_empty_clean;
use crate::providers::fetcher::PriceSource;

const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
];

const ACCEPT_LANGUAGES: &[&str] = &[
    "en-US,en;q=0.9",
    "en-US,en;q=0.9,fr;q=0.8",
    "en-CA,en;q=0.9,fr;q=0.8",
    "en-US,en;q=0.8",
];

/// What a product page yielded. Every field comes from a matched element.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProductPage {
    pub blocked: bool,
    pub current_price: Option<f64>,
    pub list_price: Option<f64>,
    pub title: Option<String>,
    pub image_url: Option<String>,
}

fn element_text(el: ElementRef<'_>) -> String {
    el.text().collect::<String>()
}

fn first_price(doc: &Html, candidates: &[Selector]) -> Option<f64> {
    candidates.iter().find_map(|sel| {
        doc.select(sel)
            .find_map(|el| parse_price_text(&element_text(el)))
    })
}

/// Extract structured fields from a product page. Synchronous so the parsed
/// document never lives across an await point.
pub fn parse_product_page(html: &str) -> ProductPage {
    let doc = Html::parse_document(html);

    let lowered = html.to_ascii_lowercase();
    let blocked = doc.select(&selectors::CAPTCHA_FORM).next().is_some()
        || selectors::CAPTCHA_PHRASES.iter().any(|p| lowered.contains(p));
    if blocked {
        return ProductPage {
            blocked,
            ..ProductPage::default()
        };
    }

    let title = doc
        .select(&selectors::TITLE)
        .next()
        .and_then(|el| non_empty_clean(Some(&element_text(el))));

    let image_url = selectors::IMAGE.iter().find_map(|sel| {
        let el = doc.select(sel).next()?;
        selectors::IMAGE_ATTRS.iter().find_map(|attr| {
            el.value()
                .attr(attr)
                .map(str::trim)
                .filter(|v| v.starts_with("http"))
                .map(str::to_string)
        })
    });

    ProductPage {
        blocked,
        current_price: first_price(&doc, &selectors::CURRENT_PRICE),
        list_price: first_price(&doc, &selectors::LIST_PRICE),
        title,
        image_url,
    }
}

fn browser_headers() -> HeaderMap {
    let mut rng = rand::thread_rng();
    let ua = USER_AGENTS.choose(&mut rng).copied().unwrap_or(USER_AGENTS[0]);
    let lang = ACCEPT_LANGUAGES
        .choose(&mut rng)
        .copied()
        .unwrap_or(ACCEPT_LANGUAGES[0]);

    let mut headers = HeaderMap::new();
    headers.insert(header::USER_AGENT, HeaderValue::from_static(ua));
    headers.insert(header::ACCEPT_LANGUAGE, HeaderValue::from_static(lang));
    headers.insert(
        header::ACCEPT,
        HeaderValue::from_static(
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,image/apng,*/*;q=0.8",
        ),
    );
    headers.insert(header::UPGRADE_INSECURE_REQUESTS, HeaderValue::from_static("1"));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("max-age=0"));
    headers.insert("sec-fetch-dest", HeaderValue::from_static("document"));
    headers.insert("sec-fetch-mode", HeaderValue::from_static("navigate"));
    headers.insert("sec-fetch-site", HeaderValue::from_static("none"));
    headers.insert("sec-fetch-user", HeaderValue::from_static("?1"));
    headers
}

/// Fetches `<storefront>/dp/<asin>` with a browser-like header set.
pub struct ScrapeProvider {
    client: Client,
    storefront: String,
}

impl ScrapeProvider {
    pub fn new(storefront: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .gzip(true)
            .brotli(true)
            .build()?;
        Ok(Self::from_client(client, storefront))
    }

    fn from_client(client: Client, storefront: &str) -> Self {
        Self {
            client,
            storefront: storefront.trim_end_matches('/').to_string(),
        }
    }

    pub fn product_url(&self, asin: &ProductIdentifier) -> String {
        format!("{}/dp/{}", self.storefront, asin.as_str())
    }
}

#[async_trait]
impl PriceSource for ScrapeProvider {
    fn tier(&self) -> Tier {
        Tier::Scraped
    }

    async fn fetch(&self, asin: &ProductIdentifier) -> Result<Option<PriceObservation>, FetchError> {
        let url = self.product_url(asin);
        let resp = self
            .client
            .get(&url)
            .headers(browser_headers())
            .send()
            .await?;

        let status = resp.status();
        // The storefront answers throttled scrapers with 503 as often as 429.
        if status == StatusCode::SERVICE_UNAVAILABLE || status == StatusCode::TOO_MANY_REQUESTS {
            return Err(FetchError::RateLimited {
                retry_after: retry_after_from(resp.headers()),
            });
        }
        if !status.is_success() {
            let retry_after = retry_after_from(resp.headers());
            return Err(FetchError::from_status(status, retry_after, "product page"));
        }

        let body = resp.text().await?;
        let page = parse_product_page(&body);
        if page.blocked {
            debug!(asin = %asin, "bot check page served");
            return Err(FetchError::Transient("robot check page".into()));
        }
        trace!(asin = %asin, ?page, "parsed product page");

        let Some(current_price) = page.current_price else {
            debug!(asin = %asin, "no price element on product page");
            return Ok(None);
        };
        Ok(Some(PriceObservation {
            identifier: asin.clone(),
            tier: Tier::Scraped,
            current_price,
            list_price: page.list_price,
            title: page.title,
            image_url: page.image_url,
            observed_at: Utc::now(),
        }))
    }
}
