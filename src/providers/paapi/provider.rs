use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

use super::signer::{SignableRequest, SigV4Signer};
use crate::config::{Credentials, Marketplace};
use crate::errors::{retry_after_from, FetchError};
use crate::model::{PriceObservation, ProductIdentifier, Tier};
use crate::providers::fetcher::PriceSource;

const SERVICE: &str = "ProductAdvertisingAPI";
const PATH: &str = "/paapi5/getitems";
const TARGET: &str = "com.amazon.paapi5.v1.ProductAdvertisingAPIv1.GetItems";
const RESOURCES: &[&str] = &[
    "ItemInfo.Title",
    "Offers.Listings.Price",
    "Offers.Listings.SavingBasis",
    "Images.Primary.Large",
];

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct GetItemsResponse {
    items_result: Option<ItemsResult>,
    #[serde(default)]
    errors: Vec<ApiError>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ItemsResult {
    #[serde(default)]
    items: Vec<Item>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ApiError {
    code: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Item {
    #[serde(rename = "ASIN")]
    asin: Option<String>,
    item_info: Option<ItemInfo>,
    offers: Option<Offers>,
    images: Option<Images>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ItemInfo {
    title: Option<DisplayValue>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DisplayValue {
    display_value: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Offers {
    #[serde(default)]
    listings: Vec<Listing>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Listing {
    price: Option<Money>,
    saving_basis: Option<Money>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Money {
    amount: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Images {
    primary: Option<ImageSet>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ImageSet {
    large: Option<ImageRef>,
    medium: Option<ImageRef>,
    small: Option<ImageRef>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ImageRef {
    #[serde(rename = "URL")]
    url: Option<String>,
}

/// Signed `GetItems` lookups for one marketplace.
pub struct PaApiProvider {
    client: Client,
    credentials: Credentials,
    partner_tag: String,
    marketplace: Marketplace,
    endpoint: String,
}

impl PaApiProvider {
    pub fn new(
        credentials: Credentials,
        partner_tag: String,
        marketplace: Marketplace,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder().timeout(timeout).gzip(true).build()?;
        Ok(Self::from_client(client, credentials, partner_tag, marketplace))
    }

    fn from_client(
        client: Client,
        credentials: Credentials,
        partner_tag: String,
        marketplace: Marketplace,
    ) -> Self {
        let endpoint = format!("https://{}{PATH}", marketplace.paapi_host());
        Self {
            client,
            credentials,
            partner_tag,
            marketplace,
            endpoint,
        }
    }

    /// Send requests somewhere other than the marketplace host. The signature
    /// still covers the marketplace host.
    #[cfg(test)]
    fn at_endpoint(self, endpoint: String) -> Self {
        Self { endpoint, ..self }
    }

    fn request_body(&self, asin: &ProductIdentifier) -> String {
        json!({
            "ItemIds": [asin.as_str()],
            "PartnerTag": self.partner_tag,
            "PartnerType": "Associates",
            "Marketplace": self.marketplace.marketplace_name(),
            "Resources": RESOURCES,
        })
        .to_string()
    }
}

#[async_trait]
impl PriceSource for PaApiProvider {
    fn tier(&self) -> Tier {
        Tier::Api
    }

    async fn fetch(&self, asin: &ProductIdentifier) -> Result<Option<PriceObservation>, FetchError> {
        let host = self.marketplace.paapi_host();
        let body = self.request_body(asin);

        let mut headers = BTreeMap::new();
        headers.insert("content-encoding".to_string(), "amz-1.0".to_string());
        headers.insert(
            "content-type".to_string(),
            "application/json; charset=utf-8".to_string(),
        );
        headers.insert("host".to_string(), host.to_string());
        headers.insert("x-amz-target".to_string(), TARGET.to_string());

        let signer = SigV4Signer {
            access_key: &self.credentials.access_key,
            secret_key: &self.credentials.secret_key,
            region: self.marketplace.paapi_region(),
            service: SERVICE,
        };
        let request = SignableRequest {
            method: "POST",
            path: PATH,
            query: "",
            headers,
            payload: &body,
        };
        let now = Utc::now();
        let signature = signer
            .sign(&request, now)
            .map_err(|e| FetchError::Rejected(e.to_string()))?;

        let mut builder = self.client.post(&self.endpoint);
        for (name, value) in &request.headers {
            if name != "host" {
                builder = builder.header(name.as_str(), value.as_str());
            }
        }
        let resp = builder
            .header("x-amz-date", &signature.amz_date)
            .header("authorization", &signature.authorization)
            .body(body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let retry_after = retry_after_from(resp.headers());
            return Err(FetchError::from_status(status, retry_after, "paapi GetItems"));
        }

        let payload: GetItemsResponse = resp
            .json()
            .await
            .map_err(|e| FetchError::Transient(format!("paapi body: {e}")))?;
        Ok(observation_from_response(asin, payload, now))
    }
}

/// Read the first item's first listing. `None` means the API answered but
/// had nothing usable, which sends the mention on to the next tier.
pub(crate) fn observation_from_response(
    asin: &ProductIdentifier,
    payload: GetItemsResponse,
    observed_at: DateTime<Utc>,
) -> Option<PriceObservation> {
    for err in &payload.errors {
        debug!(
            asin = %asin,
            code = err.code.as_deref().unwrap_or("?"),
            message = err.message.as_deref().unwrap_or(""),
            "paapi reported error"
        );
    }

    let item = payload.items_result?.items.into_iter().next()?;
    if let Some(returned) = item.asin.as_deref() {
        if !returned.eq_ignore_ascii_case(asin.as_str()) {
            debug!(asin = %asin, returned, "paapi returned a different item");
            return None;
        }
    }

    let listing = item.offers.and_then(|o| o.listings.into_iter().next());
    let current_price = listing
        .as_ref()
        .and_then(|l| l.price.as_ref())
        .and_then(|m| m.amount)
        .filter(|p| p.is_finite() && *p > 0.0)?;
    let list_price = listing
        .as_ref()
        .and_then(|l| l.saving_basis.as_ref())
        .and_then(|m| m.amount);

    let title = item
        .item_info
        .and_then(|i| i.title)
        .and_then(|t| t.display_value)
        .filter(|t| !t.trim().is_empty());
    let image_url = item
        .images
        .and_then(|i| i.primary)
        .and_then(|set| {
            [set.large, set.medium, set.small]
                .into_iter()
                .flatten()
                .find_map(|img| img.url)
        })
        .filter(|u| !u.trim().is_empty());

    Some(PriceObservation {
        identifier: asin.clone(),
        tier: Tier::Api,
        current_price,
        list_price,
        title,
        image_url,
        observed_at,
    })
}
