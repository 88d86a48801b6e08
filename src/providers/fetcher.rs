//! Tiered price lookup: structured API first, live page second, then give up.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::retry::{with_retry, RetryPolicy, TierThrottle};
use crate::errors::FetchError;
use crate::model::{PriceObservation, ProductIdentifier, Tier};

/// One pricing tier. `Ok(None)` means the source answered but had no usable
/// price; the fetcher moves on without retrying.
#[async_trait]
pub trait PriceSource: Send + Sync {
    fn tier(&self) -> Tier;

    async fn fetch(&self, asin: &ProductIdentifier) -> Result<Option<PriceObservation>, FetchError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct TierFailure {
    pub tier: Tier,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Resolved(PriceObservation),
    /// Neither tier produced a price. Not an error: the guard turns it into a skip.
    Unresolved { failures: Vec<TierFailure> },
}

/// Per-mention lookup progress.
#[derive(Debug)]
enum FetchState {
    Pending,
    TryingApi,
    TryingScrape,
    Done(FetchOutcome),
}

struct TierSlot {
    source: Arc<dyn PriceSource>,
    throttle: TierThrottle,
}

pub struct TieredPriceFetcher {
    api: Option<TierSlot>,
    scrape: Option<TierSlot>,
    policy: RetryPolicy,
}

impl TieredPriceFetcher {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            api: None,
            scrape: None,
            policy,
        }
    }

    pub fn with_api(mut self, source: Arc<dyn PriceSource>, min_interval: Duration) -> Self {
        self.api = Some(TierSlot {
            source,
            throttle: TierThrottle::new(Tier::Api, min_interval),
        });
        self
    }

    pub fn with_scrape(mut self, source: Arc<dyn PriceSource>, min_interval: Duration) -> Self {
        self.scrape = Some(TierSlot {
            source,
            throttle: TierThrottle::new(Tier::Scraped, min_interval),
        });
        self
    }

    pub fn has_api(&self) -> bool {
        self.api.is_some()
    }

    async fn try_tier(
        &self,
        slot: &TierSlot,
        asin: &ProductIdentifier,
    ) -> Result<PriceObservation, String> {
        let tier = slot.source.tier();
        let result = with_retry(&self.policy, &slot.throttle, asin, |_attempt| {
            slot.source.fetch(asin)
        })
        .await;
        match result {
            Ok(Some(obs)) => Ok(obs),
            Ok(None) => {
                debug!(asin = %asin, tier = %tier, "no usable price");
                Err("no usable price".to_string())
            }
            Err(err) => Err(err.to_string()),
        }
    }

    /// Walk the tiers in trust order until one yields an observation.
    pub async fn fetch(&self, asin: &ProductIdentifier) -> FetchOutcome {
        let mut failures: Vec<TierFailure> = Vec::new();
        let mut state = FetchState::Pending;
        loop {
            state = match state {
                FetchState::Pending => FetchState::TryingApi,
                FetchState::TryingApi => match &self.api {
                    None => FetchState::TryingScrape,
                    Some(slot) => match self.try_tier(slot, asin).await {
                        Ok(obs) => FetchState::Done(FetchOutcome::Resolved(obs)),
                        Err(reason) => {
                            failures.push(TierFailure {
                                tier: Tier::Api,
                                reason,
                            });
                            FetchState::TryingScrape
                        }
                    },
                },
                FetchState::TryingScrape => match &self.scrape {
                    None => FetchState::Done(FetchOutcome::Unresolved {
                        failures: std::mem::take(&mut failures),
                    }),
                    Some(slot) => match self.try_tier(slot, asin).await {
                        Ok(obs) => FetchState::Done(FetchOutcome::Resolved(obs)),
                        Err(reason) => {
                            failures.push(TierFailure {
                                tier: Tier::Scraped,
                                reason,
                            });
                            FetchState::Done(FetchOutcome::Unresolved {
                                failures: std::mem::take(&mut failures),
                            })
                        }
                    },
                },
                FetchState::Done(outcome) => {
                    if let FetchOutcome::Resolved(obs) = &outcome {
                        info!(asin = %asin, tier = %obs.tier, price = obs.current_price, "price resolved");
                    }
                    return outcome;
                }
            };
        }
    }
}
