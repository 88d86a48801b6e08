pub mod fetcher;
pub mod paapi;
pub mod resolver;
pub mod retry;
pub mod scrape;

#[cfg(test)]
pub(crate) mod stub_server;

pub use fetcher::{FetchOutcome, PriceSource, TierFailure, TieredPriceFetcher};
pub use resolver::{LinkResolve, LinkResolver};
