//! Mention → deal pipeline: resolve and fetch in a bounded pool, then guard,
//! deduplicate, enrich, assign display hints and write.

pub mod dedupe;
pub mod display;
pub mod enrich;
pub mod guard;
pub mod writer;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::OnceCell;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};

use crate::config::PipelineConfig;
use crate::errors::ConfigError;
use crate::model::{Deal, DealRecord, ProductIdentifier, RawMention};
use crate::providers::paapi::PaApiProvider;
use crate::providers::scrape::ScrapeProvider;
use crate::providers::{FetchOutcome, LinkResolve, LinkResolver, TieredPriceFetcher};
use display::{DisplayConfig, VisibilityOverrides};
use enrich::EnrichContext;
use guard::{MentionOutcome, MentionResult, RunSummary};

/// Run-level knobs, split out of [`PipelineConfig`] so tests can build them directly.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub workers: usize,
    pub run_deadline: Duration,
    pub storefront: String,
    pub partner_tag: String,
    pub display: DisplayConfig,
    pub max_deals: usize,
    pub min_discount: u8,
}

impl RunSettings {
    pub fn from_config(cfg: &PipelineConfig) -> Self {
        Self {
            workers: cfg.workers,
            run_deadline: cfg.run_deadline,
            storefront: cfg.marketplace.storefront().to_string(),
            partner_tag: cfg.partner_tag.clone(),
            display: cfg.display.clone(),
            max_deals: cfg.max_deals,
            min_discount: cfg.min_discount,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunOutput {
    pub records: Vec<DealRecord>,
    pub summary: RunSummary,
}

/// One tier lookup per identifier per run; later mentions of the same
/// product share the first lookup's outcome.
#[derive(Default)]
struct OutcomeCache {
    cells: Mutex<BTreeMap<ProductIdentifier, Arc<OnceCell<FetchOutcome>>>>,
}

impl OutcomeCache {
    fn cell(&self, id: &ProductIdentifier) -> Arc<OnceCell<FetchOutcome>> {
        let mut cells = self.cells.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(cells.entry(id.clone()).or_default())
    }

    fn len(&self) -> usize {
        self.cells.lock().map(|c| c.len()).unwrap_or_default()
    }
}

pub struct Pipeline {
    resolver: Arc<dyn LinkResolve>,
    fetcher: TieredPriceFetcher,
    settings: RunSettings,
    overrides: VisibilityOverrides,
}

impl Pipeline {
    pub fn new(
        resolver: Arc<dyn LinkResolve>,
        fetcher: TieredPriceFetcher,
        settings: RunSettings,
        overrides: VisibilityOverrides,
    ) -> Self {
        Self {
            resolver,
            fetcher,
            settings,
            overrides,
        }
    }

    /// Wire the live resolver and tiers. Expects a validated config.
    pub async fn from_config(cfg: &PipelineConfig) -> Result<Self> {
        let resolver = LinkResolver::new(cfg.resolve_timeout, cfg.max_redirect_hops)
            .context("building resolver client")?;

        let mut fetcher = TieredPriceFetcher::new(cfg.retry.clone());
        if cfg.use_paapi {
            let credentials = cfg
                .credentials
                .clone()
                .ok_or(ConfigError::MissingCredentials)?;
            let api = PaApiProvider::new(
                credentials,
                cfg.partner_tag.clone(),
                cfg.marketplace,
                cfg.paapi_timeout,
            )
            .context("building PA-API client")?;
            fetcher = fetcher.with_api(Arc::new(api), cfg.paapi_min_interval);
        } else {
            info!("PA-API tier disabled");
        }
        let scrape = ScrapeProvider::new(cfg.marketplace.storefront(), cfg.scrape_timeout)
            .context("building scrape client")?;
        fetcher = fetcher.with_scrape(Arc::new(scrape), cfg.scrape_min_interval);

        let overrides = match &cfg.overrides_path {
            Some(path) => VisibilityOverrides::load(path).await?,
            None => VisibilityOverrides::default(),
        };
        if !overrides.is_empty() {
            info!(count = overrides.len(), "loaded visibility overrides");
        }

        Ok(Self::new(
            Arc::new(resolver),
            fetcher,
            RunSettings::from_config(cfg),
            overrides,
        ))
    }

    async fn process(
        &self,
        cache: &OutcomeCache,
        index: usize,
        mention: RawMention,
    ) -> MentionOutcome {
        let result = match self.resolver.resolve(&mention.short_link).await {
            Err(err) => MentionResult::ResolutionFailed(err),
            Ok(identifier) => {
                let cell = cache.cell(&identifier);
                let outcome = cell
                    .get_or_init(|| self.fetcher.fetch(&identifier))
                    .await
                    .clone();
                MentionResult::Fetched {
                    identifier,
                    outcome,
                }
            }
        };
        MentionOutcome {
            index,
            mention,
            result,
        }
    }

    /// Fetch every mention under the run deadline. Mentions still in flight
    /// or never started when it expires come back as `Cancelled`.
    async fn fetch_all(&self, mentions: Vec<RawMention>) -> Vec<MentionOutcome> {
        let deadline = Instant::now() + self.settings.run_deadline;
        let mut finished = vec![false; mentions.len()];
        let mut outcomes = Vec::with_capacity(mentions.len());
        let cache = OutcomeCache::default();

        {
            let mut pending = stream::iter(mentions.iter().cloned().enumerate())
                .map(|(index, mention)| self.process(&cache, index, mention))
                .buffer_unordered(self.settings.workers.max(1));

            loop {
                match timeout_at(deadline, pending.next()).await {
                    Ok(Some(outcome)) => {
                        finished[outcome.index] = true;
                        outcomes.push(outcome);
                    }
                    Ok(None) => break,
                    Err(_) => {
                        warn!(
                            completed = outcomes.len(),
                            total = mentions.len(),
                            "run deadline reached; cancelling outstanding mentions"
                        );
                        break;
                    }
                }
            }
        }

        debug!(identifiers = cache.len(), "distinct products looked up");
        for (index, mention) in mentions.into_iter().enumerate() {
            if !finished[index] {
                outcomes.push(MentionOutcome {
                    index,
                    mention,
                    result: MentionResult::Cancelled,
                });
            }
        }
        outcomes.sort_by_key(|o| o.index);
        outcomes
    }

    /// Everything except the write. `fallback_dates` supplies `dateAdded` for
    /// products whose mentions carried no timestamp; `run_started` is the last resort.
    pub async fn collect(
        &self,
        mentions: Vec<RawMention>,
        fallback_dates: &BTreeMap<String, DateTime<Utc>>,
        run_started: DateTime<Utc>,
    ) -> RunOutput {
        let mut summary = RunSummary {
            mentions: mentions.len(),
            ..RunSummary::default()
        };
        info!(
            mentions = mentions.len(),
            workers = self.settings.workers,
            api_tier = self.fetcher.has_api(),
            "starting run"
        );

        let outcomes = self.fetch_all(mentions).await;

        // Barrier: everything below sees the complete set.
        let verified: Vec<_> = outcomes
            .into_iter()
            .filter_map(|o| guard::admit(o, &mut summary))
            .collect();
        let products = dedupe::deduplicate(verified);
        summary.duplicates_merged = products.iter().map(|p| p.merged).sum();

        let deals: Vec<Deal> = products
            .into_iter()
            .map(|product| {
                let id = Deal::id_for(product.identifier());
                let ctx = EnrichContext {
                    storefront: &self.settings.storefront,
                    partner_tag: &self.settings.partner_tag,
                    fallback_date: fallback_dates.get(&id).copied().unwrap_or(run_started),
                };
                enrich::enrich(product, &ctx)
            })
            .collect();

        let (deals, limits) =
            display::apply_limits(deals, self.settings.min_discount, self.settings.max_deals);
        summary.below_min_discount = limits.below_min_discount;
        summary.over_cap = limits.over_cap;
        if limits.over_cap > 0 {
            debug!(dropped = limits.over_cap, cap = self.settings.max_deals, "capped deal count");
        }

        let records = display::assign_display(deals, &self.settings.display, &self.overrides);
        summary.deals_written = records.len();
        RunOutput { records, summary }
    }

    /// Full run: collect, then atomically replace `output`.
    pub async fn run(&self, mentions: Vec<RawMention>, output: &Path) -> Result<RunSummary> {
        let previous = writer::previous_dates(output).await;
        let out = self.collect(mentions, &previous, Utc::now()).await;
        writer::write_deals(output, &out.records).await?;

        let s = &out.summary;
        info!(
            mentions = s.mentions,
            api = s.api_sourced,
            scraped = s.scraped_sourced,
            skipped = s.skipped_total(),
            cancelled = s.cancelled(),
            merged = s.duplicates_merged,
            written = s.deals_written,
            "run complete"
        );
        Ok(out.summary)
    }
}
