//! Integrity guard: the only gate between fetched data and the rest of the
//! pipeline. Anything that is not backed by a real, positive, observed price
//! is dropped here, logged, and counted exactly once.

use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, warn};

use crate::errors::{ResolutionError, ValidationError};
use crate::model::{PriceObservation, ProductIdentifier, RawMention, Tier};
use crate::providers::fetcher::FetchOutcome;

/// What happened to one mention during resolution and fetching.
#[derive(Debug, Clone)]
pub struct MentionOutcome {
    /// Position in the input file. Used for deterministic tie-breaking.
    pub index: usize,
    pub mention: RawMention,
    pub result: MentionResult,
}

#[derive(Debug, Clone)]
pub enum MentionResult {
    ResolutionFailed(ResolutionError),
    Fetched {
        identifier: ProductIdentifier,
        outcome: FetchOutcome,
    },
    /// The run deadline expired first.
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SkipReason {
    ResolutionFailed,
    NoTierSucceeded,
    NonPositivePrice,
    InvalidObservation,
    Cancelled,
}

impl SkipReason {
    pub fn as_str(self) -> &'static str {
        match self {
            SkipReason::ResolutionFailed => "resolution failed",
            SkipReason::NoTierSucceeded => "no tier succeeded",
            SkipReason::NonPositivePrice => "zero/negative price",
            SkipReason::InvalidObservation => "invalid observation",
            SkipReason::Cancelled => "cancelled at deadline",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An observation that passed every integrity check, together with the
/// mention it came from. Only [`admit`] can build one.
#[derive(Debug, Clone)]
pub struct VerifiedObservation {
    index: usize,
    mention: RawMention,
    observation: PriceObservation,
}

impl VerifiedObservation {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn mention(&self) -> &RawMention {
        &self.mention
    }

    pub fn observation(&self) -> &PriceObservation {
        &self.observation
    }

    pub fn identifier(&self) -> &ProductIdentifier {
        &self.observation.identifier
    }

    pub fn tier(&self) -> Tier {
        self.observation.tier
    }

    pub fn into_parts(self) -> (usize, RawMention, PriceObservation) {
        (self.index, self.mention, self.observation)
    }
}

/// Counters reported at the end of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub mentions: usize,
    pub api_sourced: usize,
    pub scraped_sourced: usize,
    pub skipped: BTreeMap<SkipReason, usize>,
    pub duplicates_merged: usize,
    pub below_min_discount: usize,
    pub over_cap: usize,
    pub deals_written: usize,
}

impl RunSummary {
    pub fn record_skip(&mut self, reason: SkipReason) {
        *self.skipped.entry(reason).or_insert(0) += 1;
    }

    pub fn skipped_total(&self) -> usize {
        self.skipped.values().sum()
    }

    pub fn skipped_for(&self, reason: SkipReason) -> usize {
        self.skipped.get(&reason).copied().unwrap_or(0)
    }

    pub fn cancelled(&self) -> usize {
        self.skipped_for(SkipReason::Cancelled)
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "mentions:          {}", self.mentions)?;
        writeln!(f, "api sourced:       {}", self.api_sourced)?;
        writeln!(f, "scraped sourced:   {}", self.scraped_sourced)?;
        writeln!(f, "skipped:           {}", self.skipped_total())?;
        for (reason, count) in &self.skipped {
            writeln!(f, "  {reason}: {count}")?;
        }
        writeln!(f, "cancelled:         {}", self.cancelled())?;
        writeln!(f, "duplicates merged: {}", self.duplicates_merged)?;
        if self.below_min_discount > 0 {
            writeln!(f, "below min discount: {}", self.below_min_discount)?;
        }
        if self.over_cap > 0 {
            writeln!(f, "over cap:          {}", self.over_cap)?;
        }
        write!(f, "deals written:     {}", self.deals_written)
    }
}

fn validate(
    expected: &ProductIdentifier,
    mut obs: PriceObservation,
) -> Result<PriceObservation, (SkipReason, ValidationError)> {
    if &obs.identifier != expected {
        return Err((
            SkipReason::InvalidObservation,
            ValidationError::IdentifierMismatch {
                expected: expected.to_string(),
                found: obs.identifier.to_string(),
            },
        ));
    }
    if !obs.current_price.is_finite() {
        return Err((
            SkipReason::InvalidObservation,
            ValidationError::NonFinitePrice {
                asin: expected.to_string(),
            },
        ));
    }
    if obs.current_price <= 0.0 {
        return Err((
            SkipReason::NonPositivePrice,
            ValidationError::NonPositivePrice {
                asin: expected.to_string(),
                price: obs.current_price,
            },
        ));
    }

    if let Some(list) = obs.list_price {
        if !list.is_finite() || list <= 0.0 {
            debug!(asin = %expected, list_price = list, "stripping invalid list price");
            obs.list_price = None;
        }
    }
    obs.title = obs.title.filter(|t| !t.trim().is_empty());
    obs.image_url = obs.image_url.filter(|u| !u.trim().is_empty());
    Ok(obs)
}

/// Admit a verified observation or record exactly one skip.
pub fn admit(outcome: MentionOutcome, summary: &mut RunSummary) -> Option<VerifiedObservation> {
    let MentionOutcome {
        index,
        mention,
        result,
    } = outcome;

    let (identifier, outcome) = match result {
        MentionResult::ResolutionFailed(err) => {
            warn!(link = %mention.short_link, reason = %SkipReason::ResolutionFailed, error = %err, "skipping mention");
            summary.record_skip(SkipReason::ResolutionFailed);
            return None;
        }
        MentionResult::Cancelled => {
            warn!(link = %mention.short_link, reason = %SkipReason::Cancelled, "skipping mention");
            summary.record_skip(SkipReason::Cancelled);
            return None;
        }
        MentionResult::Fetched {
            identifier,
            outcome,
        } => (identifier, outcome),
    };

    let obs = match outcome {
        FetchOutcome::Resolved(obs) => obs,
        FetchOutcome::Unresolved { failures } => {
            let detail = failures
                .iter()
                .map(|f| format!("{}: {}", f.tier, f.reason))
                .collect::<Vec<_>>()
                .join("; ");
            warn!(asin = %identifier, reason = %SkipReason::NoTierSucceeded, failures = %detail, "skipping mention");
            summary.record_skip(SkipReason::NoTierSucceeded);
            return None;
        }
    };

    match validate(&identifier, obs) {
        Ok(observation) => {
            match observation.tier {
                Tier::Api => summary.api_sourced += 1,
                Tier::Scraped => summary.scraped_sourced += 1,
            }
            Some(VerifiedObservation {
                index,
                mention,
                observation,
            })
        }
        Err((reason, err)) => {
            warn!(asin = %identifier, reason = %reason, error = %err, "skipping mention");
            summary.record_skip(reason);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::fetcher::fakes::observation;
    use crate::providers::fetcher::TierFailure;

    fn mention() -> RawMention {
        RawMention {
            source_url: String::new(),
            short_link: "https://amzn.to/x".into(),
            post_title: "Post".into(),
            category: String::new(),
            observed_at: None,
            post_image_url: None,
        }
    }

    fn fetched(asin: &str, outcome: FetchOutcome) -> MentionOutcome {
        MentionOutcome {
            index: 0,
            mention: mention(),
            result: MentionResult::Fetched {
                identifier: ProductIdentifier::parse(asin).unwrap(),
                outcome,
            },
        }
    }

    #[test]
    fn resolved_positive_price_passes() {
        let mut summary = RunSummary::default();
        let obs = observation("B000000001", Tier::Api, 49.99, Some(99.99), Some("Kettle"));
        let verified = admit(fetched("B000000001", FetchOutcome::Resolved(obs)), &mut summary).unwrap();
        assert_eq!(verified.tier(), Tier::Api);
        assert_eq!(verified.observation().list_price, Some(99.99));
        assert_eq!(summary.api_sourced, 1);
        assert_eq!(summary.skipped_total(), 0);
    }

    #[test]
    fn every_drop_counts_once() {
        let mut summary = RunSummary::default();

        let zero = observation("B000000001", Tier::Scraped, 0.0, None, None);
        assert!(admit(fetched("B000000001", FetchOutcome::Resolved(zero)), &mut summary).is_none());

        let nan = observation("B000000001", Tier::Scraped, f64::NAN, None, None);
        assert!(admit(fetched("B000000001", FetchOutcome::Resolved(nan)), &mut summary).is_none());

        let other = observation("B000000002", Tier::Api, 10.0, None, None);
        assert!(admit(fetched("B000000001", FetchOutcome::Resolved(other)), &mut summary).is_none());

        let unresolved = FetchOutcome::Unresolved {
            failures: vec![TierFailure {
                tier: Tier::Scraped,
                reason: "no usable price".into(),
            }],
        };
        assert!(admit(fetched("X123", unresolved), &mut summary).is_none());

        let failed = MentionOutcome {
            index: 1,
            mention: mention(),
            result: MentionResult::ResolutionFailed(ResolutionError::NoIdentifier("u".into())),
        };
        assert!(admit(failed, &mut summary).is_none());

        let cancelled = MentionOutcome {
            index: 2,
            mention: mention(),
            result: MentionResult::Cancelled,
        };
        assert!(admit(cancelled, &mut summary).is_none());

        assert_eq!(summary.skipped_total(), 6);
        assert_eq!(summary.skipped_for(SkipReason::NonPositivePrice), 1);
        assert_eq!(summary.skipped_for(SkipReason::InvalidObservation), 2);
        assert_eq!(summary.skipped_for(SkipReason::NoTierSucceeded), 1);
        assert_eq!(summary.skipped_for(SkipReason::ResolutionFailed), 1);
        assert_eq!(summary.cancelled(), 1);
        assert_eq!(summary.api_sourced + summary.scraped_sourced, 0);
    }

    #[test]
    fn invalid_list_price_is_stripped_not_replaced() {
        let mut summary = RunSummary::default();
        let obs = observation("B000000001", Tier::Scraped, 29.99, Some(-5.0), Some("  "));
        let verified = admit(fetched("B000000001", FetchOutcome::Resolved(obs)), &mut summary).unwrap();
        assert_eq!(verified.observation().list_price, None);
        assert_eq!(verified.observation().title, None);
        assert_eq!(verified.observation().current_price, 29.99);
    }

    #[test]
    fn summary_renders_reasons() {
        let mut summary = RunSummary {
            mentions: 3,
            deals_written: 1,
            ..RunSummary::default()
        };
        summary.record_skip(SkipReason::NoTierSucceeded);
        let text = summary.to_string();
        assert!(text.contains("no tier succeeded: 1"));
        assert!(text.ends_with("deals written:     1"));
    }
}
