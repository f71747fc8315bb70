use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::TtlCache;
use crate::clients::registry::TokenSource;
use crate::errors::{ErrorCode, TradeError};
use crate::models::{NetworkKey, TokenBinding};

/// Positive lookups live for five minutes.
const POSITIVE_TTL: Duration = Duration::from_secs(300);

/// Empty lookups are retried sooner.
const NEGATIVE_TTL: Duration = Duration::from_secs(60);

/// Resolves a token symbol to the chains it is deployed on.
///
/// Sources are consulted in priority order — the built-in registry, then the
/// external metadata registry, then the DEX listing index — union-merged and
/// de-duplicated by `(network, contract)`. Chains where the caller holds an
/// active wallet are ranked to the front without dropping the rest.
pub struct TokenResolver {
    known: Vec<TokenBinding>,
    sources: Vec<Arc<dyn TokenSource>>,
    cache: TtlCache<String, Vec<TokenBinding>>,
}

impl TokenResolver {
    pub fn new(known: Vec<TokenBinding>, sources: Vec<Arc<dyn TokenSource>>) -> Self {
        Self {
            known,
            sources,
            cache: TtlCache::new(POSITIVE_TTL),
        }
    }

    pub async fn resolve(
        &self,
        symbol: &str,
        active_networks: &[NetworkKey],
    ) -> Result<Vec<TokenBinding>, TradeError> {
        let key = symbol.to_uppercase();

        let bindings = self
            .cache
            .get_or_try_load(key.clone(), || self.load(key.clone()))
            .await?;

        if bindings.is_empty() {
            return Err(
                TradeError::new(ErrorCode::TokenNotFound, format!("no contract known for {symbol}"))
                    .with_symbol(symbol),
            );
        }

        Ok(rank(bindings, active_networks))
    }

    async fn load(
        &self,
        symbol: String,
    ) -> Result<(Vec<TokenBinding>, Option<Duration>), TradeError> {
        let mut merged: Vec<TokenBinding> = self
            .known
            .iter()
            .filter(|b| b.symbol.eq_ignore_ascii_case(&symbol))
            .cloned()
            .collect();

        let mut network_failures = 0usize;
        for source in &self.sources {
            match source.lookup(&symbol).await {
                Ok(bindings) => {
                    tracing::debug!(
                        source = source.name(),
                        symbol = %symbol,
                        count = bindings.len(),
                        "Token source answered"
                    );
                    merged.extend(bindings);
                }
                Err(e) => {
                    tracing::warn!(
                        source = source.name(),
                        symbol = %symbol,
                        error = %e,
                        "Token source lookup failed"
                    );
                    if e.is_network() {
                        network_failures += 1;
                    }
                }
            }
        }

        // Every external source down and nothing known locally: retriable.
        if merged.is_empty() && !self.sources.is_empty() && network_failures == self.sources.len() {
            return Err(TradeError::new(
                ErrorCode::PriceDataUnavailable,
                "all token sources unreachable",
            )
            .with_symbol(&symbol));
        }

        let deduped = dedup(merged);
        let ttl = if deduped.is_empty() {
            Some(NEGATIVE_TTL)
        } else {
            None
        };
        Ok((deduped, ttl))
    }

    pub fn invalidate(&self, symbol: &str) {
        self.cache.invalidate(&symbol.to_uppercase());
    }
}

/// Keep the highest-priority binding per `(network, contract)`.
fn dedup(mut bindings: Vec<TokenBinding>) -> Vec<TokenBinding> {
    bindings.sort_by_key(|b| (b.source.priority(), !b.verified));
    let mut seen = HashSet::new();
    bindings.retain(|b| seen.insert((b.network.clone(), b.contract)));
    bindings
}

/// Order by source priority, then verification, then move chains with an
/// active caller wallet to the front (stable within groups).
fn rank(mut bindings: Vec<TokenBinding>, active_networks: &[NetworkKey]) -> Vec<TokenBinding> {
    bindings.sort_by_key(|b| (b.source.priority(), !b.verified));
    let active: HashSet<&NetworkKey> = active_networks.iter().collect();
    let (front, back): (Vec<_>, Vec<_>) = bindings
        .into_iter()
        .partition(|b| active.contains(&b.network));
    front.into_iter().chain(back).collect()
}
