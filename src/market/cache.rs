use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use super::{Market, MarketDataProvider};
use crate::core::{ModelError, ModelResult};

/// Holds the last built [`Market`] and rebuilds it from the provider once it is older than `ttl`.
pub struct MarketCache<P> {
    provider: P,
    ttl: Duration,
    slot: RwLock<Option<(Instant, Arc<Market>)>>,
}

impl<P: MarketDataProvider> MarketCache<P> {
    pub fn new(provider: P, ttl: Duration) -> Self {
        Self {
            provider,
            ttl,
            slot: RwLock::new(None),
        }
    }

    pub fn current(&self) -> ModelResult<Arc<Market>> {
        self.current_at(Instant::now())
    }

    pub fn current_at(&self, now: Instant) -> ModelResult<Arc<Market>> {
        {
            let slot = self.slot.read().map_err(|_| poisoned())?;
            if let Some((built_at, market)) = slot.as_ref() {
                if now.saturating_duration_since(*built_at) < self.ttl {
                    return Ok(Arc::clone(market));
                }
            }
        }

        let mut slot = self.slot.write().map_err(|_| poisoned())?;
        // Another request may have refreshed while we waited for the lock.
        if let Some((built_at, market)) = slot.as_ref() {
            if now.saturating_duration_since(*built_at) < self.ttl {
                return Ok(Arc::clone(market));
            }
        }
        let market = Arc::new(Market::build(&self.provider)?);
        log::info!(
            "market data refreshed: {} countries, valid for {:?}",
            market.countries.len(),
            self.ttl
        );
        *slot = Some((now, Arc::clone(&market)));
        Ok(market)
    }
}

fn poisoned() -> ModelError {
    ModelError::MarketData("market cache lock poisoned".to_string())
}
