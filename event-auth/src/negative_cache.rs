// Short lived cache of rejected (project, key) pairs so that a misbehaving
// client repeating a bad request does not reach storage on every event.
// Entries are stored as compact codes: "v" for an unknown key, or the
// throttle state text ("t:<org>:<project>").
use crate::authenticator::Rejection;
use crate::config::NegativeCacheConfig;
use crate::metrics_defs::{NEGATIVE_CACHE_HIT, NEGATIVE_CACHE_MISS};
use crate::throttle::ThrottleState;
use crate::types::{ProjectId, PublicKey};
use moka::sync::Cache;
use shared::counter;
use std::time::Duration;

const UNAUTHORIZED_CODE: &str = "v";

pub struct NegativeCache {
    cache: Cache<(ProjectId, PublicKey), String>,
    retry_after: u64,
}

impl NegativeCache {
    pub fn new(config: &NegativeCacheConfig, retry_after: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(config.capacity)
            .time_to_live(Duration::from_secs(config.ttl_secs))
            .build();

        NegativeCache { cache, retry_after }
    }

    /// Remembers a rejection. Maintenance rejections are not cached.
    pub fn insert(&self, project_id: ProjectId, key: PublicKey, rejection: &Rejection) {
        let code = match rejection {
            Rejection::Unauthorized => UNAUTHORIZED_CODE.to_string(),
            Rejection::Throttled { state, .. } => state.to_string(),
            Rejection::Maintenance => return,
        };
        self.cache.insert((project_id, key), code);
    }

    pub fn get(&self, project_id: ProjectId, key: PublicKey) -> Option<Rejection> {
        let cached = self
            .cache
            .get(&(project_id, key))
            .and_then(|code| self.decode(&code));
        let metric_def = if cached.is_some() {
            NEGATIVE_CACHE_HIT
        } else {
            NEGATIVE_CACHE_MISS
        };
        counter!(metric_def).increment(1);
        cached
    }

    fn decode(&self, code: &str) -> Option<Rejection> {
        if code == UNAUTHORIZED_CODE {
            return Some(Rejection::Unauthorized);
        }
        match code.parse::<ThrottleState>() {
            Ok(state) => Some(Rejection::Throttled {
                retry_after: self.retry_after,
                state,
            }),
            Err(err) => {
                tracing::warn!(%err, "Ignoring unreadable cached rejection");
                None
            }
        }
    }
}
