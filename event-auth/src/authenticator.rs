use crate::config::Config;
use crate::metrics_defs::{EVENT_ACCEPTED, EVENT_REJECTED, RESOLVE_DURATION};
use crate::negative_cache::NegativeCache;
use crate::source::{AuthSource, AuthSourceError};
use crate::throttle::ThrottleState;
use crate::types::{MAX_THROTTLE_RATE, ProjectAuthContext, ProjectId, PublicKey};
use rand::Rng;
use shared::{counter, histogram};
use std::fmt;
use std::time::Instant;

/// Why an event was turned away. The variants deliberately carry no detail
/// about which part of the key/project/organization chain failed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Rejection {
    Unauthorized,
    Throttled {
        retry_after: u64,
        state: ThrottleState,
    },
    Maintenance,
}

impl Rejection {
    pub fn status_code(&self) -> u16 {
        match self {
            Rejection::Unauthorized => 401,
            Rejection::Throttled { .. } => 429,
            Rejection::Maintenance => 503,
        }
    }

    /// Seconds to send back in `Retry-After`.
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            Rejection::Throttled { retry_after, .. } => Some(*retry_after),
            _ => None,
        }
    }

    fn reason(&self) -> &'static str {
        match self {
            Rejection::Unauthorized => "unauthorized",
            Rejection::Throttled { .. } => "throttled",
            Rejection::Maintenance => "maintenance",
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::Unauthorized => f.write_str("invalid DSN"),
            Rejection::Throttled { .. } => f.write_str("please retry later"),
            Rejection::Maintenance => {
                f.write_str("events are not currently being accepted due to maintenance")
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AcceptedEvent {
    pub context: ProjectAuthContext,
    pub scrub_ip_addresses: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AuthDecision {
    Accepted(AcceptedEvent),
    Rejected(Rejection),
}

impl AuthDecision {
    pub fn is_accepted(&self) -> bool {
        matches!(self, AuthDecision::Accepted(_))
    }

    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            AuthDecision::Accepted(_) => None,
            AuthDecision::Rejected(rejection) => Some(rejection),
        }
    }
}

/// Turns a resolved auth context into an accept/reject/throttle decision.
///
/// Unauthorized keys and organizations that stopped accepting events are
/// remembered for a short while, so repeated attempts skip the auth source.
/// Sampled throttling is decided per event and never cached.
pub struct EventAuthenticator<S> {
    source: S,
    negative_cache: NegativeCache,
    maintenance_freeze: bool,
    retry_after: u64,
}

impl<S: AuthSource> EventAuthenticator<S> {
    pub fn new(source: S, config: &Config) -> Self {
        EventAuthenticator {
            source,
            negative_cache: NegativeCache::new(
                &config.negative_cache,
                config.throttle_retry_after_secs,
            ),
            maintenance_freeze: config.maintenance_freeze,
            retry_after: config.throttle_retry_after_secs,
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn authenticate(
        &self,
        project_id: ProjectId,
        raw_key: &str,
    ) -> Result<AuthDecision, AuthSourceError> {
        self.authenticate_with(project_id, raw_key, &mut rand::thread_rng())
    }

    /// Same as [`authenticate`](Self::authenticate) with a caller supplied
    /// source of randomness for throttle sampling.
    pub fn authenticate_with<R: Rng>(
        &self,
        project_id: ProjectId,
        raw_key: &str,
        rng: &mut R,
    ) -> Result<AuthDecision, AuthSourceError> {
        let decision = self.decide(project_id, raw_key, rng)?;
        match &decision {
            AuthDecision::Accepted(_) => counter!(EVENT_ACCEPTED).increment(1),
            AuthDecision::Rejected(rejection) => {
                tracing::debug!(project_id, reason = rejection.reason(), "Event rejected");
                counter!(EVENT_REJECTED, "reason" => rejection.reason()).increment(1)
            }
        }
        Ok(decision)
    }

    fn decide<R: Rng>(
        &self,
        project_id: ProjectId,
        raw_key: &str,
        rng: &mut R,
    ) -> Result<AuthDecision, AuthSourceError> {
        if self.maintenance_freeze {
            return Ok(AuthDecision::Rejected(Rejection::Maintenance));
        }

        let Some(key) = PublicKey::parse(raw_key) else {
            return Ok(AuthDecision::Rejected(Rejection::Unauthorized));
        };

        // Checked right before storage so every earlier rejection stays cheap.
        if let Some(rejection) = self.negative_cache.get(project_id, key) {
            return Ok(AuthDecision::Rejected(rejection));
        }

        let started = Instant::now();
        let resolved = self.source.resolve(project_id, &key);
        histogram!(RESOLVE_DURATION).record(started.elapsed().as_secs_f64());

        let Some(context) = resolved? else {
            return Ok(self.reject_and_remember(project_id, key, Rejection::Unauthorized));
        };

        if !context.project_accepts_events {
            let rejection = self.throttled(&context);
            return Ok(self.reject_and_remember(project_id, key, rejection));
        }

        let rate = context.effective_throttle_rate();
        if rate > 0 && rng.gen_range(0..MAX_THROTTLE_RATE) < rate {
            return Ok(AuthDecision::Rejected(self.throttled(&context)));
        }

        Ok(AuthDecision::Accepted(AcceptedEvent {
            scrub_ip_addresses: context.should_scrub_ip_addresses(),
            context,
        }))
    }

    fn throttled(&self, context: &ProjectAuthContext) -> Rejection {
        Rejection::Throttled {
            retry_after: self.retry_after,
            state: ThrottleState::new(
                context.organization_event_throttle_rate,
                context.project_event_throttle_rate,
            ),
        }
    }

    fn reject_and_remember(
        &self,
        project_id: ProjectId,
        key: PublicKey,
        rejection: Rejection,
    ) -> AuthDecision {
        self.negative_cache.insert(project_id, key, &rejection);
        AuthDecision::Rejected(rejection)
    }
}
