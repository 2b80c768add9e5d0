use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub type ProjectId = u64;
pub type OrganizationId = u64;

/// Throttle rates are percentages of events to drop.
pub const MAX_THROTTLE_RATE: u8 = 100;

/// The public half of a project's DSN, a 128-bit key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PublicKey(Uuid);

impl PublicKey {
    pub fn new(uuid: Uuid) -> Self {
        PublicKey(uuid)
    }

    pub fn generate() -> Self {
        PublicKey(Uuid::new_v4())
    }

    /// Accepts the hyphenated and the plain 32 digit hex forms.
    pub fn parse(raw: &str) -> Option<Self> {
        if !matches!(raw.len(), 32 | 36) {
            return None;
        }
        Uuid::try_parse(raw).ok().map(PublicKey)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.as_hyphenated())
    }
}

/// Everything needed to accept, reject or throttle an event for a project,
/// read in one pass over key, project and organization.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectAuthContext {
    pub project_id: ProjectId,
    pub organization_id: OrganizationId,
    /// Mirrors the organization's accept-events flag.
    pub project_accepts_events: bool,
    pub project_scrub_ip_addresses: bool,
    pub organization_scrub_ip_addresses: bool,
    pub project_event_throttle_rate: u8,
    pub organization_event_throttle_rate: u8,
    pub first_event_at: Option<DateTime<Utc>>,
}

impl ProjectAuthContext {
    /// The organization can force scrubbing on; a project can only add to it.
    pub fn should_scrub_ip_addresses(&self) -> bool {
        self.organization_scrub_ip_addresses || self.project_scrub_ip_addresses
    }

    /// The organization rate is a floor the project can only tighten.
    pub fn effective_throttle_rate(&self) -> u8 {
        self.organization_event_throttle_rate
            .max(self.project_event_throttle_rate)
            .min(MAX_THROTTLE_RATE)
    }
}
