use crate::source::{AuthSource, AuthSourceError};
use crate::types::{ProjectAuthContext, ProjectId, PublicKey};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

/// In-memory auth source that counts how often it is asked.
#[derive(Default)]
pub struct StaticAuthSource {
    entries: Mutex<HashMap<(ProjectId, PublicKey), ProjectAuthContext>>,
    calls: AtomicUsize,
    unavailable: bool,
}

impl StaticAuthSource {
    pub fn unavailable() -> Self {
        StaticAuthSource {
            unavailable: true,
            ..Default::default()
        }
    }

    pub fn insert(&self, key: PublicKey, context: ProjectAuthContext) {
        self.entries.lock().insert((context.project_id, key), context);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl AuthSource for StaticAuthSource {
    fn resolve(
        &self,
        project_id: ProjectId,
        key: &PublicKey,
    ) -> Result<Option<ProjectAuthContext>, AuthSourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.unavailable {
            return Err(AuthSourceError::Unavailable("test source is down".into()));
        }
        Ok(self.entries.lock().get(&(project_id, *key)).cloned())
    }
}

pub fn context(project_id: ProjectId, organization_id: u64) -> ProjectAuthContext {
    ProjectAuthContext {
        project_id,
        organization_id,
        project_accepts_events: true,
        project_scrub_ip_addresses: false,
        organization_scrub_ip_addresses: false,
        project_event_throttle_rate: 0,
        organization_event_throttle_rate: 0,
        first_event_at: None,
    }
}
