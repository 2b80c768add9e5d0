use crate::config::StoreConfig;
use crate::metrics_defs::{ISSUE_APPEND_DURATION, ISSUE_BATCH_SIZE, ISSUE_VECTOR_UNREADABLE};
use crate::schema;
use chrono::{DateTime, Utc};
use event_auth::{
    AuthSource, AuthSourceError, OrganizationId, ProjectAuthContext, ProjectId, PublicKey,
};
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, Transaction, TransactionBehavior, params};
use search_index::{AppendResult, IndexMaintainer, SearchVector, TextSearchConfig, VectorParseError};
use shared::{counter, histogram};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::{Duration, Instant};

pub type IssueId = u64;

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("stored search vector of issue {issue_id} is invalid: {source}")]
    InvalidVector {
        issue_id: IssueId,
        #[source]
        source: VectorParseError,
    },
}

/// What happened to an existing issue's search vector.
#[derive(Clone, Debug, PartialEq)]
pub enum IssueAppend {
    Applied(AppendResult),
    /// The stored vector could not be parsed. It was left untouched.
    UnreadableVector,
}

#[derive(Clone, Debug)]
pub struct NewOrganization {
    pub name: String,
    pub is_accepting_events: bool,
    pub event_throttle_rate: u8,
    pub scrub_ip_addresses: bool,
}

impl Default for NewOrganization {
    fn default() -> Self {
        NewOrganization {
            name: "organization".into(),
            is_accepting_events: true,
            event_throttle_rate: 0,
            scrub_ip_addresses: false,
        }
    }
}

#[derive(Clone, Debug)]
pub struct NewProject {
    pub organization_id: OrganizationId,
    pub name: String,
    pub scrub_ip_addresses: bool,
    pub event_throttle_rate: u8,
    pub first_event_at: Option<DateTime<Utc>>,
}

impl NewProject {
    pub fn new(organization_id: OrganizationId, name: impl Into<String>) -> Self {
        NewProject {
            organization_id,
            name: name.into(),
            scrub_ip_addresses: true,
            event_throttle_rate: 0,
            first_event_at: None,
        }
    }
}

// One statement over key -> project -> organization. Any break in the chain,
// including a soft-deleted project, yields no row.
const RESOLVE_PROJECT_AUTH: &str = "
SELECT
    p.id,
    p.organization_id,
    o.is_accepting_events,
    p.scrub_ip_addresses,
    o.scrub_ip_addresses,
    p.event_throttle_rate,
    o.event_throttle_rate,
    p.first_event
FROM project_keys k
JOIN projects p ON p.id = k.project_id
JOIN organizations o ON o.id = p.organization_id
WHERE k.public_key = ?1
  AND p.id = ?2
  AND p.deleted_at IS NULL
";

/// A single SQLite connection holding organizations, projects, their keys and
/// issues.
///
/// Several `Store`s may be opened on the same file. Every search vector update
/// runs in an immediate transaction, so writers to the file are serialized.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    pub fn open(path: impl AsRef<Path>, config: &StoreConfig) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;
        if config.wal {
            let mode: String =
                conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
            tracing::debug!(journal_mode = %mode, "Opened database");
        }
        Self::init(conn)
    }

    pub fn in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.pragma_update(None, "foreign_keys", true)?;
        schema::create(&conn)?;
        Ok(Store {
            conn: Mutex::new(conn),
        })
    }

    /// Reads the auth context for a (project, key) pair in one query.
    pub fn resolve_project_auth(
        &self,
        project_id: ProjectId,
        key: &PublicKey,
    ) -> Result<Option<ProjectAuthContext>, StoreError> {
        // SQLite ids are signed. Anything larger cannot exist.
        let Ok(project_id) = i64::try_from(project_id) else {
            return Ok(None);
        };

        let conn = self.conn.lock();
        let context = conn
            .prepare_cached(RESOLVE_PROJECT_AUTH)?
            .query_row(params![key.to_string(), project_id], |row| {
                Ok(ProjectAuthContext {
                    project_id: row.get(0)?,
                    organization_id: row.get(1)?,
                    project_accepts_events: row.get(2)?,
                    project_scrub_ip_addresses: row.get(3)?,
                    organization_scrub_ip_addresses: row.get(4)?,
                    project_event_throttle_rate: row.get(5)?,
                    organization_event_throttle_rate: row.get(6)?,
                    first_event_at: row.get(7)?,
                })
            })
            .optional()?;

        Ok(context)
    }

    /// Appends `text` to one issue's search vector inside a write transaction.
    ///
    /// Returns `Ok(None)` when the issue does not exist. A stored vector that
    /// cannot be parsed is logged and left as it is rather than failing the
    /// event.
    pub fn append_issue_search_text(
        &self,
        issue_id: IssueId,
        text: &str,
        max_lexemes: usize,
        config: TextSearchConfig,
        maintainer: &IndexMaintainer,
    ) -> Result<Option<IssueAppend>, StoreError> {
        let started = Instant::now();
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let result = append_in_tx(&tx, issue_id, text, max_lexemes, config, maintainer)?;
        tx.commit()?;
        histogram!(ISSUE_APPEND_DURATION).record(started.elapsed().as_secs_f64());
        Ok(result)
    }

    /// Applies a batch of (issue, text) updates in one transaction.
    ///
    /// Texts for the same issue are joined with a space and appended once, so
    /// each issue's vector is read and written a single time. Returns the
    /// number of issues whose vector was written.
    pub fn apply_issue_updates(
        &self,
        updates: &[(IssueId, String)],
        max_lexemes: usize,
        config: TextSearchConfig,
        maintainer: &IndexMaintainer,
    ) -> Result<usize, StoreError> {
        let mut grouped: BTreeMap<IssueId, Vec<&str>> = BTreeMap::new();
        for (issue_id, text) in updates {
            grouped.entry(*issue_id).or_default().push(text);
        }
        if grouped.is_empty() {
            return Ok(0);
        }
        histogram!(ISSUE_BATCH_SIZE).record(grouped.len() as f64);

        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut written = 0;
        for (issue_id, texts) in grouped {
            let text = texts.join(" ");
            let result = append_in_tx(&tx, issue_id, &text, max_lexemes, config, maintainer)?;
            if let Some(IssueAppend::Applied(result)) = result {
                if result.outcome.changed() {
                    written += 1;
                }
            }
        }
        tx.commit()?;
        Ok(written)
    }

    pub fn issue_search_vector(
        &self,
        issue_id: IssueId,
    ) -> Result<Option<SearchVector>, StoreError> {
        let conn = self.conn.lock();
        let Some(stored) = read_search_vector(&conn, issue_id)? else {
            return Ok(None);
        };
        let vector = stored
            .parse()
            .map_err(|source| StoreError::InvalidVector { issue_id, source })?;
        Ok(Some(vector))
    }

    pub fn insert_organization(&self, org: &NewOrganization) -> Result<OrganizationId, StoreError> {
        let conn = self.conn.lock();
        let id = conn.query_row(
            "INSERT INTO organizations
                 (name, is_accepting_events, event_throttle_rate, scrub_ip_addresses)
             VALUES (?1, ?2, ?3, ?4)
             RETURNING id",
            params![
                org.name,
                org.is_accepting_events,
                org.event_throttle_rate,
                org.scrub_ip_addresses
            ],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    pub fn insert_project(&self, project: &NewProject) -> Result<ProjectId, StoreError> {
        let conn = self.conn.lock();
        let id = conn.query_row(
            "INSERT INTO projects
                 (organization_id, name, scrub_ip_addresses, event_throttle_rate, first_event)
             VALUES (?1, ?2, ?3, ?4, ?5)
             RETURNING id",
            params![
                project.organization_id,
                project.name,
                project.scrub_ip_addresses,
                project.event_throttle_rate,
                project.first_event_at
            ],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    pub fn insert_project_key(
        &self,
        project_id: ProjectId,
        key: &PublicKey,
    ) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO project_keys (project_id, public_key) VALUES (?1, ?2)",
            params![project_id, key.to_string()],
        )?;
        Ok(())
    }

    pub fn create_issue(&self, project_id: ProjectId, title: &str) -> Result<IssueId, StoreError> {
        let conn = self.conn.lock();
        let id = conn.query_row(
            "INSERT INTO issues (project_id, title) VALUES (?1, ?2) RETURNING id",
            params![project_id, title],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    pub fn set_organization_accepting_events(
        &self,
        organization_id: OrganizationId,
        accepting: bool,
    ) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE organizations SET is_accepting_events = ?1 WHERE id = ?2",
            params![accepting, organization_id],
        )?;
        Ok(())
    }

    /// Marks a project deleted. Its keys stop authorizing immediately.
    pub fn soft_delete_project(&self, project_id: ProjectId) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE projects SET deleted_at = ?1 WHERE id = ?2",
            params![Utc::now(), project_id],
        )?;
        Ok(())
    }
}

impl AuthSource for Store {
    fn resolve(
        &self,
        project_id: ProjectId,
        key: &PublicKey,
    ) -> Result<Option<ProjectAuthContext>, AuthSourceError> {
        self.resolve_project_auth(project_id, key)
            .map_err(|e| AuthSourceError::Backend(Box::new(e)))
    }
}

fn read_search_vector(conn: &Connection, issue_id: IssueId) -> rusqlite::Result<Option<String>> {
    conn.prepare_cached("SELECT search_vector FROM issues WHERE id = ?1")?
        .query_row(params![issue_id], |row| row.get(0))
        .optional()
}

fn append_in_tx(
    tx: &Transaction<'_>,
    issue_id: IssueId,
    text: &str,
    max_lexemes: usize,
    config: TextSearchConfig,
    maintainer: &IndexMaintainer,
) -> Result<Option<IssueAppend>, StoreError> {
    let Some(stored) = read_search_vector(tx, issue_id)? else {
        return Ok(None);
    };

    let existing = match stored.parse::<SearchVector>() {
        Ok(existing) => existing,
        Err(error) => {
            counter!(ISSUE_VECTOR_UNREADABLE).increment(1);
            tracing::error!(
                issue_id,
                %error,
                "Stored search vector is unreadable, skipping append"
            );
            return Ok(Some(IssueAppend::UnreadableVector));
        }
    };

    let result = maintainer.append_detailed(Some(&existing), text, max_lexemes, config);
    if result.outcome.changed() {
        tx.prepare_cached("UPDATE issues SET search_vector = ?1 WHERE id = ?2")?
            .execute(params![result.vector.to_string(), issue_id])?;
    }
    tracing::debug!(
        issue_id,
        outcome = ?result.outcome,
        lexemes = result.vector.len(),
        "Appended issue search text"
    );

    Ok(Some(IssueAppend::Applied(result)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use event_auth::{AuthDecision, EventAuthenticator, Rejection};
    use search_index::{AppendOutcome, IndexLimits};
    use std::sync::Arc;

    struct Fixture {
        store: Store,
        organization_id: OrganizationId,
        project_id: ProjectId,
        key: PublicKey,
    }

    fn fixture() -> Fixture {
        let store = Store::in_memory().unwrap();
        let organization_id = store
            .insert_organization(&NewOrganization {
                event_throttle_rate: 20,
                ..Default::default()
            })
            .unwrap();
        let project_id = store
            .insert_project(&NewProject::new(organization_id, "backend"))
            .unwrap();
        let key = PublicKey::generate();
        store.insert_project_key(project_id, &key).unwrap();
        Fixture {
            store,
            organization_id,
            project_id,
            key,
        }
    }

    #[test]
    fn test_resolve_returns_joined_state() {
        let f = fixture();
        let context = f.store.resolve_project_auth(f.project_id, &f.key).unwrap();
        assert_eq!(
            context,
            Some(ProjectAuthContext {
                project_id: f.project_id,
                organization_id: f.organization_id,
                project_accepts_events: true,
                project_scrub_ip_addresses: true,
                organization_scrub_ip_addresses: false,
                project_event_throttle_rate: 0,
                organization_event_throttle_rate: 20,
                first_event_at: None,
            })
        );
    }

    #[test]
    fn test_resolve_reads_first_event() {
        let f = fixture();
        let first_event_at = DateTime::parse_from_rfc3339("2024-03-01T12:30:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let mut project = NewProject::new(f.organization_id, "frontend");
        project.first_event_at = Some(first_event_at);
        let project_id = f.store.insert_project(&project).unwrap();
        let key = PublicKey::generate();
        f.store.insert_project_key(project_id, &key).unwrap();

        let context = f.store.resolve_project_auth(project_id, &key).unwrap().unwrap();
        assert_eq!(context.first_event_at, Some(first_event_at));
    }

    #[test]
    fn test_key_of_other_project_is_not_found() {
        let f = fixture();
        let other = f
            .store
            .insert_project(&NewProject::new(f.organization_id, "other"))
            .unwrap();

        assert_eq!(f.store.resolve_project_auth(other, &f.key).unwrap(), None);
        assert_eq!(f.store.resolve_project_auth(9999, &f.key).unwrap(), None);
        assert_eq!(
            f.store
                .resolve_project_auth(f.project_id, &PublicKey::generate())
                .unwrap(),
            None
        );
        assert_eq!(f.store.resolve_project_auth(u64::MAX, &f.key).unwrap(), None);
    }

    #[test]
    fn test_organization_not_accepting_events_still_resolves() {
        let f = fixture();
        f.store
            .set_organization_accepting_events(f.organization_id, false)
            .unwrap();

        let context = f.store.resolve_project_auth(f.project_id, &f.key).unwrap().unwrap();
        assert!(!context.project_accepts_events);
    }

    #[test]
    fn test_soft_deleted_project_is_not_found() {
        let f = fixture();
        f.store.soft_delete_project(f.project_id).unwrap();
        assert_eq!(f.store.resolve_project_auth(f.project_id, &f.key).unwrap(), None);
    }

    #[test]
    fn test_authenticator_over_store() {
        let f = fixture();
        f.store
            .set_organization_accepting_events(f.organization_id, false)
            .unwrap();
        let key = f.key.to_string();
        let project_id = f.project_id;
        let auth = EventAuthenticator::new(Arc::new(f.store), &event_auth::Config::default());

        let decision = auth.authenticate(project_id, &key).unwrap();
        assert!(matches!(
            decision,
            AuthDecision::Rejected(Rejection::Throttled { retry_after: 600, .. })
        ));
        let decision = auth.authenticate(project_id + 1, &key).unwrap();
        assert_eq!(decision, AuthDecision::Rejected(Rejection::Unauthorized));
    }

    #[test]
    fn test_append_to_issue() {
        let f = fixture();
        let issue_id = f.store.create_issue(f.project_id, "Timeout").unwrap();
        let maintainer = IndexMaintainer::default();

        assert_eq!(
            f.store.issue_search_vector(issue_id).unwrap(),
            Some(SearchVector::new())
        );

        let result = f
            .store
            .append_issue_search_text(
                issue_id,
                "connection timeout",
                10,
                TextSearchConfig::default(),
                &maintainer,
            )
            .unwrap();
        let Some(IssueAppend::Applied(result)) = result else {
            panic!("expected an applied append");
        };
        assert_eq!(result.outcome, AppendOutcome::Appended);

        let stored = f.store.issue_search_vector(issue_id).unwrap().unwrap();
        assert_eq!(stored.to_string(), "'connect':1 'timeout':2");
        assert_eq!(stored, result.vector);
    }

    #[test]
    fn test_append_keeps_lexeme_budget() {
        let f = fixture();
        let issue_id = f.store.create_issue(f.project_id, "Noisy").unwrap();
        let maintainer = IndexMaintainer::default();
        let text = "bravo charlie delta echo foxtrot golf hotel india juliet kilo";

        for text in [text, "aardvark abacus able"] {
            f.store
                .append_issue_search_text(issue_id, text, 10, TextSearchConfig::Simple, &maintainer)
                .unwrap();
        }

        let stored = f.store.issue_search_vector(issue_id).unwrap().unwrap();
        assert_eq!(stored.len(), 10);
        assert!(stored.contains("aardvark"));
        for evicted in ["india", "juliet", "kilo"] {
            assert!(!stored.contains(evicted));
        }
    }

    #[test]
    fn test_append_to_missing_issue() {
        let f = fixture();
        let maintainer = IndexMaintainer::default();
        let result = f
            .store
            .append_issue_search_text(42, "text", 10, TextSearchConfig::default(), &maintainer)
            .unwrap();
        assert_eq!(result, None);
        assert_eq!(f.store.issue_search_vector(42).unwrap(), None);
    }

    #[test]
    fn test_unreadable_vector_is_left_alone() {
        let f = fixture();
        let issue_id = f.store.create_issue(f.project_id, "Broken").unwrap();
        f.store
            .conn
            .lock()
            .execute(
                "UPDATE issues SET search_vector = ?1 WHERE id = ?2",
                params!["'unterminated", issue_id],
            )
            .unwrap();

        let maintainer = IndexMaintainer::default();
        let result = f
            .store
            .append_issue_search_text(issue_id, "more", 10, TextSearchConfig::Simple, &maintainer)
            .unwrap();
        assert_eq!(result, Some(IssueAppend::UnreadableVector));

        let err = f.store.issue_search_vector(issue_id).unwrap_err();
        assert!(matches!(err, StoreError::InvalidVector { .. }));
        let stored: String = f
            .store
            .conn
            .lock()
            .query_row(
                "SELECT search_vector FROM issues WHERE id = ?1",
                params![issue_id],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(stored, "'unterminated");
    }

    #[test]
    fn test_saturated_vector_is_not_rewritten() {
        let f = fixture();
        let issue_id = f.store.create_issue(f.project_id, "Full").unwrap();
        let roomy = IndexMaintainer::default();
        let config = TextSearchConfig::default();
        f.store
            .append_issue_search_text(issue_id, "connection timeout", 10, config, &roomy)
            .unwrap();

        let tight = IndexMaintainer::new(IndexLimits {
            max_vector_bytes: 30,
            ..Default::default()
        });
        let result = f
            .store
            .append_issue_search_text(issue_id, "refused", 10, config, &tight)
            .unwrap();
        let Some(IssueAppend::Applied(result)) = result else {
            panic!("expected an applied append");
        };
        assert_eq!(result.outcome, AppendOutcome::Saturated);
        let stored = f.store.issue_search_vector(issue_id).unwrap().unwrap();
        assert_eq!(stored.to_string(), "'connect':1 'timeout':2");
    }

    #[test]
    fn test_apply_issue_updates_groups_by_issue() {
        let f = fixture();
        let first = f.store.create_issue(f.project_id, "First").unwrap();
        let second = f.store.create_issue(f.project_id, "Second").unwrap();
        let updates = vec![
            (first, "alpha".to_string()),
            (second, "gamma".to_string()),
            (first, "beta".to_string()),
            (7777, "missing".to_string()),
            (second, "".to_string()),
        ];

        let maintainer = IndexMaintainer::default();
        let written = f
            .store
            .apply_issue_updates(&updates, 10, TextSearchConfig::Simple, &maintainer)
            .unwrap();
        assert_eq!(written, 2);

        let first = f.store.issue_search_vector(first).unwrap().unwrap();
        assert_eq!(first.to_string(), "'alpha':1 'beta':2");
        let second = f.store.issue_search_vector(second).unwrap().unwrap();
        assert_eq!(second.to_string(), "'gamma':1");

        assert_eq!(
            f.store
                .apply_issue_updates(&[], 10, TextSearchConfig::Simple, &maintainer)
                .unwrap(),
            0
        );
    }

    #[test]
    fn test_concurrent_appends_from_separate_connections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ingest.db");
        let config = StoreConfig::default();

        let store = Store::open(&path, &config).unwrap();
        let organization_id = store.insert_organization(&NewOrganization::default()).unwrap();
        let project_id = store
            .insert_project(&NewProject::new(organization_id, "busy"))
            .unwrap();
        let wide = store.create_issue(project_id, "Wide").unwrap();
        let narrow = store.create_issue(project_id, "Narrow").unwrap();

        let handles: Vec<_> = (0..4)
            .map(|worker| {
                let path = path.clone();
                let config = config.clone();
                std::thread::spawn(move || {
                    let store = Store::open(&path, &config).unwrap();
                    let maintainer = IndexMaintainer::default();
                    for i in 0..10 {
                        let text = format!("w{worker}n{i}");
                        for (issue_id, max_lexemes) in [(wide, 1000), (narrow, 5)] {
                            store
                                .append_issue_search_text(
                                    issue_id,
                                    &text,
                                    max_lexemes,
                                    TextSearchConfig::Simple,
                                    &maintainer,
                                )
                                .unwrap();
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        // Writers are serialized, so no append is lost.
        let wide = store.issue_search_vector(wide).unwrap().unwrap();
        assert_eq!(wide.len(), 40);
        let narrow = store.issue_search_vector(narrow).unwrap().unwrap();
        assert_eq!(narrow.len(), 5);
        assert_eq!(
            narrow.lexemes().collect::<Vec<_>>(),
            vec!["w0n0", "w0n1", "w0n2", "w0n3", "w0n4"]
        );
    }
}
