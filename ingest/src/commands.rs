use crate::CliError;
use crate::config::Config;
use event_auth::{AuthDecision, EventAuthenticator, ProjectId, PublicKey, RequestCredentials};
use ingest_store::{IssueAppend, IssueId, NewOrganization, NewProject, Store};
use search_index::{EventSearchFields, IndexMaintainer, search_text};
use serde::Serialize;
use std::path::Path;

pub fn open_store(config: &Config) -> Result<Store, CliError> {
    Ok(Store::open(&config.database.path, &config.database.store)?)
}

pub fn init_db(config: &Config) -> Result<(), CliError> {
    open_store(config)?;
    tracing::info!(path = %config.database.path.display(), "Database ready");
    Ok(())
}

#[derive(Debug)]
pub struct SeedOptions {
    pub organization: String,
    pub project: String,
    pub organization_throttle_rate: u8,
    pub project_throttle_rate: u8,
    pub accepting_events: bool,
    pub issue_title: String,
}

#[derive(Debug, Serialize)]
pub struct Seeded {
    pub organization_id: u64,
    pub project_id: ProjectId,
    pub public_key: PublicKey,
    pub issue_id: IssueId,
}

/// Creates an organization with one project, key and issue.
pub fn seed(store: &Store, options: &SeedOptions) -> Result<Seeded, CliError> {
    let organization_id = store.insert_organization(&NewOrganization {
        name: options.organization.clone(),
        is_accepting_events: options.accepting_events,
        event_throttle_rate: options.organization_throttle_rate,
        ..Default::default()
    })?;
    let mut project = NewProject::new(organization_id, options.project.clone());
    project.event_throttle_rate = options.project_throttle_rate;
    let project_id = store.insert_project(&project)?;
    let public_key = PublicKey::generate();
    store.insert_project_key(project_id, &public_key)?;
    let issue_id = store.create_issue(project_id, &options.issue_title)?;

    tracing::info!(organization_id, project_id, issue_id, "Seeded project");
    Ok(Seeded {
        organization_id,
        project_id,
        public_key,
        issue_id,
    })
}

#[derive(Debug, Default)]
pub struct ResolveOptions {
    pub project_id: ProjectId,
    pub key: Option<String>,
    pub query: Option<String>,
    pub auth_header: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum ResolveOutput {
    Accepted {
        context: event_auth::ProjectAuthContext,
        scrub_ip_addresses: bool,
    },
    Rejected {
        status: u16,
        message: String,
        retry_after: Option<u64>,
    },
}

pub fn resolve(
    store: Store,
    config: &Config,
    options: &ResolveOptions,
) -> Result<ResolveOutput, CliError> {
    let raw_key = options.key.clone().or_else(|| {
        RequestCredentials {
            query: options.query.as_deref(),
            x_sentry_auth: options.auth_header.as_deref(),
            authorization: None,
        }
        .public_key()
    });

    let authenticator = EventAuthenticator::new(store, &config.auth);
    let decision =
        authenticator.authenticate(options.project_id, raw_key.as_deref().unwrap_or(""))?;

    Ok(match decision {
        AuthDecision::Accepted(accepted) => ResolveOutput::Accepted {
            context: accepted.context,
            scrub_ip_addresses: accepted.scrub_ip_addresses,
        },
        AuthDecision::Rejected(rejection) => ResolveOutput::Rejected {
            status: rejection.status_code(),
            message: rejection.to_string(),
            retry_after: rejection.retry_after(),
        },
    })
}

pub enum AppendInput<'a> {
    Text(&'a str),
    EventFile(&'a Path),
}

#[derive(Debug, Serialize)]
pub struct AppendOutput {
    pub issue_id: IssueId,
    pub outcome: String,
    pub lexemes: usize,
    pub bytes: usize,
}

pub fn append(
    store: &Store,
    config: &Config,
    issue_id: IssueId,
    input: AppendInput<'_>,
) -> Result<AppendOutput, CliError> {
    let text = match input {
        AppendInput::Text(text) => text.to_string(),
        AppendInput::EventFile(path) => {
            let payload = std::fs::read(path)?;
            search_text(&EventSearchFields::from_json(&payload)?)
        }
    };

    let search = &config.search_index;
    let maintainer = IndexMaintainer::new(search.limits);
    let result = store.append_issue_search_text(
        issue_id,
        &text,
        search.max_lexemes,
        search.text_search_config,
        &maintainer,
    )?;

    match result {
        None => Err(CliError::UnknownIssue(issue_id)),
        Some(IssueAppend::UnreadableVector) => Ok(AppendOutput {
            issue_id,
            outcome: "unreadable_vector".into(),
            lexemes: 0,
            bytes: 0,
        }),
        Some(IssueAppend::Applied(result)) => Ok(AppendOutput {
            issue_id,
            outcome: format!("{:?}", result.outcome),
            lexemes: result.vector.len(),
            bytes: result.vector.byte_size(),
        }),
    }
}
