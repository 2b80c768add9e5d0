use crate::types::{ProjectAuthContext, ProjectId, PublicKey};
use std::sync::Arc;

#[derive(thiserror::Error, Debug)]
pub enum AuthSourceError {
    #[error("auth source is unavailable: {0}")]
    Unavailable(String),
    #[error("auth source backend error")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Resolves a (project, key) pair to the project's auth context.
///
/// `Ok(None)` is the only "not authorized" answer: an unknown key, a key of
/// another project and a missing project or organization must all look the
/// same to the caller. Implementations answer with a single atomic read.
pub trait AuthSource: Send + Sync {
    fn resolve(
        &self,
        project_id: ProjectId,
        key: &PublicKey,
    ) -> Result<Option<ProjectAuthContext>, AuthSourceError>;
}

impl<T: AuthSource + ?Sized> AuthSource for Arc<T> {
    fn resolve(
        &self,
        project_id: ProjectId,
        key: &PublicKey,
    ) -> Result<Option<ProjectAuthContext>, AuthSourceError> {
        (**self).resolve(project_id, key)
    }
}
