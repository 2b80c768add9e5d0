//! Event authentication: resolving a project's public key to the state that
//! decides whether an incoming event is accepted, throttled or rejected.

pub mod authenticator;
pub mod config;
pub mod credentials;
pub mod metrics_defs;
mod negative_cache;
pub mod source;
pub mod throttle;
pub mod types;

#[cfg(test)]
mod testutils;

pub use authenticator::{AcceptedEvent, AuthDecision, EventAuthenticator, Rejection};
pub use config::Config;
pub use credentials::RequestCredentials;
pub use source::{AuthSource, AuthSourceError};
pub use throttle::ThrottleState;
pub use types::{OrganizationId, ProjectAuthContext, ProjectId, PublicKey};
