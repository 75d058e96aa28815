//! # Auth Collaborator Seam
//!
//! Session handling lives outside this crate. The manager only asks two
//! questions: is there a valid session, and which headers identify the
//! caller. The `x-shelf-actor` header becomes the audit entry's actor tag.

use async_trait::async_trait;
use std::collections::HashMap;

/// Header carrying the caller identity.
pub const ACTOR_HEADER: &str = "x-shelf-actor";

/// Session validation and caller identity (implemented by the host app).
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Whether the current session is valid.
    async fn validate_session(&self) -> bool;

    /// Identity headers of the current caller.
    fn auth_headers(&self) -> HashMap<String, String>;
}

/// Actor tag for audit entries: the actor header of a valid session.
pub async fn actor_tag(auth: &dyn AuthProvider) -> Option<String> {
    if !auth.validate_session().await {
        return None;
    }

    auth.auth_headers()
        .into_iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(ACTOR_HEADER))
        .map(|(_, value)| value)
        .filter(|value| !value.trim().is_empty())
}

/// No session; audit entries carry no actor.
pub struct NoAuth;

#[async_trait]
impl AuthProvider for NoAuth {
    async fn validate_session(&self) -> bool {
        false
    }

    fn auth_headers(&self) -> HashMap<String, String> {
        HashMap::new()
    }
}

/// Always-valid session with a fixed actor (command line, service accounts).
pub struct StaticActor {
    actor: String,
}

impl StaticActor {
    pub fn new(actor: impl Into<String>) -> Self {
        StaticActor { actor: actor.into() }
    }
}

#[async_trait]
impl AuthProvider for StaticActor {
    async fn validate_session(&self) -> bool {
        true
    }

    fn auth_headers(&self) -> HashMap<String, String> {
        HashMap::from([(ACTOR_HEADER.to_string(), self.actor.clone())])
    }
}
