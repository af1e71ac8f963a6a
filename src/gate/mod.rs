//! Request gate: resolves the caller's API key to scopes and checks decoded
//! resource ids against them before a handler runs.

pub mod middleware;

use std::sync::Arc;

use axum::http::HeaderMap;

use crate::api_keys::KeyIssuer;
use crate::error::{AuthError, AuthResult};
use crate::scope::{authorizes, Resources, Scope};
use crate::validation::{ValidatedValues, APP_ID_PARAM};

pub use middleware::{auth_middleware, validation_middleware, GateState};

/// Attached to every authenticated request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthContext {
    /// The presented key. `None` when authentication is disabled and the
    /// caller sent no key.
    pub secret: Option<String>,
    /// Owning application of the key (0 for the global key).
    pub app_id: Option<u32>,
    pub scopes: Vec<Scope>,
}

impl AuthContext {
    /// Context for keyless requests when authentication is not required.
    pub fn unauthenticated() -> Self {
        AuthContext {
            secret: None,
            app_id: None,
            scopes: vec![Scope::Global],
        }
    }

    pub fn is_scoped(&self, resources: &Resources) -> bool {
        authorizes(&self.scopes, resources)
    }
}

/// Pull an API key from `Authorization: Bearer <key>` or, failing that, from
/// the `apikey` query parameter. The scheme is matched case-insensitively.
pub fn extract_api_key(headers: &HeaderMap, query: Option<&str>) -> Option<String> {
    let bearer = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| {
            if v.len() > 7 && v[..7].eq_ignore_ascii_case("bearer ") {
                Some(v[7..].trim())
            } else {
                None
            }
        })
        .filter(|k| !k.is_empty());

    if let Some(key) = bearer {
        return Some(key.to_string());
    }

    query.and_then(|q| {
        url::form_urlencoded::parse(q.as_bytes())
            .find(|(name, _)| name == "apikey")
            .map(|(_, value)| value.into_owned())
            .filter(|k| !k.is_empty())
    })
}

pub struct Gate {
    issuer: Arc<KeyIssuer>,
    auth_required: bool,
}

impl Gate {
    pub fn new(issuer: Arc<KeyIssuer>, auth_required: bool) -> Self {
        Gate {
            issuer,
            auth_required,
        }
    }

    pub fn issuer(&self) -> &Arc<KeyIssuer> {
        &self.issuer
    }

    /// Resolve a presented key. `Ok(None)` means the caller is not
    /// authenticated: the key is unknown, or missing while auth is required.
    pub async fn authenticate(&self, key: Option<&str>) -> AuthResult<Option<AuthContext>> {
        let Some(key) = key else {
            return Ok((!self.auth_required).then(AuthContext::unauthenticated));
        };

        match self.issuer.lookup(key).await? {
            Some(row) => Ok(Some(AuthContext {
                secret: Some(row.key.clone()),
                app_id: Some(row.app_id),
                scopes: row.scopes()?,
            })),
            None => Ok(None),
        }
    }

    /// Check the decoded application id, if the route has one, against the
    /// caller's scopes.
    pub fn authorize(
        &self,
        context: Option<&AuthContext>,
        values: &ValidatedValues,
    ) -> AuthResult<()> {
        let Some(app_id) = values.get_u32(APP_ID_PARAM) else {
            return Ok(());
        };
        let requested = Resources::apps([app_id]);
        match context {
            Some(ctx) if ctx.is_scoped(&requested) => Ok(()),
            _ => Err(AuthError::AuthorizationDenied),
        }
    }
}
