use serde::{de, Deserialize, Deserializer, Serialize};

use crate::error::{AuthError, AuthResult};

/// A capability attached to an API key.
///
/// - **Global**: full access to every application on the device. Held by the
///   control-plane key (app id 0, no service name).
/// - **App**: access limited to a single application.
///
/// Serialized as a tagged object so a key's scope list is stored as a flat
/// JSON array, e.g. `[{"type":"app","appId":7}]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Scope {
    Global,
    App {
        #[serde(rename = "appId", deserialize_with = "positive_app_id")]
        app_id: u32,
    },
}

fn positive_app_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    match u32::deserialize(deserializer)? {
        0 => Err(de::Error::custom("appId must be a positive integer")),
        id => Ok(id),
    }
}

impl Scope {
    pub fn global() -> Self {
        Scope::Global
    }

    pub fn app(app_id: u32) -> Self {
        Scope::App { app_id }
    }

    /// Whether this single scope grants access to everything in `requested`.
    pub fn satisfies(&self, requested: &Resources) -> bool {
        match self {
            Scope::Global => true,
            Scope::App { app_id } => requested.apps.contains(app_id),
        }
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scope::Global => f.write_str("global"),
            Scope::App { app_id } => write!(f, "app:{}", app_id),
        }
    }
}

/// The set of resources a request wants to touch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resources {
    #[serde(default)]
    pub apps: Vec<u32>,
}

impl Resources {
    pub fn apps(apps: impl IntoIterator<Item = u32>) -> Self {
        Resources {
            apps: apps.into_iter().collect(),
        }
    }
}

/// Serialize a scope list into the form stored in the key table.
pub fn serialize_scopes(scopes: &[Scope]) -> AuthResult<String> {
    serde_json::to_string(scopes).map_err(AuthError::InvalidScopes)
}

/// Parse a stored scope list.
pub fn deserialize_scopes(raw: &str) -> AuthResult<Vec<Scope>> {
    serde_json::from_str(raw).map_err(AuthError::InvalidScopes)
}
