//! API key rows as stored by the key store.
//!
//! The control-plane key is the row with `app_id == 0` and no service name.
//! Every other key belongs to one service of one application.

use serde::{Deserialize, Serialize};

use crate::error::AuthResult;
use crate::scope::{deserialize_scopes, Scope};

/// Owner id reserved for the global (control-plane) key.
pub const GLOBAL_APP_ID: u32 = 0;

/// A persisted API key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiKeyRow {
    pub id: i64,
    /// RFC 3339 creation time.
    pub created_at: String,
    /// The secret itself. Unique across the table.
    pub key: String,
    pub app_id: u32,
    /// `None` for the global key.
    pub service_name: Option<String>,
    /// JSON-serialized scope list (see [`crate::scope::serialize_scopes`]).
    pub scopes: String,
}

impl ApiKeyRow {
    pub fn scopes(&self) -> AuthResult<Vec<Scope>> {
        deserialize_scopes(&self.scopes)
    }

    pub fn is_global(&self) -> bool {
        self.app_id == GLOBAL_APP_ID && self.service_name.is_none()
    }
}

/// Insert payload for [`super::KeyStore::insert`].
#[derive(Debug, Clone)]
pub struct NewApiKey {
    pub app_id: u32,
    pub service_name: Option<String>,
    pub key: String,
    pub scopes: String,
}
