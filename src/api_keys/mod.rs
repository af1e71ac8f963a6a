//! Scoped API keys for the agent's administrative API.
//!
//! Each application service gets its own key, scoped to its application. The
//! control plane holds a single global key. Requests present a key as
//! `Authorization: Bearer <key>` (or `?apikey=<key>`); the gate resolves it
//! through the [`KeyCache`] to the key's scopes.

pub mod cache;
pub mod secret;
pub mod service;
pub mod store;
pub mod types;

pub use cache::{KeyCache, TtlCache, KEY_CACHE_TTL, REGISTRY_TOKEN_TTL};
pub use secret::{RandomSecrets, SecretGenerator};
pub use service::KeyIssuer;
pub use store::{KeyStore, SqliteKeyStore};
pub use types::{ApiKeyRow, NewApiKey, GLOBAL_APP_ID};
