//! Key issuance: create, reuse, or rotate the API key of an
//! `(app_id, service_name)` pair, and look keys up for the request gate.
//!
//! At most one key exists per pair under normal operation. Asking for a key
//! with the scopes the pair already has returns the existing secret. Asking
//! with different scopes, or with `force`, deletes the old row and issues a
//! new secret. There is no incremental scope patching.
//!
//! Two concurrent rotations of the same pair are not reconciled here: the
//! last writer wins. Callers needing exactly-once rotation hold the agent's
//! update lock around the call.

use std::sync::{Arc, RwLock};

use super::cache::KeyCache;
use super::secret::SecretGenerator;
use super::store::KeyStore;
use super::types::{ApiKeyRow, NewApiKey, GLOBAL_APP_ID};
use crate::error::{AuthError, AuthResult};
use crate::scope::{serialize_scopes, Scope};

pub struct KeyIssuer {
    cache: KeyCache,
    secrets: Arc<dyn SecretGenerator>,
    global_key: RwLock<Option<String>>,
}

impl KeyIssuer {
    pub fn new(cache: KeyCache, secrets: Arc<dyn SecretGenerator>) -> Self {
        KeyIssuer {
            cache,
            secrets,
            global_key: RwLock::new(None),
        }
    }

    pub fn cache(&self) -> &KeyCache {
        &self.cache
    }

    fn store(&self) -> &Arc<dyn KeyStore> {
        self.cache.store()
    }

    /// Issue a key for `(app_id, service_name)` or reuse the existing one.
    ///
    /// Returns the existing secret when a key exists, `force` is false and
    /// its scopes match `scopes`. Otherwise rotates.
    pub async fn issue_or_reuse(
        &self,
        app_id: u32,
        service_name: Option<&str>,
        scopes: &[Scope],
        force: bool,
    ) -> AuthResult<String> {
        let existing = self.cache.get_rows(app_id, service_name).await?;

        if !force {
            if let Some(current) = existing.first() {
                let current_scopes = current.scopes()?;
                if same_scopes(scopes, &current_scopes) {
                    log::debug!(
                        "AUDIT action=key_reuse app_id={} service={}",
                        app_id,
                        service_name.unwrap_or("-")
                    );
                    return Ok(current.key.clone());
                }
                log::info!(
                    "Scope drift for app_id={} service={}; rotating key",
                    app_id,
                    service_name.unwrap_or("-")
                );
            }
        }

        self.rotate(app_id, service_name, scopes, &existing).await
    }

    async fn rotate(
        &self,
        app_id: u32,
        service_name: Option<&str>,
        scopes: &[Scope],
        existing: &[ApiKeyRow],
    ) -> AuthResult<String> {
        if !existing.is_empty() {
            self.store().delete(app_id, service_name).await?;
        }
        for row in existing {
            self.cache.invalidate_secret(&row.key);
        }
        self.cache.invalidate_owner(app_id, service_name);

        let secret = self.secrets.new_secret()?;
        self.store()
            .insert(NewApiKey {
                app_id,
                service_name: service_name.map(String::from),
                key: secret.clone(),
                scopes: serialize_scopes(scopes)?,
            })
            .await?;

        if app_id == GLOBAL_APP_ID && service_name.is_none() {
            self.set_global_key(secret.clone());
        }

        log::info!(
            "AUDIT action={} app_id={} service={} scopes={}",
            if existing.is_empty() { "key_issue" } else { "key_rotate" },
            app_id,
            service_name.unwrap_or("-"),
            scopes.len()
        );

        Ok(secret)
    }

    /// The full row for `secret`, if it is a known key.
    pub async fn lookup(&self, secret: &str) -> AuthResult<Option<ApiKeyRow>> {
        self.cache.get_row(secret).await
    }

    /// Scopes held by `secret`, or `None` if the key is unknown.
    pub async fn lookup_scopes(&self, secret: &str) -> AuthResult<Option<Vec<Scope>>> {
        match self.lookup(secret).await? {
            Some(row) => Ok(Some(row.scopes()?)),
            None => Ok(None),
        }
    }

    /// Replace `secret` with a new one holding the same scopes.
    pub async fn refresh(&self, secret: &str) -> AuthResult<String> {
        let row = self.lookup(secret).await?.ok_or(AuthError::KeyNotFound)?;

        let new_secret = if row.is_global() {
            self.issue_or_reuse(GLOBAL_APP_ID, None, &[Scope::Global], true)
                .await?
        } else {
            let scopes = row.scopes()?;
            self.issue_or_reuse(row.app_id, row.service_name.as_deref(), &scopes, true)
                .await?
        };

        log::info!(
            "AUDIT action=key_refresh app_id={} service={}",
            row.app_id,
            row.service_name.as_deref().unwrap_or("-")
        );
        Ok(new_secret)
    }

    /// Create (or pick up) the global key. Must complete after the store is
    /// open and before anything calls [`KeyIssuer::global_key`].
    pub async fn initialize_global(&self) -> AuthResult<String> {
        let secret = self
            .issue_or_reuse(GLOBAL_APP_ID, None, &[Scope::Global], false)
            .await?;
        self.set_global_key(secret.clone());
        Ok(secret)
    }

    /// The current global key.
    pub fn global_key(&self) -> AuthResult<String> {
        self.global_key
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or(AuthError::GlobalKeyUninitialized)
    }

    fn set_global_key(&self, secret: String) {
        let mut slot = self.global_key.write().unwrap_or_else(|e| e.into_inner());
        *slot = Some(secret);
    }
}

/// Reuse check: equal length and every desired scope present among the
/// current ones. Matches set equality only for duplicate-free lists.
fn same_scopes(desired: &[Scope], current: &[Scope]) -> bool {
    desired.len() == current.len() && desired.iter().all(|s| current.contains(s))
}
