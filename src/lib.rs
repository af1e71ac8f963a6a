pub mod api_keys;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod gate;
pub mod scope;
pub mod validation;

use std::path::Path;
use std::sync::Arc;

use axum::{middleware, Router};

use api_keys::{KeyCache, KeyIssuer, KeyStore, RandomSecrets, SqliteKeyStore};
use config::AgentConfig;
use diagnostics::LogSink;
use gate::{auth_middleware, validation_middleware, Gate, GateState};
use validation::{routes::default_registry, ValidationEngine};

pub use error::{AuthError, AuthResult};
pub use gate::AuthContext;
pub use scope::{Resources, Scope};
pub use validation::ValidatedValues;

/// Everything the agent's API server needs to authenticate and validate
/// requests, built from a data directory.
#[derive(Clone)]
pub struct AuthCore {
    pub config: AgentConfig,
    pub issuer: Arc<KeyIssuer>,
    pub engine: Arc<ValidationEngine>,
    pub gate: Arc<Gate>,
}

impl AuthCore {
    /// Load `config.json`, open the key database and make sure the global
    /// key exists.
    pub async fn init(data_dir: &Path) -> AuthResult<Self> {
        std::fs::create_dir_all(data_dir)?;
        let config = AgentConfig::load(data_dir)?;

        let store: Arc<dyn KeyStore> =
            Arc::new(SqliteKeyStore::open(&config.database_path(data_dir))?);
        let issuer = Arc::new(KeyIssuer::new(
            KeyCache::new(store, config.key_cache_ttl()),
            Arc::new(RandomSecrets),
        ));
        issuer.initialize_global().await?;

        let engine = Arc::new(ValidationEngine::new(
            Arc::new(default_registry(Arc::new(config.clone()))),
            Arc::new(LogSink),
        ));
        let gate = Arc::new(Gate::new(issuer.clone(), config.auth_required));

        log::info!(
            "Auth core ready (data_dir={}, auth_required={})",
            data_dir.display(),
            config.auth_required
        );

        Ok(AuthCore {
            config,
            issuer,
            engine,
            gate,
        })
    }

    pub fn state(&self) -> GateState {
        GateState {
            gate: self.gate.clone(),
            engine: self.engine.clone(),
            body_limit: self.config.body_limit_bytes,
        }
    }

    /// Wrap `router` with authentication and request validation.
    pub fn protect<S>(&self, router: Router<S>) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        let state = self.state();
        router
            .layer(middleware::from_fn_with_state(
                state.clone(),
                validation_middleware,
            ))
            .layer(middleware::from_fn_with_state(state, auth_middleware))
    }
}
