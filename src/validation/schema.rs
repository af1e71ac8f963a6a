use std::sync::Arc;

use async_trait::async_trait;
use axum::http::StatusCode;
use serde_json::Value;

use super::decoder::Decoder;
use super::request::{Location, ValidationRequest};
use crate::config::SettingsSource;

// ── Defaults ───────────────────────────────────────────────────

/// When the raw value of an optional field is replaced by its default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultWhen {
    /// Field absent.
    Missing,
    /// Field absent or `null`.
    MissingOrNull,
    /// Field absent, `null`, `false`, `0` or `""`.
    Falsy,
}

impl DefaultWhen {
    pub fn matches(&self, raw: Option<&Value>) -> bool {
        match (self, raw) {
            (_, None) => true,
            (DefaultWhen::Missing, Some(_)) => false,
            (DefaultWhen::MissingOrNull, Some(v)) => v.is_null(),
            (DefaultWhen::Falsy, Some(v)) => is_falsy(v),
        }
    }
}

fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(_) | Value::Object(_) => false,
    }
}

/// Produces a default value, possibly by asking another subsystem.
#[async_trait]
pub trait DefaultProvider: Send + Sync {
    async fn provide(&self, request: &ValidationRequest) -> Result<Value, String>;
}

/// A fixed default.
pub struct Constant(pub Value);

#[async_trait]
impl DefaultProvider for Constant {
    async fn provide(&self, _request: &ValidationRequest) -> Result<Value, String> {
        Ok(self.0.clone())
    }
}

/// Default read from agent settings, e.g. `lockOverride` for `force`.
pub struct SettingDefault {
    source: Arc<dyn SettingsSource>,
    key: &'static str,
    fallback: Value,
}

impl SettingDefault {
    pub fn new(source: Arc<dyn SettingsSource>, key: &'static str, fallback: Value) -> Self {
        SettingDefault {
            source,
            key,
            fallback,
        }
    }
}

#[async_trait]
impl DefaultProvider for SettingDefault {
    async fn provide(&self, _request: &ValidationRequest) -> Result<Value, String> {
        Ok(self
            .source
            .get(self.key)
            .await
            .unwrap_or_else(|| self.fallback.clone()))
    }
}

/// `when` decides whether to default; `provider` supplies the value.
#[derive(Clone)]
pub struct DefaultStrategy {
    pub when: DefaultWhen,
    pub provider: Arc<dyn DefaultProvider>,
}

impl DefaultStrategy {
    pub fn new(when: DefaultWhen, provider: impl DefaultProvider + 'static) -> Self {
        DefaultStrategy {
            when,
            provider: Arc::new(provider),
        }
    }

    pub fn should_default(&self, raw: Option<&Value>) -> bool {
        self.when.matches(raw)
    }
}

// ── Rejection ──────────────────────────────────────────────────

/// Status and message written back when a required field fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub status: StatusCode,
    pub message: String,
}

type ResponderFn = dyn Fn(&ValidationRequest) -> Rejection + Send + Sync;

// ── FieldSchema ────────────────────────────────────────────────

#[derive(Clone)]
pub struct FieldSchema {
    pub name: String,
    pub location: Location,
    pub decoder: Arc<dyn Decoder>,
    pub default: Option<DefaultStrategy>,
    pub warn: bool,
    /// Used when decoding fails without messages, and by the default responder.
    pub message: String,
    responder: Option<Arc<ResponderFn>>,
}

impl FieldSchema {
    pub fn new(name: &str, location: Location, decoder: impl Decoder + 'static) -> Self {
        FieldSchema {
            name: name.to_string(),
            location,
            decoder: Arc::new(decoder),
            default: None,
            warn: false,
            message: format!("Invalid {}", name),
            responder: None,
        }
    }

    pub fn body(name: &str, decoder: impl Decoder + 'static) -> Self {
        Self::new(name, Location::Body, decoder)
    }

    pub fn query(name: &str, decoder: impl Decoder + 'static) -> Self {
        Self::new(name, Location::Query, decoder)
    }

    pub fn param(name: &str, decoder: impl Decoder + 'static) -> Self {
        Self::new(name, Location::Params, decoder)
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn warn(mut self) -> Self {
        self.warn = true;
        self
    }

    pub fn default_to(mut self, strategy: DefaultStrategy) -> Self {
        self.default = Some(strategy);
        self
    }

    /// Compute the rejection from the request instead of the static
    /// `400 message`.
    pub fn respond_with<F>(mut self, responder: F) -> Self
    where
        F: Fn(&ValidationRequest) -> Rejection + Send + Sync + 'static,
    {
        self.responder = Some(Arc::new(responder));
        self
    }

    /// Raw value of this field in `request`.
    pub fn raw<'a>(&self, request: &'a ValidationRequest) -> Option<&'a Value> {
        request.field(self.location, &self.name)
    }

    pub fn rejection(&self, request: &ValidationRequest) -> Rejection {
        match &self.responder {
            Some(responder) => (responder.as_ref())(request),
            None => Rejection {
                status: StatusCode::BAD_REQUEST,
                message: self.message.clone(),
            },
        }
    }
}

impl std::fmt::Debug for FieldSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldSchema")
            .field("name", &self.name)
            .field("location", &self.location)
            .field("has_default", &self.default.is_some())
            .field("warn", &self.warn)
            .finish()
    }
}

// ── RouteSchema ────────────────────────────────────────────────

/// A required check: one field, or the first decodable of several.
#[derive(Debug, Clone)]
pub enum Check {
    Field(FieldSchema),
    OneOf(Vec<FieldSchema>),
}

/// Required checks and optional fields of one route, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct RouteSchema {
    pub(crate) required: Vec<Check>,
    pub(crate) optional: Vec<FieldSchema>,
}

impl RouteSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn require(mut self, field: FieldSchema) -> Self {
        self.required.push(Check::Field(field));
        self
    }

    /// Panics if `alternatives` is empty.
    pub fn require_one_of(mut self, alternatives: Vec<FieldSchema>) -> Self {
        assert!(!alternatives.is_empty(), "oneOf group needs at least one alternative");
        self.required.push(Check::OneOf(alternatives));
        self
    }

    pub fn optional(mut self, field: FieldSchema) -> Self {
        self.optional.push(field);
        self
    }
}
