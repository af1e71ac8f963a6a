//! Request schemas for the agent's administrative API.
//!
//! `force` on lifecycle actions defaults to the `lockOverride` setting when
//! the caller leaves it out (or sends a falsy value), so a device configured
//! to override update locks does so for API-triggered actions too.

use std::sync::Arc;

use axum::http::{Method, StatusCode};
use serde_json::{json, Value};

use super::decoder::{NonEmptyString, Optional, PositiveInt, StringEnum, Truthy};
use super::registry::{RouteRegistry, APP_ID_PARAM};
use super::request::{Location, ValidationRequest};
use super::schema::{
    Constant, DefaultStrategy, DefaultWhen, FieldSchema, Rejection, RouteSchema, SettingDefault,
};
use crate::config::SettingsSource;

pub const JOURNAL_FORMATS: &[&str] = &["short", "short-iso", "json", "json-pretty", "cat"];

/// "Missing app id" when absent, "Invalid app id: <raw>" otherwise.
fn app_id(location: Location) -> FieldSchema {
    FieldSchema::new(APP_ID_PARAM, location, PositiveInt)
        .message("Missing app id")
        .respond_with(move |req: &ValidationRequest| match req.field(location, APP_ID_PARAM) {
            None | Some(Value::Null) => Rejection {
                status: StatusCode::BAD_REQUEST,
                message: "Missing app id".into(),
            },
            Some(Value::String(raw)) => Rejection {
                status: StatusCode::BAD_REQUEST,
                message: format!("Invalid app id: {}", raw),
            },
            Some(raw) => Rejection {
                status: StatusCode::BAD_REQUEST,
                message: format!("Invalid app id: {}", raw),
            },
        })
}

fn force(settings: &Arc<dyn SettingsSource>) -> FieldSchema {
    FieldSchema::body("force", Truthy)
        .warn()
        .default_to(DefaultStrategy::new(
            DefaultWhen::Falsy,
            SettingDefault::new(settings.clone(), "lockOverride", json!(false)),
        ))
}

/// Either a service name or an image id identifies the target service.
fn service_target() -> Vec<FieldSchema> {
    vec![
        FieldSchema::body("serviceName", NonEmptyString)
            .message("Either serviceName or imageId must be given"),
        FieldSchema::body("imageId", PositiveInt)
            .message("Either serviceName or imageId must be given"),
    ]
}

fn app_action(settings: &Arc<dyn SettingsSource>) -> RouteSchema {
    RouteSchema::new()
        .require(app_id(Location::Params))
        .optional(force(settings))
}

fn service_action(settings: &Arc<dyn SettingsSource>) -> RouteSchema {
    RouteSchema::new()
        .require(app_id(Location::Params))
        .require_one_of(service_target())
        .optional(force(settings))
}

/// The route table, keyed by `(method, template)`.
pub fn default_registry(settings: Arc<dyn SettingsSource>) -> RouteRegistry {
    let s = &settings;

    RouteRegistry::builder()
        .app_id_prefix("/v1/apps")
        .app_id_prefix("/v2/applications")
        // v1
        .route(
            Method::POST,
            "/v1/restart",
            RouteSchema::new()
                .require(app_id(Location::Body))
                .optional(force(s)),
        )
        .route(Method::POST, "/v1/apps/:appId/stop", app_action(s))
        .route(Method::POST, "/v1/apps/:appId/start", app_action(s))
        .route(
            Method::GET,
            "/v1/apps/:appId",
            RouteSchema::new().require(app_id(Location::Params)),
        )
        .route(
            Method::POST,
            "/v1/update",
            RouteSchema::new()
                .optional(FieldSchema::body("force", Truthy).warn().default_to(
                    DefaultStrategy::new(DefaultWhen::MissingOrNull, Constant(json!(false))),
                ))
                .optional(FieldSchema::body("cancel", Optional(Truthy)).warn()),
        )
        .route(Method::POST, "/v1/regenerate-api-key", RouteSchema::new())
        // v2
        .route(Method::POST, "/v2/applications/:appId/restart", app_action(s))
        .route(Method::POST, "/v2/applications/:appId/purge", app_action(s))
        .route(
            Method::POST,
            "/v2/applications/:appId/restart-service",
            service_action(s),
        )
        .route(
            Method::POST,
            "/v2/applications/:appId/start-service",
            service_action(s),
        )
        .route(
            Method::POST,
            "/v2/applications/:appId/stop-service",
            service_action(s),
        )
        .route(
            Method::GET,
            "/v2/applications/:appId/state",
            RouteSchema::new().require(app_id(Location::Params)),
        )
        .route(
            Method::POST,
            "/v2/journal-logs",
            RouteSchema::new()
                .optional(FieldSchema::body("follow", Optional(Truthy)).warn())
                .optional(FieldSchema::body("all", Optional(Truthy)).warn())
                .optional(FieldSchema::body("count", Optional(PositiveInt)).warn())
                .optional(FieldSchema::body("unit", Optional(NonEmptyString)))
                .optional(
                    FieldSchema::body("format", StringEnum(JOURNAL_FORMATS))
                        .warn()
                        .default_to(DefaultStrategy::new(
                            DefaultWhen::MissingOrNull,
                            Constant(json!("short")),
                        )),
                ),
        )
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AgentConfig;
    use crate::diagnostics::recording::RecordingSink;
    use crate::validation::engine::{Outcome, ValidationEngine};

    fn engine(lock_override: bool) -> (ValidationEngine, Arc<RecordingSink>) {
        let mut config = AgentConfig::default();
        config.lock_override = lock_override;
        let sink = Arc::new(RecordingSink::default());
        let engine = ValidationEngine::new(
            Arc::new(default_registry(Arc::new(config))),
            sink.clone(),
        );
        (engine, sink)
    }

    fn values(outcome: Outcome) -> crate::validation::ValidatedValues {
        match outcome {
            Outcome::Validated(values) => values,
            other => panic!("expected Validated, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn v1_restart_requires_body_app_id() {
        let (engine, _) = engine(false);

        let mut req = ValidationRequest::new(Method::POST, "/v1/restart").with_body(json!({}));
        assert_eq!(
            engine.validate(&mut req).await,
            Outcome::Rejected {
                status: StatusCode::BAD_REQUEST,
                message: "Missing app id".into(),
            }
        );

        let mut req =
            ValidationRequest::new(Method::POST, "/v1/restart").with_body(json!({"appId": "x1"}));
        assert_eq!(
            engine.validate(&mut req).await,
            Outcome::Rejected {
                status: StatusCode::BAD_REQUEST,
                message: "Invalid app id: x1".into(),
            }
        );
    }

    #[tokio::test]
    async fn force_defaults_to_lock_override() {
        for lock_override in [false, true] {
            let (engine, _) = engine(lock_override);
            let mut req = ValidationRequest::new(Method::POST, "/v2/applications/5/restart");
            let values = values(engine.validate(&mut req).await);
            assert_eq!(values.get_u32("appId"), Some(5));
            assert_eq!(values.get_bool("force"), Some(lock_override));
        }
    }

    #[tokio::test]
    async fn explicit_force_beats_setting() {
        let (engine, _) = engine(false);
        let mut req = ValidationRequest::new(Method::POST, "/v1/apps/5/stop")
            .with_body(json!({"force": "true"}));
        assert_eq!(values(engine.validate(&mut req).await).get_bool("force"), Some(true));
    }

    #[tokio::test]
    async fn service_actions_need_a_target() {
        let (engine, _) = engine(false);

        let mut req = ValidationRequest::new(Method::POST, "/v2/applications/5/stop-service")
            .with_body(json!({"imageId": 42}));
        let v = values(engine.validate(&mut req).await);
        assert_eq!(v.get_u32("imageId"), Some(42));

        let mut req = ValidationRequest::new(Method::POST, "/v2/applications/5/stop-service")
            .with_body(json!({}));
        assert_eq!(
            engine.validate(&mut req).await,
            Outcome::Rejected {
                status: StatusCode::BAD_REQUEST,
                message: "Either serviceName or imageId must be given".into(),
            }
        );
    }

    #[tokio::test]
    async fn bad_path_app_id_rejected_before_service_check() {
        let (engine, _) = engine(false);
        let mut req = ValidationRequest::new(Method::POST, "/v2/applications/zero/restart-service")
            .with_body(json!({}));
        assert_eq!(
            engine.validate(&mut req).await,
            Outcome::Rejected {
                status: StatusCode::BAD_REQUEST,
                message: "Invalid app id: zero".into(),
            }
        );
    }

    #[tokio::test]
    async fn journal_logs_warns_and_defaults() {
        let (engine, sink) = engine(false);
        let mut req = ValidationRequest::new(Method::POST, "/v2/journal-logs")
            .with_body(json!({"count": "many", "follow": true}));

        let v = values(engine.validate(&mut req).await);

        assert_eq!(v.get_bool("follow"), Some(true));
        assert_eq!(v.get_str("format"), Some("short"));
        assert!(!v.contains("count"));
        assert_eq!(v.get("all"), Some(&Value::Null));
        assert_eq!(sink.warnings().len(), 1);
    }

    #[tokio::test]
    async fn update_without_fields_does_not_warn() {
        let (engine, sink) = engine(false);
        let mut req = ValidationRequest::new(Method::POST, "/v1/update").with_body(json!({}));
        let v = values(engine.validate(&mut req).await);
        assert_eq!(v.get_bool("force"), Some(false));
        assert_eq!(v.get_bool("cancel"), None);
        assert!(sink.warnings().is_empty());
    }

    #[tokio::test]
    async fn regenerate_key_route_is_registered_without_fields() {
        let (engine, _) = engine(false);
        let mut req = ValidationRequest::new(Method::POST, "/v1/regenerate-api-key");
        assert!(values(engine.validate(&mut req).await).is_empty());
    }

    #[tokio::test]
    async fn unknown_route_is_not_validated() {
        let (engine, _) = engine(false);
        let mut req = ValidationRequest::new(Method::POST, "/v1/blink");
        assert_eq!(engine.validate(&mut req).await, Outcome::Unvalidated);
    }
}
