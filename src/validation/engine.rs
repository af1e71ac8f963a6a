//! Per-request decode pipeline.
//!
//! Every check of a route is decoded concurrently against the same request
//! snapshot, then results are applied strictly in declaration order:
//! required checks first, then optional fields. The first failing required
//! check rejects the request and nothing declared after it is applied, no
//! matter which decode finished first.

use std::sync::Arc;

use axum::http::StatusCode;
use futures_util::future::join_all;
use serde_json::Value;

use super::registry::RouteRegistry;
use super::request::{ValidatedValues, ValidationRequest};
use super::schema::{Check, FieldSchema};
use crate::diagnostics::DiagnosticSink;

/// Terminal state of one request's validation.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// No schema registered for the route; the request passes through.
    Unvalidated,
    Validated(ValidatedValues),
    Rejected { status: StatusCode, message: String },
}

/// One entry of the ordered check list.
#[derive(Clone, Copy)]
enum Pending<'s> {
    Field {
        field: &'s FieldSchema,
        required: bool,
    },
    OneOf {
        first: &'s FieldSchema,
        alternatives: &'s [FieldSchema],
    },
}

impl Pending<'_> {
    fn is_required(&self) -> bool {
        match self {
            Pending::Field { required, .. } => *required,
            Pending::OneOf { .. } => true,
        }
    }
}

type Decoded<'s> = Result<(&'s FieldSchema, Value), (&'s FieldSchema, Vec<String>)>;

pub struct ValidationEngine {
    registry: Arc<RouteRegistry>,
    sink: Arc<dyn DiagnosticSink>,
}

impl ValidationEngine {
    pub fn new(registry: Arc<RouteRegistry>, sink: Arc<dyn DiagnosticSink>) -> Self {
        ValidationEngine { registry, sink }
    }

    pub fn registry(&self) -> &RouteRegistry {
        &self.registry
    }

    /// Resolve the route schema and run it against `request`.
    ///
    /// Resolution writes the path's application id into `request.params`.
    pub async fn validate(&self, request: &mut ValidationRequest) -> Outcome {
        let Some(schema) = self.registry.resolve(request) else {
            return Outcome::Unvalidated;
        };
        let request: &ValidationRequest = request;

        // `require_one_of` refuses empty groups, so none are dropped here.
        let checks: Vec<Pending<'_>> = schema
            .required
            .iter()
            .filter_map(|check| match check {
                Check::Field(field) => Some(Pending::Field {
                    field,
                    required: true,
                }),
                Check::OneOf(alternatives) => {
                    alternatives.first().map(|first| Pending::OneOf {
                        first,
                        alternatives,
                    })
                }
            })
            .chain(schema.optional.iter().map(|field| Pending::Field {
                field,
                required: false,
            }))
            .collect();

        let decoded = join_all(checks.iter().map(|&check| decode_check(check, request))).await;

        let mut values = ValidatedValues::default();
        for (check, result) in checks.iter().zip(decoded) {
            match result {
                Ok((field, value)) => values.insert(field.name.clone(), value),
                Err((field, messages)) if field.warn => {
                    self.sink.warn(&warning_message(request, field, messages));
                }
                Err((field, _)) if check.is_required() => {
                    let rejection = field.rejection(request);
                    self.sink.debug(&format!(
                        "Rejected {} {}: {} ({})",
                        request.method, request.path, rejection.message, rejection.status
                    ));
                    return Outcome::Rejected {
                        status: rejection.status,
                        message: rejection.message,
                    };
                }
                // Optional and not warned about: the raw value stays as sent
                // and nothing is stored.
                Err(_) => {}
            }
        }

        Outcome::Validated(values)
    }
}

async fn decode_check<'s>(check: Pending<'s>, request: &ValidationRequest) -> Decoded<'s> {
    match check {
        Pending::Field { field, .. } => decode_field(field, request).await,
        Pending::OneOf {
            first,
            alternatives,
        } => {
            let mut first_failure = None;
            for field in alternatives {
                match decode_field(field, request).await {
                    Ok(decoded) => return Ok(decoded),
                    Err(failure) => {
                        first_failure.get_or_insert(failure);
                    }
                }
            }
            Err(first_failure.unwrap_or((first, Vec::new())))
        }
    }
}

/// Default the raw value if the field's strategy says so, then decode it.
/// A field without a default decodes the raw value as-is, absent or not.
async fn decode_field<'s>(field: &'s FieldSchema, request: &ValidationRequest) -> Decoded<'s> {
    let raw = field.raw(request);

    let result = match &field.default {
        Some(strategy) if strategy.should_default(raw) => {
            match strategy.provider.provide(request).await {
                Ok(value) => field.decoder.decode(Some(&value)),
                Err(message) => Err(vec![message]),
            }
        }
        _ => field.decoder.decode(raw),
    };

    result
        .map(|value| (field, value))
        .map_err(|messages| (field, messages))
}

/// One warning line per failed field: the de-duplicated decode messages, or
/// the schema's static message when the decoder gave none.
fn warning_message(request: &ValidationRequest, field: &FieldSchema, messages: Vec<String>) -> String {
    let mut unique: Vec<String> = Vec::with_capacity(messages.len());
    for message in messages {
        if !unique.contains(&message) {
            unique.push(message);
        }
    }
    let detail = if unique.is_empty() {
        field.message.clone()
    } else {
        unique.join("; ")
    };
    format!(
        "Ignoring invalid {} field '{}' on {} {}: {}",
        field.location, field.name, request.method, request.path, detail
    )
}
