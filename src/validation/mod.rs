//! Declarative per-route request validation.
//!
//! Each route of the administrative API registers a [`RouteSchema`] listing
//! its required checks and optional fields. The [`ValidationEngine`] decodes
//! those fields from the body, query string and path, applies defaults, and
//! either rejects the request or hands the decoded values to the handler.
//! Routes without a schema pass through untouched.

pub mod decoder;
pub mod engine;
pub mod registry;
pub mod request;
pub mod routes;
pub mod schema;

pub use decoder::{
    BooleanStrict, DecodeResult, Decoder, NonEmptyString, Optional, PositiveInt, StringEnum, Truthy,
};
pub use engine::{Outcome, ValidationEngine};
pub use registry::{RouteRegistry, RouteRegistryBuilder, APP_ID_PARAM, APP_ID_PLACEHOLDER};
pub use request::{Location, ValidatedValues, ValidationRequest};
pub use schema::{
    Check, Constant, DefaultProvider, DefaultStrategy, DefaultWhen, FieldSchema, Rejection,
    RouteSchema, SettingDefault,
};
