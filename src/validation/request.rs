use std::collections::HashMap;

use axum::http::Method;
use serde_json::{Map, Value};

/// Where a field is read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Location {
    Body,
    Query,
    Params,
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Location::Body => "body",
            Location::Query => "query",
            Location::Params => "params",
        })
    }
}

/// Immutable snapshot of an inbound request, as seen by field decoders.
///
/// `params` starts empty; route resolution fills in path identifiers.
#[derive(Debug, Clone)]
pub struct ValidationRequest {
    pub method: Method,
    pub path: String,
    pub body: Value,
    pub query: Map<String, Value>,
    pub params: Map<String, Value>,
}

impl ValidationRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        ValidationRequest {
            method,
            path: path.into(),
            body: Value::Null,
            query: Map::new(),
            params: Map::new(),
        }
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = body;
        self
    }

    pub fn with_query(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.query.insert(name.to_string(), value.into());
        self
    }

    /// Parse a raw `a=1&b=2` query string. Repeated names keep the last value.
    pub fn with_query_string(mut self, query: &str) -> Self {
        for (name, value) in url::form_urlencoded::parse(query.as_bytes()) {
            self.query
                .insert(name.into_owned(), Value::String(value.into_owned()));
        }
        self
    }

    /// Raw value of `name` at `location`, if present.
    pub fn field(&self, location: Location, name: &str) -> Option<&Value> {
        match location {
            Location::Body => self.body.as_object().and_then(|b| b.get(name)),
            Location::Query => self.query.get(name),
            Location::Params => self.params.get(name),
        }
    }
}

/// Decoded values, keyed by field name. Handlers read these instead of the
/// raw request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidatedValues {
    values: HashMap<String, Value>,
}

impl ValidatedValues {
    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn get_u32(&self, name: &str) -> Option<u32> {
        self.get(name)
            .and_then(Value::as_u64)
            .and_then(|n| u32::try_from(n).ok())
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(Value::as_bool)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
