//! Field decoders.
//!
//! A decoder turns a raw request value (or its absence) into a typed JSON
//! value, or explains why it can't. Decoders are pure; they see only the raw
//! value, never the rest of the request.

use serde_json::Value;

/// `Ok(decoded)` or `Err(messages)`.
pub type DecodeResult = Result<Value, Vec<String>>;

pub trait Decoder: Send + Sync {
    fn decode(&self, raw: Option<&Value>) -> DecodeResult;
}

impl<F> Decoder for F
where
    F: Fn(Option<&Value>) -> DecodeResult + Send + Sync,
{
    fn decode(&self, raw: Option<&Value>) -> DecodeResult {
        self(raw)
    }
}

fn missing() -> Vec<String> {
    vec!["value is missing".into()]
}

fn describe(value: &Value) -> String {
    match value {
        Value::String(s) => format!("'{}'", s),
        other => other.to_string(),
    }
}

/// A positive integer that fits in `u32`, given as a number or a decimal
/// string. Path parameters always arrive as strings.
#[derive(Debug, Default, Clone, Copy)]
pub struct PositiveInt;

impl Decoder for PositiveInt {
    fn decode(&self, raw: Option<&Value>) -> DecodeResult {
        let raw = raw.ok_or_else(missing)?;
        let parsed = match raw {
            Value::Number(n) => n.as_u64(),
            Value::String(s) if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) => {
                s.parse::<u64>().ok()
            }
            _ => None,
        };
        match parsed.and_then(|n| u32::try_from(n).ok()) {
            Some(n) if n > 0 => Ok(Value::from(n)),
            _ => Err(vec![format!(
                "expected a positive integer, got {}",
                describe(raw)
            )]),
        }
    }
}

/// A string with at least one non-whitespace character.
#[derive(Debug, Default, Clone, Copy)]
pub struct NonEmptyString;

impl Decoder for NonEmptyString {
    fn decode(&self, raw: Option<&Value>) -> DecodeResult {
        match raw.ok_or_else(missing)? {
            Value::String(s) if !s.trim().is_empty() => Ok(Value::String(s.clone())),
            other => Err(vec![format!(
                "expected a non-empty string, got {}",
                describe(other)
            )]),
        }
    }
}

/// Lenient boolean: `true`/`false`, `1`/`0`, and the strings
/// `"true"`, `"1"`, `"on"` / `"false"`, `"0"`, `"off"`.
#[derive(Debug, Default, Clone, Copy)]
pub struct Truthy;

impl Decoder for Truthy {
    fn decode(&self, raw: Option<&Value>) -> DecodeResult {
        let raw = raw.ok_or_else(missing)?;
        let parsed = match raw {
            Value::Bool(b) => Some(*b),
            Value::Number(n) => match n.as_u64() {
                Some(1) => Some(true),
                Some(0) => Some(false),
                _ => None,
            },
            Value::String(s) => match s.to_ascii_lowercase().as_str() {
                "true" | "1" | "on" => Some(true),
                "false" | "0" | "off" => Some(false),
                _ => None,
            },
            _ => None,
        };
        parsed
            .map(Value::Bool)
            .ok_or_else(|| vec![format!("expected a boolean, got {}", describe(raw))])
    }
}

/// Only a JSON `true` or `false`.
#[derive(Debug, Default, Clone, Copy)]
pub struct BooleanStrict;

impl Decoder for BooleanStrict {
    fn decode(&self, raw: Option<&Value>) -> DecodeResult {
        match raw.ok_or_else(missing)? {
            Value::Bool(b) => Ok(Value::Bool(*b)),
            other => Err(vec![format!("expected true or false, got {}", describe(other))]),
        }
    }
}

/// One of a fixed set of strings.
#[derive(Debug, Clone)]
pub struct StringEnum(pub &'static [&'static str]);

impl Decoder for StringEnum {
    fn decode(&self, raw: Option<&Value>) -> DecodeResult {
        match raw.ok_or_else(missing)? {
            Value::String(s) if self.0.contains(&s.as_str()) => Ok(Value::String(s.clone())),
            other => Err(vec![format!(
                "expected one of [{}], got {}",
                self.0.join(", "),
                describe(other)
            )]),
        }
    }
}

/// For fields that may be left out: absence and `null` decode to `null`,
/// anything else goes to the inner decoder.
#[derive(Debug, Default, Clone, Copy)]
pub struct Optional<D>(pub D);

impl<D: Decoder> Decoder for Optional<D> {
    fn decode(&self, raw: Option<&Value>) -> DecodeResult {
        match raw {
            None | Some(Value::Null) => Ok(Value::Null),
            Some(value) => self.0.decode(Some(value)),
        }
    }
}
