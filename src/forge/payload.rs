//! Accessors over forge JSON payloads.
//!
//! Paths are dotted (`repository.owner.login`). Required accessors fail with
//! [`Error::MissingField`]; the `opt_*` ones treat absence and `null` alike.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::{Error, Result};

fn lookup<'v>(value: &'v Value, path: &str) -> Option<&'v Value> {
    path.split('.')
        .try_fold(value, |v, key| v.get(key))
        .filter(|v| !v.is_null())
}

pub fn field<'v>(value: &'v Value, path: &str) -> Result<&'v Value> {
    lookup(value, path).ok_or_else(|| Error::MissingField(path.to_string()))
}

pub fn str_at<'v>(value: &'v Value, path: &str) -> Result<&'v str> {
    field(value, path)?
        .as_str()
        .ok_or_else(|| Error::MissingField(path.to_string()))
}

pub fn i64_at(value: &Value, path: &str) -> Result<i64> {
    field(value, path)?
        .as_i64()
        .ok_or_else(|| Error::MissingField(path.to_string()))
}

#[must_use]
pub fn opt_str<'v>(value: &'v Value, path: &str) -> Option<&'v str> {
    lookup(value, path).and_then(Value::as_str)
}

#[must_use]
pub fn opt_i64(value: &Value, path: &str) -> Option<i64> {
    lookup(value, path).and_then(Value::as_i64)
}

#[must_use]
pub fn opt_bool(value: &Value, path: &str) -> Option<bool> {
    lookup(value, path).and_then(Value::as_bool)
}

#[must_use]
pub fn opt_datetime(value: &Value, path: &str) -> Option<DateTime<Utc>> {
    opt_str(value, path)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}
