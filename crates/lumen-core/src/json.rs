//! Typed access to JSON property bags passed to components.

use crate::error::LmError;
use anyhow::Result;
use serde::de::DeserializeOwned;

pub type Json = serde_json::Value;

/// Reads a required property.
pub fn value<T: DeserializeOwned>(prop: &Json, key: &str) -> Result<T> {
    match prop.get(key) {
        Some(v) => parse(v, key),
        None => Err(LmError::InvalidArgument(format!("missing property [{key}]")).into()),
    }
}

/// Reads an optional property, falling back to `default` when it is absent.
pub fn value_or<T: DeserializeOwned>(prop: &Json, key: &str, default: T) -> Result<T> {
    Ok(value_opt(prop, key)?.unwrap_or(default))
}

/// Reads an optional property. A present but `null` value counts as absent.
pub fn value_opt<T: DeserializeOwned>(prop: &Json, key: &str) -> Result<Option<T>> {
    match prop.get(key) {
        None | Some(Json::Null) => Ok(None),
        Some(v) => parse(v, key).map(Some),
    }
}

fn parse<T: DeserializeOwned>(v: &Json, key: &str) -> Result<T> {
    T::deserialize(v).map_err(|err| {
        LmError::InvalidArgument(format!("property [{key}] has unexpected type: {err}")).into()
    })
}
