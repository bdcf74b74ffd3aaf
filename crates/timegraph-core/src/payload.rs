//! Business payloads carried by version vertices.

use crate::error::{Result, TimegraphError};
use crate::ids::AssetKind;
use crate::naming::fields;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Observed configuration of an asset, keyed by semantic field name.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Payload(BTreeMap<String, String>);

impl Payload {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(field, value);
        self
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.0.insert(field.into(), value.into())
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Schema completeness check for `kind`.
    ///
    /// Field names must be snake_case identifiers that every naming formatter
    /// renders to distinct spellings and must not shadow metadata fields.
    /// Every required field must carry a non-blank value.
    pub fn validate(&self, kind: AssetKind) -> Result<()> {
        let invalid = |reason: String| TimegraphError::InvalidPayload { kind, reason };

        for (field, _) in self.iter() {
            if !is_semantic_name(field) {
                return Err(invalid(format!("`{field}` is not a snake_case field name")));
            }
            if fields::RESERVED.contains(&field) {
                return Err(invalid(format!("`{field}` is a reserved metadata field")));
            }
        }

        for required in kind.required_fields() {
            match self.get(required) {
                None => return Err(invalid(format!("missing required field `{required}`"))),
                Some(value) if value.trim().is_empty() => {
                    return Err(invalid(format!("required field `{required}` is blank")))
                }
                Some(_) => {}
            }
        }
        Ok(())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Payload {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Every `_`-separated segment opens with a lowercase letter. `os_v_2` and
/// `os_v2` would otherwise both render as `osV2`.
fn is_semantic_name(field: &str) -> bool {
    field.split('_').all(|segment| {
        segment.starts_with(|c: char| c.is_ascii_lowercase())
            && segment.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
    })
}
