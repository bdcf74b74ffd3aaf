//! Field naming conventions.
//!
//! The core speaks in semantic snake_case field names (`serial_number`,
//! `ttl_expire_at`). A tenant picks one convention at configuration time and
//! the matching [`FieldFormatter`] is injected wherever documents or index
//! definitions are rendered. System attributes (`_key`, `_from`, `_fromType`,
//! ...) pass through untouched.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Semantic names of the metadata fields the core writes on every document.
pub mod fields {
    pub const KEY: &str = "_key";
    pub const FROM: &str = "_from";
    pub const TO: &str = "_to";
    pub const FROM_TYPE: &str = "_fromType";
    pub const TO_TYPE: &str = "_toType";
    pub const TENANT_ID: &str = "tenant_id";
    pub const CREATED_AT: &str = "created_at";
    pub const EXPIRED_AT: &str = "expired_at";
    pub const TTL_EXPIRE_AT: &str = "ttl_expire_at";

    /// Names a business payload may not use.
    pub const RESERVED: &[&str] = &[TENANT_ID, CREATED_AT, EXPIRED_AT, TTL_EXPIRE_AT];
}

pub trait FieldFormatter: Send + Sync + fmt::Debug {
    fn format(&self, field: &str) -> String;
}

/// `serial_number` → `serialNumber`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CamelCase;

/// `serialNumber` → `serial_number`; snake_case input is returned unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct SnakeCase;

impl FieldFormatter for CamelCase {
    fn format(&self, field: &str) -> String {
        if field.starts_with('_') {
            return field.to_string();
        }
        let mut out = String::with_capacity(field.len());
        let mut upper_next = false;
        for c in field.chars() {
            if c == '_' {
                upper_next = !out.is_empty();
            } else if upper_next {
                out.push(c.to_ascii_uppercase());
                upper_next = false;
            } else {
                out.push(c);
            }
        }
        out
    }
}

impl FieldFormatter for SnakeCase {
    fn format(&self, field: &str) -> String {
        if field.starts_with('_') {
            return field.to_string();
        }
        let mut out = String::with_capacity(field.len() + 4);
        for c in field.chars() {
            if c.is_ascii_uppercase() {
                if !out.is_empty() && !out.ends_with('_') {
                    out.push('_');
                }
                out.push(c.to_ascii_lowercase());
            } else {
                out.push(c);
            }
        }
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NamingConvention {
    /// camelCase attribute names.
    #[default]
    Primary,
    /// snake_case attribute names.
    Alternate,
}

impl NamingConvention {
    pub fn formatter(self) -> Arc<dyn FieldFormatter> {
        match self {
            NamingConvention::Primary => Arc::new(CamelCase),
            NamingConvention::Alternate => Arc::new(SnakeCase),
        }
    }
}
