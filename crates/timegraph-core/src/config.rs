//! Generator and tenant configuration.
//!
//! Parsed from JSON by callers; the core never touches the filesystem.
//!
//! ```json
//! {
//!   "seed": 7,
//!   "startAt": "2024-01-01T00:00:00Z",
//!   "historyDepth": 3,
//!   "mutationInterval": 3600,
//!   "tenants": [
//!     {
//!       "tenantId": "Acme Corp",
//!       "assetCounts": { "device": 20, "software": 5, "location": 2 },
//!       "namingConvention": "primary",
//!       "retentionWindow": 2592000
//!     }
//!   ]
//! }
//! ```

use crate::error::{Result, TimegraphError};
use crate::ids::{AssetKind, TenantId};
use crate::naming::NamingConvention;
use crate::time::Timestamp;
use crate::ttl::RetentionPolicy;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 2024-01-01T00:00:00Z
const DEFAULT_START_AT: i64 = 1_704_067_200;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TenantConfig {
    pub tenant_id: TenantId,
    #[serde(default)]
    pub asset_counts: BTreeMap<AssetKind, usize>,
    #[serde(default)]
    pub naming_convention: NamingConvention,
    /// Retention for retired entities, in timestamp ticks.
    pub retention_window: i64,
}

impl TenantConfig {
    pub fn new(tenant_id: impl Into<String>, retention_window: i64) -> Self {
        Self {
            tenant_id: TenantId::new(tenant_id),
            asset_counts: BTreeMap::new(),
            naming_convention: NamingConvention::default(),
            retention_window,
        }
    }

    pub fn with_count(mut self, kind: AssetKind, count: usize) -> Self {
        self.asset_counts.insert(kind, count);
        self
    }

    pub fn with_naming(mut self, naming: NamingConvention) -> Self {
        self.naming_convention = naming;
        self
    }

    pub fn count(&self, kind: AssetKind) -> usize {
        self.asset_counts.get(&kind).copied().unwrap_or(0)
    }

    pub fn retention_policy(&self) -> Result<RetentionPolicy> {
        RetentionPolicy::new(self.retention_window).map_err(|_| {
            TimegraphError::Config(format!(
                "tenant `{}`: retentionWindow must be positive, got {}",
                self.tenant_id, self.retention_window
            ))
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct GeneratorConfig {
    pub tenants: Vec<TenantConfig>,
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default = "default_start_at")]
    pub start_at: DateTime<Utc>,
    /// Configuration changes applied to every device and software asset.
    #[serde(default = "default_history_depth")]
    pub history_depth: usize,
    /// Ticks between two mutation rounds.
    #[serde(default = "default_mutation_interval")]
    pub mutation_interval: i64,
    #[serde(default = "default_relations_per_device")]
    pub relations_per_device: usize,
}

fn default_seed() -> u64 {
    42
}

fn default_start_at() -> DateTime<Utc> {
    DateTime::from_timestamp(DEFAULT_START_AT, 0).unwrap_or_default()
}

fn default_history_depth() -> usize {
    2
}

fn default_mutation_interval() -> i64 {
    3_600
}

fn default_relations_per_device() -> usize {
    1
}

impl GeneratorConfig {
    pub fn new(tenants: Vec<TenantConfig>) -> Self {
        Self {
            tenants,
            seed: default_seed(),
            start_at: default_start_at(),
            history_depth: default_history_depth(),
            mutation_interval: default_mutation_interval(),
            relations_per_device: default_relations_per_device(),
        }
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(raw)
            .map_err(|e| TimegraphError::Config(format!("malformed generator config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn start_timestamp(&self) -> Timestamp {
        Timestamp::from_datetime(self.start_at)
    }

    pub fn validate(&self) -> Result<()> {
        if self.tenants.is_empty() {
            return Err(TimegraphError::Config(
                "at least one tenant must be configured".to_string(),
            ));
        }
        if self.mutation_interval <= 0 {
            return Err(TimegraphError::Config(format!(
                "mutationInterval must be positive, got {}",
                self.mutation_interval
            )));
        }
        self.history_end()?;
        for tenant in &self.tenants {
            tenant.retention_policy()?;
        }
        Ok(())
    }

    /// Instant of the last mutation round. Must stay below the NEVER sentinel.
    pub fn history_end(&self) -> Result<Timestamp> {
        let start = self.start_timestamp().raw();
        i64::try_from(self.history_depth)
            .ok()
            .and_then(|depth| depth.checked_mul(self.mutation_interval))
            .and_then(|span| start.checked_add(span))
            .filter(|end| *end < i64::MAX)
            .map(Timestamp::new)
            .ok_or_else(|| {
                TimegraphError::Config(format!(
                    "historyDepth {} x mutationInterval {} from {} overflows the timeline",
                    self.history_depth, self.mutation_interval, start
                ))
            })
    }
}
