//! Tenant registry and partition-key derivation.
//!
//! Partition keys are derived deterministically from the tenant id, so two
//! runs over the same configuration produce the same keys. Collisions are
//! refused at registration time: the registry never holds two tenants that
//! resolve to the same partition.

use crate::error::{Result, TimegraphError};
use crate::ids::{PartitionKey, TenantId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const PARTITION_PREFIX: &str = "t-";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tenant {
    pub id: TenantId,
    pub partition: PartitionKey,
}

/// Derive the namespaced partition key for a tenant id.
///
/// ASCII alphanumerics are lowercased, every other run of characters becomes a
/// single `-`. `"Acme Corp"` and `"acme_corp"` therefore collide, which is the
/// point of checking at registration.
pub fn derive_partition_key(tenant: &TenantId) -> Result<PartitionKey> {
    let mut slug = String::with_capacity(tenant.as_str().len());
    let mut pending_dash = false;
    for c in tenant.as_str().chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    if slug.is_empty() {
        return Err(TimegraphError::Config(format!(
            "tenant id `{tenant}` contains no characters usable in a partition key"
        )));
    }
    Ok(PartitionKey::new(format!("{PARTITION_PREFIX}{slug}")))
}

#[derive(Debug, Clone, Default)]
pub struct TenantPartitioner {
    by_tenant: BTreeMap<TenantId, PartitionKey>,
    by_partition: BTreeMap<PartitionKey, TenantId>,
}

impl TenantPartitioner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tenant and return its partition key.
    ///
    /// Registering the same tenant twice is also a duplicate: partitions are
    /// handed out exactly once per run.
    pub fn register(&mut self, tenant: &TenantId) -> Result<PartitionKey> {
        let partition = derive_partition_key(tenant)?;
        if self.by_partition.contains_key(&partition) {
            return Err(TimegraphError::DuplicatePartition {
                tenant: tenant.clone(),
                partition,
            });
        }
        self.by_partition.insert(partition.clone(), tenant.clone());
        self.by_tenant.insert(tenant.clone(), partition.clone());
        Ok(partition)
    }

    pub fn partition_of(&self, tenant: &TenantId) -> Result<PartitionKey> {
        self.by_tenant
            .get(tenant)
            .cloned()
            .ok_or_else(|| TimegraphError::UnknownTenant(tenant.clone()))
    }

    pub fn tenant_of(&self, partition: &PartitionKey) -> Option<&TenantId> {
        self.by_partition.get(partition)
    }

    pub fn tenants(&self) -> impl Iterator<Item = Tenant> + '_ {
        self.by_tenant.iter().map(|(id, partition)| Tenant {
            id: id.clone(),
            partition: partition.clone(),
        })
    }

    pub fn len(&self) -> usize {
        self.by_tenant.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_tenant.is_empty()
    }
}
