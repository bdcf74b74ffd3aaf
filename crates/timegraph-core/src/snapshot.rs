//! Plain-data snapshots of tenant graphs.
//!
//! Snapshots are what the validator checks and what the exporter renders.
//! Fields are public: external tooling and tests may build
//! or edit them freely, and the validator trusts none of it.

use crate::chain::{ProxyAnchor, VersionVertex};
use crate::edge::Edge;
use crate::ids::{AssetKind, DocKey, PartitionKey, TenantId};
use crate::naming::NamingConvention;
use crate::time::Timestamp;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetRecord {
    pub kind: AssetKind,
    pub partition: PartitionKey,
    pub proxy_in: ProxyAnchor,
    pub proxy_out: ProxyAnchor,
    pub versions: Vec<VersionVertex>,
    pub has_version: Vec<Edge>,
}

impl AssetRecord {
    pub fn asset_key(&self) -> &DocKey {
        &self.proxy_in.key
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantSnapshot {
    pub tenant: TenantId,
    pub partition: PartitionKey,
    pub naming: NamingConvention,
    /// The tenant clock's "now" when the snapshot was taken.
    pub as_of: Timestamp,
    pub assets: Vec<AssetRecord>,
    pub relationships: Vec<Edge>,
}

impl TenantSnapshot {
    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.assets
            .iter()
            .flat_map(|a| a.has_version.iter())
            .chain(self.relationships.iter())
    }

    pub fn asset(&self, key: &DocKey) -> Option<&AssetRecord> {
        self.assets.iter().find(|a| a.asset_key() == key)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetSnapshot {
    pub tenants: Vec<TenantSnapshot>,
}

impl DatasetSnapshot {
    pub fn asset_count(&self) -> usize {
        self.tenants.iter().map(|t| t.assets.len()).sum()
    }

    pub fn edge_count(&self) -> usize {
        self.tenants.iter().map(|t| t.edges().count()).sum()
    }
}
