//! Point-in-time reconstruction of an asset.
//!
//! Reconstruction walks from the asset's `In` anchor along `hasVersion` edges
//! and keeps the versions whose `[createdAt, expiredAt)` window contains the
//! requested instant. Three outcomes are distinguished:
//!
//! - `Ok(None)`: the instant precedes the asset's first version,
//! - `Ok(Some(_))`: exactly one version matched,
//! - `Err(ReconstructionConflict)`: zero or several versions matched at an
//!   instant the asset existed, which means the chain is corrupt.

use crate::chain::{AssetChain, VersionVertex};
use crate::error::{Result, TimegraphError};
use crate::ids::{AssetKind, DocKey};
use crate::payload::Payload;
use crate::snapshot::AssetRecord;
use crate::time::{Timestamp, Validity};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionSnapshot {
    pub asset: DocKey,
    pub kind: AssetKind,
    pub version: DocKey,
    pub payload: Payload,
    pub validity: Validity,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TimeTravelReconstructor;

impl TimeTravelReconstructor {
    pub fn state_at(chain: &AssetChain, at: Timestamp) -> Result<Option<VersionSnapshot>> {
        let reachable = chain
            .outbound(&chain.proxy_in().key)
            .filter_map(|edge| chain.version(&edge.to.key));
        Self::select(chain.asset_key(), chain.kind(), reachable, at)
    }

    /// Same traversal over an exported/snapshotted asset.
    pub fn state_at_record(record: &AssetRecord, at: Timestamp) -> Result<Option<VersionSnapshot>> {
        let reachable = record
            .has_version
            .iter()
            .filter(|edge| edge.from.key == record.proxy_in.key)
            .filter_map(|edge| record.versions.iter().find(|v| v.key == edge.to.key));
        Self::select(record.asset_key(), record.kind, reachable, at)
    }

    fn select<'a>(
        asset: &DocKey,
        kind: AssetKind,
        reachable: impl Iterator<Item = &'a VersionVertex>,
        at: Timestamp,
    ) -> Result<Option<VersionSnapshot>> {
        let mut first_created: Option<Timestamp> = None;
        let mut matches: Vec<&VersionVertex> = Vec::new();
        for version in reachable {
            let created = version.validity.created_at;
            first_created = Some(first_created.map_or(created, |t| t.min(created)));
            if version.validity.contains(at) {
                matches.push(version);
            }
        }

        let conflict = |matches: usize| TimegraphError::ReconstructionConflict {
            asset: asset.clone(),
            at,
            matches,
        };
        let Some(first_created) = first_created else {
            return Err(conflict(0));
        };
        if at < first_created {
            return Ok(None);
        }
        match matches.as_slice() {
            [version] => Ok(Some(VersionSnapshot {
                asset: asset.clone(),
                kind,
                version: version.key.clone(),
                payload: version.payload.clone(),
                validity: version.validity,
            })),
            other => Err(conflict(other.len())),
        }
    }
}
