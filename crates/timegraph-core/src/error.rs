//! Error taxonomy for structural failures.
//!
//! Invariant violations found by the validator are *not* errors; they are
//! aggregated as data in [`crate::validator::ViolationReport`].

use crate::ids::{AssetKind, DocKey, PartitionKey, RelationKind, TenantId};
use crate::time::Timestamp;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TimegraphError {
    #[error("invalid {kind} payload: {reason}")]
    InvalidPayload { kind: AssetKind, reason: String },

    #[error("tenant `{tenant}` derives partition key `{partition}`, which is already registered")]
    DuplicatePartition {
        tenant: TenantId,
        partition: PartitionKey,
    },

    #[error("unknown tenant `{0}`")]
    UnknownTenant(TenantId),

    #[error("{collection} edge would connect partition `{from}` to partition `{to}`")]
    CrossTenantEdge {
        collection: &'static str,
        from: PartitionKey,
        to: PartitionKey,
    },

    #[error("asset `{asset}` has no current version")]
    NoCurrentVersion { asset: DocKey },

    #[error(
        "observation at {observed_at} for asset `{asset}` does not follow its current version (created at {current_created_at})"
    )]
    StaleMutation {
        asset: DocKey,
        observed_at: Timestamp,
        current_created_at: Timestamp,
    },

    #[error("observation at {observed_at} for asset `{asset}` lies after now ({now})")]
    FutureObservation {
        asset: DocKey,
        observed_at: Timestamp,
        now: Timestamp,
    },

    #[error("handle for asset `{asset}` names version `{held}`, but `{current}` is current")]
    OutdatedHandle {
        asset: DocKey,
        held: DocKey,
        current: DocKey,
    },

    #[error("unknown asset `{0}`")]
    UnknownAsset(DocKey),

    #[error("invalid {kind} relationship: {reason}")]
    InvalidRelation { kind: RelationKind, reason: String },

    #[error("unknown relationship edge `{0}`")]
    UnknownRelationship(DocKey),

    #[error("{matches} versions of asset `{asset}` are valid at {at}, expected exactly one")]
    ReconstructionConflict {
        asset: DocKey,
        at: Timestamp,
        matches: usize,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("dataset is not exportable: {0} integrity violation(s)")]
    NotExportable(usize),
}

pub type Result<T> = std::result::Result<T, TimegraphError>;
