//! Integrity gate for generated and mutated datasets.
//!
//! The validator is read-only and exhaustive: it never repairs, and it reports
//! one [`Violation`] per broken instance instead of stopping at the first. A
//! dataset is exportable only when [`ViolationReport::is_clean`] holds.
//!
//! Checked invariants:
//! 1. exactly one version per asset has `expiredAt == NEVER`
//! 2. versions are totally ordered by `createdAt` with disjoint windows
//! 3. every edge's endpoints (and the edge itself) share one partition
//!    and every asset and relationship belongs to the tenant it is filed under
//! 4. `_fromType`/`_toType` name the collection the endpoint actually lives in
//! 5. `ttlExpireAt` is present iff the entity is historical
//! 6. anchor keys are stable across snapshots ([`IntegrityValidator::validate_evolution`])
//!
//! plus the structural linkage every chain relies on (each version hangs off
//! its own anchors exactly once, `hasVersion` edges mirror their version).

use crate::edge::Edge;
use crate::ids::{Collection, DocKey, EdgeCollection, PartitionKey, VertexId, VertexRole};
use crate::snapshot::{AssetRecord, DatasetSnapshot, TenantSnapshot};
use crate::time::{Timestamp, Validity};
use ahash::{AHashMap, AHashSet};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Invariant {
    SingleCurrent,
    TemporalOrder,
    Disjointness,
    TypeTags,
    TtlLifecycle,
    StableAnchors,
    ChainLinkage,
    UniqueKeys,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeEnd {
    From,
    To,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "violation", rename_all = "snake_case")]
pub enum Violation {
    CurrentVersionCount {
        asset: DocKey,
        found: usize,
    },
    UnorderedVersions {
        asset: DocKey,
        earlier: DocKey,
        later: DocKey,
    },
    OverlappingWindows {
        asset: DocKey,
        earlier: DocKey,
        later: DocKey,
    },
    InvertedWindow {
        key: DocKey,
        created_at: Timestamp,
        expired_at: Timestamp,
    },
    ExpiryAfterSnapshot {
        key: DocKey,
        expired_at: Timestamp,
        as_of: Timestamp,
    },
    CrossPartitionEdge {
        edge: DocKey,
        from_partition: PartitionKey,
        to_partition: PartitionKey,
    },
    EdgePartitionMismatch {
        edge: DocKey,
        edge_partition: PartitionKey,
        endpoint_partition: PartitionKey,
    },
    ForeignVertex {
        asset: DocKey,
        key: DocKey,
        asset_partition: PartitionKey,
        vertex_partition: PartitionKey,
    },
    /// An asset or relationship filed under a tenant it does not belong to.
    ForeignTenant {
        tenant_partition: PartitionKey,
        key: DocKey,
        partition: PartitionKey,
    },
    MisfiledVertex {
        key: DocKey,
        expected: Collection,
        found: Collection,
    },
    TypeTagMismatch {
        edge: DocKey,
        end: EdgeEnd,
        tagged: String,
        actual: String,
    },
    DanglingEndpoint {
        edge: DocKey,
        end: EdgeEnd,
        target: VertexId,
    },
    TtlOnCurrent {
        key: DocKey,
    },
    MissingTtl {
        key: DocKey,
    },
    BrokenVersionLink {
        asset: DocKey,
        version: DocKey,
        inbound: usize,
        outbound: usize,
    },
    StrayVersionEdge {
        asset: DocKey,
        edge: DocKey,
    },
    EdgeWindowMismatch {
        edge: DocKey,
        version: DocKey,
    },
    RelationshipOffAnchor {
        edge: DocKey,
        end: EdgeEnd,
    },
    DuplicateKey {
        key: DocKey,
    },
    AnchorChanged {
        asset: DocKey,
        role: VertexRole,
        before: DocKey,
        after: DocKey,
    },
    VersionRewritten {
        asset: DocKey,
        version: DocKey,
    },
    VersionLost {
        asset: DocKey,
        version: DocKey,
    },
}

impl Violation {
    pub fn invariant(&self) -> Invariant {
        use Violation::*;
        match self {
            CurrentVersionCount { .. } => Invariant::SingleCurrent,
            UnorderedVersions { .. }
            | OverlappingWindows { .. }
            | InvertedWindow { .. }
            | ExpiryAfterSnapshot { .. } => Invariant::TemporalOrder,
            CrossPartitionEdge { .. }
            | EdgePartitionMismatch { .. }
            | ForeignVertex { .. }
            | ForeignTenant { .. } => Invariant::Disjointness,
            MisfiledVertex { .. } | TypeTagMismatch { .. } | DanglingEndpoint { .. } => {
                Invariant::TypeTags
            }
            TtlOnCurrent { .. } | MissingTtl { .. } => Invariant::TtlLifecycle,
            AnchorChanged { .. } | VersionRewritten { .. } | VersionLost { .. } => {
                Invariant::StableAnchors
            }
            BrokenVersionLink { .. }
            | StrayVersionEdge { .. }
            | EdgeWindowMismatch { .. }
            | RelationshipOffAnchor { .. } => Invariant::ChainLinkage,
            DuplicateKey { .. } => Invariant::UniqueKeys,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViolationReport {
    pub assets_checked: usize,
    pub edges_checked: usize,
    pub violations: Vec<Violation>,
}

impl ViolationReport {
    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn by_invariant(&self) -> BTreeMap<Invariant, usize> {
        let mut counts = BTreeMap::new();
        for v in &self.violations {
            *counts.entry(v.invariant()).or_insert(0) += 1;
        }
        counts
    }

    pub fn into_result(self) -> Result<(), Vec<Violation>> {
        if self.violations.is_empty() {
            Ok(())
        } else {
            Err(self.violations)
        }
    }
}

#[derive(Debug, Clone)]
struct VertexEntry {
    collection: Collection,
    partition: PartitionKey,
}

type VertexIndex = AHashMap<DocKey, VertexEntry>;

#[derive(Debug, Clone, Copy, Default)]
pub struct IntegrityValidator;

impl IntegrityValidator {
    pub fn validate(snapshot: &DatasetSnapshot) -> Result<(), Vec<Violation>> {
        Self::report(snapshot).into_result()
    }

    pub fn report(snapshot: &DatasetSnapshot) -> ViolationReport {
        let mut violations = Vec::new();
        let index = index_vertices(snapshot, &mut violations);
        check_edge_keys(snapshot, &mut violations);

        let per_tenant: Vec<Vec<Violation>> = snapshot
            .tenants
            .par_iter()
            .map(|tenant| check_tenant(tenant, &index))
            .collect();
        violations.extend(per_tenant.into_iter().flatten());

        let report = ViolationReport {
            assets_checked: snapshot.asset_count(),
            edges_checked: snapshot.edge_count(),
            violations,
        };
        if report.is_clean() {
            tracing::debug!(
                assets = report.assets_checked,
                edges = report.edges_checked,
                "dataset passed integrity checks"
            );
        } else {
            tracing::warn!(
                assets = report.assets_checked,
                edges = report.edges_checked,
                violations = report.violations.len(),
                "dataset failed integrity checks"
            );
        }
        report
    }

    /// Invariant 6 across two snapshots of the same dataset.
    ///
    /// Assets may disappear (deletion), but an asset that survives keeps both
    /// anchor keys, and every version it had keeps its key, `createdAt` and
    /// payload. A version that was historical in `before` must be unchanged.
    pub fn validate_evolution(
        before: &DatasetSnapshot,
        after: &DatasetSnapshot,
    ) -> Result<(), Vec<Violation>> {
        let mut by_in: AHashMap<&DocKey, &AssetRecord> = AHashMap::new();
        let mut by_out: AHashMap<&DocKey, &AssetRecord> = AHashMap::new();
        for asset in after.tenants.iter().flat_map(|t| t.assets.iter()) {
            by_in.insert(&asset.proxy_in.key, asset);
            by_out.insert(&asset.proxy_out.key, asset);
        }

        let mut violations = Vec::new();
        for old in before.tenants.iter().flat_map(|t| t.assets.iter()) {
            let Some(new) = by_in.get(&old.proxy_in.key) else {
                if let Some(moved) = by_out.get(&old.proxy_out.key) {
                    violations.push(Violation::AnchorChanged {
                        asset: old.asset_key().clone(),
                        role: VertexRole::ProxyIn,
                        before: old.proxy_in.key.clone(),
                        after: moved.proxy_in.key.clone(),
                    });
                }
                continue;
            };
            if new.proxy_out.key != old.proxy_out.key {
                violations.push(Violation::AnchorChanged {
                    asset: old.asset_key().clone(),
                    role: VertexRole::ProxyOut,
                    before: old.proxy_out.key.clone(),
                    after: new.proxy_out.key.clone(),
                });
            }
            for version in &old.versions {
                match new.versions.iter().find(|v| v.key == version.key) {
                    None => violations.push(Violation::VersionLost {
                        asset: old.asset_key().clone(),
                        version: version.key.clone(),
                    }),
                    Some(now) => {
                        let rewritten = now.validity.created_at != version.validity.created_at
                            || now.payload != version.payload
                            || (!version.is_current() && now.validity != version.validity);
                        if rewritten {
                            violations.push(Violation::VersionRewritten {
                                asset: old.asset_key().clone(),
                                version: version.key.clone(),
                            });
                        }
                    }
                }
            }
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(violations)
        }
    }
}

fn index_vertices(snapshot: &DatasetSnapshot, violations: &mut Vec<Violation>) -> VertexIndex {
    let mut index = VertexIndex::new();
    let mut insert = |key: &DocKey, collection: Collection, partition: &PartitionKey| {
        let entry = VertexEntry {
            collection,
            partition: partition.clone(),
        };
        if index.insert(key.clone(), entry).is_some() {
            violations.push(Violation::DuplicateKey { key: key.clone() });
        }
    };
    for asset in snapshot.tenants.iter().flat_map(|t| t.assets.iter()) {
        insert(&asset.proxy_in.key, asset.proxy_in.collection, &asset.proxy_in.partition);
        insert(&asset.proxy_out.key, asset.proxy_out.collection, &asset.proxy_out.partition);
        for version in &asset.versions {
            insert(&version.key, version.collection, &version.partition);
        }
    }
    index
}

fn check_edge_keys(snapshot: &DatasetSnapshot, violations: &mut Vec<Violation>) {
    let mut seen: AHashSet<&DocKey> = AHashSet::new();
    for edge in snapshot.tenants.iter().flat_map(|t| t.edges()) {
        if !seen.insert(&edge.key) {
            violations.push(Violation::DuplicateKey {
                key: edge.key.clone(),
            });
        }
    }
}

fn check_tenant(tenant: &TenantSnapshot, index: &VertexIndex) -> Vec<Violation> {
    let mut out = Vec::new();
    let check_owner = |key: &DocKey, partition: &PartitionKey, out: &mut Vec<Violation>| {
        if partition != &tenant.partition {
            out.push(Violation::ForeignTenant {
                tenant_partition: tenant.partition.clone(),
                key: key.clone(),
                partition: partition.clone(),
            });
        }
    };
    for asset in &tenant.assets {
        check_owner(asset.asset_key(), &asset.partition, &mut out);
        check_asset(asset, tenant.as_of, index, &mut out);
    }
    for edge in &tenant.relationships {
        check_owner(&edge.key, &edge.partition, &mut out);
        check_edge(edge, index, &mut out);
        check_lifecycle(&edge.key, edge.validity, edge.ttl_expire_at, tenant.as_of, &mut out);
        check_relationship_anchors(edge, index, &mut out);
    }
    out
}

fn check_asset(
    asset: &AssetRecord,
    as_of: Timestamp,
    index: &VertexIndex,
    out: &mut Vec<Violation>,
) {
    let asset_key = asset.asset_key();

    let mut check_home = |key: &DocKey,
                          expected: Collection,
                          found: Collection,
                          partition: &PartitionKey| {
        if expected != found {
            out.push(Violation::MisfiledVertex {
                key: key.clone(),
                expected,
                found,
            });
        }
        if partition != &asset.partition {
            out.push(Violation::ForeignVertex {
                asset: asset_key.clone(),
                key: key.clone(),
                asset_partition: asset.partition.clone(),
                vertex_partition: partition.clone(),
            });
        }
    };
    check_home(
        &asset.proxy_in.key,
        Collection::proxy_in(asset.kind),
        asset.proxy_in.collection,
        &asset.proxy_in.partition,
    );
    check_home(
        &asset.proxy_out.key,
        Collection::proxy_out(asset.kind),
        asset.proxy_out.collection,
        &asset.proxy_out.partition,
    );
    for version in &asset.versions {
        check_home(
            &version.key,
            Collection::version(asset.kind),
            version.collection,
            &version.partition,
        );
    }

    // 1. single current version
    let current = asset.versions.iter().filter(|v| v.is_current()).count();
    if current != 1 {
        out.push(Violation::CurrentVersionCount {
            asset: asset_key.clone(),
            found: current,
        });
    }

    // 2. total order, disjoint windows
    let mut ordered: Vec<_> = asset.versions.iter().collect();
    ordered.sort_by_key(|v| v.validity.created_at);
    for pair in ordered.windows(2) {
        let (earlier, later) = (pair[0], pair[1]);
        if earlier.validity.created_at == later.validity.created_at {
            out.push(Violation::UnorderedVersions {
                asset: asset_key.clone(),
                earlier: earlier.key.clone(),
                later: later.key.clone(),
            });
        } else if earlier.validity.overlaps(&later.validity) {
            out.push(Violation::OverlappingWindows {
                asset: asset_key.clone(),
                earlier: earlier.key.clone(),
                later: later.key.clone(),
            });
        }
    }

    for version in &asset.versions {
        check_lifecycle(&version.key, version.validity, version.ttl_expire_at, as_of, out);
    }

    check_linkage(asset, out);

    for edge in &asset.has_version {
        check_edge(edge, index, out);
        check_lifecycle(&edge.key, edge.validity, edge.ttl_expire_at, as_of, out);
    }
}

/// Each version hangs off this asset's anchors exactly once in each
/// direction, and every `hasVersion` edge mirrors the version it links.
fn check_linkage(asset: &AssetRecord, out: &mut Vec<Violation>) {
    let asset_key = asset.asset_key();
    let versions: AHashMap<&DocKey, _> = asset.versions.iter().map(|v| (&v.key, v)).collect();
    let mut inbound: AHashMap<&DocKey, usize> = AHashMap::new();
    let mut outbound: AHashMap<&DocKey, usize> = AHashMap::new();

    for edge in &asset.has_version {
        let linked = if edge.collection != EdgeCollection::HasVersion {
            None
        } else if edge.from.key == asset.proxy_in.key {
            let version = versions.get(&edge.to.key).copied();
            if let Some(v) = version {
                *inbound.entry(&v.key).or_insert(0) += 1;
            }
            version
        } else if edge.to.key == asset.proxy_out.key {
            let version = versions.get(&edge.from.key).copied();
            if let Some(v) = version {
                *outbound.entry(&v.key).or_insert(0) += 1;
            }
            version
        } else {
            None
        };

        match linked {
            None => out.push(Violation::StrayVersionEdge {
                asset: asset_key.clone(),
                edge: edge.key.clone(),
            }),
            Some(version) => {
                if edge.validity != version.validity
                    || edge.ttl_expire_at != version.ttl_expire_at
                {
                    out.push(Violation::EdgeWindowMismatch {
                        edge: edge.key.clone(),
                        version: version.key.clone(),
                    });
                }
            }
        }
    }

    for version in &asset.versions {
        let ins = inbound.get(&version.key).copied().unwrap_or(0);
        let outs = outbound.get(&version.key).copied().unwrap_or(0);
        if ins != 1 || outs != 1 {
            out.push(Violation::BrokenVersionLink {
                asset: asset_key.clone(),
                version: version.key.clone(),
                inbound: ins,
                outbound: outs,
            });
        }
    }
}

fn check_lifecycle(
    key: &DocKey,
    validity: Validity,
    ttl_expire_at: Option<Timestamp>,
    as_of: Timestamp,
    out: &mut Vec<Violation>,
) {
    if validity.is_current() {
        if ttl_expire_at.is_some() {
            out.push(Violation::TtlOnCurrent { key: key.clone() });
        }
        return;
    }
    if validity.created_at >= validity.expired_at {
        out.push(Violation::InvertedWindow {
            key: key.clone(),
            created_at: validity.created_at,
            expired_at: validity.expired_at,
        });
    }
    if validity.expired_at > as_of {
        out.push(Violation::ExpiryAfterSnapshot {
            key: key.clone(),
            expired_at: validity.expired_at,
            as_of,
        });
    }
    if ttl_expire_at.is_none() {
        out.push(Violation::MissingTtl { key: key.clone() });
    }
}

/// Resolve both endpoints, then check type tags (4) and partitions (3).
fn check_edge(edge: &Edge, index: &VertexIndex, out: &mut Vec<Violation>) {
    let ends = [
        (EdgeEnd::From, &edge.from, &edge.from_type),
        (EdgeEnd::To, &edge.to, &edge.to_type),
    ];
    let mut resolved: Vec<&VertexEntry> = Vec::with_capacity(2);
    for (end, id, tag) in ends {
        match index.get(&id.key) {
            Some(entry) if entry.collection == id.collection => {
                if tag.as_str() != entry.collection.name() {
                    out.push(Violation::TypeTagMismatch {
                        edge: edge.key.clone(),
                        end,
                        tagged: tag.clone(),
                        actual: entry.collection.name().to_string(),
                    });
                }
                resolved.push(entry);
            }
            _ => out.push(Violation::DanglingEndpoint {
                edge: edge.key.clone(),
                end,
                target: id.clone(),
            }),
        }
    }

    if let [from, to] = resolved.as_slice() {
        if from.partition != to.partition {
            out.push(Violation::CrossPartitionEdge {
                edge: edge.key.clone(),
                from_partition: from.partition.clone(),
                to_partition: to.partition.clone(),
            });
            return;
        }
    }
    if let Some(endpoint) = resolved.iter().find(|e| e.partition != edge.partition) {
        out.push(Violation::EdgePartitionMismatch {
            edge: edge.key.clone(),
            edge_partition: edge.partition.clone(),
            endpoint_partition: endpoint.partition.clone(),
        });
    }
}

/// Relationship edges run `ProxyOut -> ProxyIn`, never through versions.
fn check_relationship_anchors(edge: &Edge, index: &VertexIndex, out: &mut Vec<Violation>) {
    let ends = [
        (EdgeEnd::From, &edge.from, VertexRole::ProxyOut),
        (EdgeEnd::To, &edge.to, VertexRole::ProxyIn),
    ];
    let misplaced = edge.collection.relation().is_none();
    for (end, id, role) in ends {
        let actual_role = index.get(&id.key).map(|e| e.collection.role);
        if misplaced || actual_role.is_some_and(|r| r != role) {
            out.push(Violation::RelationshipOffAnchor {
                edge: edge.key.clone(),
                end,
            });
        }
    }
}
