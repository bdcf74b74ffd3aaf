//! Proxy-anchored version chains.
//!
//! An asset is two immutable anchors plus an ordered list of version vertices:
//!
//! ```text
//!   ProxyIn ──hasVersion──► Version(n) ──hasVersion──► ProxyOut
//! ```
//!
//! Ownership runs one way: the chain owns its anchors, versions and
//! `hasVersion` edges. Reverse navigation (version → anchors) goes through the
//! chain's edge index instead of back-pointers on the vertices.

use crate::arena::KeyArena;
use crate::edge::{Edge, EdgeDraft, EdgeTyper, EndpointDescriptor};
use crate::error::{Result, TimegraphError};
use crate::ids::{AssetKind, Collection, DocKey, EdgeCollection, PartitionKey, VertexId};
use crate::payload::Payload;
use crate::snapshot::AssetRecord;
use crate::time::{Timestamp, Validity};
use crate::ttl::{Lifecycle, TtlPolicyEngine};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Stable identity vertex. Carries no business attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyAnchor {
    pub key: DocKey,
    pub collection: Collection,
    pub partition: PartitionKey,
}

impl ProxyAnchor {
    pub fn id(&self) -> VertexId {
        VertexId::new(self.collection, self.key.clone())
    }

    pub fn descriptor(&self) -> EndpointDescriptor {
        EndpointDescriptor {
            id: self.id(),
            partition: self.partition.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionVertex {
    pub key: DocKey,
    pub collection: Collection,
    pub partition: PartitionKey,
    pub payload: Payload,
    pub validity: Validity,
    pub ttl_expire_at: Option<Timestamp>,
}

impl VersionVertex {
    fn open(
        key: DocKey,
        kind: AssetKind,
        partition: PartitionKey,
        payload: Payload,
        at: Timestamp,
    ) -> Self {
        Self {
            key,
            collection: Collection::version(kind),
            partition,
            payload,
            validity: Validity::open(at),
            ttl_expire_at: None,
        }
    }

    pub fn is_current(&self) -> bool {
        self.validity.is_current()
    }

    pub fn id(&self) -> VertexId {
        VertexId::new(self.collection, self.key.clone())
    }

    pub fn descriptor(&self) -> EndpointDescriptor {
        EndpointDescriptor {
            id: self.id(),
            partition: self.partition.clone(),
        }
    }
}

impl Lifecycle for VersionVertex {
    fn validity(&self) -> Validity {
        self.validity
    }

    fn ttl_expire_at(&self) -> Option<Timestamp> {
        self.ttl_expire_at
    }

    fn set_lifecycle(&mut self, validity: Validity, ttl_expire_at: Option<Timestamp>) {
        self.validity = validity;
        self.ttl_expire_at = ttl_expire_at;
    }
}

/// Caller-facing reference to an asset.
///
/// `proxy_in`/`proxy_out` never change; `current` is the version that was
/// current when the handle was issued.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssetHandle {
    pub kind: AssetKind,
    pub partition: PartitionKey,
    pub proxy_in: DocKey,
    pub proxy_out: DocKey,
    pub current: DocKey,
}

impl AssetHandle {
    /// The asset's identity key (its `In` anchor).
    pub fn asset_key(&self) -> &DocKey {
        &self.proxy_in
    }
}

#[derive(Debug, Clone)]
pub struct AssetChain {
    kind: AssetKind,
    proxy_in: ProxyAnchor,
    proxy_out: ProxyAnchor,
    /// Ordered by `created_at`.
    versions: Vec<VersionVertex>,
    version_slots: HashMap<DocKey, usize>,
    has_version: Vec<Edge>,
    outbound: HashMap<DocKey, Vec<usize>>,
    inbound: HashMap<DocKey, Vec<usize>>,
}

impl AssetChain {
    fn new(
        kind: AssetKind,
        proxy_in: ProxyAnchor,
        proxy_out: ProxyAnchor,
        version: VersionVertex,
        edges: [Edge; 2],
    ) -> Self {
        let mut chain = Self {
            kind,
            proxy_in,
            proxy_out,
            versions: Vec::new(),
            version_slots: HashMap::new(),
            has_version: Vec::new(),
            outbound: HashMap::new(),
            inbound: HashMap::new(),
        };
        chain.push_version(version, edges);
        chain
    }

    fn push_version(&mut self, version: VersionVertex, edges: [Edge; 2]) {
        self.version_slots.insert(version.key.clone(), self.versions.len());
        self.versions.push(version);
        for edge in edges {
            let slot = self.has_version.len();
            self.outbound.entry(edge.from.key.clone()).or_default().push(slot);
            self.inbound.entry(edge.to.key.clone()).or_default().push(slot);
            self.has_version.push(edge);
        }
    }

    pub fn kind(&self) -> AssetKind {
        self.kind
    }

    pub fn partition(&self) -> &PartitionKey {
        &self.proxy_in.partition
    }

    pub fn asset_key(&self) -> &DocKey {
        &self.proxy_in.key
    }

    pub fn proxy_in(&self) -> &ProxyAnchor {
        &self.proxy_in
    }

    pub fn proxy_out(&self) -> &ProxyAnchor {
        &self.proxy_out
    }

    pub fn versions(&self) -> &[VersionVertex] {
        &self.versions
    }

    pub fn version(&self, key: &DocKey) -> Option<&VersionVertex> {
        self.version_slots.get(key).map(|&slot| &self.versions[slot])
    }

    pub fn has_version_edges(&self) -> &[Edge] {
        &self.has_version
    }

    /// The version whose `expired_at` is the NEVER sentinel.
    pub fn current(&self) -> Option<&VersionVertex> {
        self.versions.iter().rev().find(|v| v.is_current())
    }

    /// `hasVersion` edges leaving `key`.
    pub fn outbound(&self, key: &DocKey) -> impl Iterator<Item = &Edge> {
        self.edges_at(self.outbound.get(key))
    }

    /// `hasVersion` edges arriving at `key`.
    pub fn inbound(&self, key: &DocKey) -> impl Iterator<Item = &Edge> {
        self.edges_at(self.inbound.get(key))
    }

    fn edges_at<'a>(&'a self, slots: Option<&'a Vec<usize>>) -> impl Iterator<Item = &'a Edge> {
        slots
            .into_iter()
            .flatten()
            .map(move |&slot| &self.has_version[slot])
    }

    pub fn handle(&self) -> Result<AssetHandle> {
        let current = self.current().ok_or_else(|| TimegraphError::NoCurrentVersion {
            asset: self.asset_key().clone(),
        })?;
        Ok(AssetHandle {
            kind: self.kind,
            partition: self.partition().clone(),
            proxy_in: self.proxy_in.key.clone(),
            proxy_out: self.proxy_out.key.clone(),
            current: current.key.clone(),
        })
    }

    /// Close `retiring`'s window (and its `hasVersion` edges) at `at`, then
    /// append `next`. Callers have already checked every precondition; nothing
    /// here can fail.
    pub(crate) fn commit_successor(
        &mut self,
        retiring: &DocKey,
        at: Timestamp,
        ttl: &TtlPolicyEngine,
        next: VersionVertex,
        edges: [Edge; 2],
    ) {
        if let Some(&slot) = self.version_slots.get(retiring) {
            ttl.retire(&mut self.versions[slot], at);
        }
        let linked: Vec<usize> = self
            .inbound
            .get(retiring)
            .into_iter()
            .chain(self.outbound.get(retiring))
            .flatten()
            .copied()
            .collect();
        for slot in linked {
            ttl.retire(&mut self.has_version[slot], at);
        }
        self.push_version(next, edges);
    }

    pub fn to_record(&self) -> AssetRecord {
        AssetRecord {
            kind: self.kind,
            partition: self.partition().clone(),
            proxy_in: self.proxy_in.clone(),
            proxy_out: self.proxy_out.clone(),
            versions: self.versions.clone(),
            has_version: self.has_version.clone(),
        }
    }
}

/// Allocate a version vertex in `kind`'s collection, open at `at`.
pub(crate) fn allocate_version(
    arena: &mut KeyArena,
    kind: AssetKind,
    payload: Payload,
    at: Timestamp,
) -> VersionVertex {
    let key = arena.next(Collection::version(kind).name());
    VersionVertex::open(key, kind, arena.partition().clone(), payload, at)
}

/// Build the `ProxyIn -> version` and `version -> ProxyOut` edges.
pub(crate) fn link_version(
    arena: &mut KeyArena,
    proxy_in: &ProxyAnchor,
    version: &VersionVertex,
    proxy_out: &ProxyAnchor,
) -> Result<[Edge; 2]> {
    let entered = EdgeTyper::type_edge(
        EdgeDraft {
            collection: EdgeCollection::HasVersion,
            key: arena.next(EdgeCollection::HasVersion.name()),
            validity: version.validity,
        },
        &proxy_in.descriptor(),
        &version.descriptor(),
    )?;
    let exits = EdgeTyper::type_edge(
        EdgeDraft {
            collection: EdgeCollection::HasVersion,
            key: arena.next(EdgeCollection::HasVersion.name()),
            validity: version.validity,
        },
        &version.descriptor(),
        &proxy_out.descriptor(),
    )?;
    Ok([entered, exits])
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ProxyVersionChainBuilder;

impl ProxyVersionChainBuilder {
    /// Materialize a new asset: two anchors, one open version, two
    /// `hasVersion` edges. The payload is validated before any key is drawn.
    pub fn create_asset(
        &self,
        arena: &mut KeyArena,
        kind: AssetKind,
        payload: Payload,
        now: Timestamp,
    ) -> Result<AssetChain> {
        payload.validate(kind)?;

        let partition = arena.partition().clone();
        let proxy_in = ProxyAnchor {
            key: arena.next(Collection::proxy_in(kind).name()),
            collection: Collection::proxy_in(kind),
            partition: partition.clone(),
        };
        let proxy_out = ProxyAnchor {
            key: arena.next(Collection::proxy_out(kind).name()),
            collection: Collection::proxy_out(kind),
            partition,
        };
        let version = allocate_version(arena, kind, payload, now);
        let edges = link_version(arena, &proxy_in, &version, &proxy_out)?;

        Ok(AssetChain::new(kind, proxy_in, proxy_out, version, edges))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device_payload(os: &str) -> Payload {
        Payload::new()
            .with("name", "edge-router-1")
            .with("device_type", "router")
            .with("model", "MX204")
            .with("serial_number", "SN0001")
            .with("os_version", os)
    }

    #[test]
    fn test_create_asset_shape() {
        let mut arena = KeyArena::new(PartitionKey::from("t-acme"));
        let chain = ProxyVersionChainBuilder
            .create_asset(
                &mut arena,
                AssetKind::Device,
                device_payload("21.2"),
                Timestamp::new(100),
            )
            .unwrap();

        assert_eq!(chain.versions().len(), 1);
        let current = chain.current().unwrap();
        assert_eq!(current.validity, Validity::open(Timestamp::new(100)));
        assert_eq!(current.ttl_expire_at, None);

        let edges = chain.has_version_edges();
        assert_eq!(edges.len(), 2);
        assert_eq!(edges[0].from.key, chain.proxy_in().key);
        assert_eq!(edges[0].to.key, current.key);
        assert_eq!(edges[0].from_type, "DeviceProxyIn");
        assert_eq!(edges[0].to_type, "Device");
        assert_eq!(edges[1].from.key, current.key);
        assert_eq!(edges[1].to.key, chain.proxy_out().key);
        assert_eq!(edges[1].to_type, "DeviceProxyOut");

        let handle = chain.handle().unwrap();
        assert_eq!(handle.proxy_in, chain.proxy_in().key);
        assert_eq!(handle.current, current.key);
    }

    #[test]
    fn test_reverse_navigation_through_index() {
        let mut arena = KeyArena::new(PartitionKey::from("t-acme"));
        let chain = ProxyVersionChainBuilder
            .create_asset(&mut arena, AssetKind::Device, device_payload("21.2"), Timestamp::new(0))
            .unwrap();
        let version = &chain.current().unwrap().key;
        let sources: Vec<&DocKey> = chain.inbound(version).map(|e| &e.from.key).collect();
        assert_eq!(sources, vec![&chain.proxy_in().key]);
        let sinks: Vec<&DocKey> = chain.outbound(version).map(|e| &e.to.key).collect();
        assert_eq!(sinks, vec![&chain.proxy_out().key]);
    }

    #[test]
    fn test_invalid_payload_draws_no_keys() {
        let mut arena = KeyArena::new(PartitionKey::from("t-acme"));
        let bad = Payload::new().with("name", "orphan");
        let err = ProxyVersionChainBuilder
            .create_asset(&mut arena, AssetKind::Device, bad, Timestamp::new(0))
            .unwrap_err();
        assert!(matches!(err, TimegraphError::InvalidPayload { .. }));
        assert_eq!(arena.issued("DeviceProxyIn"), 0);
        assert_eq!(arena.issued("Device"), 0);
        assert_eq!(arena.issued("hasVersion"), 0);
    }
}
