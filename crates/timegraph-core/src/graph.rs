//! Tenant graphs and multi-tenant datasets.
//!
//! A [`TenantGraph`] owns everything one tenant produced: its key arena, its
//! asset chains and its relationship edges. Nothing is shared between tenant
//! graphs, so a [`Dataset`] can hand them to different threads freely.
//!
//! Inside one tenant graph:
//! - every asset chain sits behind its own `RwLock` (one writer per asset,
//!   readers run concurrently with each other),
//! - the key arena sits behind a `Mutex`, taken after the chain lock.

use crate::arena::KeyArena;
use crate::chain::{AssetChain, AssetHandle, ProxyVersionChainBuilder};
use crate::config::TenantConfig;
use crate::edge::{Edge, EdgeDraft, EdgeTyper, EndpointDescriptor};
use crate::error::{Result, TimegraphError};
use crate::export::ExportBundle;
use crate::ids::{AssetKind, DocKey, PartitionKey, RelationKind, TenantId};
use crate::mutation::TemporalMutationEngine;
use crate::naming::NamingConvention;
use crate::payload::Payload;
use crate::snapshot::{AssetRecord, DatasetSnapshot, TenantSnapshot};
use crate::tenant::{Tenant, TenantPartitioner};
use crate::time::{Clock, Timestamp, Validity};
use crate::time_travel::{TimeTravelReconstructor, VersionSnapshot};
use crate::ttl::{RetentionPolicy, TtlPolicyEngine};
use crate::validator::{IntegrityValidator, ViolationReport};
use parking_lot::{Mutex, RwLock, RwLockReadGuard};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::sync::Arc;

// ============================================================================
// TenantGraph
// ============================================================================

#[derive(Debug)]
pub struct TenantGraph {
    tenant: Tenant,
    naming: NamingConvention,
    ttl: TtlPolicyEngine,
    clock: Arc<dyn Clock>,
    arena: Mutex<KeyArena>,
    assets: BTreeMap<DocKey, RwLock<AssetChain>>,
    relationships: RwLock<Vec<Edge>>,
}

impl TenantGraph {
    pub fn new(
        tenant: Tenant,
        naming: NamingConvention,
        policy: RetentionPolicy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let arena = KeyArena::new(tenant.partition.clone());
        Self {
            tenant,
            naming,
            ttl: TtlPolicyEngine::new(policy),
            clock,
            arena: Mutex::new(arena),
            assets: BTreeMap::new(),
            relationships: RwLock::new(Vec::new()),
        }
    }

    pub fn tenant(&self) -> &Tenant {
        &self.tenant
    }

    pub fn partition(&self) -> &PartitionKey {
        &self.tenant.partition
    }

    pub fn naming(&self) -> NamingConvention {
        self.naming
    }

    pub fn policy(&self) -> RetentionPolicy {
        self.ttl.policy()
    }

    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    pub fn asset_count(&self) -> usize {
        self.assets.len()
    }

    /// Materialize a new asset whose first version opens at the clock's now.
    pub fn create_asset(&mut self, kind: AssetKind, payload: Payload) -> Result<AssetHandle> {
        let now = self.clock.now();
        let chain = {
            let arena = self.arena.get_mut();
            ProxyVersionChainBuilder.create_asset(arena, kind, payload, now)?
        };
        let handle = chain.handle()?;
        tracing::debug!(
            partition = %self.tenant.partition,
            asset = %handle.asset_key(),
            kind = %kind,
            at = %now,
            "created asset"
        );
        self.assets
            .insert(handle.asset_key().clone(), RwLock::new(chain));
        Ok(handle)
    }

    /// Apply a new configuration to the asset behind `handle`. The handle
    /// must name the chain's current version; an outdated one is refused.
    pub fn observe_new_configuration(
        &self,
        handle: &AssetHandle,
        payload: Payload,
        observed_at: Timestamp,
    ) -> Result<AssetHandle> {
        let lock = self.lock_for(handle.asset_key())?;
        let mut chain = lock.write();
        if let Some(current) = chain.current() {
            if current.key != handle.current {
                return Err(TimegraphError::OutdatedHandle {
                    asset: handle.asset_key().clone(),
                    held: handle.current.clone(),
                    current: current.key.clone(),
                });
            }
        }
        let mut arena = self.arena.lock();
        TemporalMutationEngine::new(self.ttl).observe_new_configuration(
            &mut chain,
            &mut arena,
            payload,
            observed_at,
            self.clock.now(),
        )
    }

    /// Read access to one asset's chain. Blocks while the asset is mutated.
    pub fn chain(&self, asset: &DocKey) -> Result<RwLockReadGuard<'_, AssetChain>> {
        Ok(self.lock_for(asset)?.read())
    }

    pub fn handle(&self, asset: &DocKey) -> Result<AssetHandle> {
        self.chain(asset)?.handle()
    }

    pub fn handles(&self) -> Result<Vec<AssetHandle>> {
        self.assets.values().map(|chain| chain.read().handle()).collect()
    }

    pub fn handles_of(&self, kind: AssetKind) -> Result<Vec<AssetHandle>> {
        self.assets
            .values()
            .filter(|chain| chain.read().kind() == kind)
            .map(|chain| chain.read().handle())
            .collect()
    }

    pub fn state_at(&self, asset: &DocKey, at: Timestamp) -> Result<Option<VersionSnapshot>> {
        let chain = self.chain(asset)?;
        TimeTravelReconstructor::state_at(&chain, at)
    }

    /// Every asset that existed at `at`, in key order.
    pub fn state_at_all(&self, at: Timestamp) -> Result<Vec<VersionSnapshot>> {
        let mut states = Vec::new();
        for chain in self.assets.values() {
            if let Some(state) = TimeTravelReconstructor::state_at(&chain.read(), at)? {
                states.push(state);
            }
        }
        Ok(states)
    }

    /// Connect `from`'s `Out` anchor to `to`'s `In` anchor.
    pub fn relate(&self, kind: RelationKind, from: &AssetHandle, to: &AssetHandle) -> Result<Edge> {
        self.relate_across(self, kind, from, to)
    }

    /// Like [`TenantGraph::relate`], with the target resolved in `target`.
    /// Any target outside this tenant is refused by the edge typer.
    pub(crate) fn relate_across(
        &self,
        target: &TenantGraph,
        kind: RelationKind,
        from: &AssetHandle,
        to: &AssetHandle,
    ) -> Result<Edge> {
        let (source_kind, target_kind) = kind.endpoints();
        if from.kind != source_kind || to.kind != target_kind {
            return Err(TimegraphError::InvalidRelation {
                kind,
                reason: format!(
                    "expects {source_kind} -> {target_kind}, got {} -> {}",
                    from.kind, to.kind
                ),
            });
        }
        if from.asset_key() == to.asset_key() {
            return Err(TimegraphError::InvalidRelation {
                kind,
                reason: format!("asset `{}` cannot relate to itself", from.asset_key()),
            });
        }

        let source = self.chain(from.asset_key())?.proxy_out().descriptor();
        let sink = target.chain(to.asset_key())?.proxy_in().descriptor();
        self.insert_relationship(kind, &source, &sink)
    }

    fn insert_relationship(
        &self,
        kind: RelationKind,
        from: &EndpointDescriptor,
        to: &EndpointDescriptor,
    ) -> Result<Edge> {
        let collection = kind.collection();
        let draft = EdgeDraft {
            collection,
            key: self.arena.lock().next(collection.name()),
            validity: Validity::open(self.clock.now()),
        };
        let edge = EdgeTyper::type_edge(draft, from, to)?;
        tracing::debug!(
            partition = %self.tenant.partition,
            edge = %edge.key,
            from = %edge.from,
            to = %edge.to,
            "related assets"
        );
        self.relationships.write().push(edge.clone());
        Ok(edge)
    }

    /// Close a live relationship edge at `at`.
    pub fn retire_relationship(&self, key: &DocKey, at: Timestamp) -> Result<Edge> {
        let now = self.clock.now();
        let mut relationships = self.relationships.write();
        let edge = relationships
            .iter_mut()
            .find(|e| &e.key == key && e.is_current())
            .ok_or_else(|| TimegraphError::UnknownRelationship(key.clone()))?;
        if at <= edge.validity.created_at {
            return Err(TimegraphError::StaleMutation {
                asset: key.clone(),
                observed_at: at,
                current_created_at: edge.validity.created_at,
            });
        }
        if at.is_never() || at > now {
            return Err(TimegraphError::FutureObservation {
                asset: key.clone(),
                observed_at: at,
                now,
            });
        }
        self.ttl.retire(edge, at);
        Ok(edge.clone())
    }

    pub fn relationships(&self) -> Vec<Edge> {
        self.relationships.read().clone()
    }

    /// Drop an asset together with every edge touching it. Keys already
    /// issued stay consumed.
    pub fn remove_asset(&mut self, handle: &AssetHandle) -> Result<AssetRecord> {
        let chain = self
            .assets
            .remove(handle.asset_key())
            .ok_or_else(|| TimegraphError::UnknownAsset(handle.asset_key().clone()))?
            .into_inner();
        let (proxy_in, proxy_out) = (&chain.proxy_in().key, &chain.proxy_out().key);
        let relationships = self.relationships.get_mut();
        let before = relationships.len();
        relationships.retain(|e| !e.touches(proxy_in) && !e.touches(proxy_out));
        tracing::debug!(
            partition = %self.tenant.partition,
            asset = %proxy_in,
            relationships_dropped = before - relationships.len(),
            "removed asset"
        );
        Ok(chain.to_record())
    }

    pub fn snapshot(&self) -> TenantSnapshot {
        TenantSnapshot {
            tenant: self.tenant.id.clone(),
            partition: self.tenant.partition.clone(),
            naming: self.naming,
            as_of: self.clock.now(),
            assets: self.assets.values().map(|c| c.read().to_record()).collect(),
            relationships: self.relationships(),
        }
    }

    fn lock_for(&self, asset: &DocKey) -> Result<&RwLock<AssetChain>> {
        self.assets
            .get(asset)
            .ok_or_else(|| TimegraphError::UnknownAsset(asset.clone()))
    }
}

// ============================================================================
// Dataset
// ============================================================================

/// Every tenant of one run, keyed by partition.
#[derive(Debug, Default)]
pub struct Dataset {
    partitioner: TenantPartitioner,
    graphs: BTreeMap<PartitionKey, TenantGraph>,
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn partitioner(&self) -> &TenantPartitioner {
        &self.partitioner
    }

    /// Claim a partition for `tenant` without building its graph yet.
    pub fn reserve(&mut self, tenant: &TenantId) -> Result<Tenant> {
        let partition = self.partitioner.register(tenant)?;
        Ok(Tenant {
            id: tenant.clone(),
            partition,
        })
    }

    /// Register a tenant and give it an empty graph.
    pub fn register_tenant(
        &mut self,
        config: &TenantConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<&mut TenantGraph> {
        let policy = config.retention_policy()?;
        let tenant = self.reserve(&config.tenant_id)?;
        let graph = TenantGraph::new(tenant, config.naming_convention, policy, clock);
        self.attach(graph)
    }

    /// Install a graph built elsewhere for a tenant reserved earlier.
    pub fn attach(&mut self, graph: TenantGraph) -> Result<&mut TenantGraph> {
        let reserved = self.partitioner.partition_of(&graph.tenant().id)?;
        if &reserved != graph.partition() || self.graphs.contains_key(graph.partition()) {
            return Err(TimegraphError::DuplicatePartition {
                tenant: graph.tenant().id.clone(),
                partition: graph.partition().clone(),
            });
        }
        let partition = graph.partition().clone();
        Ok(self.graphs.entry(partition).or_insert(graph))
    }

    pub fn tenant(&self, tenant: &TenantId) -> Result<&TenantGraph> {
        let partition = self.partitioner.partition_of(tenant)?;
        self.graphs
            .get(&partition)
            .ok_or_else(|| TimegraphError::UnknownTenant(tenant.clone()))
    }

    pub fn tenant_mut(&mut self, tenant: &TenantId) -> Result<&mut TenantGraph> {
        let partition = self.partitioner.partition_of(tenant)?;
        self.graphs
            .get_mut(&partition)
            .ok_or_else(|| TimegraphError::UnknownTenant(tenant.clone()))
    }

    pub fn graph(&self, partition: &PartitionKey) -> Option<&TenantGraph> {
        self.graphs.get(partition)
    }

    pub fn graphs(&self) -> impl Iterator<Item = &TenantGraph> {
        self.graphs.values()
    }

    pub fn len(&self) -> usize {
        self.graphs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.graphs.is_empty()
    }

    /// Relate two assets that may belong to different tenants. Only succeeds
    /// when both handles resolve to the same partition.
    pub fn relate(&self, kind: RelationKind, from: &AssetHandle, to: &AssetHandle) -> Result<Edge> {
        let source = self.owner_of(from)?;
        let target = self.owner_of(to)?;
        source.relate_across(target, kind, from, to)
    }

    fn owner_of(&self, handle: &AssetHandle) -> Result<&TenantGraph> {
        self.graphs
            .get(&handle.partition)
            .ok_or_else(|| TimegraphError::UnknownAsset(handle.asset_key().clone()))
    }

    pub fn snapshot(&self) -> DatasetSnapshot {
        let graphs: Vec<&TenantGraph> = self.graphs.values().collect();
        DatasetSnapshot {
            tenants: graphs.par_iter().map(|g| g.snapshot()).collect(),
        }
    }

    pub fn validate(&self) -> ViolationReport {
        IntegrityValidator::report(&self.snapshot())
    }

    /// Validate, then render. Refuses to produce batches for a dataset with
    /// any violation.
    pub fn export(&self) -> Result<ExportBundle> {
        let snapshot = self.snapshot();
        let report = IntegrityValidator::report(&snapshot);
        if !report.is_clean() {
            return Err(TimegraphError::NotExportable(report.violations.len()));
        }
        Ok(ExportBundle::new(&snapshot, report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::ManualClock;

    fn device(name: &str, os: &str) -> Payload {
        Payload::new()
            .with("name", name)
            .with("device_type", "switch")
            .with("model", "EX4300")
            .with("serial_number", format!("SN-{name}"))
            .with("os_version", os)
    }

    fn location(name: &str) -> Payload {
        Payload::new().with("name", name).with("address", "1 Main St")
    }

    fn graph(clock: Arc<ManualClock>) -> TenantGraph {
        TenantGraph::new(
            Tenant {
                id: TenantId::from("acme"),
                partition: PartitionKey::from("t-acme"),
            },
            NamingConvention::Primary,
            RetentionPolicy::new(1_000).unwrap(),
            clock,
        )
    }

    #[test]
    fn test_create_and_mutate_through_graph() {
        let clock = Arc::new(ManualClock::new(Timestamp::new(100)));
        let mut g = graph(clock.clone());
        let handle = g.create_asset(AssetKind::Device, device("sw1", "1.0")).unwrap();

        clock.set(Timestamp::new(500));
        let next = g
            .observe_new_configuration(&handle, device("sw1", "1.1"), Timestamp::new(300))
            .unwrap();
        assert_eq!(next.proxy_in, handle.proxy_in);

        let past = g.state_at(handle.asset_key(), Timestamp::new(299)).unwrap().unwrap();
        assert_eq!(past.payload.get("os_version"), Some("1.0"));
        let present = g.state_at(handle.asset_key(), Timestamp::new(300)).unwrap().unwrap();
        assert_eq!(present.payload.get("os_version"), Some("1.1"));
    }

    #[test]
    fn test_outdated_handle_refused() {
        let clock = Arc::new(ManualClock::new(Timestamp::new(100)));
        let mut g = graph(clock.clone());
        let first = g.create_asset(AssetKind::Device, device("sw1", "1.0")).unwrap();
        clock.set(Timestamp::new(500));
        let second = g
            .observe_new_configuration(&first, device("sw1", "1.1"), Timestamp::new(200))
            .unwrap();

        let err = g
            .observe_new_configuration(&first, device("sw1", "1.2"), Timestamp::new(300))
            .unwrap_err();
        assert_eq!(
            err,
            TimegraphError::OutdatedHandle {
                asset: first.proxy_in.clone(),
                held: first.current.clone(),
                current: second.current.clone(),
            }
        );
        assert_eq!(g.chain(first.asset_key()).unwrap().versions().len(), 2);
        assert!(g
            .observe_new_configuration(&second, device("sw1", "1.2"), Timestamp::new(300))
            .is_ok());
    }

    #[test]
    fn test_relationship_lands_on_anchors() {
        let clock = Arc::new(ManualClock::new(Timestamp::new(0)));
        let mut g = graph(clock);
        let sw = g.create_asset(AssetKind::Device, device("sw1", "1.0")).unwrap();
        let hq = g.create_asset(AssetKind::Location, location("hq")).unwrap();

        let edge = g.relate(RelationKind::Location, &sw, &hq).unwrap();
        assert_eq!(edge.from.key, sw.proxy_out);
        assert_eq!(edge.to.key, hq.proxy_in);
        assert_eq!(edge.from_type, "DeviceProxyOut");
        assert_eq!(edge.to_type, "LocationProxyIn");
    }

    #[test]
    fn test_relation_kind_and_self_loop_checked() {
        let clock = Arc::new(ManualClock::new(Timestamp::new(0)));
        let mut g = graph(clock);
        let sw = g.create_asset(AssetKind::Device, device("sw1", "1.0")).unwrap();
        let hq = g.create_asset(AssetKind::Location, location("hq")).unwrap();

        assert!(matches!(
            g.relate(RelationKind::Location, &hq, &sw),
            Err(TimegraphError::InvalidRelation { .. })
        ));
        assert!(matches!(
            g.relate(RelationKind::Connection, &sw, &sw),
            Err(TimegraphError::InvalidRelation { .. })
        ));
        assert!(g.relationships().is_empty());
    }

    #[test]
    fn test_retire_relationship() {
        let clock = Arc::new(ManualClock::new(Timestamp::new(0)));
        let mut g = graph(clock.clone());
        let a = g.create_asset(AssetKind::Device, device("a", "1")).unwrap();
        let b = g.create_asset(AssetKind::Device, device("b", "1")).unwrap();
        let edge = g.relate(RelationKind::Connection, &a, &b).unwrap();

        clock.set(Timestamp::new(50));
        let retired = g.retire_relationship(&edge.key, Timestamp::new(40)).unwrap();
        assert_eq!(retired.validity.expired_at, Timestamp::new(40));
        assert_eq!(retired.ttl_expire_at, Some(Timestamp::new(1_040)));

        assert!(matches!(
            g.retire_relationship(&edge.key, Timestamp::new(45)),
            Err(TimegraphError::UnknownRelationship(_))
        ));
    }

    #[test]
    fn test_retire_relationship_at_never_rejected() {
        let clock = Arc::new(ManualClock::new(Timestamp::new(0)));
        let mut g = graph(clock.clone());
        let a = g.create_asset(AssetKind::Device, device("a", "1")).unwrap();
        let b = g.create_asset(AssetKind::Device, device("b", "1")).unwrap();
        let edge = g.relate(RelationKind::Connection, &a, &b).unwrap();

        clock.set(Timestamp::NEVER);
        assert!(matches!(
            g.retire_relationship(&edge.key, Timestamp::NEVER),
            Err(TimegraphError::FutureObservation { .. })
        ));
        assert!(g.relationships()[0].is_current());
    }

    #[test]
    fn test_remove_asset_drops_edges_and_keeps_sequences() {
        let clock = Arc::new(ManualClock::new(Timestamp::new(0)));
        let mut g = graph(clock);
        let a = g.create_asset(AssetKind::Device, device("a", "1")).unwrap();
        let b = g.create_asset(AssetKind::Device, device("b", "1")).unwrap();
        g.relate(RelationKind::Connection, &a, &b).unwrap();

        let removed = g.remove_asset(&a).unwrap();
        assert_eq!(removed.proxy_in.key, a.proxy_in);
        assert!(g.relationships().is_empty());
        assert!(matches!(g.handle(a.asset_key()), Err(TimegraphError::UnknownAsset(_))));

        let c = g.create_asset(AssetKind::Device, device("c", "1")).unwrap();
        assert_ne!(c.proxy_in, a.proxy_in);
        assert!(IntegrityValidator::validate(&DatasetSnapshot {
            tenants: vec![g.snapshot()]
        })
        .is_ok());
    }

    #[test]
    fn test_dataset_refuses_cross_tenant_relationship() {
        let mut dataset = Dataset::new();
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(Timestamp::new(0)));
        let a = dataset
            .register_tenant(&TenantConfig::new("alpha", 10), clock.clone())
            .unwrap()
            .create_asset(AssetKind::Device, device("a", "1"))
            .unwrap();
        let b = dataset
            .register_tenant(&TenantConfig::new("beta", 10), clock)
            .unwrap()
            .create_asset(AssetKind::Device, device("b", "1"))
            .unwrap();

        let err = dataset.relate(RelationKind::Connection, &a, &b).unwrap_err();
        assert!(matches!(err, TimegraphError::CrossTenantEdge { .. }));
        for graph in dataset.graphs() {
            assert!(graph.relationships().is_empty());
        }
    }

    #[test]
    fn test_dataset_duplicate_tenant_rejected() {
        let mut dataset = Dataset::new();
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(Timestamp::new(0)));
        dataset
            .register_tenant(&TenantConfig::new("Acme Corp", 10), clock.clone())
            .unwrap();
        let err = dataset
            .register_tenant(&TenantConfig::new("acme_corp", 10), clock)
            .unwrap_err();
        assert!(matches!(err, TimegraphError::DuplicatePartition { .. }));
        assert_eq!(dataset.len(), 1);
    }
}
