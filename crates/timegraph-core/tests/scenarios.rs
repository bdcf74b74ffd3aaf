//! End-to-end scenarios over tenant graphs and datasets.

use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use timegraph_core::*;

fn device(serial: &str, os: &str) -> Payload {
    Payload::new()
        .with("name", format!("core-{serial}"))
        .with("device_type", "router")
        .with("model", "MX204")
        .with("serial_number", serial)
        .with("os_version", os)
}

fn location(name: &str) -> Payload {
    Payload::new().with("name", name).with("address", "7 Harbor Rd")
}

fn dataset_with(tenants: &[&str], clock: Arc<ManualClock>) -> Dataset {
    let mut dataset = Dataset::new();
    for tenant in tenants {
        dataset
            .register_tenant(&TenantConfig::new(*tenant, 1_000), clock.clone())
            .expect("register tenant");
    }
    dataset
}

// ============================================================================
// Round trip
// ============================================================================

#[test]
fn test_round_trip_through_time() {
    let clock = Arc::new(ManualClock::new(Timestamp::new(1_000)));
    let mut dataset = dataset_with(&["acme"], clock.clone());
    let acme = TenantId::from("acme");

    let t0 = clock.now();
    let p1 = device("A1", "1.0");
    let p2 = device("A1", "2.0");
    let handle = dataset
        .tenant_mut(&acme)
        .unwrap()
        .create_asset(AssetKind::Device, p1.clone())
        .unwrap();

    let t1 = clock.advance(500);
    let graph = dataset.tenant(&acme).unwrap();
    let next = graph
        .observe_new_configuration(&handle, p2.clone(), t1)
        .unwrap();
    assert_eq!(next.proxy_in, handle.proxy_in);
    assert_eq!(next.proxy_out, handle.proxy_out);

    let at = |t: Timestamp| graph.state_at(handle.asset_key(), t).unwrap().map(|s| s.payload);
    assert_eq!(at(t0), Some(p1.clone()));
    assert_eq!(at(t1), Some(p2));
    assert_eq!(at(t1 - 1), Some(p1));
    assert_eq!(at(t0 - 1), None);

    assert!(dataset.validate().is_clean());
}

#[test]
fn test_tenant_wide_time_travel() {
    let clock = Arc::new(ManualClock::new(Timestamp::new(0)));
    let mut dataset = dataset_with(&["acme"], clock.clone());
    let graph = dataset.tenant_mut(&TenantId::from("acme")).unwrap();

    let router = graph.create_asset(AssetKind::Device, device("R1", "1.0")).unwrap();
    clock.set(Timestamp::new(100));
    graph.create_asset(AssetKind::Location, location("dock")).unwrap();
    clock.set(Timestamp::new(200));
    graph
        .observe_new_configuration(&router, device("R1", "1.1"), Timestamp::new(150))
        .unwrap();

    assert_eq!(graph.state_at_all(Timestamp::new(50)).unwrap().len(), 1);
    let later = graph.state_at_all(Timestamp::new(175)).unwrap();
    assert_eq!(later.len(), 2);
    let router_state = later.iter().find(|s| s.kind == AssetKind::Device).unwrap();
    assert_eq!(router_state.payload.get("os_version"), Some("1.1"));
}

// ============================================================================
// Concurrency
// ============================================================================

#[test]
fn test_racing_mutations_on_one_asset_stay_serialized() {
    const WRITERS: usize = 8;
    const ATTEMPTS: usize = 25;

    let clock = Arc::new(ManualClock::new(Timestamp::new(0)));
    let mut dataset = dataset_with(&["acme"], clock.clone());
    let acme = TenantId::from("acme");
    let handle = dataset
        .tenant_mut(&acme)
        .unwrap()
        .create_asset(AssetKind::Device, device("RACE", "0"))
        .unwrap();
    clock.set(Timestamp::new(10_000));

    let graph = dataset.tenant(&acme).unwrap();
    let key = handle.asset_key();
    let ticks = AtomicI64::new(0);
    let committed = AtomicUsize::new(0);

    thread::scope(|scope| {
        for writer in 0..WRITERS {
            let (ticks, committed) = (&ticks, &committed);
            scope.spawn(move || {
                for attempt in 0..ATTEMPTS {
                    let current = graph.handle(key).unwrap();
                    let at = Timestamp::new(ticks.fetch_add(1, Ordering::SeqCst) + 1);
                    let os = format!("{writer}.{attempt}");
                    match graph.observe_new_configuration(&current, device("RACE", &os), at) {
                        Ok(next) => {
                            assert_eq!(next.proxy_in, current.proxy_in);
                            committed.fetch_add(1, Ordering::SeqCst);
                        }
                        Err(TimegraphError::StaleMutation { .. })
                        | Err(TimegraphError::OutdatedHandle { .. }) => {}
                        Err(other) => panic!("unexpected error: {other}"),
                    }
                }
            });
        }
        for _ in 0..2 {
            scope.spawn(|| {
                for _ in 0..WRITERS * ATTEMPTS {
                    {
                        let chain = graph.chain(key).unwrap();
                        let current = chain.versions().iter().filter(|v| v.is_current()).count();
                        assert_eq!(current, 1);
                        assert_eq!(chain.has_version_edges().len(), 2 * chain.versions().len());
                    }
                    let state = graph.state_at(key, graph.now()).unwrap().unwrap();
                    assert!(state.validity.is_current());
                }
            });
        }
    });

    let committed = committed.into_inner();
    assert!(committed >= 1);
    let chain = graph.chain(key).unwrap();
    assert_eq!(chain.versions().len(), 1 + committed);
    assert_eq!(chain.versions().iter().filter(|v| v.is_current()).count(), 1);
    drop(chain);
    assert!(dataset.validate().is_clean());
}

// ============================================================================
// Rejections
// ============================================================================

#[test]
fn test_cross_tenant_edge_rejected_and_nothing_written() {
    let clock = Arc::new(ManualClock::new(Timestamp::new(0)));
    let mut dataset = dataset_with(&["alpha", "beta"], clock);
    let a = dataset
        .tenant_mut(&TenantId::from("alpha"))
        .unwrap()
        .create_asset(AssetKind::Device, device("A", "1"))
        .unwrap();
    let b = dataset
        .tenant_mut(&TenantId::from("beta"))
        .unwrap()
        .create_asset(AssetKind::Location, location("beta-hq"))
        .unwrap();

    let before = dataset.snapshot();
    match dataset.relate(RelationKind::Location, &a, &b) {
        Err(TimegraphError::CrossTenantEdge { from, to, .. }) => {
            assert_eq!(from, a.partition);
            assert_eq!(to, b.partition);
        }
        other => panic!("expected CrossTenantEdge, got {other:?}"),
    }
    assert_eq!(dataset.snapshot(), before);
}

#[test]
fn test_stale_mutation_leaves_chain_unchanged() {
    let clock = Arc::new(ManualClock::new(Timestamp::new(100)));
    let mut dataset = dataset_with(&["acme"], clock.clone());
    let acme = TenantId::from("acme");
    let handle = dataset
        .tenant_mut(&acme)
        .unwrap()
        .create_asset(AssetKind::Device, device("S", "1"))
        .unwrap();
    clock.set(Timestamp::new(300));

    let graph = dataset.tenant(&acme).unwrap();
    let before = graph.snapshot();
    let err = graph
        .observe_new_configuration(&handle, device("S", "2"), Timestamp::new(50))
        .unwrap_err();
    assert!(matches!(err, TimegraphError::StaleMutation { .. }));
    assert_eq!(graph.snapshot(), before);
    assert_eq!(graph.handle(handle.asset_key()).unwrap(), handle);
}

#[test]
fn test_unknown_tenant() {
    let dataset = Dataset::new();
    assert!(matches!(
        dataset.tenant(&TenantId::from("ghost")),
        Err(TimegraphError::UnknownTenant(_))
    ));
}

// ============================================================================
// Validator
// ============================================================================

#[test]
fn test_validator_reports_every_broken_instance() {
    let clock = Arc::new(ManualClock::new(Timestamp::new(0)));
    let mut dataset = dataset_with(&["acme"], clock.clone());
    let acme = TenantId::from("acme");
    let graph = dataset.tenant_mut(&acme).unwrap();
    let handle = graph.create_asset(AssetKind::Device, device("V", "1")).unwrap();
    clock.set(Timestamp::new(10));
    graph
        .observe_new_configuration(&handle, device("V", "2"), Timestamp::new(10))
        .unwrap();

    let mut snapshot = dataset.snapshot();
    let asset = &mut snapshot.tenants[0].assets[0];
    // Reopen the retired version: two current versions.
    asset.versions[0].validity = Validity::open(asset.versions[0].validity.created_at);
    asset.versions[0].ttl_expire_at = None;
    // Mislabel an edge's source.
    asset.has_version[2].from_type = "SoftwareProxyIn".to_string();

    let violations = IntegrityValidator::validate(&snapshot).unwrap_err();
    assert!(violations.contains(&Violation::CurrentVersionCount {
        asset: handle.proxy_in.clone(),
        found: 2,
    }));
    assert!(violations.iter().any(|v| matches!(
        v,
        Violation::TypeTagMismatch { tagged, actual, .. }
            if tagged == "SoftwareProxyIn" && actual == "DeviceProxyIn"
    )));
    // Reopening v1 also desynchronizes its hasVersion edges.
    assert!(violations
        .iter()
        .any(|v| v.invariant() == Invariant::ChainLinkage));
}

#[test]
fn test_export_refused_for_invalid_and_allowed_for_valid() {
    let clock = Arc::new(ManualClock::new(Timestamp::new(0)));
    let mut dataset = dataset_with(&["acme"], clock);
    let graph = dataset.tenant_mut(&TenantId::from("acme")).unwrap();
    let a = graph.create_asset(AssetKind::Device, device("E1", "1")).unwrap();
    let site = graph.create_asset(AssetKind::Location, location("yard")).unwrap();
    graph.relate(RelationKind::Location, &a, &site).unwrap();

    let bundle = dataset.export().unwrap();
    assert!(bundle.report.is_clean());
    assert_eq!(bundle.batches.collection("hasLocation").len(), 1);
    assert!(!bundle.indexes.is_empty());
}

// ============================================================================
// Evolution
// ============================================================================

#[test]
fn test_anchor_keys_survive_mutation_and_deletion_does_not_reuse_keys() {
    let clock = Arc::new(ManualClock::new(Timestamp::new(0)));
    let mut dataset = dataset_with(&["acme"], clock.clone());
    let acme = TenantId::from("acme");

    let graph = dataset.tenant_mut(&acme).unwrap();
    let a = graph.create_asset(AssetKind::Device, device("K1", "1")).unwrap();
    let b = graph.create_asset(AssetKind::Device, device("K2", "1")).unwrap();
    graph.relate(RelationKind::Connection, &a, &b).unwrap();
    let before = dataset.snapshot();

    clock.set(Timestamp::new(50));
    let graph = dataset.tenant_mut(&acme).unwrap();
    graph
        .observe_new_configuration(&b, device("K2", "2"), Timestamp::new(40))
        .unwrap();
    graph.remove_asset(&a).unwrap();
    let c = graph.create_asset(AssetKind::Device, device("K3", "1")).unwrap();
    let after = dataset.snapshot();

    assert!(IntegrityValidator::validate_evolution(&before, &after).is_ok());
    assert!(IntegrityValidator::validate(&after).is_ok());
    assert_ne!(c.proxy_in, a.proxy_in);
    assert_ne!(c.proxy_out, a.proxy_out);
    assert!(after.tenants[0].relationships.is_empty());
}

#[test]
fn test_evolution_flags_rewritten_anchor() {
    let clock = Arc::new(ManualClock::new(Timestamp::new(0)));
    let mut dataset = dataset_with(&["acme"], clock);
    dataset
        .tenant_mut(&TenantId::from("acme"))
        .unwrap()
        .create_asset(AssetKind::Location, location("hq"))
        .unwrap();
    let before = dataset.snapshot();
    let mut after = before.clone();
    after.tenants[0].assets[0].proxy_out.key = DocKey::from("t-acme:LocationProxyOut-99");

    let violations = IntegrityValidator::validate_evolution(&before, &after).unwrap_err();
    assert_eq!(violations.len(), 1);
    assert!(matches!(
        violations[0],
        Violation::AnchorChanged {
            role: VertexRole::ProxyOut,
            ..
        }
    ));
}
