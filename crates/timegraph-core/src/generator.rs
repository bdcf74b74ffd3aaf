//! Deterministic synthetic dataset generation.
//!
//! Each tenant is generated in three phases against its own [`ManualClock`]:
//!
//! 1. create every configured asset at `startAt`,
//! 2. wire relationships (device → location, device → software,
//!    device → device),
//! 3. run `historyDepth` rounds, each advancing the clock by
//!    `mutationInterval` and observing a new configuration for every device
//!    and software asset.
//!
//! Tenants share nothing, so they are generated in parallel. Cancellation is
//! polled between assets; whatever was completed before the flag was seen is a
//! valid (smaller) graph.

use crate::chain::AssetHandle;
use crate::config::{GeneratorConfig, TenantConfig};
use crate::error::Result;
use crate::graph::{Dataset, TenantGraph};
use crate::ids::{AssetKind, RelationKind, TenantId};
use crate::payload::Payload;
use crate::tenant::Tenant;
use crate::time::{ManualClock, Timestamp};
use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Small deterministic RNG so datasets are reproducible from a seed.
#[derive(Debug, Clone)]
pub(crate) struct XorShift64 {
    state: u64,
}

impl XorShift64 {
    pub(crate) fn new(seed: u64) -> Self {
        // All-zero state never leaves zero.
        let state = if seed == 0 { 0x9e37_79b9_7f4a_7c15 } else { seed };
        Self { state }
    }

    pub(crate) fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545_f491_4f6c_dd1d)
    }

    pub(crate) fn below(&mut self, upper: usize) -> usize {
        if upper == 0 {
            return 0;
        }
        (self.next_u64() % (upper as u64)) as usize
    }

    pub(crate) fn pick<'a, T>(&mut self, items: &'a [T]) -> Option<&'a T> {
        if items.is_empty() {
            None
        } else {
            items.get(self.below(items.len()))
        }
    }

    pub(crate) fn chance(&mut self, one_in: usize) -> bool {
        self.below(one_in) == 0
    }
}

/// Per-tenant seed: the run seed mixed with the partition key (FNV-1a), so
/// tenants differ but each is reproducible on its own.
fn tenant_seed(seed: u64, tenant: &Tenant) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in tenant.partition.as_str().bytes() {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    seed ^ hash
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationOptions {
    pub seed: u64,
    pub start_at: Timestamp,
    pub history_depth: usize,
    pub mutation_interval: i64,
    pub relations_per_device: usize,
}

impl GenerationOptions {
    pub fn from_config(config: &GeneratorConfig) -> Self {
        Self {
            seed: config.seed,
            start_at: config.start_timestamp(),
            history_depth: config.history_depth,
            mutation_interval: config.mutation_interval,
            relations_per_device: config.relations_per_device,
        }
    }
}

#[derive(Debug)]
pub struct GeneratedTenant {
    pub graph: TenantGraph,
    pub cancelled: bool,
}

#[derive(Debug)]
pub struct GeneratedDataset {
    pub dataset: Dataset,
    pub cancelled_tenants: Vec<TenantId>,
}

impl GeneratedDataset {
    pub fn is_complete(&self) -> bool {
        self.cancelled_tenants.is_empty()
    }
}

// ============================================================================
// Payload synthesis
// ============================================================================

const DEVICE_TYPES: &[(&str, &[&str])] = &[
    ("router", &["MX204", "ASR1001", "ISR4331"]),
    ("switch", &["EX4300", "C9300", "S5720"]),
    ("firewall", &["PA-220", "FG-60F", "SRX300"]),
    ("access-point", &["AP515", "MR46", "U6-LR"]),
];

const SOFTWARE: &[(&str, &str)] = &[
    ("openssh", "OpenBSD"),
    ("nginx", "F5"),
    ("postgresql", "PGDG"),
    ("redis", "Redis Ltd"),
    ("bind9", "ISC"),
];

const STREETS: &[&str] = &["Main St", "Harbor Rd", "Station Ave", "Mill Ln", "Park Blvd"];

fn semver(rng: &mut XorShift64) -> String {
    format!("{}.{}.{}", 1 + rng.below(9), rng.below(20), rng.below(50))
}

fn synth_payload(kind: AssetKind, index: usize, rng: &mut XorShift64) -> Payload {
    match kind {
        AssetKind::Device => {
            let (device_type, models) = DEVICE_TYPES[rng.below(DEVICE_TYPES.len())];
            let model = rng.pick(models).copied().unwrap_or("generic");
            Payload::new()
                .with("name", format!("{device_type}-{index:04}"))
                .with("device_type", device_type)
                .with("model", model)
                .with("serial_number", format!("SN{:010X}", rng.next_u64() >> 24))
                .with("os_version", semver(rng))
        }
        AssetKind::Software => {
            let (name, vendor) = SOFTWARE[rng.below(SOFTWARE.len())];
            Payload::new()
                .with("name", name)
                .with("version", semver(rng))
                .with("vendor", vendor)
        }
        AssetKind::Location => {
            let street = rng.pick(STREETS).copied().unwrap_or("Main St");
            Payload::new()
                .with("name", format!("site-{index:03}"))
                .with("address", format!("{} {street}", 1 + rng.below(999)))
        }
    }
}

/// The field a configuration change touches, per kind.
fn churn_field(kind: AssetKind) -> Option<&'static str> {
    match kind {
        AssetKind::Device => Some("os_version"),
        AssetKind::Software => Some("version"),
        AssetKind::Location => None,
    }
}

// ============================================================================
// Generation
// ============================================================================

struct Live {
    handle: AssetHandle,
    payload: Payload,
}

/// Generate one tenant's graph. `tenant` must already be registered.
pub fn generate_tenant(
    config: &TenantConfig,
    tenant: Tenant,
    options: &GenerationOptions,
    cancel: &AtomicBool,
) -> Result<GeneratedTenant> {
    let policy = config.retention_policy()?;
    let clock = Arc::new(ManualClock::new(options.start_at));
    let mut rng = XorShift64::new(tenant_seed(options.seed, &tenant));
    let mut graph = TenantGraph::new(tenant, config.naming_convention, policy, clock.clone());
    let cancelled = || cancel.load(Ordering::Relaxed);

    // Phase 1: assets.
    let mut live: Vec<Live> = Vec::new();
    for kind in AssetKind::ALL {
        for index in 0..config.count(kind) {
            if cancelled() {
                return Ok(finish(graph, true));
            }
            let payload = synth_payload(kind, index, &mut rng);
            let handle = graph.create_asset(kind, payload.clone())?;
            live.push(Live { handle, payload });
        }
    }

    // Phase 2: relationships.
    let of_kind = |kind: AssetKind| -> Vec<AssetHandle> {
        live.iter()
            .filter(|l| l.handle.kind == kind)
            .map(|l| l.handle.clone())
            .collect()
    };
    let devices = of_kind(AssetKind::Device);
    let software = of_kind(AssetKind::Software);
    let locations = of_kind(AssetKind::Location);
    let mut connections = Vec::new();
    for device in &devices {
        if cancelled() {
            return Ok(finish(graph, true));
        }
        if let Some(site) = rng.pick(&locations) {
            graph.relate(RelationKind::Location, device, site)?;
        }
        for _ in 0..options.relations_per_device {
            if let Some(install) = rng.pick(&software) {
                graph.relate(RelationKind::DeviceSoftware, device, install)?;
            }
            if let Some(peer) = rng.pick(&devices) {
                if peer.asset_key() != device.asset_key() {
                    connections.push(graph.relate(RelationKind::Connection, device, peer)?.key);
                }
            }
        }
    }

    // Phase 3: history.
    for _ in 0..options.history_depth {
        let now = clock.advance(options.mutation_interval);
        for asset in live.iter_mut() {
            let Some(field) = churn_field(asset.handle.kind) else {
                continue;
            };
            if cancelled() {
                return Ok(finish(graph, true));
            }
            let payload = asset.payload.clone().with(field, semver(&mut rng));
            asset.handle = graph.observe_new_configuration(&asset.handle, payload.clone(), now)?;
            asset.payload = payload;
        }
        // Links flap now and then.
        if !connections.is_empty() && rng.chance(4) {
            let key = connections.swap_remove(rng.below(connections.len()));
            graph.retire_relationship(&key, now)?;
        }
    }

    Ok(finish(graph, false))
}

fn finish(graph: TenantGraph, cancelled: bool) -> GeneratedTenant {
    tracing::info!(
        tenant = %graph.tenant().id,
        partition = %graph.partition(),
        assets = graph.asset_count(),
        relationships = graph.relationships().len(),
        cancelled,
        "generated tenant"
    );
    GeneratedTenant { graph, cancelled }
}

/// Register every tenant (duplicates are fatal), then generate them in
/// parallel.
pub fn generate_dataset(config: &GeneratorConfig, cancel: &AtomicBool) -> Result<GeneratedDataset> {
    config.validate()?;
    let options = GenerationOptions::from_config(config);

    let mut dataset = Dataset::new();
    let mut reserved = Vec::with_capacity(config.tenants.len());
    for tenant_config in &config.tenants {
        reserved.push((dataset.reserve(&tenant_config.tenant_id)?, tenant_config));
    }

    let generated: Vec<Result<GeneratedTenant>> = reserved
        .into_par_iter()
        .map(|(tenant, tenant_config)| generate_tenant(tenant_config, tenant, &options, cancel))
        .collect();

    let mut cancelled_tenants = Vec::new();
    for outcome in generated {
        let outcome = outcome?;
        if outcome.cancelled {
            cancelled_tenants.push(outcome.graph.tenant().id.clone());
        }
        dataset.attach(outcome.graph)?;
    }

    tracing::info!(
        tenants = dataset.len(),
        cancelled = cancelled_tenants.len(),
        "generated dataset"
    );
    Ok(GeneratedDataset {
        dataset,
        cancelled_tenants,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TimegraphError;
    use crate::ids::PartitionKey;
    use crate::validator::IntegrityValidator;

    fn config() -> GeneratorConfig {
        let mut config = GeneratorConfig::new(vec![
            TenantConfig::new("alpha", 600)
                .with_count(AssetKind::Device, 6)
                .with_count(AssetKind::Software, 3)
                .with_count(AssetKind::Location, 2),
            TenantConfig::new("beta", 600)
                .with_count(AssetKind::Device, 4)
                .with_count(AssetKind::Location, 1),
        ]);
        config.history_depth = 3;
        config.relations_per_device = 2;
        config
    }

    #[test]
    fn test_xorshift_is_deterministic() {
        let mut a = XorShift64::new(7);
        let mut b = XorShift64::new(7);
        for _ in 0..16 {
            assert_eq!(a.next_u64(), b.next_u64());
        }
        assert_eq!(XorShift64::new(0).below(0), 0);
    }

    #[test]
    fn test_generated_dataset_is_valid() {
        let out = generate_dataset(&config(), &AtomicBool::new(false)).unwrap();
        assert!(out.is_complete());
        assert_eq!(out.dataset.len(), 2);
        let report = out.dataset.validate();
        assert!(report.is_clean(), "{:?}", report.violations);
        assert_eq!(report.assets_checked, 16);
    }

    #[test]
    fn test_history_depth_shapes_chains() {
        let out = generate_dataset(&config(), &AtomicBool::new(false)).unwrap();
        let alpha = out.dataset.tenant(&TenantId::from("alpha")).unwrap();
        for handle in alpha.handles().unwrap() {
            let chain = alpha.chain(handle.asset_key()).unwrap();
            let expected = if handle.kind == AssetKind::Location { 1 } else { 4 };
            assert_eq!(chain.versions().len(), expected);
        }
    }

    #[test]
    fn test_generation_is_reproducible() {
        let a = generate_dataset(&config(), &AtomicBool::new(false)).unwrap();
        let b = generate_dataset(&config(), &AtomicBool::new(false)).unwrap();
        assert_eq!(a.dataset.snapshot(), b.dataset.snapshot());
    }

    #[test]
    fn test_cancelled_before_start_yields_empty_valid_graphs() {
        let out = generate_dataset(&config(), &AtomicBool::new(true)).unwrap();
        assert_eq!(out.cancelled_tenants.len(), 2);
        assert_eq!(out.dataset.len(), 2);
        assert!(IntegrityValidator::validate(&out.dataset.snapshot()).is_ok());
        assert!(out.dataset.graphs().all(|g| g.asset_count() == 0));
    }

    #[test]
    fn test_history_reaching_never_is_refused() {
        let mut config = config();
        config.history_depth = 1;
        config.mutation_interval = i64::MAX - config.start_timestamp().raw();
        assert!(matches!(
            generate_dataset(&config, &AtomicBool::new(false)),
            Err(TimegraphError::Config(_))
        ));
    }

    #[test]
    fn test_duplicate_tenant_is_fatal() {
        let config = GeneratorConfig::new(vec![
            TenantConfig::new("Acme Corp", 10),
            TenantConfig::new("acme-corp", 10),
        ]);
        assert!(generate_dataset(&config, &AtomicBool::new(false)).is_err());
    }

    #[test]
    fn test_single_tenant_generation() {
        let tenant = Tenant {
            id: TenantId::from("solo"),
            partition: PartitionKey::from("t-solo"),
        };
        let tenant_config = TenantConfig::new("solo", 100).with_count(AssetKind::Software, 2);
        let options =
            GenerationOptions::from_config(&GeneratorConfig::new(vec![tenant_config.clone()]));
        let out =
            generate_tenant(&tenant_config, tenant, &options, &AtomicBool::new(false)).unwrap();
        assert!(!out.cancelled);
        assert_eq!(out.graph.asset_count(), 2);
        assert!(out.graph.relationships().is_empty());
    }
}
