//! Timegraph: Temporally-Versioned, Tenant-Partitioned Graph Datasets
//!
//! Every logical asset (device, software install, location) is split into a
//! stable **identity** and a churning **configuration history**:
//!
//! ```text
//!   DeviceProxyIn ──hasVersion──► Device (v1, expired) ──hasVersion──► DeviceProxyOut
//!        │                                                                  ▲
//!        └────────hasVersion──► Device (v2, current) ──hasVersion──────────┘
//! ```
//!
//! - proxy anchors (`In`/`Out`) never change key for the lifetime of an asset,
//! - version vertices carry the payload and a `[createdAt, expiredAt)` window,
//! - relationship edges connect anchors of different assets, so they survive
//!   any number of configuration changes.
//!
//! Every vertex and edge is stamped with its tenant's partition key. Edges are
//! only ever built through [`EdgeTyper`], which refuses to connect two
//! partitions.
//!
//! ## Module Organization
//!
//! - `tenant` / `arena`: partition keys and per-tenant key allocation
//! - `chain` / `mutation`: building and evolving version chains
//! - `edge` / `ttl`: edge type tags and lifecycle stamping
//! - `validator` / `time_travel`: integrity gate and point-in-time queries
//! - `graph`: tenant graphs with per-asset exclusive sections, multi-tenant datasets
//! - `generator` / `export`: synthetic datasets and import-ready document batches

pub mod arena;
pub mod chain;
pub mod config;
pub mod edge;
pub mod error;
pub mod export;
pub mod generator;
pub mod graph;
pub mod ids;
pub mod mutation;
pub mod naming;
pub mod payload;
pub mod snapshot;
pub mod tenant;
pub mod time;
pub mod time_travel;
pub mod ttl;
pub mod validator;

pub use arena::KeyArena;
pub use chain::{AssetChain, AssetHandle, ProxyAnchor, ProxyVersionChainBuilder, VersionVertex};
pub use config::{GeneratorConfig, TenantConfig};
pub use edge::{Edge, EdgeDraft, EdgeTyper, EndpointDescriptor};
pub use error::{Result, TimegraphError};
pub use export::{DocumentBatches, ExportBundle, IndexDefinition, IndexKind, IndexSpec};
pub use generator::{generate_dataset, generate_tenant, GeneratedDataset, GenerationOptions};
pub use graph::{Dataset, TenantGraph};
pub use ids::{
    AssetKind, Collection, DocKey, EdgeCollection, PartitionKey, RelationKind, TenantId, VertexId,
    VertexRole,
};
pub use mutation::TemporalMutationEngine;
pub use naming::{CamelCase, FieldFormatter, NamingConvention, SnakeCase};
pub use payload::Payload;
pub use snapshot::{AssetRecord, DatasetSnapshot, TenantSnapshot};
pub use tenant::{Tenant, TenantPartitioner};
pub use time::{Clock, ManualClock, SystemClock, Timestamp, Validity};
pub use time_travel::{TimeTravelReconstructor, VersionSnapshot};
pub use ttl::{Lifecycle, RetentionPolicy, TtlPolicyEngine};
pub use validator::{IntegrityValidator, Invariant, Violation, ViolationReport};
