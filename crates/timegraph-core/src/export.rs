//! Import-ready document batches and index definitions.
//!
//! Every document is rendered through its tenant's [`FieldFormatter`], so a
//! `primary` tenant writes `createdAt` where an `alternate` tenant writes
//! `created_at`. System attributes (`_key`, `_from`, `_to`, `_fromType`,
//! `_toType`) are literal in both.
//!
//! Batches are keyed by collection name and always list every collection,
//! empty or not, so consumers can create collections up front.

use crate::chain::{ProxyAnchor, VersionVertex};
use crate::edge::Edge;
use crate::ids::{AssetKind, Collection, EdgeCollection, PartitionKey};
use crate::naming::{fields, FieldFormatter, NamingConvention};
use crate::snapshot::DatasetSnapshot;
use crate::time::{Timestamp, Validity};
use crate::validator::ViolationReport;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};

// ============================================================================
// Document batches
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentBatches(BTreeMap<String, Vec<Value>>);

impl DocumentBatches {
    pub fn from_snapshot(snapshot: &DatasetSnapshot) -> Self {
        let mut batches: BTreeMap<String, Vec<Value>> = Collection::all()
            .map(|c| c.name())
            .chain(EdgeCollection::ALL.iter().map(|c| c.name()))
            .map(|name| (name.to_string(), Vec::new()))
            .collect();
        let mut push = |collection: &str, doc: Value| {
            batches.entry(collection.to_string()).or_default().push(doc);
        };

        for tenant in &snapshot.tenants {
            let render = DocumentRenderer::new(tenant.naming, &tenant.partition);
            for asset in &tenant.assets {
                push(asset.proxy_in.collection.name(), render.anchor(&asset.proxy_in));
                push(asset.proxy_out.collection.name(), render.anchor(&asset.proxy_out));
                for version in &asset.versions {
                    push(version.collection.name(), render.version(version));
                }
                for edge in &asset.has_version {
                    push(edge.collection.name(), render.edge(edge));
                }
            }
            for edge in &tenant.relationships {
                push(edge.collection.name(), render.edge(edge));
            }
        }
        Self(batches)
    }

    pub fn collection(&self, name: &str) -> &[Value] {
        self.0.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn collections(&self) -> impl Iterator<Item = (&str, &[Value])> {
        self.0.iter().map(|(name, docs)| (name.as_str(), docs.as_slice()))
    }

    pub fn document_count(&self) -> usize {
        self.0.values().map(Vec::len).sum()
    }

    pub fn into_inner(self) -> BTreeMap<String, Vec<Value>> {
        self.0
    }
}

struct DocumentRenderer<'a> {
    formatter: std::sync::Arc<dyn FieldFormatter>,
    partition: &'a PartitionKey,
}

impl<'a> DocumentRenderer<'a> {
    fn new(naming: NamingConvention, partition: &'a PartitionKey) -> Self {
        Self {
            formatter: naming.formatter(),
            partition,
        }
    }

    fn field(&self, name: &str) -> String {
        self.formatter.format(name)
    }

    fn base(&self, key: &str) -> Map<String, Value> {
        let mut doc = Map::new();
        doc.insert(fields::KEY.to_string(), Value::from(key));
        doc.insert(self.field(fields::TENANT_ID), Value::from(self.partition.as_str()));
        doc
    }

    fn lifecycle(&self, doc: &mut Map<String, Value>, validity: Validity, ttl: Option<Timestamp>) {
        doc.insert(self.field(fields::CREATED_AT), Value::from(validity.created_at.raw()));
        doc.insert(self.field(fields::EXPIRED_AT), Value::from(validity.expired_at.raw()));
        if let Some(ttl) = ttl {
            doc.insert(self.field(fields::TTL_EXPIRE_AT), Value::from(ttl.raw()));
        }
    }

    fn anchor(&self, anchor: &ProxyAnchor) -> Value {
        Value::Object(self.base(anchor.key.as_str()))
    }

    fn version(&self, version: &VersionVertex) -> Value {
        let mut doc = self.base(version.key.as_str());
        for (name, value) in version.payload.iter() {
            doc.insert(self.field(name), Value::from(value));
        }
        self.lifecycle(&mut doc, version.validity, version.ttl_expire_at);
        Value::Object(doc)
    }

    fn edge(&self, edge: &Edge) -> Value {
        let mut doc = self.base(edge.key.as_str());
        doc.insert(fields::FROM.to_string(), Value::from(edge.from.to_string()));
        doc.insert(fields::TO.to_string(), Value::from(edge.to.to_string()));
        doc.insert(fields::FROM_TYPE.to_string(), Value::from(edge.from_type.as_str()));
        doc.insert(fields::TO_TYPE.to_string(), Value::from(edge.to_type.as_str()));
        self.lifecycle(&mut doc, edge.validity, edge.ttl_expire_at);
        Value::Object(doc)
    }
}

// ============================================================================
// Index specification
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum IndexKind {
    Persistent,
    Ttl {
        #[serde(rename = "expireAfter")]
        expire_after: u64,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct IndexDefinition {
    pub collection: String,
    #[serde(flatten)]
    pub kind: IndexKind,
    pub fields: Vec<String>,
    pub sparse: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IndexSpec {
    pub indexes: Vec<IndexDefinition>,
}

impl IndexSpec {
    /// Indexes for every collection, once per distinct field spelling.
    ///
    /// - vertex-centric `[_from, _toType]` and `[_to, _fromType]` per edge collection
    /// - a range index on `[created_at, expired_at]` per versioned collection
    /// - a sparse TTL index (`expireAfter = 0`) on `ttl_expire_at` alongside it
    pub fn for_conventions(conventions: impl IntoIterator<Item = NamingConvention>) -> Self {
        let mut indexes = BTreeSet::new();
        let conventions: BTreeSet<NamingConvention> = conventions.into_iter().collect();

        for collection in EdgeCollection::ALL {
            for pair in [[fields::FROM, fields::TO_TYPE], [fields::TO, fields::FROM_TYPE]] {
                indexes.insert(IndexDefinition {
                    collection: collection.name().to_string(),
                    kind: IndexKind::Persistent,
                    fields: pair.iter().map(|f| f.to_string()).collect(),
                    sparse: false,
                });
            }
        }

        let versioned = AssetKind::ALL
            .iter()
            .map(|&kind| Collection::version(kind).name())
            .chain(EdgeCollection::ALL.iter().map(|c| c.name()));
        for collection in versioned {
            for naming in &conventions {
                let formatter = naming.formatter();
                indexes.insert(IndexDefinition {
                    collection: collection.to_string(),
                    kind: IndexKind::Persistent,
                    fields: vec![
                        formatter.format(fields::CREATED_AT),
                        formatter.format(fields::EXPIRED_AT),
                    ],
                    sparse: false,
                });
                indexes.insert(IndexDefinition {
                    collection: collection.to_string(),
                    kind: IndexKind::Ttl { expire_after: 0 },
                    fields: vec![formatter.format(fields::TTL_EXPIRE_AT)],
                    sparse: true,
                });
            }
        }

        Self {
            indexes: indexes.into_iter().collect(),
        }
    }

    pub fn for_snapshot(snapshot: &DatasetSnapshot) -> Self {
        Self::for_conventions(snapshot.tenants.iter().map(|t| t.naming))
    }

    pub fn on(&self, collection: &str) -> impl Iterator<Item = &IndexDefinition> {
        let collection = collection.to_string();
        self.indexes.iter().filter(move |i| i.collection == collection)
    }

    pub fn len(&self) -> usize {
        self.indexes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indexes.is_empty()
    }
}

// ============================================================================
// Bundle
// ============================================================================

/// Everything a downstream importer needs from one validated dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportBundle {
    pub batches: DocumentBatches,
    pub indexes: IndexSpec,
    pub report: ViolationReport,
}

impl ExportBundle {
    pub fn new(snapshot: &DatasetSnapshot, report: ViolationReport) -> Self {
        Self {
            batches: DocumentBatches::from_snapshot(snapshot),
            indexes: IndexSpec::for_snapshot(snapshot),
            report,
        }
    }
}
