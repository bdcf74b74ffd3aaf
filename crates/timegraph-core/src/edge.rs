//! Edge construction and type tagging.
//!
//! An [`EdgeDraft`] names the edge collection, key and validity window. It only
//! becomes an [`Edge`] by passing through [`EdgeTyper::type_edge`] with both
//! endpoints resolved, which is where tenant disjointness is enforced.

use crate::error::{Result, TimegraphError};
use crate::ids::{DocKey, EdgeCollection, PartitionKey, VertexId};
use crate::time::{Timestamp, Validity};
use crate::ttl::Lifecycle;
use serde::{Deserialize, Serialize};

/// A resolved edge endpoint: which vertex, in which collection, owned by which
/// partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointDescriptor {
    pub id: VertexId,
    pub partition: PartitionKey,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeDraft {
    pub collection: EdgeCollection,
    pub key: DocKey,
    pub validity: Validity,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub collection: EdgeCollection,
    pub key: DocKey,
    pub from: VertexId,
    pub to: VertexId,
    /// Literal collection name of `from`.
    pub from_type: String,
    /// Literal collection name of `to`.
    pub to_type: String,
    pub partition: PartitionKey,
    pub validity: Validity,
    pub ttl_expire_at: Option<Timestamp>,
}

impl Edge {
    pub fn is_current(&self) -> bool {
        self.validity.is_current()
    }

    pub fn touches(&self, key: &DocKey) -> bool {
        &self.from.key == key || &self.to.key == key
    }
}

impl Lifecycle for Edge {
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

#[derive(Debug, Clone, Copy, Default)]
pub struct EdgeTyper;

impl EdgeTyper {
    /// Attach endpoints, `_fromType`/`_toType` and the partition key.
    pub fn type_edge(
        draft: EdgeDraft,
        from: &EndpointDescriptor,
        to: &EndpointDescriptor,
    ) -> Result<Edge> {
        if from.partition != to.partition {
            return Err(TimegraphError::CrossTenantEdge {
                collection: draft.collection.name(),
                from: from.partition.clone(),
                to: to.partition.clone(),
            });
        }
        Ok(Edge {
            collection: draft.collection,
            key: draft.key,
            from_type: from.id.collection.name().to_string(),
            to_type: to.id.collection.name().to_string(),
            from: from.id.clone(),
            to: to.id.clone(),
            partition: from.partition.clone(),
            validity: draft.validity,
            ttl_expire_at: None,
        })
    }
}
