//! Identifiers and collection identities.
//!
//! Collection names are the literal strings written into `_fromType` /
//! `_toType` and used as document-batch names, so they live here as
//! `&'static str` and are never assembled at runtime.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(raw: impl Into<String>) -> Self {
                Self(raw.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(raw: &str) -> Self {
                Self(raw.to_string())
            }
        }
    };
}

string_id!(
    /// Opaque tenant identifier as supplied by configuration.
    TenantId
);
string_id!(
    /// The smart partitioning attribute shared by every entity of one tenant.
    PartitionKey
);
string_id!(
    /// Document key. Unique across a dataset because it embeds the partition.
    DocKey
);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    Device,
    Software,
    Location,
}

impl AssetKind {
    pub const ALL: [AssetKind; 3] = [AssetKind::Device, AssetKind::Software, AssetKind::Location];

    pub const fn name(self) -> &'static str {
        match self {
            AssetKind::Device => "Device",
            AssetKind::Software => "Software",
            AssetKind::Location => "Location",
        }
    }

    /// Semantic payload fields every version of this kind must carry.
    pub const fn required_fields(self) -> &'static [&'static str] {
        match self {
            AssetKind::Device => &["name", "device_type", "model", "serial_number", "os_version"],
            AssetKind::Software => &["name", "version", "vendor"],
            AssetKind::Location => &["name", "address"],
        }
    }
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum VertexRole {
    ProxyIn,
    ProxyOut,
    Version,
}

/// Identity of a vertex collection: one per `(AssetKind, VertexRole)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Collection {
    pub kind: AssetKind,
    pub role: VertexRole,
}

impl Collection {
    pub const fn new(kind: AssetKind, role: VertexRole) -> Self {
        Self { kind, role }
    }

    pub const fn version(kind: AssetKind) -> Self {
        Self::new(kind, VertexRole::Version)
    }

    pub const fn proxy_in(kind: AssetKind) -> Self {
        Self::new(kind, VertexRole::ProxyIn)
    }

    pub const fn proxy_out(kind: AssetKind) -> Self {
        Self::new(kind, VertexRole::ProxyOut)
    }

    pub const fn name(self) -> &'static str {
        use AssetKind::*;
        use VertexRole::*;
        match (self.kind, self.role) {
            (Device, Version) => "Device",
            (Device, ProxyIn) => "DeviceProxyIn",
            (Device, ProxyOut) => "DeviceProxyOut",
            (Software, Version) => "Software",
            (Software, ProxyIn) => "SoftwareProxyIn",
            (Software, ProxyOut) => "SoftwareProxyOut",
            (Location, Version) => "Location",
            (Location, ProxyIn) => "LocationProxyIn",
            (Location, ProxyOut) => "LocationProxyOut",
        }
    }

    pub fn all() -> impl Iterator<Item = Collection> {
        AssetKind::ALL.into_iter().flat_map(|kind| {
            [VertexRole::ProxyIn, VertexRole::ProxyOut, VertexRole::Version]
                .into_iter()
                .map(move |role| Collection::new(kind, role))
        })
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EdgeCollection {
    HasVersion,
    HasConnection,
    HasDeviceSoftware,
    HasLocation,
}

impl EdgeCollection {
    pub const ALL: [EdgeCollection; 4] = [
        EdgeCollection::HasVersion,
        EdgeCollection::HasConnection,
        EdgeCollection::HasDeviceSoftware,
        EdgeCollection::HasLocation,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            EdgeCollection::HasVersion => "hasVersion",
            EdgeCollection::HasConnection => "hasConnection",
            EdgeCollection::HasDeviceSoftware => "hasDeviceSoftware",
            EdgeCollection::HasLocation => "hasLocation",
        }
    }

    pub const fn relation(self) -> Option<RelationKind> {
        match self {
            EdgeCollection::HasVersion => None,
            EdgeCollection::HasConnection => Some(RelationKind::Connection),
            EdgeCollection::HasDeviceSoftware => Some(RelationKind::DeviceSoftware),
            EdgeCollection::HasLocation => Some(RelationKind::Location),
        }
    }
}

impl fmt::Display for EdgeCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Relationship edges between two assets of one tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RelationKind {
    Connection,
    DeviceSoftware,
    Location,
}

impl RelationKind {
    pub const fn collection(self) -> EdgeCollection {
        match self {
            RelationKind::Connection => EdgeCollection::HasConnection,
            RelationKind::DeviceSoftware => EdgeCollection::HasDeviceSoftware,
            RelationKind::Location => EdgeCollection::HasLocation,
        }
    }

    /// `(source kind, target kind)`.
    pub const fn endpoints(self) -> (AssetKind, AssetKind) {
        match self {
            RelationKind::Connection => (AssetKind::Device, AssetKind::Device),
            RelationKind::DeviceSoftware => (AssetKind::Device, AssetKind::Software),
            RelationKind::Location => (AssetKind::Device, AssetKind::Location),
        }
    }
}

impl fmt::Display for RelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.collection().name())
    }
}

/// Fully-qualified vertex reference, rendered `Collection/key` in `_from`/`_to`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VertexId {
    pub collection: Collection,
    pub key: DocKey,
}

impl VertexId {
    pub fn new(collection: Collection, key: DocKey) -> Self {
        Self { collection, key }
    }
}

impl fmt::Display for VertexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection.name(), self.key)
    }
}
