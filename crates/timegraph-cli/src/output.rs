//! Filesystem side of the CLI: the core hands over plain data, this module
//! decides where it lands.
//!
//! Layout of an export directory:
//!
//! ```text
//! out/
//!   collections/<Collection>.json   one JSON array per collection
//!   indexes.json                    index definitions
//!   violations.json                 the validator's report
//!   snapshot.json                   full dataset snapshot (for validate/time-travel)
//! ```

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use timegraph_core::{DatasetSnapshot, ExportBundle, ViolationReport};

pub const COLLECTIONS_DIR: &str = "collections";
pub const INDEXES_FILE: &str = "indexes.json";
pub const VIOLATIONS_FILE: &str = "violations.json";
pub const SNAPSHOT_FILE: &str = "snapshot.json";

pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let text = serde_json::to_string_pretty(value)?;
    fs::write(path, text).with_context(|| format!("failed to write {}", path.display()))
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("failed to parse {}", path.display()))
}

pub fn read_snapshot(path: &Path) -> Result<DatasetSnapshot> {
    read_json(path)
}

pub fn write_report(dir: &Path, report: &ViolationReport) -> Result<PathBuf> {
    let path = dir.join(VIOLATIONS_FILE);
    write_json(&path, report)?;
    Ok(path)
}

/// Write every batch, the index spec, the report and the snapshot. Returns
/// the written paths in write order.
pub fn write_export(
    dir: &Path,
    bundle: &ExportBundle,
    snapshot: &DatasetSnapshot,
) -> Result<Vec<PathBuf>> {
    let mut written = Vec::new();
    for (collection, docs) in bundle.batches.collections() {
        let path = dir.join(COLLECTIONS_DIR).join(format!("{collection}.json"));
        write_json(&path, docs)?;
        written.push(path);
    }

    let indexes = dir.join(INDEXES_FILE);
    write_json(&indexes, &bundle.indexes)?;
    written.push(indexes);

    written.push(write_report(dir, &bundle.report)?);

    let snapshot_path = dir.join(SNAPSHOT_FILE);
    write_json(&snapshot_path, snapshot)?;
    written.push(snapshot_path);
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use timegraph_core::{AssetKind, Dataset, ManualClock, Payload, TenantConfig, Timestamp};

    fn dataset() -> Dataset {
        let mut dataset = Dataset::new();
        dataset
            .register_tenant(
                &TenantConfig::new("acme", 100),
                Arc::new(ManualClock::new(Timestamp::new(0))),
            )
            .unwrap()
            .create_asset(
                AssetKind::Location,
                Payload::new().with("name", "hq").with("address", "1 Main St"),
            )
            .unwrap();
        dataset
    }

    #[test]
    fn test_write_export_layout() {
        let dir = tempfile::tempdir().unwrap();
        let dataset = dataset();
        let bundle = dataset.export().unwrap();
        let written = write_export(dir.path(), &bundle, &dataset.snapshot()).unwrap();

        assert_eq!(written.len(), 13 + 3);
        let anchors: Vec<serde_json::Value> =
            read_json(&dir.path().join(COLLECTIONS_DIR).join("LocationProxyIn.json")).unwrap();
        assert_eq!(anchors.len(), 1);
        assert_eq!(anchors[0]["tenantId"], "t-acme");
        assert!(dir.path().join(INDEXES_FILE).exists());
    }

    #[test]
    fn test_snapshot_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = dataset().snapshot();
        let path = dir.path().join(SNAPSHOT_FILE);
        write_json(&path, &snapshot).unwrap();
        assert_eq!(read_snapshot(&path).unwrap(), snapshot);
    }

    #[test]
    fn test_read_missing_file_has_context() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_snapshot(&dir.path().join("nope.json")).unwrap_err();
        assert!(err.to_string().contains("failed to read"));
    }
}
