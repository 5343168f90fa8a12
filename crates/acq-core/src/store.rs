//! On-disk datastore layout shared by the mock gateway and the QC tool.
//!
//! A run's data directory contains:
//!
//! ```text
//! <data_dir>/
//!   stacks/
//!     <label>_<config_name>.raw    little-endian u16 slices, concatenated
//!     <label>_<config_name>.json   sidecar, one StackMetadata
//!   manifest.json                  RunManifest, written by finalize_store
//!   acquisition-summary.json       RunSummary, written by the engine
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::AcqResult;
use crate::position::WellId;

/// Subdirectory of the data directory that holds stack files.
pub const STACKS_DIR: &str = "stacks";
/// Manifest file written when the store is finalized.
pub const MANIFEST_FILE: &str = "manifest.json";
/// Run summary file written by the acquisition engine.
pub const SUMMARY_FILE: &str = "acquisition-summary.json";

/// Sidecar metadata for one stored z-stack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackMetadata {
    pub label: String,
    pub well: WellId,
    pub site: u32,
    pub config_name: String,
    pub exposure_time_ms: f64,
    pub laser_power: f64,
    pub width: u32,
    pub height: u32,
    pub num_slices: u32,
}

impl StackMetadata {
    /// Base file name (no extension) for this stack's raw and sidecar files.
    pub fn file_stem(&self) -> String {
        format!("{}_{}", self.label, self.config_name)
    }
}

/// Manifest written once when the datastore is finalized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunManifest {
    pub num_stacks: usize,
    pub stacks: Vec<StackMetadata>,
}

/// Load all stack sidecars under `<root>/stacks`, sorted by file name.
pub fn read_sidecars(root: &Path) -> AcqResult<Vec<(PathBuf, StackMetadata)>> {
    let stacks_dir = root.join(STACKS_DIR);
    let mut entries = Vec::new();
    if !stacks_dir.is_dir() {
        return Ok(entries);
    }
    for entry in std::fs::read_dir(&stacks_dir)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let text = std::fs::read_to_string(&path)?;
        let meta: StackMetadata = serde_json::from_str(&text)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        entries.push((path, meta));
    }
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_meta() -> StackMetadata {
        StackMetadata {
            label: "B7-Site_3".to_string(),
            well: WellId::new('B', 7),
            site: 3,
            config_name: "EMCCD_Confocal40_GFP".to_string(),
            exposure_time_ms: 50.0,
            laser_power: 10.0,
            width: 64,
            height: 64,
            num_slices: 5,
        }
    }

    #[test]
    fn file_stem_combines_label_and_config() {
        assert_eq!(sample_meta().file_stem(), "B7-Site_3_EMCCD_Confocal40_GFP");
    }

    #[test]
    fn sidecars_round_trip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let stacks = dir.path().join(STACKS_DIR);
        std::fs::create_dir_all(&stacks).unwrap();
        let meta = sample_meta();
        let text = serde_json::to_string_pretty(&meta).unwrap();
        std::fs::write(stacks.join(format!("{}.json", meta.file_stem())), text).unwrap();

        let loaded = read_sidecars(dir.path()).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].1, meta);
    }

    #[test]
    fn missing_stacks_dir_yields_empty_list() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_sidecars(dir.path()).unwrap().is_empty());
    }
}
