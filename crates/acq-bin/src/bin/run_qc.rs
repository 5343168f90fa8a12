//! `run-qc`: post-hoc quality-control passes over an acquisition directory.
//!
//! Each flag toggles one independent action against the datastore layout
//! written by a run: summary inspection, max-intensity z-projections,
//! per-FOV metadata construction, and per-well FOV counts.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Parser;
use image::{ImageBuffer, Luma};
use tracing::info;
use tracing_subscriber::EnvFilter;

use acq_core::store::{read_sidecars, RunManifest, StackMetadata, MANIFEST_FILE, SUMMARY_FILE};
use acq_engine::RunSummary;

#[derive(Debug, Parser)]
#[command(name = "run-qc", about = "QC passes over a plate acquisition directory")]
struct Cli {
    /// Acquisition data directory (contains stacks/ and manifest.json)
    root_dir: PathBuf,

    /// Print the run summary and manifest counts
    #[arg(long)]
    inspect: bool,

    /// Write a max-intensity z-projection PNG next to each stack
    #[arg(long)]
    project: bool,

    /// Write per-well FOV counts as CSV
    #[arg(long)]
    plot: bool,

    /// Write per-FOV metadata JSON
    #[arg(long)]
    construct_metadata: bool,

    /// Allow overwriting previously constructed metadata
    #[arg(long)]
    overwrite: bool,

    /// Run the projection and plot actions together
    #[arg(long)]
    run_all: bool,
}

impl Cli {
    fn do_project(&self) -> bool {
        self.project || self.run_all
    }

    fn do_plot(&self) -> bool {
        self.plot || self.run_all
    }

    // Metadata construction rewrites files in place, so it only runs when
    // asked for by name, never as part of --run-all.
    fn do_construct_metadata(&self) -> bool {
        self.construct_metadata
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    if !cli.root_dir.is_dir() {
        bail!("'{}' is not a directory", cli.root_dir.display());
    }

    if cli.inspect {
        inspect(&cli.root_dir)?;
    }
    if cli.do_project() {
        project(&cli.root_dir)?;
    }
    if cli.do_plot() {
        plot(&cli.root_dir)?;
    }
    if cli.do_construct_metadata() {
        construct_metadata(&cli.root_dir, cli.overwrite)?;
    }
    Ok(())
}

/// Print the persisted run summary and the manifest's stack count.
fn inspect(root: &Path) -> Result<()> {
    let summary_path = root.join(SUMMARY_FILE);
    if summary_path.is_file() {
        let text = std::fs::read_to_string(&summary_path)?;
        let summary: RunSummary = serde_json::from_str(&text)
            .with_context(|| format!("unreadable summary at {}", summary_path.display()))?;
        println!(
            "visited {}  accepted {}  autoexposure runs {}  stacks {}",
            summary.positions_visited,
            summary.fovs_accepted,
            summary.autoexposure_runs,
            summary.stacks_captured
        );
        for skip in &summary.skipped {
            println!("  skipped #{} {} ({:?})", skip.index, skip.label, skip.reason);
        }
    } else {
        println!("no run summary found");
    }

    let manifest_path = root.join(MANIFEST_FILE);
    if manifest_path.is_file() {
        let text = std::fs::read_to_string(&manifest_path)?;
        let manifest: RunManifest = serde_json::from_str(&text)?;
        println!("manifest lists {} stacks", manifest.num_stacks);
    } else {
        println!("no manifest found (store not finalized?)");
    }
    Ok(())
}

/// Write a max-intensity z-projection PNG next to each stored stack.
fn project(root: &Path) -> Result<()> {
    for (sidecar_path, meta) in read_sidecars(root)? {
        let raw_path = sidecar_path.with_extension("raw");
        let projection = max_projection(&raw_path, &meta)?;
        let png_path = sidecar_path.with_extension("png");
        let image: ImageBuffer<Luma<u16>, Vec<u16>> =
            ImageBuffer::from_raw(meta.width, meta.height, projection)
                .context("projection buffer size mismatch")?;
        image
            .save(&png_path)
            .with_context(|| format!("writing {}", png_path.display()))?;
        info!(stack = %meta.label, config = %meta.config_name, "projection written");
    }
    Ok(())
}

/// Pixel-wise maximum across all slices of a stored raw stack.
fn max_projection(raw_path: &Path, meta: &StackMetadata) -> Result<Vec<u16>> {
    let bytes = std::fs::read(raw_path)
        .with_context(|| format!("reading {}", raw_path.display()))?;
    let slice_len = (meta.width * meta.height) as usize;
    let expected = slice_len * meta.num_slices as usize * 2;
    if bytes.len() != expected {
        bail!(
            "{}: expected {} bytes, found {}",
            raw_path.display(),
            expected,
            bytes.len()
        );
    }
    let mut projection = vec![0u16; slice_len];
    for (i, chunk) in bytes.chunks_exact(2).enumerate() {
        let value = u16::from_le_bytes([chunk[0], chunk[1]]);
        let px = &mut projection[i % slice_len];
        if value > *px {
            *px = value;
        }
    }
    Ok(projection)
}

/// Write per-well FOV counts as a two-column CSV, in plate order
/// (row-major by well indices, so A2 sorts before A10).
fn plot(root: &Path) -> Result<()> {
    let mut wells: BTreeMap<(u8, u8), (String, std::collections::BTreeSet<String>)> =
        BTreeMap::new();
    for (_, meta) in read_sidecars(root)? {
        let entry = wells
            .entry(meta.well.indices())
            .or_insert_with(|| (meta.well.to_string(), Default::default()));
        entry.1.insert(meta.label.clone());
    }
    let mut csv = String::from("well,num_fovs\n");
    for (well, labels) in wells.values() {
        writeln!(csv, "{},{}", well, labels.len())?;
    }
    let out = root.join("well-counts.csv");
    std::fs::write(&out, csv)?;
    info!(path = %out.display(), "well counts written");
    Ok(())
}

/// Write one metadata record per FOV, grouping the channel stacks that
/// share a position label.
fn construct_metadata(root: &Path, overwrite: bool) -> Result<()> {
    let out = root.join("fov-metadata.json");
    if out.exists() && !overwrite {
        bail!(
            "{} already exists; pass --overwrite to replace it",
            out.display()
        );
    }

    let mut fovs: BTreeMap<String, serde_json::Value> = BTreeMap::new();
    for (sidecar_path, meta) in read_sidecars(root)? {
        let entry = fovs.entry(meta.label.clone()).or_insert_with(|| {
            serde_json::json!({
                "label": meta.label,
                "well": meta.well.to_string(),
                "site": meta.site,
                "channels": [],
                "files": [],
            })
        });
        if let Some(channels) = entry["channels"].as_array_mut() {
            channels.push(meta.config_name.clone().into());
        }
        if let Some(files) = entry["files"].as_array_mut() {
            files.push(
                sidecar_path
                    .with_extension("raw")
                    .display()
                    .to_string()
                    .into(),
            );
        }
    }

    let records: Vec<&serde_json::Value> = fovs.values().collect();
    std::fs::write(&out, serde_json::to_string_pretty(&records)?)?;
    info!(path = %out.display(), num_fovs = fovs.len(), "FOV metadata written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use acq_core::store::STACKS_DIR;

    fn write_stack(root: &Path, label: &str, config: &str, pixels: &[[u16; 4]]) {
        let stacks = root.join(STACKS_DIR);
        std::fs::create_dir_all(&stacks).unwrap();
        let (well, site) = acq_core::position::parse_site_label(label).unwrap();
        let meta = StackMetadata {
            label: label.to_string(),
            well,
            site,
            config_name: config.to_string(),
            exposure_time_ms: 50.0,
            laser_power: 10.0,
            width: 2,
            height: 2,
            num_slices: pixels.len() as u32,
        };
        let mut raw = Vec::new();
        for slice in pixels {
            for px in slice {
                raw.extend_from_slice(&px.to_le_bytes());
            }
        }
        let stem = meta.file_stem();
        std::fs::write(stacks.join(format!("{stem}.raw")), raw).unwrap();
        std::fs::write(
            stacks.join(format!("{stem}.json")),
            serde_json::to_string(&meta).unwrap(),
        )
        .unwrap();
    }

    #[test]
    fn projection_takes_pixelwise_max() {
        let dir = tempfile::tempdir().unwrap();
        write_stack(
            dir.path(),
            "A1-Site_0",
            "DAPI",
            &[[10, 20, 30, 40], [40, 5, 35, 1]],
        );
        let (sidecar, meta) = read_sidecars(dir.path()).unwrap().remove(0);
        let projection = max_projection(&sidecar.with_extension("raw"), &meta).unwrap();
        assert_eq!(projection, vec![40, 20, 35, 40]);
    }

    #[test]
    fn project_writes_png_per_stack() {
        let dir = tempfile::tempdir().unwrap();
        write_stack(dir.path(), "A1-Site_0", "DAPI", &[[1, 2, 3, 4]]);
        write_stack(dir.path(), "A1-Site_0", "GFP", &[[5, 6, 7, 8]]);
        project(dir.path()).unwrap();
        assert!(dir
            .path()
            .join(STACKS_DIR)
            .join("A1-Site_0_DAPI.png")
            .exists());
        assert!(dir
            .path()
            .join(STACKS_DIR)
            .join("A1-Site_0_GFP.png")
            .exists());
    }

    #[test]
    fn plot_counts_fovs_per_well() {
        let dir = tempfile::tempdir().unwrap();
        write_stack(dir.path(), "A1-Site_0", "DAPI", &[[0; 4]]);
        write_stack(dir.path(), "A1-Site_0", "GFP", &[[0; 4]]);
        write_stack(dir.path(), "A1-Site_1", "DAPI", &[[0; 4]]);
        write_stack(dir.path(), "B2-Site_0", "DAPI", &[[0; 4]]);
        plot(dir.path()).unwrap();
        let csv = std::fs::read_to_string(dir.path().join("well-counts.csv")).unwrap();
        assert_eq!(csv, "well,num_fovs\nA1,2\nB2,1\n");
    }

    #[test]
    fn plot_orders_wells_by_plate_position() {
        let dir = tempfile::tempdir().unwrap();
        write_stack(dir.path(), "A10-Site_0", "DAPI", &[[0; 4]]);
        write_stack(dir.path(), "A2-Site_0", "DAPI", &[[0; 4]]);
        plot(dir.path()).unwrap();
        let csv = std::fs::read_to_string(dir.path().join("well-counts.csv")).unwrap();
        assert_eq!(csv, "well,num_fovs\nA2,1\nA10,1\n");
    }

    #[test]
    fn run_all_excludes_metadata_construction() {
        let cli = Cli::parse_from(["run-qc", "data", "--run-all"]);
        assert!(cli.do_project());
        assert!(cli.do_plot());
        assert!(!cli.do_construct_metadata());

        let cli = Cli::parse_from(["run-qc", "data", "--construct-metadata"]);
        assert!(cli.do_construct_metadata());
        assert!(!cli.do_project());
    }

    #[test]
    fn metadata_refuses_overwrite_without_flag() {
        let dir = tempfile::tempdir().unwrap();
        write_stack(dir.path(), "A1-Site_0", "DAPI", &[[0; 4]]);
        construct_metadata(dir.path(), false).unwrap();
        assert!(construct_metadata(dir.path(), false).is_err());
        construct_metadata(dir.path(), true).unwrap();

        let text = std::fs::read_to_string(dir.path().join("fov-metadata.json")).unwrap();
        let records: Vec<serde_json::Value> = serde_json::from_str(&text).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["well"], "A1");
        assert_eq!(records[0]["site"], 0);
    }
}
