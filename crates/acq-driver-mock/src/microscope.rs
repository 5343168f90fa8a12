//! Mock implementation of [`MicroscopeGateway`].
//!
//! Simulates a plate microscope well enough to drive the acquisition
//! engine end to end: an HCS-style position list, an exposure model the
//! autoexposure loop can converge against, configurable fault injection
//! on the stage, focus unit, and camera, and an in-memory datastore that
//! optionally mirrors stacks to disk in the layout the QC tool reads.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::{sleep, Duration};
use tracing::{debug, trace};

use acq_core::capabilities::MicroscopeGateway;
use acq_core::error::{DeviceFault, FaultKind};
use acq_core::frame::RawImage;
use acq_core::position::{parse_site_label, Position, WellId};
use acq_core::settings::{ChannelSettings, StackSettings};
use acq_core::store::{RunManifest, StackMetadata, MANIFEST_FILE, STACKS_DIR};

use crate::common::MockMode;
use crate::fault::FaultConfig;
use crate::pattern::{generate_nucleus_field, scale_clip, ExposureState};

const STAGE: &str = "stage";
const AFC: &str = "afc";
const CAMERA: &str = "camera";
const STORE: &str = "store";

const OP_MOVE: &str = "move";
const OP_AUTOFOCUS: &str = "autofocus";
const OP_SNAP: &str = "snap";

// =============================================================================
// Builder
// =============================================================================

/// Builder for [`MockMicroscope`].
#[derive(Debug, Clone)]
pub struct MockMicroscopeBuilder {
    num_wells: u32,
    num_sites_per_well: u32,
    width: u32,
    height: u32,
    mode: MockMode,
    seed: u64,
    exposure_state: ExposureState,
    afc_failure_rate: f64,
    afc_fail_on_first_n_calls: u32,
    afc_always_fail_in_wells: Vec<WellId>,
    snap_error_rate: f64,
    fail_snap_once: bool,
    fail_move_once: bool,
    data_dir: Option<PathBuf>,
}

impl Default for MockMicroscopeBuilder {
    fn default() -> Self {
        Self {
            num_wells: 3,
            num_sites_per_well: 2,
            width: 64,
            height: 64,
            mode: MockMode::Instant,
            seed: 0,
            exposure_state: ExposureState::InBand,
            afc_failure_rate: 0.0,
            afc_fail_on_first_n_calls: 0,
            afc_always_fail_in_wells: Vec::new(),
            snap_error_rate: 0.0,
            fail_snap_once: false,
            fail_move_once: false,
            data_dir: None,
        }
    }
}

impl MockMicroscopeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Plate geometry: wells are filled row-major starting at A1.
    pub fn num_wells(mut self, wells: u32) -> Self {
        self.num_wells = wells;
        self
    }

    pub fn num_sites_per_well(mut self, sites: u32) -> Self {
        self.num_sites_per_well = sites;
        self
    }

    pub fn frame_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn mode(mut self, mode: MockMode) -> Self {
        self.mode = mode;
        self
    }

    /// Seed for fault decisions and synthetic images.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// How the simulated sample responds on the 488 nm signal channel.
    pub fn exposure_state(mut self, state: ExposureState) -> Self {
        self.exposure_state = state;
        self
    }

    /// Random transient autofocus failure rate.
    pub fn afc_failure_rate(mut self, rate: f64) -> Self {
        self.afc_failure_rate = rate;
        self
    }

    /// Autofocus fails on its first N calls (warm-up faults).
    pub fn afc_fail_on_first_n_calls(mut self, n: u32) -> Self {
        self.afc_fail_on_first_n_calls = n;
        self
    }

    /// Autofocus always fails in these wells (well-permanent faults).
    pub fn afc_always_fail_in_wells(mut self, wells: Vec<WellId>) -> Self {
        self.afc_always_fail_in_wells = wells;
        self
    }

    /// Random transient snap failure rate.
    pub fn snap_error_rate(mut self, rate: f64) -> Self {
        self.snap_error_rate = rate;
        self
    }

    /// Fail the next snap, then recover.
    pub fn fail_snap_once(mut self) -> Self {
        self.fail_snap_once = true;
        self
    }

    /// Fail the next stage move, then recover.
    pub fn fail_move_once(mut self) -> Self {
        self.fail_move_once = true;
        self
    }

    /// Mirror captured stacks to disk under this directory.
    pub fn data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }

    pub fn build(self) -> MockMicroscope {
        // One injection config, one RNG: the builder seed reproduces the
        // full fault sequence across all configured scenarios.
        let mut rates = HashMap::new();
        if self.afc_failure_rate > 0.0 {
            rates.insert(OP_AUTOFOCUS, self.afc_failure_rate);
        }
        if self.snap_error_rate > 0.0 {
            rates.insert(OP_SNAP, self.snap_error_rate);
        }
        let mut warm_up = HashMap::new();
        if self.afc_fail_on_first_n_calls > 0 {
            warm_up.insert(OP_AUTOFOCUS, self.afc_fail_on_first_n_calls);
        }
        let mut one_shot = HashSet::new();
        if self.fail_snap_once {
            one_shot.insert(OP_SNAP);
        }
        if self.fail_move_once {
            one_shot.insert(OP_MOVE);
        }
        let fault = FaultConfig::with_scenarios(rates, warm_up, one_shot, Some(self.seed));

        MockMicroscope {
            positions: hcs_position_list(self.num_wells, self.num_sites_per_well),
            width: self.width,
            height: self.height,
            mode: self.mode,
            seed: self.seed,
            exposure_state: self.exposure_state,
            fault,
            always_fail_wells: self.afc_always_fail_in_wells.into_iter().collect(),
            data_dir: self.data_dir,
            state: Arc::new(Mutex::new(DeviceState::default())),
        }
    }
}

/// Row-major HCS position list: `A1-Site_0`, `A1-Site_1`, `A2-Site_0`, ...
fn hcs_position_list(num_wells: u32, sites_per_well: u32) -> Vec<Position> {
    let mut positions = Vec::with_capacity((num_wells * sites_per_well) as usize);
    let mut index = 0;
    for w in 0..num_wells {
        let row = char::from(b'A' + (w / 12) as u8);
        let column = (w % 12) as u8 + 1;
        for site in 0..sites_per_well {
            positions.push(Position::new(index, format!("{row}{column}-Site_{site}")));
            index += 1;
        }
    }
    positions
}

// =============================================================================
// MockMicroscope
// =============================================================================

#[derive(Debug, Default)]
struct DeviceState {
    channel: Option<ChannelSettings>,
    exposure_ms: f64,
    laser_power: f64,
    current_position: Option<Position>,
    z_reference_reset: bool,
    finalized: bool,
    stacks: Vec<StackMetadata>,
    snap_count: u64,
    afc_calls: u32,
}

/// Mock microscope gateway with configurable fault injection.
pub struct MockMicroscope {
    positions: Vec<Position>,
    width: u32,
    height: u32,
    mode: MockMode,
    seed: u64,
    exposure_state: ExposureState,
    fault: FaultConfig,
    always_fail_wells: HashSet<WellId>,
    data_dir: Option<PathBuf>,
    state: Arc<Mutex<DeviceState>>,
}

impl MockMicroscope {
    pub fn builder() -> MockMicroscopeBuilder {
        MockMicroscopeBuilder::new()
    }

    async fn settle(&self, ms: u64) {
        if self.mode == MockMode::Realistic {
            sleep(Duration::from_millis(ms)).await;
        }
    }

    /// Intensity multiplier for the current channel and settings.
    ///
    /// The sample's exposure-state factor applies only on the 488 nm signal
    /// laser; the nuclear stain renders at its base intensity. Both scale
    /// linearly with power and exposure relative to the channel defaults.
    fn intensity_factor(
        &self,
        channel: &ChannelSettings,
        exposure_ms: f64,
        laser_power: f64,
    ) -> f64 {
        let relative = (laser_power * exposure_ms)
            / (channel.default_laser_power * channel.default_exposure_time);
        if channel.laser_name.contains("488") {
            self.exposure_state.factor() * relative
        } else {
            relative
        }
    }

    fn synth_frame(&self, seed: u64, factor: f64) -> RawImage {
        let base = generate_nucleus_field(self.width, self.height, seed);
        RawImage::new(self.width, self.height, scale_clip(&base, factor))
    }

    fn io_fault(device: &str, err: std::io::Error) -> DeviceFault {
        DeviceFault::new(device, FaultKind::Io, err.to_string())
    }

    // Test accessors

    pub fn snap_count(&self) -> u64 {
        self.state.lock().snap_count
    }

    pub fn afc_call_count(&self) -> u32 {
        self.state.lock().afc_calls
    }

    pub fn stacks(&self) -> Vec<StackMetadata> {
        self.state.lock().stacks.clone()
    }

    pub fn is_finalized(&self) -> bool {
        self.state.lock().finalized
    }
}

#[async_trait]
impl MicroscopeGateway for MockMicroscope {
    async fn position_list(&self) -> Result<Vec<Position>, DeviceFault> {
        Ok(self.positions.clone())
    }

    async fn reset_z_reference(&self) -> Result<(), DeviceFault> {
        self.settle(1).await;
        self.state.lock().z_reference_reset = true;
        Ok(())
    }

    async fn move_to(&self, position: &Position) -> Result<(), DeviceFault> {
        self.settle(5).await;
        self.fault.check(STAGE, OP_MOVE)?;
        trace!(label = %position.label, "stage move");
        let mut state = self.state.lock();
        state.current_position = Some(position.clone());
        state.z_reference_reset = false;
        Ok(())
    }

    async fn select_channel(&self, channel: &ChannelSettings) -> Result<(), DeviceFault> {
        self.settle(2).await;
        let mut state = self.state.lock();
        state.exposure_ms = channel.default_exposure_time;
        state.laser_power = channel.default_laser_power;
        state.channel = Some(channel.clone());
        Ok(())
    }

    async fn set_exposure(&self, exposure_ms: f64) -> Result<(), DeviceFault> {
        self.state.lock().exposure_ms = exposure_ms;
        Ok(())
    }

    async fn set_laser_power(&self, power: f64) -> Result<(), DeviceFault> {
        self.state.lock().laser_power = power;
        Ok(())
    }

    async fn autofocus(&self) -> Result<(), DeviceFault> {
        self.settle(20).await;
        let current_well = {
            let mut state = self.state.lock();
            state.afc_calls += 1;
            state
                .current_position
                .as_ref()
                .and_then(|p| parse_site_label(&p.label).ok())
                .map(|(well, _)| well)
        };
        if let Some(well) = current_well {
            if self.always_fail_wells.contains(&well) {
                return Err(DeviceFault::new(
                    AFC,
                    FaultKind::WellPermanent,
                    format!("no focus surface in well {}", well),
                ));
            }
        }
        self.fault.check(AFC, OP_AUTOFOCUS)
    }

    async fn snap(&self) -> Result<RawImage, DeviceFault> {
        self.settle(10).await;
        self.fault.check(CAMERA, OP_SNAP)?;
        let (seed, factor) = {
            let mut state = self.state.lock();
            state.snap_count += 1;
            let channel = state.channel.clone().ok_or_else(|| {
                DeviceFault::new(CAMERA, FaultKind::Transient, "no channel selected")
            })?;
            let seed = self.seed.wrapping_add(state.snap_count);
            let factor = self.intensity_factor(&channel, state.exposure_ms, state.laser_power);
            (seed, factor)
        };
        Ok(self.synth_frame(seed, factor))
    }

    async fn acquire_stack(
        &self,
        channel: &ChannelSettings,
        stack: &StackSettings,
        exposure_ms: f64,
        laser_power: f64,
    ) -> Result<(), DeviceFault> {
        self.settle(50).await;
        let position = {
            let state = self.state.lock();
            if state.finalized {
                return Err(DeviceFault::new(
                    STORE,
                    FaultKind::Io,
                    "store already finalized",
                ));
            }
            state.current_position.clone().ok_or_else(|| {
                DeviceFault::new(STAGE, FaultKind::Transient, "no position selected")
            })?
        };
        let (well, site) = parse_site_label(&position.label).map_err(|_| {
            DeviceFault::new(
                STAGE,
                FaultKind::Transient,
                format!("unparseable position label '{}'", position.label),
            )
        })?;

        let metadata = StackMetadata {
            label: position.label.clone(),
            well,
            site,
            config_name: channel.config_name.clone(),
            exposure_time_ms: exposure_ms,
            laser_power,
            width: self.width,
            height: self.height,
            num_slices: stack.num_slices(),
        };

        if let Some(root) = &self.data_dir {
            let stacks_dir = root.join(STACKS_DIR);
            std::fs::create_dir_all(&stacks_dir).map_err(|e| Self::io_fault(STORE, e))?;

            let factor = self.intensity_factor(channel, exposure_ms, laser_power);
            let mut raw = Vec::with_capacity(
                (metadata.width * metadata.height * metadata.num_slices) as usize * 2,
            );
            for slice in 0..metadata.num_slices {
                let seed = self
                    .seed
                    .wrapping_add(position.index as u64)
                    .wrapping_mul(131)
                    .wrapping_add(u64::from(slice));
                let frame = self.synth_frame(seed, factor);
                for px in frame.pixels {
                    raw.extend_from_slice(&px.to_le_bytes());
                }
            }
            let stem = metadata.file_stem();
            std::fs::write(stacks_dir.join(format!("{stem}.raw")), raw)
                .map_err(|e| Self::io_fault(STORE, e))?;
            let sidecar = serde_json::to_string_pretty(&metadata).map_err(|e| {
                DeviceFault::new(STORE, FaultKind::Io, e.to_string())
            })?;
            std::fs::write(stacks_dir.join(format!("{stem}.json")), sidecar)
                .map_err(|e| Self::io_fault(STORE, e))?;
        }

        debug!(label = %metadata.label, config = %metadata.config_name, "stack captured");
        self.state.lock().stacks.push(metadata);
        Ok(())
    }

    async fn finalize_store(&self) -> Result<(), DeviceFault> {
        let stacks = {
            let mut state = self.state.lock();
            if state.finalized {
                return Err(DeviceFault::new(
                    STORE,
                    FaultKind::Io,
                    "store already finalized",
                ));
            }
            state.finalized = true;
            state.stacks.clone()
        };
        if let Some(root) = &self.data_dir {
            let manifest = RunManifest {
                num_stacks: stacks.len(),
                stacks,
            };
            let text = serde_json::to_string_pretty(&manifest)
                .map_err(|e| DeviceFault::new(STORE, FaultKind::Io, e.to_string()))?;
            std::fs::write(root.join(MANIFEST_FILE), text)
                .map_err(|e| Self::io_fault(STORE, e))?;
        }
        debug!("store finalized");
        Ok(())
    }
}
