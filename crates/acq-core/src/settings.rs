//! Acquisition settings and configuration loading.
//!
//! Settings are layered with `figment`: compiled-in defaults first, then an
//! optional TOML file on top. After extraction, [`AcquisitionSettings::validate`]
//! catches values that parse but make no sense (negative exposures, inverted
//! intensity windows) before a run starts.
//!
//! The channel and stack constants mirror the plate imaging rig this system
//! was built for: an EMCCD camera behind the `Channels-EMCCD` config group,
//! with 405 nm (nuclear stain) and 488 nm (signal) laser lines.

use std::path::{Path, PathBuf};

use figment::providers::{Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::error::{AcqError, AcqResult};
use crate::position::WellMarker;

/// Execution environment; selects stack density and data directory policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Env {
    /// Coarse stacks, data directory optional.
    Dev,
    /// Full-resolution stacks, data directory required.
    Prod,
}

// =============================================================================
// Channel Settings
// =============================================================================

/// Hardware settings for one imaging channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelSettings {
    pub config_group: String,
    pub config_name: String,
    pub camera_name: String,
    pub laser_line: String,
    pub laser_name: String,
    pub default_laser_power: f64,
    pub default_exposure_time: f64,
    pub default_camera_gain: f64,
}

impl ChannelSettings {
    /// 405 nm nuclear stain channel, used for autofocus and confluency checks.
    pub fn dapi() -> Self {
        Self {
            config_group: "Channels-EMCCD".to_string(),
            config_name: "EMCCD_Confocal40_DAPI".to_string(),
            camera_name: "Andor EMCCD".to_string(),
            laser_line: "Andor ILE-A".to_string(),
            laser_name: "Laser 405-Power Setpoint".to_string(),
            default_laser_power: 10.0,
            default_exposure_time: 50.0,
            default_camera_gain: 400.0,
        }
    }

    /// 488 nm signal channel, the target of autoexposure.
    pub fn gfp() -> Self {
        Self {
            config_group: "Channels-EMCCD".to_string(),
            config_name: "EMCCD_Confocal40_GFP".to_string(),
            camera_name: "Andor EMCCD".to_string(),
            laser_line: "Andor ILE-A".to_string(),
            laser_name: "Laser 488-Power Setpoint".to_string(),
            default_laser_power: 10.0,
            default_exposure_time: 50.0,
            default_camera_gain: 400.0,
        }
    }
}

// =============================================================================
// Stack Settings
// =============================================================================

/// Z-stack geometry relative to the autofocused plane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackSettings {
    pub stage_label: String,
    /// Top of the stack relative to the focal plane, in microns.
    pub relative_top: f64,
    /// Bottom of the stack relative to the focal plane, in microns.
    pub relative_bottom: f64,
    /// Slice spacing in microns.
    pub step_size: f64,
}

impl StackSettings {
    pub fn prod() -> Self {
        Self {
            stage_label: "PiezoZ".to_string(),
            relative_top: 16.0,
            relative_bottom: -10.0,
            step_size: 0.2,
        }
    }

    /// Coarse stack for development runs; same span, far fewer slices.
    pub fn dev() -> Self {
        Self {
            step_size: 6.0,
            ..Self::prod()
        }
    }

    pub fn for_env(env: Env) -> Self {
        match env {
            Env::Dev => Self::dev(),
            Env::Prod => Self::prod(),
        }
    }

    /// Number of slices in the stack, inclusive of the bottom plane.
    pub fn num_slices(&self) -> u32 {
        if self.step_size <= 0.0 {
            return 0;
        }
        ((self.relative_top - self.relative_bottom) / self.step_size).floor() as u32 + 1
    }
}

// =============================================================================
// Autoexposure Settings
// =============================================================================

/// Bounds and step factor for the autoexposure search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutoexposureSettings {
    /// Lower edge of the acceptable peak-intensity window.
    pub min_intensity: u16,
    /// Upper edge of the acceptable peak-intensity window.
    pub max_intensity: u16,
    pub min_exposure_time: f64,
    pub max_exposure_time: f64,
    pub default_exposure_time: f64,
    pub min_laser_power: f64,
    /// Multiplicative step applied when stepping exposure or power down;
    /// its reciprocal is used when stepping up.
    pub relative_exposure_step: f64,
    /// Hard bound on search iterations before falling back to defaults.
    pub max_iterations: u32,
}

impl Default for AutoexposureSettings {
    fn default() -> Self {
        Self {
            min_intensity: 1 << 13,
            max_intensity: 1 << 15,
            min_exposure_time: 30.0,
            max_exposure_time: 500.0,
            default_exposure_time: 50.0,
            min_laser_power: 1.0,
            relative_exposure_step: 0.8,
            max_iterations: 20,
        }
    }
}

/// Outcome classification of one autoexposure search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExposureStatus {
    /// Peak intensity landed inside the target window.
    Converged,
    /// Still under-exposed at the maximum exposure time.
    UnderAtMaxExposure,
    /// Still over-exposed at the minimum laser power.
    OverAtMinPower,
    /// Search aborted (snap fault or iteration bound); defaults in effect.
    DefaultUsed,
}

/// Exposure and power to use for a well's signal-channel stacks.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AutoexposureResult {
    pub exposure_time_ms: f64,
    pub laser_power: f64,
    pub status: ExposureStatus,
}

// =============================================================================
// Acquisition Settings
// =============================================================================

/// Top-level settings for a plate acquisition run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcquisitionSettings {
    pub env: Env,
    /// Output directory; required in [`Env::Prod`].
    pub data_dir: Option<PathBuf>,
    /// FOVs to accept per well before skipping the remaining sites.
    pub max_fovs_per_well: u32,
    pub well_marker: WellMarker,
    /// Autofocus attempts per position before the position is skipped.
    pub autofocus_attempts: u32,
    /// Consecutive stage move failures tolerated before the run aborts.
    pub max_consecutive_move_failures: u32,
    pub focus_channel: ChannelSettings,
    pub signal_channel: ChannelSettings,
    pub stack: StackSettings,
    pub autoexposure: AutoexposureSettings,
}

impl Default for AcquisitionSettings {
    fn default() -> Self {
        Self {
            env: Env::Dev,
            data_dir: None,
            max_fovs_per_well: 8,
            well_marker: WellMarker::default(),
            autofocus_attempts: 2,
            max_consecutive_move_failures: 3,
            focus_channel: ChannelSettings::dapi(),
            signal_channel: ChannelSettings::gfp(),
            stack: StackSettings::dev(),
            autoexposure: AutoexposureSettings::default(),
        }
    }
}

impl AcquisitionSettings {
    /// Defaults appropriate for the given environment.
    pub fn for_env(env: Env) -> Self {
        Self {
            env,
            stack: StackSettings::for_env(env),
            ..Self::default()
        }
    }

    /// Load settings from a TOML file layered over the defaults.
    pub fn load(path: &Path) -> AcqResult<Self> {
        let settings: Self = Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(path))
            .extract()
            .map_err(|e| AcqError::Configuration(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject settings that parsed but are semantically invalid.
    pub fn validate(&self) -> AcqResult<()> {
        if self.max_fovs_per_well == 0 {
            return Err(AcqError::Configuration(
                "max_fovs_per_well must be at least 1".to_string(),
            ));
        }
        if self.autofocus_attempts == 0 {
            return Err(AcqError::Configuration(
                "autofocus_attempts must be at least 1".to_string(),
            ));
        }
        if self.stack.step_size <= 0.0 {
            return Err(AcqError::Configuration(
                "stack step_size must be positive".to_string(),
            ));
        }
        if self.stack.relative_top <= self.stack.relative_bottom {
            return Err(AcqError::Configuration(
                "stack relative_top must be above relative_bottom".to_string(),
            ));
        }
        let ae = &self.autoexposure;
        if ae.min_intensity >= ae.max_intensity {
            return Err(AcqError::Configuration(
                "autoexposure intensity window is inverted".to_string(),
            ));
        }
        if ae.min_exposure_time <= 0.0 || ae.max_exposure_time < ae.min_exposure_time {
            return Err(AcqError::Configuration(
                "autoexposure exposure bounds are invalid".to_string(),
            ));
        }
        if ae.relative_exposure_step <= 0.0 || ae.relative_exposure_step >= 1.0 {
            return Err(AcqError::Configuration(
                "relative_exposure_step must be in (0, 1)".to_string(),
            ));
        }
        if ae.max_iterations == 0 {
            return Err(AcqError::Configuration(
                "autoexposure max_iterations must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn dev_stack_has_five_slices() {
        assert_eq!(StackSettings::dev().num_slices(), 5);
    }

    #[test]
    fn prod_stack_has_131_slices() {
        assert_eq!(StackSettings::prod().num_slices(), 131);
    }

    #[test]
    fn defaults_validate() {
        AcquisitionSettings::default().validate().unwrap();
        AcquisitionSettings::for_env(Env::Prod).validate().unwrap();
    }

    #[test]
    fn load_layers_toml_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("acq.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "max_fovs_per_well = 4").unwrap();
        writeln!(file, "[autoexposure]").unwrap();
        writeln!(file, "max_iterations = 10").unwrap();
        drop(file);

        let settings = AcquisitionSettings::load(&path).unwrap();
        assert_eq!(settings.max_fovs_per_well, 4);
        assert_eq!(settings.autoexposure.max_iterations, 10);
        // Untouched fields keep their defaults.
        assert_eq!(settings.autofocus_attempts, 2);
        assert_eq!(settings.autoexposure.min_exposure_time, 30.0);
    }

    #[test]
    fn validate_rejects_inverted_intensity_window() {
        let mut settings = AcquisitionSettings::default();
        settings.autoexposure.min_intensity = 40000;
        settings.autoexposure.max_intensity = 30000;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn validate_rejects_degenerate_exposure_steps() {
        for step in [0.0, -0.5, 1.0, 1.5] {
            let mut settings = AcquisitionSettings::default();
            settings.autoexposure.relative_exposure_step = step;
            assert!(settings.validate().is_err(), "step {} should be rejected", step);
        }
    }

    #[test]
    fn validate_rejects_zero_fov_budget() {
        let settings = AcquisitionSettings {
            max_fovs_per_well: 0,
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }
}
