//! Autoexposure search for the signal channel.
//!
//! Starting from the configured default exposure and the channel's default
//! laser power, the search snaps a frame, reads the 99.9th-percentile peak,
//! and walks exposure (then laser power) by the configured relative step
//! until the peak lands in the target window or a bound is hit. The search
//! never returns an error: device faults and the iteration bound degrade to
//! the starting values with status [`ExposureStatus::DefaultUsed`], so one
//! bad frame cannot sink a run.

use tracing::{debug, info, warn};

use acq_core::capabilities::MicroscopeGateway;
use acq_core::error::DeviceFault;
use acq_core::settings::{
    AutoexposureResult, AutoexposureSettings, ChannelSettings, ExposureStatus,
};

/// Percentile used as the frame's "peak"; high enough to be signal,
/// low enough to shrug off isolated hot pixels.
const PEAK_PERCENTILE: f64 = 99.9;

#[derive(Debug, Clone)]
pub struct AutoexposureEngine {
    settings: AutoexposureSettings,
}

impl AutoexposureEngine {
    pub fn new(settings: AutoexposureSettings) -> Self {
        Self { settings }
    }

    /// Run the search on the given channel. Infallible by contract.
    pub async fn run(
        &self,
        scope: &dyn MicroscopeGateway,
        channel: &ChannelSettings,
    ) -> AutoexposureResult {
        let ae = &self.settings;
        // The search starts from, and degrades to, the exposure default
        // configured with the other search bounds; laser power starts
        // from the channel's own default.
        let defaults = AutoexposureResult {
            exposure_time_ms: ae.default_exposure_time,
            laser_power: channel.default_laser_power,
            status: ExposureStatus::DefaultUsed,
        };

        if let Err(fault) = scope.select_channel(channel).await {
            warn!(%fault, "channel selection failed, using default exposure");
            return defaults;
        }

        let mut exposure = ae.default_exposure_time;
        let mut power = channel.default_laser_power;

        for iteration in 0..ae.max_iterations {
            if let Err(fault) = self.apply(scope, exposure, power).await {
                warn!(%fault, iteration, "settings update failed, using default exposure");
                return defaults;
            }
            let image = match scope.snap().await {
                Ok(image) => image,
                Err(fault) => {
                    warn!(%fault, iteration, "snap failed, using default exposure");
                    return defaults;
                }
            };
            let peak = image.peak_intensity(PEAK_PERCENTILE);
            debug!(iteration, peak, exposure, power, "autoexposure step");

            if peak > ae.max_intensity {
                let next = exposure * ae.relative_exposure_step;
                if next >= ae.min_exposure_time {
                    exposure = next;
                } else {
                    exposure = ae.min_exposure_time;
                    if power <= ae.min_laser_power {
                        info!(exposure, power, "still over-exposed at minimum power");
                        return AutoexposureResult {
                            exposure_time_ms: ae.min_exposure_time,
                            laser_power: ae.min_laser_power,
                            status: ExposureStatus::OverAtMinPower,
                        };
                    }
                    power = (power * ae.relative_exposure_step).max(ae.min_laser_power);
                }
            } else if peak < ae.min_intensity {
                if exposure >= ae.max_exposure_time {
                    info!(exposure, power, "still under-exposed at maximum exposure");
                    return AutoexposureResult {
                        exposure_time_ms: ae.max_exposure_time,
                        laser_power: power,
                        status: ExposureStatus::UnderAtMaxExposure,
                    };
                }
                exposure = (exposure / ae.relative_exposure_step).min(ae.max_exposure_time);
            } else {
                info!(exposure, power, iteration, "autoexposure converged");
                return AutoexposureResult {
                    exposure_time_ms: exposure,
                    laser_power: power,
                    status: ExposureStatus::Converged,
                };
            }
        }

        warn!(
            max_iterations = ae.max_iterations,
            "autoexposure did not settle, using default exposure"
        );
        defaults
    }

    async fn apply(
        &self,
        scope: &dyn MicroscopeGateway,
        exposure: f64,
        power: f64,
    ) -> Result<(), DeviceFault> {
        scope.set_exposure(exposure).await?;
        scope.set_laser_power(power).await
    }
}
