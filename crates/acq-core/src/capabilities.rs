//! Device capability traits.
//!
//! [`MicroscopeGateway`] is the single seam between the acquisition engine
//! and the instrument. Everything the engine does to hardware goes through
//! it, which is what makes the engine testable against a mock: the engine
//! never sees device handles, only this trait. All methods return
//! [`DeviceFault`] so the engine can classify failures uniformly.

use async_trait::async_trait;

use crate::error::DeviceFault;
use crate::frame::RawImage;
use crate::position::Position;
use crate::settings::{ChannelSettings, StackSettings};

/// Gateway to the microscope: stage, lasers, camera, focus unit, datastore.
#[async_trait]
pub trait MicroscopeGateway: Send + Sync {
    /// All positions for the run, in visit order.
    async fn position_list(&self) -> Result<Vec<Position>, DeviceFault>;

    /// Return the piezo z-stage to its reference plane before a move.
    async fn reset_z_reference(&self) -> Result<(), DeviceFault>;

    /// Move the XY stage to the given position.
    async fn move_to(&self, position: &Position) -> Result<(), DeviceFault>;

    /// Apply a channel preset: config group, camera, laser line, gain.
    async fn select_channel(&self, channel: &ChannelSettings) -> Result<(), DeviceFault>;

    /// Set the camera exposure time in milliseconds.
    async fn set_exposure(&self, exposure_ms: f64) -> Result<(), DeviceFault>;

    /// Set the power setpoint of the currently selected laser.
    async fn set_laser_power(&self, power: f64) -> Result<(), DeviceFault>;

    /// Run hardware autofocus at the current position.
    async fn autofocus(&self) -> Result<(), DeviceFault>;

    /// Capture a single frame with the current channel settings.
    async fn snap(&self) -> Result<RawImage, DeviceFault>;

    /// Capture and store a z-stack with explicit exposure and power.
    async fn acquire_stack(
        &self,
        channel: &ChannelSettings,
        stack: &StackSettings,
        exposure_ms: f64,
        laser_power: f64,
    ) -> Result<(), DeviceFault>;

    /// Flush and close the datastore. Must be called exactly once per run.
    async fn finalize_store(&self) -> Result<(), DeviceFault>;
}

/// Decides whether a field of view is worth acquiring, based on a snapshot
/// of the nuclear stain channel.
pub trait ConfluencyCheck: Send + Sync {
    fn evaluate(&self, image: &RawImage) -> bool;
}

/// Confluency check that accepts every field of view.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysAccept;

impl ConfluencyCheck for AlwaysAccept {
    fn evaluate(&self, _image: &RawImage) -> bool {
        true
    }
}
