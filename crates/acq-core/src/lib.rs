//! `acq-core`
//!
//! Core types and traits for the plate acquisition system.
//!
//! This crate defines the shared vocabulary of the workspace: plate
//! positions and well identity, image frames, acquisition settings, the
//! [`MicroscopeGateway`] device seam, and the error taxonomy. It contains no
//! device logic and no engine logic; those live in `acq-driver-mock` and
//! `acq-engine` respectively.
//!
//! ## Key Types
//!
//! - [`Position`] / [`WellId`]: plate geometry and label parsing
//! - [`AcquisitionSettings`]: layered TOML configuration with validation
//! - [`MicroscopeGateway`]: the async device boundary
//! - [`DeviceFault`] / [`AcqError`]: fault classification and propagation

pub mod capabilities;
pub mod error;
pub mod frame;
pub mod position;
pub mod settings;
pub mod store;

pub use capabilities::{AlwaysAccept, ConfluencyCheck, MicroscopeGateway};
pub use error::{AcqError, AcqResult, DeviceFault, FaultKind};
pub use frame::RawImage;
pub use position::{parse_site_label, Position, WellId, WellMarker};
pub use settings::{
    AcquisitionSettings, AutoexposureResult, AutoexposureSettings, ChannelSettings, Env,
    ExposureStatus, StackSettings,
};
pub use store::{RunManifest, StackMetadata};
