//! `acq-driver-mock`
//!
//! Mock microscope gateway for testing and simulation in plate-acq.
//!
//! Provides [`MockMicroscope`], a full implementation of
//! `acq_core::MicroscopeGateway` with configurable fault injection,
//! a synthetic sample whose brightness responds to exposure and laser
//! power, and an optional on-disk datastore in the layout the QC tool
//! consumes. All randomness is seeded for reproducible tests.

pub mod common;
pub mod fault;
pub mod microscope;
pub mod pattern;

pub use common::{MockMode, MockRng};
pub use fault::FaultConfig;
pub use microscope::{MockMicroscope, MockMicroscopeBuilder};
pub use pattern::ExposureState;
