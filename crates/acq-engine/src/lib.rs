//! `acq-engine`
//!
//! The plate acquisition engine: position iteration with per-well FOV
//! budgets, the autofocus retry contract, the autoexposure search, and the
//! run controller that ties them together against a
//! `acq_core::MicroscopeGateway`.

pub mod autoexposure;
pub mod autofocus;
pub mod run;
pub mod tracker;

pub use autoexposure::AutoexposureEngine;
pub use autofocus::AutofocusController;
pub use run::{AcquisitionController, RunPhase, RunSummary, SkipReason, SkippedPosition};
pub use tracker::WellSiteTracker;
