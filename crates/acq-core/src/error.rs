//! Error types for the acquisition system.
//!
//! Two layers of errors exist:
//!
//! - [`DeviceFault`]: an error reported by a microscope device (stage, camera,
//!   focus unit). Carries the device name and a [`FaultKind`] classifying how
//!   the fault should be treated by retry and skip policies.
//! - [`AcqError`]: the top-level error for the acquisition engine and tools.
//!   Wraps device faults, I/O errors, and configuration problems so callers
//!   can use the `?` operator throughout.

use thiserror::Error;

// =============================================================================
// Device Faults
// =============================================================================

/// Classification of a device fault, used by retry and skip policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// One-off failure; retrying the same operation may succeed.
    Transient,
    /// Device not yet settled; early calls fail, later calls succeed.
    WarmUp,
    /// Failure tied to the current well; retries within the well will not help.
    WellPermanent,
    /// Underlying I/O failure (file, socket, bus).
    Io,
}

impl std::fmt::Display for FaultKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            FaultKind::Transient => "transient",
            FaultKind::WarmUp => "warm-up",
            FaultKind::WellPermanent => "well-permanent",
            FaultKind::Io => "io",
        };
        write!(f, "{}", label)
    }
}

/// An error reported by a microscope device.
#[derive(Error, Debug, Clone)]
#[error("device '{device}' {kind} fault: {message}")]
pub struct DeviceFault {
    pub device: String,
    pub kind: FaultKind,
    pub message: String,
}

impl DeviceFault {
    pub fn new(device: impl Into<String>, kind: FaultKind, message: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            kind,
            message: message.into(),
        }
    }
}

// =============================================================================
// Top-Level Errors
// =============================================================================

/// Top-level error type for the acquisition engine and tools.
#[derive(Error, Debug)]
pub enum AcqError {
    /// Run could not start (missing data directory, empty position list).
    #[error("setup error: {0}")]
    Setup(String),

    /// A position label did not match the expected `<well>-Site_<n>` form.
    #[error("malformed position label: '{0}'")]
    MalformedLabel(String),

    /// A device reported a fault that the engine could not absorb.
    #[error(transparent)]
    Device(#[from] DeviceFault),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Semantically invalid configuration (values parsed but make no sense).
    #[error("configuration error: {0}")]
    Configuration(String),
}

pub type AcqResult<T> = Result<T, AcqError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fault_display_includes_device_and_kind() {
        let fault = DeviceFault::new("afc", FaultKind::WellPermanent, "no surface found");
        let msg = fault.to_string();
        assert!(msg.contains("afc"));
        assert!(msg.contains("well-permanent"));
        assert!(msg.contains("no surface found"));
    }

    #[test]
    fn device_fault_converts_to_acq_error() {
        fn inner() -> AcqResult<()> {
            Err(DeviceFault::new("stage", FaultKind::Transient, "timeout"))?
        }
        let err = inner().unwrap_err();
        assert!(matches!(err, AcqError::Device(_)));
    }
}
