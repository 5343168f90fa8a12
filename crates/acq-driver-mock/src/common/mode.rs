//! Operational modes for the mock gateway.

/// Operational modes for the mock gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockMode {
    /// Zero delays, deterministic - for unit tests
    Instant,
    /// Hardware-like timing - for integration tests
    Realistic,
}

impl Default for MockMode {
    fn default() -> Self {
        MockMode::Instant
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_mode_is_instant() {
        assert_eq!(MockMode::default(), MockMode::Instant);
    }
}
