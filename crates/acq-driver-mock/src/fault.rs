//! Fault injection for the mock gateway.
//!
//! Enables configurable failures for resilience testing of the acquisition
//! engine. Three injection styles exist, each mapping to a [`FaultKind`]
//! the engine's retry and skip policies react to:
//!
//! - per-operation random failure rates (transient faults)
//! - fail-first-N warm-up windows (warm-up faults; later calls succeed)
//! - one-shot failures consumed by the first call (transient faults)

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;

use acq_core::error::{DeviceFault, FaultKind};

use crate::common::MockRng;

/// Fault injection configuration for a mock device
#[derive(Clone, Debug)]
pub struct FaultConfig {
    /// Per-operation failure rate (0.0 to 1.0); "*" applies to all operations
    rates: Arc<HashMap<&'static str, f64>>,
    /// Operations that fail on their first N calls
    warm_up: Arc<HashMap<&'static str, u32>>,
    /// RNG for rate-based decisions
    rng: Arc<MockRng>,
    /// Mutable injection state
    state: Arc<Mutex<FaultState>>,
}

#[derive(Default, Debug)]
struct FaultState {
    /// Call counters for warm-up tracking
    call_counts: HashMap<&'static str, u32>,
    /// Operations that fail exactly once, consumed on first check
    one_shot: HashSet<&'static str>,
}

impl FaultConfig {
    /// Create a fault config that never fails (default)
    pub fn none() -> Self {
        Self::with_scenarios(HashMap::new(), HashMap::new(), HashSet::new(), None)
    }

    /// Fail the given operation at a uniform random rate
    pub fn with_rate(operation: &'static str, rate: f64, seed: Option<u64>) -> Self {
        let mut rates = HashMap::new();
        rates.insert(operation, rate);
        Self::with_scenarios(rates, HashMap::new(), HashSet::new(), seed)
    }

    /// Fail the given operation on its first `count` calls
    pub fn fail_first_n(operation: &'static str, count: u32) -> Self {
        let mut warm_up = HashMap::new();
        warm_up.insert(operation, count);
        Self::with_scenarios(HashMap::new(), warm_up, HashSet::new(), None)
    }

    /// Fail the given operation exactly once, on its next call
    pub fn fail_once(operation: &'static str) -> Self {
        let mut one_shot = HashSet::new();
        one_shot.insert(operation);
        Self::with_scenarios(HashMap::new(), HashMap::new(), one_shot, None)
    }

    /// Compose a full injection configuration around a single RNG, so a
    /// fixed seed reproduces the whole fault sequence across every
    /// configured scenario.
    pub fn with_scenarios(
        rates: HashMap<&'static str, f64>,
        warm_up: HashMap<&'static str, u32>,
        one_shot: HashSet<&'static str>,
        seed: Option<u64>,
    ) -> Self {
        Self {
            rates: Arc::new(rates),
            warm_up: Arc::new(warm_up),
            rng: Arc::new(MockRng::new(seed)),
            state: Arc::new(Mutex::new(FaultState {
                call_counts: HashMap::new(),
                one_shot,
            })),
        }
    }

    /// Check if an operation should fail and return the appropriate fault
    pub fn check(&self, device: &str, operation: &'static str) -> Result<(), DeviceFault> {
        let mut state = self.state.lock();

        if state.one_shot.remove(operation) {
            return Err(DeviceFault::new(
                device,
                FaultKind::Transient,
                format!("injected one-shot failure on '{}'", operation),
            ));
        }

        if let Some(count) = self.warm_up.get(operation) {
            let calls = state.call_counts.entry(operation).or_insert(0);
            *calls += 1;
            if *calls <= *count {
                return Err(DeviceFault::new(
                    device,
                    FaultKind::WarmUp,
                    format!("injected warm-up failure {} of {}", calls, count),
                ));
            }
        }

        let rate = self
            .rates
            .get(operation)
            .or_else(|| self.rates.get("*"))
            .copied()
            .unwrap_or(0.0);
        if self.rng.should_fail(rate) {
            return Err(DeviceFault::new(
                device,
                FaultKind::Transient,
                format!("injected random failure on '{}'", operation),
            ));
        }

        Ok(())
    }

    /// Reset injection state (counters and pending one-shots).
    pub fn reset(&self) {
        let mut state = self.state.lock();
        *state = FaultState::default();
    }
}

impl Default for FaultConfig {
    fn default() -> Self {
        Self::none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_faults_by_default() {
        let config = FaultConfig::none();
        for _ in 0..100 {
            assert!(config.check("afc", "autofocus").is_ok());
        }
    }

    #[test]
    fn random_rate_fails_roughly_in_proportion() {
        let config = FaultConfig::with_rate("autofocus", 0.5, Some(42));
        let failures = (0..1000)
            .filter(|_| config.check("afc", "autofocus").is_err())
            .count();
        assert!(
            (400..600).contains(&failures),
            "got {} failures",
            failures
        );
    }

    #[test]
    fn warm_up_fails_first_n_then_succeeds() {
        let config = FaultConfig::fail_first_n("autofocus", 3);
        for i in 0..3 {
            let err = config.check("afc", "autofocus").unwrap_err();
            assert_eq!(err.kind, FaultKind::WarmUp, "call {} should warm-up fail", i);
        }
        for _ in 0..10 {
            assert!(config.check("afc", "autofocus").is_ok());
        }
    }

    #[test]
    fn one_shot_fails_exactly_once() {
        let config = FaultConfig::fail_once("snap");
        let err = config.check("camera", "snap").unwrap_err();
        assert_eq!(err.kind, FaultKind::Transient);
        for _ in 0..10 {
            assert!(config.check("camera", "snap").is_ok());
        }
    }

    #[test]
    fn untargeted_operations_are_unaffected() {
        let config = FaultConfig::fail_first_n("autofocus", 5);
        for _ in 0..10 {
            assert!(config.check("camera", "snap").is_ok());
        }
    }

    #[test]
    fn composed_scenarios_apply_independently() {
        let mut warm_up = HashMap::new();
        warm_up.insert("move", 1);
        let mut one_shot = HashSet::new();
        one_shot.insert("snap");
        let config = FaultConfig::with_scenarios(HashMap::new(), warm_up, one_shot, Some(7));
        assert!(config.check("stage", "move").is_err());
        assert!(config.check("stage", "move").is_ok());
        assert!(config.check("camera", "snap").is_err());
        assert!(config.check("camera", "snap").is_ok());
    }

    #[test]
    fn same_seed_reproduces_rate_fault_sequence() {
        let a = FaultConfig::with_rate("autofocus", 0.5, Some(7));
        let b = FaultConfig::with_rate("autofocus", 0.5, Some(7));
        let seq_a: Vec<bool> = (0..64).map(|_| a.check("afc", "autofocus").is_err()).collect();
        let seq_b: Vec<bool> = (0..64).map(|_| b.check("afc", "autofocus").is_err()).collect();
        assert_eq!(seq_a, seq_b);
    }

    #[test]
    fn reset_clears_warm_up_counters() {
        let config = FaultConfig::fail_first_n("autofocus", 1);
        assert!(config.check("afc", "autofocus").is_err());
        assert!(config.check("afc", "autofocus").is_ok());
        config.reset();
        assert!(config.check("afc", "autofocus").is_err());
    }
}
