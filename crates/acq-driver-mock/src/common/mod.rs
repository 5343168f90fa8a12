//! Common infrastructure for the mock gateway.
//!
//! - **mode**: Operational modes (Instant, Realistic)
//! - **rng**: Seeded random number generator

pub mod mode;
pub mod rng;

pub use mode::MockMode;
pub use rng::MockRng;
