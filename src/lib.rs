//! # TAUSIM-RS
//!
//! Monte-Carlo sampling of decaying tau leptons from ultra-high-energy
//! neutrinos in a layered spherical Earth.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                           TAUSIM-RS                                 │
//! │        Tau Neutrino Transport Orchestrator in Rust                  │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │  geometry    PEM + USS layered Earth, ray-to-shell stepping         │
//! │  stochastic  Mersenne-Twister random source, one per context        │
//! │  sampler     primary kinematics windows + importance weights        │
//! │  engines     neutrino / lepton / decay seams + reference physics    │
//! │  transport   forward & backward Monte-Carlo state machines          │
//! │  output      record classifier and text writer                      │
//! │  simulator   per-run context, lifecycle, event loop                 │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A run draws primaries from the sampler, then transports each one
//! forward (neutrino → tau → decay, recursing on neutrino daughters) or
//! backward (tau → production vertex → primary neutrino, with biased
//! decay sampling and importance weights recovering the forward flux).
//! Results are decaying-tau records, flux crossings of a detection sphere,
//! or column-density scans.

pub mod constants;
pub mod engines;
pub mod error;
pub mod geometry;
pub mod output;
pub mod sampler;
pub mod simulator;
pub mod stochastic;
pub mod transport;
pub mod types;

// Re-exports
pub use constants::*;
pub use engines::{EngineConfig, Engines};
pub use error::{EngineError, Result, TausimError};
pub use geometry::EarthModel;
pub use output::RecordWriter;
pub use sampler::EventSampler;
pub use simulator::{run_parallel, Context};
pub use stochastic::MersenneTwister;
pub use types::{ParticleKind, ParticleState, Vec3};

/// TAUSIM version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Information about the simulator
pub fn info() -> String {
    format!(
        "TAUSIM-RS v{}\n\
         Decaying taus from ultra-high-energy neutrinos\n\
         Forward and backward Monte-Carlo transport engine",
        VERSION
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_info() {
        let info = info();
        assert!(info.contains("TAUSIM-RS"));
        assert!(info.contains(VERSION));
    }
}
