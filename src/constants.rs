//! # Physical Constants
//!
//! All constants in SI-derived Monte-Carlo units: metres, kilograms per
//! square metre for column densities, GeV for energies.

// ============================================================================
// GEOMETRY
// ============================================================================

/// Spherical Earth radius (m)
pub const EARTH_RADIUS: f64 = 6371.0e3;

/// Radius of the geostationary orbit (m)
pub const GEO_ORBIT: f64 = 42164.0e3;

/// Top of the modelled atmosphere, above which neutrinos are dropped (m)
pub const ATMOSPHERE_TOP: f64 = EARTH_RADIUS + 1.0e5;

/// Minimum geometry step (m), guarantees forward progress at shell edges
pub const MIN_STEP: f64 = 1.0e-3;

// ============================================================================
// PARTICLE DATA
// ============================================================================

/// Avogadro's number (1/mol)
pub const PHYS_NA: f64 = 6.022e23;

/// Tau lepton mass (GeV/c²)
pub const TAU_MASS: f64 = 1.77682;

/// Tau decay length at rest, c·τ₀ (m)
pub const TAU_CTAU: f64 = 87.03e-6;

/// PDG codes for the particles handled by the transport
pub const PID_NU_E: i32 = 12;
pub const PID_NU_MU: i32 = 14;
pub const PID_NU_TAU: i32 = 16;
pub const PID_TAU: i32 = 15;
pub const PID_ELECTRON: i32 = 11;
pub const PID_MUON: i32 = 13;

// ============================================================================
// MONTE-CARLO TUNING
// ============================================================================

/// Grammage scale of the backward transport horizon, λ₀ (kg/m²)
pub const BACKWARD_HORIZON: f64 = 3.0e7;

/// Forced-decay probability when biasing backward vertices in air
pub const FORCED_DECAY_PROBABILITY: f64 = 0.1;

/// Biasing factor applied by the decay engine when un-decaying a neutrino
pub const DECAY_BIAS: f64 = 6.0;

/// Maximum attempts when sampling a tau decay before the event fizzles
pub const DECAY_TRIALS: usize = 20;

/// Hard cap on the cascade generation depth
pub const MAX_GENERATION: u32 = 64;

/// Default upper energy bound for backward transport (GeV)
pub const BACKWARD_ENERGY_CUT: f64 = 1.0e12;

/// Lowest primary energy accepted by the sampler (GeV)
pub const ENERGY_FLOOR: f64 = 1.0e2;

/// Highest primary energy accepted by the sampler (GeV)
pub const ENERGY_CEIL: f64 = 1.0e12;
