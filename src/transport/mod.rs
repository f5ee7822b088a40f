//! # Transport Module
//!
//! The particle-transport orchestrator: a recursive state machine coupling
//! the neutrino, lepton and decay engines across the layered Earth.
//!
//! ## Control flow
//!
//! The run loop draws primaries and hands each one to either the forward
//! or the backward routine. Both advance the particle through the geometry
//! via the engine adapters; when a result condition fires they pass state
//! to the record writer. Data flows one way, primary → cascade → output.
//!
//! ```text
//!   forward:  ν ──interact──► τ ──lepton transport──► decay ──► ν*
//!                 (recurse on the neutrino daughters, generation + 1)
//!   backward: τ ──biased un-transport──► production vertex ──► ν ──► exit
//!                 (optionally un-decay and recurse on the tau parent)
//! ```

pub mod backward;
pub mod forward;

use crate::constants::*;
use crate::engines::{EngineEnv, Engines};
use crate::error::Result;
use crate::geometry::EarthModel;
use crate::output::RecordWriter;
use crate::stochastic::MersenneTwister;
use crate::types::ParticleState;

/// Energy comparison slack, matching a single-precision epsilon
pub const EPS: f64 = f32::EPSILON as f64;

/// True for the neutrino kinds the forward cascade transports
pub fn transportable(pid: i32) -> bool {
    pid == -PID_NU_E || pid.abs() == PID_NU_TAU
}

// ============================================================================
// SETTINGS & DRIVER
// ============================================================================

/// Mode flags and cuts for one run, resolved by the context
#[derive(Debug, Clone)]
pub struct TransportSettings {
    /// Forward Monte-Carlo when true, backward otherwise
    pub forward: bool,
    /// Freeze directions to the primary's
    pub longitudinal: bool,
    /// Sample tau decays (otherwise fluxes)
    pub decay: bool,
    /// Neutrino flux requested (forward flux or backward neutrino target)
    pub flux_neutrino: bool,
    /// Emit non-neutrino forward daughters only for decays in air
    pub decay_in_air_only: bool,
    /// Lower energy bound forward, upper bound backward (GeV)
    pub energy_cut: f64,
    /// Detection altitude of the sampler (m)
    pub flux_altitude: f64,
}

impl TransportSettings {
    /// Radius of the detection sphere, armed outside of decay mode
    pub fn flux_radius(&self) -> Option<f64> {
        if self.decay {
            None
        } else {
            Some(EARTH_RADIUS + self.flux_altitude)
        }
    }
}

/// Per-event transport driver
///
/// Bundles the read-only engine set and geometry with the mutable context
/// pieces (random stream, writer, primary-dump latch) for the duration of
/// one primary.
pub struct Transport<'a> {
    pub engines: &'a Engines,
    pub earth: &'a EarthModel,
    pub rng: &'a mut MersenneTwister,
    pub writer: &'a mut RecordWriter,
    pub settings: TransportSettings,
    pub tau_mass: f64,
    pub tau_ctau: f64,
    /// Exactly-once latch for the ancestor line of the current primary
    pub primary_dumped: bool,
}

impl<'a> Transport<'a> {
    pub fn new(
        engines: &'a Engines,
        earth: &'a EarthModel,
        rng: &'a mut MersenneTwister,
        writer: &'a mut RecordWriter,
        settings: TransportSettings,
    ) -> Self {
        let (tau_mass, tau_ctau) = engines.tau_parameters();
        Self {
            engines,
            earth,
            rng,
            writer,
            settings,
            tau_mass,
            tau_ctau,
            primary_dumped: false,
        }
    }

    /// Write the ancestor line at most once per primary
    pub fn dump_primary(&mut self, event_id: u64, ancestor: &ParticleState) -> Result<()> {
        if !self.primary_dumped {
            self.writer.ancestor(event_id, ancestor)?;
            self.primary_dumped = true;
        }
        Ok(())
    }
}

/// Build an engine environment from the driver's parts
///
/// A free function over the individual fields so the engine call can
/// coexist with other borrows of the driver.
pub fn engine_env<'b>(
    earth: &'b EarthModel,
    rng: &'b mut MersenneTwister,
    settings: &TransportSettings,
    reversed: bool,
    grammage_max: f64,
    kinetic_limit: f64,
) -> EngineEnv<'b> {
    EngineEnv {
        earth,
        rng,
        reversed,
        flux_radius: settings.flux_radius(),
        grammage_max,
        kinetic_limit,
    }
}

// ============================================================================
// BALLISTIC STREAMING
// ============================================================================

/// Stream a state through the geometry without any interaction, summing
/// the traversed column density; used by the grammage scans
pub fn stream(earth: &EarthModel, state: &mut ParticleState, reversed: bool) {
    loop {
        let direction = if reversed {
            -state.direction
        } else {
            state.direction
        };
        let step = earth.step(state.position, direction, state, None);
        if state.medium < 0 {
            return;
        }
        let (density, hint) = earth.density(state.medium as usize, state.r);
        state.density = density;

        let mut delta = step;
        if hint > 0.0 && hint < delta {
            delta = hint;
        }
        if delta < MIN_STEP {
            delta = MIN_STEP;
        }
        state.position += direction * delta;
        state.distance += delta;
        state.grammage += density * delta;
    }
}
