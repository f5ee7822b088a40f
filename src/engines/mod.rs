//! # Engines Module
//!
//! Seams to the three physics engines and the adapter plumbing around them.
//!
//! ## Contract
//!
//! The transport orchestrator is generic over three collaborators:
//!
//! - [`NeutrinoEngine`] — samples neutrino interactions along a trajectory
//!   and backward-generates production vertices;
//! - [`LeptonEngine`] — propagates charged taus with continuous and
//!   stochastic energy loss, forward or backward;
//! - [`DecayEngine`] — decays a tau into daughter products, or un-decays a
//!   neutrino into its tau parent with a biasing weight.
//!
//! Engines see the world through [`EngineEnv`]: the medium lookup (which
//! flips the direction of sight when the engine runs backward), the locals
//! record (density, zero magnetic field, step hint) and the random stream.
//! Crate-provided reference implementations live in [`builtin`]; callers
//! may substitute their own.

use crate::constants::*;
use crate::error::{EngineError, Result, TausimError};
use crate::geometry::{EarthModel, Material};
use crate::stochastic::MersenneTwister;
use crate::types::{ParticleState, Vec3};
use std::path::PathBuf;

pub mod builtin;

// ============================================================================
// TRANSPORT ENVIRONMENT
// ============================================================================

/// Per-leg transport environment handed to an engine
pub struct EngineEnv<'a> {
    /// Geometry the engine steps through
    pub earth: &'a EarthModel,
    /// Random stream of the owning context
    pub rng: &'a mut MersenneTwister,
    /// True when the engine runs against the direction of flight
    pub reversed: bool,
    /// Detection sphere radius armed for flux-crossing checks
    pub flux_radius: Option<f64>,
    /// Grammage horizon (kg/m²); 0 disables the limit
    pub grammage_max: f64,
    /// Kinetic bound (GeV): kill threshold forward, ceiling backward
    pub kinetic_limit: f64,
}

/// Local medium properties written for the lepton engine
#[derive(Debug, Clone, Copy)]
pub struct Locals {
    /// Density (kg/m³)
    pub density: f64,
    /// Magnetic field (T); identically zero in this model
    pub magnet: Vec3,
    /// Suggested density re-sampling step (m); 0 means uniform
    pub step_hint: f64,
}

impl<'a> EngineEnv<'a> {
    /// Create an environment with no limits, forward sight
    pub fn new(earth: &'a EarthModel, rng: &'a mut MersenneTwister) -> Self {
        Self {
            earth,
            rng,
            reversed: false,
            flux_radius: None,
            grammage_max: 0.0,
            kinetic_limit: 0.0,
        }
    }

    /// Medium adapter: resolve the shell under the engine's line of sight
    ///
    /// Returns the material and the suggested step. `None` means the track
    /// left the simulation volume (or fired the flux latch; the caller
    /// distinguishes through `state.has_crossed`).
    pub fn medium(&mut self, state: &mut ParticleState) -> (Option<Material>, f64) {
        let direction = if self.reversed {
            -state.direction
        } else {
            state.direction
        };
        let step = self.earth.step(state.position, direction, state, self.flux_radius);
        if state.medium >= 0 {
            (Some(self.earth.material(state.medium as usize)), step)
        } else {
            (None, step)
        }
    }

    /// Locals adapter: density and step hint at the cached shell/radius
    ///
    /// The magnetic field is zeroed; there is no deflection in this model.
    pub fn locals(&self, state: &mut ParticleState) -> Locals {
        let (density, step_hint) = self.earth.density(state.medium as usize, state.r);
        state.density = density;
        Locals {
            density,
            magnet: Vec3::zero(),
            step_hint,
        }
    }

    /// Unit vector of actual motion (flight direction, or its opposite when
    /// the engine runs backward)
    pub fn motion(&self, state: &ParticleState) -> Vec3 {
        if self.reversed {
            -state.direction
        } else {
            state.direction
        }
    }
}

// ============================================================================
// ANCESTOR & POLARISATION CALLBACKS
// ============================================================================

/// Relative weight for backward-sampling `ancestor_pid` as the parent of
/// `daughter`
///
/// Same-kind parents (elastic history) weigh 1; a tau parent of a tau
/// neutrino uses an empirical parameterisation of the decay rate per
/// grammage, proportional to E^1.363 and the local density.
pub fn ancestor_weight(ancestor_pid: i32, daughter: &ParticleState) -> f64 {
    let tau_parent = |d: &ParticleState| 1.63e-17 * d.energy.powf(1.363) * d.density;
    match daughter.pid {
        pid if pid == -PID_NU_E => {
            if ancestor_pid == -PID_NU_E {
                1.0
            } else {
                0.0
            }
        }
        pid if pid == PID_NU_TAU => {
            if ancestor_pid == PID_NU_TAU {
                1.0
            } else if ancestor_pid == PID_TAU {
                tau_parent(daughter)
            } else {
                0.0
            }
        }
        pid if pid == -PID_NU_TAU => {
            if ancestor_pid == -PID_NU_TAU {
                1.0
            } else if ancestor_pid == -PID_TAU {
                tau_parent(daughter)
            } else {
                0.0
            }
        }
        pid if pid == PID_TAU => {
            if ancestor_pid == PID_NU_TAU {
                1.0
            } else {
                0.0
            }
        }
        pid if pid == -PID_TAU => {
            if ancestor_pid == -PID_NU_TAU {
                1.0
            } else {
                0.0
            }
        }
        _ => 0.0,
    }
}

/// Longitudinal polarisation: collinear with the tau 3-momentum
pub fn longitudinal_polarisation(momentum: Vec3) -> Vec3 {
    if momentum.mag_squared() <= 0.0 {
        Vec3::zero()
    } else {
        momentum.normalize()
    }
}

// ============================================================================
// ENGINE TRAITS
// ============================================================================

/// Outcome of a neutrino transport leg
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportEvent {
    /// Transport stopped on a limit without a notable event
    None,
    /// The track left the simulation volume (or fired the flux latch)
    Exit,
    /// An interaction vertex was sampled; the product slot is filled
    Interaction,
    /// Backward transport reached a tau-decay creation vertex
    DecayTau,
}

/// A decay daughter as (PDG code, momentum)
#[derive(Debug, Clone, Copy)]
pub struct DecayProduct {
    pub pid: i32,
    pub momentum: Vec3,
}

/// Neutrino interaction engine
pub trait NeutrinoEngine: Send + Sync {
    /// Transport `state` to its next interaction, creation vertex
    /// (backward) or exit
    ///
    /// Forward legs fill `product` with the interaction secondary. Backward
    /// legs (`env.reversed`) un-scatter the state toward higher energies
    /// and may stop on [`TransportEvent::DecayTau`] when the neutrino was
    /// backward-attributed to a tau decay.
    fn transport(
        &self,
        env: &mut EngineEnv,
        state: &mut ParticleState,
        product: Option<&mut ParticleState>,
    ) -> std::result::Result<TransportEvent, EngineError>;

    /// Backward-generate the production vertex of a charged tau: replace
    /// the tau `state` with its parent neutrino at the same location,
    /// updating the weight with the vertex sampling factor
    fn vertex(
        &self,
        env: &mut EngineEnv,
        state: &mut ParticleState,
    ) -> std::result::Result<(), EngineError>;

    /// Total interaction cross-section per target nucleon (m²)
    fn cross_section(
        &self,
        pid: i32,
        energy: f64,
        z: f64,
        a: f64,
    ) -> std::result::Result<f64, EngineError>;
}

/// Charged-lepton transport engine
pub trait LeptonEngine: Send + Sync {
    /// Mass (GeV/c²) and decay length at rest c·τ₀ (m) of the lepton
    fn particle(&self) -> (f64, f64);

    /// Transport the tau until it decays, crosses an energy bound, leaves
    /// the volume or reaches the grammage horizon of `env`
    fn transport(
        &self,
        env: &mut EngineEnv,
        state: &mut ParticleState,
    ) -> std::result::Result<(), EngineError>;
}

/// Tau decay engine
pub trait DecayEngine: Send + Sync {
    /// Decay a tau of the given momentum and spin direction into daughters
    fn decay(
        &self,
        rng: &mut MersenneTwister,
        pid: i32,
        momentum: Vec3,
        polarisation: Vec3,
    ) -> std::result::Result<Vec<DecayProduct>, EngineError>;

    /// Backward-sample the tau parent of a decay neutrino
    ///
    /// `pid`/`momentum` describe the daughter neutrino. Returns the parent
    /// products with the tau first, plus the biased sampling weight.
    fn undecay(
        &self,
        rng: &mut MersenneTwister,
        pid: i32,
        momentum: Vec3,
        bias: f64,
    ) -> std::result::Result<(Vec<DecayProduct>, f64), EngineError>;
}

// ============================================================================
// ENGINE SET & LIFECYCLE
// ============================================================================

/// Initialisation inputs for the engine set
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Parton distribution file handed to the neutrino engine
    pub pdf_file: Option<PathBuf>,
    /// Binary stopping-power cache of the lepton engine
    pub material_cache: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pdf_file: None,
            material_cache: PathBuf::from("materials.b"),
        }
    }
}

/// The process-wide engine set, initialised once and read-only afterwards
pub struct Engines {
    pub neutrino: Box<dyn NeutrinoEngine>,
    pub lepton: Box<dyn LeptonEngine>,
    pub decay: Box<dyn DecayEngine>,
}

impl Engines {
    /// Build the reference engine set
    ///
    /// Verifies the parton distribution file if one is given, then loads
    /// the lepton stopping-power tables from the material cache, computing
    /// and dumping them on first use.
    pub fn initialise(config: &EngineConfig) -> Result<Self> {
        if let Some(pdf) = &config.pdf_file {
            std::fs::File::open(pdf).map_err(|e| {
                TausimError::Io(std::io::Error::new(
                    e.kind(),
                    format!("{}: {}", pdf.display(), e),
                ))
            })?;
            log::info!("using parton distributions from {}", pdf.display());
        }

        let lepton = builtin::CsdaTauEngine::initialise(&config.material_cache)?;
        Ok(Self {
            neutrino: Box::new(builtin::PowerLawNeutrinoEngine::new()),
            lepton: Box::new(lepton),
            decay: Box::new(builtin::TableDecayEngine::new()),
        })
    }

    /// Build an engine set from caller-provided implementations
    pub fn from_parts(
        neutrino: Box<dyn NeutrinoEngine>,
        lepton: Box<dyn LeptonEngine>,
        decay: Box<dyn DecayEngine>,
    ) -> Self {
        Self {
            neutrino,
            lepton,
            decay,
        }
    }

    /// Mass and c·τ₀ of the transported lepton
    pub fn tau_parameters(&self) -> (f64, f64) {
        self.lepton.particle()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::SEA_SHELL;

    #[test]
    fn test_ancestor_weights() {
        let mut nu = ParticleState::neutrino(
            PID_NU_TAU,
            1e9,
            Vec3::new(0.0, 0.0, EARTH_RADIUS),
            Vec3::new(0.0, 0.0, 1.0),
            1.0,
        );
        nu.density = 1.2;

        assert_eq!(ancestor_weight(PID_NU_TAU, &nu), 1.0);
        assert_eq!(ancestor_weight(-PID_NU_TAU, &nu), 0.0);

        let from_tau = ancestor_weight(PID_TAU, &nu);
        let expected = 1.63e-17 * 1e9f64.powf(1.363) * 1.2;
        assert!((from_tau - expected).abs() / expected < 1e-12);

        // CP mirror.
        nu.pid = -PID_NU_TAU;
        assert_eq!(ancestor_weight(-PID_NU_TAU, &nu), 1.0);
        assert!(ancestor_weight(-PID_TAU, &nu) > 0.0);
        assert_eq!(ancestor_weight(PID_TAU, &nu), 0.0);

        // Electron antineutrinos only descend from themselves.
        nu.pid = -PID_NU_E;
        assert_eq!(ancestor_weight(-PID_NU_E, &nu), 1.0);
        assert_eq!(ancestor_weight(PID_TAU, &nu), 0.0);
    }

    #[test]
    fn test_polarisation() {
        let pol = longitudinal_polarisation(Vec3::new(0.0, 3.0, 4.0));
        assert!((pol.mag() - 1.0).abs() < 1e-12);
        assert!((pol.z - 0.8).abs() < 1e-12);
        assert_eq!(longitudinal_polarisation(Vec3::zero()), Vec3::zero());
    }

    #[test]
    fn test_env_medium_flips_sight() {
        let earth = EarthModel::new();
        let mut rng = MersenneTwister::from_seed(3);

        // A tau just below the sea surface, flying up.
        let make = || {
            ParticleState::tau(
                PID_TAU,
                1e8,
                Vec3::new(0.0, 0.0, EARTH_RADIUS - 1.0e3),
                Vec3::new(0.0, 0.0, 1.0),
                1.0,
            )
        };

        let mut env = EngineEnv::new(&earth, &mut rng);
        let mut state = make();
        let (material, step) = env.medium(&mut state);
        assert!(material.is_some());
        assert_eq!(state.medium as usize, SEA_SHELL);
        // Forward sight: 1 km of sea left above.
        assert!((step - 1.0e3).abs() < 1.0);

        env.reversed = true;
        let mut state = make();
        let (_, step) = env.medium(&mut state);
        // Backward sight: 2 km down to the crust.
        assert!((step - 2.0e3).abs() < 1.0);
    }

    #[test]
    fn test_env_locals_zero_field() {
        let earth = EarthModel::new();
        let mut rng = MersenneTwister::from_seed(3);
        let mut env = EngineEnv::new(&earth, &mut rng);

        let mut state = ParticleState::tau(
            PID_TAU,
            1e8,
            Vec3::new(0.0, 0.0, EARTH_RADIUS - 1.0e3),
            Vec3::new(0.0, 0.0, 1.0),
            1.0,
        );
        env.medium(&mut state);
        let locals = env.locals(&mut state);
        assert_eq!(locals.magnet, Vec3::zero());
        assert_eq!(locals.density, 1.02e3);
        assert_eq!(state.density, 1.02e3);
    }
}
