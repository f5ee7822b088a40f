//! # Builtin Reference Engines
//!
//! Parametric implementations of the three engine seams, good enough to run
//! the transport end to end and to reason about orders of magnitude.
//!
//! ## Models
//!
//! - **Neutrino interactions**: power-law deep-inelastic cross sections
//!   σ(E) = σ₀·E^0.363 per nucleon, charged plus neutral current, with a
//!   Breit-Wigner resonance on atomic electrons for electron
//!   antineutrinos. Inelasticity is drawn log-uniformly.
//! - **Tau transport**: continuous slowing down, dE/dX = a + b·E per
//!   material, with stochastic decay sampling in forward mode and the
//!   characteristic-map Jacobian in backward mode.
//! - **Tau decay**: branching-ratio table with isotropic rest-frame
//!   kinematics; leptonic channels follow the x²(3−2x) spectrum for the
//!   tau neutrino, hadronic channels are two-body against an effective
//!   meson. Spin correlations are neglected.
//!
//! Real evaluated cross sections, stopping-power files and a polarised
//! decay library plug in through the same traits.
//!
//! ## References
//!
//! [1] Gandhi et al., "Neutrino interactions at ultrahigh energies",
//!     PRD 58 (1998)
//! [2] Dutta et al., "Tau neutrinos underground", PRD 72 (2005)

use super::{DecayEngine, DecayProduct, EngineEnv, LeptonEngine, NeutrinoEngine, TransportEvent};
use crate::constants::*;
use crate::error::{EngineError, Result, TausimError};
use crate::geometry::Material;
use crate::stochastic::MersenneTwister;
use crate::types::{ParticleState, Vec3};
use std::f64::consts::PI;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

/// Guard against log(0) on a closed-interval uniform draw
const MIN_U: f64 = 1e-300;

// ============================================================================
// KINEMATIC HELPERS
// ============================================================================

/// Isotropic unit vector
fn isotropic(rng: &mut MersenneTwister) -> Vec3 {
    let cos_theta = 2.0 * rng.uniform01() - 1.0;
    let sin_theta = (1.0 - cos_theta * cos_theta).max(0.0).sqrt();
    let phi = 2.0 * PI * rng.uniform01();
    Vec3::new(sin_theta * phi.cos(), sin_theta * phi.sin(), cos_theta)
}

/// Boost a daughter momentum from a parent rest frame to the lab
///
/// `axis` is the parent flight direction, `gamma`/`beta` its Lorentz
/// factors, (`energy`, `momentum`) the daughter in the rest frame.
fn boost(axis: Vec3, gamma: f64, beta: f64, energy: f64, momentum: Vec3) -> Vec3 {
    let parallel = momentum.dot(&axis);
    momentum + ((gamma - 1.0) * parallel + gamma * beta * energy) * axis
}

/// Advance a state along its motion vector
fn advance(state: &mut ParticleState, motion: Vec3, length: f64, grammage: f64) {
    state.position += motion * length;
    state.distance += length;
    state.grammage += grammage;
}

// ============================================================================
// NEUTRINO ENGINE
// ============================================================================

/// Power-law cross-section parameters, σ(E) = σ₀·E^γ (m², E in GeV)
const SIGMA_CC_0: f64 = 5.53e-40;
const SIGMA_NC_0: f64 = 2.31e-40;
const SIGMA_EXPONENT: f64 = 0.363;

/// Glashow resonance on atomic electrons: ν̄_e + e⁻ → W⁻
const GLASHOW_ENERGY: f64 = 6.33e6;
const GLASHOW_WIDTH: f64 = 1.6e5;
const GLASHOW_PEAK: f64 = 5.0e-35;
const GLASHOW_TAU_BR: f64 = 0.1138;
const GLASHOW_HADRON_BR: f64 = 0.676;

/// Inelasticity window for the log-uniform draw
const Y_MIN: f64 = 1e-3;

/// Parametric deep-inelastic neutrino engine
pub struct PowerLawNeutrinoEngine;

impl PowerLawNeutrinoEngine {
    pub fn new() -> Self {
        Self
    }

    fn sigma_cc(&self, energy: f64) -> f64 {
        SIGMA_CC_0 * energy.powf(SIGMA_EXPONENT)
    }

    fn sigma_nc(&self, energy: f64) -> f64 {
        SIGMA_NC_0 * energy.powf(SIGMA_EXPONENT)
    }

    /// Resonant cross-section per electron (m²)
    fn sigma_glashow(&self, energy: f64) -> f64 {
        let half_width = 0.5 * GLASHOW_WIDTH;
        let detuning = energy - GLASHOW_ENERGY;
        GLASHOW_PEAK * half_width * half_width / (detuning * detuning + half_width * half_width)
    }

    /// Log-uniform inelasticity draw on [Y_MIN, 1]
    fn sample_y(&self, rng: &mut MersenneTwister) -> f64 {
        Y_MIN.powf(1.0 - rng.uniform01())
    }

    /// Interaction rate per unit grammage (m²/kg)
    fn rate(&self, pid: i32, energy: f64, material: Material) -> f64 {
        let nucleons = PHYS_NA / (1.0e-3 * material.a());
        let mut sigma = self.sigma_cc(energy) + self.sigma_nc(energy);
        if pid == -PID_NU_E {
            sigma += material.z() / material.a() * self.sigma_glashow(energy);
        }
        sigma * nucleons
    }

    /// Forward interaction at the current position
    fn interact(
        &self,
        env: &mut EngineEnv,
        state: &mut ParticleState,
        product: Option<&mut ParticleState>,
        material: Material,
    ) {
        let energy = state.energy;
        let sigma_cc = self.sigma_cc(energy);
        let sigma_nc = self.sigma_nc(energy);
        let sigma_gl = if state.pid == -PID_NU_E {
            material.z() / material.a() * self.sigma_glashow(energy)
        } else {
            0.0
        };
        let total = sigma_cc + sigma_nc + sigma_gl;
        let u = env.rng.uniform01() * total;

        let mut secondary = state.clone();
        secondary.decayed = false;
        secondary.disable_crossing();

        if u < sigma_gl {
            // W production on an electron; split among the decay channels.
            let w = env.rng.uniform01();
            let share = env.rng.uniform01();
            if w < GLASHOW_HADRON_BR {
                // All-hadronic: nothing left to transport.
                secondary.pid = 0;
                secondary.energy = energy;
                state.pid = 0;
                state.energy = 0.0;
            } else if w < GLASHOW_HADRON_BR + GLASHOW_TAU_BR {
                // W⁻ → τ⁻ ν̄_τ: the tau goes to the product slot, the
                // antineutrino keeps flying.
                secondary.pid = if state.pid < 0 { PID_TAU } else { -PID_TAU };
                secondary.energy = share * energy;
                state.pid = if state.pid < 0 { -PID_NU_TAU } else { PID_NU_TAU };
                state.energy = (1.0 - share) * energy;
            } else {
                // Light-lepton channels terminate the cascade.
                secondary.pid = if state.pid < 0 { PID_MUON } else { -PID_MUON };
                secondary.energy = share * energy;
                state.pid = if state.pid < 0 { -PID_NU_MU } else { PID_NU_MU };
                state.energy = (1.0 - share) * energy;
            }
        } else if u < sigma_gl + sigma_cc {
            // Charged current: the outgoing lepton continues in the main
            // slot, the hadronic system goes to the product slot.
            let y = self.sample_y(env.rng);
            secondary.pid = 0;
            secondary.energy = y * energy;
            state.pid = if state.pid > 0 {
                state.pid - 1
            } else {
                state.pid + 1
            };
            state.energy = (1.0 - y) * energy;
        } else {
            // Neutral current: same neutrino, degraded energy.
            let y = self.sample_y(env.rng);
            secondary.pid = 0;
            secondary.energy = y * energy;
            state.energy = (1.0 - y) * energy;
        }

        if let Some(product) = product {
            *product = secondary;
        }
    }

    /// Backward vertex: un-scatter toward higher energy, or attribute the
    /// neutrino to a tau decay
    ///
    /// The ancestor kind is drawn from the relative ancestor weights: 1
    /// for the same-kind parent, the empirical tau parameterisation for a
    /// tau parent of a tau neutrino.
    fn backward_vertex(&self, env: &mut EngineEnv, state: &mut ParticleState) -> TransportEvent {
        if state.pid.abs() == PID_NU_TAU {
            let tau_pid = if state.pid > 0 { PID_TAU } else { -PID_TAU };
            let same_kind = super::ancestor_weight(state.pid, state);
            let from_tau = super::ancestor_weight(tau_pid, state);
            let total = same_kind + from_tau;
            if total > 0.0 && env.rng.uniform01() < from_tau / total {
                return TransportEvent::DecayTau;
            }
        }

        // Neutral-current un-scatter: the parent neutrino was harder. The
        // weight carries the cross-section ratio and the energy Jacobian.
        let y = self.sample_y(env.rng);
        let parent = state.energy / (1.0 - y);
        state.weight *= (parent / state.energy).powf(SIGMA_EXPONENT) / (1.0 - y);
        state.energy = parent;
        TransportEvent::Interaction
    }
}

impl Default for PowerLawNeutrinoEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl NeutrinoEngine for PowerLawNeutrinoEngine {
    fn transport(
        &self,
        env: &mut EngineEnv,
        state: &mut ParticleState,
        mut product: Option<&mut ParticleState>,
    ) -> std::result::Result<TransportEvent, EngineError> {
        let mut target = -env.rng.uniform01().max(MIN_U).ln();

        loop {
            let (material, step) = env.medium(state);
            let Some(material) = material else {
                return Ok(TransportEvent::Exit);
            };
            let locals = env.locals(state);

            let mut delta = step;
            if locals.step_hint > 0.0 && locals.step_hint < delta {
                delta = locals.step_hint;
            }
            if delta < MIN_STEP {
                delta = MIN_STEP;
            }
            let mut dx = locals.density * delta;

            if env.grammage_max > 0.0 && state.grammage + dx >= env.grammage_max {
                // Stop exactly on the grammage horizon.
                dx = env.grammage_max - state.grammage;
                delta = if locals.density > 0.0 {
                    dx / locals.density
                } else {
                    delta
                };
                advance(state, env.motion(state), delta, dx);
                return Ok(TransportEvent::None);
            }

            let rate = self.rate(state.pid, state.energy, material);
            let depth = rate * dx;
            if depth >= target {
                let fraction = if depth > 0.0 { target / depth } else { 1.0 };
                advance(
                    state,
                    env.motion(state),
                    delta * fraction,
                    dx * fraction,
                );
                if env.reversed {
                    return Ok(self.backward_vertex(env, state));
                }
                self.interact(env, state, product.take(), material);
                return Ok(TransportEvent::Interaction);
            }
            target -= depth;
            advance(state, env.motion(state), delta, dx);
        }
    }

    fn vertex(
        &self,
        env: &mut EngineEnv,
        state: &mut ParticleState,
    ) -> std::result::Result<(), EngineError> {
        if state.pid.abs() != PID_TAU {
            return Err(EngineError::Transport(format!(
                "vertex sampling expects a tau, got pid {}",
                state.pid
            )));
        }
        // The tau took a fraction (1 - y) of the parent neutrino energy;
        // invert the charged-current draw and carry its Jacobian.
        let y = self.sample_y(env.rng);
        state.pid = if state.pid > 0 {
            state.pid + 1
        } else {
            state.pid - 1
        };
        state.energy /= 1.0 - y;
        state.weight /= 1.0 - y;
        Ok(())
    }

    fn cross_section(
        &self,
        pid: i32,
        energy: f64,
        z: f64,
        a: f64,
    ) -> std::result::Result<f64, EngineError> {
        if energy <= 0.0 {
            return Err(EngineError::CrossSection(format!(
                "non-positive energy {energy}"
            )));
        }
        let mut sigma = self.sigma_cc(energy) + self.sigma_nc(energy);
        if pid == -PID_NU_E {
            sigma += z / a * self.sigma_glashow(energy);
        }
        Ok(sigma)
    }
}

// ============================================================================
// LEPTON ENGINE
// ============================================================================

/// Continuous stopping power, dE/dX = a + b·E (E total, GeV; X in kg/m²)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StoppingPower {
    /// Ionisation term (GeV·m²/kg)
    pub a: f64,
    /// Radiative term (m²/kg)
    pub b: f64,
}

/// Default tables for rock, water and air
const STOPPING_DEFAULTS: [StoppingPower; 3] = [
    StoppingPower { a: 2.3e-4, b: 0.85e-7 },
    StoppingPower { a: 2.0e-4, b: 0.70e-7 },
    StoppingPower { a: 2.2e-4, b: 0.90e-7 },
];

const CACHE_MAGIC: [u8; 4] = *b"TSMB";
const CACHE_VERSION: u32 = 1;

/// Continuous-slowing-down tau propagator
pub struct CsdaTauEngine {
    tables: [StoppingPower; 3],
}

impl CsdaTauEngine {
    /// Load the stopping-power tables from `cache`, computing and dumping
    /// them on first use
    pub fn initialise(cache: &Path) -> Result<Self> {
        if cache.exists() {
            let engine = Self::load(cache)?;
            log::info!("loaded material tables from {}", cache.display());
            return Ok(engine);
        }
        let engine = Self {
            tables: STOPPING_DEFAULTS,
        };
        engine.dump(cache)?;
        log::info!("dumped material tables to {}", cache.display());
        Ok(engine)
    }

    fn load(cache: &Path) -> Result<Self> {
        let mut bytes = Vec::new();
        File::open(cache)?.read_to_end(&mut bytes)?;
        if bytes.len() != 8 + 48 || bytes[..4] != CACHE_MAGIC {
            return Err(TausimError::Engine(EngineError::Init(format!(
                "corrupt material cache {}",
                cache.display()
            ))));
        }
        let version = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        if version != CACHE_VERSION {
            return Err(TausimError::Engine(EngineError::Init(format!(
                "material cache version {version} is not {CACHE_VERSION}"
            ))));
        }
        let mut tables = STOPPING_DEFAULTS;
        for (i, table) in tables.iter_mut().enumerate() {
            let at = 8 + 16 * i;
            let word = |o: usize| {
                let mut raw = [0u8; 8];
                raw.copy_from_slice(&bytes[o..o + 8]);
                f64::from_le_bytes(raw)
            };
            table.a = word(at);
            table.b = word(at + 8);
        }
        Ok(Self { tables })
    }

    fn dump(&self, cache: &Path) -> Result<()> {
        let mut bytes = Vec::with_capacity(8 + 48);
        bytes.extend_from_slice(&CACHE_MAGIC);
        bytes.extend_from_slice(&CACHE_VERSION.to_le_bytes());
        for table in &self.tables {
            bytes.extend_from_slice(&table.a.to_le_bytes());
            bytes.extend_from_slice(&table.b.to_le_bytes());
        }
        File::create(cache)?.write_all(&bytes)?;
        Ok(())
    }

    /// Stopping power of a material at total energy E (GeV·m²/kg)
    fn loss(&self, material: Material, total_energy: f64) -> f64 {
        let table = self.tables[material.index()];
        table.a + table.b * total_energy
    }
}

impl LeptonEngine for CsdaTauEngine {
    fn particle(&self) -> (f64, f64) {
        (TAU_MASS, TAU_CTAU)
    }

    fn transport(
        &self,
        env: &mut EngineEnv,
        state: &mut ParticleState,
    ) -> std::result::Result<(), EngineError> {
        let (mass, ctau) = self.particle();

        loop {
            if !env.reversed && state.energy <= env.kinetic_limit {
                return Ok(());
            }
            if env.reversed && env.kinetic_limit > 0.0 && state.energy >= env.kinetic_limit {
                return Ok(());
            }
            let (material, step) = env.medium(state);
            let Some(material) = material else {
                return Ok(());
            };
            let locals = env.locals(state);

            let mut delta = step;
            if locals.step_hint > 0.0 && locals.step_hint < delta {
                delta = locals.step_hint;
            }
            if delta < MIN_STEP {
                delta = MIN_STEP;
            }
            let mut dx = locals.density * delta;
            let mut horizon = false;
            if env.grammage_max > 0.0 && state.grammage + dx >= env.grammage_max {
                dx = env.grammage_max - state.grammage;
                if locals.density > 0.0 {
                    delta = dx / locals.density;
                }
                horizon = true;
            }

            if !env.reversed {
                // Stochastic decay point along this substep.
                let momentum = state.tau_momentum(mass);
                if momentum > 0.0 {
                    let rate = mass / (momentum * ctau);
                    let flight = -env.rng.uniform01().max(MIN_U).ln() / rate;
                    if flight < delta {
                        let dx_flight = locals.density * flight;
                        state.energy = (state.energy
                            - self.loss(material, state.energy + mass) * dx_flight)
                            .max(0.0);
                        advance(state, env.motion(state), flight, dx_flight);
                        state.decayed = true;
                        return Ok(());
                    }
                }
            }

            let loss = self.loss(material, state.energy + mass);
            if env.reversed {
                let before = state.energy + mass;
                state.energy += loss * dx;
                // Characteristic-map Jacobian recovering the forward flux.
                state.weight *= self.loss(material, state.energy + mass)
                    / self.loss(material, before);
            } else {
                state.energy -= loss * dx;
                if state.energy <= env.kinetic_limit {
                    state.energy = state.energy.max(0.0);
                    advance(state, env.motion(state), delta, dx);
                    return Ok(());
                }
            }
            advance(state, env.motion(state), delta, dx);

            if horizon {
                return Ok(());
            }
            if env.reversed && env.kinetic_limit > 0.0 && state.energy >= env.kinetic_limit {
                return Ok(());
            }
        }
    }
}

// ============================================================================
// DECAY ENGINE
// ============================================================================

/// Decay channels with branching ratios and an effective hadronic mass
///
/// (branching ratio, lepton pid base or hadron pid base, hadron mass)
const CHANNEL_ELECTRON: f64 = 0.178;
const CHANNEL_MUON: f64 = 0.174;
const HADRON_CHANNELS: [(f64, i32, f64); 4] = [
    (0.108, -211, 0.13957),
    (0.255, -213, 0.77526),
    (0.190, -20213, 1.2300),
    (0.095, -100213, 1.4650),
];

/// Branching-ratio table decay engine, isotropic in the tau rest frame
pub struct TableDecayEngine;

impl TableDecayEngine {
    pub fn new() -> Self {
        Self
    }

    /// Michel-like tau-neutrino spectrum x²(3−2x), sampled by rejection
    fn sample_michel(&self, rng: &mut MersenneTwister) -> f64 {
        loop {
            let x = rng.uniform01();
            if rng.uniform01() <= x * x * (3.0 - 2.0 * x) {
                return x;
            }
        }
    }

    /// Three-body leptonic decay in the rest frame, then boosted
    fn leptonic(
        &self,
        rng: &mut MersenneTwister,
        sign: i32,
        lepton_base: i32,
        axis: Vec3,
        gamma: f64,
        beta: f64,
    ) -> Vec<DecayProduct> {
        let m = TAU_MASS;
        let x = self.sample_michel(rng);
        let e_nu = (0.5 * m * x).min(0.5 * m * (1.0 - 1e-9));
        let nu_dir = isotropic(rng);

        // The charged lepton and its antineutrino recoil as a massless
        // pair of invariant mass m23.
        let m23 = (m * m - 2.0 * m * e_nu).max(0.0).sqrt();
        let e23 = m - e_nu;
        let pair_beta = if e23 > 0.0 { e_nu / e23 } else { 0.0 };
        let pair_gamma = if m23 > 0.0 { e23 / m23 } else { 1.0 };
        let pair_axis = -nu_dir;

        let half = 0.5 * m23;
        let d = isotropic(rng);
        let p_lepton = boost(pair_axis, pair_gamma, pair_beta, half, half * d);
        let p_antinu = boost(pair_axis, pair_gamma, pair_beta, half, -1.0 * (half * d));

        let products = [
            (sign * PID_NU_TAU, e_nu, nu_dir * e_nu),
            (sign * lepton_base, p_lepton.mag(), p_lepton),
            (sign * -(lepton_base + 1), p_antinu.mag(), p_antinu),
        ];
        products
            .into_iter()
            .map(|(pid, energy, momentum)| DecayProduct {
                pid,
                momentum: boost(axis, gamma, beta, energy, momentum),
            })
            .collect()
    }

    /// Two-body hadronic decay in the rest frame, then boosted
    fn hadronic(
        &self,
        rng: &mut MersenneTwister,
        sign: i32,
        hadron_base: i32,
        hadron_mass: f64,
        axis: Vec3,
        gamma: f64,
        beta: f64,
    ) -> Vec<DecayProduct> {
        let m = TAU_MASS;
        let e_nu = (m * m - hadron_mass * hadron_mass) / (2.0 * m);
        let e_h = m - e_nu;
        let dir = isotropic(rng);

        vec![
            DecayProduct {
                pid: sign * PID_NU_TAU,
                momentum: boost(axis, gamma, beta, e_nu, dir * e_nu),
            },
            DecayProduct {
                pid: sign * hadron_base,
                momentum: boost(axis, gamma, beta, e_h, -1.0 * (dir * e_nu)),
            },
        ]
    }
}

impl Default for TableDecayEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl DecayEngine for TableDecayEngine {
    fn decay(
        &self,
        rng: &mut MersenneTwister,
        pid: i32,
        momentum: Vec3,
        _polarisation: Vec3,
    ) -> std::result::Result<Vec<DecayProduct>, EngineError> {
        if pid.abs() != PID_TAU {
            return Err(EngineError::Decay(format!("cannot decay pid {pid}")));
        }
        let p = momentum.mag();
        if p <= 0.0 {
            return Err(EngineError::Decay("tau at rest".into()));
        }
        let energy = (p * p + TAU_MASS * TAU_MASS).sqrt();
        let gamma = energy / TAU_MASS;
        let beta = p / energy;
        let axis = momentum.normalize();
        let sign = pid.signum();

        let mut u = rng.uniform01();
        if u < CHANNEL_ELECTRON {
            return Ok(self.leptonic(rng, sign, PID_ELECTRON, axis, gamma, beta));
        }
        u -= CHANNEL_ELECTRON;
        if u < CHANNEL_MUON {
            return Ok(self.leptonic(rng, sign, PID_MUON, axis, gamma, beta));
        }
        u -= CHANNEL_MUON;
        for (ratio, base, mass) in HADRON_CHANNELS {
            if u < ratio {
                return Ok(self.hadronic(rng, sign, base, mass, axis, gamma, beta));
            }
            u -= ratio;
        }
        // Residual probability mass goes to the heaviest channel.
        let (_, base, mass) = HADRON_CHANNELS[3];
        Ok(self.hadronic(rng, sign, base, mass, axis, gamma, beta))
    }

    fn undecay(
        &self,
        rng: &mut MersenneTwister,
        pid: i32,
        momentum: Vec3,
        bias: f64,
    ) -> std::result::Result<(Vec<DecayProduct>, f64), EngineError> {
        if pid.abs() != PID_NU_TAU {
            return Err(EngineError::Decay(format!("cannot un-decay pid {pid}")));
        }
        let e_nu = momentum.mag();
        if e_nu <= 0.0 || bias <= 0.0 {
            return Err(EngineError::Decay("degenerate un-decay input".into()));
        }

        // Draw the energy fraction x = E_ν/E_τ with density bias·x^(bias−1),
        // which favours tau parents close to the neutrino energy; the
        // weight is the importance ratio against the flat true density.
        let x = rng.uniform01().max(MIN_U).powf(1.0 / bias);
        let weight = 1.0 / (bias * x.powf(bias - 1.0));

        let e_tau = (e_nu / x).max(TAU_MASS * (1.0 + 1e-12));
        let p_tau = (e_tau * e_tau - TAU_MASS * TAU_MASS).sqrt();
        let tau_pid = if pid > 0 { PID_TAU } else { -PID_TAU };
        let tau = DecayProduct {
            pid: tau_pid,
            momentum: momentum.normalize() * p_tau,
        };
        Ok((vec![tau], weight))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::EarthModel;

    fn env_fixture<'a>(
        earth: &'a EarthModel,
        rng: &'a mut MersenneTwister,
    ) -> EngineEnv<'a> {
        EngineEnv::new(earth, rng)
    }

    #[test]
    fn test_cross_section_growth() {
        let engine = PowerLawNeutrinoEngine::new();
        let low = engine.cross_section(PID_NU_TAU, 1e6, 13.0, 26.0).unwrap();
        let high = engine.cross_section(PID_NU_TAU, 1e9, 13.0, 26.0).unwrap();
        assert!(high > low);

        // The resonance shows up for electron antineutrinos only.
        let off = engine
            .cross_section(PID_NU_TAU, GLASHOW_ENERGY, 13.0, 26.0)
            .unwrap();
        let on = engine
            .cross_section(-PID_NU_E, GLASHOW_ENERGY, 13.0, 26.0)
            .unwrap();
        assert!(on > 10.0 * off);

        assert!(engine.cross_section(PID_NU_TAU, 0.0, 13.0, 26.0).is_err());
    }

    #[test]
    fn test_neutrino_grammage_stream() {
        // With the horizon set, transport stops exactly on it.
        let earth = EarthModel::new();
        let mut rng = MersenneTwister::from_seed(11);
        let mut env = env_fixture(&earth, &mut rng);
        env.grammage_max = 1.0e2;

        let engine = PowerLawNeutrinoEngine::new();
        let mut state = ParticleState::neutrino(
            PID_NU_TAU,
            1e9,
            Vec3::new(0.0, 0.0, -(EARTH_RADIUS - 1.0e3)),
            Vec3::new(0.0, 0.0, -1.0),
            1.0,
        );
        let event = engine.transport(&mut env, &mut state, None).unwrap();
        assert_eq!(event, TransportEvent::None);
        assert!((state.grammage - 1.0e2).abs() < 1e-6);
    }

    #[test]
    fn test_neutrino_exit_through_atmosphere() {
        // An upgoing neutrino in air leaves the model long before it
        // interacts.
        let earth = EarthModel::new();
        let mut rng = MersenneTwister::from_seed(4);
        let mut env = env_fixture(&earth, &mut rng);

        let engine = PowerLawNeutrinoEngine::new();
        let mut state = ParticleState::neutrino(
            PID_NU_TAU,
            1e9,
            Vec3::new(0.0, 0.0, EARTH_RADIUS + 1.0e3),
            Vec3::new(0.0, 0.0, 1.0),
            1.0,
        );
        let event = engine.transport(&mut env, &mut state, None).unwrap();
        assert_eq!(event, TransportEvent::Exit);
        assert!(state.grammage < 1.0e5);
    }

    #[test]
    fn test_forward_interaction_splits_energy() {
        // Deep inside the Earth an EeV neutrino interacts quickly.
        let earth = EarthModel::new();
        let mut rng = MersenneTwister::from_seed(21);
        let mut env = env_fixture(&earth, &mut rng);

        let engine = PowerLawNeutrinoEngine::new();
        let mut interactions = 0;
        let mut charged_current = 0;
        for _ in 0..50 {
            let mut state = ParticleState::neutrino(
                PID_NU_TAU,
                1e9,
                Vec3::new(0.0, 0.0, -1.0e6),
                Vec3::new(0.0, 0.0, 1.0),
                1.0,
            );
            let mut product = state.clone();
            let event = engine
                .transport(&mut env, &mut state, Some(&mut product))
                .unwrap();
            if event != TransportEvent::Interaction {
                // A small fraction punches through the whole chord.
                assert_eq!(event, TransportEvent::Exit);
                continue;
            }
            interactions += 1;

            // Energy is shared between the slots.
            let total = state.energy + product.energy;
            assert!(total <= 1e9 * (1.0 + 1e-9));
            assert!(total >= 1e9 * (1.0 - 1e-9));

            if state.pid.abs() == PID_TAU {
                // Charged current: lepton continues in the main slot.
                assert_eq!(product.pid, 0);
                charged_current += 1;
            }
        }
        assert!(interactions > 20);
        assert!(charged_current > 0);
    }

    #[test]
    fn test_backward_vertex_conversion() {
        let earth = EarthModel::new();
        let mut rng = MersenneTwister::from_seed(5);
        let mut env = env_fixture(&earth, &mut rng);

        let engine = PowerLawNeutrinoEngine::new();
        let mut state = ParticleState::tau(
            PID_TAU,
            1e8,
            Vec3::new(0.0, 0.0, -1.0e6),
            Vec3::new(0.0, 0.0, 1.0),
            1.0,
        );
        state.energy = 1e8 + TAU_MASS; // expressed as total energy
        engine.vertex(&mut env, &mut state).unwrap();
        assert_eq!(state.pid, PID_NU_TAU);
        assert!(state.energy >= 1e8 + TAU_MASS);
        assert!(state.weight >= 1.0);

        let mut not_a_tau = ParticleState::neutrino(
            PID_NU_TAU,
            1e9,
            Vec3::zero(),
            Vec3::new(0.0, 0.0, 1.0),
            1.0,
        );
        assert!(engine.vertex(&mut env, &mut not_a_tau).is_err());
    }

    #[test]
    fn test_material_cache_round_trip() {
        let dir = std::env::temp_dir().join("tausim-cache-test");
        std::fs::create_dir_all(&dir).unwrap();
        let cache = dir.join("materials.b");
        let _ = std::fs::remove_file(&cache);

        let first = CsdaTauEngine::initialise(&cache).unwrap();
        assert!(cache.exists());
        let second = CsdaTauEngine::initialise(&cache).unwrap();
        assert_eq!(first.tables, second.tables);

        std::fs::write(&cache, b"garbage").unwrap();
        assert!(CsdaTauEngine::initialise(&cache).is_err());
        let _ = std::fs::remove_file(&cache);
    }

    #[test]
    fn test_tau_transport_loses_energy_and_decays() {
        let earth = EarthModel::new();
        let mut rng = MersenneTwister::from_seed(7);
        let mut env = env_fixture(&earth, &mut rng);
        env.kinetic_limit = 1e2;

        let engine = CsdaTauEngine {
            tables: STOPPING_DEFAULTS,
        };
        // A modest tau in rock decays within metres.
        let mut state = ParticleState::tau(
            PID_TAU,
            1e5,
            Vec3::new(0.0, 0.0, -1.0e6),
            Vec3::new(0.0, 0.0, 1.0),
            1.0,
        );
        engine.transport(&mut env, &mut state).unwrap();
        assert!(state.decayed);
        assert!(state.energy < 1e5);
        assert!(state.distance > 0.0);
    }

    #[test]
    fn test_tau_backward_gains_energy() {
        let earth = EarthModel::new();
        let mut rng = MersenneTwister::from_seed(8);
        let mut env = env_fixture(&earth, &mut rng);
        env.reversed = true;
        env.grammage_max = 1.0e5;

        let engine = CsdaTauEngine {
            tables: STOPPING_DEFAULTS,
        };
        let mut state = ParticleState::tau(
            PID_TAU,
            1e7,
            Vec3::new(0.0, 0.0, -(EARTH_RADIUS - 1.0e4)),
            Vec3::new(0.0, 0.0, 1.0),
            1.0,
        );
        engine.transport(&mut env, &mut state).unwrap();
        assert!(!state.decayed);
        assert!(state.energy > 1e7);
        assert!((state.grammage - 1.0e5).abs() < 1e-6);
        assert!(state.weight > 1.0);
    }

    #[test]
    fn test_decay_products_conserve_energy() {
        let engine = TableDecayEngine::new();
        let mut rng = MersenneTwister::from_seed(13);
        let p = 1e8;
        let momentum = Vec3::new(0.0, 0.0, p);
        let e_tau = (p * p + TAU_MASS * TAU_MASS).sqrt();

        for _ in 0..200 {
            let products = engine
                .decay(&mut rng, PID_TAU, momentum, Vec3::new(0.0, 0.0, 1.0))
                .unwrap();
            assert!(products.len() >= 2);

            // One tau neutrino per decay, energy roughly conserved.
            let nus = products.iter().filter(|d| d.pid == PID_NU_TAU).count();
            assert_eq!(nus, 1);
            let total: f64 = products.iter().map(|d| d.momentum.mag()).sum();
            assert!((total - e_tau).abs() / e_tau < 0.05);

            // Daughters fly forward at these boosts.
            for d in &products {
                assert!(d.momentum.z > 0.0);
            }
        }

        assert!(engine
            .decay(&mut rng, PID_MUON, momentum, Vec3::zero())
            .is_err());
        assert!(engine
            .decay(&mut rng, PID_TAU, Vec3::zero(), Vec3::zero())
            .is_err());
    }

    #[test]
    fn test_decay_charge_mirror() {
        let engine = TableDecayEngine::new();
        let mut rng = MersenneTwister::from_seed(14);
        let momentum = Vec3::new(0.0, 0.0, 1e8);

        for _ in 0..50 {
            let products = engine
                .decay(&mut rng, -PID_TAU, momentum, Vec3::new(0.0, 0.0, 1.0))
                .unwrap();
            assert!(products.iter().any(|d| d.pid == -PID_NU_TAU));
            // A tau-plus never yields an electron antineutrino.
            assert!(products.iter().all(|d| d.pid != -PID_NU_E));
        }
    }

    #[test]
    fn test_undecay_returns_heavier_tau() {
        let engine = TableDecayEngine::new();
        let mut rng = MersenneTwister::from_seed(15);
        let momentum = Vec3::new(0.0, 0.0, 1e8);

        for _ in 0..100 {
            let (products, weight) = engine
                .undecay(&mut rng, PID_NU_TAU, momentum, DECAY_BIAS)
                .unwrap();
            assert_eq!(products[0].pid, PID_TAU);
            assert!(products[0].momentum.mag() >= 1e8 * (1.0 - 1e-12));
            assert!(weight > 0.0);
        }

        assert!(engine
            .undecay(&mut rng, PID_TAU, momentum, DECAY_BIAS)
            .is_err());
    }
}
