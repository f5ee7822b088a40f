//! # Geometry Module
//!
//! Radially stratified Earth model and ray-to-shell stepping.
//!
//! ## Model
//!
//! Fifteen concentric spherical shells: seven polynomial segments for the
//! solid Earth (Preliminary Reference Earth Model), two uniform crust
//! layers, one uniform sea layer, four exponential atmosphere segments
//! (U.S. Standard Atmosphere shape ρ(r) = B/C·exp(−(r−R_E)/C)) and a
//! near-vacuum outer-space shell up to the geostationary radius.
//!
//! Each shell also provides a step-size hint, 0.01·R/|dρ/dr|, which bounds
//! how far an engine may stream before re-sampling the density.
//!
//! ## References
//!
//! [1] Dziewonski & Anderson, "Preliminary reference Earth model", PEPI 25
//!     (1981)
//! [2] U.S. Standard Atmosphere, NASA-TM-X-74335 (1976)

use crate::constants::*;
use crate::types::{ParticleState, Vec3};

// ============================================================================
// SHELL TABLE
// ============================================================================

/// Number of shells in the model
pub const SHELL_COUNT: usize = 15;

/// Index of the first atmosphere shell; lower indices are ground or sea
pub const FIRST_AIR_SHELL: i32 = 10;

/// Index of the sea shell, aliased to rock by the dry view
pub const SEA_SHELL: usize = 9;

/// Outer radii of the shells (m), plus a terminal sentinel bound
pub const SHELL_RADII: [f64; SHELL_COUNT + 1] = [
    1221.5e3,
    3480.0e3,
    5701.0e3,
    5771.0e3,
    5971.0e3,
    6151.0e3,
    6346.6e3,
    6356.0e3,
    6368.0e3,
    EARTH_RADIUS,
    EARTH_RADIUS + 4.0e3,
    EARTH_RADIUS + 1.0e4,
    EARTH_RADIUS + 4.0e4,
    EARTH_RADIUS + 1.0e5,
    GEO_ORBIT,
    2.0 * GEO_ORBIT,
];

/// Exponential atmosphere segments as (B, C) pairs (kg/m², m)
const USS_SEGMENTS: [(f64, f64); 4] = [
    (12226.562, 9941.8638),
    (11449.069, 8781.5355),
    (13055.948, 6361.4304),
    (5401.778, 7721.7016),
];

// ============================================================================
// MATERIALS
// ============================================================================

/// Bulk material of a shell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Material {
    Rock,
    Water,
    Air,
    Vacuum,
}

impl Material {
    /// Effective atomic number seen by the neutrino engine
    pub fn z(&self) -> f64 {
        match self {
            Material::Rock => 13.0,
            Material::Water => 10.0,
            Material::Air | Material::Vacuum => 7.32,
        }
    }

    /// Effective mass number seen by the neutrino engine
    pub fn a(&self) -> f64 {
        match self {
            Material::Rock => 26.0,
            Material::Water => 18.0,
            Material::Air | Material::Vacuum => 14.72,
        }
    }

    /// Stopping-power table index used by the lepton engine
    pub fn index(&self) -> usize {
        match self {
            Material::Rock => 0,
            Material::Water => 1,
            Material::Air | Material::Vacuum => 2,
        }
    }

    /// Human-readable name
    pub fn name(&self) -> &'static str {
        match self {
            Material::Rock => "rock",
            Material::Water => "water",
            Material::Air => "air",
            Material::Vacuum => "vacuum",
        }
    }
}

/// Shell to material assignment, before any dry-sea aliasing
const SHELL_MATERIALS: [Material; SHELL_COUNT] = [
    Material::Rock,
    Material::Rock,
    Material::Rock,
    Material::Rock,
    Material::Rock,
    Material::Rock,
    Material::Rock,
    Material::Rock,
    Material::Rock,
    Material::Water,
    Material::Air,
    Material::Air,
    Material::Air,
    Material::Air,
    Material::Vacuum,
];

// ============================================================================
// DENSITY PROFILES
// ============================================================================

/// Density (kg/m³) and step hint (m) of a shell at radius r
///
/// A zero hint means the density is uniform and imposes no step limit.
fn profile(shell: usize, r: f64) -> (f64, f64) {
    let x = r / EARTH_RADIUS;
    match shell {
        0 => {
            let a2 = -8.8381e3;
            let density = 13.0885e3 + a2 * x * x;
            // The gradient vanishes at the centre; clamp the hint there.
            let xg = if x <= 5e-2 { 5e-2 } else { x };
            (density, 0.01 * EARTH_RADIUS / (2.0 * a2 * xg).abs())
        }
        1 => {
            let a = 1.2638e3;
            let density = 12.58155e3 + x * (-a + x * (-3.6426e3 - x * 5.5281e3));
            (density, 0.01 * EARTH_RADIUS / a)
        }
        2 => {
            let a = 6.4761e3;
            let density = 7.9565e3 + x * (-a + x * (5.5283e3 - x * 3.0807e3));
            (density, 0.01 * EARTH_RADIUS / a)
        }
        3 => {
            let a = 1.4836e3;
            (5.3197e3 - a * x, 0.01 * EARTH_RADIUS / a)
        }
        4 => {
            let a = 8.0298e3;
            (11.2494e3 - a * x, 0.01 * EARTH_RADIUS / a)
        }
        5 => {
            let a = 3.8045e3;
            (7.1089e3 - a * x, 0.01 * EARTH_RADIUS / a)
        }
        6 => {
            let a = 0.6924e3;
            (2.691e3 + a * x, 0.01 * EARTH_RADIUS / a)
        }
        7 => (2.9e3, 0.0),
        8 => (2.6e3, 0.0),
        9 => (1.02e3, 0.0),
        10..=13 => {
            let (b, c) = USS_SEGMENTS[shell - 10];
            (b / c * (-(r - EARTH_RADIUS) / c).exp(), 0.01 * c)
        }
        // ~10^6 hydrogen atoms per m³.
        _ => (1.0e-21, 0.0),
    }
}

// ============================================================================
// EARTH MODEL
// ============================================================================

/// Layered Earth with an optional dry-sea view
///
/// The dry view aliases the sea shell onto the upper-crust shell (material
/// and density both) without touching any shared table, so contexts with
/// different views can coexist.
#[derive(Debug, Clone)]
pub struct EarthModel {
    dry: bool,
}

impl Default for EarthModel {
    fn default() -> Self {
        Self::new()
    }
}

impl EarthModel {
    /// Create the standard model, sea included
    pub fn new() -> Self {
        Self { dry: false }
    }

    /// Replace the sea layer with upper-crust rock, or restore it
    pub fn set_dry(&mut self, dry: bool) {
        self.dry = dry;
    }

    /// True when the sea layer is aliased to rock
    pub fn is_dry(&self) -> bool {
        self.dry
    }

    /// Shell index the dry view resolves to
    fn view(&self, shell: usize) -> usize {
        if self.dry && shell == SEA_SHELL {
            SEA_SHELL - 1
        } else {
            shell
        }
    }

    /// Material of a shell under the current view
    pub fn material(&self, shell: usize) -> Material {
        SHELL_MATERIALS[self.view(shell)]
    }

    /// Density (kg/m³) and step hint (m) of a shell at radius r
    pub fn density(&self, shell: usize, r: f64) -> (f64, f64) {
        profile(self.view(shell), r)
    }

    /// Smallest shell containing radius r
    pub fn locate(&self, r: f64) -> Option<usize> {
        SHELL_RADII[..SHELL_COUNT].iter().position(|&ri| r <= ri)
    }

    /// Suggested step to the next shell boundary
    ///
    /// Writes the shell index, radius and flux-crossing classification into
    /// `state` as a side effect. Returns 0 with `state.medium == -1` when
    /// the trajectory has left the model: beyond the geostationary radius
    /// for any particle, above the atmosphere for neutrinos. When a flux
    /// sphere is given and armed on the state, a detected crossing fires
    /// the latch and also returns 0.
    pub fn step(
        &self,
        position: Vec3,
        direction: Vec3,
        state: &mut ParticleState,
        flux_radius: Option<f64>,
    ) -> f64 {
        state.medium = -1;

        let r2 = position.mag_squared();
        if r2 > GEO_ORBIT * GEO_ORBIT {
            return 0.0;
        }
        let r = r2.sqrt();
        state.r = r;

        if let Some(rf) = flux_radius {
            if state.has_crossed >= 0 {
                if state.is_inside < 0 {
                    state.is_inside = if r < rf { 1 } else { 0 };
                } else if (state.is_inside != 0 && r >= rf)
                    || (state.is_inside == 0 && r <= rf)
                {
                    state.has_crossed = 1;
                    return 0.0;
                }
            }
        }

        // Neutrinos that leave the atmosphere do not come back.
        if !state.is_tau() && r > SHELL_RADII[13] {
            return 0.0;
        }

        for i in 0..SHELL_COUNT {
            let ri = SHELL_RADII[i];
            if r > ri {
                continue;
            }
            state.medium = i as i32;

            // Outgoing root of the current shell.
            let b = position.dot(&direction);
            let d2 = b * b + ri * ri - r * r;
            let d = if d2 <= 0.0 { 0.0 } else { d2.sqrt() };
            let mut step = d - b;

            if i > 0 && b < 0.0 {
                // Downgoing: check the incoming root of the shell below.
                let r1 = SHELL_RADII[i - 1];
                let d2 = b * b + r1 * r1 - r * r;
                if d2 > 0.0 {
                    let s = -b - d2.sqrt();
                    if s > 0.0 && s < step {
                        step = s;
                    }
                }
            }
            if step < MIN_STEP {
                step = MIN_STEP;
            }
            return step;
        }
        0.0
    }
}
