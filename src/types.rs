//! # Core Types
//!
//! Fundamental types for the transport engine: the 3-vector, the particle
//! table and the unified Monte-Carlo particle state.

use crate::constants::*;
use std::fmt;

// ============================================================================
// VECTOR TYPES (3D)
// ============================================================================

/// 3D vector for positions, directions and momenta
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    /// Create new vector
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Zero vector
    pub const fn zero() -> Self {
        Self { x: 0.0, y: 0.0, z: 0.0 }
    }

    /// Magnitude squared
    pub fn mag_squared(&self) -> f64 {
        self.x * self.x + self.y * self.y + self.z * self.z
    }

    /// Magnitude
    pub fn mag(&self) -> f64 {
        self.mag_squared().sqrt()
    }

    /// Normalize to unit vector
    pub fn normalize(&self) -> Self {
        let m = self.mag();
        if m > 1e-15 {
            Self::new(self.x / m, self.y / m, self.z / m)
        } else {
            Self::zero()
        }
    }

    /// Dot product
    pub fn dot(&self, other: &Self) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    /// Cross product
    pub fn cross(&self, other: &Self) -> Self {
        Self::new(
            self.y * other.z - self.z * other.y,
            self.z * other.x - self.x * other.z,
            self.x * other.y - self.y * other.x,
        )
    }
}

impl std::ops::Add for Vec3 {
    type Output = Self;
    fn add(self, other: Self) -> Self {
        Self::new(self.x + other.x, self.y + other.y, self.z + other.z)
    }
}

impl std::ops::Sub for Vec3 {
    type Output = Self;
    fn sub(self, other: Self) -> Self {
        Self::new(self.x - other.x, self.y - other.y, self.z - other.z)
    }
}

impl std::ops::Neg for Vec3 {
    type Output = Self;
    fn neg(self) -> Self {
        Self::new(-self.x, -self.y, -self.z)
    }
}

impl std::ops::Mul<f64> for Vec3 {
    type Output = Self;
    fn mul(self, s: f64) -> Self {
        Self::new(self.x * s, self.y * s, self.z * s)
    }
}

impl std::ops::Mul<Vec3> for f64 {
    type Output = Vec3;
    fn mul(self, v: Vec3) -> Vec3 {
        Vec3::new(self * v.x, self * v.y, self * v.z)
    }
}

impl std::ops::AddAssign for Vec3 {
    fn add_assign(&mut self, other: Self) {
        self.x += other.x;
        self.y += other.y;
        self.z += other.z;
    }
}

impl fmt::Display for Vec3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.6e}, {:.6e}, {:.6e})", self.x, self.y, self.z)
    }
}

// ============================================================================
// PARTICLE TABLE
// ============================================================================

/// Particles addressable by the sampler weight table
///
/// The ordering is part of the table contract: neutrinos first, taus last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParticleKind {
    NuTauBar,
    NuMuBar,
    NuEBar,
    NuE,
    NuMu,
    NuTau,
    TauBar,
    Tau,
}

impl ParticleKind {
    /// Number of table entries
    pub const COUNT: usize = 8;

    /// Number of neutrino entries (the leading block of the table)
    pub const NEUTRINO_COUNT: usize = 6;

    /// All kinds in table order
    pub const ALL: [ParticleKind; Self::COUNT] = [
        ParticleKind::NuTauBar,
        ParticleKind::NuMuBar,
        ParticleKind::NuEBar,
        ParticleKind::NuE,
        ParticleKind::NuMu,
        ParticleKind::NuTau,
        ParticleKind::TauBar,
        ParticleKind::Tau,
    ];

    /// Table index
    pub fn index(self) -> usize {
        self as usize
    }

    /// PDG code
    pub fn pdg(self) -> i32 {
        match self {
            ParticleKind::NuTauBar => -PID_NU_TAU,
            ParticleKind::NuMuBar => -PID_NU_MU,
            ParticleKind::NuEBar => -PID_NU_E,
            ParticleKind::NuE => PID_NU_E,
            ParticleKind::NuMu => PID_NU_MU,
            ParticleKind::NuTau => PID_NU_TAU,
            ParticleKind::TauBar => -PID_TAU,
            ParticleKind::Tau => PID_TAU,
        }
    }

    /// Kind for a PDG code, if it is in the table
    pub fn from_pdg(pdg: i32) -> Option<Self> {
        ParticleKind::ALL.iter().copied().find(|k| k.pdg() == pdg)
    }

    /// True for the six neutrino entries
    pub fn is_neutrino(self) -> bool {
        self.index() < Self::NEUTRINO_COUNT
    }

    /// Human-readable name
    pub fn name(self) -> &'static str {
        match self {
            ParticleKind::NuTauBar => "nu_tau~",
            ParticleKind::NuMuBar => "nu_mu~",
            ParticleKind::NuEBar => "nu_e~",
            ParticleKind::NuE => "nu_e",
            ParticleKind::NuMu => "nu_mu",
            ParticleKind::NuTau => "nu_tau",
            ParticleKind::TauBar => "tau~",
            ParticleKind::Tau => "tau",
        }
    }
}

// ============================================================================
// MONTE-CARLO PARTICLE STATE
// ============================================================================

/// Unified particle state with stepping data
///
/// Carries both particle variants of the transport: neutrinos (`energy` is
/// the total energy) and charged leptons (`energy` is the kinetic energy,
/// `decayed` is meaningful). The trailing fields cache what the geometry
/// wrote during the last medium lookup.
#[derive(Debug, Clone)]
pub struct ParticleState {
    /// Signed PDG code
    pub pid: i32,
    /// Total energy (neutrino) or kinetic energy (charged lepton), GeV
    pub energy: f64,
    /// Position, Earth-centred Cartesian (m)
    pub position: Vec3,
    /// Direction of flight (unit vector)
    pub direction: Vec3,
    /// Distance travelled (m)
    pub distance: f64,
    /// Accumulated column density (kg/m²)
    pub grammage: f64,
    /// Importance weight; 0 kills the track
    pub weight: f64,
    /// Set by the lepton engine when the track ended in a decay
    pub decayed: bool,

    /// Cached radius ‖position‖ (m), maintained by the geometry
    pub r: f64,
    /// Current shell index, −1 when outside the model
    pub medium: i32,
    /// Cached local density (kg/m³)
    pub density: f64,
    /// Flux classification: −1 not yet classified, else 0/1
    pub is_inside: i32,
    /// Flux latch: −1 disabled, 0 armed, 1 fired
    pub has_crossed: i32,
    /// Number of detection-sphere crossings seen so far
    pub cross_count: i32,
}

impl ParticleState {
    /// Create a neutrino state with pristine stepping data
    pub fn neutrino(pid: i32, energy: f64, position: Vec3, direction: Vec3, weight: f64) -> Self {
        Self {
            pid,
            energy,
            position,
            direction,
            distance: 0.0,
            grammage: 0.0,
            weight,
            decayed: false,
            r: 0.0,
            medium: -1,
            density: 0.0,
            is_inside: -1,
            has_crossed: -1,
            cross_count: 0,
        }
    }

    /// Create a charged tau state; `kinetic` excludes the rest mass
    pub fn tau(pid: i32, kinetic: f64, position: Vec3, direction: Vec3, weight: f64) -> Self {
        Self {
            pid,
            energy: kinetic,
            ..Self::neutrino(pid, 0.0, position, direction, weight)
        }
    }

    /// True for tau leptons of either sign
    pub fn is_tau(&self) -> bool {
        self.pid.abs() == PID_TAU
    }

    /// Electric charge in units of e; the sign convention follows the PDG
    /// code (particle codes are negatively charged leptons)
    pub fn charge(&self) -> f64 {
        if self.pid > 0 {
            -1.0
        } else {
            1.0
        }
    }

    /// Tau momentum from the kinetic energy (GeV/c)
    pub fn tau_momentum(&self, mass: f64) -> f64 {
        (self.energy * (self.energy + 2.0 * mass)).sqrt()
    }

    /// Arm the flux-crossing latch
    pub fn arm_crossing(&mut self) {
        self.is_inside = -1;
        self.has_crossed = 0;
        self.cross_count = 0;
    }

    /// Disable flux-crossing detection
    pub fn disable_crossing(&mut self) {
        self.is_inside = -1;
        self.has_crossed = -1;
        self.cross_count = 0;
    }

    /// A track is alive while its weight is positive and finite
    pub fn alive(&self) -> bool {
        self.weight > 0.0 && self.weight.is_finite() && self.energy.is_finite()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec3_operations() {
        let a = Vec3::new(1.0, 2.0, 3.0);
        let b = Vec3::new(4.0, 5.0, 6.0);

        let c = a + b;
        assert!((c.x - 5.0).abs() < 1e-10);

        let dot = a.dot(&b);
        assert!((dot - 32.0).abs() < 1e-10);

        let cross = a.cross(&b);
        assert!((cross.x - (-3.0)).abs() < 1e-10);
        assert!((cross.y - 6.0).abs() < 1e-10);
        assert!((cross.z - (-3.0)).abs() < 1e-10);

        let n = Vec3::new(0.0, 3.0, 4.0).normalize();
        assert!((n.mag() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_particle_table_round_trip() {
        for kind in ParticleKind::ALL {
            assert_eq!(ParticleKind::from_pdg(kind.pdg()), Some(kind));
        }
        assert_eq!(ParticleKind::from_pdg(22), None);
        assert!(ParticleKind::NuEBar.is_neutrino());
        assert!(!ParticleKind::Tau.is_neutrino());
    }

    #[test]
    fn test_state_constructors() {
        let nu = ParticleState::neutrino(
            PID_NU_TAU,
            1e9,
            Vec3::new(0.0, 0.0, -EARTH_RADIUS),
            Vec3::new(0.0, 0.0, 1.0),
            1.0,
        );
        assert!(!nu.is_tau());
        assert_eq!(nu.medium, -1);
        assert_eq!(nu.has_crossed, -1);
        assert!(nu.alive());

        let tau = ParticleState::tau(PID_TAU, 1e8, Vec3::zero(), Vec3::new(1.0, 0.0, 0.0), 1.0);
        assert!(tau.is_tau());
        assert!((tau.charge() + 1.0).abs() < 1e-12);
        assert!(tau.tau_momentum(TAU_MASS) > tau.energy);
    }
}
