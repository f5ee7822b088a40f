//! # Sampler Module
//!
//! Primary-event sampler: validates the kinematic windows and draws the
//! primary direction, energy and altitude with their importance weights.
//!
//! The sampler fields stay mutable until [`EventSampler::update`] is
//! called, which validates them, derives the particle weights and stamps an
//! integrity digest. Transport refuses to run on a sampler whose digest is
//! stale, so silent post-update edits cannot skew a production run.

use crate::constants::*;
use crate::error::{Result, TausimError};
use crate::stochastic::MersenneTwister;
use crate::types::ParticleKind;

// ============================================================================
// EVENT SAMPLER
// ============================================================================

/// Sampling windows and per-particle target weights for a run
#[derive(Debug, Clone)]
pub struct EventSampler {
    /// cos(θ) window for forward primaries, θ measured from the vertical
    pub cos_theta: [f64; 2],
    /// Elevation window (degrees) for backward primaries
    pub elevation: [f64; 2],
    /// Altitude window (m) of the detection point
    pub altitude: [f64; 2],
    /// Primary energy window (GeV)
    pub energy: [f64; 2],
    /// Target weight per particle kind, table order of [`ParticleKind`]
    pub weight: [f64; ParticleKind::COUNT],

    neutrino_weight: f64,
    total_weight: f64,
    digest: u64,
}

impl Default for EventSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSampler {
    /// Create a blank sampler; `update` must run before any transport
    pub fn new() -> Self {
        Self {
            cos_theta: [0.0; 2],
            elevation: [0.0; 2],
            altitude: [0.0; 2],
            energy: [0.0; 2],
            weight: [0.0; ParticleKind::COUNT],
            neutrino_weight: 0.0,
            total_weight: 0.0,
            digest: u64::MAX,
        }
    }

    /// Validate the windows, derive the weights and stamp the digest
    pub fn update(&mut self) -> Result<()> {
        if self.altitude[0] < 0.0 || self.altitude[0] > self.altitude[1] {
            return Err(TausimError::config("invalid altitude value(s)"));
        }
        if self.cos_theta[0] < 0.0
            || self.cos_theta[0] > self.cos_theta[1]
            || self.cos_theta[1] > 1.0
        {
            return Err(TausimError::config("invalid cos(theta) value(s)"));
        }
        if self.elevation[0] < -90.0
            || self.elevation[0] > self.elevation[1]
            || self.elevation[1] > 90.0
        {
            return Err(TausimError::config("invalid elevation value(s)"));
        }
        if self.energy[0] < ENERGY_FLOOR
            || self.energy[0] > self.energy[1]
            || self.energy[1] > ENERGY_CEIL
        {
            return Err(TausimError::config("invalid energy value(s)"));
        }

        self.neutrino_weight = self.weight[..ParticleKind::NEUTRINO_COUNT]
            .iter()
            .filter(|&&w| w > 0.0)
            .sum();
        self.total_weight = self.neutrino_weight;
        for kind in [ParticleKind::TauBar, ParticleKind::Tau] {
            let w = self.weight[kind.index()];
            if w > 0.0 {
                self.total_weight += w;
            }
        }

        self.digest = self.compute_digest();
        Ok(())
    }

    /// Sum of the positive neutrino target weights
    pub fn neutrino_weight(&self) -> f64 {
        self.neutrino_weight
    }

    /// Sum of all positive target weights
    pub fn total_weight(&self) -> f64 {
        self.total_weight
    }

    /// First kind with a positive target weight
    pub fn target(&self) -> Option<ParticleKind> {
        ParticleKind::ALL
            .iter()
            .copied()
            .find(|k| self.weight[k.index()] > 0.0)
    }

    /// True while the stamped digest matches the current field values
    pub fn is_current(&self) -> bool {
        self.digest == self.compute_digest()
    }

    /// Bernstein's djb2 hash over the sampler inputs
    fn compute_digest(&self) -> u64 {
        let mut hash: u64 = 5381;
        let mut eat = |bytes: &[u8]| {
            for &c in bytes {
                hash = hash.wrapping_shl(5).wrapping_add(hash).wrapping_add(c as u64);
            }
        };
        for range in [&self.cos_theta, &self.elevation, &self.altitude, &self.energy] {
            for value in range.iter() {
                eat(&value.to_bits().to_le_bytes());
            }
        }
        for value in self.weight.iter() {
            eat(&value.to_bits().to_le_bytes());
        }
        hash
    }
}

// ============================================================================
// DRAW OPERATIONS
// ============================================================================

/// Linear draw over a window
///
/// With `grid = Some((i, n))` the value is taken on the uniform grid
/// u = i/(n−1) (grammage scans); otherwise u is random and the optional
/// weight picks up the window width.
pub fn sample_linear(
    rng: &mut MersenneTwister,
    x: [f64; 2],
    grid: Option<(u64, u64)>,
    weight: Option<&mut f64>,
) -> f64 {
    if x[0] >= x[1] {
        return x[0];
    }
    let dx = x[1] - x[0];
    let u = match grid {
        Some((i, n)) if n > 0 => {
            if n > 1 {
                i as f64 / (n - 1) as f64
            } else {
                0.0
            }
        }
        _ => {
            let u = rng.uniform01();
            if let Some(w) = weight {
                *w *= dx;
            }
            u
        }
    };
    dx * u + x[0]
}

/// Log-uniform draw when the endpoints share a sign, linear otherwise
pub fn sample_log_or_linear(
    rng: &mut MersenneTwister,
    x: [f64; 2],
    weight: Option<&mut f64>,
) -> f64 {
    if x[0] >= x[1] {
        return x[0];
    }
    if x[0] > 0.0 || x[1] < 0.0 {
        let r = (x[1] / x[0]).ln();
        let xi = x[0] * (r * rng.uniform01()).exp();
        if let Some(w) = weight {
            *w *= r.abs() * xi;
        }
        xi
    } else {
        let dx = x[1] - x[0];
        let xi = x[0] + dx * rng.uniform01();
        if let Some(w) = weight {
            *w *= dx;
        }
        xi
    }
}
