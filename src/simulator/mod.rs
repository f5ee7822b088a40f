//! # Simulator Module
//!
//! Per-run context and the event loop combining all components.
//!
//! A [`Context`] owns everything mutable a run needs: mode flags, the
//! sampler, its Earth-model view and the random stream. The process-wide
//! [`Engines`] are initialised once and shared read-only; several contexts
//! may run in parallel as long as each keeps its own state.

use crate::constants::*;
use crate::engines::Engines;
use crate::error::{Result, TausimError};
use crate::geometry::EarthModel;
use crate::output::RecordWriter;
use crate::sampler::{sample_linear, sample_log_or_linear, EventSampler};
use crate::stochastic::{MersenneTwister, MT_PERIOD};
use crate::transport::{
    backward::transport_backward, forward::transport_forward, stream, Transport,
    TransportSettings,
};
use crate::types::{ParticleState, Vec3};
use rayon::prelude::*;
use std::path::PathBuf;

// ============================================================================
// CONTEXT
// ============================================================================

/// Per-run simulation context
pub struct Context {
    /// Forward Monte-Carlo when true, backward otherwise
    pub forward: bool,
    /// Freeze all directions to the primary's
    pub longitudinal: bool,
    /// Sample tau decays; otherwise fluxes are requested
    pub decay: bool,
    /// Column-density scan instead of a particle Monte-Carlo
    pub grammage: bool,
    /// Output file; `None` writes to stdout
    pub output: Option<PathBuf>,
    /// Append to the output file instead of truncating it
    pub append: bool,
    /// Event sampler; must be updated before running
    pub sampler: Option<EventSampler>,
    /// Primary PDG override for forward runs; derived from the sampler
    /// targets when unset
    pub projectile: Option<i32>,
    /// Draw primary energies with unit weight instead of importance
    /// weighting
    pub energy_analog: bool,
    /// Emit non-neutrino forward daughters only for decays in air
    pub decay_in_air_only: bool,
    /// Forward kill threshold (GeV); defaults to the sampler's lower
    /// energy bound
    pub energy_cut: Option<f64>,
    /// Upper energy bound of backward transport (GeV)
    pub backward_energy_cut: f64,

    earth: EarthModel,
    rng: MersenneTwister,
}

impl Context {
    /// Create a context seeded from the OS entropy pool
    pub fn new() -> Result<Self> {
        Ok(Self::with_rng(MersenneTwister::from_entropy()?))
    }

    /// Create a context with a fixed seed
    pub fn with_seed(seed: u32) -> Self {
        Self::with_rng(MersenneTwister::from_seed(seed))
    }

    /// Create a context with a full generator state
    pub fn with_rng_state(state: [u32; MT_PERIOD]) -> Self {
        Self::with_rng(MersenneTwister::from_state(state))
    }

    fn with_rng(rng: MersenneTwister) -> Self {
        Self {
            forward: false,
            longitudinal: false,
            decay: true,
            grammage: false,
            output: None,
            append: false,
            sampler: None,
            projectile: None,
            energy_analog: false,
            decay_in_air_only: true,
            energy_cut: None,
            backward_energy_cut: BACKWARD_ENERGY_CUT,
            earth: EarthModel::new(),
            rng,
        }
    }

    /// Replace the sea layer with rock in this context's Earth view
    pub fn pem_dry(&mut self) {
        self.earth.set_dry(true);
    }

    /// Restore the sea layer
    pub fn pem_wet(&mut self) {
        self.earth.set_dry(false);
    }

    /// This context's Earth model
    pub fn earth(&self) -> &EarthModel {
        &self.earth
    }

    // ------------------------------------------------------------------
    // Run loop
    // ------------------------------------------------------------------

    /// Run `events` primaries against the configured output sink
    pub fn run(&mut self, engines: &Engines, events: u64) -> Result<()> {
        let mut writer = match &self.output {
            Some(path) => RecordWriter::create(path, self.append)?,
            None => RecordWriter::stdout(),
        };
        self.run_with_writer(engines, events, &mut writer)
    }

    /// Run against an explicit writer; the test-suite entry point
    pub fn run_with_writer(
        &mut self,
        engines: &Engines,
        events: u64,
        writer: &mut RecordWriter,
    ) -> Result<()> {
        let sampler = self
            .sampler
            .clone()
            .ok_or_else(|| TausimError::config("no sampler was provided"))?;
        if !sampler.is_current() {
            return Err(TausimError::config("sampler has not been updated"));
        }

        // Check the mode consistency and resolve the event count.
        let mut events = events;
        let mut flux_neutrino = false;
        if self.grammage {
            let window = if self.forward {
                sampler.cos_theta
            } else {
                sampler.elevation
            };
            if window[0] == window[1] {
                events = 1;
            } else if events < 2 {
                return Err(TausimError::config("number of bins must be 2 or more"));
            }
        } else {
            if sampler.total_weight() <= 0.0 {
                return Err(TausimError::config("no particle to sample"));
            }
            flux_neutrino = sampler.neutrino_weight() > 0.0;
            if self.decay {
                if sampler.neutrino_weight() == sampler.total_weight() {
                    return Err(TausimError::config("no tau(s) target to decay"));
                }
                if sampler.neutrino_weight() > 0.0 {
                    return Err(TausimError::config(
                        "combining neutrino(s) and tau(s) sampling is not supported",
                    ));
                }
                if self.forward && sampler.altitude[0] == sampler.altitude[1] {
                    return Err(TausimError::config("no altitude range for tau(s) decays"));
                }
            }
        }

        let energy_cut = if self.forward {
            self.energy_cut.unwrap_or(sampler.energy[0])
        } else {
            self.backward_energy_cut
        };
        let projectile = if self.grammage {
            PID_NU_TAU
        } else {
            let target = sampler.target().map(|k| k.pdg()).unwrap_or(PID_NU_TAU);
            if self.forward {
                // Forward runs inject a neutrino; map a tau target onto
                // its parent kind unless the caller named the primary.
                self.projectile.unwrap_or(if target.abs() == PID_TAU {
                    if target > 0 {
                        PID_NU_TAU
                    } else {
                        -PID_NU_TAU
                    }
                } else {
                    target
                })
            } else {
                target
            }
        };

        if self.grammage {
            writer.header_grammage(self.forward)?;
        } else {
            writer.header_decay()?;
        }

        let settings = TransportSettings {
            forward: self.forward,
            longitudinal: self.longitudinal,
            decay: self.decay,
            flux_neutrino,
            decay_in_air_only: self.decay_in_air_only,
            energy_cut,
            flux_altitude: sampler.altitude[0],
        };

        if self.forward {
            self.run_forward(engines, events, writer, &sampler, &settings, projectile)
        } else {
            self.run_backward(engines, events, writer, &sampler, &settings, projectile)
        }
    }

    /// Forward event loop
    fn run_forward(
        &mut self,
        engines: &Engines,
        events: u64,
        writer: &mut RecordWriter,
        sampler: &EventSampler,
        settings: &TransportSettings,
        projectile: i32,
    ) -> Result<()> {
        for i in 0..events {
            let grid = if self.grammage {
                Some((i, events))
            } else {
                None
            };
            let cos_theta = sample_linear(&mut self.rng, sampler.cos_theta, grid, None);
            let sin_theta = (1.0 - cos_theta * cos_theta).max(0.0).sqrt();
            let position = Vec3::new(0.0, 0.0, -EARTH_RADIUS - 1.0e5);
            let direction = Vec3::new(sin_theta, 0.0, cos_theta);

            if self.grammage {
                // Pure column-density scan along the primary trajectory.
                let mut state =
                    ParticleState::neutrino(projectile, sampler.energy[0], position, direction, 1.0);
                stream(&self.earth, &mut state, false);
                writer.grammage(true, cos_theta, state.grammage)?;
                continue;
            }

            let mut weight = 1.0;
            let energy = if self.energy_analog {
                sample_log_or_linear(&mut self.rng, sampler.energy, None)
            } else {
                let energy =
                    sample_log_or_linear(&mut self.rng, sampler.energy, Some(&mut weight));
                if sampler.energy[0] < sampler.energy[1] {
                    // Fold in a 1/E² reference spectrum.
                    weight *= sampler.energy[1] * sampler.energy[0]
                        / ((sampler.energy[1] - sampler.energy[0]) * energy * energy);
                }
                energy
            };

            let mut state =
                ParticleState::neutrino(projectile, energy, position, direction, weight);
            state.has_crossed = if self.decay { -1 } else { 0 };
            let ancestor = state.clone();

            let mut transport =
                Transport::new(engines, &self.earth, &mut self.rng, writer, settings.clone());
            transport_forward(&mut transport, &mut state, i, 1, &ancestor)?;
        }
        Ok(())
    }

    /// Backward event loop
    fn run_backward(
        &mut self,
        engines: &Engines,
        events: u64,
        writer: &mut RecordWriter,
        sampler: &EventSampler,
        settings: &TransportSettings,
        projectile: i32,
    ) -> Result<()> {
        let (tau_mass, _) = engines.tau_parameters();
        let cos_theta = [
            ((90.0 - sampler.elevation[0]).to_radians()).cos(),
            ((90.0 - sampler.elevation[1]).to_radians()).cos(),
        ];

        for i in 0..events {
            let grid = if self.grammage {
                Some((i, events))
            } else {
                None
            };
            let mut weight = 1.0;
            let ct = sample_linear(&mut self.rng, cos_theta, grid, Some(&mut weight));
            let st = (1.0 - ct * ct).max(0.0).sqrt();
            let energy = if self.energy_analog {
                sample_log_or_linear(&mut self.rng, sampler.energy, None)
            } else {
                sample_log_or_linear(&mut self.rng, sampler.energy, Some(&mut weight))
            };
            let altitude = sample_log_or_linear(&mut self.rng, sampler.altitude, Some(&mut weight));
            let position = Vec3::new(0.0, 0.0, EARTH_RADIUS + altitude);
            let direction = Vec3::new(st, 0.0, ct);

            if self.grammage {
                // Column-density scan against the line of sight.
                let mut state =
                    ParticleState::neutrino(projectile, sampler.energy[0], position, direction, 1.0);
                stream(&self.earth, &mut state, true);
                writer.grammage(false, ct, state.grammage)?;
                continue;
            }

            if settings.flux_neutrino {
                // Neutrino flux target: backward transport from a neutrino.
                let mut state =
                    ParticleState::neutrino(projectile, energy, position, direction, weight);
                state.disable_crossing();
                let mut final_state = None;
                let mut tau_at_production = None;
                let mut transport =
                    Transport::new(engines, &self.earth, &mut self.rng, writer, settings.clone());
                transport_backward(
                    &mut transport,
                    &mut state,
                    i,
                    1,
                    &mut final_state,
                    &mut tau_at_production,
                )?;
            } else {
                // Particle target: backward transport from a tau at decay.
                let mut state = ParticleState::tau(
                    projectile,
                    energy - tau_mass,
                    position,
                    direction,
                    weight,
                );
                state.disable_crossing();
                let mut final_state = None;
                let mut tau_at_production = None;
                let mut transport =
                    Transport::new(engines, &self.earth, &mut self.rng, writer, settings.clone());
                transport_backward(
                    &mut transport,
                    &mut state,
                    i,
                    1,
                    &mut final_state,
                    &mut tau_at_production,
                )?;
            }
        }
        Ok(())
    }
}

// ============================================================================
// PARALLEL RUNNER
// ============================================================================

/// Run several independent contexts across a thread pool
///
/// Each context keeps its own random stream, Earth view and output sink;
/// the engine set is shared read-only.
pub fn run_parallel(contexts: &mut [Context], engines: &Engines, events: u64) -> Result<()> {
    contexts
        .par_iter_mut()
        .map(|context| context.run(engines, events))
        .collect::<Result<Vec<()>>>()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ParticleKind;

    fn test_engines() -> &'static Engines {
        // One shared engine set; the cache write must not race between
        // test threads.
        static ENGINES: std::sync::OnceLock<Engines> = std::sync::OnceLock::new();
        ENGINES.get_or_init(|| {
            let dir = std::env::temp_dir().join("tausim-simulator-test");
            std::fs::create_dir_all(&dir).unwrap();
            let config = crate::engines::EngineConfig {
                pdf_file: None,
                material_cache: dir.join("materials.b"),
            };
            Engines::initialise(&config).unwrap()
        })
    }

    fn grammage_sampler(cos_theta: [f64; 2]) -> EventSampler {
        let mut sampler = EventSampler::new();
        sampler.cos_theta = cos_theta;
        sampler.elevation = [0.0, 0.0];
        sampler.altitude = [0.0, 0.0];
        sampler.energy = [1.0e9, 1.0e12];
        sampler.update().unwrap();
        sampler
    }

    fn output_text(writer: &RecordWriter) -> String {
        String::from_utf8(writer.contents().unwrap().to_vec()).unwrap()
    }

    #[test]
    fn test_run_requires_sampler() {
        let engines = test_engines();
        let mut context = Context::with_seed(1);
        let mut writer = RecordWriter::memory();
        assert!(context.run_with_writer(&engines, 1, &mut writer).is_err());
    }

    #[test]
    fn test_run_rejects_stale_sampler() {
        let engines = test_engines();
        let mut context = Context::with_seed(1);
        let mut sampler = grammage_sampler([1.0, 1.0]);
        sampler.energy[0] = 2.0e9; // silent edit after update
        context.sampler = Some(sampler);
        context.grammage = true;
        context.forward = true;

        let mut writer = RecordWriter::memory();
        let result = context.run_with_writer(&engines, 1, &mut writer);
        assert!(result.is_err());
        // Nothing was emitted.
        assert!(writer.contents().unwrap().is_empty());
    }

    #[test]
    fn test_run_rejects_inconsistent_targets() {
        let engines = test_engines();

        // Decay mode with no tau target.
        let mut context = Context::with_seed(1);
        let mut sampler = grammage_sampler([0.0, 1.0]);
        sampler.weight[ParticleKind::NuTau.index()] = 1.0;
        sampler.update().unwrap();
        context.sampler = Some(sampler.clone());
        context.forward = true;
        let mut writer = RecordWriter::memory();
        assert!(context.run_with_writer(&engines, 1, &mut writer).is_err());

        // No particle at all in flux mode.
        let mut context = Context::with_seed(1);
        let empty = grammage_sampler([0.0, 1.0]);
        context.sampler = Some(empty);
        context.decay = false;
        context.forward = true;
        let mut writer = RecordWriter::memory();
        assert!(context.run_with_writer(&engines, 1, &mut writer).is_err());
    }

    #[test]
    fn test_grammage_straight_down() {
        // A vertical chord from the top of the atmosphere: the Earth
        // diameter integral of the PEM profile is about 1.1e11 kg/m².
        let engines = test_engines();
        let mut context = Context::with_seed(2);
        context.forward = true;
        context.grammage = true;
        context.sampler = Some(grammage_sampler([1.0, 1.0]));

        let mut writer = RecordWriter::memory();
        context.run_with_writer(&engines, 5, &mut writer).unwrap();
        let out = output_text(&writer);
        let lines: Vec<&str> = out.lines().collect();

        // Header plus exactly one record for a degenerate window.
        assert_eq!(lines.len(), 3);
        let fields: Vec<&str> = lines[2].split_whitespace().collect();
        assert_eq!(fields[0], "1.00000E+00");
        let grammage: f64 = fields[1].parse().unwrap();
        assert!(grammage > 1.0e11 && grammage < 1.2e11, "X = {grammage}");
    }

    #[test]
    fn test_grammage_grid() {
        let engines = test_engines();
        let mut context = Context::with_seed(3);
        context.forward = true;
        context.grammage = true;
        context.sampler = Some(grammage_sampler([0.15, 0.25]));

        let mut writer = RecordWriter::memory();
        context.run_with_writer(&engines, 11, &mut writer).unwrap();
        let out = output_text(&writer);
        let records: Vec<&str> = out.lines().skip(2).collect();
        assert_eq!(records.len(), 11);

        let angles: Vec<f64> = records
            .iter()
            .map(|line| line.split_whitespace().next().unwrap().parse().unwrap())
            .collect();
        assert!((angles[0] - 0.15).abs() < 1e-6);
        assert!((angles[10] - 0.25).abs() < 1e-6);
        for pair in angles.windows(2) {
            assert!((pair[1] - pair[0] - 0.01).abs() < 1e-6);
        }

        // Shallower trajectories see more matter.
        let depths: Vec<f64> = records
            .iter()
            .map(|line| line.split_whitespace().nth(1).unwrap().parse().unwrap())
            .collect();
        assert!(depths[0] > depths[10]);
    }

    #[test]
    fn test_grammage_rejects_single_bin_over_window() {
        let engines = test_engines();
        let mut context = Context::with_seed(3);
        context.forward = true;
        context.grammage = true;
        context.sampler = Some(grammage_sampler([0.1, 0.2]));

        let mut writer = RecordWriter::memory();
        assert!(context.run_with_writer(&engines, 1, &mut writer).is_err());
    }

    #[test]
    fn test_deterministic_replay() {
        let engines = test_engines();
        let state = *MersenneTwister::from_seed(99).state();

        let run = |state: [u32; MT_PERIOD]| {
            let mut context = Context::with_rng_state(state);
            context.forward = true;
            context.decay = false;
            let mut sampler = EventSampler::new();
            sampler.cos_theta = [0.1, 0.3];
            sampler.altitude = [1.0e4, 1.0e4];
            sampler.energy = [1.0e8, 1.0e12];
            sampler.weight[ParticleKind::NuTau.index()] = 1.0;
            sampler.update().unwrap();
            context.sampler = Some(sampler);

            let mut writer = RecordWriter::memory();
            context.run_with_writer(&engines, 10, &mut writer).unwrap();
            output_text(&writer)
        };

        assert_eq!(run(state), run(state));
    }

    #[test]
    fn test_backward_grammage_elevation_column() {
        let engines = test_engines();
        let mut context = Context::with_seed(5);
        context.forward = false;
        context.grammage = true;
        let mut sampler = EventSampler::new();
        sampler.elevation = [1.0, 5.0];
        sampler.altitude = [0.0, 0.0];
        sampler.energy = [1.0e9, 1.0e12];
        sampler.update().unwrap();
        context.sampler = Some(sampler);

        let mut writer = RecordWriter::memory();
        context.run_with_writer(&engines, 5, &mut writer).unwrap();
        let out = output_text(&writer);
        let records: Vec<&str> = out.lines().skip(2).collect();
        assert_eq!(records.len(), 5);

        // Elevations on an even grid between the bounds.
        let elevations: Vec<f64> = records
            .iter()
            .map(|line| line.split_whitespace().next().unwrap().parse().unwrap())
            .collect();
        assert!((elevations[0] - 1.0).abs() < 1e-3);
        assert!((elevations[4] - 5.0).abs() < 1e-3);
    }
}
