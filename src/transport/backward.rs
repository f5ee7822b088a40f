//! # Backward Transport
//!
//! Reverse Monte-Carlo: run a tau backward with biased decay sampling
//! until its production vertex, backward-propagate the parent neutrino to
//! the primary, and optionally un-decay through earlier tau generations.
//!
//! Weights follow the backward convention: every sampling choice that
//! deviates from the forward law is compensated so that the emitted
//! records estimate the forward flux.

use super::{engine_env, Transport, EPS};
use crate::constants::*;
use crate::engines::TransportEvent;
use crate::error::Result;
use crate::geometry::FIRST_AIR_SHELL;
use crate::types::ParticleState;

/// Guard against log(0) on a closed-interval uniform draw
const MIN_U: f64 = 1e-300;

/// Backward-transport one state to the primary vertex
///
/// `current` is either a tau at its decay point (particle targets) or a
/// neutrino at the detection point (flux targets). `final_state` snapshots
/// the generation-1 entry; `tau_at_production` snapshots the last tau
/// generated backward. Both out-slots are filled along the way and read at
/// emission time.
pub fn transport_backward(
    t: &mut Transport,
    current: &mut ParticleState,
    event_id: u64,
    generation: u32,
    final_state: &mut Option<ParticleState>,
    tau_at_production: &mut Option<ParticleState>,
) -> Result<()> {
    if generation == 1 {
        *final_state = Some(current.clone());
    }
    if generation > MAX_GENERATION {
        log::debug!("event {event_id}: generation cap reached, dropping track");
        return Ok(());
    }

    let entry_direction = current.direction;
    let mut state;

    if current.is_tau() {
        let tau = current;

        // Decay-probability weight of the final vertex.
        if t.settings.decay || generation > 1 {
            let momentum = tau.tau_momentum(t.tau_mass);
            tau.weight *= t.tau_mass / (t.tau_ctau * momentum);
        }

        // Backward propagate the tau under a random grammage horizon.
        let mut x0;
        loop {
            x0 = tau.grammage;
            let horizon = x0 - BACKWARD_HORIZON * t.rng.uniform01().max(MIN_U).ln();
            tau.decayed = false;
            {
                let kinetic_limit = (t.settings.energy_cut - t.tau_mass).max(0.0);
                let mut env =
                    engine_env(t.earth, t.rng, &t.settings, true, horizon, kinetic_limit);
                t.engines.lepton.transport(&mut env, tau)?;
            }
            if (!tau.decayed && tau.grammage < horizon - EPS)
                || (tau.energy + t.tau_mass >= t.settings.energy_cut - EPS)
                || tau.weight <= 0.0
            {
                return Ok(());
            }
            if generation > 1 {
                break;
            }

            // The vertex stands if the tau would not emerge from the Earth
            // along its line of flight.
            let b = -tau.position.dot(&tau.direction);
            let d2 = b * b + EARTH_RADIUS * EARTH_RADIUS - tau.r * tau.r;
            if d2 <= 0.0 || d2.sqrt() > -b {
                break;
            }
            // And if the proposed vertex is not in air.
            if tau.medium < FIRST_AIR_SHELL || tau.density <= 0.0 {
                break;
            }

            // Upgoing and in air: recycle by biasing the decay probability
            // at the vertex with a forced-decay term.
            let momentum = tau.tau_momentum(t.tau_mass);
            let decay_length = t.tau_ctau * momentum / t.tau_mass;
            let horizon_length = BACKWARD_HORIZON / tau.density;
            let p_decay = horizon_length / (horizon_length + decay_length);
            let p_continue = decay_length / (horizon_length + decay_length);
            if p_decay <= 0.0 || p_continue <= 0.0 {
                break;
            }
            if t.rng.uniform01() < FORCED_DECAY_PROBABILITY {
                tau.weight *= p_decay / FORCED_DECAY_PROBABILITY;
                break;
            }
            tau.weight *= p_continue / (1.0 - FORCED_DECAY_PROBABILITY);
        }

        if generation == 1 {
            *tau_at_production = Some(tau.clone());
        }

        // Backward-generate the neutrino production vertex.
        let pid = if tau.charge() < 0.0 { PID_TAU } else { -PID_TAU };
        let mut vertex_state = ParticleState::neutrino(
            pid,
            tau.energy + t.tau_mass,
            tau.position,
            tau.direction,
            tau.weight,
        );
        vertex_state.distance = tau.distance;
        vertex_state.grammage = tau.grammage;
        vertex_state.disable_crossing();

        let material = {
            let mut env = engine_env(t.earth, t.rng, &t.settings, true, 0.0, 0.0);
            let (material, _) = env.medium(&mut vertex_state);
            if material.is_some() {
                env.locals(&mut vertex_state);
            }
            material
        };
        let Some(material) = material else {
            return Ok(());
        };
        {
            let mut env = engine_env(t.earth, t.rng, &t.settings, true, 0.0, 0.0);
            t.engines.neutrino.vertex(&mut env, &mut vertex_state)?;
        }

        // Effective backward weight recovering the flux convention:
        // λB·λD / ((λB + λD)·λP·p₀), with λP the neutrino interaction
        // length and p₀ the survival over the consumed horizon.
        let cross_section = t.engines.neutrino.cross_section(
            vertex_state.pid,
            vertex_state.energy,
            material.z(),
            material.a(),
        )?;
        let density = vertex_state.density;
        let interaction_length =
            1.0e-3 * material.a() / (cross_section * PHYS_NA * density);
        let momentum = tau.tau_momentum(t.tau_mass);
        let decay_length = t.tau_ctau * momentum / t.tau_mass;
        let horizon_length = BACKWARD_HORIZON / density;
        let survival = (-(tau.grammage - x0) / BACKWARD_HORIZON).exp();
        vertex_state.weight *= horizon_length * decay_length
            / ((horizon_length + decay_length) * interaction_length * survival);

        if t.settings.longitudinal {
            vertex_state.direction = entry_direction;
        }
        state = vertex_state;
    } else {
        state = current.clone();
    }

    // Backward propagate the neutrino up to the exit or the energy ceiling.
    let mut event = TransportEvent::None;
    while event != TransportEvent::Exit && state.energy < t.settings.energy_cut - EPS {
        event = {
            let mut env = engine_env(t.earth, t.rng, &t.settings, true, 0.0, 0.0);
            t.engines.neutrino.transport(&mut env, &mut state, None)?
        };
        if state.weight <= 0.0 || !state.alive() {
            return Ok(());
        }
        if t.settings.longitudinal {
            state.direction = entry_direction;
        }

        if event == TransportEvent::DecayTau {
            // The neutrino was backward-attributed to a tau decay:
            // un-decay it and recurse on the tau parent.
            let momentum = state.direction * state.energy;
            let mut undecay = None;
            for _ in 0..DECAY_TRIALS {
                match t
                    .engines
                    .decay
                    .undecay(t.rng, state.pid, momentum, DECAY_BIAS)
                {
                    Ok(result) => {
                        undecay = Some(result);
                        break;
                    }
                    Err(error) => {
                        log::debug!("event {event_id}: un-decay trial failed: {error}")
                    }
                }
            }
            let Some((products, undecay_weight)) = undecay else {
                return Ok(());
            };
            let Some(parent) = products.first() else {
                return Ok(());
            };
            if parent.pid.abs() != PID_TAU {
                return Ok(());
            }
            let p2 = parent.momentum.mag_squared();
            let parent_energy = (p2 + t.tau_mass * t.tau_mass).sqrt();
            if parent_energy >= t.settings.energy_cut - EPS {
                return Ok(());
            }

            let mut tau = ParticleState::tau(
                parent.pid,
                parent_energy - t.tau_mass,
                state.position,
                if t.settings.longitudinal {
                    entry_direction
                } else {
                    parent.momentum * (1.0 / p2.sqrt())
                },
                state.weight * undecay_weight * state.energy * state.energy / p2,
            );
            tau.distance = state.distance;
            tau.grammage = state.grammage;
            tau.disable_crossing();

            return transport_backward(
                t,
                &mut tau,
                event_id,
                generation + 1,
                final_state,
                tau_at_production,
            );
        }
    }
    if event != TransportEvent::Exit {
        return Ok(());
    }

    // The backward-generated primary must match the requested kind.
    let Some(final_ref) = final_state.as_ref() else {
        return Ok(());
    };
    let pid0 = if final_ref.is_tau() {
        if final_ref.charge() < 0.0 {
            PID_NU_TAU
        } else {
            -PID_NU_TAU
        }
    } else {
        final_ref.pid
    };
    if state.pid != pid0 {
        return Ok(());
    }

    if !t.settings.decay {
        // Flux mode: primary line plus the final particle line.
        t.writer.ancestor(event_id, &state)?;
        if t.settings.flux_neutrino {
            t.writer.neutrino(generation, final_ref)?;
        } else {
            let pid = if final_ref.charge() < 0.0 {
                PID_TAU
            } else {
                -PID_TAU
            };
            let Some(production) = tau_at_production.as_ref() else {
                return Ok(());
            };
            t.writer
                .tau(generation, pid, production, final_ref, t.tau_mass)?;
        }
        return Ok(());
    }

    // Decay mode: forward-decay the final tau and emit the full record.
    let final_tau = final_ref.clone();
    let pid = if final_tau.charge() < 0.0 {
        PID_TAU
    } else {
        -PID_TAU
    };
    let momentum = final_tau.direction * final_tau.tau_momentum(t.tau_mass);
    let mut products = None;
    for _ in 0..DECAY_TRIALS {
        match t
            .engines
            .decay
            .decay(t.rng, pid, momentum, final_tau.direction)
        {
            Ok(daughters) => {
                products = Some(daughters);
                break;
            }
            Err(error) => log::debug!("event {event_id}: decay trial failed: {error}"),
        }
    }

    let mut nprod = 0;
    for daughter in products.unwrap_or_default() {
        if matches!(daughter.pid.abs(), PID_NU_E | PID_MUON | PID_NU_MU | PID_NU_TAU) {
            continue;
        }
        if nprod == 0 {
            t.writer.ancestor(event_id, &state)?;
            let Some(production) = tau_at_production.as_ref() else {
                return Ok(());
            };
            t.writer
                .tau(generation, pid, production, &final_tau, t.tau_mass)?;
        }
        t.writer.decay_product(daughter.pid, daughter.momentum)?;
        nprod += 1;
    }
    Ok(())
}
