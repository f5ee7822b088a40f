//! # Forward Transport
//!
//! Recursive forward Monte-Carlo: propagate a neutrino, transport any tau
//! it produces, decay the tau and recurse on the neutrino daughters.

use super::{engine_env, transportable, Transport, EPS};
use crate::constants::*;
use crate::engines::{longitudinal_polarisation, TransportEvent};
use crate::error::Result;
use crate::geometry::FIRST_AIR_SHELL;
use crate::types::{ParticleState, Vec3};

/// Build a daughter neutrino state from a decay product of `tau`
fn daughter_neutrino(
    longitudinal: bool,
    entry_direction: Vec3,
    tau: &ParticleState,
    pid: i32,
    momentum: Vec3,
) -> ParticleState {
    let energy = momentum.mag();
    let direction = if longitudinal {
        entry_direction
    } else {
        momentum * (1.0 / energy)
    };
    let mut neutrino = ParticleState::neutrino(pid, energy, tau.position, direction, tau.weight);
    neutrino.distance = tau.distance;
    neutrino.grammage = tau.grammage;
    neutrino
}

/// Forward-transport a neutrino and its cascade
///
/// `ancestor` is a copy of the user primary, logged lazily through the
/// primary-dump latch so that at most one ancestor line precedes all the
/// records of this event.
pub fn transport_forward(
    t: &mut Transport,
    neutrino: &mut ParticleState,
    event_id: u64,
    generation: u32,
    ancestor: &ParticleState,
) -> Result<()> {
    if !transportable(neutrino.pid) {
        return Ok(());
    }
    if generation > MAX_GENERATION {
        log::debug!("event {event_id}: generation cap reached, dropping track");
        return Ok(());
    }

    // Entry direction, restored after every step in longitudinal mode.
    let entry_direction = neutrino.direction;

    loop {
        let mut product = ParticleState::neutrino(0, 0.0, Vec3::zero(), Vec3::zero(), 0.0);
        let event = {
            let mut env = engine_env(t.earth, t.rng, &t.settings, false, 0.0, 0.0);
            t.engines
                .neutrino
                .transport(&mut env, neutrino, Some(&mut product))?
        };

        if neutrino.energy <= t.settings.energy_cut + EPS {
            break;
        }
        if !neutrino.alive() {
            log::debug!("event {event_id}: dead track dropped");
            break;
        }
        if t.settings.flux_neutrino && event == TransportEvent::Exit && neutrino.has_crossed == 1 {
            neutrino.cross_count += 1;
            if neutrino.cross_count == 2 {
                // Second crossing of the detection sphere: this neutrino
                // contributes to the flux.
                t.dump_primary(event_id, ancestor)?;
                t.writer.neutrino(generation, neutrino)?;
                break;
            }
            // First crossing: re-arm and keep going.
            neutrino.is_inside = -1;
            neutrino.has_crossed = 0;
            continue;
        }
        if event == TransportEvent::Exit {
            break;
        }
        if t.settings.longitudinal {
            neutrino.direction = entry_direction;
            product.direction = entry_direction;
        }
        if neutrino.pid.abs() == PID_TAU {
            // The engine left the tau in the main slot; swap so the tau is
            // always the product.
            std::mem::swap(neutrino, &mut product);
        }

        if product.pid.abs() == PID_TAU {
            transport_tau(t, &product, event_id, generation, ancestor, entry_direction)?;
        }

        if !transportable(neutrino.pid) {
            break;
        }
    }
    Ok(())
}

/// Transport a freshly produced tau, decay it and recurse on the neutrino
/// daughters
fn transport_tau(
    t: &mut Transport,
    product: &ParticleState,
    event_id: u64,
    generation: u32,
    ancestor: &ParticleState,
    entry_direction: Vec3,
) -> Result<()> {
    // Build the charged-lepton state from the neutrino-engine product.
    let kinetic = product.energy - t.tau_mass;
    let mut tau = ParticleState::tau(
        product.pid,
        kinetic,
        product.position,
        product.direction,
        product.weight,
    );
    tau.distance = product.distance;
    tau.grammage = product.grammage;
    tau.is_inside = -1;
    tau.has_crossed = if t.settings.flux_neutrino { -1 } else { 0 };
    tau.cross_count = 0;

    // Snapshot at production, then run the lepton engine to completion.
    let tau_production = tau.clone();
    {
        let kinetic_limit = (t.settings.energy_cut - t.tau_mass).max(0.0);
        let mut env = engine_env(t.earth, t.rng, &t.settings, false, 0.0, kinetic_limit);
        t.engines.lepton.transport(&mut env, &mut tau)?;
    }

    if !tau.decayed {
        if tau.has_crossed == 1 {
            // Undecayed tau through the detection sphere: tau flux record.
            t.dump_primary(event_id, ancestor)?;
            t.writer
                .tau(generation, product.pid, &tau_production, &tau, t.tau_mass)?;
        }
        return Ok(());
    }

    // Tau decay; a run of failures fizzles the sampling and the event
    // simply continues without daughters.
    let momentum = tau.direction * tau.tau_momentum(t.tau_mass);
    let polarisation = longitudinal_polarisation(momentum);
    let mut products = None;
    for _ in 0..DECAY_TRIALS {
        match t
            .engines
            .decay
            .decay(t.rng, product.pid, momentum, polarisation)
        {
            Ok(daughters) => {
                products = Some(daughters);
                break;
            }
            Err(error) => log::debug!("event {event_id}: decay trial failed: {error}"),
        }
    }

    let mut nu_e: Option<ParticleState> = None;
    let mut nu_t: Option<ParticleState> = None;
    let mut nprod = 0;
    for daughter in products.unwrap_or_default() {
        if daughter.pid.abs() == PID_NU_TAU {
            nu_t = Some(daughter_neutrino(
                t.settings.longitudinal,
                entry_direction,
                &tau,
                daughter.pid,
                daughter.momentum,
            ));
            continue;
        }
        if daughter.pid == -PID_NU_E {
            nu_e = Some(daughter_neutrino(
                t.settings.longitudinal,
                entry_direction,
                &tau,
                daughter.pid,
                daughter.momentum,
            ));
            continue;
        }
        if !t.settings.decay
            || daughter.pid == PID_NU_E
            || daughter.pid.abs() == PID_MUON
            || daughter.pid.abs() == PID_NU_MU
        {
            continue;
        }
        // Visible daughters are logged only for decays in air.
        if t.settings.decay_in_air_only && tau.medium < FIRST_AIR_SHELL {
            continue;
        }
        if nprod == 0 {
            t.dump_primary(event_id, ancestor)?;
            t.writer
                .tau(generation, product.pid, &tau_production, &tau, t.tau_mass)?;
        }
        t.writer.decay_product(daughter.pid, daughter.momentum)?;
        nprod += 1;
    }

    // Recurse on the surviving neutrino daughters.
    let generation = generation + 1;
    for daughter in [nu_e, nu_t] {
        let Some(mut neutrino) = daughter else {
            continue;
        };
        if t.settings.flux_neutrino {
            neutrino.is_inside = -1;
            neutrino.has_crossed = 0;
            // Daughters born below the detection altitude have already
            // "crossed" once on the way in.
            neutrino.cross_count =
                if tau.r <= EARTH_RADIUS + t.settings.flux_altitude + EPS {
                    1
                } else {
                    0
                };
        } else {
            neutrino.has_crossed = -1;
        }
        transport_forward(t, &mut neutrino, event_id, generation, ancestor)?;
    }
    Ok(())
}
