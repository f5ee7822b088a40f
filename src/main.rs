//! # TAUSIM-RS Command Line
//!
//! Driver for the transport library: builds an engine set and a context
//! from the command line, then runs the requested mode.
//!
//! ## Usage
//!
//! ```bash
//! # Forward decaying-tau sampling, one event, dry Earth
//! tausim 16 --taus 1 --cos-theta 0.2 --energy 1e10 --pem-no-sea
//!
//! # Backward tau flux at sea level
//! tausim 16 --taus 1000 --flux --backward \
//!     --elevation-min 1 --elevation-max 5 --energy-min 1e7 --energy-max 1e9
//!
//! # Forward grammage scan over 11 directions
//! tausim 16 --grammage 11 --cos-theta-min 0.15 --cos-theta-max 0.25
//! ```

use clap::Parser;
use std::path::PathBuf;
use std::process;
use tausim_rs::{
    Context, EngineConfig, Engines, EventSampler, ParticleKind, Result, TausimError,
    PID_NU_E, PID_NU_TAU,
};

/// Monte-Carlo sampling of decaying taus from ultra-high-energy neutrinos
#[derive(Parser)]
#[command(name = "tausim")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Sample decaying taus from ultra-high-energy neutrinos")]
struct Cli {
    /// Primary neutrino PDG code: -12, 16 or -16
    pid: i32,

    /// Fix cos(theta) of forward primaries to a single value
    #[arg(long, value_name = "COS")]
    cos_theta: Option<f64>,
    /// Lower cos(theta) bound [0]
    #[arg(long, value_name = "COS")]
    cos_theta_min: Option<f64>,
    /// Upper cos(theta) bound [1]
    #[arg(long, value_name = "COS")]
    cos_theta_max: Option<f64>,

    /// Fix the elevation angle of backward primaries (deg)
    #[arg(long, value_name = "DEG")]
    elevation: Option<f64>,
    /// Lower elevation bound (deg) [-10]
    #[arg(long, value_name = "DEG")]
    elevation_min: Option<f64>,
    /// Upper elevation bound (deg) [10]
    #[arg(long, value_name = "DEG")]
    elevation_max: Option<f64>,

    /// Fix the detection altitude (m)
    #[arg(long, value_name = "M")]
    altitude: Option<f64>,
    /// Lower altitude bound (m) [0]
    #[arg(long, value_name = "M")]
    altitude_min: Option<f64>,
    /// Upper altitude bound (m) [1e5]
    #[arg(long, value_name = "M")]
    altitude_max: Option<f64>,

    /// Fix the primary energy (GeV)
    #[arg(long, value_name = "GEV")]
    energy: Option<f64>,
    /// Lower energy bound (GeV) [1e6]
    #[arg(long, value_name = "GEV")]
    energy_min: Option<f64>,
    /// Upper energy bound (GeV) [1e12]
    #[arg(long, value_name = "GEV")]
    energy_max: Option<f64>,
    /// Forward kill threshold (GeV); defaults to the lower energy bound
    #[arg(long, value_name = "GEV")]
    energy_cut: Option<f64>,
    /// Draw primary energies with unit weight (analog sampling)
    #[arg(long)]
    energy_analog: bool,

    /// Replace the sea layer with standard rock
    #[arg(long)]
    pem_no_sea: bool,

    /// Sample N tau events (decays, or a tau flux with --flux)
    #[arg(long, value_name = "N")]
    taus: Option<u64>,
    /// Sample fluxes at the detection altitude instead of decays
    #[arg(long)]
    flux: bool,
    /// Column-density scan over N directions
    #[arg(long, value_name = "N")]
    grammage: Option<u64>,
    /// Number of events for neutrino-flux sampling [10000]
    #[arg(long, value_name = "N", default_value_t = 10000)]
    events: u64,

    /// Run the backward Monte-Carlo
    #[arg(long)]
    backward: bool,
    /// Freeze directions to the primary's (longitudinal approximation)
    #[arg(long)]
    longitudinal: bool,

    /// Append to the output file instead of truncating it
    #[arg(long)]
    append: bool,
    /// Output file; stdout when omitted
    #[arg(long, value_name = "PATH")]
    output_file: Option<PathBuf>,
    /// Parton distribution file for the neutrino engine
    #[arg(long, value_name = "PATH")]
    pdf_file: Option<PathBuf>,
}

/// Resolve a (fixed, min, max) flag triple into a window
fn window(fixed: Option<f64>, min: Option<f64>, max: Option<f64>, default: [f64; 2]) -> [f64; 2] {
    match fixed {
        Some(value) => [value, value],
        None => [min.unwrap_or(default[0]), max.unwrap_or(default[1])],
    }
}

fn run(cli: Cli) -> Result<u64> {
    if ![-PID_NU_E, PID_NU_TAU, -PID_NU_TAU].contains(&cli.pid) {
        return Err(TausimError::config(format!(
            "invalid projectile {}; expected -12, 16 or -16",
            cli.pid
        )));
    }

    let engines = Engines::initialise(&EngineConfig {
        pdf_file: cli.pdf_file.clone(),
        material_cache: PathBuf::from("materials.b"),
    })?;

    let mut sampler = EventSampler::new();
    sampler.cos_theta = window(cli.cos_theta, cli.cos_theta_min, cli.cos_theta_max, [0.0, 1.0]);
    sampler.elevation = window(cli.elevation, cli.elevation_min, cli.elevation_max, [-10.0, 10.0]);
    sampler.altitude = window(cli.altitude, cli.altitude_min, cli.altitude_max, [0.0, 1.0e5]);
    sampler.energy = window(cli.energy, cli.energy_min, cli.energy_max, [1.0e6, 1.0e12]);

    let mut context = Context::new()?;
    context.projectile = Some(cli.pid);
    context.forward = !cli.backward;
    context.longitudinal = cli.longitudinal;
    context.output = cli.output_file.clone();
    context.append = cli.append;
    context.energy_analog = cli.energy_analog;
    context.energy_cut = cli.energy_cut;
    if cli.pem_no_sea {
        context.pem_dry();
    }

    // Resolve the run mode and the target weights.
    let events = if let Some(bins) = cli.grammage {
        context.grammage = true;
        context.decay = false;
        bins
    } else if let Some(taus) = cli.taus {
        context.decay = !cli.flux;
        // A tau-neutrino primary makes a tau of the same charge sign; the
        // Glashow channel of an electron antineutrino makes a tau-minus.
        let target = if cli.pid > 0 || cli.pid == -PID_NU_E {
            ParticleKind::Tau
        } else {
            ParticleKind::TauBar
        };
        sampler.weight[target.index()] = 1.0;
        taus
    } else {
        context.decay = false;
        let kind = ParticleKind::from_pdg(cli.pid).ok_or_else(|| {
            TausimError::config(format!("no sampler entry for pid {}", cli.pid))
        })?;
        sampler.weight[kind.index()] = 1.0;
        cli.events
    };

    sampler.update()?;
    context.sampler = Some(sampler);
    context.run(&engines, events)?;
    Ok(events)
}

fn main() {
    let cli = Cli::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match run(cli) {
        Ok(events) => log::info!("done with {events} event(s)"),
        Err(error) => {
            eprintln!("tausim: {error}");
            process::exit(1);
        }
    }
}
