//! # Output Module
//!
//! Result classifier and writer: turns transport outcomes into the
//! whitespace-aligned text records of the output stream.
//!
//! Three record shapes exist and each is written atomically:
//!
//! - **decay**: one ancestor line, a tau production/decay pair, then the
//!   daughter lines;
//! - **flux**: one ancestor line and one particle line;
//! - **grammage**: one (angle, column depth) line per primary.
//!
//! The exactly-once emission of the ancestor line for multi-record events
//! is the caller's job (the primary-dump latch lives in the transport).

use crate::types::{ParticleState, Vec3};
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

// ============================================================================
// NUMBER FORMATTING
// ============================================================================

/// Scientific notation with a 5-digit mantissa and a signed two-digit
/// exponent, e.g. `1.00000E+00`
fn sci(value: f64) -> String {
    if !value.is_finite() {
        return format!("{value}");
    }
    let raw = format!("{:.5E}", value);
    match raw.split_once('E') {
        Some((mantissa, exponent)) => {
            let exp: i32 = exponent.parse().unwrap_or(0);
            let sign = if exp < 0 { '-' } else { '+' };
            format!("{}E{}{:02}", mantissa, sign, exp.abs())
        }
        None => raw,
    }
}

// ============================================================================
// RECORD WRITER
// ============================================================================

/// Where the records go
enum Sink {
    Stdout,
    File(File),
    Memory(Vec<u8>),
}

/// Line-oriented record writer over stdout, a file or a memory buffer
pub struct RecordWriter {
    sink: Sink,
}

impl RecordWriter {
    /// Write to standard output
    pub fn stdout() -> Self {
        Self { sink: Sink::Stdout }
    }

    /// Write to a file, truncating or appending
    pub fn create(path: &Path, append: bool) -> io::Result<Self> {
        let file = if append {
            OpenOptions::new().create(true).append(true).open(path)?
        } else {
            File::create(path)?
        };
        Ok(Self {
            sink: Sink::File(file),
        })
    }

    /// Collect records in memory; used by the test suite
    pub fn memory() -> Self {
        Self {
            sink: Sink::Memory(Vec::new()),
        }
    }

    /// Contents of a memory sink
    pub fn contents(&self) -> Option<&[u8]> {
        match &self.sink {
            Sink::Memory(buffer) => Some(buffer),
            _ => None,
        }
    }

    fn emit(&mut self, record: &str) -> io::Result<()> {
        match &mut self.sink {
            Sink::Stdout => {
                let stdout = io::stdout();
                let mut lock = stdout.lock();
                lock.write_all(record.as_bytes())?;
                lock.flush()
            }
            Sink::File(file) => {
                file.write_all(record.as_bytes())?;
                file.flush()
            }
            Sink::Memory(buffer) => {
                buffer.extend_from_slice(record.as_bytes());
                Ok(())
            }
        }
    }

    // ------------------------------------------------------------------
    // Headers
    // ------------------------------------------------------------------

    /// Header of decay and flux runs
    pub fn header_decay(&mut self) -> io::Result<()> {
        self.emit(concat!(
            "    Event   PID    Energy             Direction or Momentum",
            "                         Position                     Weight\n",
            "                    (GeV)                 (1 or GeV/c)",
            "                                 (m)\n",
            "                                ux or Px     uy or Py    ",
            "uz or Pz         X             Y             Z\n",
        ))
    }

    /// Header of grammage scans
    pub fn header_grammage(&mut self, forward: bool) -> io::Result<()> {
        if forward {
            self.emit("  cos(theta)    Grammage\n                (kg/m^2)\n")
        } else {
            self.emit("   elevation    Grammage\n     (deg)      (kg/m^2)\n")
        }
    }

    // ------------------------------------------------------------------
    // Records
    // ------------------------------------------------------------------

    /// Ancestor line: the primary neutrino with its weight
    pub fn ancestor(&mut self, event_id: u64, state: &ParticleState) -> io::Result<()> {
        self.emit(&format!(
            "{:>10} {:>4} {:>12} {:>12} {:>12} {:>12} {:>13.3} {:>13.3} {:>13.3} {:>12}\n",
            event_id + 1,
            state.pid,
            sci(state.energy),
            sci(state.direction.x),
            sci(state.direction.y),
            sci(state.direction.z),
            state.position.x,
            state.position.y,
            state.position.z,
            sci(state.weight),
        ))
    }

    /// Tau pair: production point, then decay point on a continuation line
    pub fn tau(
        &mut self,
        generation: u32,
        pid: i32,
        production: &ParticleState,
        decay: &ParticleState,
        tau_mass: f64,
    ) -> io::Result<()> {
        self.emit(&format!(
            "{:>10} {:>4} {:>12} {:>12} {:>12} {:>12} {:>13.3} {:>13.3} {:>13.3}\n\
             {:>10} {:>4} {:>12} {:>12} {:>12} {:>12} {:>13.3} {:>13.3} {:>13.3}\n",
            generation,
            pid,
            sci(production.energy + tau_mass),
            sci(production.direction.x),
            sci(production.direction.y),
            sci(production.direction.z),
            production.position.x,
            production.position.y,
            production.position.z,
            "",
            "",
            sci(decay.energy + tau_mass),
            sci(decay.direction.x),
            sci(decay.direction.y),
            sci(decay.direction.z),
            decay.position.x,
            decay.position.y,
            decay.position.z,
        ))
    }

    /// Neutrino line: a primary or final neutrino state
    pub fn neutrino(&mut self, generation: u32, state: &ParticleState) -> io::Result<()> {
        self.emit(&format!(
            "{:>10} {:>4} {:>12} {:>12} {:>12} {:>12} {:>13.3} {:>13.3} {:>13.3}\n",
            generation,
            state.pid,
            sci(state.energy),
            sci(state.direction.x),
            sci(state.direction.y),
            sci(state.direction.z),
            state.position.x,
            state.position.y,
            state.position.z,
        ))
    }

    /// Decay daughter line: bare momentum
    pub fn decay_product(&mut self, pid: i32, momentum: Vec3) -> io::Result<()> {
        self.emit(&format!(
            "{:>10} {:>4} {:>12} {:>12} {:>12} {:>12}\n",
            "",
            pid,
            "",
            sci(momentum.x),
            sci(momentum.y),
            sci(momentum.z),
        ))
    }

    /// Grammage line: cos(θ) forward, elevation angle backward
    pub fn grammage(&mut self, forward: bool, cos_theta: f64, grammage: f64) -> io::Result<()> {
        if forward {
            self.emit(&format!("{:>12} {:>12}\n", sci(cos_theta), sci(grammage)))
        } else {
            let elevation = 90.0 - cos_theta.acos().to_degrees();
            self.emit(&format!("{:>12.5} {:>12}\n", elevation, sci(grammage)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::*;

    fn text(writer: &RecordWriter) -> String {
        String::from_utf8(writer.contents().unwrap().to_vec()).unwrap()
    }

    #[test]
    fn test_sci_format() {
        assert_eq!(sci(1.0), "1.00000E+00");
        assert_eq!(sci(0.0), "0.00000E+00");
        assert_eq!(sci(1e9), "1.00000E+09");
        assert_eq!(sci(-2.5e-3), "-2.50000E-03");
        assert_eq!(sci(6.33e6), "6.33000E+06");
    }

    #[test]
    fn test_grammage_record_layout() {
        let mut writer = RecordWriter::memory();
        writer.header_grammage(true).unwrap();
        writer.grammage(true, 1.0, 1.08e5).unwrap();
        let out = text(&writer);

        assert!(out.starts_with("  cos(theta)    Grammage\n"));
        assert!(out.ends_with(" 1.00000E+00  1.08000E+05\n"));
    }

    #[test]
    fn test_grammage_backward_uses_elevation() {
        let mut writer = RecordWriter::memory();
        // cos(θ) of a 3° elevation trajectory.
        let cos_theta = (87.0f64).to_radians().cos();
        writer.grammage(false, cos_theta, 2.0e7).unwrap();
        let out = text(&writer);
        assert!(out.contains("3.00000"));
        assert!(out.contains("2.00000E+07"));
    }

    #[test]
    fn test_ancestor_line_fields() {
        let mut writer = RecordWriter::memory();
        let state = ParticleState::neutrino(
            PID_NU_TAU,
            1e9,
            Vec3::new(0.0, 0.0, -EARTH_RADIUS),
            Vec3::new(0.0, 0.0, 1.0),
            1.0,
        );
        writer.ancestor(0, &state).unwrap();
        let out = text(&writer);
        let fields: Vec<&str> = out.split_whitespace().collect();

        assert_eq!(fields[0], "1"); // event ids are 1-based
        assert_eq!(fields[1], "16");
        assert_eq!(fields[2], "1.00000E+09");
        assert_eq!(fields[5], "1.00000E+00");
        assert_eq!(fields[9], "1.00000E+00");
        assert_eq!(fields.len(), 10);
    }

    #[test]
    fn test_tau_pair_continuation_line() {
        let mut writer = RecordWriter::memory();
        let production = ParticleState::tau(
            PID_TAU,
            1e8,
            Vec3::new(0.0, 0.0, EARTH_RADIUS),
            Vec3::new(0.0, 0.0, 1.0),
            1.0,
        );
        let mut decay = production.clone();
        decay.energy = 5e7;
        decay.position.z += 1.0e4;

        writer.tau(1, PID_TAU, &production, &decay, TAU_MASS).unwrap();
        let out = text(&writer);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 2);

        // First line carries the generation and pid, the continuation line
        // is blank in those columns.
        assert!(lines[0].trim_start().starts_with("1"));
        assert!(lines[1].starts_with("          "));
        // Total energies include the rest mass.
        assert!(lines[0].contains(&sci(1e8 + TAU_MASS)));
        assert!(lines[1].contains(&sci(5e7 + TAU_MASS)));
    }

    #[test]
    fn test_decay_product_line() {
        let mut writer = RecordWriter::memory();
        writer
            .decay_product(-211, Vec3::new(1.0e7, 0.0, 2.0e7))
            .unwrap();
        let out = text(&writer);
        let fields: Vec<&str> = out.split_whitespace().collect();
        assert_eq!(fields, ["-211", "1.00000E+07", "0.00000E+00", "2.00000E+07"]);
    }
}
