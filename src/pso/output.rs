//! Result files written at the end of a calibration.
//!
//! - best-fit table: `# fitness` header line, then `name  value` per parameter
//! - trace: one tab-separated row per iteration
//! - particle history: for each iteration, one row per particle holding its
//!   position followed by its fitness; then a blank line, the best position
//!   and the best fitness

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use crate::error::{CalibError, Result};
use crate::parameters::ParameterSpace;
use crate::pso::engine::{IterationRecord, ParticleRound, PsoResult};

fn write_file(path: &Path, contents: &str) -> Result<()> {
    fs::write(path, contents).map_err(|e| CalibError::io("writing", path, e))
}

/// Render the best position as a parameter table
pub fn best_fit_table(space: &ParameterSpace, result: &PsoResult) -> Result<String> {
    let mut out = format!(
        "# best fitness {:e} ({}, {} iterations)\n",
        result.best_fitness, result.termination, result.iterations
    );
    out.push_str(&space.to_table(&result.best_position)?);
    Ok(out)
}

pub fn write_best_fit(path: &Path, space: &ParameterSpace, result: &PsoResult) -> Result<()> {
    write_file(path, &best_fit_table(space, result)?)
}

/// Render the per-iteration trace; `mean_fitness` is `nan` when every evaluation failed
pub fn trace_table(history: &[IterationRecord]) -> String {
    let mut out = String::from("# iteration\tbest_fitness\tmean_fitness\tevaluated\tfailed\n");
    for record in history {
        let _ = writeln!(
            out,
            "{}\t{:e}\t{:e}\t{}\t{}",
            record.iteration,
            record.best_fitness,
            record.mean_fitness.unwrap_or(f64::NAN),
            record.evaluated,
            record.failed
        );
    }
    out
}

pub fn write_trace(path: &Path, history: &[IterationRecord]) -> Result<()> {
    write_file(path, &trace_table(history))
}

fn push_row<'a>(out: &mut String, values: impl IntoIterator<Item = &'a f64>) {
    let row: Vec<String> = values.into_iter().map(|v| format!("{:e}", v)).collect();
    out.push_str(&row.join("\t"));
    out.push('\n');
}

/// Render every recorded particle position and fitness
pub fn particle_history_table(rounds: &[ParticleRound], result: &PsoResult) -> String {
    let mut out = String::new();
    for round in rounds {
        for (position, fitness) in round.positions.iter().zip(&round.fitness) {
            push_row(&mut out, position.iter().chain(std::iter::once(fitness)));
        }
    }
    out.push('\n');
    push_row(&mut out, result.best_position.iter());
    push_row(&mut out, std::iter::once(&result.best_fitness));
    out
}

pub fn write_particle_history(path: &Path, rounds: &[ParticleRound], result: &PsoResult) -> Result<()> {
    write_file(path, &particle_history_table(rounds, result))
}
