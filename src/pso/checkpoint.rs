//! Serializable snapshots of a running optimization.
//!
//! A snapshot is only ever taken between iterations, so it never contains a
//! partially evaluated swarm. It stores the exact random number generator
//! state, which makes a resumed run follow the same trajectory as an
//! uninterrupted one.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;

use crate::error::{CalibError, Result};
use crate::pso::engine::{IterationRecord, ParticleRound, TerminationReason};
use crate::pso::swarm::Swarm;

/// Version of the snapshot layout
pub const FORMAT_VERSION: u32 = 1;

/// Position in the ChaCha8 keystream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RngState {
    pub seed: [u8; 32],
    pub stream: u64,
    // The 128-bit word position is split to stay within JSON integers
    pub word_pos_hi: u64,
    pub word_pos_lo: u64,
}

impl RngState {
    pub fn capture(rng: &ChaCha8Rng) -> Self {
        let word_pos = rng.get_word_pos();
        Self {
            seed: rng.get_seed(),
            stream: rng.get_stream(),
            word_pos_hi: (word_pos >> 64) as u64,
            word_pos_lo: word_pos as u64,
        }
    }

    pub fn restore(&self) -> ChaCha8Rng {
        let mut rng = ChaCha8Rng::from_seed(self.seed);
        rng.set_stream(self.stream);
        rng.set_word_pos(((self.word_pos_hi as u128) << 64) | self.word_pos_lo as u128);
        rng
    }
}

/// Everything needed to continue an optimization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationState {
    pub format_version: u32,
    pub parameter_names: Vec<String>,
    /// Completed iterations
    pub iteration: usize,
    pub evaluations: usize,
    pub failed_evaluations: usize,
    pub swarm: Swarm,
    pub history: Vec<IterationRecord>,
    #[serde(default)]
    pub particle_history: Vec<ParticleRound>,
    /// Set once the optimization has stopped
    pub termination: Option<TerminationReason>,
    pub rng: RngState,
}

impl OptimizationState {
    /// Write the snapshot so that `path` always holds a complete state.
    ///
    /// The JSON goes to a temporary file in the same directory, which then
    /// replaces `path` in a single rename.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir).map_err(|e| CalibError::io("creating checkpoint directory", dir, e))?;

        let json = serde_json::to_vec_pretty(self)?;
        let mut file = NamedTempFile::new_in(dir).map_err(|e| CalibError::io("creating checkpoint in", dir, e))?;
        file.write_all(&json)
            .and_then(|_| file.as_file().sync_all())
            .map_err(|e| CalibError::io("writing checkpoint", file.path(), e))?;
        file.persist(path)
            .map_err(|e| CalibError::io("replacing checkpoint", path, e.error))?;
        Ok(())
    }

    /// Read a snapshot written by [`OptimizationState::save`]
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| CalibError::io("reading checkpoint", path, e))?;
        let state: Self = serde_json::from_str(&text)?;
        if state.format_version != FORMAT_VERSION {
            return Err(CalibError::InvalidState(format!(
                "checkpoint {} has format version {}, expected {}",
                path.display(),
                state.format_version,
                FORMAT_VERSION
            )));
        }
        Ok(state)
    }
}
