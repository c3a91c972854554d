//! Tabulated state duration model
//!
//! Each line is `<state> <lp1> <lp2> ...` where `lpN` is the log-probability
//! of leaving the state after exactly N frames. Durations beyond the table
//! reuse the last entry. States without a line score zero.

use super::DurationModel;
use crate::error::ModelError;
use crate::network::StateId;
use std::io::BufRead;
use std::path::Path;

#[derive(Debug, Clone, Default)]
pub struct DurationTable {
    states: Vec<Vec<f32>>,
}

impl DurationTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, state: StateId, log_probs: Vec<f32>) {
        let idx = state as usize;
        if self.states.len() <= idx {
            self.states.resize(idx + 1, Vec::new());
        }
        self.states[idx] = log_probs;
    }

    pub fn load(path: &Path) -> Result<Self, ModelError> {
        let file = std::fs::File::open(path).map_err(|e| ModelError::read(path, e))?;
        let table = Self::from_reader(std::io::BufReader::new(file), path)?;
        tracing::info!("Loaded duration model {:?}: {} states", path, table.states.len());
        Ok(table)
    }

    pub fn from_reader<R: BufRead>(reader: R, origin: &Path) -> Result<Self, ModelError> {
        let mut table = Self::new();
        for (idx, line) in reader.lines().enumerate() {
            let line = line.map_err(|e| ModelError::read(origin, e))?;
            let mut fields = line.split_whitespace();
            let Some(state) = fields.next() else { continue };
            let state: StateId = state.parse().map_err(|_| {
                ModelError::parse(origin, idx + 1, format!("invalid state '{}'", state))
            })?;
            let log_probs = fields
                .map(|f| {
                    f.parse::<f32>().map_err(|_| {
                        ModelError::parse(origin, idx + 1, format!("invalid log-prob '{}'", f))
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            if log_probs.is_empty() {
                return Err(ModelError::parse(origin, idx + 1, "state has no durations"));
            }
            table.insert(state, log_probs);
        }
        Ok(table)
    }
}

impl DurationModel for DurationTable {
    fn log_prob(&self, state: StateId, duration: u16) -> f32 {
        match self.states.get(state as usize) {
            Some(lps) if !lps.is_empty() => {
                let idx = (duration.max(1) as usize - 1).min(lps.len() - 1);
                lps[idx]
            }
            _ => 0.0,
        }
    }
}
