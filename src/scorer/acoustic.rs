//! In-memory acoustic score matrix
//!
//! Text format: one frame per line, whitespace-separated log-probabilities
//! indexed by state id. Every frame must have the same number of states.

use super::AcousticScorer;
use crate::error::ModelError;
use crate::network::StateId;
use std::io::BufRead;
use std::path::Path;

#[derive(Debug, Clone)]
pub struct FrameMatrix {
    scores: Vec<f32>,
    state_count: usize,
    frame_count: usize,
    current: usize,
}

impl FrameMatrix {
    /// Build from rows of per-state scores
    pub fn from_rows(rows: Vec<Vec<f32>>) -> Result<Self, ModelError> {
        let state_count = rows.first().map(Vec::len).unwrap_or(0);
        let frame_count = rows.len();
        let mut scores = Vec::with_capacity(state_count * frame_count);
        for (frame, row) in rows.into_iter().enumerate() {
            if row.len() != state_count {
                return Err(ModelError::Network(format!(
                    "acoustic frame {} has {} states, expected {}",
                    frame,
                    row.len(),
                    state_count
                )));
            }
            scores.extend(row);
        }
        Ok(Self {
            scores,
            state_count,
            frame_count,
            current: 0,
        })
    }

    pub fn load(path: &Path) -> Result<Self, ModelError> {
        let file = std::fs::File::open(path).map_err(|e| ModelError::read(path, e))?;
        Self::from_reader(std::io::BufReader::new(file), path)
    }

    pub fn from_reader<R: BufRead>(reader: R, origin: &Path) -> Result<Self, ModelError> {
        let mut scores = Vec::new();
        let mut state_count = None;
        let mut frame_count = 0;

        for (idx, line) in reader.lines().enumerate() {
            let line = line.map_err(|e| ModelError::read(origin, e))?;
            if line.trim().is_empty() {
                continue;
            }
            let before = scores.len();
            for field in line.split_whitespace() {
                let value: f32 = field.parse().map_err(|_| {
                    ModelError::parse(origin, idx + 1, format!("invalid score '{}'", field))
                })?;
                scores.push(value);
            }
            let width = scores.len() - before;
            match state_count {
                None => state_count = Some(width),
                Some(expected) if expected != width => {
                    return Err(ModelError::parse(
                        origin,
                        idx + 1,
                        format!("frame has {} states, expected {}", width, expected),
                    ));
                }
                Some(_) => {}
            }
            frame_count += 1;
        }

        Ok(Self {
            scores,
            state_count: state_count.unwrap_or(0),
            frame_count,
            current: 0,
        })
    }

    pub fn frame_count(&self) -> usize {
        self.frame_count
    }
}

impl AcousticScorer for FrameMatrix {
    fn go_to(&mut self, frame: usize) -> bool {
        if frame >= self.frame_count {
            return false;
        }
        self.current = frame;
        true
    }

    fn log_prob(&self, state: StateId) -> f32 {
        assert!(
            (state as usize) < self.state_count,
            "state {} has no acoustic score ({} states per frame)",
            state,
            self.state_count
        );
        self.scores[self.current * self.state_count + state as usize]
    }

    fn state_count(&self) -> usize {
        self.state_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frames_from_text() {
        let text = "-1.0 -2.0\n\n-3.5 -0.5\n";
        let mut m = FrameMatrix::from_reader(text.as_bytes(), Path::new("x.txt")).unwrap();
        assert_eq!(m.frame_count(), 2);
        assert_eq!(m.state_count(), 2);

        assert!(m.go_to(0));
        assert_eq!(m.log_prob(1), -2.0);
        assert!(m.go_to(1));
        assert_eq!(m.log_prob(0), -3.5);
        assert!(!m.go_to(2));
    }

    #[test]
    fn test_ragged_frames_rejected() {
        let err = FrameMatrix::from_reader("-1 -2\n-1\n".as_bytes(), Path::new("x.txt"));
        assert!(matches!(err, Err(ModelError::Parse { line: 2, .. })));

        assert!(FrameMatrix::from_rows(vec![vec![0.0, 1.0], vec![0.0]]).is_err());
    }

    #[test]
    fn test_empty_matrix() {
        let mut m = FrameMatrix::from_rows(Vec::new()).unwrap();
        assert_eq!(m.frame_count(), 0);
        assert!(!m.go_to(0));
    }
}
