//! Recognition results and run totals

use crate::history::StateSegment;
use crate::network::UnitId;
use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// Acoustic frames per second of audio (8 ms frame shift)
pub const FRAME_RATE: f64 = 125.0;

/// One decoded unit sequence with its scores
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Hypothesis {
    /// Unit labels in utterance order
    pub units: Vec<String>,
    #[serde(skip)]
    pub unit_ids: Vec<UnitId>,
    /// Units rendered as words
    pub text: String,
    pub total_log_prob: f32,
    pub am_log_prob: f32,
    pub lm_log_prob: f32,
}

/// Outcome of decoding a single utterance
#[derive(Debug, Clone, Serialize)]
pub struct RecognitionResult {
    pub best: Hypothesis,
    /// Alternate hypotheses, best first. Empty unless n-best is enabled.
    pub alternates: Vec<Hypothesis>,
    pub alignment: Vec<StateSegment>,
    pub frames: usize,
    #[serde(skip)]
    pub elapsed: Duration,
    /// Sum over frames of the number of tokens expanded
    pub total_token_count: u64,
}

impl RecognitionResult {
    pub fn mean_token_count(&self) -> f64 {
        if self.frames == 0 {
            return 0.0;
        }
        self.total_token_count as f64 / self.frames as f64
    }

    /// Decoding time divided by audio duration
    pub fn real_time_factor(&self, frame_rate: f64) -> f64 {
        if self.frames == 0 {
            return 0.0;
        }
        self.elapsed.as_secs_f64() / (self.frames as f64 / frame_rate)
    }
}

/// Totals over a decoding run
#[derive(Debug, Clone, Default)]
pub struct TotalStats {
    pub files: usize,
    pub failed: usize,
    pub frames: usize,
    pub elapsed: Duration,
    pub total_token_count: u64,
    pub total_log_prob: f64,
    pub am_log_prob: f64,
    pub lm_log_prob: f64,
}

impl TotalStats {
    pub fn add(&mut self, result: &RecognitionResult) {
        self.files += 1;
        self.frames += result.frames;
        self.elapsed += result.elapsed;
        self.total_token_count += result.total_token_count;
        self.total_log_prob += result.best.total_log_prob as f64;
        self.am_log_prob += result.best.am_log_prob as f64;
        self.lm_log_prob += result.best.lm_log_prob as f64;
    }

    pub fn add_failure(&mut self) {
        self.files += 1;
        self.failed += 1;
    }

    pub fn real_time_factor(&self) -> f64 {
        if self.frames == 0 {
            return 0.0;
        }
        self.elapsed.as_secs_f64() / (self.frames as f64 / FRAME_RATE)
    }

    pub fn mean_token_count(&self) -> f64 {
        if self.frames == 0 {
            return 0.0;
        }
        self.total_token_count as f64 / self.frames as f64
    }
}

impl fmt::Display for TotalStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Files:            {} ({} failed)", self.files, self.failed)?;
        writeln!(
            f,
            "Frames:           {} ({:.2}s of audio)",
            self.frames,
            self.frames as f64 / FRAME_RATE
        )?;
        writeln!(f, "Decoding time:    {:.2}s", self.elapsed.as_secs_f64())?;
        writeln!(f, "Real-time factor: {:.3}", self.real_time_factor())?;
        writeln!(f, "Mean tokens:      {:.1}", self.mean_token_count())?;
        writeln!(f, "Total log-prob:   {:.3}", self.total_log_prob)?;
        writeln!(f, "AM log-prob:      {:.3}", self.am_log_prob)?;
        write!(f, "LM log-prob:      {:.3}", self.lm_log_prob)
    }
}
