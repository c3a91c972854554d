//! Utterance worker pool
//!
//! Utterances are independent: each one gets its own [`Recognition`] on a
//! blocking worker thread, sharing only the read-only [`Decoder`]. At most
//! `threads` utterances run at once. A failing utterance produces an `Err`
//! outcome in its slot and never affects the others.
//!
//! [`Recognition`]: crate::search::Recognition

use crate::error::{ModelError, TokpassError};
use crate::lm::LanguageModel;
use crate::result::RecognitionResult;
use crate::scorer::{AcousticScorer, FrameMatrix};
use crate::search::Decoder;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Result of one utterance
pub type Outcome = Result<RecognitionResult, TokpassError>;

/// Decode acoustic score files, returning outcomes in input order. A file
/// narrower than the network's state range fails before decoding starts.
pub async fn decode_files<L>(
    decoder: Arc<Decoder<L>>,
    files: Vec<PathBuf>,
    threads: usize,
) -> Vec<Outcome>
where
    L: LanguageModel + 'static,
{
    let required = decoder.network().state_count();
    let open = move |path: PathBuf| -> Result<FrameMatrix, TokpassError> {
        let acoustics = FrameMatrix::load(&path)?;
        if acoustics.frame_count() > 0 && acoustics.state_count() < required {
            return Err(ModelError::AcousticWidth {
                path,
                states: acoustics.state_count(),
                required,
            }
            .into());
        }
        Ok(acoustics)
    };
    decode_batch(decoder, files, threads, open).await
}

/// Decode arbitrary inputs; `open` turns an input into an acoustic scorer
/// on the worker thread.
pub async fn decode_batch<L, T, A, F>(
    decoder: Arc<Decoder<L>>,
    inputs: Vec<T>,
    threads: usize,
    open: F,
) -> Vec<Outcome>
where
    L: LanguageModel + 'static,
    T: Send + 'static,
    A: AcousticScorer + 'static,
    F: Fn(T) -> Result<A, TokpassError> + Send + Sync + 'static,
{
    let threads = threads.max(1);
    tracing::info!("Decoding {} utterances on {} threads", inputs.len(), threads);

    let semaphore = Arc::new(Semaphore::new(threads));
    let open = Arc::new(open);
    let mut handles = Vec::with_capacity(inputs.len());

    for (index, input) in inputs.into_iter().enumerate() {
        // Never closed, so this only waits for a free worker
        let permit = semaphore.clone().acquire_owned().await.ok();
        let decoder = Arc::clone(&decoder);
        let open = Arc::clone(&open);

        handles.push(tokio::task::spawn_blocking(move || {
            let _permit = permit;
            let outcome = open(input).and_then(|mut acoustics| {
                decoder
                    .recognize(&mut acoustics)
                    .map_err(TokpassError::from)
            });
            match &outcome {
                Ok(result) => tracing::info!(
                    "Utterance {}: {} frames, {:.1} tokens/frame, RTF {:.3}",
                    index,
                    result.frames,
                    result.mean_token_count(),
                    result.real_time_factor(crate::result::FRAME_RATE)
                ),
                Err(e) => tracing::warn!("Utterance {} failed: {}", index, e),
            }
            outcome
        }));
    }

    let mut outcomes = Vec::with_capacity(handles.len());
    for handle in handles {
        let outcome = match handle.await {
            Ok(outcome) => outcome,
            Err(e) => Err(TokpassError::Worker(e.to_string())),
        };
        outcomes.push(outcome);
    }
    outcomes
}
