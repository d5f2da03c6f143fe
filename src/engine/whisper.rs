//! Whisper-based speech-to-text engine
//!
//! Uses whisper.cpp via the whisper-rs crate for fast, local inference.
//! Confidence is the geometric mean of token probabilities across all
//! decoded segments.

use super::{is_silence, EngineOutput, SpeechEngine, ENGINE_SAMPLE_RATE};
use crate::config::{Config, EngineConfig};
use crate::error::EngineError;
use std::path::PathBuf;
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

/// Whisper-based engine instance
pub struct WhisperEngine {
    /// Whisper context (holds the model)
    ctx: WhisperContext,
    /// Language for transcription ("auto" enables detection)
    language: String,
    /// Whether to translate to English
    translate: bool,
    /// Number of threads to use
    threads: usize,
}

impl WhisperEngine {
    /// Load the model. Fails with [`EngineError::ModelNotFound`] or
    /// [`EngineError::Load`] on missing/corrupt weights.
    pub fn new(config: &EngineConfig) -> Result<Self, EngineError> {
        let model_path = resolve_model_path(&config.model)?;

        tracing::info!("Loading whisper model from {:?}", model_path);
        let start = std::time::Instant::now();

        let ctx = WhisperContext::new_with_params(
            model_path
                .to_str()
                .ok_or_else(|| EngineError::ModelNotFound("Invalid path".to_string()))?,
            WhisperContextParameters::default(),
        )
        .map_err(|e| EngineError::Load(e.to_string()))?;

        tracing::info!("Model loaded in {:.2}s", start.elapsed().as_secs_f32());

        let threads = config.threads.unwrap_or_else(|| num_cpus::get().min(4));

        Ok(Self {
            ctx,
            language: config.language.clone(),
            translate: config.translate,
            threads,
        })
    }
}

impl SpeechEngine for WhisperEngine {
    fn transcribe(&self, samples: &[f32]) -> Result<EngineOutput, EngineError> {
        // Silence or empty input is a valid empty result, not a failure
        if is_silence(samples) {
            tracing::debug!("Input is silence, skipping inference");
            return Ok(EngineOutput {
                text: String::new(),
                confidence: 0.0,
                language: self.language.clone(),
            });
        }

        let duration_secs = samples.len() as f32 / ENGINE_SAMPLE_RATE as f32;
        tracing::debug!(
            "Transcribing {:.2}s of audio ({} samples)",
            duration_secs,
            samples.len()
        );

        let start = std::time::Instant::now();

        let mut state = self
            .ctx
            .create_state()
            .map_err(|e| EngineError::Runtime(e.to_string()))?;

        let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });

        if self.language == "auto" {
            params.set_language(None);
        } else {
            params.set_language(Some(&self.language));
        }

        params.set_translate(self.translate);
        params.set_n_threads(self.threads as i32);

        params.set_print_special(false);
        params.set_print_progress(false);
        params.set_print_realtime(false);
        params.set_print_timestamps(false);

        params.set_suppress_blank(true);
        params.set_suppress_nst(true);

        // For short recordings, use single segment mode
        if duration_secs < 30.0 {
            params.set_single_segment(true);
        }

        // Optimize context window for short clips
        if let Some(audio_ctx) = calculate_audio_ctx(duration_secs) {
            params.set_audio_ctx(audio_ctx);
            tracing::debug!(
                "Audio context optimization: audio_ctx={} for {:.2}s clip",
                audio_ctx,
                duration_secs
            );
        }

        state
            .full(params, samples)
            .map_err(|e| EngineError::Runtime(e.to_string()))?;

        // Collect text and token probabilities across all segments
        let mut text = String::new();
        let mut token_probs = Vec::new();
        for segment in state.as_iter() {
            text.push_str(
                segment
                    .to_str()
                    .map_err(|e| EngineError::Runtime(e.to_string()))?,
            );

            let n_tokens = segment.n_tokens();
            for i in 0..n_tokens {
                if let Some(token) = segment.get_token(i) {
                    token_probs.push(token.token_probability());
                }
            }
        }

        let result = text.trim().to_string();
        let confidence = if result.is_empty() {
            0.0
        } else {
            geometric_mean(&token_probs).clamp(0.0, 1.0)
        };

        tracing::info!(
            "Transcription completed in {:.2}s (confidence {:.2}): {:?}",
            start.elapsed().as_secs_f32(),
            confidence,
            if result.chars().count() > 50 {
                format!("{}...", result.chars().take(50).collect::<String>())
            } else {
                result.clone()
            }
        );

        Ok(EngineOutput {
            text: result,
            confidence,
            language: self.language.clone(),
        })
    }
}

/// Resolve model name to file path
fn resolve_model_path(model: &str) -> Result<PathBuf, EngineError> {
    // If it's already an absolute path, use it directly
    let path = PathBuf::from(model);
    if path.is_absolute() && path.exists() {
        return Ok(path);
    }

    let model_filename = match model {
        "tiny" => "ggml-tiny.bin",
        "tiny.en" => "ggml-tiny.en.bin",
        "base" => "ggml-base.bin",
        "base.en" => "ggml-base.en.bin",
        "small" => "ggml-small.bin",
        "small.en" => "ggml-small.en.bin",
        "medium" => "ggml-medium.bin",
        "medium.en" => "ggml-medium.en.bin",
        "large" | "large-v1" => "ggml-large-v1.bin",
        "large-v2" => "ggml-large-v2.bin",
        "large-v3" => "ggml-large-v3.bin",
        "large-v3-turbo" => "ggml-large-v3-turbo.bin",
        other if other.ends_with(".bin") => other,
        other => {
            return Err(EngineError::ModelNotFound(format!(
                "Unknown model: '{}'. Valid models: tiny, base, small, medium, large-v3, large-v3-turbo",
                other
            )));
        }
    };

    // Look in the data directory, then the working directory
    let models_dir = Config::models_dir();
    let model_path = models_dir.join(model_filename);
    if model_path.exists() {
        return Ok(model_path);
    }

    let cwd_path = PathBuf::from(model_filename);
    if cwd_path.exists() {
        return Ok(cwd_path);
    }

    let local_models_path = PathBuf::from("models").join(model_filename);
    if local_models_path.exists() {
        return Ok(local_models_path);
    }

    Err(EngineError::ModelNotFound(format!(
        "Model '{}' not found. Looked in:\n  - {}\n  - {}\n  - {}\n\nDownload from: https://huggingface.co/ggerganov/whisper.cpp/tree/main",
        model,
        model_path.display(),
        cwd_path.display(),
        local_models_path.display()
    )))
}

/// Calculate audio_ctx parameter for short clips (≤22.5s).
/// Formula: duration_seconds * 50 + 64
fn calculate_audio_ctx(duration_secs: f32) -> Option<i32> {
    if duration_secs <= 22.5 {
        Some((duration_secs * 50.0) as i32 + 64)
    } else {
        None
    }
}

/// Geometric mean of token probabilities, computed in log space so
/// long token sequences do not underflow to zero
fn geometric_mean(probabilities: &[f32]) -> f32 {
    if probabilities.is_empty() {
        return 0.0;
    }
    let log_sum: f32 = probabilities
        .iter()
        .map(|p| p.max(f32::MIN_POSITIVE).ln())
        .sum();
    (log_sum / probabilities.len() as f32).exp()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_model_name_rejected() {
        assert!(matches!(
            resolve_model_path("definitely-not-a-model"),
            Err(EngineError::ModelNotFound(_))
        ));
    }

    #[test]
    fn test_audio_ctx_for_short_clip() {
        assert_eq!(calculate_audio_ctx(2.0), Some(164));
        assert_eq!(calculate_audio_ctx(30.0), None);
    }

    #[test]
    fn test_geometric_mean() {
        assert_eq!(geometric_mean(&[]), 0.0);
        assert!((geometric_mean(&[0.5, 0.5]) - 0.5).abs() < 1e-6);
        assert!((geometric_mean(&[1.0, 0.25]) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_geometric_mean_of_long_token_sequence() {
        // A minute-long transcript easily has over a thousand tokens;
        // the naive product of their probabilities is below f32 range
        let probs = vec![0.9f32; 1500];
        assert!((geometric_mean(&probs) - 0.9).abs() < 1e-3);
    }
}
