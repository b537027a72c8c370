//! Error types for food-lens.

use crate::pipeline::types::RunStage;

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Messaging transport errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Failed to send message on channel {name}: {reason}")]
    SendFailed { name: String, reason: String },

    #[error("Media {media_id} unavailable on channel {name}: {reason}")]
    MediaUnavailable {
        name: String,
        media_id: String,
        reason: String,
    },
}

/// Image classification errors.
///
/// These never reach the user: the pipeline treats every variant as
/// "nothing recognized".
#[derive(Debug, thiserror::Error)]
pub enum ClassifierError {
    #[error("Model {model} failed to load: {reason}")]
    Load { model: String, reason: String },

    #[error("Image could not be decoded: {0}")]
    Decode(String),

    #[error("Inference request for {model} failed: {reason}")]
    Inference { model: String, reason: String },

    #[error("Invalid response from {model}: {reason}")]
    InvalidResponse { model: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Nutrition lookup errors.
#[derive(Debug, thiserror::Error)]
pub enum NutritionError {
    #[error("Nutrition source {source_name} request failed: {reason}")]
    RequestFailed { source_name: String, reason: String },

    #[error("Invalid response from {source_name}: {reason}")]
    InvalidResponse { source_name: String, reason: String },
}

/// Failures that abort a pipeline run without a user-facing reply.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Scratch storage failed at stage {stage}: {source}")]
    Storage {
        stage: RunStage,
        #[source]
        source: std::io::Error,
    },
}
