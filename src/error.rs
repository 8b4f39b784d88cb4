// Typed errors with thiserror. Surface meaningful messages to JS.

use thiserror::Error;

use crate::types::StepId;

/// Engine error types.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Simulation has no playable content: {0}")]
    EmptyContent(String),

    #[error("Image geometry unavailable: {0}")]
    GeometryUnavailable(String),

    #[error("Simulation is already ending")]
    DoubleEnd,

    #[error("advance() called after the simulation ended")]
    AdvanceAfterEnd,

    #[error("Simulation has not been started")]
    NotStarted,

    #[error("Simulation was already started")]
    AlreadyStarted,

    #[error("Interaction not valid for step {step_id}: {message}")]
    InvalidInteraction { step_id: StepId, message: String },

    #[error("Playback is paused")]
    Paused,

    #[error("Recording in progress for step {0}")]
    CaptureInProgress(StepId),

    #[error("Unknown step: {0}")]
    UnknownStep(StepId),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl EngineError {
    /// Soft errors are logged and ignored by the event loop instead of propagated.
    pub fn is_soft(&self) -> bool {
        matches!(
            self,
            EngineError::GeometryUnavailable(_)
                | EngineError::DoubleEnd
                | EngineError::Paused
                | EngineError::InvalidInteraction { .. }
        )
    }

    pub(crate) fn invalid(step_id: &StepId, message: impl Into<String>) -> Self {
        EngineError::InvalidInteraction {
            step_id: step_id.clone(),
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Serialization(err.to_string())
    }
}
