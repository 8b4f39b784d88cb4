// Engine configuration passed from the host as JSON.
// Surfaces differ only by capability set; the state machine is shared.

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// How customer messages are narrated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum NarrationMode {
    /// Speech synthesis; the step waits for the narration-finished signal.
    Audio,
    /// Text bubble only; the step advances as soon as it is displayed.
    #[default]
    Text,
    /// Customer messages are neither voiced nor shown; they advance immediately.
    None,
}

/// Whether the host can capture trainee speech.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum CaptureSupport {
    #[default]
    None,
    Audio {
        /// The capture device supports pause/resume.
        #[serde(default)]
        pausable: bool,
    },
}

/// Capability set a host surface implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SurfaceCapabilities {
    #[serde(default)]
    pub narration: NarrationMode,
    #[serde(default)]
    pub capture: CaptureSupport,
}

impl SurfaceCapabilities {
    /// Audio narration and pausable capture.
    pub fn voice() -> Self {
        SurfaceCapabilities {
            narration: NarrationMode::Audio,
            capture: CaptureSupport::Audio { pausable: true },
        }
    }

    /// Text chat: no narration audio, typed answers only.
    pub fn text() -> Self {
        SurfaceCapabilities::default()
    }

    pub fn can_capture(&self) -> bool {
        matches!(self.capture, CaptureSupport::Audio { .. })
    }

    pub fn can_pause_capture(&self) -> bool {
        matches!(self.capture, CaptureSupport::Audio { pausable: true })
    }
}

/// Engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub capabilities: SurfaceCapabilities,
    /// Delay between a checkbox click and the advance, so the checked state is visible.
    #[serde(default = "default_checkbox_advance_delay_ms")]
    pub checkbox_advance_delay_ms: u64,
    /// Key that submits a text field draft when pressed without modifiers.
    #[serde(default = "default_submit_key")]
    pub submit_key: String,
    /// Minimum change in render scale that triggers a relayout.
    #[serde(default = "default_scale_epsilon")]
    pub scale_epsilon: f64,
    /// On early end, wait for an in-flight recording's transcript instead of discarding it.
    #[serde(default = "default_true")]
    pub transcribe_on_end: bool,
}

fn default_checkbox_advance_delay_ms() -> u64 {
    800
}

fn default_submit_key() -> String {
    "Enter".to_string()
}

fn default_scale_epsilon() -> f64 {
    0.001
}

fn default_true() -> bool {
    true
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            capabilities: SurfaceCapabilities::default(),
            checkbox_advance_delay_ms: default_checkbox_advance_delay_ms(),
            submit_key: default_submit_key(),
            scale_epsilon: default_scale_epsilon(),
            transcribe_on_end: default_true(),
        }
    }
}

impl EngineConfig {
    pub fn with_capabilities(mut self, capabilities: SurfaceCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if !(self.scale_epsilon.is_finite() && self.scale_epsilon >= 0.0) {
            return Err(EngineError::InvalidConfig(format!(
                "scale_epsilon must be a non-negative number, got {}",
                self.scale_epsilon
            )));
        }
        if self.submit_key.is_empty() {
            return Err(EngineError::InvalidConfig(
                "submit_key must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn checkbox_delay_micros(&self) -> u64 {
        self.checkbox_advance_delay_ms.saturating_mul(1000)
    }
}
