// sim_playback: Rust/WASM playback engine for slide-based training simulations.
// The host renders and captures; every sequencing, hit-testing, and scoring decision lives here.

mod attempt;
mod config;
mod engine;
mod error;
mod geometry;
mod hotspot;
mod overlay;
mod scoring;
mod sequence;
mod timer;
mod types;

use wasm_bindgen::prelude::*;

pub use attempt::{AttemptLog, AttemptRecord, WrongClick};
pub use config::{CaptureSupport, EngineConfig, NarrationMode, SurfaceCapabilities};
pub use engine::{EngineEvent, EngineSnapshot, HostCommand, Lifecycle, PlaybackEngine};
pub use error::EngineError;
pub use geometry::{to_percent_rect, to_screen_rect, ImageMetrics, Scale};
pub use hotspot::{Directive, HotspotController, Interaction, Modifiers, PointerTarget, StepUi};
pub use overlay::{compute_layout, HotspotOverlay, SlideLayout};
pub use scoring::{modified_script, AttemptPayload, CompletionState, ScoreSummary};
pub use sequence::{Activation, PlayerState, Progress, SequencePlayer, StepContext};
pub use timer::{StepTimer, TimerPurpose, TimerSlot};
pub use types::*;

/// Initialize panic hook for better error messages in browser console.
#[wasm_bindgen(start)]
pub fn init() {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
}

/// Engine handle exposed to JavaScript.
/// Events go in as JSON, host commands come back as a JSON array.
#[wasm_bindgen]
pub struct WasmPlaybackEngine {
    inner: PlaybackEngine,
}

#[wasm_bindgen]
impl WasmPlaybackEngine {
    #[wasm_bindgen(constructor)]
    pub fn new(config_json: &str) -> Result<WasmPlaybackEngine, JsValue> {
        Self::from_config_json(config_json)
            .map_err(|e| JsValue::from_str(&format!("Invalid config: {}", e)))
    }

    /// Load a simulation and activate its first step.
    /// Returns the commands produced by activation.
    pub fn start(&mut self, simulation_json: &str, now_us: u64) -> Result<String, JsValue> {
        self.start_json(simulation_json, now_us)
            .map_err(|e| JsValue::from_str(&format!("Start failed: {}", e)))
    }

    /// Apply one event. Returns the host commands it produced.
    pub fn handle_event(&mut self, event_json: &str, now_us: u64) -> Result<String, JsValue> {
        self.handle_json(event_json, now_us)
            .map_err(|e| JsValue::from_str(&format!("Event rejected: {}", e)))
    }

    /// Request the end of the attempt (same as an `EndRequested` event).
    pub fn end(&mut self, now_us: u64) -> Result<String, JsValue> {
        self.handle_json(r#"{"type":"EndRequested"}"#, now_us)
            .map_err(|e| JsValue::from_str(&format!("End failed: {}", e)))
    }

    /// Commands queued since the last call, as a JSON array.
    pub fn drain_commands(&mut self) -> Result<String, JsValue> {
        self.drain_json()
            .map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
    }

    /// Current engine state for rendering.
    pub fn snapshot(&self) -> Result<String, JsValue> {
        serde_json::to_string(&self.inner.snapshot())
            .map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
    }
}

impl WasmPlaybackEngine {
    fn from_config_json(config_json: &str) -> Result<Self, EngineError> {
        let config = EngineConfig::from_json(config_json)?;
        Ok(WasmPlaybackEngine {
            inner: PlaybackEngine::new(config)?,
        })
    }

    fn start_json(&mut self, simulation_json: &str, now_us: u64) -> Result<String, EngineError> {
        let simulation: Simulation = serde_json::from_str(simulation_json)?;
        self.inner
            .start(simulation, Timestamp::from_micros(now_us))?;
        self.drain_json()
    }

    fn handle_json(&mut self, event_json: &str, now_us: u64) -> Result<String, EngineError> {
        let event: EngineEvent = serde_json::from_str(event_json)?;
        self.inner.handle(Timestamp::from_micros(now_us), event)?;
        self.drain_json()
    }

    fn drain_json(&mut self) -> Result<String, EngineError> {
        Ok(serde_json::to_string(&self.inner.drain_commands())?)
    }
}
