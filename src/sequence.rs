// Sequence player: the slide/step state machine.
// States: Idle -> StepActive(slide, step) -> ... -> Ended. Pause is not a state.

use serde::{Deserialize, Serialize};

use crate::config::{NarrationMode, SurfaceCapabilities};
use crate::error::EngineError;
use crate::types::*;

/// Playback state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "state")]
pub enum PlayerState {
    #[default]
    Idle,
    StepActive { slide: usize, step: usize },
    Ended,
}

impl PlayerState {
    pub fn position(&self) -> Option<StepPosition> {
        match *self {
            PlayerState::StepActive { slide, step } => Some(StepPosition::new(slide, step)),
            _ => None,
        }
    }
}

/// Immutable per-step view of the level settings, taken when the step activates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepContext {
    /// The message text (or hotspot script) may be shown.
    pub script_visible: bool,
    /// "Use suggested response" is offered on a trainee step.
    pub suggestion_available: bool,
}

/// What should happen when a step becomes active.
#[derive(Debug, Clone, PartialEq)]
pub enum Activation {
    /// Hidden by level settings: advance without user action or attempt record.
    Skip,
    /// Customer line. With `narrate` the step waits for narration to finish;
    /// otherwise it advances as soon as it is displayed.
    CustomerMessage {
        text: String,
        narrate: bool,
        context: StepContext,
    },
    /// Trainee line: wait for typed text, the suggested response, or a recording.
    AwaitTrainee { context: StepContext },
    /// Interactive hotspot, with an optional single-shot timeout.
    Hotspot {
        hotspot_type: HotspotType,
        timeout_us: Option<u64>,
        context: StepContext,
    },
}

/// Progress through the sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Progress {
    pub completed_steps: usize,
    pub total_steps: usize,
    pub slide_index: usize,
    pub slide_count: usize,
}

/// Walks the slide/step structure. Knows only the shape of the simulation
/// (steps per slide); step content stays with the engine.
#[derive(Debug, Clone, Default)]
pub struct SequencePlayer {
    shape: Vec<usize>,
    state: PlayerState,
}

impl SequencePlayer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> PlayerState {
        self.state
    }

    pub fn position(&self) -> Option<StepPosition> {
        self.state.position()
    }

    pub fn is_ended(&self) -> bool {
        self.state == PlayerState::Ended
    }

    /// `Idle -> StepActive` at the first step. Slides without steps are passed over.
    pub fn start(&mut self, simulation: &Simulation) -> Result<StepPosition, EngineError> {
        if self.state != PlayerState::Idle {
            return Err(EngineError::AlreadyStarted);
        }
        if simulation.slides.is_empty() {
            return Err(EngineError::EmptyContent("simulation has no slides".to_string()));
        }
        let shape: Vec<usize> = simulation.slides.iter().map(|s| s.sequence.len()).collect();
        let first = shape
            .iter()
            .position(|&len| len > 0)
            .ok_or_else(|| EngineError::EmptyContent("no slide has any steps".to_string()))?;

        self.shape = shape;
        self.state = PlayerState::StepActive {
            slide: first,
            step: 0,
        };
        Ok(StepPosition::new(first, 0))
    }

    /// Move to the next step, the first step of the next non-empty slide, or `Ended`.
    pub fn advance(&mut self) -> Result<PlayerState, EngineError> {
        let (slide, step) = match self.state {
            PlayerState::Idle => return Err(EngineError::NotStarted),
            PlayerState::Ended => return Err(EngineError::AdvanceAfterEnd),
            PlayerState::StepActive { slide, step } => (slide, step),
        };

        self.state = if step + 1 < self.shape[slide] {
            PlayerState::StepActive {
                slide,
                step: step + 1,
            }
        } else {
            match (slide + 1..self.shape.len()).find(|&s| self.shape[s] > 0) {
                Some(next) => PlayerState::StepActive {
                    slide: next,
                    step: 0,
                },
                None => PlayerState::Ended,
            }
        };
        Ok(self.state)
    }

    /// Jump straight to `Ended` (external end request). Returns `false` if already there.
    pub fn finish(&mut self) -> bool {
        if self.state == PlayerState::Ended {
            return false;
        }
        self.state = PlayerState::Ended;
        true
    }

    pub fn progress(&self) -> Progress {
        let total_steps = self.shape.iter().sum();
        let slide_count = self.shape.len();
        match self.state {
            PlayerState::Idle => Progress {
                completed_steps: 0,
                total_steps,
                slide_index: 0,
                slide_count,
            },
            PlayerState::StepActive { slide, step } => Progress {
                completed_steps: self.shape[..slide].iter().sum::<usize>() + step,
                total_steps,
                slide_index: slide,
                slide_count,
            },
            PlayerState::Ended => Progress {
                completed_steps: total_steps,
                total_steps,
                slide_index: slide_count.saturating_sub(1),
                slide_count,
            },
        }
    }

    /// Decide the activation side effects for `step`. Level settings are read once
    /// here and frozen into the returned context.
    pub fn plan_activation(
        step: &Step,
        level: &LevelSettings,
        capabilities: &SurfaceCapabilities,
    ) -> Activation {
        match &step.kind {
            StepKind::Message(message) => {
                let script_visible = !level.hides_script(message.role);
                let context = StepContext {
                    script_visible,
                    suggestion_available: message.role == Role::Trainee && script_visible,
                };
                match message.role {
                    Role::Customer => Activation::CustomerMessage {
                        text: message.text.clone(),
                        narrate: capabilities.narration == NarrationMode::Audio,
                        context,
                    },
                    Role::Trainee => Activation::AwaitTrainee { context },
                }
            }
            StepKind::Hotspot(hotspot) => {
                if level.hides(hotspot.hotspot_type) {
                    return Activation::Skip;
                }
                Activation::Hotspot {
                    hotspot_type: hotspot.hotspot_type,
                    timeout_us: hotspot.settings.timeout_micros(),
                    context: StepContext {
                        script_visible: true,
                        suggestion_available: false,
                    },
                }
            }
        }
    }
}
