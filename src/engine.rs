// Playback engine: composes the sequence player, hotspot controller, attempt log, and geometry.
// A synchronous reducer: each event is applied in full before the next one, and side
// effects for the host are queued as commands. See DESIGN.md: PlaybackEngine.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::attempt::AttemptLog;
use crate::config::{EngineConfig, NarrationMode};
use crate::error::EngineError;
use crate::geometry::ImageMetrics;
use crate::hotspot::{Directive, HotspotController, Interaction, Modifiers, PointerTarget, StepUi};
use crate::overlay::{compute_layout, SlideLayout};
use crate::scoring::{modified_script, AttemptPayload, CompletionState, ScoreSummary};
use crate::sequence::{Activation, PlayerState, Progress, SequencePlayer, StepContext};
use crate::types::*;

/// Input from the host: rendering notifications, user input, collaborator results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EngineEvent {
    ImageLoaded {
        image_id: ImageId,
        natural: Size,
        rendered: Size,
    },
    Resized {
        rendered: Size,
    },
    Pointer {
        x: f64,
        y: f64,
        #[serde(default)]
        target: PointerTarget,
    },
    DropdownSelect {
        option: String,
    },
    TextInput {
        text: String,
    },
    KeyPress {
        key: String,
        #[serde(default)]
        modifiers: Modifiers,
    },
    /// Host "next" action. A dropdown without `advanceOnSelect` has no timeout left
    /// once an option is picked, so the host must offer this (or an end) to move on.
    Continue,
    Tick,
    NarrationFinished {
        step_id: StepId,
    },
    TraineeSubmit {
        text: String,
    },
    UseSuggestedResponse,
    StartRecording,
    StopRecording,
    TranscriptReady {
        step_id: StepId,
        text: String,
    },
    CaptureFailed {
        step_id: StepId,
        message: String,
    },
    Pause,
    Resume,
    EndRequested,
    ScoringSucceeded {
        summary: ScoreSummary,
    },
    ScoringFailed {
        message: String,
    },
}

/// Side effect the host must carry out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum HostCommand {
    RequestImage {
        image_id: ImageId,
    },
    ReleaseImage {
        image_id: ImageId,
    },
    Layout {
        layout: SlideLayout,
    },
    ShowStep {
        step_id: StepId,
        position: StepPosition,
        progress: Progress,
        context: StepContext,
    },
    ShowMessage {
        step_id: StepId,
        role: Role,
        /// `None` when the level hides this role's script.
        text: Option<String>,
    },
    HotspotUi {
        step_id: StepId,
        ui: StepUi,
    },
    Speak {
        step_id: StepId,
        text: String,
    },
    CancelNarration,
    PauseNarration,
    ResumeNarration,
    StartCapture {
        step_id: StepId,
    },
    StopCapture {
        step_id: StepId,
        keep_transcript: bool,
    },
    PauseCapture,
    ResumeCapture,
    SubmitAttempt {
        payload: AttemptPayload,
    },
    Completed {
        completion: CompletionState,
    },
}

/// Engine-level lifecycle, around the player's own states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Lifecycle {
    #[default]
    Ready,
    Running,
    /// End requested; waiting for an in-flight transcript before submitting.
    Finishing,
    /// Attempt submitted; waiting for the scoring result.
    Scoring,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Waiting {
    Nothing,
    Narration(StepId),
    Trainee(StepId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Capture {
    Idle,
    Recording(StepId),
    Transcribing(StepId),
}

impl Capture {
    fn step(&self) -> Option<&StepId> {
        match self {
            Capture::Idle => None,
            Capture::Recording(id) | Capture::Transcribing(id) => Some(id),
        }
    }
}

/// Read-only view for rendering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSnapshot {
    pub lifecycle: Lifecycle,
    pub player: PlayerState,
    pub paused: bool,
    pub progress: Progress,
    pub current_step: Option<StepId>,
    pub context: Option<StepContext>,
    pub ui: Option<StepUi>,
    pub layout: Option<SlideLayout>,
    pub recording: bool,
    pub attempt_log: AttemptLog,
    pub completion: Option<CompletionState>,
}

/// The playback engine. One instance drives one attempt at a time.
pub struct PlaybackEngine {
    config: EngineConfig,
    simulation: Simulation,
    player: SequencePlayer,
    controller: HotspotController,
    log: AttemptLog,
    metrics: ImageMetrics,
    current_image: Option<ImageId>,
    lifecycle: Lifecycle,
    paused: bool,
    context: Option<StepContext>,
    waiting: Waiting,
    capture: Capture,
    answers: BTreeMap<StepId, String>,
    started_at: Timestamp,
    ended_at: Option<Timestamp>,
    completion: Option<CompletionState>,
    outbox: Vec<HostCommand>,
}

impl PlaybackEngine {
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        let controller =
            HotspotController::new(config.checkbox_delay_micros(), config.submit_key.clone());
        Ok(PlaybackEngine {
            config,
            simulation: Simulation::default(),
            player: SequencePlayer::new(),
            controller,
            log: AttemptLog::new(),
            metrics: ImageMetrics::new(),
            current_image: None,
            lifecycle: Lifecycle::Ready,
            paused: false,
            context: None,
            waiting: Waiting::Nothing,
            capture: Capture::Idle,
            answers: BTreeMap::new(),
            started_at: Timestamp::default(),
            ended_at: None,
            completion: None,
            outbox: Vec::new(),
        })
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn player_state(&self) -> PlayerState {
        self.player.state()
    }

    pub fn attempt_log(&self) -> &AttemptLog {
        &self.log
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn completion(&self) -> Option<&CompletionState> {
        self.completion.as_ref()
    }

    /// Take every queued host command, oldest first.
    pub fn drain_commands(&mut self) -> Vec<HostCommand> {
        std::mem::take(&mut self.outbox)
    }

    /// Begin an attempt. Resets the attempt log and the player, then activates
    /// the first step and requests its slide image.
    pub fn start(&mut self, simulation: Simulation, now: Timestamp) -> Result<(), EngineError> {
        match self.lifecycle {
            Lifecycle::Ready | Lifecycle::Completed => {}
            _ => return Err(EngineError::AlreadyStarted),
        }

        // Validate before touching any state: an empty simulation leaves nothing behind.
        let mut player = SequencePlayer::new();
        player.start(&simulation)?;

        self.release_image();
        self.controller.deactivate();
        self.log.clear();
        self.answers.clear();
        self.player = player;
        self.simulation = simulation;
        self.lifecycle = Lifecycle::Running;
        self.paused = false;
        self.context = None;
        self.waiting = Waiting::Nothing;
        self.capture = Capture::Idle;
        self.started_at = now;
        self.ended_at = None;
        self.completion = None;

        log::info!(
            "starting simulation: {} slides, {} steps",
            self.simulation.slides.len(),
            self.simulation.total_steps()
        );
        self.enter_step(now)
    }

    /// Apply one event. Soft errors are logged and swallowed.
    pub fn handle(&mut self, now: Timestamp, event: EngineEvent) -> Result<(), EngineError> {
        match self.dispatch(now, event) {
            Err(err) if err.is_soft() => {
                log::warn!("ignored event: {}", err);
                Ok(())
            }
            other => other,
        }
    }

    fn dispatch(&mut self, now: Timestamp, event: EngineEvent) -> Result<(), EngineError> {
        match event {
            EngineEvent::ImageLoaded {
                image_id,
                natural,
                rendered,
            } => {
                self.image_loaded(image_id, natural, rendered);
                Ok(())
            }
            EngineEvent::Resized { rendered } => {
                if self.metrics.update_rendered(rendered, self.config.scale_epsilon) {
                    self.push_layout();
                }
                Ok(())
            }
            EngineEvent::Pointer { x, y, target } => self.interact(
                now,
                Interaction::Pointer {
                    point: Point::new(x, y),
                    target,
                },
            ),
            EngineEvent::DropdownSelect { option } => {
                self.interact(now, Interaction::DropdownSelect { option })
            }
            EngineEvent::TextInput { text } => self.interact(now, Interaction::TextInput { text }),
            EngineEvent::KeyPress { key, modifiers } => {
                self.interact(now, Interaction::KeyPress { key, modifiers })
            }
            EngineEvent::Continue => self.interact(now, Interaction::Continue),
            EngineEvent::Tick => self.tick(now),
            EngineEvent::NarrationFinished { step_id } => self.narration_finished(now, step_id),
            EngineEvent::TraineeSubmit { text } => self.submit_trainee(now, text),
            EngineEvent::UseSuggestedResponse => self.use_suggested(now),
            EngineEvent::StartRecording => self.start_recording(),
            EngineEvent::StopRecording => self.stop_recording(),
            EngineEvent::TranscriptReady { step_id, text } => {
                self.transcript(now, step_id, text)
            }
            EngineEvent::CaptureFailed { step_id, message } => {
                log::warn!("capture failed for step {}: {}", step_id, message);
                self.transcript(now, step_id, String::new())
            }
            EngineEvent::Pause => self.pause(),
            EngineEvent::Resume => self.resume(now),
            EngineEvent::EndRequested => self.request_end(now),
            EngineEvent::ScoringSucceeded { summary } => {
                self.scoring_finished(CompletionState::Scored { summary });
                Ok(())
            }
            EngineEvent::ScoringFailed { message } => {
                log::error!("scoring failed: {}", message);
                let elapsed_us = self
                    .ended_at
                    .map(|end| end.micros_since(self.started_at))
                    .unwrap_or_default();
                self.scoring_finished(CompletionState::Scoreless {
                    reason: message,
                    elapsed_us,
                });
                Ok(())
            }
        }
    }

    /// `Ok(true)` while running, `Ok(false)` once ending (event ignored).
    fn running(&self) -> Result<bool, EngineError> {
        match self.lifecycle {
            Lifecycle::Ready => Err(EngineError::NotStarted),
            Lifecycle::Running => Ok(true),
            _ => Ok(false),
        }
    }

    fn current_step(&self) -> Option<&Step> {
        let position = self.player.position()?;
        self.simulation.step_at(position.slide, position.step)
    }

    // =========================================================================
    // Sequencing
    // =========================================================================

    /// Activate whatever step the player is on, running through steps that need
    /// no input (hidden hotspots, unnarrated customer lines) until one waits.
    fn enter_step(&mut self, now: Timestamp) -> Result<(), EngineError> {
        loop {
            let Some(position) = self.player.position() else {
                return self.finalize(now);
            };

            self.controller.deactivate();
            self.context = None;
            self.waiting = Waiting::Nothing;
            self.ensure_slide_image(position.slide);

            let step = self
                .simulation
                .step_at(position.slide, position.step)
                .cloned()
                .ok_or_else(|| {
                    EngineError::EmptyContent(format!(
                        "no step at slide {}, step {}",
                        position.slide, position.step
                    ))
                })?;
            let activation = SequencePlayer::plan_activation(
                &step,
                &self.simulation.level_settings,
                &self.config.capabilities,
            );

            match activation {
                Activation::Skip => {
                    log::info!("skipping step {}: hidden by level settings", step.id);
                    self.player.advance()?;
                }
                Activation::CustomerMessage {
                    text,
                    narrate,
                    context,
                } => {
                    self.show_step(&step, position, context);
                    if self.config.capabilities.narration != NarrationMode::None {
                        self.push(HostCommand::ShowMessage {
                            step_id: step.id.clone(),
                            role: Role::Customer,
                            text: context.script_visible.then(|| text.clone()),
                        });
                    }
                    if narrate {
                        self.waiting = Waiting::Narration(step.id.clone());
                        self.push(HostCommand::Speak {
                            step_id: step.id.clone(),
                            text,
                        });
                        if self.paused {
                            self.push(HostCommand::PauseNarration);
                        }
                        return Ok(());
                    }
                    self.player.advance()?;
                }
                Activation::AwaitTrainee { context } => {
                    self.show_step(&step, position, context);
                    let text = match &step.kind {
                        StepKind::Message(message) => message.text.clone(),
                        StepKind::Hotspot(_) => String::new(),
                    };
                    self.push(HostCommand::ShowMessage {
                        step_id: step.id.clone(),
                        role: Role::Trainee,
                        text: context.script_visible.then_some(text),
                    });
                    self.waiting = Waiting::Trainee(step.id.clone());
                    return Ok(());
                }
                Activation::Hotspot { context, .. } => {
                    if let Some(hotspot) = step.as_hotspot() {
                        self.controller.activate(&step.id, hotspot, now);
                        if self.paused {
                            self.controller.pause();
                        }
                    }
                    self.show_step(&step, position, context);
                    self.push_hotspot_ui();
                    return Ok(());
                }
            }
        }
    }

    fn advance(&mut self, now: Timestamp) -> Result<(), EngineError> {
        self.player.advance()?;
        self.enter_step(now)
    }

    fn show_step(&mut self, step: &Step, position: StepPosition, context: StepContext) {
        log::debug!(
            "step {} active at slide {}, step {}",
            step.id,
            position.slide,
            position.step
        );
        self.context = Some(context);
        self.push(HostCommand::ShowStep {
            step_id: step.id.clone(),
            position,
            progress: self.player.progress(),
            context,
        });
        self.push_layout();
    }

    // =========================================================================
    // Images and geometry
    // =========================================================================

    fn ensure_slide_image(&mut self, slide: usize) {
        let Some(image_id) = self.simulation.slides.get(slide).map(|s| s.image_id.clone()) else {
            return;
        };
        if self.current_image.as_ref() == Some(&image_id) {
            return;
        }
        self.release_image();
        self.current_image = Some(image_id.clone());
        self.push(HostCommand::RequestImage { image_id });
    }

    fn release_image(&mut self) {
        if let Some(image_id) = self.current_image.take() {
            self.push(HostCommand::ReleaseImage { image_id });
        }
        self.metrics.clear();
    }

    fn image_loaded(&mut self, image_id: ImageId, natural: Size, rendered: Size) {
        if self.current_image.as_ref() != Some(&image_id) {
            log::debug!("ignoring metrics for image {}: not the current slide", image_id);
            return;
        }
        if !natural.is_usable() {
            log::warn!("image {} reported unusable natural size", image_id);
        }
        self.metrics.set_loaded(natural, rendered);
        self.push_layout();
    }

    pub fn layout(&self) -> Option<SlideLayout> {
        let position = self.player.position()?;
        let slide = self.simulation.slides.get(position.slide)?;
        let active = self
            .controller
            .active_step()
            .zip(self.controller.active_hotspot());
        compute_layout(slide, active, &self.metrics)
    }

    fn push_layout(&mut self) {
        match self.layout() {
            Some(layout) => self.push(HostCommand::Layout { layout }),
            None => log::debug!("layout deferred until image metrics arrive"),
        }
    }

    // =========================================================================
    // Hotspot interaction and timers
    // =========================================================================

    fn interact(&mut self, now: Timestamp, interaction: Interaction) -> Result<(), EngineError> {
        if !self.running()? {
            return Ok(());
        }
        if self.paused {
            return Err(EngineError::Paused);
        }
        let Some(hotspot) = self.controller.active_hotspot() else {
            log::debug!("interaction ignored: no active hotspot");
            return Ok(());
        };

        // Map with the rendered size as it is right now, not as of the last redraw.
        let rect = self.metrics.map(&hotspot.rect);
        let container = self.metrics.rendered();
        let directive = self
            .controller
            .handle(interaction, rect, container, &mut self.log, now)?;
        self.push_hotspot_ui();

        if directive == Directive::Advance {
            self.advance(now)?;
        }
        Ok(())
    }

    fn tick(&mut self, now: Timestamp) -> Result<(), EngineError> {
        if !self.running()? || self.paused {
            return Ok(());
        }
        if self.controller.tick(now, &mut self.log) == Directive::Advance {
            self.push_hotspot_ui();
            self.advance(now)?;
        }
        Ok(())
    }

    fn push_hotspot_ui(&mut self) {
        if let Some(step_id) = self.controller.active_step().cloned() {
            let ui = self.controller.ui().clone();
            self.push(HostCommand::HotspotUi { step_id, ui });
        }
    }

    // =========================================================================
    // Messages, narration, capture
    // =========================================================================

    fn narration_finished(&mut self, now: Timestamp, step_id: StepId) -> Result<(), EngineError> {
        if !self.running()? {
            return Ok(());
        }
        if self.waiting != Waiting::Narration(step_id.clone()) {
            log::debug!("stale narration completion for step {}", step_id);
            return Ok(());
        }
        self.waiting = Waiting::Nothing;
        self.advance(now)
    }

    fn awaiting_trainee(&self) -> Result<StepId, EngineError> {
        match &self.waiting {
            Waiting::Trainee(step_id) => Ok(step_id.clone()),
            _ => {
                let step_id = self
                    .current_step()
                    .map(|s| s.id.clone())
                    .unwrap_or_else(|| StepId::new(""));
                Err(EngineError::invalid(&step_id, "not waiting for a trainee response"))
            }
        }
    }

    fn submit_trainee(&mut self, now: Timestamp, text: String) -> Result<(), EngineError> {
        if !self.running()? {
            return Ok(());
        }
        if self.paused {
            return Err(EngineError::Paused);
        }
        let step_id = self.awaiting_trainee()?;
        if self.capture.step() == Some(&step_id) {
            return Err(EngineError::CaptureInProgress(step_id));
        }
        self.answer(now, step_id, text)
    }

    fn use_suggested(&mut self, now: Timestamp) -> Result<(), EngineError> {
        if !self.running()? {
            return Ok(());
        }
        if self.paused {
            return Err(EngineError::Paused);
        }
        let step_id = self.awaiting_trainee()?;
        if self.capture.step() == Some(&step_id) {
            return Err(EngineError::CaptureInProgress(step_id));
        }
        if !self.context.is_some_and(|c| c.suggestion_available) {
            return Err(EngineError::invalid(&step_id, "suggested response is hidden"));
        }
        let text = match self.current_step().map(|s| &s.kind) {
            Some(StepKind::Message(message)) => message.text.clone(),
            _ => return Err(EngineError::UnknownStep(step_id)),
        };
        self.answer(now, step_id, text)
    }

    fn answer(&mut self, now: Timestamp, step_id: StepId, text: String) -> Result<(), EngineError> {
        log::debug!("trainee answered step {}", step_id);
        self.answers.insert(step_id, text);
        self.waiting = Waiting::Nothing;
        self.advance(now)
    }

    fn start_recording(&mut self) -> Result<(), EngineError> {
        if !self.running()? {
            return Ok(());
        }
        if self.paused {
            return Err(EngineError::Paused);
        }
        let step_id = self.awaiting_trainee()?;
        if !self.config.capabilities.can_capture() {
            return Err(EngineError::invalid(&step_id, "surface cannot capture audio"));
        }
        if self.capture != Capture::Idle {
            return Err(EngineError::invalid(&step_id, "already recording"));
        }
        self.capture = Capture::Recording(step_id.clone());
        self.push(HostCommand::StartCapture { step_id });
        Ok(())
    }

    fn stop_recording(&mut self) -> Result<(), EngineError> {
        if !self.running()? {
            return Ok(());
        }
        let Capture::Recording(step_id) = self.capture.clone() else {
            log::debug!("stop requested with no recording in progress");
            return Ok(());
        };
        self.capture = Capture::Transcribing(step_id.clone());
        self.push(HostCommand::StopCapture {
            step_id,
            keep_transcript: true,
        });
        Ok(())
    }

    /// Transcript (or an empty one after a capture failure) for a recording.
    fn transcript(&mut self, now: Timestamp, step_id: StepId, text: String) -> Result<(), EngineError> {
        if self.capture.step() != Some(&step_id) {
            log::debug!("stale transcript for step {}", step_id);
            return Ok(());
        }
        self.capture = Capture::Idle;

        match self.lifecycle {
            Lifecycle::Finishing => {
                self.answers.insert(step_id, text);
                self.finalize(now)
            }
            Lifecycle::Running if self.waiting == Waiting::Trainee(step_id.clone()) => {
                self.answer(now, step_id, text)
            }
            _ => Ok(()),
        }
    }

    // =========================================================================
    // Pause
    // =========================================================================

    fn pause(&mut self) -> Result<(), EngineError> {
        if !self.running()? || self.paused {
            return Ok(());
        }
        self.paused = true;
        self.controller.pause();
        if matches!(self.waiting, Waiting::Narration(_)) {
            self.push(HostCommand::PauseNarration);
        }
        if matches!(self.capture, Capture::Recording(_))
            && self.config.capabilities.can_pause_capture()
        {
            self.push(HostCommand::PauseCapture);
        }
        log::info!("playback paused");
        Ok(())
    }

    fn resume(&mut self, now: Timestamp) -> Result<(), EngineError> {
        if !self.running()? || !self.paused {
            return Ok(());
        }
        self.paused = false;
        self.controller.resume(now);
        if matches!(self.waiting, Waiting::Narration(_)) {
            self.push(HostCommand::ResumeNarration);
        }
        if matches!(self.capture, Capture::Recording(_))
            && self.config.capabilities.can_pause_capture()
        {
            self.push(HostCommand::ResumeCapture);
        }
        log::info!("playback resumed");
        Ok(())
    }

    // =========================================================================
    // Ending
    // =========================================================================

    /// External "end simulation". Idempotent: a second request while ending is a
    /// soft `DoubleEnd`.
    pub fn request_end(&mut self, now: Timestamp) -> Result<(), EngineError> {
        match self.lifecycle {
            Lifecycle::Ready => return Err(EngineError::NotStarted),
            Lifecycle::Running => {}
            _ => return Err(EngineError::DoubleEnd),
        }
        log::info!("end requested");
        self.lifecycle = Lifecycle::Finishing;

        // A hotspot that never got a disposition is scored as timed out.
        let dangling = self
            .controller
            .active_step()
            .cloned()
            .zip(self.controller.active_hotspot().map(|h| h.hotspot_type));
        if let Some((step_id, hotspot_type)) = dangling {
            if hotspot_type.is_graded() && self.log.ensure_disposition(&step_id) {
                log::info!("synthesized timeout for unfinished step {}", step_id);
            }
        }
        self.controller.deactivate();

        if matches!(self.waiting, Waiting::Narration(_)) {
            self.push(HostCommand::CancelNarration);
        }
        self.waiting = Waiting::Nothing;

        if let Capture::Recording(step_id) | Capture::Transcribing(step_id) = self.capture.clone()
        {
            let keep = self.config.transcribe_on_end;
            if matches!(self.capture, Capture::Recording(_)) {
                self.push(HostCommand::StopCapture {
                    step_id: step_id.clone(),
                    keep_transcript: keep,
                });
            }
            if keep {
                self.capture = Capture::Transcribing(step_id);
                return Ok(());
            }
            self.capture = Capture::Idle;
        }

        self.finalize(now)
    }

    /// Move to `Ended` and submit the attempt. Runs at most once per attempt.
    fn finalize(&mut self, now: Timestamp) -> Result<(), EngineError> {
        self.player.finish();
        if matches!(self.lifecycle, Lifecycle::Scoring | Lifecycle::Completed) {
            return Ok(());
        }

        self.controller.deactivate();
        self.context = None;
        self.waiting = Waiting::Nothing;
        self.ended_at = Some(now);
        self.lifecycle = Lifecycle::Scoring;
        self.release_image();

        debug_assert!(self.log.is_consistent());
        let payload = AttemptPayload {
            attempt_records: self.log.clone(),
            modified_slide_script: modified_script(&self.simulation.slides, &self.answers),
            elapsed_us: now.micros_since(self.started_at),
        };
        log::info!(
            "simulation ended: {} attempt records, submitting for scoring",
            payload.attempt_records.len()
        );
        self.push(HostCommand::SubmitAttempt { payload });
        Ok(())
    }

    fn scoring_finished(&mut self, completion: CompletionState) {
        if self.lifecycle != Lifecycle::Scoring {
            log::warn!("scoring result ignored: no attempt awaiting a score");
            return;
        }
        self.lifecycle = Lifecycle::Completed;
        self.completion = Some(completion.clone());
        self.push(HostCommand::Completed { completion });
    }

    fn push(&mut self, command: HostCommand) {
        self.outbox.push(command);
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            lifecycle: self.lifecycle,
            player: self.player.state(),
            paused: self.paused,
            progress: self.player.progress(),
            current_step: self.current_step().map(|s| s.id.clone()),
            context: self.context,
            ui: self
                .controller
                .active_step()
                .map(|_| self.controller.ui().clone()),
            layout: self.layout(),
            recording: self.capture != Capture::Idle,
            attempt_log: self.log.clone(),
            completion: self.completion.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SurfaceCapabilities;
    use proptest::prelude::*;

    const NATURAL: Size = Size {
        width: 1600.0,
        height: 900.0,
    };
    const RENDERED: Size = Size {
        width: 800.0,
        height: 450.0,
    };

    fn at_secs(secs: f64) -> Timestamp {
        Timestamp::from_micros((secs * 1_000_000.0).round() as u64)
    }

    fn button_step(id: &str) -> Step {
        Step::hotspot(
            id,
            HotspotType::Button,
            AuthoredRect::percent(10.0, 10.0, 20.0, 10.0),
        )
    }

    fn timeout(secs: f64) -> StepSettings {
        StepSettings {
            timeout_duration_seconds: Some(secs),
            ..Default::default()
        }
    }

    fn single(step: Step) -> Simulation {
        Simulation::new(vec![Slide::new("img1", vec![step])])
    }

    fn engine() -> PlaybackEngine {
        PlaybackEngine::new(EngineConfig::default()).unwrap()
    }

    fn voice_engine() -> PlaybackEngine {
        PlaybackEngine::new(EngineConfig::default().with_capabilities(SurfaceCapabilities::voice()))
            .unwrap()
    }

    fn load_image(engine: &mut PlaybackEngine, image: &str, now: Timestamp) {
        engine
            .handle(
                now,
                EngineEvent::ImageLoaded {
                    image_id: ImageId::new(image),
                    natural: NATURAL,
                    rendered: RENDERED,
                },
            )
            .unwrap();
    }

    /// Pointer inside the (10%, 10%, 20%, 10%) rect at 800x450.
    fn click_inside(engine: &mut PlaybackEngine, now: Timestamp) {
        engine
            .handle(
                now,
                EngineEvent::Pointer {
                    x: 120.0,
                    y: 60.0,
                    target: PointerTarget::Background,
                },
            )
            .unwrap();
    }

    fn click_outside(engine: &mut PlaybackEngine, now: Timestamp) {
        engine
            .handle(
                now,
                EngineEvent::Pointer {
                    x: 700.0,
                    y: 400.0,
                    target: PointerTarget::Background,
                },
            )
            .unwrap();
    }

    fn submitted(commands: &[HostCommand]) -> Vec<&AttemptPayload> {
        commands
            .iter()
            .filter_map(|c| match c {
                HostCommand::SubmitAttempt { payload } => Some(payload),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn empty_simulation_is_rejected_without_state() {
        let mut engine = engine();
        let err = engine.start(Simulation::default(), at_secs(0.0)).unwrap_err();
        assert!(matches!(err, EngineError::EmptyContent(_)));
        assert_eq!(engine.lifecycle(), Lifecycle::Ready);
        assert!(engine.drain_commands().is_empty());
    }

    #[test]
    fn button_happy_path() {
        let mut engine = engine();
        engine.start(single(button_step("s1")), at_secs(0.0)).unwrap();
        load_image(&mut engine, "img1", at_secs(0.1));
        click_inside(&mut engine, at_secs(1.0));

        assert_eq!(engine.player_state(), PlayerState::Ended);
        let record = engine.attempt_log().get(&StepId::new("s1")).unwrap();
        assert_eq!(record.is_clicked, Some(true));
        assert_eq!(record.timed_out, None);

        let commands = engine.drain_commands();
        assert_eq!(submitted(&commands).len(), 1);
        assert!(commands.contains(&HostCommand::RequestImage {
            image_id: ImageId::new("img1")
        }));
        assert!(commands.contains(&HostCommand::ReleaseImage {
            image_id: ImageId::new("img1")
        }));
    }

    #[test]
    fn timeout_auto_advances() {
        let mut engine = engine();
        let step = button_step("s1").with_settings(timeout(2.0));
        engine.start(single(step), at_secs(0.0)).unwrap();
        load_image(&mut engine, "img1", at_secs(0.0));

        engine.handle(at_secs(1.9), EngineEvent::Tick).unwrap();
        assert_ne!(engine.player_state(), PlayerState::Ended);
        engine.handle(at_secs(2.0), EngineEvent::Tick).unwrap();

        assert_eq!(engine.player_state(), PlayerState::Ended);
        let record = engine.attempt_log().get(&StepId::new("s1")).unwrap();
        assert_eq!(record.timed_out, Some(true));
        assert_eq!(record.is_clicked, None);
    }

    #[test]
    fn click_on_the_timeout_tick_wins() {
        let mut engine = engine();
        let step = button_step("s1").with_settings(timeout(1.0));
        engine.start(single(step), at_secs(0.0)).unwrap();
        load_image(&mut engine, "img1", at_secs(0.0));

        click_inside(&mut engine, at_secs(1.0));
        engine.handle(at_secs(1.0), EngineEvent::Tick).unwrap();

        let record = engine.attempt_log().get(&StepId::new("s1")).unwrap();
        assert_eq!(record.is_clicked, Some(true));
        assert_eq!(record.timed_out, None);
        assert_eq!(submitted(&engine.drain_commands()).len(), 1);
    }

    #[test]
    fn hidden_highlight_is_skipped() {
        let mut engine = engine();
        let simulation = Simulation::new(vec![Slide::new(
            "img1",
            vec![Step::hotspot(
                "h1",
                HotspotType::Highlight,
                AuthoredRect::percent(0.0, 0.0, 5.0, 5.0),
            )],
        )])
        .with_level_settings(LevelSettings {
            hide_highlights: true,
            ..Default::default()
        });
        engine.start(simulation, at_secs(0.0)).unwrap();

        assert_eq!(engine.player_state(), PlayerState::Ended);
        assert!(engine.attempt_log().is_empty());
        assert_eq!(submitted(&engine.drain_commands()).len(), 1);
    }

    #[test]
    fn coaching_tip_timeout_is_recorded() {
        let mut engine = engine();
        let step = Step::hotspot(
            "tip",
            HotspotType::Coaching,
            AuthoredRect::percent(40.0, 40.0, 20.0, 10.0),
        )
        .with_settings(timeout(1.0));
        engine.start(single(step), at_secs(0.0)).unwrap();
        engine.handle(at_secs(1.0), EngineEvent::Tick).unwrap();

        assert_eq!(engine.player_state(), PlayerState::Ended);
        let commands = engine.drain_commands();
        let payload = submitted(&commands)[0];
        let json = serde_json::to_value(&payload.attempt_records).unwrap();
        assert_eq!(json, serde_json::json!({"tip": {"timedOut": true, "wrongClicks": []}}));
    }

    #[test]
    fn dismissed_coaching_tip_leaves_no_record() {
        let mut engine = engine();
        let step = Step::hotspot(
            "tip",
            HotspotType::Coaching,
            AuthoredRect::percent(40.0, 40.0, 20.0, 10.0),
        )
        .with_settings(timeout(1.0));
        engine.start(single(step), at_secs(0.0)).unwrap();
        click_outside(&mut engine, at_secs(0.5));
        engine.handle(at_secs(1.0), EngineEvent::Tick).unwrap();

        assert_eq!(engine.player_state(), PlayerState::Ended);
        assert!(engine.attempt_log().is_empty());
    }

    #[test]
    fn dropdown_without_advance_on_select_stays_active() {
        let mut engine = engine();
        let step = Step::hotspot(
            "d1",
            HotspotType::Dropdown,
            AuthoredRect::percent(10.0, 10.0, 20.0, 10.0),
        )
        .with_settings(StepSettings {
            options: vec!["A".into(), "B".into()],
            ..Default::default()
        });
        engine.start(single(step), at_secs(0.0)).unwrap();
        load_image(&mut engine, "img1", at_secs(0.0));

        engine
            .handle(at_secs(1.0), EngineEvent::DropdownSelect { option: "B".into() })
            .unwrap();
        assert_eq!(
            engine.player_state(),
            PlayerState::StepActive { slide: 0, step: 0 }
        );
        let record = engine.attempt_log().get(&StepId::new("d1")).unwrap();
        assert_eq!(record.user_input.as_deref(), Some("B"));
        assert_eq!(record.is_clicked, None);

        engine.handle(at_secs(2.0), EngineEvent::Continue).unwrap();
        assert_eq!(engine.player_state(), PlayerState::Ended);
    }

    #[test]
    fn dropdown_misses_are_not_wrong_clicks() {
        let mut engine = engine();
        let step = Step::hotspot(
            "d1",
            HotspotType::Dropdown,
            AuthoredRect::percent(10.0, 10.0, 20.0, 10.0),
        );
        engine.start(single(step), at_secs(0.0)).unwrap();
        load_image(&mut engine, "img1", at_secs(0.0));
        click_outside(&mut engine, at_secs(1.0));
        click_outside(&mut engine, at_secs(1.1));
        assert!(engine.attempt_log().get(&StepId::new("d1")).is_none());
    }

    #[test]
    fn pointer_before_image_metrics_is_ignored() {
        let mut engine = engine();
        engine.start(single(button_step("s1")), at_secs(0.0)).unwrap();
        click_outside(&mut engine, at_secs(0.5));
        assert!(engine.attempt_log().is_empty());
        assert!(engine.snapshot().layout.is_none());

        load_image(&mut engine, "img1", at_secs(1.0));
        let commands = engine.drain_commands();
        assert!(commands
            .iter()
            .any(|c| matches!(c, HostCommand::Layout { layout } if layout.hotspot.is_some())));
    }

    #[test]
    fn pointer_uses_current_rendered_size() {
        let mut engine = engine();
        engine.start(single(button_step("s1")), at_secs(0.0)).unwrap();
        load_image(&mut engine, "img1", at_secs(0.0));
        // Double the rendered size: the hotspot moves to (160, 90)..(480, 180).
        engine
            .handle(
                at_secs(0.5),
                EngineEvent::Resized {
                    rendered: Size::new(1600.0, 900.0),
                },
            )
            .unwrap();
        // (120, 60) was inside at 800x450 but is outside now.
        click_inside(&mut engine, at_secs(1.0));
        let record = engine.attempt_log().get(&StepId::new("s1")).unwrap();
        assert_eq!(record.wrong_clicks.len(), 1);
        assert_eq!(record.is_clicked, None);

        engine
            .handle(
                at_secs(1.5),
                EngineEvent::Pointer {
                    x: 300.0,
                    y: 120.0,
                    target: PointerTarget::Background,
                },
            )
            .unwrap();
        let record = engine.attempt_log().get(&StepId::new("s1")).unwrap();
        assert!(record.clicked());
        assert_eq!(record.wrong_clicks.len(), 1);
    }

    #[test]
    fn resize_jitter_does_not_relayout() {
        let mut engine = engine();
        engine.start(single(button_step("s1")), at_secs(0.0)).unwrap();
        load_image(&mut engine, "img1", at_secs(0.0));
        engine.drain_commands();
        engine
            .handle(
                at_secs(0.1),
                EngineEvent::Resized {
                    rendered: Size::new(800.2, 450.0),
                },
            )
            .unwrap();
        assert!(engine.drain_commands().is_empty());
    }

    #[test]
    fn stale_image_metrics_are_ignored() {
        let mut engine = engine();
        engine.start(single(button_step("s1")), at_secs(0.0)).unwrap();
        load_image(&mut engine, "other", at_secs(0.0));
        assert!(engine.snapshot().layout.is_none());
    }

    #[test]
    fn slide_change_releases_previous_image() {
        let mut engine = engine();
        let simulation = Simulation::new(vec![
            Slide::new("img1", vec![button_step("s1")]),
            Slide::new("img2", vec![button_step("s2")]),
        ]);
        engine.start(simulation, at_secs(0.0)).unwrap();
        load_image(&mut engine, "img1", at_secs(0.0));
        engine.drain_commands();
        click_inside(&mut engine, at_secs(1.0));

        let commands = engine.drain_commands();
        let release = commands
            .iter()
            .position(|c| {
                *c == HostCommand::ReleaseImage {
                    image_id: ImageId::new("img1"),
                }
            })
            .unwrap();
        let request = commands
            .iter()
            .position(|c| {
                *c == HostCommand::RequestImage {
                    image_id: ImageId::new("img2"),
                }
            })
            .unwrap();
        assert!(release < request);
        // The new slide has no metrics yet.
        assert!(engine.snapshot().layout.is_none());
    }

    #[test]
    fn customer_message_waits_for_narration_on_voice_surface() {
        let mut engine = voice_engine();
        let simulation = single(Step::message("c1", Role::Customer, "Hello"));
        engine.start(simulation, at_secs(0.0)).unwrap();

        let commands = engine.drain_commands();
        assert!(commands.contains(&HostCommand::Speak {
            step_id: StepId::new("c1"),
            text: "Hello".into()
        }));
        assert_eq!(
            engine.player_state(),
            PlayerState::StepActive { slide: 0, step: 0 }
        );

        // Stale completion for another step does nothing.
        engine
            .handle(
                at_secs(1.0),
                EngineEvent::NarrationFinished {
                    step_id: StepId::new("other"),
                },
            )
            .unwrap();
        assert_ne!(engine.player_state(), PlayerState::Ended);

        engine
            .handle(
                at_secs(2.0),
                EngineEvent::NarrationFinished {
                    step_id: StepId::new("c1"),
                },
            )
            .unwrap();
        assert_eq!(engine.player_state(), PlayerState::Ended);
    }

    #[test]
    fn customer_message_advances_immediately_on_text_surface() {
        let mut engine = engine();
        let simulation = Simulation::new(vec![Slide::new(
            "img1",
            vec![
                Step::message("c1", Role::Customer, "Hello"),
                Step::message("t1", Role::Trainee, "Hi, how can I help?"),
            ],
        )]);
        engine.start(simulation, at_secs(0.0)).unwrap();
        assert_eq!(
            engine.player_state(),
            PlayerState::StepActive { slide: 0, step: 1 }
        );
        let commands = engine.drain_commands();
        assert!(commands.contains(&HostCommand::ShowMessage {
            step_id: StepId::new("c1"),
            role: Role::Customer,
            text: Some("Hello".into()),
        }));
    }

    #[test]
    fn hidden_customer_script_shows_no_text() {
        let mut engine = engine();
        let simulation = single(Step::message("c1", Role::Customer, "Hello")).with_level_settings(
            LevelSettings {
                hide_customer_script: true,
                ..Default::default()
            },
        );
        engine.start(simulation, at_secs(0.0)).unwrap();
        let commands = engine.drain_commands();
        assert!(commands.contains(&HostCommand::ShowMessage {
            step_id: StepId::new("c1"),
            role: Role::Customer,
            text: None,
        }));
    }

    #[test]
    fn trainee_answer_is_substituted_into_script() {
        let mut engine = engine();
        let simulation = single(Step::message("t1", Role::Trainee, "Suggested line"));
        engine.start(simulation, at_secs(0.0)).unwrap();
        engine
            .handle(
                at_secs(3.0),
                EngineEvent::TraineeSubmit {
                    text: "My own words".into(),
                },
            )
            .unwrap();

        assert_eq!(engine.player_state(), PlayerState::Ended);
        let commands = engine.drain_commands();
        let payload = submitted(&commands)[0];
        assert_eq!(
            payload.modified_slide_script[0].sequence[0],
            Step::message("t1", Role::Trainee, "My own words")
        );
        assert!(payload.attempt_records.is_empty());
        assert_eq!(payload.elapsed_us, 3_000_000);
    }

    #[test]
    fn suggested_response_is_rejected_when_script_hidden() {
        let mut engine = engine();
        let simulation = single(Step::message("t1", Role::Trainee, "Suggested line"))
            .with_level_settings(LevelSettings {
                hide_agent_script: true,
                ..Default::default()
            });
        engine.start(simulation, at_secs(0.0)).unwrap();
        engine
            .handle(at_secs(1.0), EngineEvent::UseSuggestedResponse)
            .unwrap();
        assert_ne!(engine.player_state(), PlayerState::Ended);
    }

    #[test]
    fn suggested_response_submits_authored_text() {
        let mut engine = engine();
        engine
            .start(single(Step::message("t1", Role::Trainee, "Suggested line")), at_secs(0.0))
            .unwrap();
        engine
            .handle(at_secs(1.0), EngineEvent::UseSuggestedResponse)
            .unwrap();
        let commands = engine.drain_commands();
        let payload = submitted(&commands)[0];
        assert_eq!(
            payload.modified_slide_script[0].sequence[0],
            Step::message("t1", Role::Trainee, "Suggested line")
        );
    }

    #[test]
    fn recording_drives_trainee_step() {
        let mut engine = voice_engine();
        engine
            .start(single(Step::message("t1", Role::Trainee, "Line")), at_secs(0.0))
            .unwrap();
        engine.handle(at_secs(1.0), EngineEvent::StartRecording).unwrap();

        // Typed submission is blocked while the recording is in flight.
        let err = engine
            .handle(at_secs(1.5), EngineEvent::TraineeSubmit { text: "typed".into() })
            .unwrap_err();
        assert!(matches!(err, EngineError::CaptureInProgress(_)));

        engine.handle(at_secs(4.0), EngineEvent::StopRecording).unwrap();
        assert_ne!(engine.player_state(), PlayerState::Ended);
        engine
            .handle(
                at_secs(4.5),
                EngineEvent::TranscriptReady {
                    step_id: StepId::new("t1"),
                    text: "spoken words".into(),
                },
            )
            .unwrap();
        assert_eq!(engine.player_state(), PlayerState::Ended);

        let commands = engine.drain_commands();
        assert!(commands.contains(&HostCommand::StopCapture {
            step_id: StepId::new("t1"),
            keep_transcript: true
        }));
        let payload = submitted(&commands)[0];
        assert_eq!(
            payload.modified_slide_script[0].sequence[0],
            Step::message("t1", Role::Trainee, "spoken words")
        );
    }

    #[test]
    fn capture_failure_proceeds_with_empty_transcript() {
        let mut engine = voice_engine();
        engine
            .start(single(Step::message("t1", Role::Trainee, "Line")), at_secs(0.0))
            .unwrap();
        engine.handle(at_secs(1.0), EngineEvent::StartRecording).unwrap();
        engine
            .handle(
                at_secs(2.0),
                EngineEvent::CaptureFailed {
                    step_id: StepId::new("t1"),
                    message: "microphone lost".into(),
                },
            )
            .unwrap();
        assert_eq!(engine.player_state(), PlayerState::Ended);
        let commands = engine.drain_commands();
        assert_eq!(
            submitted(&commands)[0].modified_slide_script[0].sequence[0],
            Step::message("t1", Role::Trainee, "")
        );
    }

    #[test]
    fn recording_requires_capture_capability() {
        let mut engine = engine();
        engine
            .start(single(Step::message("t1", Role::Trainee, "Line")), at_secs(0.0))
            .unwrap();
        engine.drain_commands();
        engine.handle(at_secs(1.0), EngineEvent::StartRecording).unwrap();
        assert!(engine.drain_commands().is_empty());
        assert!(!engine.snapshot().recording);
    }

    #[test]
    fn early_end_synthesizes_timeout_for_dangling_hotspot() {
        let mut engine = engine();
        let simulation = Simulation::new(vec![Slide::new(
            "img1",
            vec![button_step("s1"), button_step("s2")],
        )]);
        engine.start(simulation, at_secs(0.0)).unwrap();
        load_image(&mut engine, "img1", at_secs(0.0));
        click_inside(&mut engine, at_secs(1.0));
        click_outside(&mut engine, at_secs(2.0));

        engine.handle(at_secs(3.0), EngineEvent::EndRequested).unwrap();
        assert_eq!(engine.player_state(), PlayerState::Ended);

        let commands = engine.drain_commands();
        let payloads = submitted(&commands);
        assert_eq!(payloads.len(), 1);
        let s1 = payloads[0].attempt_records.get(&StepId::new("s1")).unwrap();
        assert!(s1.clicked());
        let s2 = payloads[0].attempt_records.get(&StepId::new("s2")).unwrap();
        assert!(s2.timed_out());
        assert_eq!(s2.is_clicked, None);
        assert_eq!(s2.wrong_clicks.len(), 1);
    }

    #[test]
    fn double_end_is_ignored() {
        let mut engine = engine();
        engine.start(single(button_step("s1")), at_secs(0.0)).unwrap();
        engine.handle(at_secs(1.0), EngineEvent::EndRequested).unwrap();
        engine.handle(at_secs(1.1), EngineEvent::EndRequested).unwrap();
        assert!(matches!(
            engine.request_end(at_secs(1.2)),
            Err(EngineError::DoubleEnd)
        ));
        assert_eq!(submitted(&engine.drain_commands()).len(), 1);
    }

    #[test]
    fn end_while_recording_waits_for_transcript() {
        let mut engine = voice_engine();
        engine
            .start(single(Step::message("t1", Role::Trainee, "Line")), at_secs(0.0))
            .unwrap();
        engine.handle(at_secs(1.0), EngineEvent::StartRecording).unwrap();
        engine.drain_commands();

        engine.handle(at_secs(2.0), EngineEvent::EndRequested).unwrap();
        assert_eq!(engine.lifecycle(), Lifecycle::Finishing);
        // Second end while the transcript is pending is ignored, not queued.
        engine.handle(at_secs(2.1), EngineEvent::EndRequested).unwrap();
        let commands = engine.drain_commands();
        assert!(submitted(&commands).is_empty());
        assert!(commands.contains(&HostCommand::StopCapture {
            step_id: StepId::new("t1"),
            keep_transcript: true
        }));

        engine
            .handle(
                at_secs(2.5),
                EngineEvent::TranscriptReady {
                    step_id: StepId::new("t1"),
                    text: "partial answer".into(),
                },
            )
            .unwrap();
        assert_eq!(engine.lifecycle(), Lifecycle::Scoring);
        let commands = engine.drain_commands();
        let payloads = submitted(&commands);
        assert_eq!(payloads.len(), 1);
        assert_eq!(
            payloads[0].modified_slide_script[0].sequence[0],
            Step::message("t1", Role::Trainee, "partial answer")
        );
    }

    #[test]
    fn end_while_recording_can_discard() {
        let mut config = EngineConfig::default().with_capabilities(SurfaceCapabilities::voice());
        config.transcribe_on_end = false;
        let mut engine = PlaybackEngine::new(config).unwrap();
        engine
            .start(single(Step::message("t1", Role::Trainee, "Line")), at_secs(0.0))
            .unwrap();
        engine.handle(at_secs(1.0), EngineEvent::StartRecording).unwrap();
        engine.handle(at_secs(2.0), EngineEvent::EndRequested).unwrap();

        let commands = engine.drain_commands();
        assert!(commands.contains(&HostCommand::StopCapture {
            step_id: StepId::new("t1"),
            keep_transcript: false
        }));
        assert_eq!(submitted(&commands).len(), 1);
        assert_eq!(engine.lifecycle(), Lifecycle::Scoring);
    }

    #[test]
    fn scoring_failure_completes_without_score() {
        let mut engine = engine();
        engine.start(single(button_step("s1")), at_secs(10.0)).unwrap();
        engine.handle(at_secs(25.0), EngineEvent::EndRequested).unwrap();
        engine
            .handle(
                at_secs(26.0),
                EngineEvent::ScoringFailed {
                    message: "502 Bad Gateway".into(),
                },
            )
            .unwrap();
        assert_eq!(engine.lifecycle(), Lifecycle::Completed);
        match engine.completion().unwrap() {
            CompletionState::Scoreless { elapsed_us, .. } => {
                assert_eq!(*elapsed_us, 15_000_000)
            }
            other => panic!("expected scoreless completion, got {:?}", other),
        }
    }

    #[test]
    fn scoring_success_completes() {
        let mut engine = engine();
        engine.start(single(button_step("s1")), at_secs(0.0)).unwrap();
        engine.handle(at_secs(5.0), EngineEvent::EndRequested).unwrap();
        let summary = ScoreSummary {
            final_score: 80.0,
            sub_scores: BTreeMap::new(),
            duration_secs: 5.0,
        };
        engine
            .handle(at_secs(6.0), EngineEvent::ScoringSucceeded { summary })
            .unwrap();
        assert!(engine.completion().unwrap().is_scored());
        // A completed attempt can be restarted.
        engine.start(single(button_step("s1")), at_secs(7.0)).unwrap();
        assert!(engine.attempt_log().is_empty());
        assert_eq!(engine.lifecycle(), Lifecycle::Running);
    }

    #[test]
    fn pause_rearms_timeout_with_full_duration() {
        let mut engine = engine();
        let step = button_step("s1").with_settings(timeout(2.0));
        engine.start(single(step), at_secs(0.0)).unwrap();
        load_image(&mut engine, "img1", at_secs(0.0));

        engine.handle(at_secs(1.5), EngineEvent::Pause).unwrap();
        engine.handle(at_secs(3.0), EngineEvent::Tick).unwrap();
        // Clicks are not accepted while paused.
        click_inside(&mut engine, at_secs(3.5));
        assert!(engine.attempt_log().is_empty());

        engine.handle(at_secs(10.0), EngineEvent::Resume).unwrap();
        engine.handle(at_secs(11.9), EngineEvent::Tick).unwrap();
        assert_ne!(engine.player_state(), PlayerState::Ended);
        engine.handle(at_secs(12.0), EngineEvent::Tick).unwrap();
        assert_eq!(engine.player_state(), PlayerState::Ended);
        assert!(engine
            .attempt_log()
            .get(&StepId::new("s1"))
            .unwrap()
            .timed_out());
    }

    #[test]
    fn pause_suspends_narration_and_capture() {
        let mut engine = voice_engine();
        let simulation = Simulation::new(vec![Slide::new(
            "img1",
            vec![
                Step::message("c1", Role::Customer, "Hello"),
                Step::message("t1", Role::Trainee, "Hi"),
            ],
        )]);
        engine.start(simulation, at_secs(0.0)).unwrap();
        engine.handle(at_secs(0.5), EngineEvent::Pause).unwrap();
        engine.handle(at_secs(1.0), EngineEvent::Resume).unwrap();
        engine
            .handle(
                at_secs(2.0),
                EngineEvent::NarrationFinished {
                    step_id: StepId::new("c1"),
                },
            )
            .unwrap();
        engine.handle(at_secs(3.0), EngineEvent::StartRecording).unwrap();
        engine.handle(at_secs(4.0), EngineEvent::Pause).unwrap();

        let commands = engine.drain_commands();
        assert!(commands.contains(&HostCommand::PauseNarration));
        assert!(commands.contains(&HostCommand::ResumeNarration));
        assert!(commands.contains(&HostCommand::PauseCapture));
        assert!(engine.attempt_log().is_empty());
    }

    #[test]
    fn checkbox_advances_after_delay() {
        let mut engine = engine();
        let step = Step::hotspot(
            "c1",
            HotspotType::Checkbox,
            AuthoredRect::percent(10.0, 10.0, 20.0, 10.0),
        );
        engine.start(single(step), at_secs(0.0)).unwrap();
        load_image(&mut engine, "img1", at_secs(0.0));
        click_inside(&mut engine, at_secs(1.0));
        assert_eq!(engine.snapshot().ui.map(|ui| ui.checked), Some(true));
        engine.handle(at_secs(1.7), EngineEvent::Tick).unwrap();
        assert_ne!(engine.player_state(), PlayerState::Ended);
        engine.handle(at_secs(1.8), EngineEvent::Tick).unwrap();
        assert_eq!(engine.player_state(), PlayerState::Ended);
    }

    #[test]
    fn textfield_submission() {
        let mut engine = engine();
        let step = Step::hotspot(
            "t1",
            HotspotType::Textfield,
            AuthoredRect::percent(10.0, 10.0, 20.0, 10.0),
        );
        engine.start(single(step), at_secs(0.0)).unwrap();
        engine
            .handle(at_secs(1.0), EngineEvent::TextInput { text: "ACME-42".into() })
            .unwrap();
        engine
            .handle(
                at_secs(2.0),
                EngineEvent::KeyPress {
                    key: "Enter".into(),
                    modifiers: Modifiers::default(),
                },
            )
            .unwrap();
        assert_eq!(engine.player_state(), PlayerState::Ended);
        let record = engine.attempt_log().get(&StepId::new("t1")).unwrap();
        assert_eq!(record.user_input.as_deref(), Some("ACME-42"));
    }

    #[test]
    fn masks_are_laid_out_with_the_slide() {
        let mut engine = engine();
        let mut slide = Slide::new("img1", vec![button_step("s1")]);
        slide.masking.push(MaskRegion {
            id: None,
            rect: AuthoredRect::absolute(160.0, 90.0, 320.0, 90.0),
        });
        engine.start(Simulation::new(vec![slide]), at_secs(0.0)).unwrap();
        load_image(&mut engine, "img1", at_secs(0.0));
        let layout = engine.snapshot().layout.unwrap();
        assert_eq!(layout.masks, vec![ScreenRect::new(80.0, 45.0, 160.0, 45.0)]);
        assert_eq!(
            layout.hotspot.unwrap().rect,
            ScreenRect::new(80.0, 45.0, 160.0, 45.0)
        );
    }

    #[test]
    fn events_before_start_are_errors() {
        let mut engine = engine();
        assert!(matches!(
            engine.handle(at_secs(0.0), EngineEvent::Tick),
            Err(EngineError::NotStarted)
        ));
    }

    #[test]
    fn event_json_round_trip() {
        let event: EngineEvent =
            serde_json::from_str(r#"{"type":"Pointer","x":10.5,"y":20}"#).unwrap();
        assert_eq!(
            event,
            EngineEvent::Pointer {
                x: 10.5,
                y: 20.0,
                target: PointerTarget::Background
            }
        );
        let event: EngineEvent =
            serde_json::from_str(r#"{"type":"KeyPress","key":"Enter"}"#).unwrap();
        assert!(matches!(event, EngineEvent::KeyPress { .. }));
    }

    mod property_tests {
        use super::*;

        #[derive(Debug, Clone)]
        enum Action {
            ClickInside,
            ClickOutside,
            Tick(u64),
            End,
        }

        fn action_strategy() -> impl Strategy<Value = Action> {
            prop_oneof![
                Just(Action::ClickInside),
                Just(Action::ClickOutside),
                (0u64..3_000_000).prop_map(Action::Tick),
                Just(Action::End),
            ]
        }

        proptest! {
            /// Whatever the trainee does, no record ends up clicked and timed out,
            /// and the attempt is submitted at most once.
            #[test]
            fn records_stay_exclusive_and_submit_once(
                steps in 1usize..5,
                actions in prop::collection::vec(action_strategy(), 0..30),
            ) {
                let sequence = (0..steps)
                    .map(|i| button_step(&format!("s{}", i)).with_settings(timeout(1.0)))
                    .collect();
                let mut engine = engine();
                engine
                    .start(Simulation::new(vec![Slide::new("img1", sequence)]), Timestamp::from_micros(0))
                    .unwrap();
                load_image(&mut engine, "img1", Timestamp::from_micros(0));

                let mut now = 0u64;
                let mut submissions = 0;
                for action in actions {
                    now += 100_000;
                    let ts = Timestamp::from_micros(now);
                    match action {
                        Action::ClickInside => click_inside(&mut engine, ts),
                        Action::ClickOutside => click_outside(&mut engine, ts),
                        Action::Tick(dt) => {
                            now += dt;
                            engine.handle(Timestamp::from_micros(now), EngineEvent::Tick).unwrap();
                        }
                        Action::End => engine.handle(ts, EngineEvent::EndRequested).unwrap(),
                    }
                    submissions += submitted(&engine.drain_commands()).len();
                    prop_assert!(engine.attempt_log().is_consistent());
                }
                prop_assert!(submissions <= 1);
                if engine.player_state() == PlayerState::Ended {
                    prop_assert_eq!(submissions, 1);
                }
            }

            /// With nothing hidden, sum(k_i) resolved steps reach Ended.
            #[test]
            fn clicking_every_step_ends_the_simulation(
                shape in prop::collection::vec(1usize..4, 1..4)
            ) {
                let slides = shape
                    .iter()
                    .enumerate()
                    .map(|(s, &len)| {
                        let steps = (0..len).map(|i| button_step(&format!("s{}_{}", s, i))).collect();
                        Slide::new("img1", steps)
                    })
                    .collect();
                let mut engine = engine();
                engine.start(Simulation::new(slides), Timestamp::from_micros(0)).unwrap();
                load_image(&mut engine, "img1", Timestamp::from_micros(0));

                let total: usize = shape.iter().sum();
                for i in 0..total {
                    prop_assert!(engine.player_state() != PlayerState::Ended, "ended after {} clicks", i);
                    click_inside(&mut engine, Timestamp::from_micros(i as u64 + 1));
                }
                prop_assert_eq!(engine.player_state(), PlayerState::Ended);
                prop_assert_eq!(engine.attempt_log().len(), total);
            }
        }
    }
}
