// Hotspot controller: per-type interaction rules, timeouts, and attempt-log mutations.
// Every interaction takes the armed timer out before anything else runs, so a
// timeout can never fire in the middle of (or alongside) a genuine interaction.

use serde::{Deserialize, Serialize};

use crate::attempt::{AttemptLog, WrongClick};
use crate::error::EngineError;
use crate::timer::{StepTimer, TimerPurpose, TimerSlot};
use crate::types::*;

/// Where a pointer event landed, as reported by the host's hit test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum PointerTarget {
    /// On the hotspot's own rendered element.
    Hotspot,
    /// Anywhere else in the image container.
    #[default]
    Background,
}

/// Keyboard modifier state for a key press.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Modifiers {
    #[serde(default)]
    pub shift: bool,
    #[serde(default)]
    pub ctrl: bool,
    #[serde(default)]
    pub alt: bool,
    #[serde(default)]
    pub meta: bool,
}

impl Modifiers {
    pub fn any(&self) -> bool {
        self.shift || self.ctrl || self.alt || self.meta
    }
}

/// User input directed at the active hotspot.
#[derive(Debug, Clone, PartialEq)]
pub enum Interaction {
    Pointer { point: Point, target: PointerTarget },
    DropdownSelect { option: String },
    TextInput { text: String },
    KeyPress { key: String, modifiers: Modifiers },
    Continue,
}

/// What the engine should do after the controller handled an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    Stay,
    Advance,
}

/// Transient UI flags for the active hotspot. Never carried over between steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct StepUi {
    pub dropdown_open: bool,
    pub checked: bool,
    pub draft: String,
    pub highlight_visible: bool,
    pub coaching_visible: bool,
    /// The step has its disposition and only waits for the advance.
    pub resolved: bool,
}

#[derive(Debug, Clone)]
struct ActiveHotspot {
    step_id: StepId,
    hotspot: HotspotStep,
}

enum Outcome {
    /// Step resolved; the cancelled timer stays cancelled.
    Resolved(Directive),
    /// Nothing decisive happened; the timer is put back as it was.
    Unresolved,
}

/// Applies hotspot interaction contracts to the attempt log.
#[derive(Debug, Clone)]
pub struct HotspotController {
    checkbox_delay_us: u64,
    submit_key: String,
    active: Option<ActiveHotspot>,
    ui: StepUi,
    timer: TimerSlot,
}

impl HotspotController {
    pub fn new(checkbox_delay_us: u64, submit_key: impl Into<String>) -> Self {
        HotspotController {
            checkbox_delay_us,
            submit_key: submit_key.into(),
            active: None,
            ui: StepUi::default(),
            timer: TimerSlot::new(),
        }
    }

    pub fn ui(&self) -> &StepUi {
        &self.ui
    }

    pub fn active_step(&self) -> Option<&StepId> {
        self.active.as_ref().map(|a| &a.step_id)
    }

    pub fn active_hotspot(&self) -> Option<&HotspotStep> {
        self.active.as_ref().map(|a| &a.hotspot)
    }

    pub fn armed_timer(&self) -> Option<&StepTimer> {
        self.timer.active()
    }

    /// Make `hotspot` the active step: fresh UI flags, timeout armed if configured.
    pub fn activate(&mut self, step_id: &StepId, hotspot: &HotspotStep, now: Timestamp) {
        self.deactivate();
        self.ui = StepUi {
            highlight_visible: true,
            coaching_visible: hotspot.hotspot_type == HotspotType::Coaching,
            ..StepUi::default()
        };
        if let Some(timeout_us) = hotspot.settings.timeout_micros() {
            self.timer.arm(step_id, TimerPurpose::Timeout, timeout_us, now);
        }
        self.active = Some(ActiveHotspot {
            step_id: step_id.clone(),
            hotspot: hotspot.clone(),
        });
    }

    /// Leave the active step: cancel its timer and drop every transient flag.
    pub fn deactivate(&mut self) {
        self.timer.cancel();
        self.active = None;
        self.ui = StepUi::default();
    }

    pub fn pause(&mut self) {
        self.timer.suspend();
    }

    pub fn resume(&mut self, now: Timestamp) {
        self.timer.resume(now);
    }

    /// Handle one interaction. `rect` must be freshly mapped for the current
    /// rendered size; `container` is the rendered image size.
    pub fn handle(
        &mut self,
        interaction: Interaction,
        rect: Option<ScreenRect>,
        container: Option<Size>,
        log: &mut AttemptLog,
        now: Timestamp,
    ) -> Result<Directive, EngineError> {
        let pending = self.timer.cancel();
        let result = self.apply(interaction, rect, container, log, now);
        match result {
            Ok(Outcome::Resolved(directive)) => Ok(directive),
            Ok(Outcome::Unresolved) => {
                if let Some(timer) = pending {
                    self.timer.restore(timer);
                }
                Ok(Directive::Stay)
            }
            Err(err) => {
                if let Some(timer) = pending {
                    self.timer.restore(timer);
                }
                Err(err)
            }
        }
    }

    /// Fire a due timer, if any.
    pub fn tick(&mut self, now: Timestamp, log: &mut AttemptLog) -> Directive {
        let Some(active) = &self.active else {
            return Directive::Stay;
        };
        let Some(timer) = self.timer.take_due(now, &active.step_id) else {
            return Directive::Stay;
        };

        match timer.purpose {
            TimerPurpose::Timeout => {
                log::info!("step {} timed out", active.step_id);
                log.mark_timed_out(&active.step_id);
                self.ui.highlight_visible = false;
                self.ui.dropdown_open = false;
                self.ui.coaching_visible = false;
                self.ui.resolved = true;
                Directive::Advance
            }
            TimerPurpose::DelayedAdvance => Directive::Advance,
        }
    }

    fn apply(
        &mut self,
        interaction: Interaction,
        rect: Option<ScreenRect>,
        container: Option<Size>,
        log: &mut AttemptLog,
        now: Timestamp,
    ) -> Result<Outcome, EngineError> {
        let Some(active) = &self.active else {
            return Ok(Outcome::Unresolved);
        };
        let step_id = active.step_id.clone();
        let hotspot_type = active.hotspot.hotspot_type;

        // A resolved dropdown still accepts a new choice or an explicit continue.
        if self.ui.resolved && hotspot_type != HotspotType::Dropdown {
            return Ok(Outcome::Unresolved);
        }

        match interaction {
            Interaction::Pointer { point, target } => {
                self.pointer(&step_id, hotspot_type, point, target, rect, container, log, now)
            }
            Interaction::DropdownSelect { option } => {
                if hotspot_type != HotspotType::Dropdown {
                    return Err(EngineError::invalid(&step_id, "not a dropdown step"));
                }
                let settings = &active.hotspot.settings;
                if !settings.options.is_empty() && !settings.options.contains(&option) {
                    return Err(EngineError::invalid(
                        &step_id,
                        format!("'{}' is not one of the offered options", option),
                    ));
                }
                let advance = settings.advances_on_select();
                log.set_user_input(&step_id, option);
                self.ui.dropdown_open = false;
                self.ui.highlight_visible = false;
                self.ui.resolved = true;
                Ok(Outcome::Resolved(if advance {
                    Directive::Advance
                } else {
                    Directive::Stay
                }))
            }
            Interaction::TextInput { text } => {
                if hotspot_type != HotspotType::Textfield {
                    return Err(EngineError::invalid(&step_id, "not a text field step"));
                }
                self.ui.draft = text;
                Ok(Outcome::Unresolved)
            }
            Interaction::KeyPress { key, modifiers } => {
                if hotspot_type != HotspotType::Textfield
                    || key != self.submit_key
                    || modifiers.any()
                {
                    return Ok(Outcome::Unresolved);
                }
                log.set_user_input(&step_id, self.ui.draft.clone());
                self.ui.highlight_visible = false;
                self.ui.resolved = true;
                Ok(Outcome::Resolved(Directive::Advance))
            }
            Interaction::Continue => {
                if hotspot_type == HotspotType::Dropdown && self.ui.resolved {
                    Ok(Outcome::Resolved(Directive::Advance))
                } else {
                    Err(EngineError::invalid(&step_id, "step is not resolved yet"))
                }
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn pointer(
        &mut self,
        step_id: &StepId,
        hotspot_type: HotspotType,
        point: Point,
        target: PointerTarget,
        rect: Option<ScreenRect>,
        container: Option<Size>,
        log: &mut AttemptLog,
        now: Timestamp,
    ) -> Result<Outcome, EngineError> {
        if hotspot_type == HotspotType::Coaching {
            // Any click dismisses a tip. Not graded.
            self.ui.coaching_visible = false;
            self.ui.resolved = true;
            return Ok(Outcome::Resolved(Directive::Advance));
        }

        let hit = match (target, rect) {
            (PointerTarget::Hotspot, _) => true,
            (PointerTarget::Background, Some(rect)) => rect.contains(point),
            (PointerTarget::Background, None) if hotspot_type.records_wrong_clicks() => {
                return Err(EngineError::GeometryUnavailable(format!(
                    "no hotspot rectangle for step {}",
                    step_id
                )));
            }
            (PointerTarget::Background, None) => false,
        };

        match hotspot_type {
            HotspotType::Button | HotspotType::Highlight if hit => {
                log.mark_clicked(step_id);
                self.ui.highlight_visible = false;
                self.ui.resolved = true;
                Ok(Outcome::Resolved(Directive::Advance))
            }
            HotspotType::Checkbox if hit => {
                log.mark_clicked(step_id);
                self.ui.checked = true;
                self.ui.resolved = true;
                self.timer
                    .arm(step_id, TimerPurpose::DelayedAdvance, self.checkbox_delay_us, now);
                Ok(Outcome::Resolved(Directive::Stay))
            }
            HotspotType::Button | HotspotType::Highlight | HotspotType::Checkbox => {
                match container.and_then(|size| WrongClick::at(point, size)) {
                    Some(click) => {
                        log::debug!(
                            "wrong click on step {} at ({:.1}, {:.1})",
                            step_id,
                            point.x,
                            point.y
                        );
                        log.push_wrong_click(step_id, click);
                    }
                    None => log::warn!(
                        "wrong click on step {} dropped: container size unknown",
                        step_id
                    ),
                }
                Ok(Outcome::Unresolved)
            }
            HotspotType::Dropdown => {
                if hit {
                    self.ui.dropdown_open = !self.ui.dropdown_open;
                } else {
                    self.ui.dropdown_open = false;
                }
                Ok(Outcome::Unresolved)
            }
            HotspotType::Textfield | HotspotType::Coaching => Ok(Outcome::Unresolved),
        }
    }
}
