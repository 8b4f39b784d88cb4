// Strong typing over strings. Newtypes for timestamps, step/image ids, and pixel units.
// Authored content keeps the camelCase field names it is stored with.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Timestamp in microseconds. Newtype for type safety.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub struct Timestamp(u64);

impl Timestamp {
    pub fn from_micros(us: u64) -> Self {
        Timestamp(us)
    }

    pub fn as_micros(&self) -> u64 {
        self.0
    }

    /// Timestamp `us` microseconds after this one.
    pub fn plus_micros(&self, us: u64) -> Self {
        Timestamp(self.0.saturating_add(us))
    }

    /// Microseconds elapsed since `earlier` (zero if `earlier` is in the future).
    pub fn micros_since(&self, earlier: Timestamp) -> u64 {
        self.0.saturating_sub(earlier.0)
    }
}

/// Unique step id within a simulation.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepId(String);

impl StepId {
    pub fn new(id: impl Into<String>) -> Self {
        StepId(id.into())
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Key the content-loading collaborator uses for slide images.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageId(String);

impl ImageId {
    pub fn new(id: impl Into<String>) -> Self {
        ImageId(id.into())
    }
}

impl fmt::Display for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Width/height pair in pixels (natural image pixels or rendered CSS pixels).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub fn new(width: f64, height: f64) -> Self {
        Size { width, height }
    }

    /// Both dimensions are finite and strictly positive.
    pub fn is_usable(&self) -> bool {
        self.width.is_finite() && self.height.is_finite() && self.width > 0.0 && self.height > 0.0
    }
}

/// Pointer position in container pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Point { x, y }
    }
}

/// Rectangle in currently-rendered screen pixels, relative to the image container.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct ScreenRect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl ScreenRect {
    pub fn new(left: f64, top: f64, width: f64, height: f64) -> Self {
        ScreenRect {
            left,
            top,
            width,
            height,
        }
    }

    /// Inclusive hit test on all four edges.
    pub fn contains(&self, point: Point) -> bool {
        point.x >= self.left
            && point.x <= self.left + self.width
            && point.y >= self.top
            && point.y <= self.top + self.height
    }
}

/// Rectangle as percentages of image size, in [0, 100].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PercentRect {
    pub x_percent: f64,
    pub y_percent: f64,
    pub width_percent: f64,
    pub height_percent: f64,
}

/// Rectangle in original (natural) image pixels. Legacy content only.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PixelRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Authored rectangle. Never mutated by playback.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AuthoredRect {
    Percent(PercentRect),
    Absolute(PixelRect),
}

impl AuthoredRect {
    pub fn percent(x: f64, y: f64, width: f64, height: f64) -> Self {
        AuthoredRect::Percent(PercentRect {
            x_percent: x,
            y_percent: y,
            width_percent: width,
            height_percent: height,
        })
    }

    pub fn absolute(x: f64, y: f64, width: f64, height: f64) -> Self {
        AuthoredRect::Absolute(PixelRect {
            x,
            y,
            width,
            height,
        })
    }
}

/// Who speaks a message step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Role {
    Customer,
    Trainee,
}

/// Interaction contract of a hotspot step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HotspotType {
    Button,
    Dropdown,
    Checkbox,
    Textfield,
    Highlight,
    Coaching,
}

impl HotspotType {
    /// Types whose misses are recorded as wrong clicks.
    pub fn records_wrong_clicks(&self) -> bool {
        matches!(
            self,
            HotspotType::Button | HotspotType::Highlight | HotspotType::Checkbox
        )
    }

    /// Coaching tips are informational: a click never writes a record, and an early
    /// end synthesizes no disposition for them. Only their own timeout is recorded.
    pub fn is_graded(&self) -> bool {
        !matches!(self, HotspotType::Coaching)
    }
}

/// Per-hotspot settings bag. Unknown authored keys are kept in `extra` so the
/// script handed to scoring round-trips.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct StepSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_duration_seconds: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub advance_on_select: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub highlight_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub button_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tip_text: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl StepSettings {
    /// Configured timeout in microseconds, if set and positive.
    pub fn timeout_micros(&self) -> Option<u64> {
        self.timeout_duration_seconds
            .filter(|secs| secs.is_finite() && *secs > 0.0)
            .map(|secs| (secs * 1_000_000.0).round() as u64)
    }

    pub fn advances_on_select(&self) -> bool {
        self.advance_on_select.unwrap_or(false)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageStep {
    pub role: Role,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HotspotStep {
    pub hotspot_type: HotspotType,
    pub rect: AuthoredRect,
    #[serde(default)]
    pub settings: StepSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum StepKind {
    Message(MessageStep),
    Hotspot(HotspotStep),
}

/// One scripted unit within a slide's sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub id: StepId,
    #[serde(flatten)]
    pub kind: StepKind,
}

impl Step {
    pub fn message(id: &str, role: Role, text: &str) -> Self {
        Step {
            id: StepId::new(id),
            kind: StepKind::Message(MessageStep {
                role,
                text: text.to_string(),
            }),
        }
    }

    pub fn hotspot(id: &str, hotspot_type: HotspotType, rect: AuthoredRect) -> Self {
        Step {
            id: StepId::new(id),
            kind: StepKind::Hotspot(HotspotStep {
                hotspot_type,
                rect,
                settings: StepSettings::default(),
            }),
        }
    }

    pub fn with_settings(mut self, settings: StepSettings) -> Self {
        if let StepKind::Hotspot(hotspot) = &mut self.kind {
            hotspot.settings = settings;
        }
        self
    }

    pub fn as_hotspot(&self) -> Option<&HotspotStep> {
        match &self.kind {
            StepKind::Hotspot(hotspot) => Some(hotspot),
            StepKind::Message(_) => None,
        }
    }
}

/// Passive overlay (e.g. obscuring PHI). No timeout, no click semantics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaskRegion {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub rect: AuthoredRect,
}

/// One background image plus its ordered steps and masks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Slide {
    pub image_id: ImageId,
    #[serde(default)]
    pub sequence: Vec<Step>,
    #[serde(default)]
    pub masking: Vec<MaskRegion>,
}

impl Slide {
    pub fn new(image_id: &str, sequence: Vec<Step>) -> Self {
        Slide {
            image_id: ImageId::new(image_id),
            sequence,
            masking: Vec::new(),
        }
    }
}

/// Level-scoped visibility settings. Read-only for the lifetime of an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct LevelSettings {
    #[serde(default)]
    pub hide_highlights: bool,
    #[serde(default)]
    pub hide_coaching_tips: bool,
    /// Hides the trainee's own script.
    #[serde(default)]
    pub hide_agent_script: bool,
    #[serde(default)]
    pub hide_customer_script: bool,
}

impl LevelSettings {
    pub fn hides(&self, hotspot_type: HotspotType) -> bool {
        match hotspot_type {
            HotspotType::Highlight => self.hide_highlights,
            HotspotType::Coaching => self.hide_coaching_tips,
            _ => false,
        }
    }

    pub fn hides_script(&self, role: Role) -> bool {
        match role {
            Role::Customer => self.hide_customer_script,
            Role::Trainee => self.hide_agent_script,
        }
    }
}

/// Ordered slides plus level settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Simulation {
    #[serde(default)]
    pub slides: Vec<Slide>,
    #[serde(default)]
    pub level_settings: LevelSettings,
}

impl Simulation {
    pub fn new(slides: Vec<Slide>) -> Self {
        Simulation {
            slides,
            level_settings: LevelSettings::default(),
        }
    }

    pub fn with_level_settings(mut self, level_settings: LevelSettings) -> Self {
        self.level_settings = level_settings;
        self
    }

    pub fn total_steps(&self) -> usize {
        self.slides.iter().map(|s| s.sequence.len()).sum()
    }

    pub fn step_at(&self, slide: usize, step: usize) -> Option<&Step> {
        self.slides.get(slide).and_then(|s| s.sequence.get(step))
    }
}

/// Position in the slide/sequence structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepPosition {
    pub slide: usize,
    pub step: usize,
}

impl StepPosition {
    pub fn new(slide: usize, step: usize) -> Self {
        StepPosition { slide, step }
    }
}
