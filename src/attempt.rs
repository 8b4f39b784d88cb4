// Attempt log: per-step interaction outcomes handed to scoring at the end.
// Invariant: a record never carries isClicked and timedOut at the same time.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::*;

/// A pointer event that missed the active hotspot, relative to the image container.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WrongClick {
    pub x_pixels: f64,
    pub y_pixels: f64,
    pub x_percent: f64,
    pub y_percent: f64,
}

impl WrongClick {
    /// Build from a container-relative point. `None` if the container has no usable size.
    pub fn at(point: Point, container: Size) -> Option<Self> {
        if !container.is_usable() {
            return None;
        }
        Some(WrongClick {
            x_pixels: point.x,
            y_pixels: point.y,
            x_percent: point.x / container.width * 100.0,
            y_percent: point.y / container.height * 100.0,
        })
    }
}

/// Outcome for one step the trainee encountered.
///
/// Absent flags are omitted from JSON entirely; scoring distinguishes "no key"
/// from `false`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct AttemptRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_clicked: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timed_out: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_input: Option<String>,
    #[serde(default)]
    pub wrong_clicks: Vec<WrongClick>,
}

impl AttemptRecord {
    pub fn clicked(&self) -> bool {
        self.is_clicked == Some(true)
    }

    pub fn timed_out(&self) -> bool {
        self.timed_out == Some(true)
    }

    /// The step was resolved one way or another (click, timeout, or an answer).
    pub fn has_disposition(&self) -> bool {
        self.clicked() || self.timed_out() || self.user_input.is_some()
    }
}

/// All attempt records, keyed by step id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct AttemptLog {
    records: BTreeMap<StepId, AttemptRecord>,
}

impl AttemptLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    pub fn get(&self, step_id: &StepId) -> Option<&AttemptRecord> {
        self.records.get(step_id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }


    fn entry(&mut self, step_id: &StepId) -> &mut AttemptRecord {
        self.records.entry(step_id.clone()).or_default()
    }

    /// Genuine click on the hotspot. Clears any stale timeout marker.
    pub fn mark_clicked(&mut self, step_id: &StepId) {
        let record = self.entry(step_id);
        record.is_clicked = Some(true);
        record.timed_out = None;
    }

    /// Timeout fired. Removes any click marker; wrong clicks are kept.
    pub fn mark_timed_out(&mut self, step_id: &StepId) {
        let record = self.entry(step_id);
        record.timed_out = Some(true);
        record.is_clicked = None;
    }

    /// Dropdown/text field answer. Never touches `is_clicked`.
    pub fn set_user_input(&mut self, step_id: &StepId, input: impl Into<String>) {
        let record = self.entry(step_id);
        record.user_input = Some(input.into());
    }

    /// Wrong clicks accumulate for the whole lifetime of the step.
    pub fn push_wrong_click(&mut self, step_id: &StepId, click: WrongClick) {
        self.entry(step_id).wrong_clicks.push(click);
    }

    /// Give a dangling step a disposition using the timeout rule, unless it already has one.
    /// Returns `true` when a disposition was synthesized.
    pub fn ensure_disposition(&mut self, step_id: &StepId) -> bool {
        if self.get(step_id).is_some_and(AttemptRecord::has_disposition) {
            return false;
        }
        self.mark_timed_out(step_id);
        true
    }

    /// Mutual-exclusion check over every record.
    pub fn is_consistent(&self) -> bool {
        self.records
            .values()
            .all(|record| !(record.clicked() && record.timed_out()))
    }
}
