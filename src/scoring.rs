// Scoring hand-off: the attempt payload sent at the end and the result that comes back.
// Sub-scores are forwarded as-is; the engine does not interpret them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::attempt::AttemptLog;
use crate::types::*;

/// Sent to the scoring collaborator exactly once per attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptPayload {
    pub attempt_records: AttemptLog,
    /// Slides with trainee answers substituted into trainee message steps.
    pub modified_slide_script: Vec<Slide>,
    /// Locally measured time from start to end.
    pub elapsed_us: u64,
}

/// Result returned by the scoring collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreSummary {
    pub final_score: f64,
    #[serde(default)]
    pub sub_scores: BTreeMap<String, f64>,
    pub duration_secs: f64,
}

/// What the trainee sees at the end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status")]
pub enum CompletionState {
    Scored { summary: ScoreSummary },
    /// Scoring failed; the attempt still completes, without a score.
    Scoreless { reason: String, elapsed_us: u64 },
}

impl CompletionState {
    pub fn is_scored(&self) -> bool {
        matches!(self, CompletionState::Scored { .. })
    }
}

/// Copy the slides, replacing each answered trainee message's text with the answer.
pub fn modified_script(slides: &[Slide], answers: &BTreeMap<StepId, String>) -> Vec<Slide> {
    let mut script = slides.to_vec();
    for step in script.iter_mut().flat_map(|slide| slide.sequence.iter_mut()) {
        if let StepKind::Message(message) = &mut step.kind {
            if message.role != Role::Trainee {
                continue;
            }
            if let Some(answer) = answers.get(&step.id) {
                message.text = answer.clone();
            }
        }
    }
    script
}
