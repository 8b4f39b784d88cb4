// Single-shot cancellable timer owned by the active step.
// Timers are virtual: they fire when the host's clock passes the deadline on a tick.

use serde::{Deserialize, Serialize};

use crate::types::*;

/// What a step timer does when it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimerPurpose {
    /// Hotspot timeout: records `timedOut` and advances.
    Timeout,
    /// Deferred advance after a resolved interaction (checkbox).
    DelayedAdvance,
}

/// An armed timer. Bound to the step that armed it and to a generation number,
/// so a timer from a previous step can never act on the current one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepTimer {
    pub step_id: StepId,
    pub purpose: TimerPurpose,
    pub generation: u64,
    pub duration_us: u64,
    pub deadline: Timestamp,
}

#[derive(Debug, Clone, PartialEq)]
struct Suspended {
    step_id: StepId,
    purpose: TimerPurpose,
    duration_us: u64,
}

/// Holds at most one armed timer.
#[derive(Debug, Clone, Default)]
pub struct TimerSlot {
    active: Option<StepTimer>,
    suspended: Option<Suspended>,
    next_generation: u64,
}

impl TimerSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm a timer, replacing (and cancelling) whatever was armed before.
    pub fn arm(
        &mut self,
        step_id: &StepId,
        purpose: TimerPurpose,
        duration_us: u64,
        now: Timestamp,
    ) -> &StepTimer {
        self.next_generation += 1;
        self.suspended = None;
        log::debug!(
            "arming {:?} timer for step {} ({} ms)",
            purpose,
            step_id,
            duration_us / 1000
        );
        self.active.insert(StepTimer {
            step_id: step_id.clone(),
            purpose,
            generation: self.next_generation,
            duration_us,
            deadline: now.plus_micros(duration_us),
        })
    }

    /// Cancel the armed timer, if any. Also drops a suspended timer.
    pub fn cancel(&mut self) -> Option<StepTimer> {
        self.suspended = None;
        let cancelled = self.active.take();
        if let Some(timer) = &cancelled {
            log::debug!("cancelled {:?} timer for step {}", timer.purpose, timer.step_id);
        }
        cancelled
    }

    /// Put back a timer taken with `cancel`, keeping its deadline and generation.
    pub fn restore(&mut self, timer: StepTimer) {
        self.active = Some(timer);
    }

    pub fn active(&self) -> Option<&StepTimer> {
        self.active.as_ref()
    }

    pub fn is_armed(&self) -> bool {
        self.active.is_some()
    }

    /// Take the armed timer if it is due at `now` and belongs to `current`.
    /// A due timer for any other step is stale and is discarded.
    pub fn take_due(&mut self, now: Timestamp, current: &StepId) -> Option<StepTimer> {
        let due = self.active.as_ref().is_some_and(|t| t.deadline <= now);
        if !due {
            return None;
        }
        let timer = self.active.take()?;
        if &timer.step_id != current {
            log::warn!("discarding stale timer for step {}", timer.step_id);
            return None;
        }
        Some(timer)
    }

    /// Pause: cancel the armed timer but remember it for `resume`.
    pub fn suspend(&mut self) {
        if let Some(timer) = self.active.take() {
            self.suspended = Some(Suspended {
                step_id: timer.step_id,
                purpose: timer.purpose,
                duration_us: timer.duration_us,
            });
        }
    }

    /// Resume: re-arm a suspended timer with its original full duration.
    /// Elapsed time before the pause is not credited.
    pub fn resume(&mut self, now: Timestamp) -> Option<&StepTimer> {
        let suspended = self.suspended.take()?;
        Some(self.arm(
            &suspended.step_id,
            suspended.purpose,
            suspended.duration_us,
            now,
        ))
    }
}
