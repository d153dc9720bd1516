//! Device timer engine.
//!
//! A device has three timers and at most one of them may run at a time:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        Timer slot                            │
//! │                                                              │
//! │  ┌───────────┐      ┌───────────┐      ┌───────────┐         │
//! │  │ Sensing   │      │ Countdown │      │ Session   │         │
//! │  │ (2 s)     │      │ (1 s)     │      │ (1 s)     │         │
//! │  └─────┬─────┘      └─────┬─────┘      └─────┬─────┘         │
//! │        └──────────────────┼──────────────────┘               │
//! │                           ▼                                  │
//! │                  Scheduler::poll(now)                        │
//! │                           │                                  │
//! │                           ▼                                  │
//! │        service.tick() / countdown step / session step        │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Arming a timer while another is armed fails with
//! [`SchedulerError::Busy`]; the caller must `stop()` first.  There is no
//! preemption, so the check-then-stop sequence is race-free.

use log::{debug, info};

use crate::error::SchedulerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// Periodic sense → classify → policy → publish tick.
    Sensing,
    /// Meter's long-press reset countdown.
    Countdown,
    /// Transformer's disconnect session steps.
    Session,
}

#[derive(Debug, Clone, Copy)]
struct Armed {
    kind: TimerKind,
    period_ms: u64,
    next_fire_ms: u64,
}

/// Single-slot periodic timer.
pub struct Scheduler {
    armed: Option<Armed>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self { armed: None }
    }

    /// Arm `kind` to fire after `first_delay_ms`, then every `period_ms`.
    pub fn arm(
        &mut self,
        kind: TimerKind,
        now_ms: u64,
        first_delay_ms: u64,
        period_ms: u64,
    ) -> Result<(), SchedulerError> {
        if let Some(armed) = self.armed {
            return Err(SchedulerError::Busy { armed: armed.kind });
        }
        if period_ms == 0 {
            return Err(SchedulerError::ZeroPeriod);
        }
        info!("Scheduler: {:?} armed, every {} ms", kind, period_ms);
        self.armed = Some(Armed {
            kind,
            period_ms,
            next_fire_ms: now_ms + first_delay_ms,
        });
        Ok(())
    }

    /// Stop whichever timer is armed.  Returns what was stopped.
    pub fn stop(&mut self) -> Option<TimerKind> {
        let stopped = self.armed.take().map(|a| a.kind);
        if let Some(kind) = stopped {
            debug!("Scheduler: {:?} stopped", kind);
        }
        stopped
    }

    /// Stop the current timer and arm `kind` in its place.
    pub fn switch_to(
        &mut self,
        kind: TimerKind,
        now_ms: u64,
        first_delay_ms: u64,
        period_ms: u64,
    ) -> Result<Option<TimerKind>, SchedulerError> {
        let stopped = self.stop();
        self.arm(kind, now_ms, first_delay_ms, period_ms)?;
        Ok(stopped)
    }

    /// Fire the armed timer if it is due.  At most one firing per call;
    /// a late poll does not replay missed periods.
    pub fn poll(&mut self, now_ms: u64) -> Option<TimerKind> {
        let armed = self.armed.as_mut()?;
        if now_ms < armed.next_fire_ms {
            return None;
        }
        armed.next_fire_ms = (armed.next_fire_ms + armed.period_ms).max(now_ms + 1);
        Some(armed.kind)
    }

    pub fn armed(&self) -> Option<TimerKind> {
        self.armed.map(|a| a.kind)
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

// ═══════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════
