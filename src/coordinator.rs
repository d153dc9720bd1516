//! Grid disconnect coordination (transformer side).
//!
//! When the transformer sees a fault it cannot repair it asks the house
//! meter to switch off, waits out a cooldown, and restores the house to
//! exactly the activation it had before the incident.
//!
//! ```text
//!   Idle ──start──▶ RequestDisconnect ──Acked(prev)──▶ Cooldown{5..1}
//!                        │                                  │
//!                    Exhausted                         tick to 0
//!                        │                     prev=true ───┴─── prev=false
//!                        ▼                         │               │
//!                  Abandoned (fail-open)   RequestReconnect   LeftDisconnected
//!                                           │         │
//!                                        Acked    Exhausted
//!                                           │         │
//!                                       Restored   Abandoned
//! ```
//!
//! - Each request phase makes up to `max_attempts` blocking requests.
//!   An attempt only counts as acknowledged when the house answers
//!   `2.04` with a boolean `previous_status`; timeouts, error codes and
//!   malformed bodies are failed attempts.
//! - A house that was already off is never switched on.
//! - An exhausted phase abandons the session and sensing resumes.  The
//!   fault, if it persists, starts a new session on its next edge.
//!
//! The phase logic is the pure [`transition`] function; the coordinator
//! only performs the I/O the current phase asks for.

use core::fmt;
use core::time::Duration;

use log::{info, warn};

use crate::rpc::resources::{StatusBody, parse_previous_status};
use crate::rpc::transport::{Link, Request, ResponseCode};

// ═══════════════════════════════════════════════════════════════
//  Session state machine
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    RequestDisconnect,
    Cooldown { remaining: u8 },
    RequestReconnect,
}

/// Which request phase ran out of attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbandonedAt {
    Disconnect,
    Reconnect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// House was reconnected; it was active before the incident.
    Restored,
    /// House stays off; it was already off before the incident.
    LeftDisconnected,
    /// A request phase exhausted its attempts.
    Abandoned(AbandonedAt),
}

impl fmt::Display for SessionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Restored => write!(f, "house restored"),
            Self::LeftDisconnected => write!(f, "house left disconnected (was off)"),
            Self::Abandoned(AbandonedAt::Disconnect) => write!(f, "disconnect abandoned"),
            Self::Abandoned(AbandonedAt::Reconnect) => write!(f, "reconnect abandoned"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// House acknowledged; carries its activation before this request.
    Acked { previous_status: bool },
    /// Every attempt of the current request phase failed.
    Exhausted,
    /// One cooldown step elapsed.
    CooldownTick,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    To(SessionPhase),
    Done(SessionOutcome),
}

/// One live session.  At most one exists per transformer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisconnectSession {
    pub phase: SessionPhase,
    /// Attempts made in the current request phase.
    pub attempts: u8,
    /// House activation captured by the disconnect acknowledgement.
    pub prior_house_active: Option<bool>,
}

/// Next phase for `event`.  Events that do not belong to `phase` leave it
/// unchanged.
pub fn transition(
    phase: SessionPhase,
    event: SessionEvent,
    prior_house_active: Option<bool>,
    cooldown_ticks: u8,
) -> Transition {
    match (phase, event) {
        (SessionPhase::RequestDisconnect, SessionEvent::Acked { .. }) => {
            Transition::To(SessionPhase::Cooldown {
                remaining: cooldown_ticks,
            })
        }
        (SessionPhase::RequestDisconnect, SessionEvent::Exhausted) => {
            Transition::Done(SessionOutcome::Abandoned(AbandonedAt::Disconnect))
        }
        (SessionPhase::Cooldown { remaining }, SessionEvent::CooldownTick) if remaining > 1 => {
            Transition::To(SessionPhase::Cooldown {
                remaining: remaining - 1,
            })
        }
        (SessionPhase::Cooldown { .. }, SessionEvent::CooldownTick) => {
            if prior_house_active == Some(true) {
                Transition::To(SessionPhase::RequestReconnect)
            } else {
                Transition::Done(SessionOutcome::LeftDisconnected)
            }
        }
        (SessionPhase::RequestReconnect, SessionEvent::Acked { .. }) => {
            Transition::Done(SessionOutcome::Restored)
        }
        (SessionPhase::RequestReconnect, SessionEvent::Exhausted) => {
            Transition::Done(SessionOutcome::Abandoned(AbandonedAt::Reconnect))
        }
        (
            SessionPhase::RequestDisconnect | SessionPhase::RequestReconnect,
            SessionEvent::CooldownTick,
        )
        | (SessionPhase::Cooldown { .. }, SessionEvent::Acked { .. } | SessionEvent::Exhausted) => {
            Transition::To(phase)
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Coordinator
// ═══════════════════════════════════════════════════════════════

/// What one [`GridDisconnectCoordinator::step`] did, for the control loop
/// to act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionProgress {
    /// House disconnected; reset readings and hold the indicator on.
    CooldownStarted { ticks: u8 },
    CooldownTick { remaining: u8 },
    /// Session over; sensing resumes.
    Finished(SessionOutcome),
    /// No session is active.
    Idle,
}

pub struct GridDisconnectCoordinator {
    house_peer: String,
    status_path: String,
    max_attempts: u8,
    cooldown_ticks: u8,
    timeout: Duration,
    session: Option<DisconnectSession>,
}

impl GridDisconnectCoordinator {
    pub fn new(
        house_peer: &str,
        status_path: &str,
        max_attempts: u8,
        cooldown_ticks: u8,
        timeout: Duration,
    ) -> Self {
        Self {
            house_peer: house_peer.into(),
            status_path: status_path.into(),
            max_attempts,
            cooldown_ticks,
            timeout,
            session: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    pub fn session(&self) -> Option<&DisconnectSession> {
        self.session.as_ref()
    }

    /// Open a session.  Returns `false` if one is already in flight.
    pub fn start(&mut self) -> bool {
        if self.session.is_some() {
            return false;
        }
        info!("Session: requesting disconnect of {}", self.house_peer);
        self.session = Some(DisconnectSession {
            phase: SessionPhase::RequestDisconnect,
            attempts: 0,
            prior_house_active: None,
        });
        true
    }

    /// Advance the session by one timer firing.  Request phases block on
    /// the link for up to `max_attempts` request budgets.
    pub fn step<L: Link + ?Sized>(&mut self, link: &mut L) -> SessionProgress {
        let Some(mut session) = self.session else {
            return SessionProgress::Idle;
        };

        let event = match session.phase {
            SessionPhase::Cooldown { .. } => SessionEvent::CooldownTick,
            SessionPhase::RequestDisconnect => self.negotiate(link, &mut session, false),
            SessionPhase::RequestReconnect => self.negotiate(link, &mut session, true),
        };
        if let SessionEvent::Acked { previous_status } = event {
            if session.phase == SessionPhase::RequestDisconnect {
                session.prior_house_active = Some(previous_status);
            }
        }

        let progress = match transition(
            session.phase,
            event,
            session.prior_house_active,
            self.cooldown_ticks,
        ) {
            Transition::Done(outcome) => return self.finish(outcome),
            Transition::To(next @ SessionPhase::Cooldown { remaining }) => {
                let entering = !matches!(session.phase, SessionPhase::Cooldown { .. });
                session.phase = next;
                if entering {
                    info!(
                        "Session: house off (was {}), cooling down for {} steps",
                        if session.prior_house_active == Some(true) { "on" } else { "off" },
                        remaining
                    );
                    SessionProgress::CooldownStarted { ticks: remaining }
                } else {
                    SessionProgress::CooldownTick { remaining }
                }
            }
            Transition::To(SessionPhase::RequestReconnect) => {
                // Cooldown over: reconnect in this same step.
                session.phase = SessionPhase::RequestReconnect;
                session.attempts = 0;
                let event = self.negotiate(link, &mut session, true);
                match transition(session.phase, event, session.prior_house_active, self.cooldown_ticks) {
                    Transition::Done(outcome) => return self.finish(outcome),
                    Transition::To(phase) => {
                        session.phase = phase;
                        SessionProgress::CooldownTick { remaining: 0 }
                    }
                }
            }
            Transition::To(phase) => {
                session.phase = phase;
                SessionProgress::CooldownTick { remaining: 0 }
            }
        };
        self.session = Some(session);
        progress
    }

    fn finish(&mut self, outcome: SessionOutcome) -> SessionProgress {
        match outcome {
            SessionOutcome::Abandoned(_) => warn!("Session: {}, resuming sensing", outcome),
            _ => info!("Session: {}", outcome),
        }
        self.session = None;
        SessionProgress::Finished(outcome)
    }

    /// Run one request phase: up to `max_attempts` `PUT status` requests.
    fn negotiate<L: Link + ?Sized>(
        &self,
        link: &mut L,
        session: &mut DisconnectSession,
        status: bool,
    ) -> SessionEvent {
        let request = match Request::put_json(&self.status_path, &StatusBody { status }) {
            Ok(r) => r,
            Err(e) => {
                warn!("Session: cannot encode status request: {}", e);
                return SessionEvent::Exhausted;
            }
        };

        while session.attempts < self.max_attempts {
            session.attempts += 1;
            let attempt = session.attempts;
            match link.request(&self.house_peer, &request, self.timeout) {
                Ok(reply) if reply.code == ResponseCode::Changed => {
                    match parse_previous_status(&reply.payload) {
                        Ok(previous_status) => {
                            info!(
                                "Session: status={} acknowledged on attempt {}",
                                status, attempt
                            );
                            return SessionEvent::Acked { previous_status };
                        }
                        Err(e) => warn!(
                            "Session: attempt {}/{}: {}",
                            attempt, self.max_attempts, e
                        ),
                    }
                }
                Ok(reply) => warn!(
                    "Session: attempt {}/{}: house answered {}",
                    attempt, self.max_attempts, reply.code
                ),
                Err(e) => warn!(
                    "Session: attempt {}/{}: {}",
                    attempt, self.max_attempts, e
                ),
            }
        }
        SessionEvent::Exhausted
    }
}

// ═══════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════
