//! Verification substage: turns the server's email-code metadata into
//! countdown state and transcript notices.
//!
//! The handler never touches the transcript or the UI directly. Every call
//! returns the `VerificationUpdate`s the controller should apply, which keeps
//! the controller the single writer of everything it owns.

use serde::Serialize;
use tokio::sync::mpsc;

use crate::countdown::Countdown;
use crate::error::GatewayError;
use crate::gateway::{ResendReply, VerificationMetadata};

/// Label shown next to the expiry countdown while a code is live.
pub const EXPIRY_LABEL: &str = "code sent";

/// Server-declared timing for the currently issued code.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerificationWindow {
    pub resend_available_in_seconds: Option<i64>,
    pub expires_in_seconds: Option<i64>,
    pub attempts_left: Option<i64>,
}

impl From<&VerificationMetadata> for VerificationWindow {
    fn from(meta: &VerificationMetadata) -> Self {
        Self {
            resend_available_in_seconds: meta.resend_available_in,
            expires_in_seconds: meta.expires_in,
            attempts_left: meta.attempts_left,
        }
    }
}

/// State of the resend affordance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ResendControl {
    #[default]
    Hidden,
    CoolingDown { remaining: u64 },
    Ready,
}

/// State of the code-expiry indicator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ExpiryStatus {
    #[default]
    Hidden,
    Running { label: String, remaining: u64 },
    Expired,
}

/// Which of the two verification clocks an event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    Resend,
    Expiry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerTick {
    Tick(u64),
    Expired,
}

/// A countdown callback, delivered back to the controller's event loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerEvent {
    pub timer: TimerKind,
    /// Schedule the event was produced by. Events from an older schedule are
    /// dropped, which covers ticks queued just before a cancel landed.
    pub epoch: u64,
    pub tick: TimerTick,
}

/// What the controller must apply after the handler ran.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationUpdate {
    /// Append a bot notice to the transcript.
    Notice(String),
    Resend(ResendControl),
    Expiry(ExpiryStatus),
}

/// Why a resend request was refused locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResendRefusal {
    /// No code has been issued in this stage.
    NotAwaitingCode,
    /// The cooldown countdown is still running.
    CoolingDown { remaining: u64 },
}

/// Owns the verification window and both countdowns while a code is pending.
pub struct VerificationHandler {
    window: Option<VerificationWindow>,
    resend_timer: Countdown,
    expiry_timer: Countdown,
    resend_epoch: u64,
    expiry_epoch: u64,
    resend: ResendControl,
    expiry: ExpiryStatus,
    timer_tx: mpsc::UnboundedSender<TimerEvent>,
}

impl VerificationHandler {
    pub fn new(timer_tx: mpsc::UnboundedSender<TimerEvent>) -> Self {
        Self {
            window: None,
            resend_timer: Countdown::new("resend"),
            expiry_timer: Countdown::new("expiry"),
            resend_epoch: 0,
            expiry_epoch: 0,
            resend: ResendControl::Hidden,
            expiry: ExpiryStatus::Hidden,
            timer_tx,
        }
    }

    pub fn window(&self) -> Option<&VerificationWindow> {
        self.window.as_ref()
    }

    pub fn resend_control(&self) -> ResendControl {
        self.resend
    }

    pub fn expiry_status(&self) -> &ExpiryStatus {
        &self.expiry
    }

    /// Whether a countdown schedule is live.
    pub fn has_running_timers(&self) -> bool {
        self.resend_timer.is_active() || self.expiry_timer.is_active()
    }

    /// Interpret one metadata payload from the server.
    pub fn apply(&mut self, meta: &VerificationMetadata) -> Vec<VerificationUpdate> {
        if !meta.is_email_code() {
            return self.reset();
        }

        let mut updates = Vec::new();
        self.window = Some(VerificationWindow::from(meta));

        match meta.resend_available_in {
            Some(seconds) => self.start_resend_cooldown(seconds),
            None => {
                self.resend_epoch += 1;
                self.resend_timer.cancel();
                self.resend = ResendControl::Ready;
            }
        }
        updates.push(VerificationUpdate::Resend(self.resend));

        match meta.expires_in {
            Some(seconds) => {
                self.start_expiry(seconds);
                updates.push(VerificationUpdate::Expiry(self.expiry.clone()));
            }
            // A code without a known lifetime: the previous one's clock no
            // longer applies.
            None => {
                self.expiry_epoch += 1;
                self.expiry_timer.cancel();
                if self.expiry != ExpiryStatus::Hidden {
                    self.expiry = ExpiryStatus::Hidden;
                    updates.push(VerificationUpdate::Expiry(ExpiryStatus::Hidden));
                }
            }
        }

        if let (Some(attempts), Some(expires)) = (meta.attempts_left, meta.expires_in) {
            updates.push(VerificationUpdate::Notice(format!(
                "You have {attempts} attempt(s) left. Code expires in {expires}s."
            )));
        }

        tracing::info!(
            resend_in = ?meta.resend_available_in,
            expires_in = ?meta.expires_in,
            attempts_left = ?meta.attempts_left,
            "Verification code issued"
        );
        updates
    }

    /// Leave the verification substage: cancel both clocks, drop the window,
    /// hide the affordances. Returns updates only for what actually changed.
    pub fn reset(&mut self) -> Vec<VerificationUpdate> {
        self.resend_epoch += 1;
        self.expiry_epoch += 1;
        self.resend_timer.cancel();
        self.expiry_timer.cancel();
        self.window = None;

        let mut updates = Vec::new();
        if self.resend != ResendControl::Hidden {
            self.resend = ResendControl::Hidden;
            updates.push(VerificationUpdate::Resend(ResendControl::Hidden));
        }
        if self.expiry != ExpiryStatus::Hidden {
            self.expiry = ExpiryStatus::Hidden;
            updates.push(VerificationUpdate::Expiry(ExpiryStatus::Hidden));
        }
        updates
    }

    /// Check whether a resend may be sent right now.
    ///
    /// Only the cooldown gates it. An expired code does not: the server
    /// decides whether a new one may be issued.
    pub fn check_resend(&self) -> Result<(), ResendRefusal> {
        if self.window.is_none() {
            return Err(ResendRefusal::NotAwaitingCode);
        }
        match self.resend {
            ResendControl::Ready => Ok(()),
            ResendControl::CoolingDown { remaining } => {
                Err(ResendRefusal::CoolingDown { remaining })
            }
            ResendControl::Hidden => Err(ResendRefusal::NotAwaitingCode),
        }
    }

    /// A resend succeeded: treat it as a fresh `email_code` event.
    pub fn resend_succeeded(&mut self, reply: &ResendReply) -> Vec<VerificationUpdate> {
        self.apply(&reply.as_metadata())
    }

    /// A resend failed: report it and leave the running countdowns alone.
    pub fn resend_failed(&self, err: &GatewayError) -> Vec<VerificationUpdate> {
        let notice = match err {
            GatewayError::Server { message, .. } => {
                format!("Could not resend the code: {message}")
            }
            GatewayError::Transport(_) => {
                "Could not resend the code. Please try again.".to_string()
            }
            GatewayError::Protocol(detail) => {
                format!("Could not resend the code ({detail}).")
            }
        };
        vec![VerificationUpdate::Notice(notice)]
    }

    /// Fold a countdown callback into the affordance state.
    pub fn on_timer(&mut self, event: TimerEvent) -> Vec<VerificationUpdate> {
        let current = match event.timer {
            TimerKind::Resend => self.resend_epoch,
            TimerKind::Expiry => self.expiry_epoch,
        };
        if event.epoch != current {
            tracing::debug!(?event, current, "Dropping stale timer event");
            return Vec::new();
        }

        match (event.timer, event.tick) {
            (TimerKind::Resend, TimerTick::Tick(remaining)) => {
                self.resend = ResendControl::CoolingDown { remaining };
                vec![VerificationUpdate::Resend(self.resend)]
            }
            (TimerKind::Resend, TimerTick::Expired) => {
                self.resend = ResendControl::Ready;
                vec![VerificationUpdate::Resend(self.resend)]
            }
            (TimerKind::Expiry, TimerTick::Tick(remaining)) => {
                self.expiry = ExpiryStatus::Running {
                    label: EXPIRY_LABEL.to_string(),
                    remaining,
                };
                vec![VerificationUpdate::Expiry(self.expiry.clone())]
            }
            (TimerKind::Expiry, TimerTick::Expired) => {
                self.expiry = ExpiryStatus::Expired;
                vec![VerificationUpdate::Expiry(ExpiryStatus::Expired)]
            }
        }
    }

    fn start_resend_cooldown(&mut self, seconds: i64) {
        self.resend_epoch += 1;
        self.resend = if seconds > 0 {
            ResendControl::CoolingDown {
                remaining: seconds.unsigned_abs(),
            }
        } else {
            ResendControl::Ready
        };
        let (on_tick, on_expire) =
            timer_callbacks(self.timer_tx.clone(), TimerKind::Resend, self.resend_epoch);
        self.resend_timer.restart(seconds, on_tick, on_expire);
    }

    fn start_expiry(&mut self, seconds: i64) {
        self.expiry_epoch += 1;
        self.expiry = if seconds > 0 {
            ExpiryStatus::Running {
                label: EXPIRY_LABEL.to_string(),
                remaining: seconds.unsigned_abs(),
            }
        } else {
            ExpiryStatus::Expired
        };
        let (on_tick, on_expire) =
            timer_callbacks(self.timer_tx.clone(), TimerKind::Expiry, self.expiry_epoch);
        self.expiry_timer.restart(seconds, on_tick, on_expire);
    }
}

/// Callbacks that forward a countdown's ticks into the controller's loop.
fn timer_callbacks(
    timer_tx: mpsc::UnboundedSender<TimerEvent>,
    timer: TimerKind,
    epoch: u64,
) -> (impl FnMut(u64) + Send + 'static, impl FnOnce() + Send + 'static) {
    let tick_tx = timer_tx.clone();
    let on_tick = move |remaining| {
        let event = TimerEvent {
            timer,
            epoch,
            tick: TimerTick::Tick(remaining),
        };
        if tick_tx.send(event).is_err() {
            tracing::debug!(?timer, "Timer tick with no listener");
        }
    };
    let on_expire = move || {
        let event = TimerEvent {
            timer,
            epoch,
            tick: TimerTick::Expired,
        };
        if timer_tx.send(event).is_err() {
            tracing::debug!(?timer, "Timer expiry with no listener");
        }
    };
    (on_tick, on_expire)
}
