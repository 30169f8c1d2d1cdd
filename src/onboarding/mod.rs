//! Onboarding: identity collection and email verification before the interview.
//!
//! The server drives the questions; the client tracks which stage the session
//! is in and, while an emailed one-time code is pending, runs the resend
//! cooldown and code expiry countdowns.

pub mod state;
pub mod verification;

pub use state::{Candidate, Session, Stage};
pub use verification::{
    ExpiryStatus, ResendControl, ResendRefusal, TimerEvent, TimerKind, TimerTick,
    VerificationHandler, VerificationUpdate, VerificationWindow,
};
