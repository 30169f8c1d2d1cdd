//! Conversation orchestration: the controller state machine and the typed
//! events it consumes and publishes.

pub mod controller;
pub mod events;

pub use controller::{Controller, GatewayReply, Operation, PendingCall};
pub use events::{Notification, RejectReason, UiEvent};
