//! Interview Assist: client-side orchestration for a server-driven
//! onboarding and interview conversation.

pub mod channels;
pub mod config;
pub mod conversation;
pub mod countdown;
pub mod error;
pub mod gateway;
pub mod onboarding;
pub mod transcript;
