//! Front-end channels for the conversation controller.

pub mod cli;

pub use cli::{CliChannel, InputCommand, Output, parse_input, render};
