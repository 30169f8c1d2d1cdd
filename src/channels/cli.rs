//! CLI channel: stdin/stdout front-end for the conversation controller.
//!
//! Lines typed on stdin become [`UiEvent`]s; controller notifications are
//! rendered back to the terminal. Bot messages go to stdout, status lines to
//! stderr so the transcript can be piped on its own.

use std::io::BufRead;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;

use crate::conversation::{Notification, UiEvent};
use crate::error::ChannelError;
use crate::onboarding::{ExpiryStatus, ResendControl, Stage};
use crate::transcript::Sender;

/// Input queue depth between the stdin reader and the controller.
const INPUT_BUFFER: usize = 32;

/// Countdowns are printed on every whole multiple of this many seconds.
const COUNTDOWN_STEP_SECS: u64 = 10;
/// ...and on every second once this close to zero.
const COUNTDOWN_FINAL_SECS: u64 = 5;

/// What one line of stdin means.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputCommand {
    Event(UiEvent),
    Quit,
    Ignore,
}

/// Interpret a line of stdin given the stage the conversation is in.
///
/// `/resend` always asks for a new code; a bare `resend` (any case) does too,
/// but only while a code is awaited, so it stays an ordinary answer elsewhere.
pub fn parse_input(line: &str, stage: Stage) -> InputCommand {
    let line = line.trim();
    if line.is_empty() {
        return InputCommand::Ignore;
    }
    match line {
        "/quit" | "/exit" => InputCommand::Quit,
        "/resend" => InputCommand::Event(UiEvent::ResendRequested),
        _ if stage == Stage::AwaitingVerificationCode && line.eq_ignore_ascii_case("resend") => {
            InputCommand::Event(UiEvent::ResendRequested)
        }
        _ => InputCommand::Event(UiEvent::UserSubmitted(line.to_string())),
    }
}

/// A rendered line and where it goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Output {
    /// Bot speech, on stdout.
    Transcript(String),
    /// Everything else, on stderr.
    Status(String),
}

/// Render a notification, or `None` when it has nothing to show.
pub fn render(notification: &Notification) -> Option<Output> {
    match notification {
        // The user already sees what they typed.
        Notification::MessageAppended { message } if message.sender == Sender::User => None,
        Notification::MessageAppended { message } => Some(Output::Transcript(message.text.clone())),
        Notification::StageChanged { stage } => Some(Output::Status(format!("ℹ️  Stage: {stage}"))),
        Notification::InputChanged {
            enabled: true,
            placeholder,
        } => Some(Output::Status(format!("✏️  {placeholder}"))),
        Notification::InputChanged {
            enabled: false,
            placeholder,
        } => Some(Output::Status(format!("🔒 {placeholder}"))),
        Notification::Busy { busy: true } => {
            Some(Output::Status("⏳ Waiting for the server...".to_string()))
        }
        Notification::Busy { busy: false } => None,
        Notification::Resend { control } => match control {
            ResendControl::Hidden => None,
            ResendControl::CoolingDown { remaining } => announce(*remaining)
                .then(|| Output::Status(format!("🔁 Resend available in {remaining}s"))),
            ResendControl::Ready => Some(Output::Status(
                "🔁 You can request a new code with /resend".to_string(),
            )),
        },
        Notification::Expiry { status } => match status {
            ExpiryStatus::Hidden => None,
            ExpiryStatus::Running { label, remaining } => announce(*remaining)
                .then(|| Output::Status(format!("⏱️  {label}: expires in {remaining}s"))),
            ExpiryStatus::Expired => Some(Output::Status(
                "⌛ The code has expired. Request a new one with /resend".to_string(),
            )),
        },
        Notification::InputRejected { reason } => {
            Some(Output::Status(format!("⚠️  Not sent: {reason}")))
        }
    }
}

fn announce(remaining: u64) -> bool {
    remaining % COUNTDOWN_STEP_SECS == 0 || remaining <= COUNTDOWN_FINAL_SECS
}

/// Forward parsed lines until EOF, `/quit`, a read error, or the receiver
/// going away. Blocking; run it off the runtime.
fn read_commands<R: BufRead>(
    reader: R,
    tx: mpsc::Sender<UiEvent>,
    stage_rx: watch::Receiver<Stage>,
) {
    for line in reader.lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                tracing::error!("Error reading stdin: {}", e);
                break;
            }
        };
        let stage = *stage_rx.borrow();
        match parse_input(&line, stage) {
            InputCommand::Event(event) => {
                if tx.blocking_send(event).is_err() {
                    break;
                }
            }
            InputCommand::Quit => break,
            InputCommand::Ignore => {}
        }
    }
    tracing::debug!("CLI input closed");
}

/// A simple CLI channel that reads from stdin and writes to the terminal.
pub struct CliChannel {
    stage_tx: watch::Sender<Stage>,
    started: AtomicBool,
}

impl CliChannel {
    pub fn new() -> Self {
        let (stage_tx, _rx) = watch::channel(Stage::default());
        Self {
            stage_tx,
            started: AtomicBool::new(false),
        }
    }

    /// Spawn the stdin reader. The returned receiver closes on EOF or `/quit`.
    pub fn start(&self) -> Result<mpsc::Receiver<UiEvent>, ChannelError> {
        // Only one reader may own stdin.
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(ChannelError::StartupFailed {
                name: "cli".into(),
                reason: "already started".into(),
            });
        }
        let (tx, rx) = mpsc::channel(INPUT_BUFFER);
        let stage_rx = self.stage_tx.subscribe();

        // A blocking read on its own thread: it never holds the runtime open,
        // so the process can exit while a read is still pending.
        std::thread::Builder::new()
            .name("cli-stdin".into())
            .spawn(move || read_commands(std::io::stdin().lock(), tx, stage_rx))
            .map_err(|e| ChannelError::StartupFailed {
                name: "cli".into(),
                reason: e.to_string(),
            })?;

        Ok(rx)
    }

    /// Spawn the renderer. It ends when the controller drops its sender.
    pub fn spawn_renderer(
        &self,
        mut notifications: broadcast::Receiver<Notification>,
    ) -> JoinHandle<()> {
        let stage_tx = self.stage_tx.clone();
        tokio::spawn(async move {
            loop {
                match notifications.recv().await {
                    Ok(notification) => {
                        if let Notification::StageChanged { stage } = &notification {
                            stage_tx.send_replace(*stage);
                        }
                        match render(&notification) {
                            Some(Output::Transcript(text)) => println!("\n{}\n", text),
                            Some(Output::Status(line)) => eprintln!("{}", line),
                            None => {}
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Renderer fell behind");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}

impl Default for CliChannel {
    fn default() -> Self {
        Self::new()
    }
}
