use std::sync::Arc;

use anyhow::Context;
use interview_assist::channels::CliChannel;
use interview_assist::config::ClientConfig;
use interview_assist::conversation::Controller;
use interview_assist::error::{self, ChannelError, ConfigError};
use interview_assist::gateway::HttpGateway;
use tracing_appender::non_blocking::WorkerGuard;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let config = ClientConfig::from_env()?;

    // Keep the guard alive so buffered log lines are flushed on exit.
    let _log_guard = init_tracing(&config)?;

    eprintln!("🎙️  Interview Assist v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Server: {}", config.base_url);
    eprintln!("   Timeout: {}s", config.request_timeout.as_secs());
    if let Some(ref dir) = config.log_dir {
        eprintln!("   Logs: {}", dir.display());
    }
    eprintln!("   Type a reply and press Enter. /resend for a new code, /quit to exit.\n");

    let gateway = Arc::new(HttpGateway::from_config(&config).context("building HTTP gateway")?);
    let mut controller = Controller::new(gateway);

    let cli = CliChannel::new();
    let renderer = cli.spawn_renderer(controller.subscribe());
    let events = cli.start()?;

    let first = match config.direct_candidate.clone() {
        Some(candidate) => {
            eprintln!("   Candidate: {} <{}>\n", candidate.name, candidate.email);
            controller.start_interview(candidate)
        }
        None => controller.start_onboarding(),
    };

    let stage = controller.run(first, events).await;
    tracing::info!(run_id = %controller.session().run_id, %stage, "Conversation ended");

    // Dropping the controller closes the notification stream.
    drop(controller);
    renderer.await.map_err(|e| ChannelError::Disconnected {
        name: "cli".into(),
        reason: e.to_string(),
    })?;

    eprintln!("👋 Goodbye ({stage})");
    Ok(())
}

/// Log to stderr, or to a daily-rolling file when a log directory is set.
fn init_tracing(config: &ClientConfig) -> error::Result<Option<WorkerGuard>> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    match config.log_dir {
        Some(ref dir) => {
            std::fs::create_dir_all(dir).map_err(ConfigError::from)?;
            let appender = tracing_appender::rolling::daily(dir, "interview-assist.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(writer)
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
            Ok(None)
        }
    }
}
