use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::fmt::time::ChronoLocal;
use voxcoach_client::{
    ClientConfig, HttpCredentialProvider, SessionController, SessionState, TraceSink, UiState,
    WsTransport,
};
use voxcoach_types::EvaluationPayload;

/// Terminal front end for a voice-coaching session. Connects, talks,
/// and on Ctrl-C waits for the evaluation before disconnecting.
#[derive(Parser)]
#[command(name = "voxcoach")]
struct Cli {
    /// Participant display name (a random one is generated if omitted)
    #[arg(long)]
    name: Option<String>,

    /// Join a specific room instead of letting the API create one
    #[arg(long)]
    room: Option<String>,

    /// Request a performance evaluation when the session ends
    #[arg(long)]
    evaluate: bool,

    /// How long to wait for the evaluation after requesting it
    #[arg(long, default_value_t = 45)]
    grace_secs: u64,

    /// Token endpoint of the API service
    #[arg(long, default_value = "http://localhost:3000/api/token")]
    token_endpoint: String,

    /// Override the reported user agent (affects audio-unlock behavior)
    #[arg(long)]
    user_agent: Option<String>,

    /// Verbose state logging
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(if args.debug {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .with_timer(ChronoLocal::rfc_3339())
        .init();

    let mut builder = ClientConfig::builder()
        .with_grace_window(Duration::from_secs(args.grace_secs))
        .with_debug(args.debug);
    if let Some(name) = &args.name {
        builder = builder.with_participant_name(name);
    }
    if let Some(room) = &args.room {
        builder = builder.with_room_name(room);
    }
    if let Some(ua) = &args.user_agent {
        builder = builder.with_user_agent(ua);
    }
    let config = builder.build();

    let mut controller = SessionController::new(
        config,
        Box::new(HttpCredentialProvider::new(&args.token_endpoint)),
        Box::new(WsTransport::new()),
        Box::new(TraceSink::new()),
    );
    tracing::info!(platform = ?controller.platform(), "session controller ready");

    let render = tokio::spawn(render_ui(controller.ui_state()));

    controller
        .start(args.evaluate)
        .await
        .context("Failed to start session")?;

    tracing::info!("session running; press Ctrl-C to stop");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    // stop() blocks through the evaluation grace window when opted in.
    controller.stop().await;

    if let Some(evaluation) = controller.current().evaluation {
        print_evaluation(&evaluation);
    } else if args.evaluate {
        tracing::warn!("no evaluation arrived within the grace window");
    }

    controller.shutdown().await;
    render.abort();
    Ok(())
}

/// Logs UI transitions as they happen; stands in for a reactive view.
async fn render_ui(mut rx: tokio::sync::watch::Receiver<UiState>) {
    loop {
        let ui = rx.borrow_and_update().clone();
        match ui.state {
            SessionState::Disconnected => {
                if let Some(err) = &ui.last_error {
                    tracing::error!("disconnected: {}", err);
                } else {
                    tracing::info!("disconnected");
                }
            }
            SessionState::Connecting => tracing::info!("connecting..."),
            SessionState::Connected => tracing::info!(
                muted = ui.muted,
                agent_speaking = ui.agent_speaking,
                "connected"
            ),
            SessionState::Evaluating => tracing::info!("waiting for evaluation..."),
        }
        if rx.changed().await.is_err() {
            break;
        }
    }
}

fn print_evaluation(evaluation: &EvaluationPayload) {
    if let Some(err) = &evaluation.error {
        println!("Evaluation failed: {err}");
        return;
    }
    println!("=== Session evaluation ===");
    if let Some(score) = evaluation.overall_score {
        println!("Overall score: {score:.1}");
    }
    for category in &evaluation.categories {
        println!("  {}: {:.1}", category.name, category.score);
    }
    if !evaluation.strengths.is_empty() {
        println!("Strengths:");
        for item in &evaluation.strengths {
            println!("  + {item}");
        }
    }
    if !evaluation.improvements.is_empty() {
        println!("Improvements:");
        for item in &evaluation.improvements {
            println!("  - {item}");
        }
    }
    for reference in &evaluation.training_references {
        match &reference.url {
            Some(url) => println!("See: {} ({url})", reference.title),
            None => println!("See: {}", reference.title),
        }
    }
    if let Some(summary) = &evaluation.summary {
        println!("{summary}");
    }
}
