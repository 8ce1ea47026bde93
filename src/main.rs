//! file-agent - interactive entry point
//!
//! Reads user turns from stdin and runs each through the agent loop.

use std::future::Future;
use std::io::Write;

use file_agent::agent::events::{self, EventReceiver};
use file_agent::agent::{Agent, AgentError, AgentEvent};
use file_agent::config::Config;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so they do not interleave with the conversation
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "file_agent=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = Config::from_env()?;
    info!(
        "Loaded configuration: model={}, workspace={}",
        config.model.model,
        config.workspace_path.display()
    );

    let (events_tx, mut events_rx) = events::channel();
    let agent = Agent::new(&config)?.with_events(events_tx);

    let mut conversation = agent.new_conversation();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!(
        "Agent started in {}. Type 'exit' or 'quit' to end.",
        agent.workspace().display()
    );

    loop {
        print!("You: ");
        std::io::stdout().flush()?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            println!("\nExiting...");
            break;
        };

        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if is_exit(input) {
            break;
        }

        let cancel = CancellationToken::new();
        let interrupt = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    cancel.cancel();
                }
            })
        };

        let turn = agent.run_turn_cancellable(&mut conversation, input, &cancel);
        let result = with_events(turn, &mut events_rx, render_event).await;
        interrupt.abort();

        match result {
            Ok(outcome) => println!("Assistant: {}", outcome.answer),
            Err(AgentError::Cancelled) => println!("\n(turn cancelled, conversation unchanged)"),
            Err(e) => eprintln!("Error: {}", e),
        }
    }

    info!("Session ended after {} messages", conversation.len());
    Ok(())
}

fn is_exit(input: &str) -> bool {
    input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit")
}

/// Await `turn`, rendering its events as they arrive. Every event sent
/// before the turn finished is rendered before this returns.
async fn with_events<F: Future>(
    turn: F,
    events: &mut EventReceiver,
    mut render: impl FnMut(&AgentEvent),
) -> F::Output {
    tokio::pin!(turn);
    let output = loop {
        tokio::select! {
            biased;
            Some(event) = events.recv() => render(&event),
            output = &mut turn => break output,
        }
    };
    while let Ok(event) = events.try_recv() {
        render(&event);
    }
    output
}

fn render_event(event: &AgentEvent) {
    match event {
        AgentEvent::ToolCall { name, args, .. } => {
            let args = args
                .iter()
                .map(|(k, v)| format!("{}={}", k, preview(v, 60)))
                .collect::<Vec<_>>()
                .join(", ");
            eprintln!("  -> {}({})", name, args);
        }
        AgentEvent::ToolResult { name, payload, .. } => match payload.error_message() {
            Some(error) => eprintln!("  <- {} failed: {}", name, error),
            None => eprintln!("  <- {} ok", name),
        },
        _ => {}
    }
}

fn preview(value: &str, max_chars: usize) -> String {
    let flat = value.replace('\n', "\\n");
    if flat.chars().count() <= max_chars {
        flat
    } else {
        format!("{}...", flat.chars().take(max_chars).collect::<String>())
    }
}
