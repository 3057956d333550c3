//! Tick console - play a story from the terminal
//!
//! Reads one signal per line from stdin: an intent followed by optional
//! `role=value` entities, e.g. `move cell=5`.

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tick_engine::{
    DevToolsProvider, EngineConfig, HandlerRegistry, SendError, Sender, SessionKey, SessionManager,
    StoryDefinition, UserSignal,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_STORY_PATH: &str = "stories/tic_tac_toe.json";
const CONSOLE_USER: &str = "console";

/// Prints action names where a real transport would render their content
struct StdoutSender;

#[async_trait]
impl Sender for StdoutSender {
    async fn send_message(&self, _session: &SessionKey, action: &str) -> Result<(), SendError> {
        println!("> {action}");
        Ok(())
    }

    async fn send_final_message(&self, _session: &SessionKey, action: &str) -> Result<(), SendError> {
        println!("> {action} (end of story)");
        Ok(())
    }

    async fn send_debug(&self, _session: &SessionKey, text: &str) -> Result<(), SendError> {
        println!("{text}");
        Ok(())
    }
}

fn parse_signal(line: &str) -> Option<UserSignal> {
    let mut words = line.split_whitespace();
    let mut signal = UserSignal::new(words.next()?);
    for word in words {
        match word.split_once('=') {
            Some((role, value)) => signal = signal.with_entity(role, value),
            None => {
                signal.entities.insert(word.to_string(), None);
            }
        }
    }
    Some(signal)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tick_engine=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    let config = EngineConfig::from_env();

    // Duplicate handler names are a deployment error
    let registry = Arc::new(HandlerRegistry::builder().register_provider(&DevToolsProvider)?.build());
    tracing::info!(handlers = ?registry.by_namespace(), "Handler registry initialized");
    for (namespace, def) in registry.definitions() {
        tracing::debug!(
            namespace = %namespace,
            handler = %def.name,
            description = %def.description,
            inputs = ?def.input_contexts,
            outputs = ?def.output_contexts,
            "Handler available"
        );
    }

    let path = config
        .story_path
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_STORY_PATH));
    let story = StoryDefinition::load(&path, &registry)?;
    let key = SessionKey::new(story.id(), CONSOLE_USER);

    let mut manager = SessionManager::new(registry, Arc::new(StdoutSender), config);
    manager.activate(story);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let Some(signal) = parse_signal(&line) else {
            continue;
        };

        match manager.process_turn(&key, signal, CancellationToken::new()).await {
            Ok(outcome) if outcome.is_final => {
                println!("Story finished. A new signal starts over.");
            }
            Ok(outcome) => {
                if let Some(story) = outcome.redirect {
                    println!("Redirected to story <{story}>. A new signal starts over.");
                }
            }
            Err(e) if e.is_recoverable() => println!("! {e}"),
            Err(e) => {
                tracing::error!(error = %e, "Unrecoverable turn failure");
                return Err(e.into());
            }
        }

        // No storage behind the console, the log is the record
        for session in manager.take_archived().await {
            tracing::info!(
                session = %session.key,
                id = %session.id,
                history = ?session.history,
                "Archived session"
            );
        }
    }

    Ok(())
}
