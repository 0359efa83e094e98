//! A terminal client that chats in one conversation.

#[macro_use]
extern crate tracing;

use std::env;
use std::io::Write as _;
use std::pin::pin;
use std::time::Duration;

use chatline_core::{
    ChatClientBuilder, ConversationTranscript, SendOutcome, SendStatus,
};
use chatline_http::{HttpBackend, HttpConfigBuilder};
use chatline_protocol::{Role, SendRequest};
use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use tokio::io::{self, AsyncBufReadExt};
use tokio::select;
use tokio::sync::mpsc;
use tokio::time::sleep;

const BAR_CHAR: &str = "▎";

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let Ok(base_url) = env::var("CHATLINE_BASE_URL") else {
        eprintln!("CHATLINE_BASE_URL environment variable is not set");
        return;
    };
    let Ok(token) = env::var("CHATLINE_TOKEN") else {
        eprintln!("CHATLINE_TOKEN environment variable is not set");
        return;
    };
    let Ok(conversation_id) = env::var("CHATLINE_CONVERSATION") else {
        eprintln!("CHATLINE_CONVERSATION environment variable is not set");
        return;
    };
    let model = env::var("CHATLINE_MODEL").ok();

    let config = HttpConfigBuilder::with_base_url(base_url)
        .with_token(token)
        .build();
    debug!("using {config:?}");
    let backend = HttpBackend::new(config);

    let (update_tx, mut update_rx) = mpsc::unbounded_channel();
    let client = ChatClientBuilder::with_backend(backend)
        .on_update(move |transcript| {
            update_tx.send(transcript.clone()).ok();
        })
        .build();

    let synced = client.refresh(&conversation_id).await;
    let history = client.transcript(&conversation_id);
    // A fresh transcript only holds messages if the conversation loaded.
    let loaded = !history.messages().is_empty();
    if loaded {
        print_history(&history);
    }
    if let Some(warning) = load_warning(&conversation_id, loaded, synced) {
        warn!("{warning}");
    }
    // The history has been printed already.
    while update_rx.try_recv().is_ok() {}

    let progress_style = match ProgressStyle::with_template("{spinner} {msg}")
    {
        Ok(style) => style.tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
        Err(err) => {
            error!("invalid progress template: {err}");
            ProgressStyle::default_spinner()
        }
    };

    loop {
        print!("> ");
        std::io::stdout().flush().ok();

        let Some(line) = read_line().await else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let mut req = SendRequest::new(line);
        if let Some(model) = &model {
            req = req.with_model(model);
        }
        let task = client.submit(&conversation_id, req);
        debug!("submitted {}", task.send_id());

        let progress_bar = ProgressBar::new_spinner();
        progress_bar.set_style(progress_style.clone());
        progress_bar.set_message("Waiting for reply...");

        let mut join = pin!(task.join());
        let mut printed = 0;
        let mut started = false;
        let outcome = loop {
            let tick = sleep(Duration::from_millis(100));
            select! {
                outcome = &mut join => break outcome,
                Some(transcript) = update_rx.recv() => {
                    let Some(content) = transcript.streaming_content() else {
                        continue;
                    };
                    // A replaced buffer starts over.
                    let delta = content.get(printed..).unwrap_or(content);
                    if delta.is_empty() {
                        continue;
                    }
                    if !started {
                        progress_bar.finish_and_clear();
                        print!("{}", BAR_CHAR.bright_cyan());
                        started = true;
                    }
                    print!("{}", delta.bright_white());
                    std::io::stdout().flush().ok();
                    printed = content.len();
                }
                _ = tick => {
                    if !started {
                        progress_bar.tick();
                    }
                }
            }
        };
        progress_bar.finish_and_clear();
        if started {
            println!();
        }
        while update_rx.try_recv().is_ok() {}

        match outcome {
            Ok(outcome) => {
                print_outcome(&outcome, &client.transcript(&conversation_id))
            }
            Err(err) => error!("{err}"),
        }
    }
}

fn load_warning(
    conversation_id: &str,
    loaded: bool,
    synced: bool,
) -> Option<String> {
    match (loaded, synced) {
        (_, true) => None,
        (true, false) => {
            Some(format!("could not load the usage of {conversation_id}"))
        }
        (false, false) => {
            Some(format!("could not load conversation {conversation_id}"))
        }
    }
}

fn print_history(transcript: &ConversationTranscript) {
    if let Some(title) = transcript.title() {
        println!("{}", title.bold());
    }
    for msg in transcript.messages() {
        let bar = match msg.role {
            Role::User => BAR_CHAR.bright_green().to_string(),
            Role::Assistant => BAR_CHAR.bright_cyan().to_string(),
            Role::System => BAR_CHAR.bright_black().to_string(),
        };
        println!("{bar}{}", msg.content);
    }
}

fn print_outcome(outcome: &SendOutcome, transcript: &ConversationTranscript) {
    match outcome.status {
        SendStatus::Failed => {
            let error = outcome.error.as_deref().unwrap_or("unknown error");
            println!("{}{}", BAR_CHAR.bright_red(), error.red());
        }
        SendStatus::Cancelled => {
            println!("{}{}", BAR_CHAR.bright_yellow(), "cancelled".yellow());
        }
        _ => {}
    }
    let usage = transcript.usage();
    let summary = format!(
        "tokens: {} prompt, {} completion, {} total",
        usage.prompt_tokens, usage.completion_tokens, usage.total_tokens
    );
    if outcome.reconciled {
        println!("{}", summary.dimmed());
    } else {
        println!("{} {}", summary.dimmed(), "(unsynced)".dimmed());
    }
}

async fn read_line() -> Option<String> {
    let mut stdin = io::BufReader::new(io::stdin());
    let mut line = String::new();

    match stdin.read_line(&mut line).await {
        Ok(count) => {
            if count == 0 {
                return None;
            }
            Some(line)
        }
        Err(err) => {
            error!("error reading input: {}", err);
            None
        }
    }
}
