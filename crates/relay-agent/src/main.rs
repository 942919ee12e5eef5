//! A simple program demonstrates how to use `relay-agent` as a library.
//!
//! The model is scripted: set `RELAY_AGENT_SCRIPT` to a JSON file with the
//! responses to replay, see `demos/email.json`.

#[macro_use]
extern crate tracing;

use std::env;
use std::io::Write as _;
use std::pin::pin;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use relay_agent::SessionBuilder;
use relay_agent::core::middleware::{Approval, Decision};
use relay_agent::core::{AgentConfig, Role};
use relay_agent_test_model::{PresetResponse, TestModelProvider};
use serde::Deserialize;
use tokio::io::{self, AsyncBufReadExt};
use tokio::select;
use tokio::sync::mpsc;
use tokio::time::sleep;

#[derive(Deserialize)]
struct Script {
    system_prompt: Option<String>,
    responses: Vec<PresetResponse>,
    #[serde(default)]
    agent: AgentConfig,
    #[serde(default)]
    blocked_keywords: Vec<String>,
}

const BAR_CHAR: &str = "▎";

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let Ok(script_path) = env::var("RELAY_AGENT_SCRIPT") else {
        eprintln!("RELAY_AGENT_SCRIPT environment variable is not set");
        return;
    };
    let script = match tokio::fs::read_to_string(&script_path).await {
        Ok(script) => script,
        Err(err) => {
            eprintln!("cannot read {script_path}: {err}");
            return;
        }
    };
    let script: Script = match serde_json::from_str(&script) {
        Ok(script) => script,
        Err(err) => {
            eprintln!("malformed script {script_path}: {err}");
            return;
        }
    };
    let thread_id =
        env::var("RELAY_AGENT_THREAD").unwrap_or_else(|_| "1".to_owned());

    let model_provider = TestModelProvider::named("scripted");
    for response in script.responses {
        model_provider.add_response(response);
    }

    let (event_tx, mut event_rx) = mpsc::unbounded_channel();

    let mut builder = SessionBuilder::with_model_provider(model_provider)
        .with_config(script.agent)
        .with_blocked_keywords(script.blocked_keywords)
        .with_thread_id(thread_id)
        .on_tool_call_request(move |approval| {
            event_tx.send(approval).ok();
        });
    if let Some(system_prompt) = script.system_prompt {
        builder = builder.with_system_prompt(system_prompt);
    }
    let session = match builder.build() {
        Ok(session) => session,
        Err(err) => {
            eprintln!("cannot start the session: {err}");
            return;
        }
    };

    let progress_style = ProgressStyle::with_template("{spinner} {wide_msg}")
        .unwrap()
        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏");

    'outer: loop {
        print!("> ");
        std::io::stdout().flush().unwrap();

        let Some(line) = read_line().await else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let mut run = pin!(session.send_message(line));
        let mut progress_bar = None;

        let result = loop {
            // Create a new progress bar if it has been finished.
            progress_bar
                .get_or_insert_with(|| {
                    let progress_bar = ProgressBar::new_spinner();
                    progress_bar.set_style(progress_style.clone());
                    progress_bar.set_message("🤔 Thinking...");
                    progress_bar
                })
                .inc(1);

            let sleep = sleep(Duration::from_millis(100));
            let approval = select! {
                result = &mut run => break result,
                approval = event_rx.recv() => {
                    let Some(approval) = approval else {
                        break 'outer;
                    };
                    approval
                },
                _ = sleep => {
                    continue;
                }
            };

            // Finish the progress bar before printing anything else.
            if let Some(progress_bar) = progress_bar.take() {
                progress_bar.finish_and_clear();
            }
            if !ask_for_approval(approval).await {
                break 'outer;
            }
        };

        if let Some(progress_bar) = progress_bar.take() {
            progress_bar.finish_and_clear();
        }

        match result {
            Ok(outcome) => {
                for msg in &outcome.messages {
                    match msg.role() {
                        Role::Tool => {
                            println!(
                                "{}🔧 {}",
                                BAR_CHAR.bright_black(),
                                msg.content().dimmed()
                            );
                        }
                        Role::Assistant if msg.tool_calls().is_empty() => {
                            println!(
                                "{}🤖 {}",
                                BAR_CHAR.bright_cyan(),
                                msg.content().bright_white()
                            );
                        }
                        _ => {}
                    }
                }
            }
            Err(err) => {
                println!("{}❌ {}", BAR_CHAR.bright_red(), err.red());
            }
        }
        println!();
    }
}

/// Prompts for a decision. Returns `false` if the input is closed.
async fn ask_for_approval(approval: Approval) -> bool {
    let bar = BAR_CHAR.bright_yellow();
    println!("\n{bar}⚠️  Agent wants to call `{}`:", approval.what());
    println!(
        "{bar}{}",
        approval.arguments().to_string().bright_white().bold()
    );
    print!("Proceed? [Y/n/e]: ");
    std::io::stdout().flush().unwrap();

    let Some(line) = read_line().await else {
        return false;
    };
    let line = line.trim();
    if line.is_empty() || line.eq_ignore_ascii_case("y") {
        approval.approve();
    } else if line.eq_ignore_ascii_case("e") && approval.allows(Decision::Edit)
    {
        print!("New arguments (JSON): ");
        std::io::stdout().flush().unwrap();
        let Some(line) = read_line().await else {
            return false;
        };
        match serde_json::from_str(line.trim()) {
            Ok(arguments) => approval.edit(arguments),
            Err(err) => {
                println!("{}", format!("invalid JSON: {err}").red());
                approval.reject(Some(format!(
                    "the user gave invalid arguments: {err}"
                )));
            }
        }
    } else {
        approval.reject(None);
    }

    println!();
    true
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
