//! `mindchat route`: route messages and show the composed system prompt.
//!
//! Single-message mode prints one decision. Interactive mode keeps a
//! conversation so the topic lock and its hysteresis can be observed turn by
//! turn. Interactive commands:
//!
//! - `/mode <plain_chat|counseling>`: switch the session mode
//! - `/state`: show the session's routing state
//! - `/reset`: clear the conversation and routing state
//! - `exit` / `quit`: leave

use super::{load_config, load_provider};
use mindchat_core::{ChatMode, Message, TopicSearch};
use mindchat_router::{CounselingRouter, RoutedTurn, RoutingSession, TurnOutcome};
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};

pub async fn run(
    config_path: Option<&std::path::Path>,
    message: Option<String>,
    mode: Option<ChatMode>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(config_path)?;
    let provider = load_provider(&config).await;
    let router = CounselingRouter::load(&config, provider).await?;
    let mode = mode.unwrap_or(config.app.default_mode);
    let session = router.new_session(mode);

    if let Some(msg) = message {
        // Single message mode
        let outcome = router.route_turn(&session, &[Message::user(msg)]).await;
        print_outcome(mode, outcome, true);
        return Ok(());
    }

    // Interactive mode
    println!();
    println!("  MindChat Router: Interactive Mode");
    println!("  =================================");
    println!();
    println!("  Mode:      {mode}");
    match router.provider().model_id() {
        Some(model) => println!("  Model:     {model}"),
        None => println!("  Model:     unavailable (topic routing disabled)"),
    }
    println!(
        "  Topics:    {} in catalog, {} routable",
        router.catalog().len(),
        router.index().len()
    );
    println!();
    println!("  Type a message and press Enter. Commands: /mode, /state, /reset.");
    println!("  Type 'exit' or Ctrl+C to quit.");
    println!();

    let mut conversation: Vec<Message> = Vec::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    prompt()?;
    while let Some(line) = lines.next_line().await? {
        let input = line.trim();
        match input {
            "" => {}
            "exit" | "quit" => break,
            "/state" => print_state(&session).await,
            "/reset" => {
                conversation.clear();
                session.reset().await;
                println!("  Conversation and routing state cleared.");
            }
            cmd if cmd.starts_with("/mode") => {
                let arg = cmd.trim_start_matches("/mode").trim();
                match arg.parse::<ChatMode>() {
                    Ok(mode) => {
                        router.switch_mode(&session, mode).await;
                        println!("  Mode: {mode}");
                    }
                    Err(e) => println!("  [Error] {e}"),
                }
            }
            text => {
                conversation.push(Message::user(text));
                let mode = session.mode().await;
                let outcome = router.route_turn(&session, &conversation).await;
                print_outcome(mode, outcome, false);
            }
        }
        println!();
        prompt()?;
    }

    Ok(())
}

fn prompt() -> std::io::Result<()> {
    print!("  You > ");
    std::io::stdout().flush()
}

fn print_outcome(mode: ChatMode, outcome: TurnOutcome, full_prompt: bool) {
    let RoutedTurn {
        turn,
        decision,
        prompt,
    } = match outcome {
        TurnOutcome::Applied(routed) => routed,
        TurnOutcome::Superseded { turn, latest } => {
            println!("  Turn {turn} superseded by turn {latest}");
            return;
        }
    };

    let topic = decision.topic_id.as_deref().unwrap_or("(default)");
    let similarity = decision
        .similarity
        .map(|s| format!("{s:.3}"))
        .unwrap_or_else(|| "-".into());

    println!("  Turn:       {turn}");
    println!("  Mode:       {mode}");
    println!("  Topic:      {topic}");
    println!("  Similarity: {similarity}");
    println!("  Reason:     {}", decision.reason.as_str());
    println!("  Truncated:  {}", if prompt.truncated { "yes" } else { "no" });

    if full_prompt {
        println!();
        println!("--- System prompt ---");
        println!("{}", prompt.text);
    }
}

async fn print_state(session: &RoutingSession) {
    let state = session.state().await;
    println!(
        "  Locked topic: {}",
        state.current_topic.as_deref().unwrap_or("(none)")
    );
    println!("  Turns since switch: {}", state.turns_since_switch);
    for candidate in &state.last_candidates {
        println!("    {:<14} {:.3}", candidate.topic_id, candidate.similarity);
    }
}
