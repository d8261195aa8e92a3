pub mod commands;

use std::io::{self, Write};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::app::{AppState, StartupError};
use crate::auth::AuthError;
use crate::chat::ChatError;
use crate::cli::commands::{Commands, HistoryAction};
use crate::config::AppConfig;
use crate::db::{ChatMessage, Conversation, MessageStatus, Role, StoreError};

const FIRST_SNAPSHOT_WAIT: Duration = Duration::from_secs(2);

#[derive(Debug, Error)]
pub enum CliError {
    #[error("Failed to load config: {0}")]
    Config(#[from] config::ConfigError),
    #[error(transparent)]
    Startup(#[from] StartupError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("{}", .0.user_message())]
    Auth(#[from] AuthError),
    #[error("No identity.uid configured")]
    NoIdentity,
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub async fn run_cli(command: Commands, config_path: String) -> Result<(), CliError> {
    let config = AppConfig::load(&config_path)?;

    match command {
        Commands::Serve => unreachable!("serve is handled by main"),
        Commands::Chat => {
            let state = AppState::build(&config)?;
            run_repl(state).await
        }
        Commands::History { action } => {
            let state = AppState::build(&config)?;
            let owner = config
                .identity
                .uid
                .filter(|uid| !uid.trim().is_empty())
                .ok_or(CliError::NoIdentity)?;
            run_history(&state, &owner, action)
        }
    }
}

fn run_history(state: &AppState, owner: &str, action: HistoryAction) -> Result<(), CliError> {
    match action {
        HistoryAction::List => {
            let messages = state.store.list(owner)?;
            if messages.is_empty() {
                println!("No messages found.");
            } else {
                println!("{:<26} | {:<9} | {:<7} | {}", "Sent At", "Role", "Status", "Body");
                println!("{:-<26}-+-{:-<9}-+-{:-<7}-+-{:-<20}", "", "", "", "");
                for m in messages {
                    println!(
                        "{:<26} | {:<9} | {:<7} | {}",
                        m.sent_at.format("%Y-%m-%d %H:%M:%S%.3f").to_string(),
                        m.role.as_str(),
                        m.status.as_str(),
                        m.body.replace('\n', " ")
                    );
                }
            }
        }
        HistoryAction::Export { path } => {
            let messages = state.store.list(owner)?;
            let export_path = path.unwrap_or_else(|| format!("history_{}.txt", owner));
            let mut file = std::fs::File::create(&export_path)?;

            writeln!(file, "Owner: {}", owner)?;
            writeln!(file, "Exported At: {}", chrono::Utc::now())?;
            writeln!(file, "---")?;
            for m in &messages {
                writeln!(file, "{}", format_entry(m))?;
                writeln!(file, "---")?;
            }

            println!("Exported {} messages to: {}", messages.len(), export_path);
        }
        HistoryAction::Purge => {
            let deleted = state.store.purge(owner)?;
            println!("Deleted {} messages for {}", deleted, owner);
        }
        HistoryAction::Save { title } => {
            let conversation = Conversation::from_messages(owner, state.store.list(owner)?, title);
            let count = conversation.messages.len();
            let id = state.store.save_conversation(&conversation)?;
            println!("Saved {} messages as conversation {}", count, id);
        }
        HistoryAction::Saved => {
            let conversations = state.store.conversations(owner)?;
            if conversations.is_empty() {
                println!("No saved conversations.");
            }
            for c in conversations {
                println!(
                    "{} | {} | {} messages | {} .. {}",
                    c.id.unwrap_or_default(),
                    c.title.as_deref().unwrap_or("(untitled)"),
                    c.messages.len(),
                    c.created_at.format("%Y-%m-%d %H:%M"),
                    c.last_activity.format("%Y-%m-%d %H:%M"),
                );
            }
        }
    }
    Ok(())
}

fn format_entry(m: &ChatMessage) -> String {
    format!("[{}] {}: {}", m.role.as_str().to_uppercase(), m.sent_at, m.body)
}

async fn run_repl(state: AppState) -> Result<(), CliError> {
    let orchestrator = state.orchestrator.clone();
    let mut first_snapshot = orchestrator.subscribe_messages();

    let principal = state.sign_in().await?;

    println!("--- Parlor Terminal Chat ---");
    println!("Signed in as {} <{}>", principal.display_name, principal.email);
    println!("Commands: /history /stats /clear /logout /exit");
    println!("----------------------------");

    if let Ok(Ok(history)) = tokio::time::timeout(FIRST_SNAPSHOT_WAIT, first_snapshot.recv()).await {
        for m in &history {
            print_message(m);
        }
    }
    drop(first_snapshot);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("\nYou> ");
        io::stdout().flush()?;

        let Some(input) = lines.next_line().await? else {
            break;
        };
        let text = input.trim();

        match text {
            "" => continue,
            "/exit" | "/quit" => break,
            "/clear" => {
                orchestrator.clear();
                println!("Local chat cleared.");
                continue;
            }
            "/history" => {
                for m in orchestrator.snapshot() {
                    print_message(&m);
                }
                continue;
            }
            "/stats" => {
                let stats = orchestrator.stats();
                println!(
                    "{} messages ({} from you, {} from the assistant)",
                    stats.total, stats.user_messages, stats.assistant_messages
                );
                if let Some(last) = stats.last_activity {
                    println!("Last activity: {}", last);
                }
                continue;
            }
            "/logout" => {
                state.sign_out().await?;
                println!("Signed out.");
                break;
            }
            _ => {}
        }

        println!("(assistant is typing...)");
        match orchestrator.send(text).await {
            Ok(Some(report)) => print_message(&report.reply),
            Ok(None) => {}
            Err(ChatError::Completion { error, apology }) => {
                print_message(&apology);
                eprintln!("Error: {}", error.user_message());
            }
            Err(e) => eprintln!("Error: {}", e),
        }
    }

    orchestrator.stop();
    Ok(())
}

fn print_message(m: &ChatMessage) {
    let marker = match m.status {
        MessageStatus::Error => " (!)",
        _ => "",
    };
    let speaker = match m.role {
        Role::User => "You",
        Role::Assistant => "Parlor",
    };
    println!("{}{}> {}", speaker, marker, m.body);
}
