//! Interactive urology assistant backed by the Gemini API.
//!
//! This binary provides a streaming REPL: each question is wrapped with the
//! active role and answered as the model streams.
//!
//! # Usage
//!
//! ```bash
//! # Basic usage with default settings (reads GEMINI_API_KEY, or .env)
//! urochat
//!
//! # Ask as a medical student with a longer answer budget
//! urochat --role student --max-tokens 4096
//!
//! # Keep the conversation when settings change; apply them on /reset
//! urochat --policy defer
//!
//! # Load defaults from a YAML file; flags still win
//! urochat --config urochat.yaml --no-color
//! ```
//!
//! # Commands
//!
//! While chatting, you can use slash commands:
//! - `/role [role]` - Show or set your role
//! - `/temperature <v>` and `/max_tokens <n>` - Change generation settings
//! - `/reset` - Clear the conversation
//! - `/history` - Replay the conversation
//! - `/about` - About this assistant
//! - `/quit` - Exit the application
//!
//! Set `UROCHAT_LOG` (e.g. `UROCHAT_LOG=urochat=debug`) for diagnostics on
//! stderr.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use arrrg::CommandLine;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tracing_subscriber::EnvFilter;

use urochat::chat::{
    ChatArgs, ChatCommand, ChatConfig, ChatSession, ParamsChange, PlainTextRenderer, Renderer,
    UserRole, about_text, help_text, input_hint, parse_command, render_history,
};
use urochat::{API_KEY_ENV, Error, Gemini, ModelProvider};

/// Environment variable holding the log filter.
const LOG_ENV: &str = "UROCHAT_LOG";

/// Main entry point for the urochat application.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // A missing .env file is fine; the environment may already be set up.
    let _ = dotenvy::dotenv();
    init_logging();

    let collector = biometrics::Collector::new();
    urochat::register_biometrics(collector);

    let (args, _) = ChatArgs::from_command_line_relaxed("urochat [OPTIONS]");
    let config = ChatConfig::try_from(args)?;
    let use_color = config.use_color;

    let mut rl = DefaultEditor::new()?;
    let mut renderer = PlainTextRenderer::with_color(use_color);

    println!("⚕️ Urology Medical Assistant (Gemini 2.5 Pro)");
    println!("Get information about urological conditions with symptoms and image references\n");

    let client = match connect(&mut rl) {
        Ok(client) => client,
        Err(err) => {
            renderer.print_error(&err.to_string());
            std::process::exit(1);
        }
    };
    let mut session = ChatSession::new(Arc::new(client), config);

    // Flag for interrupt handling during streaming
    let interrupted = Arc::new(AtomicBool::new(false));
    let interrupted_clone = interrupted.clone();
    ctrlc::set_handler(move || {
        interrupted_clone.store(true, Ordering::Relaxed);
    })?;
    let mut renderer = renderer.with_interrupt(interrupted.clone());

    println!("{}\n", about_text());
    println!(
        "Model: {} | Role: {}",
        session.config().model,
        session.role()
    );
    println!("Type /help for commands, /quit to exit\n");
    renderer.print_info(&input_hint(session.role()));

    loop {
        // Reset interrupt flag before each input
        interrupted.store(false, Ordering::Relaxed);

        let readline = rl.readline("You: ");

        match readline {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                let _ = rl.add_history_entry(line);

                // Check for slash commands
                if let Some(cmd) = parse_command(line) {
                    if !handle_command(cmd, &mut session, &mut renderer) {
                        break;
                    }
                    continue;
                }

                // Regular question - send to API
                match session.send_streaming(line, &mut renderer).await {
                    Ok(_) => {}
                    Err(err) if err.is_abort() => {
                        renderer.print_info("Conversation reset.");
                    }
                    Err(err) => {
                        renderer.print_error(&format!("Error generating response: {err}"));
                        if err.is_provider_config() {
                            break;
                        }
                    }
                }
            }
            Err(ReadlineError::Interrupted) => {
                // Ctrl+C at prompt - soft interrupt
                println!();
                continue;
            }
            Err(ReadlineError::Eof) => {
                // Ctrl+D - exit
                println!("\nGoodbye!");
                break;
            }
            Err(err) => {
                renderer.print_error(&format!("Input error: {}", err));
                break;
            }
        }
    }

    Ok(())
}

fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Build the client from the environment, asking for a key if none is set.
fn connect(rl: &mut DefaultEditor) -> Result<Gemini, Error> {
    let from_env = std::env::var(API_KEY_ENV)
        .ok()
        .filter(|key| !key.trim().is_empty());
    let api_key = match from_env {
        Some(key) => key,
        None => {
            println!("{API_KEY_ENV} is not set.");
            rl.readline("🔑 Enter your Gemini API Key: ")
                .map_err(|err| Error::credential(format!("no API key entered: {err}")))?
        }
    };
    Gemini::new(Some(api_key))
}

/// Apply one slash command; returns false when the REPL should exit.
fn handle_command<P: ModelProvider>(
    cmd: ChatCommand,
    session: &mut ChatSession<P>,
    renderer: &mut PlainTextRenderer,
) -> bool {
    match cmd {
        ChatCommand::Quit => {
            println!("Goodbye!");
            return false;
        }
        ChatCommand::Role(Some(role)) => {
            session.apply_role_change(role);
            renderer.print_info(&format!("Role set to {role}."));
            renderer.print_info(&input_hint(role));
        }
        ChatCommand::Role(None) => {
            let options: Vec<&str> = UserRole::ALL.iter().map(UserRole::label).collect();
            renderer.print_info(&format!(
                "Current role: {} (options: {})",
                session.role(),
                options.join(", ")
            ));
        }
        ChatCommand::Temperature(value) => {
            let change = session.set_temperature(value);
            report_change(renderer, &format!("temperature {value:.2}"), change);
        }
        ChatCommand::MaxTokens(value) => {
            let change = session.set_max_tokens(value);
            report_change(renderer, &format!("max_tokens {value}"), change);
        }
        ChatCommand::Reset => {
            session.reset();
            renderer.print_info("Chat history cleared.");
        }
        ChatCommand::History => {
            if session.transcript().is_empty() {
                renderer.print_info("(no messages yet)");
            } else {
                render_history(session.transcript(), renderer);
            }
        }
        ChatCommand::ShowConfig => print_config(session),
        ChatCommand::Stats => print_stats(session),
        ChatCommand::About => {
            for line in about_text().lines() {
                println!("    {}", line);
            }
        }
        ChatCommand::Help => {
            for line in help_text().lines() {
                println!("    {}", line);
            }
        }
        ChatCommand::Invalid(message) => {
            renderer.print_error(&message);
        }
    }
    true
}

fn report_change(
    renderer: &mut PlainTextRenderer,
    what: &str,
    change: urochat::Result<ParamsChange>,
) {
    match change {
        Ok(ParamsChange::Applied) => renderer.print_info(&format!("{what} set.")),
        Ok(ParamsChange::Rebound) => renderer.print_info(&format!(
            "{what} set. The model starts a fresh context with your next question; \
             earlier messages stay visible but are not sent."
        )),
        Ok(ParamsChange::Deferred) => {
            renderer.print_info(&format!("{what} will apply after /reset."))
        }
        Err(err) => renderer.print_error(&err.to_string()),
    }
}

fn print_stats<P: ModelProvider>(session: &ChatSession<P>) {
    let stats = session.stats();
    println!("    Session Statistics:");
    println!("      Model: {}", stats.model);
    println!("      Role: {}", stats.role);
    println!("      Messages: {}", stats.message_count);
    println!(
        "      Exchanges: {} completed, {} failed",
        stats.total_exchanges, stats.failed_exchanges
    );
    println!(
        "      Provider tokens: {} prompt / {} response",
        stats.total_prompt_tokens, stats.total_response_tokens
    );
    if let Some(usage) = stats.last_exchange_usage {
        println!(
            "      Last exchange: {} prompt / {} response",
            usage.prompt_token_count, usage.candidates_token_count
        );
    }
    println!(
        "      Context: {}",
        if stats.bound {
            "open"
        } else {
            "opens with next question"
        }
    );
}

fn print_config<P: ModelProvider>(session: &ChatSession<P>) {
    let stats = session.stats();
    println!("    Current Configuration:");
    println!("      Model: {}", stats.model);
    println!("      Role: {}", stats.role);
    println!("      Temperature: {:.2}", stats.temperature);
    println!("      Max tokens: {}", stats.max_tokens);
    println!("      Top-p: {:.2}", stats.top_p);
    println!("      Top-k: {}", stats.top_k);
    println!("      On settings change: {}", stats.binding_policy);
    if let Some((temperature, max_tokens)) = stats.pending {
        println!(
            "      Pending until /reset: temperature {temperature:.2}, max tokens {max_tokens}"
        );
    }
}
