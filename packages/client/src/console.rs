//! Interactive control prompt.
//!
//! Reads `start`, `stop`, `status` and `quit` from the terminal and forwards
//! them to the lifecycle controller.

use std::{future::Future, str::FromStr};

use rustyline::{DefaultEditor, error::ReadlineError};
use tokio::sync::mpsc;

use crate::lifecycle::{ControlSignal, LifecycleController};

const PROMPT: &str = "livetrack> ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleCommand {
    Control(ControlSignal),
    Status,
    Quit,
}

impl FromStr for ConsoleCommand {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        match line.trim().to_ascii_lowercase().as_str() {
            "start" => Ok(Self::Control(ControlSignal::Start)),
            "stop" => Ok(Self::Control(ControlSignal::Stop)),
            "status" => Ok(Self::Status),
            "quit" | "exit" => Ok(Self::Quit),
            other => Err(format!(
                "Unknown command '{}' (start, stop, status, quit)",
                other
            )),
        }
    }
}

/// Spawn the blocking readline thread and return the command channel.
///
/// The channel closes on Ctrl+C, Ctrl+D or a readline error.
pub fn spawn_console() -> mpsc::UnboundedReceiver<ConsoleCommand> {
    let (command_tx, command_rx) = mpsc::unbounded_channel();

    std::thread::spawn(move || {
        let mut rl = match DefaultEditor::new() {
            Ok(rl) => rl,
            Err(e) => {
                tracing::error!("Failed to initialize readline: {}", e);
                return;
            }
        };

        loop {
            match rl.readline(PROMPT) {
                Ok(line) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    rl.add_history_entry(line).ok();
                    match line.parse::<ConsoleCommand>() {
                        Ok(command) => {
                            let quit = command == ConsoleCommand::Quit;
                            if command_tx.send(command).is_err() || quit {
                                break;
                            }
                        }
                        Err(message) => eprintln!("{}", message),
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    tracing::info!("Interrupted");
                    break;
                }
                Err(ReadlineError::Eof) => {
                    tracing::info!("EOF");
                    break;
                }
                Err(err) => {
                    tracing::error!("Readline error: {}", err);
                    break;
                }
            }
        }
    });

    command_rx
}

/// Drive the controller from console commands until quit or `shutdown` fires.
pub async fn run_console(
    controller: &LifecycleController,
    mut commands: mpsc::UnboundedReceiver<ConsoleCommand>,
    shutdown: impl Future<Output = ()>,
) {
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            command = commands.recv() => match command {
                Some(ConsoleCommand::Control(signal)) => controller.handle(signal).await,
                Some(ConsoleCommand::Status) => {
                    let status = if controller.is_running() { "active" } else { "stopped" };
                    println!("Tracking {}", status);
                }
                Some(ConsoleCommand::Quit) | None => break,
            },
        }
    }
}
