//! Slash command handling for the chat prompt.

use crate::console::ConsoleChat;

/// Result of command execution.
#[derive(Debug, PartialEq, Eq)]
pub enum CommandResult {
    /// Continue the prompt loop
    Continue,
    /// Exit the prompt loop
    Exit,
    /// An error occurred
    Error(String),
}

/// Handle a slash command.
///
/// `writing_task` is the context hint attached to subsequent messages.
pub fn handle_command(
    input: &str,
    chat: &ConsoleChat,
    writing_task: &mut Option<String>,
) -> CommandResult {
    let (command, rest) = match input.split_once(char::is_whitespace) {
        Some((command, rest)) => (command, rest.trim()),
        None => (input, ""),
    };

    match command {
        "/help" | "/h" | "/?" => {
            print_help();
            CommandResult::Continue
        }
        "/exit" | "/quit" | "/q" => CommandResult::Exit,
        "/stop" => {
            if !chat.stop_generating() {
                println!("Nothing to stop.");
            }
            CommandResult::Continue
        }
        "/task" => {
            if rest.is_empty() {
                match writing_task.take() {
                    Some(task) => println!("Cleared writing task: {}", task),
                    None => println!("No writing task set."),
                }
            } else {
                println!("Writing task: {}", rest);
                *writing_task = Some(rest.to_string());
            }
            CommandResult::Continue
        }
        _ => CommandResult::Error(format!(
            "Unknown command: {}. Type /help for available commands.",
            command
        )),
    }
}

/// Print help information.
fn print_help() {
    println!("Available commands:");
    println!();
    println!("  /help, /h, /?     Show this help message");
    println!("  /stop             Stop the response being written");
    println!("  /task <text>      Attach a writing task to your next messages");
    println!("  /task             Clear the writing task");
    println!("  /exit, /quit, /q  Exit");
    println!();
    println!("Press Ctrl+C to stop a response, or to exit when idle.");
}
