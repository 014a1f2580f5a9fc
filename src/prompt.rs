//! Operator interaction before the relaunch.
//!
//! The pause gives the operator a chance to read the update summary before
//! YMU takes over the screen again. It is a blocking call; the transaction
//! runs it on a blocking thread and can abandon it on cancellation.

use colored::Colorize;
use std::io::{BufRead, IsTerminal, Write};
use std::time::Duration;
use tracing::debug;

/// Pauses until the operator is ready to continue.
pub trait OperatorPrompt: Send + Sync {
    /// Show `message` and block until the operator continues.
    fn pause(&self, message: &str);
}

/// [`OperatorPrompt`] for an interactive console.
///
/// With a terminal on stdin it waits for Enter. Without one (started from a
/// script or by YMU itself) it continues on its own after `auto_continue`.
#[derive(Debug, Clone, Copy)]
pub struct TerminalPrompt {
    auto_continue: Duration,
}

impl TerminalPrompt {
    /// Create a prompt that continues after `auto_continue` when no terminal is attached.
    pub fn new(auto_continue: Duration) -> Self {
        Self { auto_continue }
    }
}

impl OperatorPrompt for TerminalPrompt {
    fn pause(&self, message: &str) {
        let stdin = std::io::stdin();
        if stdin.is_terminal() {
            print!("{} ", message.bold());
            let _ = std::io::stdout().flush();
            let mut line = String::new();
            if let Err(e) = stdin.lock().read_line(&mut line) {
                debug!("Failed to read from stdin: {}", e);
            }
        } else {
            println!(
                "{} {}",
                message,
                format!("(continuing in {}s)", self.auto_continue.as_secs()).dimmed()
            );
            std::thread::sleep(self.auto_continue);
        }
    }
}

/// [`OperatorPrompt`] that never waits.
#[derive(Debug, Default, Clone, Copy)]
pub struct AutoContinue;

impl OperatorPrompt for AutoContinue {
    fn pause(&self, message: &str) {
        debug!("Skipping pause: {}", message);
    }
}
