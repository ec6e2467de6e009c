//! Terminal window title for the running command
//!
//! The previous title is pushed on the terminal's title stack when the guard is
//! created and popped again on [`TerminalTitle::restore`] or drop, so every exit
//! path (completion, error, interrupt) leaves the terminal as it was.

use std::io::{IsTerminal, Write};
use tracing::debug;

const PUSH_TITLE: &str = "\x1b[22;0t";
const POP_TITLE: &str = "\x1b[23;0t";

pub struct TerminalTitle {
    out: Box<dyn Write + Send>,
    active: bool,
}

impl TerminalTitle {
    /// Set the title on stderr. Does nothing when stderr is not a terminal.
    pub fn set(title: &str) -> Self {
        let stderr = std::io::stderr();
        if !stderr.is_terminal() {
            return Self {
                out: Box::new(std::io::sink()),
                active: false,
            };
        }
        Self::with_writer(Box::new(stderr), title)
    }

    pub fn with_writer(mut out: Box<dyn Write + Send>, title: &str) -> Self {
        let title: String = title.chars().filter(|c| !c.is_control()).collect();
        let active = write!(out, "{PUSH_TITLE}\x1b]0;{title}\x07")
            .and_then(|_| out.flush())
            .is_ok();
        if !active {
            debug!("Could not set terminal title");
        }
        Self { out, active }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Put the previous title back. Idempotent.
    pub fn restore(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        let _ = self
            .out
            .write_all(POP_TITLE.as_bytes())
            .and_then(|_| self.out.flush());
    }
}

impl Drop for TerminalTitle {
    fn drop(&mut self) {
        self.restore();
    }
}
