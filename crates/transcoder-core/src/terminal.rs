//! Terminal Control.
//!
//! Raw termios manipulation is replaced with `crossterm`'s raw-mode calls
//! (`crossterm::terminal::{enable_raw_mode, disable_raw_mode}`).

use crossterm::tty::IsTty;

pub struct TerminalControl {
    raw_mode_enabled: bool,
}

impl TerminalControl {
    /// If stdin is a TTY and `interactive` is requested, switches it to
    /// raw/no-echo mode. No-op (and no error) otherwise.
    pub fn enable(interactive: bool) -> std::io::Result<Self> {
        let should_enable = interactive && std::io::stdin().is_tty();
        if should_enable {
            crossterm::terminal::enable_raw_mode()?;
        }
        Ok(Self {
            raw_mode_enabled: should_enable,
        })
    }

    /// Restores the original terminal settings. Idempotent: safe to call
    /// from both the normal cleanup path and a signal-driven abort path.
    pub fn restore(&mut self) -> std::io::Result<()> {
        if self.raw_mode_enabled {
            crossterm::terminal::disable_raw_mode()?;
            self.raw_mode_enabled = false;
        }
        Ok(())
    }

    pub fn is_raw(&self) -> bool {
        self.raw_mode_enabled
    }
}

impl Drop for TerminalControl {
    fn drop(&mut self) {
        let _ = self.restore();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_when_not_interactive() {
        let t = TerminalControl::enable(false).unwrap();
        assert!(!t.is_raw());
    }

    #[test]
    fn restore_is_idempotent() {
        let mut t = TerminalControl::enable(false).unwrap();
        t.restore().unwrap();
        t.restore().unwrap();
        assert!(!t.is_raw());
    }
}
