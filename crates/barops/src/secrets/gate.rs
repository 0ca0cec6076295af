//! Confirmation gate for operations that reveal secrets.

use std::io::IsTerminal;

/// Phrase an operator has to type to confirm.
pub const CONFIRMATION_PHRASE: &str = "YES";

/// Outcome of the confirmation gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    Unconfirmed,
    Confirmed,
}

/// How confirmation can be obtained for this invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfirmationContext {
    /// `--yes` was passed.
    pub assume_yes: bool,
    /// Stdin is a terminal.
    pub interactive: bool,
}

impl ConfirmationContext {
    /// Context for the current process.
    #[must_use]
    pub fn detect(assume_yes: bool) -> Self {
        Self {
            assume_yes,
            interactive: std::io::stdin().is_terminal(),
        }
    }

    /// Decide whether to proceed.
    ///
    /// `--yes` confirms without prompting. Otherwise an interactive operator
    /// must type the phrase exactly; `prompt` is never called when stdin is
    /// not a terminal.
    pub fn confirm<F>(&self, prompt: F) -> Confirmation
    where
        F: FnOnce() -> Option<String>,
    {
        if self.assume_yes {
            return Confirmation::Confirmed;
        }
        if !self.interactive {
            return Confirmation::Unconfirmed;
        }
        match prompt() {
            Some(answer) if answer.trim() == CONFIRMATION_PHRASE => Confirmation::Confirmed,
            _ => Confirmation::Unconfirmed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assume_yes_skips_prompt() {
        let ctx = ConfirmationContext {
            assume_yes: true,
            interactive: false,
        };
        let decision = ctx.confirm(|| panic!("prompt must not run"));
        assert_eq!(decision, Confirmation::Confirmed);
    }

    #[test]
    fn test_non_interactive_without_yes_refuses() {
        let ctx = ConfirmationContext {
            assume_yes: false,
            interactive: false,
        };
        let decision = ctx.confirm(|| panic!("prompt must not run"));
        assert_eq!(decision, Confirmation::Unconfirmed);
    }

    #[test]
    fn test_interactive_requires_exact_phrase() {
        let ctx = ConfirmationContext {
            assume_yes: false,
            interactive: true,
        };
        assert_eq!(ctx.confirm(|| Some("YES".into())), Confirmation::Confirmed);
        assert_eq!(ctx.confirm(|| Some("yes".into())), Confirmation::Unconfirmed);
        assert_eq!(ctx.confirm(|| Some("Y".into())), Confirmation::Unconfirmed);
        assert_eq!(ctx.confirm(|| None), Confirmation::Unconfirmed);
    }
}
