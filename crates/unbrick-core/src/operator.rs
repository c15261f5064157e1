//! Operator prompt abstraction.
//!
//! The recovery flow depends on a human physically handling the device
//! (mode button combos, cable swaps) and approving destructive steps.
//! Front ends implement [`Operator`]; tests use [`ScriptedOperator`].

use std::collections::VecDeque;
use std::io;
use std::sync::Mutex;

pub trait Operator {
    /// Display informational text (device listings, hints).
    fn show(&self, text: &str);

    /// Ask a yes/no question. `Ok(true)` only for an explicit yes.
    fn confirm(&self, prompt: &str) -> io::Result<bool>;

    /// Prompt for one line of input, returned without its line
    /// terminator. An `Err` means input is gone (EOF) and the session
    /// should abort.
    fn read_line(&self, prompt: &str) -> io::Result<String>;

    /// Block until the operator acknowledges having performed a physical
    /// action.
    fn acknowledge(&self, prompt: &str) -> io::Result<()>;
}

/// Operator fed from a fixed response script, for tests and automation.
///
/// `confirm` and `read_line` consume responses in order; an exhausted
/// script reads as EOF, which callers treat as an abort.
pub struct ScriptedOperator {
    responses: Mutex<VecDeque<String>>,
    shown: Mutex<Vec<String>>,
}

impl ScriptedOperator {
    pub fn new(responses: &[&str]) -> Self {
        Self {
            responses: Mutex::new(responses.iter().map(|r| r.to_string()).collect()),
            shown: Mutex::new(Vec::new()),
        }
    }

    /// Everything passed to `show`, in order.
    pub fn shown(&self) -> Vec<String> {
        self.shown.lock().unwrap().clone()
    }

    fn next_response(&self) -> io::Result<String> {
        self.responses.lock().unwrap().pop_front().ok_or_else(|| {
            io::Error::new(io::ErrorKind::UnexpectedEof, "operator script exhausted")
        })
    }
}

impl Operator for ScriptedOperator {
    fn show(&self, text: &str) {
        self.shown.lock().unwrap().push(text.to_string());
    }

    fn confirm(&self, _prompt: &str) -> io::Result<bool> {
        Ok(self.next_response()?.eq_ignore_ascii_case("y"))
    }

    fn read_line(&self, _prompt: &str) -> io::Result<String> {
        self.next_response()
    }

    fn acknowledge(&self, _prompt: &str) -> io::Result<()> {
        // Physical-action prompts are not interesting to script.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripted_responses_in_order() {
        let op = ScriptedOperator::new(&["y", "sda", "YES"]);
        assert!(op.confirm("flash?").unwrap());
        assert_eq!(op.read_line("target: ").unwrap(), "sda");
        assert_eq!(op.read_line("confirm: ").unwrap(), "YES");
    }

    #[test]
    fn test_exhausted_script_reads_as_eof() {
        let op = ScriptedOperator::new(&[]);
        let err = op.read_line("target: ").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_confirm_only_accepts_yes() {
        let op = ScriptedOperator::new(&["n", "Y"]);
        assert!(!op.confirm("?").unwrap());
        assert!(op.confirm("?").unwrap());
    }
}
