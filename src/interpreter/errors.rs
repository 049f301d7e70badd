//! Control-flow errors.
//!
//! Shell control flow that unwinds the execution stack is modeled as
//! errors: `exit`, `return`, `break`, `continue`, errexit aborts
//! (`set -e`), and unset-variable references under `set -u`. Ordinary
//! command failure is not an error — it is an `ExecResult` with a
//! non-zero exit code.
//!
//! Each variant carries the stdout/stderr accumulated so far so output
//! produced before the unwind is not lost; outer frames prepend their
//! own accumulated output as the error propagates.

use thiserror::Error;

use crate::interpreter::types::ExecResult;

#[derive(Debug, Clone, Error)]
pub enum InterpreterError {
    /// `exit [code]` terminates the whole script.
    #[error("exit {exit_code}")]
    Exit {
        exit_code: i32,
        stdout: String,
        stderr: String,
    },

    /// `return [code]` exits the enclosing function or sourced script.
    #[error("return {exit_code}")]
    Return {
        exit_code: i32,
        stdout: String,
        stderr: String,
    },

    /// `break [n]` exits n enclosing loops.
    #[error("break {levels}")]
    Break {
        levels: u32,
        stdout: String,
        stderr: String,
    },

    /// `continue [n]` skips to the next iteration of the n-th loop.
    #[error("continue {levels}")]
    Continue {
        levels: u32,
        stdout: String,
        stderr: String,
    },

    /// A command failed while `set -e` was active.
    #[error("errexit: command exited with status {exit_code}")]
    Errexit {
        exit_code: i32,
        stdout: String,
        stderr: String,
    },

    /// An unset variable was referenced while `set -u` was active.
    #[error("{name}: unbound variable")]
    Nounset {
        name: String,
        stdout: String,
        stderr: String,
    },
}

impl InterpreterError {
    pub fn exit(exit_code: i32) -> Self {
        Self::Exit {
            exit_code,
            stdout: String::new(),
            stderr: String::new(),
        }
    }

    pub fn ret(exit_code: i32) -> Self {
        Self::Return {
            exit_code,
            stdout: String::new(),
            stderr: String::new(),
        }
    }

    pub fn nounset(name: impl Into<String>) -> Self {
        let name = name.into();
        let stderr = format!("lsh: {}: unbound variable\n", name);
        Self::Nounset {
            name,
            stdout: String::new(),
            stderr,
        }
    }

    pub fn stdout(&self) -> &str {
        match self {
            Self::Exit { stdout, .. }
            | Self::Return { stdout, .. }
            | Self::Break { stdout, .. }
            | Self::Continue { stdout, .. }
            | Self::Errexit { stdout, .. }
            | Self::Nounset { stdout, .. } => stdout,
        }
    }

    pub fn stderr(&self) -> &str {
        match self {
            Self::Exit { stderr, .. }
            | Self::Return { stderr, .. }
            | Self::Break { stderr, .. }
            | Self::Continue { stderr, .. }
            | Self::Errexit { stderr, .. }
            | Self::Nounset { stderr, .. } => stderr,
        }
    }

    /// Exit code this unwind resolves to at the top level.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Exit { exit_code, .. }
            | Self::Return { exit_code, .. }
            | Self::Errexit { exit_code, .. } => *exit_code,
            Self::Break { .. } | Self::Continue { .. } => 0,
            Self::Nounset { .. } => 1,
        }
    }

    /// Prepend output from the current frame before re-raising.
    pub fn prepend_output(mut self, out: &str, err: &str) -> Self {
        let (stdout, stderr) = match &mut self {
            Self::Exit { stdout, stderr, .. }
            | Self::Return { stdout, stderr, .. }
            | Self::Break { stdout, stderr, .. }
            | Self::Continue { stdout, stderr, .. }
            | Self::Errexit { stdout, stderr, .. }
            | Self::Nounset { stdout, stderr, .. } => (stdout, stderr),
        };
        *stdout = format!("{}{}", out, stdout);
        *stderr = format!("{}{}", err, stderr);
        self
    }

    /// Collapse the unwind into a final result (shell entry point).
    pub fn into_result(self) -> ExecResult {
        let code = self.exit_code();
        match self {
            Self::Exit { stdout, stderr, .. }
            | Self::Return { stdout, stderr, .. }
            | Self::Break { stdout, stderr, .. }
            | Self::Continue { stdout, stderr, .. }
            | Self::Errexit { stdout, stderr, .. }
            | Self::Nounset { stdout, stderr, .. } => ExecResult::new(stdout, stderr, code),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prepend_output() {
        let err = InterpreterError::exit(3).prepend_output("early ", "warn ");
        assert_eq!(err.stdout(), "early ");
        assert_eq!(err.stderr(), "warn ");
        let result = err.into_result();
        assert_eq!(result.exit_code, 3);
        assert!(!result.success);
    }

    #[test]
    fn test_nounset_message() {
        let err = InterpreterError::nounset("FOO");
        assert!(err.stderr().contains("FOO: unbound variable"));
        assert_eq!(err.exit_code(), 1);
    }
}
