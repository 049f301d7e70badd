//! Builtin commands.
//!
//! Commands implemented inside the interpreter rather than as external
//! executables. Dispatch is a closed match in the engine (never
//! reflection); `SHELL_BUILTINS` is the authoritative name set, used
//! by resolution and by `test`-style introspection. Unknown names fall
//! through to external command resolution.
//!
//! Builtins that re-enter the engine (eval, source, exec, fc, r, the
//! job-control set) are implemented on the engine itself; the modules
//! here are the state-only handlers.

use std::collections::HashSet;

pub mod control;
pub mod echo;
pub mod history;
pub mod navigation;
pub mod printf;
pub mod read_input;
pub mod trap;
pub mod vars;

lazy_static::lazy_static! {
    /// Every name the engine dispatches as a builtin.
    pub static ref SHELL_BUILTINS: HashSet<&'static str> = {
        [
            "cd", "pwd",
            "echo", "printf",
            "true", "false", ":",
            "exit", "return", "shift", "break", "continue",
            "export", "unset", "set", "local", "readonly", "typeset",
            "setopt", "unsetopt",
            "test", "[",
            "eval", "exec", "source", ".",
            "jobs", "fg", "bg", "wait",
            "read", "getopts",
            "trap",
            "history", "fc", "r", "alias", "unalias",
            "job-create", "job-start", "job-stop", "job-list",
        ]
        .into_iter()
        .collect()
    };
}

/// Is this name handled in-process?
pub fn is_builtin(name: &str) -> bool {
    SHELL_BUILTINS.contains(name)
}
