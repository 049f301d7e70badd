//! History and alias builtins: history, alias, unalias.
//!
//! History lives in memory on the interpreter state; the shell records
//! each executed line before running it. `fc` and `r` re-enter the
//! engine and are implemented there.

use crate::interpreter::types::{ExecResult, InterpreterState};

/// history [-c | -d n] — list, clear, or delete one entry.
pub fn handle_history(state: &mut InterpreterState, args: &[String]) -> ExecResult {
    match args.first().map(String::as_str) {
        None => {
            let mut out = String::new();
            for entry in &state.history {
                out.push_str(&format!("{:5}  {}\n", entry.number, entry.text));
            }
            ExecResult::success(out)
        }
        Some("-c") => {
            state.history.clear();
            ExecResult::ok()
        }
        Some("-d") => {
            let Some(number) = args.get(1).and_then(|n| n.parse::<usize>().ok()) else {
                return ExecResult::failure_with_code(
                    "lsh: history: -d: numeric argument required\n",
                    2,
                );
            };
            let before = state.history.len();
            state.history.retain(|e| e.number != number);
            if state.history.len() == before {
                return ExecResult::failure(format!(
                    "lsh: history: {}: history position out of range\n",
                    number
                ));
            }
            ExecResult::ok()
        }
        Some(other) => {
            ExecResult::failure_with_code(format!("lsh: history: {}: invalid option\n", other), 2)
        }
    }
}

/// alias [name[=value]...] — define or list aliases.
pub fn handle_alias(state: &mut InterpreterState, args: &[String]) -> ExecResult {
    if args.is_empty() {
        let mut entries: Vec<_> = state.aliases.iter().collect();
        entries.sort();
        let mut out = String::new();
        for (name, value) in entries {
            out.push_str(&format!("alias {}='{}'\n", name, value));
        }
        return ExecResult::success(out);
    }

    let mut out = String::new();
    for arg in args {
        match arg.split_once('=') {
            Some((name, value)) => {
                state.aliases.insert(name.to_string(), value.to_string());
            }
            None => match state.aliases.get(arg) {
                Some(value) => out.push_str(&format!("alias {}='{}'\n", arg, value)),
                None => {
                    return ExecResult::failure(format!("lsh: alias: {}: not found\n", arg));
                }
            },
        }
    }
    ExecResult::success(out)
}

/// unalias name... — remove alias definitions.
pub fn handle_unalias(state: &mut InterpreterState, args: &[String]) -> ExecResult {
    for name in args {
        if state.aliases.remove(name).is_none() {
            return ExecResult::failure(format!("lsh: unalias: {}: not found\n", name));
        }
    }
    ExecResult::ok()
}
