//! trap builtin.
//!
//! Records signal handlers in the interpreter's trap table. `EXIT`
//! traps run when the shell instance finishes a script; named-signal
//! entries are bookkeeping for the job-control layer, which delivers
//! signals to live process ids directly.

use crate::interpreter::types::{ExecResult, InterpreterState};

const KNOWN_SIGNALS: &[&str] = &[
    "EXIT", "HUP", "INT", "QUIT", "TERM", "KILL", "USR1", "USR2", "CHLD",
];

fn canonical(signal: &str) -> Option<String> {
    let upper = signal.trim_start_matches("SIG").to_uppercase();
    if KNOWN_SIGNALS.contains(&upper.as_str()) {
        return Some(upper);
    }
    // Numeric signals map onto their conventional names
    match signal {
        "0" => Some("EXIT".to_string()),
        "1" => Some("HUP".to_string()),
        "2" => Some("INT".to_string()),
        "3" => Some("QUIT".to_string()),
        "15" => Some("TERM".to_string()),
        _ => None,
    }
}

/// trap [command signal...] — with no arguments, list the registered
/// traps; `trap - signal...` clears; otherwise register `command` for
/// each named signal.
pub fn handle_trap(state: &mut InterpreterState, args: &[String]) -> ExecResult {
    if args.is_empty() {
        let mut entries: Vec<_> = state.traps.iter().collect();
        entries.sort();
        let mut out = String::new();
        for (signal, command) in entries {
            out.push_str(&format!("trap -- '{}' {}\n", command, signal));
        }
        return ExecResult::success(out);
    }

    let command = &args[0];
    let signals = &args[1..];
    if signals.is_empty() {
        return ExecResult::failure_with_code("lsh: trap: usage: trap [command] [signal ...]\n", 2);
    }

    for signal in signals {
        let Some(name) = canonical(signal) else {
            return ExecResult::failure(format!("lsh: trap: {}: invalid signal specification\n", signal));
        };
        if command == "-" {
            state.traps.remove(&name);
        } else {
            state.traps.insert(name, command.clone());
        }
    }
    ExecResult::ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_register_and_list() {
        let mut state = InterpreterState::default();
        assert!(handle_trap(&mut state, &args(&["echo bye", "EXIT"])).success);
        assert_eq!(state.traps.get("EXIT").map(String::as_str), Some("echo bye"));

        let listing = handle_trap(&mut state, &[]);
        assert!(listing.stdout.contains("trap -- 'echo bye' EXIT"));
    }

    #[test]
    fn test_numeric_and_sig_prefixed_names() {
        let mut state = InterpreterState::default();
        assert!(handle_trap(&mut state, &args(&["handler", "2"])).success);
        assert!(state.traps.contains_key("INT"));
        assert!(handle_trap(&mut state, &args(&["handler", "SIGTERM"])).success);
        assert!(state.traps.contains_key("TERM"));
    }

    #[test]
    fn test_clear_with_dash() {
        let mut state = InterpreterState::default();
        handle_trap(&mut state, &args(&["x", "INT"]));
        assert!(handle_trap(&mut state, &args(&["-", "INT"])).success);
        assert!(!state.traps.contains_key("INT"));
    }

    #[test]
    fn test_invalid_signal() {
        let mut state = InterpreterState::default();
        assert!(!handle_trap(&mut state, &args(&["x", "NOTASIG"])).success);
    }
}
