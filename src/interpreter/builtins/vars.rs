//! Variable management builtins: export, unset, set, local, readonly,
//! typeset, setopt, unsetopt.

use crate::interpreter::types::{ExecResult, InterpreterState};

/// Split `NAME=VALUE` into its halves; None when there is no `=`.
fn split_assignment(arg: &str) -> Option<(&str, &str)> {
    let idx = arg.find('=')?;
    Some((&arg[..idx], &arg[idx + 1..]))
}

fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

/// export NAME[=VALUE]... — mark names for export, assigning when a
/// value is given. With no arguments, list the exported variables.
pub fn handle_export(state: &mut InterpreterState, args: &[String]) -> ExecResult {
    if args.is_empty() {
        let mut names: Vec<_> = state.exported.iter().cloned().collect();
        names.sort();
        let mut out = String::new();
        for name in names {
            match state.get_var(&name) {
                Some(value) => out.push_str(&format!("export {}={}\n", name, value)),
                None => out.push_str(&format!("export {}\n", name)),
            }
        }
        return ExecResult::success(out);
    }

    for arg in args {
        let (name, value) = match split_assignment(arg) {
            Some((name, value)) => (name, Some(value)),
            None => (arg.as_str(), None),
        };
        if !is_valid_name(name) {
            return ExecResult::failure(format!("lsh: export: `{}': not a valid identifier\n", arg));
        }
        if let Some(value) = value {
            if let Err(msg) = state.set_var(name, value) {
                return ExecResult::failure(msg);
            }
        }
        state.exported.insert(name.to_string());
    }
    ExecResult::ok()
}

/// unset NAME... — remove variables (and their export marks).
pub fn handle_unset(state: &mut InterpreterState, args: &[String]) -> ExecResult {
    for name in args {
        if let Err(msg) = state.unset_var(name) {
            return ExecResult::failure(msg);
        }
    }
    ExecResult::ok()
}

/// set [-/+euxvfmCa] [--] [args...] — toggle shell options; positional
/// parameters are replaced by any remaining arguments. Bare `set`
/// lists the variables.
pub fn handle_set(state: &mut InterpreterState, args: &[String]) -> ExecResult {
    if args.is_empty() {
        let mut names: Vec<_> = state.variables.keys().cloned().collect();
        names.sort();
        let mut out = String::new();
        for name in names {
            if let Some(value) = state.get_var(&name) {
                out.push_str(&format!("{}={}\n", name, value));
            }
        }
        return ExecResult::success(out);
    }

    let mut positional: Option<Vec<String>> = None;
    let mut i = 0;
    while i < args.len() {
        let arg = &args[i];
        if arg == "--" {
            positional = Some(args[i + 1..].to_vec());
            break;
        }
        let (enable, letters) = if let Some(rest) = arg.strip_prefix('-') {
            (true, rest)
        } else if let Some(rest) = arg.strip_prefix('+') {
            (false, rest)
        } else {
            positional = Some(args[i..].to_vec());
            break;
        };
        if letters == "o" {
            // set -o name / +o name
            i += 1;
            match args.get(i) {
                Some(name) => match state.options.flag_mut(name) {
                    Some(flag) => *flag = enable,
                    None => {
                        return ExecResult::failure(format!(
                            "lsh: set: {}: invalid option name\n",
                            name
                        ))
                    }
                },
                None => return ExecResult::failure_with_code("lsh: set: -o: option name required\n", 2),
            }
            i += 1;
            continue;
        }
        for letter in letters.chars() {
            match state.options.letter_mut(letter) {
                Some(flag) => *flag = enable,
                None => {
                    return ExecResult::failure_with_code(
                        format!("lsh: set: -{}: invalid option\n", letter),
                        2,
                    )
                }
            }
        }
        i += 1;
    }

    if let Some(params) = positional {
        state.positional = params;
    }
    ExecResult::ok()
}

/// local name[=value]... — assign within the current function call.
/// The engine restores pre-call bindings when the function returns, so
/// local is an assignment plus a usage check.
pub fn handle_local(state: &mut InterpreterState, args: &[String]) -> ExecResult {
    if state.call_depth == 0 {
        return ExecResult::failure("lsh: local: can only be used in a function\n");
    }
    assign_all(state, args, "local")
}

/// readonly NAME[=VALUE]... — assign and lock names against further
/// writes.
pub fn handle_readonly(state: &mut InterpreterState, args: &[String]) -> ExecResult {
    for arg in args {
        let (name, value) = match split_assignment(arg) {
            Some((name, value)) => (name, Some(value)),
            None => (arg.as_str(), None),
        };
        if !is_valid_name(name) {
            return ExecResult::failure(format!(
                "lsh: readonly: `{}': not a valid identifier\n",
                arg
            ));
        }
        if let Some(value) = value {
            if let Err(msg) = state.set_var(name, value) {
                return ExecResult::failure(msg);
            }
        }
        state.readonly.insert(name.to_string());
    }
    ExecResult::ok()
}

/// typeset name[=value]... — declare variables; `-x` marks them
/// exported. Inside a function this behaves as `local`.
pub fn handle_typeset(state: &mut InterpreterState, args: &[String]) -> ExecResult {
    let mut export = false;
    let mut rest = args;
    if rest.first().map(String::as_str) == Some("-x") {
        export = true;
        rest = &rest[1..];
    }
    let result = assign_all(state, rest, "typeset");
    if !result.success {
        return result;
    }
    if export {
        for arg in rest {
            let name = split_assignment(arg).map(|(n, _)| n).unwrap_or(arg);
            state.exported.insert(name.to_string());
        }
    }
    result
}

/// setopt name... — enable long-form shell options.
pub fn handle_setopt(state: &mut InterpreterState, args: &[String]) -> ExecResult {
    toggle_options(state, args, true, "setopt")
}

/// unsetopt name... — disable long-form shell options.
pub fn handle_unsetopt(state: &mut InterpreterState, args: &[String]) -> ExecResult {
    toggle_options(state, args, false, "unsetopt")
}

fn toggle_options(
    state: &mut InterpreterState,
    args: &[String],
    enable: bool,
    builtin: &str,
) -> ExecResult {
    for name in args {
        match state.options.flag_mut(name) {
            Some(flag) => *flag = enable,
            None => {
                return ExecResult::failure(format!("lsh: {}: no such option: {}\n", builtin, name))
            }
        }
    }
    ExecResult::ok()
}

fn assign_all(state: &mut InterpreterState, args: &[String], builtin: &str) -> ExecResult {
    for arg in args {
        let (name, value) = match split_assignment(arg) {
            Some((name, value)) => (name, value),
            None => (arg.as_str(), ""),
        };
        if !is_valid_name(name) {
            return ExecResult::failure(format!(
                "lsh: {}: `{}': not a valid identifier\n",
                builtin, arg
            ));
        }
        if let Err(msg) = state.set_var(name, value) {
            return ExecResult::failure(msg);
        }
    }
    ExecResult::ok()
}
