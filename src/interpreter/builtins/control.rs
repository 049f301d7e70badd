//! Control builtins: true, false, exit, return, shift, break, continue.
//!
//! exit/return/break/continue unwind the execution stack as
//! control-flow errors; the engine catches them at the right frame.

use crate::interpreter::errors::InterpreterError;
use crate::interpreter::types::{ExecResult, InterpreterState};

pub fn handle_true() -> Result<ExecResult, InterpreterError> {
    Ok(ExecResult::ok())
}

pub fn handle_false() -> Result<ExecResult, InterpreterError> {
    Ok(ExecResult::from_bool(false))
}

/// exit [code] — terminate the script. With no argument, the last
/// command's exit code is used.
pub fn handle_exit(
    state: &mut InterpreterState,
    args: &[String],
) -> Result<ExecResult, InterpreterError> {
    let code = match args.first() {
        Some(arg) => match arg.parse::<i32>() {
            Ok(code) => code,
            Err(_) => {
                return Err(InterpreterError::Exit {
                    exit_code: 2,
                    stdout: String::new(),
                    stderr: format!("lsh: exit: {}: numeric argument required\n", arg),
                })
            }
        },
        None => state.last_exit_code,
    };
    Err(InterpreterError::exit(code))
}

/// return [code] — exit the enclosing function or sourced script.
pub fn handle_return(
    state: &mut InterpreterState,
    args: &[String],
) -> Result<ExecResult, InterpreterError> {
    if state.call_depth == 0 {
        return Ok(ExecResult::failure(
            "lsh: return: can only `return` from a function or sourced script\n",
        ));
    }
    let code = match args.first() {
        Some(arg) => arg.parse::<i32>().unwrap_or(2),
        None => state.last_exit_code,
    };
    Err(InterpreterError::ret(code))
}

/// shift [n] — drop the first n positional parameters.
pub fn handle_shift(
    state: &mut InterpreterState,
    args: &[String],
) -> Result<ExecResult, InterpreterError> {
    let n = match args.first() {
        Some(arg) => match arg.parse::<usize>() {
            Ok(n) => n,
            Err(_) => {
                return Ok(ExecResult::failure(format!(
                    "lsh: shift: {}: numeric argument required\n",
                    arg
                )))
            }
        },
        None => 1,
    };
    if n > state.positional.len() {
        return Ok(ExecResult::from_bool(false));
    }
    state.positional.drain(..n);
    Ok(ExecResult::ok())
}

/// break [n] — exit n enclosing loops.
pub fn handle_break(args: &[String]) -> Result<ExecResult, InterpreterError> {
    let levels = parse_levels(args)?;
    Err(InterpreterError::Break {
        levels,
        stdout: String::new(),
        stderr: String::new(),
    })
}

/// continue [n] — skip to the next iteration of the n-th loop.
pub fn handle_continue(args: &[String]) -> Result<ExecResult, InterpreterError> {
    let levels = parse_levels(args)?;
    Err(InterpreterError::Continue {
        levels,
        stdout: String::new(),
        stderr: String::new(),
    })
}

fn parse_levels(args: &[String]) -> Result<u32, InterpreterError> {
    match args.first() {
        Some(arg) => match arg.parse::<u32>() {
            Ok(n) if n >= 1 => Ok(n),
            _ => Ok(1),
        },
        None => Ok(1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_true_false() {
        assert!(handle_true().unwrap().success);
        let result = handle_false().unwrap();
        assert_eq!(result.exit_code, 1);
        assert!(!result.success);
    }

    #[test]
    fn test_exit_carries_code() {
        let mut state = InterpreterState::default();
        match handle_exit(&mut state, &["3".to_string()]) {
            Err(InterpreterError::Exit { exit_code, .. }) => assert_eq!(exit_code, 3),
            other => panic!("expected exit, got {:?}", other),
        }
    }

    #[test]
    fn test_exit_defaults_to_last_code() {
        let mut state = InterpreterState::default();
        state.last_exit_code = 7;
        match handle_exit(&mut state, &[]) {
            Err(InterpreterError::Exit { exit_code, .. }) => assert_eq!(exit_code, 7),
            other => panic!("expected exit, got {:?}", other),
        }
    }

    #[test]
    fn test_return_outside_function_fails() {
        let mut state = InterpreterState::default();
        let result = handle_return(&mut state, &[]).unwrap();
        assert!(!result.success);
    }

    #[test]
    fn test_shift() {
        let mut state = InterpreterState::default();
        state.positional = vec!["a".into(), "b".into(), "c".into()];
        assert!(handle_shift(&mut state, &[]).unwrap().success);
        assert_eq!(state.positional, vec!["b".to_string(), "c".to_string()]);
        assert!(handle_shift(&mut state, &["2".to_string()]).unwrap().success);
        assert!(state.positional.is_empty());
        // Shifting past the end fails without modifying anything
        assert!(!handle_shift(&mut state, &["1".to_string()]).unwrap().success);
    }

    #[test]
    fn test_break_levels() {
        match handle_break(&["2".to_string()]) {
            Err(InterpreterError::Break { levels, .. }) => assert_eq!(levels, 2),
            other => panic!("expected break, got {:?}", other),
        }
        match handle_continue(&[]) {
            Err(InterpreterError::Continue { levels, .. }) => assert_eq!(levels, 1),
            other => panic!("expected continue, got {:?}", other),
        }
    }
}
