//! Input builtins: read, getopts.

use crate::interpreter::expansion::split_fields;
use crate::interpreter::types::{ExecResult, InterpreterState};

/// read name... — read one line from the command's stdin and assign it
/// to the named variables, splitting on IFS. Extra fields go to the
/// last name. Returns 1 at end of input.
pub fn handle_read(state: &mut InterpreterState, args: &[String], stdin: &str) -> ExecResult {
    let names: Vec<&str> = if args.is_empty() {
        vec!["REPLY"]
    } else {
        args.iter().map(String::as_str).collect()
    };

    let Some(line) = stdin.lines().next() else {
        // EOF: clear the targets, report failure
        for name in &names {
            let _ = state.set_var(name, "");
        }
        return ExecResult::from_bool(false);
    };

    if names.len() == 1 {
        if let Err(msg) = state.set_var(names[0], line) {
            return ExecResult::failure(msg);
        }
        return ExecResult::ok();
    }

    let ifs = state.ifs();
    let mut fields = split_fields(line, &ifs);
    for (i, name) in names.iter().enumerate() {
        let value = if i + 1 == names.len() {
            // Last name takes the remainder
            let rest: Vec<String> = fields.drain(..).collect();
            rest.join(" ")
        } else if fields.is_empty() {
            String::new()
        } else {
            fields.remove(0)
        };
        if let Err(msg) = state.set_var(name, value) {
            return ExecResult::failure(msg);
        }
    }
    ExecResult::ok()
}

/// getopts optstring name [args...] — step through options, driven by
/// `OPTIND`. Sets `name` to the option character and `OPTARG` to its
/// argument when the optstring marks one with `:`. Returns 1 once the
/// options are exhausted.
pub fn handle_getopts(state: &mut InterpreterState, args: &[String]) -> ExecResult {
    let Some(optstring) = args.first().cloned() else {
        return ExecResult::failure_with_code("lsh: getopts: usage: getopts optstring name [args]\n", 2);
    };
    let Some(name) = args.get(1).cloned() else {
        return ExecResult::failure_with_code("lsh: getopts: usage: getopts optstring name [args]\n", 2);
    };
    let words: Vec<String> = if args.len() > 2 {
        args[2..].to_vec()
    } else {
        state.positional.clone()
    };

    let optind: usize = state
        .get_var("OPTIND")
        .and_then(|v| v.parse().ok())
        .unwrap_or(1);
    // OPTIND is 1-based over the word list
    let index = optind.saturating_sub(1);

    let finish = |state: &mut InterpreterState, name: &str| {
        let _ = state.set_var(name, "?");
        ExecResult::from_bool(false)
    };

    let Some(word) = words.get(index) else {
        return finish(state, &name);
    };
    if !word.starts_with('-') || word == "-" || word == "--" {
        return finish(state, &name);
    }

    let opt = word.chars().nth(1).unwrap_or('?');
    let takes_arg = optstring
        .find(opt)
        .map(|i| optstring[i + 1..].starts_with(':'))
        .unwrap_or(false);

    if optstring.find(opt).is_none() {
        let _ = state.set_var(&name, "?");
        let _ = state.set_var("OPTIND", (optind + 1).to_string());
        return ExecResult::failure(format!("lsh: getopts: illegal option -- {}\n", opt));
    }

    let _ = state.set_var(&name, opt.to_string());
    if takes_arg {
        // Argument either glued (-ovalue) or the next word
        let glued: String = word.chars().skip(2).collect();
        if !glued.is_empty() {
            let _ = state.set_var("OPTARG", glued);
            let _ = state.set_var("OPTIND", (optind + 1).to_string());
        } else {
            match words.get(index + 1) {
                Some(arg) => {
                    let _ = state.set_var("OPTARG", arg.clone());
                    let _ = state.set_var("OPTIND", (optind + 2).to_string());
                }
                None => {
                    let _ = state.set_var(&name, "?");
                    let _ = state.set_var("OPTIND", (optind + 1).to_string());
                    return ExecResult::failure(format!(
                        "lsh: getopts: option requires an argument -- {}\n",
                        opt
                    ));
                }
            }
        }
    } else {
        let _ = state.set_var("OPTIND", (optind + 1).to_string());
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
    fn test_read_single_name() {
        let mut state = InterpreterState::default();
        let result = handle_read(&mut state, &args(&["line"]), "first line\nsecond\n");
        assert!(result.success);
        assert_eq!(state.get_var("line"), Some("first line"));
    }

    #[test]
    fn test_read_splits_across_names() {
        let mut state = InterpreterState::default();
        let result = handle_read(&mut state, &args(&["a", "b"]), "one two three\n");
        assert!(result.success);
        assert_eq!(state.get_var("a"), Some("one"));
        assert_eq!(state.get_var("b"), Some("two three"));
    }

    #[test]
    fn test_read_eof_fails() {
        let mut state = InterpreterState::default();
        let result = handle_read(&mut state, &args(&["x"]), "");
        assert!(!result.success);
        assert_eq!(state.get_var("x"), Some(""));
    }

    #[test]
    fn test_read_default_reply() {
        let mut state = InterpreterState::default();
        assert!(handle_read(&mut state, &[], "hello\n").success);
        assert_eq!(state.get_var("REPLY"), Some("hello"));
    }

    #[test]
    fn test_getopts_steps_through_options() {
        let mut state = InterpreterState::default();
        let call = args(&["ab:", "opt", "-a", "-b", "value", "positional"]);

        assert!(handle_getopts(&mut state, &call).success);
        assert_eq!(state.get_var("opt"), Some("a"));
        assert_eq!(state.get_var("OPTIND"), Some("2"));

        assert!(handle_getopts(&mut state, &call).success);
        assert_eq!(state.get_var("opt"), Some("b"));
        assert_eq!(state.get_var("OPTARG"), Some("value"));
        assert_eq!(state.get_var("OPTIND"), Some("4"));

        // Positional word ends the scan
        assert!(!handle_getopts(&mut state, &call).success);
        assert_eq!(state.get_var("opt"), Some("?"));
    }

    #[test]
    fn test_getopts_illegal_option() {
        let mut state = InterpreterState::default();
        let call = args(&["a", "opt", "-z"]);
        let result = handle_getopts(&mut state, &call);
        assert!(!result.success);
        assert!(result.stderr.contains("illegal option"));
    }

    #[test]
    fn test_getopts_glued_argument() {
        let mut state = InterpreterState::default();
        let call = args(&["o:", "opt", "-ovalue"]);
        assert!(handle_getopts(&mut state, &call).success);
        assert_eq!(state.get_var("OPTARG"), Some("value"));
    }
}
