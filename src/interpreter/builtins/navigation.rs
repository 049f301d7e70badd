//! Directory navigation builtins: cd, pwd.

use std::path::Path;

use crate::interpreter::expansion::resolve_path;
use crate::interpreter::types::{ExecResult, InterpreterState};

/// cd [dir] — change the working directory. With no argument goes to
/// `$HOME`; `cd -` returns to the previous directory and prints it.
pub fn handle_cd(state: &mut InterpreterState, args: &[String]) -> ExecResult {
    let (target, echo_target) = match args.first().map(String::as_str) {
        None => match state.get_var("HOME") {
            Some(home) => (home.to_string(), false),
            None => return ExecResult::failure("lsh: cd: HOME not set\n"),
        },
        Some("-") => {
            if state.previous_dir.is_empty() {
                return ExecResult::failure("lsh: cd: OLDPWD not set\n");
            }
            (state.previous_dir.clone(), true)
        }
        Some(dir) => (dir.to_string(), false),
    };

    let resolved = normalize(&resolve_path(&state.cwd, &target));
    let path = Path::new(&resolved);
    if !path.is_dir() {
        return ExecResult::failure(format!("lsh: cd: {}: No such file or directory\n", target));
    }

    state.previous_dir = std::mem::replace(&mut state.cwd, resolved.clone());
    let _ = state.set_var("OLDPWD", state.previous_dir.clone());
    let _ = state.set_var("PWD", resolved.clone());

    if echo_target {
        ExecResult::success(format!("{}\n", resolved))
    } else {
        ExecResult::ok()
    }
}

/// pwd — print the working directory.
pub fn handle_pwd(state: &mut InterpreterState, _args: &[String]) -> ExecResult {
    ExecResult::success(format!("{}\n", state.cwd))
}

/// Collapse `.` and `..` components without touching the filesystem.
fn normalize(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    if parts.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", parts.join("/"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch(name: &str) -> String {
        let dir = std::env::temp_dir().join(format!("lsh-cd-test-{}-{}", std::process::id(), name));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(dir.join("sub")).expect("scratch dir");
        dir.to_string_lossy().into_owned()
    }

    #[test]
    fn test_cd_relative_and_pwd() {
        let dir = scratch("rel");
        let mut state = InterpreterState::default();
        state.cwd = dir.clone();
        let result = handle_cd(&mut state, &["sub".to_string()]);
        assert!(result.success, "{}", result.stderr);
        assert_eq!(state.cwd, format!("{}/sub", dir));
        assert_eq!(handle_pwd(&mut state, &[]).stdout, format!("{}/sub\n", dir));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_cd_missing_directory_fails() {
        let dir = scratch("missing");
        let mut state = InterpreterState::default();
        state.cwd = dir.clone();
        let result = handle_cd(&mut state, &["nope".to_string()]);
        assert!(!result.success);
        assert!(result.stderr.contains("No such file"));
        assert_eq!(state.cwd, dir);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_cd_dash_returns_and_prints() {
        let dir = scratch("dash");
        let mut state = InterpreterState::default();
        state.cwd = dir.clone();
        assert!(handle_cd(&mut state, &["sub".to_string()]).success);
        let result = handle_cd(&mut state, &["-".to_string()]);
        assert!(result.success);
        assert_eq!(result.stdout.trim(), dir);
        assert_eq!(state.cwd, dir);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_cd_dotdot_normalizes() {
        let dir = scratch("dots");
        let mut state = InterpreterState::default();
        state.cwd = format!("{}/sub", dir);
        assert!(handle_cd(&mut state, &["..".to_string()]).success);
        assert_eq!(state.cwd, dir);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
