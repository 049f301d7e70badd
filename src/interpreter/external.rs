//! External command execution.
//!
//! PATH resolution and child-process spawning. Spawning and waiting
//! are suspension points: the executing chain parks on the child
//! without blocking other work. Exit-code conventions: 127 for
//! command-not-found, 126 for found-but-not-executable.

use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;

use log::debug;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::interpreter::expansion::resolve_path;
use crate::interpreter::redirect::OutputTarget;
use crate::interpreter::types::ExecResult;

/// Search each PATH directory for an executable named `name`.
pub fn resolve_in_path(name: &str, path_var: &str) -> Option<String> {
    for dir in path_var.split(':') {
        if dir.is_empty() {
            continue;
        }
        let full_path = format!("{}/{}", dir, name);
        if is_executable(Path::new(&full_path)) {
            return Some(full_path);
        }
    }
    None
}

fn is_executable(path: &Path) -> bool {
    if !path.is_file() {
        return false;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        path.metadata()
            .map(|m| m.permissions().mode() & 0o111 != 0)
            .unwrap_or(false)
    }
    #[cfg(not(unix))]
    {
        true
    }
}

/// Open a prepared output target as a child stdio binding.
fn open_target(target: &OutputTarget) -> std::io::Result<std::fs::File> {
    std::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .append(target.append)
        .truncate(!target.append)
        .open(&target.path)
}

/// Run an external command to completion, capturing whatever output is
/// not bound to a redirection target. The child sees exactly the
/// exported environment.
pub async fn run_external(
    name: &str,
    args: &[String],
    env: &HashMap<String, String>,
    cwd: &str,
    stdin: &str,
    stdout_target: Option<&OutputTarget>,
    stderr_target: Option<&OutputTarget>,
) -> ExecResult {
    let program = if name.contains('/') {
        let path = resolve_path(cwd, name);
        if !Path::new(&path).exists() {
            return ExecResult::failure_with_code(
                format!("lsh: {}: No such file or directory\n", name),
                127,
            );
        }
        if !is_executable(Path::new(&path)) {
            return ExecResult::failure_with_code(
                format!("lsh: {}: Permission denied\n", name),
                126,
            );
        }
        path
    } else {
        let path_var = env
            .get("PATH")
            .cloned()
            .or_else(|| std::env::var("PATH").ok())
            .unwrap_or_default();
        match resolve_in_path(name, &path_var) {
            Some(resolved) => resolved,
            None => {
                return ExecResult::failure_with_code(
                    format!("lsh: {}: command not found\n", name),
                    127,
                )
            }
        }
    };

    debug!("spawning external command: {} ({} args)", program, args.len());

    let mut cmd = Command::new(&program);
    cmd.args(args).current_dir(cwd).env_clear().envs(env);

    cmd.stdin(if stdin.is_empty() {
        Stdio::null()
    } else {
        Stdio::piped()
    });

    match stdout_target.map(open_target) {
        Some(Ok(file)) => {
            cmd.stdout(Stdio::from(file));
        }
        Some(Err(e)) => {
            let path = stdout_target.map(|t| t.path.as_str()).unwrap_or_default();
            return ExecResult::failure(format!("lsh: {}: {}\n", path, e));
        }
        None => {
            cmd.stdout(Stdio::piped());
        }
    }
    match stderr_target.map(open_target) {
        Some(Ok(file)) => {
            cmd.stderr(Stdio::from(file));
        }
        Some(Err(e)) => {
            let path = stderr_target.map(|t| t.path.as_str()).unwrap_or_default();
            return ExecResult::failure(format!("lsh: {}: {}\n", path, e));
        }
        None => {
            cmd.stderr(Stdio::piped());
        }
    }

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return ExecResult::failure_with_code(
                format!("lsh: {}: command not found\n", name),
                127,
            )
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return ExecResult::failure_with_code(
                format!("lsh: {}: Permission denied\n", name),
                126,
            )
        }
        Err(e) => return ExecResult::failure(format!("lsh: {}: {}\n", name, e)),
    };

    if !stdin.is_empty() {
        if let Some(mut child_stdin) = child.stdin.take() {
            if let Err(e) = child_stdin.write_all(stdin.as_bytes()).await {
                return ExecResult::failure(format!("lsh: {}: failed to write stdin: {}\n", name, e));
            }
        }
    }

    match child.wait_with_output().await {
        Ok(output) => {
            let code = output.status.code().unwrap_or(-1);
            ExecResult::new(
                String::from_utf8_lossy(&output.stdout).into_owned(),
                String::from_utf8_lossy(&output.stderr).into_owned(),
                code,
            )
        }
        Err(e) => ExecResult::failure(format!("lsh: {}: failed to wait: {}\n", name, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_env() -> HashMap<String, String> {
        let mut env = HashMap::new();
        env.insert(
            "PATH".to_string(),
            std::env::var("PATH").unwrap_or_else(|_| "/usr/bin:/bin".to_string()),
        );
        env
    }

    #[test]
    fn test_resolve_in_path_finds_sh() {
        assert!(resolve_in_path("sh", "/usr/bin:/bin").is_some());
        assert!(resolve_in_path("definitely-not-a-command", "/usr/bin:/bin").is_none());
    }

    #[tokio::test]
    async fn test_run_echo() {
        let result = run_external(
            "echo",
            &["hello".to_string()],
            &default_env(),
            "/",
            "",
            None,
            None,
        )
        .await;
        assert!(result.success);
        assert_eq!(result.stdout.trim(), "hello");
    }

    #[tokio::test]
    async fn test_stdin_piped_to_child() {
        let result = run_external(
            "cat",
            &[],
            &default_env(),
            "/",
            "piped input",
            None,
            None,
        )
        .await;
        assert!(result.success);
        assert_eq!(result.stdout, "piped input");
    }

    #[tokio::test]
    async fn test_command_not_found_is_127() {
        let result = run_external(
            "no-such-command-xyz",
            &[],
            &default_env(),
            "/",
            "",
            None,
            None,
        )
        .await;
        assert_eq!(result.exit_code, 127);
        assert!(result.stderr.contains("command not found"));
    }

    #[tokio::test]
    async fn test_exported_env_visible_in_child() {
        let mut env = default_env();
        env.insert("FOO".to_string(), "bar".to_string());
        let result = run_external("env", &[], &env, "/", "", None, None).await;
        assert!(result.success);
        assert!(result.stdout.contains("FOO=bar"));
    }

    #[tokio::test]
    async fn test_stdout_bound_to_file() {
        let dir = std::env::temp_dir().join(format!("lsh-external-test-{}", std::process::id()));
        let _ = std::fs::create_dir_all(&dir);
        let path = dir.join("out.txt").to_string_lossy().into_owned();
        let target = OutputTarget {
            path: path.clone(),
            append: false,
        };
        let result = run_external(
            "echo",
            &["to-file".to_string()],
            &default_env(),
            "/",
            "",
            Some(&target),
            None,
        )
        .await;
        assert!(result.success);
        assert!(result.stdout.is_empty());
        assert_eq!(std::fs::read_to_string(&path).unwrap().trim(), "to-file");
        let _ = std::fs::remove_dir_all(&dir);
    }
}
