//! Redirection plumbing.
//!
//! Each command's redirection list is processed before dispatch. For
//! external commands the prepared targets become the child's standard
//! stream bindings directly. Builtins do not run as separate
//! processes, so their output is captured first and written to the
//! targets afterwards, and their input comes from materialized text —
//! a deliberate, documented asymmetry. File handles are scoped and
//! released on every path, error paths included.

use tokio::io::AsyncWriteExt;

use crate::ast::types::{RedirectKind, Redirection};
use crate::interpreter::expansion::resolve_path;
use crate::interpreter::types::{ExecResult, InterpreterState};

/// An output stream binding: where fd 1 or fd 2 goes.
#[derive(Debug, Clone)]
pub struct OutputTarget {
    /// Absolute path of the target file
    pub path: String,
    pub append: bool,
}

/// Resolved redirection set for one command.
#[derive(Debug, Clone, Default)]
pub struct PreparedRedirections {
    /// Materialized stdin (from `<`, `<>`, or a heredoc body)
    pub stdin: Option<String>,
    pub stdout: Option<OutputTarget>,
    pub stderr: Option<OutputTarget>,
}

impl PreparedRedirections {
    pub fn is_empty(&self) -> bool {
        self.stdin.is_none() && self.stdout.is_none() && self.stderr.is_none()
    }
}

/// Process a redirection list. `targets` pairs each redirection with
/// its already-expanded target text (for heredocs, the body itself).
/// A missing input file or a `noclobber` refusal yields a failing
/// result for the command, not an unwind.
pub async fn prepare(
    state: &InterpreterState,
    targets: &[(Redirection, String)],
) -> Result<PreparedRedirections, ExecResult> {
    let mut prepared = PreparedRedirections::default();

    for (redirection, target) in targets {
        match redirection.kind {
            RedirectKind::Heredoc | RedirectKind::HeredocStripTabs => {
                prepared.stdin = Some(target.clone());
            }
            RedirectKind::Input => {
                let path = resolve_path(&state.cwd, target);
                match tokio::fs::read_to_string(&path).await {
                    Ok(content) => prepared.stdin = Some(content),
                    Err(_) => {
                        return Err(ExecResult::failure(format!(
                            "lsh: {}: No such file or directory\n",
                            target
                        )))
                    }
                }
            }
            RedirectKind::ReadWrite => {
                let path = resolve_path(&state.cwd, target);
                match tokio::fs::read_to_string(&path).await {
                    Ok(content) => prepared.stdin = Some(content),
                    Err(_) => {
                        // <> creates the file when absent
                        if tokio::fs::write(&path, "").await.is_err() {
                            return Err(ExecResult::failure(format!(
                                "lsh: {}: cannot open\n",
                                target
                            )));
                        }
                        prepared.stdin = Some(String::new());
                    }
                }
            }
            RedirectKind::Output | RedirectKind::Append => {
                let append = redirection.kind == RedirectKind::Append;
                let path = resolve_path(&state.cwd, target);
                if !append
                    && state.options.noclobber
                    && tokio::fs::metadata(&path).await.is_ok()
                {
                    return Err(ExecResult::failure(format!(
                        "lsh: {}: cannot overwrite existing file\n",
                        target
                    )));
                }
                let binding = OutputTarget { path, append };
                match redirection.effective_fd() {
                    1 => prepared.stdout = Some(binding),
                    2 => prepared.stderr = Some(binding),
                    fd => {
                        return Err(ExecResult::failure(format!(
                            "lsh: {}: bad file descriptor\n",
                            fd
                        )))
                    }
                }
            }
        }
    }

    Ok(prepared)
}

/// Write captured text to an output target, truncating or appending.
async fn write_target(target: &OutputTarget, content: &str) -> std::io::Result<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .append(target.append)
        .truncate(!target.append)
        .open(&target.path)
        .await?;
    file.write_all(content.as_bytes()).await?;
    file.flush().await
}

/// Second phase for builtins: route the captured result through the
/// prepared output targets. Redirected streams disappear from the
/// visible result; the exit status is preserved unless writing fails.
pub async fn finalize_builtin(
    prepared: &PreparedRedirections,
    result: ExecResult,
) -> ExecResult {
    let mut stdout = result.stdout;
    let mut stderr = result.stderr;

    if let Some(target) = &prepared.stdout {
        if let Err(e) = write_target(target, &stdout).await {
            return ExecResult::failure(format!("lsh: {}: {}\n", target.path, e));
        }
        stdout = String::new();
    }
    if let Some(target) = &prepared.stderr {
        if let Err(e) = write_target(target, &stderr).await {
            return ExecResult::failure(format!("lsh: {}: {}\n", target.path, e));
        }
        stderr = String::new();
    }

    ExecResult::new(stdout, stderr, result.exit_code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::types::Word;

    fn scratch(name: &str) -> String {
        let dir =
            std::env::temp_dir().join(format!("lsh-redirect-test-{}-{}", std::process::id(), name));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).expect("scratch dir");
        dir.to_string_lossy().into_owned()
    }

    fn redirection(kind: RedirectKind, target: &str) -> (Redirection, String) {
        (
            Redirection::new(kind, Word::new(target)),
            target.to_string(),
        )
    }

    #[tokio::test]
    async fn test_input_missing_file_fails() {
        let mut state = InterpreterState::default();
        state.cwd = scratch("missing");
        let targets = vec![redirection(RedirectKind::Input, "absent.txt")];
        let err = prepare(&state, &targets).await.unwrap_err();
        assert!(!err.success);
        assert!(err.stderr.contains("No such file"));
    }

    #[tokio::test]
    async fn test_input_materializes_stdin() {
        let mut state = InterpreterState::default();
        state.cwd = scratch("input");
        std::fs::write(format!("{}/in.txt", state.cwd), "data\n").unwrap();
        let targets = vec![redirection(RedirectKind::Input, "in.txt")];
        let prepared = prepare(&state, &targets).await.unwrap();
        assert_eq!(prepared.stdin.as_deref(), Some("data\n"));
    }

    #[tokio::test]
    async fn test_heredoc_body_is_stdin() {
        let state = InterpreterState::default();
        let targets = vec![redirection(RedirectKind::Heredoc, "line\n")];
        let prepared = prepare(&state, &targets).await.unwrap();
        assert_eq!(prepared.stdin.as_deref(), Some("line\n"));
    }

    #[tokio::test]
    async fn test_noclobber_refuses_existing() {
        let mut state = InterpreterState::default();
        state.cwd = scratch("noclobber");
        state.options.noclobber = true;
        std::fs::write(format!("{}/out.txt", state.cwd), "old").unwrap();
        let targets = vec![redirection(RedirectKind::Output, "out.txt")];
        let err = prepare(&state, &targets).await.unwrap_err();
        assert!(err.stderr.contains("cannot overwrite"));
        // Append remains allowed
        let targets = vec![redirection(RedirectKind::Append, "out.txt")];
        assert!(prepare(&state, &targets).await.is_ok());
    }

    #[tokio::test]
    async fn test_finalize_truncate_then_append() {
        let dir = scratch("finalize");
        let path = format!("{}/out.txt", dir);
        let prepared = PreparedRedirections {
            stdin: None,
            stdout: Some(OutputTarget {
                path: path.clone(),
                append: false,
            }),
            stderr: None,
        };
        let result = finalize_builtin(&prepared, ExecResult::success("first\n")).await;
        assert!(result.success);
        assert!(result.stdout.is_empty());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "first\n");

        let appending = PreparedRedirections {
            stdin: None,
            stdout: Some(OutputTarget {
                path: path.clone(),
                append: true,
            }),
            stderr: None,
        };
        finalize_builtin(&appending, ExecResult::success("second\n")).await;
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "first\nsecond\n");
    }
}
