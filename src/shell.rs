//! Shell environment.
//!
//! Main entry point: ties the parser and the execution engine to one
//! interpreter state. Parse errors are raised to the caller; control
//! flow that reaches the top (exit, errexit aborts, stray returns) is
//! collapsed into the final result here.

use std::collections::HashMap;
use std::sync::Arc;

use crate::interpreter::collaborators::JobService;
use crate::interpreter::engine::ExecutionEngine;
use crate::interpreter::errors::InterpreterError;
use crate::interpreter::types::{ExecResult, ExecutionLimits, InterpreterState, ShellOptions};
use crate::parser::ParseError;

/// Options for creating a shell instance.
#[derive(Default)]
pub struct ShellConfig {
    /// Extra environment variables (exported), overlaid on the
    /// process environment
    pub env: Option<HashMap<String, String>>,
    /// Working directory (defaults to the process cwd)
    pub cwd: Option<String>,
    /// Execution limits
    pub limits: Option<ExecutionLimits>,
    /// Initial option flags
    pub options: Option<ShellOptions>,
    /// External job-tracking collaborator for the `job-*` builtins
    pub job_service: Option<Arc<dyn JobService>>,
}

/// A shell instance: one interpreter state plus the engine driving it.
pub struct Shell {
    state: InterpreterState,
    engine: ExecutionEngine,
}

impl Shell {
    pub fn new(config: ShellConfig) -> Self {
        let cwd = config.cwd.unwrap_or_else(|| {
            std::env::current_dir()
                .map(|p| p.to_string_lossy().into_owned())
                .unwrap_or_else(|_| "/".to_string())
        });

        let mut state = InterpreterState {
            cwd: cwd.clone(),
            previous_dir: cwd.clone(),
            ..Default::default()
        };

        // A real shell starts from the process environment, exported
        for (name, value) in std::env::vars() {
            state.variables.insert(name.clone(), value);
            state.exported.insert(name);
        }
        if let Some(env) = config.env {
            for (name, value) in env {
                state.variables.insert(name.clone(), value);
                state.exported.insert(name);
            }
        }
        state.variables.entry("IFS".to_string()).or_insert_with(|| " \t\n".to_string());
        state.variables.insert("PWD".to_string(), cwd.clone());
        state.variables.insert("OLDPWD".to_string(), cwd);
        state.variables.entry("OPTIND".to_string()).or_insert_with(|| "1".to_string());
        state.variables.insert("0".to_string(), "lsh".to_string());

        if let Some(options) = config.options {
            state.options = options;
        }

        let mut engine = ExecutionEngine::new(config.limits.unwrap_or_default());
        if let Some(service) = config.job_service {
            engine = engine.with_job_service(service);
        }

        Self { state, engine }
    }

    pub fn state(&self) -> &InterpreterState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut InterpreterState {
        &mut self.state
    }

    /// Execute a script. Parse errors are raised; everything else —
    /// command failures, exit, errexit aborts — comes back as the
    /// final `ExecResult`.
    pub async fn exec(&mut self, script: &str) -> Result<ExecResult, ParseError> {
        let trimmed = script.trim();
        if trimmed.is_empty() {
            return Ok(ExecResult::ok());
        }

        self.state.record_history(trimmed);
        let verbose_echo = if self.state.options.verbose {
            format!("{}\n", trimmed)
        } else {
            String::new()
        };

        let node = crate::parser::parse(script)?;

        let result = match self.engine.execute(&node, &mut self.state, "").await {
            Ok(result) => result,
            Err(error) => {
                let code = error.exit_code();
                self.state.update_exit_code(code);
                match error {
                    // Loop control with no enclosing loop is inert
                    InterpreterError::Break { stdout, stderr, .. }
                    | InterpreterError::Continue { stdout, stderr, .. } => {
                        ExecResult::new(stdout, stderr, 0)
                    }
                    other => other.into_result(),
                }
            }
        };

        let result = self.run_exit_trap(result).await;
        Ok(result.with_prefix("", &verbose_echo))
    }

    /// Run the EXIT trap, if registered, appending its output to the
    /// script's result. The trap runs once per script execution.
    async fn run_exit_trap(&mut self, result: ExecResult) -> ExecResult {
        let Some(command) = self.state.traps.get("EXIT").cloned() else {
            return result;
        };
        let Ok(node) = crate::parser::parse(&command) else {
            return result;
        };
        let code = result.exit_code;
        let trap_result = match self.engine.execute(&node, &mut self.state, "").await {
            Ok(trap_result) => trap_result,
            Err(e) => e.into_result(),
        };
        // The trap's output joins the result; the script's exit code
        // stands
        ExecResult::new(
            format!("{}{}", result.stdout, trap_result.stdout),
            format!("{}{}", result.stderr, trap_result.stderr),
            code,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shell() -> Shell {
        Shell::new(ShellConfig {
            cwd: Some(std::env::temp_dir().to_string_lossy().into_owned()),
            ..Default::default()
        })
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_exec_simple_script() {
        let mut shell = shell();
        let result = shell.exec("echo hello").await.expect("no parse error");
        assert!(result.success);
        assert_eq!(result.stdout, "hello\n");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_empty_script_is_ok() {
        let mut shell = shell();
        let result = shell.exec("   \n  ").await.expect("no parse error");
        assert!(result.success);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_parse_error_raised() {
        let mut shell = shell();
        assert!(shell.exec("(unclosed").await.is_err());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_state_persists_across_exec_calls() {
        let mut shell = shell();
        shell.exec("COUNTER=41").await.expect("assign");
        let result = shell.exec("echo $COUNTER").await.expect("read");
        assert_eq!(result.stdout, "41\n");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_exit_collapses_to_result() {
        let mut shell = shell();
        let result = shell.exec("exit 5").await.expect("no parse error");
        assert_eq!(result.exit_code, 5);
        assert!(!result.success);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_process_env_inherited_and_exported() {
        std::env::set_var("LSH_SHELL_TEST_VAR", "inherited");
        let mut shell = shell();
        let result = shell.exec("echo $LSH_SHELL_TEST_VAR").await.expect("exec");
        assert_eq!(result.stdout, "inherited\n");
        std::env::remove_var("LSH_SHELL_TEST_VAR");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_history_recorded() {
        let mut shell = shell();
        shell.exec("echo one").await.expect("exec");
        shell.exec("echo two").await.expect("exec");
        let result = shell.exec("history").await.expect("exec");
        assert!(result.stdout.contains("echo one"));
        assert!(result.stdout.contains("echo two"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_exit_trap_runs() {
        let mut shell = shell();
        shell.exec("trap 'echo cleanup' EXIT").await.expect("trap");
        let result = shell.exec("echo body").await.expect("exec");
        assert_eq!(result.stdout, "body\ncleanup\n");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_verbose_echoes_input() {
        let mut shell = shell();
        shell.exec("set -v").await.expect("set");
        let result = shell.exec("echo hi").await.expect("exec");
        assert!(result.stderr.contains("echo hi"));
        assert_eq!(result.stdout, "hi\n");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_stray_break_is_inert() {
        let mut shell = shell();
        let result = shell.exec("break").await.expect("exec");
        assert!(result.success);
    }
}
