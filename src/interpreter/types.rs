//! Interpreter Types
//!
//! Type definitions for the interpreter state and execution results.
//! Exactly one `InterpreterState` is live per executing shell instance;
//! subshells get an isolated copy via [`InterpreterState::subshell_clone`],
//! command groups borrow the same state mutably.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Local};
use serde::Serialize;

use crate::ast::types::FunctionDefNode;
use crate::interpreter::jobs::SharedJobTable;

/// Shell options (set -e, etc.). Each is an independent boolean flag.
#[derive(Debug, Clone, Default)]
pub struct ShellOptions {
    /// set -e: abort execution when a command fails
    pub errexit: bool,
    /// set -u: referencing an unset variable is an error
    pub nounset: bool,
    /// set -x: write a trace line before executing commands
    pub xtrace: bool,
    /// set -v: echo input lines as they are read
    pub verbose: bool,
    /// set -f: disable pathname expansion
    pub noglob: bool,
    /// set -C: refuse `>` onto an existing file
    pub noclobber: bool,
    /// set -a: export every assigned variable
    pub allexport: bool,
    /// set -m: job-control monitor mode
    pub monitor: bool,
}

impl ShellOptions {
    /// Map a long option name (`setopt errexit`) onto its flag.
    pub fn flag_mut(&mut self, name: &str) -> Option<&mut bool> {
        match name {
            "errexit" => Some(&mut self.errexit),
            "nounset" => Some(&mut self.nounset),
            "xtrace" => Some(&mut self.xtrace),
            "verbose" => Some(&mut self.verbose),
            "noglob" => Some(&mut self.noglob),
            "noclobber" => Some(&mut self.noclobber),
            "allexport" => Some(&mut self.allexport),
            "monitor" => Some(&mut self.monitor),
            _ => None,
        }
    }

    /// Map a `set` letter onto its flag.
    pub fn letter_mut(&mut self, letter: char) -> Option<&mut bool> {
        match letter {
            'e' => Some(&mut self.errexit),
            'u' => Some(&mut self.nounset),
            'x' => Some(&mut self.xtrace),
            'v' => Some(&mut self.verbose),
            'f' => Some(&mut self.noglob),
            'C' => Some(&mut self.noclobber),
            'a' => Some(&mut self.allexport),
            'm' => Some(&mut self.monitor),
            _ => None,
        }
    }
}

/// Execution limits configuration.
#[derive(Debug, Clone)]
pub struct ExecutionLimits {
    /// Maximum recursion depth for function calls
    pub max_recursion_depth: u32,
    /// Maximum number of commands to execute per script
    pub max_command_count: u64,
    /// Maximum number of words one brace expansion may produce
    pub max_brace_expansions: usize,
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        Self {
            max_recursion_depth: 1000,
            max_command_count: 100_000,
            max_brace_expansions: 10_000,
        }
    }
}

/// One remembered command line.
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub number: usize,
    pub text: String,
    pub time: DateTime<Local>,
}

/// Function table shared between a shell and its subshells. Functions
/// are deliberately not subshell-isolated.
pub type SharedFunctions = Arc<Mutex<HashMap<String, FunctionDefNode>>>;

/// Complete interpreter state for script execution.
#[derive(Debug, Clone)]
pub struct InterpreterState {
    /// Shell variables (exported ones are mirrored into child environments)
    pub variables: HashMap<String, String>,
    /// Names marked for export
    pub exported: HashSet<String>,
    /// Names marked readonly
    pub readonly: HashSet<String>,
    /// Current working directory
    pub cwd: String,
    /// Previous directory, for `cd -`
    pub previous_dir: String,
    /// Positional parameters ($1...)
    pub positional: Vec<String>,
    /// Exit code of the last executed command ($?)
    pub last_exit_code: i32,
    /// Shell options
    pub options: ShellOptions,
    /// Function definitions, shared with subshells
    pub functions: SharedFunctions,
    /// Alias definitions
    pub aliases: HashMap<String, String>,
    /// Trap table: signal name -> command text
    pub traps: HashMap<String, String>,
    /// In-memory command history
    pub history: Vec<HistoryEntry>,
    /// Background job table, shared with subshells and job tasks
    pub jobs: SharedJobTable,
    /// PID of the last background job ($!)
    pub last_background_pid: u32,
    /// Counter for virtual pids handed to background jobs
    pub next_virtual_pid: u32,
    /// PID of the shell itself ($$)
    pub shell_pid: u32,
    /// Executing a condition (if/while/&&/||): errexit is suspended
    pub in_condition: bool,
    /// Current function call depth
    pub call_depth: u32,
    /// Commands executed so far (execution limit accounting)
    pub command_count: u64,
}

impl Default for InterpreterState {
    fn default() -> Self {
        Self {
            variables: HashMap::new(),
            exported: HashSet::new(),
            readonly: HashSet::new(),
            cwd: String::from("/"),
            previous_dir: String::new(),
            positional: Vec::new(),
            last_exit_code: 0,
            options: ShellOptions::default(),
            functions: Arc::new(Mutex::new(HashMap::new())),
            aliases: HashMap::new(),
            traps: HashMap::new(),
            history: Vec::new(),
            jobs: crate::interpreter::jobs::new_shared_job_table(),
            last_background_pid: 0,
            next_virtual_pid: 1000,
            shell_pid: std::process::id(),
            in_condition: false,
            call_depth: 0,
            command_count: 0,
        }
    }
}

impl InterpreterState {
    /// Isolated copy for a subshell: variables, cwd, and positional
    /// parameters are deep copies; the function and job tables stay
    /// shared by reference.
    pub fn subshell_clone(&self) -> Self {
        let mut clone = self.clone();
        clone.in_condition = false;
        clone
    }

    pub fn get_var(&self, name: &str) -> Option<&str> {
        self.variables.get(name).map(String::as_str)
    }

    /// Assign a variable, honoring `allexport`. Readonly names are
    /// refused.
    pub fn set_var(&mut self, name: &str, value: impl Into<String>) -> Result<(), String> {
        if self.readonly.contains(name) {
            return Err(format!("lsh: {}: readonly variable\n", name));
        }
        self.variables.insert(name.to_string(), value.into());
        if self.options.allexport {
            self.exported.insert(name.to_string());
        }
        Ok(())
    }

    pub fn unset_var(&mut self, name: &str) -> Result<(), String> {
        if self.readonly.contains(name) {
            return Err(format!("lsh: {}: readonly variable\n", name));
        }
        self.variables.remove(name);
        self.exported.remove(name);
        Ok(())
    }

    /// Environment record for child processes: exported names only.
    pub fn build_exported_env(&self) -> HashMap<String, String> {
        let mut env = HashMap::new();
        for name in &self.exported {
            if let Some(value) = self.variables.get(name) {
                env.insert(name.clone(), value.clone());
            }
        }
        env
    }

    /// Field separator used by word splitting.
    pub fn ifs(&self) -> String {
        self.get_var("IFS").unwrap_or(" \t\n").to_string()
    }

    pub fn update_exit_code(&mut self, exit_code: i32) {
        self.last_exit_code = exit_code;
    }

    pub fn alloc_virtual_pid(&mut self) -> u32 {
        let pid = self.next_virtual_pid;
        self.next_virtual_pid += 1;
        pid
    }

    /// Record a command line into the in-memory history.
    pub fn record_history(&mut self, line: &str) {
        let number = self.history.last().map(|e| e.number + 1).unwrap_or(1);
        self.history.push(HistoryEntry {
            number,
            text: line.to_string(),
            time: Local::now(),
        });
    }
}

/// Execution result from a command or script.
///
/// Invariant: `success == (exit_code == 0)` for every result the
/// executor produces; all constructors enforce it.
#[derive(Debug, Clone, Serialize)]
pub struct ExecResult {
    pub stdout: String,
    pub stderr: String,
    #[serde(rename = "exitCode")]
    pub exit_code: i32,
    pub success: bool,
}

impl ExecResult {
    pub fn new(stdout: impl Into<String>, stderr: impl Into<String>, exit_code: i32) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: stderr.into(),
            exit_code,
            success: exit_code == 0,
        }
    }

    /// Success with no output.
    pub fn ok() -> Self {
        Self::new("", "", 0)
    }

    /// Success with stdout.
    pub fn success(stdout: impl Into<String>) -> Self {
        Self::new(stdout, "", 0)
    }

    /// Generic failure with a stderr message.
    pub fn failure(stderr: impl Into<String>) -> Self {
        Self::new("", stderr, 1)
    }

    pub fn failure_with_code(stderr: impl Into<String>, exit_code: i32) -> Self {
        Self::new("", stderr, exit_code)
    }

    /// Boolean outcome: true → 0, false → 1. Used by test/[ and the
    /// `false` builtin.
    pub fn from_bool(passed: bool) -> Self {
        Self::new("", "", if passed { 0 } else { 1 })
    }

    /// Concatenate another result's output onto this one, adopting the
    /// other's exit status. Used by `;` command lists.
    pub fn then(self, next: ExecResult) -> Self {
        Self::new(
            format!("{}{}", self.stdout, next.stdout),
            format!("{}{}", self.stderr, next.stderr),
            next.exit_code,
        )
    }

    /// Prefix previously accumulated output onto this result.
    pub fn with_prefix(self, stdout: &str, stderr: &str) -> Self {
        Self::new(
            format!("{}{}", stdout, self.stdout),
            format!("{}{}", stderr, self.stderr),
            self.exit_code,
        )
    }
}

impl Default for ExecResult {
    fn default() -> Self {
        Self::ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_invariant() {
        assert!(ExecResult::ok().success);
        assert!(!ExecResult::failure("x").success);
        assert!(!ExecResult::failure_with_code("x", 127).success);
        assert!(ExecResult::from_bool(true).success);
        assert!(!ExecResult::from_bool(false).success);
    }

    #[test]
    fn test_then_adopts_right_status() {
        let left = ExecResult::new("a\n", "", 1);
        let right = ExecResult::new("b\n", "e\n", 0);
        let combined = left.then(right);
        assert_eq!(combined.stdout, "a\nb\n");
        assert_eq!(combined.stderr, "e\n");
        assert_eq!(combined.exit_code, 0);
        assert!(combined.success);
    }

    #[test]
    fn test_exported_env_filtering() {
        let mut state = InterpreterState::default();
        state.set_var("FOO", "bar").unwrap();
        state.set_var("SECRET", "x").unwrap();
        state.exported.insert("FOO".to_string());
        let env = state.build_exported_env();
        assert_eq!(env.get("FOO").map(String::as_str), Some("bar"));
        assert!(!env.contains_key("SECRET"));
    }

    #[test]
    fn test_allexport_marks_assignments() {
        let mut state = InterpreterState::default();
        state.options.allexport = true;
        state.set_var("AUTO", "1").unwrap();
        assert!(state.exported.contains("AUTO"));
    }

    #[test]
    fn test_readonly_refused() {
        let mut state = InterpreterState::default();
        state.set_var("X", "1").unwrap();
        state.readonly.insert("X".to_string());
        assert!(state.set_var("X", "2").is_err());
        assert!(state.unset_var("X").is_err());
        assert_eq!(state.get_var("X"), Some("1"));
    }

    #[test]
    fn test_subshell_clone_isolates_variables_shares_functions() {
        let mut state = InterpreterState::default();
        state.set_var("A", "1").unwrap();
        let mut sub = state.subshell_clone();
        sub.set_var("A", "2").unwrap();
        assert_eq!(state.get_var("A"), Some("1"));
        assert!(Arc::ptr_eq(&state.functions, &sub.functions));
    }

    #[test]
    fn test_history_numbering() {
        let mut state = InterpreterState::default();
        state.record_history("echo a");
        state.record_history("echo b");
        assert_eq!(state.history[1].number, 2);
    }
}
