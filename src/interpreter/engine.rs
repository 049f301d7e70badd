//! Execution engine.
//!
//! Walks the AST, dispatching to builtins or spawning external
//! processes, wiring up redirections, maintaining job-control state,
//! and implementing control flow and function-call semantics.
//!
//! `execute` is total over the closed node set and returns a deferred
//! result: execution is a single cooperative chain that suspends on
//! external processes and file I/O. Background jobs (`&`) are the only
//! source of concurrency; they run as detached tasks against an
//! isolated state copy and upsert the shared job table on completion.
//!
//! Resolution order for a simple command: user function, then builtin,
//! then external executable. Unknown names always fall through to the
//! external path, which reports 127.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;

use log::debug;
use rand::Rng;

use crate::ast::types::{
    AstNode, CaseNode, CommandGroupNode, CommandListNode, ForNode, FunctionDefNode, IfNode,
    ListOperator, PipelineNode, RedirectKind, Redirection, SimpleCommandNode, SubshellNode,
    WhileNode, Word,
};
use crate::interpreter::builtins::{self, control, echo, history, navigation, printf, read_input,
    test, trap, vars};
use crate::interpreter::collaborators::JobService;
use crate::interpreter::errors::InterpreterError;
use crate::interpreter::expansion::{
    expand_braces, expand_glob, match_pattern, resolve_parameter, resolve_variable, resolve_word,
    scan_segments, split_fields, Segment,
};
use crate::interpreter::external::run_external;
use crate::interpreter::jobs::JobStatus;
use crate::interpreter::redirect::{self, PreparedRedirections};
use crate::interpreter::types::{ExecResult, ExecutionLimits, InterpreterState};

/// Deferred execution result.
pub type ExecFuture<'a> = Pin<Box<dyn Future<Output = Result<ExecResult, InterpreterError>> + Send + 'a>>;

/// Deferred work accumulated while expanding process substitutions.
enum ProcSubArtifact {
    /// `<(cmd)`: remove the backing file afterwards
    Cleanup(PathBuf),
    /// `>(cmd)`: feed the file's content to cmd afterwards
    FeedBack { path: PathBuf, command: String },
}

/// Per-command expansion context: process-substitution artifacts and
/// stderr surfaced from command substitutions.
#[derive(Default)]
struct ExpandCtx {
    artifacts: Vec<ProcSubArtifact>,
    stderr: String,
}

/// The executor. Cheap to clone; background tasks get their own copy.
#[derive(Clone)]
pub struct ExecutionEngine {
    limits: ExecutionLimits,
    job_service: Option<Arc<dyn JobService>>,
}

impl ExecutionEngine {
    pub fn new(limits: ExecutionLimits) -> Self {
        Self {
            limits,
            job_service: None,
        }
    }

    /// Attach the external job-tracking collaborator used by the
    /// `job-*` builtins.
    pub fn with_job_service(mut self, service: Arc<dyn JobService>) -> Self {
        self.job_service = Some(service);
        self
    }

    // =========================================================================
    // Dispatch
    // =========================================================================

    /// Execute one node against the state. `stdin` is the text
    /// available on the command's standard input (pipelines thread it
    /// stage to stage).
    pub fn execute<'a>(
        &'a self,
        node: &'a AstNode,
        state: &'a mut InterpreterState,
        stdin: &'a str,
    ) -> ExecFuture<'a> {
        Box::pin(async move {
            match node {
                AstNode::SimpleCommand(cmd) => self.execute_simple(cmd, state, stdin).await,
                AstNode::Pipeline(pipeline) => self.execute_pipeline(pipeline, state, stdin).await,
                AstNode::CommandList(list) => self.execute_list(list, state, stdin).await,
                AstNode::Subshell(subshell) => self.execute_subshell(subshell, state, stdin).await,
                AstNode::CommandGroup(group) => self.execute_group(group, state, stdin).await,
                AstNode::If(node) => self.execute_if(node, state, stdin).await,
                AstNode::For(node) => self.execute_for(node, state, stdin).await,
                AstNode::While(node) => self.execute_while(node, state, stdin).await,
                AstNode::Case(node) => self.execute_case(node, state, stdin).await,
                AstNode::FunctionDef(def) => {
                    self.define_function(def, state);
                    Ok(ExecResult::ok())
                }
            }
        })
    }

    /// Execute a node as a condition: errexit is suspended inside.
    async fn execute_condition(
        &self,
        node: &AstNode,
        state: &mut InterpreterState,
        stdin: &str,
    ) -> Result<ExecResult, InterpreterError> {
        let saved = state.in_condition;
        state.in_condition = true;
        let result = self.execute(node, state, stdin).await;
        state.in_condition = saved;
        result
    }

    /// Raise when a failing command result must abort under `set -e`.
    fn maybe_errexit(
        &self,
        state: &InterpreterState,
        result: ExecResult,
    ) -> Result<ExecResult, InterpreterError> {
        if state.options.errexit && !result.success && !state.in_condition {
            return Err(InterpreterError::Errexit {
                exit_code: result.exit_code,
                stdout: result.stdout,
                stderr: result.stderr,
            });
        }
        Ok(result)
    }

    fn over_command_limit(&self, state: &InterpreterState) -> bool {
        state.command_count > self.limits.max_command_count
    }

    fn command_limit_result(&self) -> ExecResult {
        ExecResult::failure_with_code(
            format!(
                "lsh: maximum command count ({}) exceeded\n",
                self.limits.max_command_count
            ),
            126,
        )
    }

    // =========================================================================
    // Command lists
    // =========================================================================

    async fn execute_list(
        &self,
        list: &CommandListNode,
        state: &mut InterpreterState,
        stdin: &str,
    ) -> Result<ExecResult, InterpreterError> {
        match list.operator {
            ListOperator::Semi => {
                let left = self.execute(&list.left, state, stdin).await?;
                match &list.right {
                    Some(right) => match self.execute(right, state, stdin).await {
                        Ok(result) => Ok(left.then(result)),
                        Err(e) => Err(e.prepend_output(&left.stdout, &left.stderr)),
                    },
                    None => Ok(left),
                }
            }
            ListOperator::And => {
                let left = self.execute_condition(&list.left, state, stdin).await?;
                let right = match &list.right {
                    Some(right) => right,
                    None => return Ok(left),
                };
                if !left.success {
                    return Ok(left);
                }
                match self.execute(right, state, stdin).await {
                    Ok(result) => Ok(left.then(result)),
                    Err(e) => Err(e.prepend_output(&left.stdout, &left.stderr)),
                }
            }
            ListOperator::Or => {
                let left = self.execute_condition(&list.left, state, stdin).await?;
                let right = match &list.right {
                    Some(right) => right,
                    None => return Ok(left),
                };
                if left.success {
                    return Ok(left);
                }
                match self.execute(right, state, stdin).await {
                    Ok(result) => Ok(left.then(result)),
                    Err(e) => Err(e.prepend_output(&left.stdout, &left.stderr)),
                }
            }
            ListOperator::Background => {
                let launch = self.launch_background(&list.left, state).await;
                match &list.right {
                    Some(right) => match self.execute(right, state, stdin).await {
                        Ok(result) => Ok(launch.then(result)),
                        Err(e) => Err(e.prepend_output(&launch.stdout, &launch.stderr)),
                    },
                    None => Ok(launch),
                }
            }
        }
    }

    /// Launch a node as a tracked background job and return the
    /// synthetic `[id] pid` line immediately.
    async fn launch_background(&self, node: &AstNode, state: &mut InterpreterState) -> ExecResult {
        let command_text = node.to_command_string();
        let pid = state.alloc_virtual_pid();

        let id = {
            let mut table = state.jobs.lock().await;
            table.register(pid, command_text.clone())
        };
        state.last_background_pid = pid;

        debug!("background job [{}] pid {} started: {}", id, pid, command_text);

        let engine = self.clone();
        let mut task_state = state.subshell_clone();
        let task_node = node.clone();
        let jobs = state.jobs.clone();
        let handle = tokio::spawn(async move {
            let result = match engine.execute(&task_node, &mut task_state, "").await {
                Ok(result) => result,
                Err(e) => e.into_result(),
            };
            let mut table = jobs.lock().await;
            table.mark_done(id, result.exit_code);
            debug!("background job [{}] finished with {}", id, result.exit_code);
            result
        });
        state.jobs.lock().await.attach_handle(id, handle);

        ExecResult::success(format!("[{}] {}\n", id, pid))
    }

    // =========================================================================
    // Pipelines
    // =========================================================================

    /// Chain stages left to right, feeding each stage's stdout to the
    /// next stage's stdin. Each stage runs against an isolated state
    /// copy; per-stage failures are attributed individually and the
    /// final stage's status is the pipeline's status.
    async fn execute_pipeline(
        &self,
        pipeline: &PipelineNode,
        state: &mut InterpreterState,
        stdin: &str,
    ) -> Result<ExecResult, InterpreterError> {
        let mut stage_input = stdin.to_string();
        let mut stderr_all = String::new();
        let mut last = ExecResult::ok();

        for stage in &pipeline.commands {
            let mut stage_state = state.subshell_clone();
            let result = match self.execute(stage, &mut stage_state, &stage_input).await {
                Ok(result) => result,
                // A stage's own unwind ends that stage only
                Err(e) => e.into_result(),
            };
            state.command_count = stage_state.command_count;
            stage_input = result.stdout.clone();
            stderr_all.push_str(&result.stderr);
            last = result;
        }

        let result = ExecResult::new(last.stdout, stderr_all, last.exit_code);
        state.update_exit_code(result.exit_code);
        self.maybe_errexit(state, result)
    }

    // =========================================================================
    // Subshells and groups
    // =========================================================================

    /// Subshell: isolated state copy; only the exit code escapes.
    async fn execute_subshell(
        &self,
        subshell: &SubshellNode,
        state: &mut InterpreterState,
        stdin: &str,
    ) -> Result<ExecResult, InterpreterError> {
        let prepared = match self.prepare_redirections(&subshell.redirections, state).await? {
            Ok(prepared) => prepared,
            Err(failure) => {
                state.update_exit_code(failure.exit_code);
                return self.maybe_errexit(state, failure);
            }
        };
        let effective_stdin = prepared.stdin.clone().unwrap_or_else(|| stdin.to_string());

        let mut sub = state.subshell_clone();
        let result = match self.execute(&subshell.command, &mut sub, &effective_stdin).await {
            Ok(result) => result,
            // Control flow never crosses the subshell boundary
            Err(e) => e.into_result(),
        };
        state.command_count = sub.command_count;

        let result = redirect::finalize_builtin(&prepared, result).await;
        state.update_exit_code(result.exit_code);
        Ok(result)
    }

    /// Command group: same state as the caller, no isolation.
    async fn execute_group(
        &self,
        group: &CommandGroupNode,
        state: &mut InterpreterState,
        stdin: &str,
    ) -> Result<ExecResult, InterpreterError> {
        let prepared = match self.prepare_redirections(&group.redirections, state).await? {
            Ok(prepared) => prepared,
            Err(failure) => {
                state.update_exit_code(failure.exit_code);
                return self.maybe_errexit(state, failure);
            }
        };
        let effective_stdin = prepared.stdin.clone().unwrap_or_else(|| stdin.to_string());

        let result = self.execute(&group.command, state, &effective_stdin).await?;
        let result = redirect::finalize_builtin(&prepared, result).await;
        state.update_exit_code(result.exit_code);
        Ok(result)
    }

    // =========================================================================
    // Control flow
    // =========================================================================

    async fn execute_if(
        &self,
        node: &IfNode,
        state: &mut InterpreterState,
        stdin: &str,
    ) -> Result<ExecResult, InterpreterError> {
        let condition = self.execute_condition(&node.condition, state, stdin).await?;

        let branch = if condition.success {
            Some(&node.then_clause)
        } else {
            node.else_clause.as_ref()
        };

        match branch {
            Some(body) => match self.execute(body, state, stdin).await {
                Ok(result) => Ok(condition.then(result)),
                Err(e) => Err(e.prepend_output(&condition.stdout, &condition.stderr)),
            },
            // No branch selected: the if statement succeeds
            None => Ok(ExecResult::new(condition.stdout, condition.stderr, 0)),
        }
    }

    async fn execute_while(
        &self,
        node: &WhileNode,
        state: &mut InterpreterState,
        stdin: &str,
    ) -> Result<ExecResult, InterpreterError> {
        let mut stdout = String::new();
        let mut stderr = String::new();
        let mut exit_code = 0;

        loop {
            if self.over_command_limit(state) {
                let limit = self.command_limit_result();
                return Ok(limit.with_prefix(&stdout, &stderr));
            }

            let condition = match self.execute_condition(&node.condition, state, stdin).await {
                Ok(result) => result,
                Err(e) => return Err(e.prepend_output(&stdout, &stderr)),
            };
            stdout.push_str(&condition.stdout);
            stderr.push_str(&condition.stderr);

            let proceed = condition.success != node.until;
            if !proceed {
                break;
            }

            match self.execute(&node.body, state, stdin).await {
                Ok(result) => {
                    stdout.push_str(&result.stdout);
                    stderr.push_str(&result.stderr);
                    exit_code = result.exit_code;
                }
                Err(InterpreterError::Break {
                    levels,
                    stdout: out,
                    stderr: err,
                }) => {
                    stdout.push_str(&out);
                    stderr.push_str(&err);
                    if levels > 1 {
                        return Err(InterpreterError::Break {
                            levels: levels - 1,
                            stdout,
                            stderr,
                        });
                    }
                    exit_code = 0;
                    break;
                }
                Err(InterpreterError::Continue {
                    levels,
                    stdout: out,
                    stderr: err,
                }) => {
                    stdout.push_str(&out);
                    stderr.push_str(&err);
                    if levels > 1 {
                        return Err(InterpreterError::Continue {
                            levels: levels - 1,
                            stdout,
                            stderr,
                        });
                    }
                    continue;
                }
                Err(e) => return Err(e.prepend_output(&stdout, &stderr)),
            }
        }

        let result = ExecResult::new(stdout, stderr, exit_code);
        state.update_exit_code(result.exit_code);
        Ok(result)
    }

    async fn execute_for(
        &self,
        node: &ForNode,
        state: &mut InterpreterState,
        stdin: &str,
    ) -> Result<ExecResult, InterpreterError> {
        // Iterate the expanded word list, or the positional parameters
        // when no `in` list was written
        let mut ctx = ExpandCtx::default();
        let items = match &node.words {
            Some(words) => {
                let mut items = Vec::new();
                for word in words {
                    items.extend(self.expand_word_to_fields(state, word, &mut ctx).await?);
                }
                items
            }
            None => state.positional.clone(),
        };
        self.run_procsub_feedback(state, &mut ctx).await;

        let mut stdout = String::new();
        let mut stderr = ctx.stderr.clone();
        let mut exit_code = 0;

        for item in items {
            if self.over_command_limit(state) {
                let limit = self.command_limit_result();
                return Ok(limit.with_prefix(&stdout, &stderr));
            }
            if let Err(msg) = state.set_var(&node.variable, item) {
                stderr.push_str(&msg);
                exit_code = 1;
                break;
            }

            match self.execute(&node.body, state, stdin).await {
                Ok(result) => {
                    stdout.push_str(&result.stdout);
                    stderr.push_str(&result.stderr);
                    exit_code = result.exit_code;
                }
                Err(InterpreterError::Break {
                    levels,
                    stdout: out,
                    stderr: err,
                }) => {
                    stdout.push_str(&out);
                    stderr.push_str(&err);
                    if levels > 1 {
                        return Err(InterpreterError::Break {
                            levels: levels - 1,
                            stdout,
                            stderr,
                        });
                    }
                    exit_code = 0;
                    break;
                }
                Err(InterpreterError::Continue {
                    levels,
                    stdout: out,
                    stderr: err,
                }) => {
                    stdout.push_str(&out);
                    stderr.push_str(&err);
                    if levels > 1 {
                        return Err(InterpreterError::Continue {
                            levels: levels - 1,
                            stdout,
                            stderr,
                        });
                    }
                    continue;
                }
                Err(e) => return Err(e.prepend_output(&stdout, &stderr)),
            }
        }

        let result = ExecResult::new(stdout, stderr, exit_code);
        state.update_exit_code(result.exit_code);
        Ok(result)
    }

    /// Expand the scrutinee, then match each item's patterns in order
    /// with glob-style matching; the first matching item's command
    /// runs. No match is success with no output.
    async fn execute_case(
        &self,
        node: &CaseNode,
        state: &mut InterpreterState,
        stdin: &str,
    ) -> Result<ExecResult, InterpreterError> {
        let mut ctx = ExpandCtx::default();
        let scrutinee = self.expand_word(state, &node.word, &mut ctx).await?;

        for item in &node.items {
            let mut matched = false;
            for pattern in &item.patterns {
                let pattern_text = self.expand_word(state, pattern, &mut ctx).await?;
                if match_pattern(&pattern_text, &scrutinee) {
                    matched = true;
                    break;
                }
            }
            if matched {
                let result = match &item.command {
                    Some(command) => self.execute(command, state, stdin).await?,
                    None => ExecResult::ok(),
                };
                self.run_procsub_feedback(state, &mut ctx).await;
                state.update_exit_code(result.exit_code);
                return Ok(result.with_prefix("", &ctx.stderr));
            }
        }

        self.run_procsub_feedback(state, &mut ctx).await;
        state.update_exit_code(0);
        Ok(ExecResult::new("", ctx.stderr, 0))
    }

    // =========================================================================
    // Functions
    // =========================================================================

    fn define_function(&self, def: &FunctionDefNode, state: &mut InterpreterState) {
        let mut functions = match state.functions.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        functions.insert(def.name.clone(), def.clone());
    }

    fn lookup_function(&self, name: &str, state: &InterpreterState) -> Option<FunctionDefNode> {
        let functions = match state.functions.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        functions.get(name).cloned()
    }

    /// Call a user-defined function: positional parameters are swapped
    /// for the argument list and restored afterwards, and the pre-call
    /// variable bindings are restored on exit (simplified dynamic
    /// scoping).
    async fn call_function(
        &self,
        def: &FunctionDefNode,
        state: &mut InterpreterState,
        args: &[String],
        stdin: &str,
    ) -> Result<ExecResult, InterpreterError> {
        if state.call_depth >= self.limits.max_recursion_depth {
            return Ok(ExecResult::failure_with_code(
                format!(
                    "lsh: {}: maximum recursion depth ({}) exceeded\n",
                    def.name, self.limits.max_recursion_depth
                ),
                126,
            ));
        }

        let saved_positional = std::mem::replace(&mut state.positional, args.to_vec());
        let saved_variables = state.variables.clone();
        state.call_depth += 1;

        let outcome = self.execute(&def.body, state, stdin).await;

        state.call_depth -= 1;
        state.positional = saved_positional;
        state.variables = saved_variables;

        match outcome {
            Ok(result) => Ok(result),
            Err(InterpreterError::Return {
                exit_code,
                stdout,
                stderr,
            }) => Ok(ExecResult::new(stdout, stderr, exit_code)),
            Err(e) => Err(e),
        }
    }

    // =========================================================================
    // Simple commands
    // =========================================================================

    async fn execute_simple(
        &self,
        cmd: &SimpleCommandNode,
        state: &mut InterpreterState,
        stdin: &str,
    ) -> Result<ExecResult, InterpreterError> {
        state.command_count += 1;
        if self.over_command_limit(state) {
            let result = self.command_limit_result();
            state.update_exit_code(result.exit_code);
            return Ok(result);
        }

        // Alias expansion rewrites the command word, single pass
        let (name_word, mut arg_words) = self.apply_alias(cmd, state);

        // Leading NAME=VALUE words are assignments
        let mut assignment_words = Vec::new();
        let mut command_word = None;
        if is_assignment_word(&name_word.text) {
            assignment_words.push(name_word.clone());
            while let Some(first) = arg_words.first() {
                if is_assignment_word(&first.text) {
                    assignment_words.push(arg_words.remove(0));
                } else {
                    break;
                }
            }
            if !arg_words.is_empty() {
                command_word = Some(arg_words.remove(0));
            }
        } else {
            command_word = Some(name_word);
        }

        let mut ctx = ExpandCtx::default();
        for word in &assignment_words {
            if let Err(failure) = self.apply_assignment(state, word, &mut ctx).await? {
                state.update_exit_code(failure.exit_code);
                return self.maybe_errexit(state, failure.with_prefix("", &ctx.stderr));
            }
        }

        let Some(command_word) = command_word else {
            // Assignment-only command
            state.update_exit_code(0);
            return Ok(ExecResult::new("", ctx.stderr.clone(), 0));
        };

        // Expand name and arguments; a name expanding into several
        // fields contributes the extras as leading arguments
        let mut fields = self
            .expand_word_to_fields(state, &command_word, &mut ctx)
            .await?;
        for word in &arg_words {
            fields.extend(self.expand_word_to_fields(state, word, &mut ctx).await?);
        }
        if fields.is_empty() {
            state.update_exit_code(0);
            return Ok(ExecResult::new("", ctx.stderr.clone(), 0));
        }
        let name = fields.remove(0);
        let args = fields;

        let trace = if state.options.xtrace {
            let mut line = format!("+ {}", name);
            for arg in &args {
                line.push(' ');
                line.push_str(arg);
            }
            line.push('\n');
            line
        } else {
            String::new()
        };

        // Redirections are processed before dispatch
        let prepared = match self.prepare_redirections(&cmd.redirections, state).await? {
            Ok(prepared) => prepared,
            Err(failure) => {
                state.update_exit_code(failure.exit_code);
                let failure = failure.with_prefix("", &format!("{}{}", ctx.stderr, trace));
                return self.maybe_errexit(state, failure);
            }
        };
        let effective_stdin = prepared.stdin.clone().unwrap_or_else(|| stdin.to_string());

        debug!("dispatching command: {}", name);

        let result = self
            .dispatch_command(state, &name, &args, &effective_stdin, &prepared)
            .await;

        self.run_procsub_feedback(state, &mut ctx).await;

        let result = match result {
            Ok(result) => result,
            Err(e) => return Err(e.prepend_output("", &format!("{}{}", ctx.stderr, trace))),
        };
        let result = result.with_prefix("", &format!("{}{}", ctx.stderr, trace));
        state.update_exit_code(result.exit_code);
        self.maybe_errexit(state, result)
    }

    /// Rewrite the command word through the alias table (one pass).
    fn apply_alias(
        &self,
        cmd: &SimpleCommandNode,
        state: &InterpreterState,
    ) -> (Word, Vec<Word>) {
        if !cmd.name.quoted {
            if let Some(value) = state.aliases.get(&cmd.name.text) {
                let mut tokens: Vec<Word> = value.split_whitespace().map(Word::new).collect();
                if !tokens.is_empty() {
                    let name = tokens.remove(0);
                    tokens.extend(cmd.args.iter().cloned());
                    return (name, tokens);
                }
            }
        }
        (cmd.name.clone(), cmd.args.clone())
    }

    /// Apply one NAME=VALUE word. Returns Ok(Err(failure)) for
    /// readonly refusals so the caller can surface a failing result.
    async fn apply_assignment(
        &self,
        state: &mut InterpreterState,
        word: &Word,
        ctx: &mut ExpandCtx,
    ) -> Result<Result<(), ExecResult>, InterpreterError> {
        let (name, raw_value) = match word.text.split_once('=') {
            Some(parts) => parts,
            None => return Ok(Ok(())),
        };
        let value = if word.single_quoted {
            raw_value.to_string()
        } else {
            let value_word = Word {
                text: raw_value.to_string(),
                quoted: word.quoted,
                single_quoted: false,
            };
            self.expand_word(state, &value_word, ctx).await?
        };
        match state.set_var(name, value) {
            Ok(()) => Ok(Ok(())),
            Err(msg) => Ok(Err(ExecResult::failure(msg))),
        }
    }

    /// Resolve and run a command: function, then builtin, then
    /// external.
    async fn dispatch_command(
        &self,
        state: &mut InterpreterState,
        name: &str,
        args: &[String],
        stdin: &str,
        prepared: &PreparedRedirections,
    ) -> Result<ExecResult, InterpreterError> {
        if let Some(def) = self.lookup_function(name, state) {
            let result = self.call_function(&def, state, args, stdin).await?;
            return Ok(redirect::finalize_builtin(prepared, result).await);
        }

        if builtins::is_builtin(name) {
            let result = self.run_builtin(state, name, args, stdin).await?;
            return Ok(redirect::finalize_builtin(prepared, result).await);
        }

        let env = {
            let mut env = state.build_exported_env();
            env.entry("PATH".to_string()).or_insert_with(|| {
                state
                    .get_var("PATH")
                    .map(str::to_string)
                    .unwrap_or_else(|| std::env::var("PATH").unwrap_or_default())
            });
            env
        };
        Ok(run_external(
            name,
            args,
            &env,
            &state.cwd,
            stdin,
            prepared.stdout.as_ref(),
            prepared.stderr.as_ref(),
        )
        .await)
    }

    // =========================================================================
    // Builtin dispatch
    // =========================================================================

    /// Closed dispatch table over the builtin surface. Engine-reentrant
    /// builtins (eval, source, exec, wait, fc...) live here; the plain
    /// state handlers live in the builtins modules.
    async fn run_builtin(
        &self,
        state: &mut InterpreterState,
        name: &str,
        args: &[String],
        stdin: &str,
    ) -> Result<ExecResult, InterpreterError> {
        match name {
            "cd" => Ok(navigation::handle_cd(state, args)),
            "pwd" => Ok(navigation::handle_pwd(state, args)),
            "echo" => Ok(echo::handle_echo(args)),
            "printf" => Ok(printf::handle_printf(args)),
            "true" | ":" => control::handle_true(),
            "false" => control::handle_false(),
            "exit" => control::handle_exit(state, args),
            "return" => control::handle_return(state, args),
            "shift" => control::handle_shift(state, args),
            "break" => control::handle_break(args),
            "continue" => control::handle_continue(args),
            "export" => Ok(vars::handle_export(state, args)),
            "unset" => Ok(vars::handle_unset(state, args)),
            "set" => Ok(vars::handle_set(state, args)),
            "local" => Ok(vars::handle_local(state, args)),
            "readonly" => Ok(vars::handle_readonly(state, args)),
            "typeset" => Ok(vars::handle_typeset(state, args)),
            "setopt" => Ok(vars::handle_setopt(state, args)),
            "unsetopt" => Ok(vars::handle_unsetopt(state, args)),
            "test" => Ok(test::handle_test(state, args)),
            "[" => {
                let mut test_args = args.to_vec();
                if test_args.last().map(String::as_str) != Some("]") {
                    return Ok(ExecResult::failure_with_code("lsh: [: missing `]'\n", 2));
                }
                test_args.pop();
                Ok(test::handle_test(state, &test_args))
            }
            "read" => Ok(read_input::handle_read(state, args, stdin)),
            "getopts" => Ok(read_input::handle_getopts(state, args)),
            "trap" => Ok(trap::handle_trap(state, args)),
            "history" => Ok(history::handle_history(state, args)),
            "alias" => Ok(history::handle_alias(state, args)),
            "unalias" => Ok(history::handle_unalias(state, args)),
            "eval" => self.builtin_eval(state, args, stdin).await,
            "source" | "." => self.builtin_source(state, args, stdin).await,
            "exec" => self.builtin_exec(state, args, stdin).await,
            "jobs" => Ok(self.builtin_jobs(state).await),
            "wait" => Ok(self.builtin_wait(state, args).await),
            "fg" => Ok(self.builtin_fg(state, args).await),
            "bg" => Ok(self.builtin_bg(state, args).await),
            "fc" => self.builtin_fc(state, args, stdin).await,
            "r" => self.builtin_repeat(state, stdin).await,
            "job-create" | "job-start" | "job-stop" | "job-list" => {
                Ok(self.builtin_job_service(name, args).await)
            }
            other => Ok(ExecResult::failure_with_code(
                format!("lsh: {}: command not found\n", other),
                127,
            )),
        }
    }

    /// eval args... — concatenate and execute in the current state.
    async fn builtin_eval(
        &self,
        state: &mut InterpreterState,
        args: &[String],
        stdin: &str,
    ) -> Result<ExecResult, InterpreterError> {
        let script = args.join(" ");
        if script.trim().is_empty() {
            return Ok(ExecResult::ok());
        }
        match crate::parser::parse(&script) {
            Ok(node) => self.execute(&node, state, stdin).await,
            Err(e) => Ok(ExecResult::failure_with_code(format!("lsh: eval: {}\n", e), 2)),
        }
    }

    /// source file — read, parse, and execute in the current state.
    /// `return` exits the sourced script.
    async fn builtin_source(
        &self,
        state: &mut InterpreterState,
        args: &[String],
        stdin: &str,
    ) -> Result<ExecResult, InterpreterError> {
        let Some(file) = args.first() else {
            return Ok(ExecResult::failure_with_code(
                "lsh: source: filename argument required\n",
                2,
            ));
        };
        let path = crate::interpreter::expansion::resolve_path(&state.cwd, file);
        let script = match tokio::fs::read_to_string(&path).await {
            Ok(script) => script,
            Err(_) => {
                return Ok(ExecResult::failure(format!(
                    "lsh: source: {}: No such file or directory\n",
                    file
                )))
            }
        };
        let node = match crate::parser::parse(&script) {
            Ok(node) => node,
            Err(e) => {
                return Ok(ExecResult::failure_with_code(
                    format!("lsh: source: {}: {}\n", file, e),
                    2,
                ))
            }
        };

        state.call_depth += 1;
        let outcome = self.execute(&node, state, stdin).await;
        state.call_depth -= 1;

        match outcome {
            Ok(result) => Ok(result),
            Err(InterpreterError::Return {
                exit_code,
                stdout,
                stderr,
            }) => Ok(ExecResult::new(stdout, stderr, exit_code)),
            Err(e) => Err(e),
        }
    }

    /// exec cmd args... — run the command, then terminate the script
    /// with its exit code. An in-process interpreter cannot replace its
    /// own image, so termination stands in for replacement.
    async fn builtin_exec(
        &self,
        state: &mut InterpreterState,
        args: &[String],
        stdin: &str,
    ) -> Result<ExecResult, InterpreterError> {
        let Some(name) = args.first() else {
            return Ok(ExecResult::ok());
        };
        let rest = &args[1..];
        let env = state.build_exported_env();
        let result = run_external(name, rest, &env, &state.cwd, stdin, None, None).await;
        Err(InterpreterError::Exit {
            exit_code: result.exit_code,
            stdout: result.stdout,
            stderr: result.stderr,
        })
    }

    async fn builtin_jobs(&self, state: &mut InterpreterState) -> ExecResult {
        let mut table = state.jobs.lock().await;
        let jobs = table.list();
        let mut out = String::new();
        for job in &jobs {
            out.push_str(&format!(
                "[{}]  {}\t{}\n",
                job.id,
                job.status.as_str(),
                job.command
            ));
        }
        // Entries already reported as Done drop off the listing
        table.reap_done();
        ExecResult::success(out)
    }

    /// wait [id|pid] — wait for one job or all of them. Waits happen
    /// outside the table lock.
    async fn builtin_wait(&self, state: &mut InterpreterState, args: &[String]) -> ExecResult {
        match args.first() {
            None => {
                let handles = {
                    let mut table = state.jobs.lock().await;
                    table.take_all_handles()
                };
                let mut exit_code = 0;
                for (id, handle) in handles {
                    let code = match handle.await {
                        Ok(result) => result.exit_code,
                        Err(_) => 1,
                    };
                    state.jobs.lock().await.mark_done(id, code);
                    exit_code = code;
                }
                ExecResult::new("", "", exit_code)
            }
            Some(spec) => {
                let Some(id) = self.resolve_job_spec(state, spec).await else {
                    return ExecResult::failure_with_code(
                        format!("lsh: wait: {}: no such job\n", spec),
                        127,
                    );
                };
                let handle = state.jobs.lock().await.take_handle(id);
                match handle {
                    Some(handle) => {
                        let code = match handle.await {
                            Ok(result) => result.exit_code,
                            Err(_) => 1,
                        };
                        state.jobs.lock().await.mark_done(id, code);
                        ExecResult::new("", "", code)
                    }
                    None => {
                        // Already finished: report its recorded code
                        let table = state.jobs.lock().await;
                        let code = table.get(id).and_then(|j| j.exit_code).unwrap_or(0);
                        ExecResult::new("", "", code)
                    }
                }
            }
        }
    }

    /// fg [id] — bring a job to the foreground: wait for it and adopt
    /// its result.
    async fn builtin_fg(&self, state: &mut InterpreterState, args: &[String]) -> ExecResult {
        let id = match args.first() {
            Some(spec) => self.resolve_job_spec(state, spec).await,
            None => {
                let table = state.jobs.lock().await;
                table
                    .list()
                    .iter()
                    .rev()
                    .find(|j| j.status == JobStatus::Running)
                    .map(|j| j.id)
            }
        };
        let Some(id) = id else {
            return ExecResult::failure(format!(
                "lsh: fg: {}: no such job\n",
                args.first().map(String::as_str).unwrap_or("current")
            ));
        };

        let handle = state.jobs.lock().await.take_handle(id);
        match handle {
            Some(handle) => {
                let result = handle.await.unwrap_or_else(|_| ExecResult::failure("lsh: fg: job panicked\n"));
                state.jobs.lock().await.mark_done(id, result.exit_code);
                result
            }
            None => ExecResult::failure(format!("lsh: fg: {}: no such job\n", id)),
        }
    }

    /// bg [id] — resume a stopped job. Detached tasks always run, so
    /// this is a status flip plus the conventional report line.
    async fn builtin_bg(&self, state: &mut InterpreterState, args: &[String]) -> ExecResult {
        let id = match args.first() {
            Some(spec) => self.resolve_job_spec(state, spec).await,
            None => {
                let table = state.jobs.lock().await;
                table
                    .list()
                    .iter()
                    .rev()
                    .find(|j| j.status == JobStatus::Stopped)
                    .map(|j| j.id)
            }
        };
        let Some(id) = id else {
            return ExecResult::failure("lsh: bg: no current job\n".to_string());
        };
        let mut table = state.jobs.lock().await;
        table.mark_running(id);
        match table.get(id) {
            Some(job) => ExecResult::success(format!("[{}] {} &\n", job.id, job.command)),
            None => ExecResult::failure(format!("lsh: bg: {}: no such job\n", id)),
        }
    }

    /// Accept `%1`, `1`, or a pid as a job specifier.
    async fn resolve_job_spec(&self, state: &InterpreterState, spec: &str) -> Option<usize> {
        let table = state.jobs.lock().await;
        let trimmed = spec.strip_prefix('%').unwrap_or(spec);
        if let Ok(n) = trimmed.parse::<usize>() {
            if table.get(n).is_some() {
                return Some(n);
            }
            if let Some(job) = table.find_by_pid(n as u32) {
                return Some(job.id);
            }
        }
        None
    }

    /// fc [-l | -s [prefix]] — list recent history or re-execute a
    /// command. The entry for the running fc/r line itself is skipped.
    async fn builtin_fc(
        &self,
        state: &mut InterpreterState,
        args: &[String],
        stdin: &str,
    ) -> Result<ExecResult, InterpreterError> {
        match args.first().map(String::as_str) {
            Some("-s") => {
                let prefix = args.get(1).cloned();
                self.reexecute_history(state, prefix.as_deref(), stdin).await
            }
            Some("-l") | None => {
                let history = &state.history;
                let skip_last = history
                    .last()
                    .map(|e| e.text.starts_with("fc") || e.text == "r")
                    .unwrap_or(false);
                let end = if skip_last {
                    history.len().saturating_sub(1)
                } else {
                    history.len()
                };
                let start = end.saturating_sub(16);
                let mut out = String::new();
                for entry in &history[start..end] {
                    out.push_str(&format!("{}\t{}\n", entry.number, entry.text));
                }
                Ok(ExecResult::success(out))
            }
            Some(other) => Ok(ExecResult::failure_with_code(
                format!("lsh: fc: {}: invalid option\n", other),
                2,
            )),
        }
    }

    /// r — repeat the previous command.
    async fn builtin_repeat(
        &self,
        state: &mut InterpreterState,
        stdin: &str,
    ) -> Result<ExecResult, InterpreterError> {
        self.reexecute_history(state, None, stdin).await
    }

    async fn reexecute_history(
        &self,
        state: &mut InterpreterState,
        prefix: Option<&str>,
        stdin: &str,
    ) -> Result<ExecResult, InterpreterError> {
        // The line being executed right now is the newest entry
        let candidates: Vec<String> = state
            .history
            .iter()
            .rev()
            .skip(1)
            .map(|e| e.text.clone())
            .collect();
        let line = candidates.into_iter().find(|text| match prefix {
            Some(p) => text.starts_with(p),
            None => true,
        });
        let Some(line) = line else {
            return Ok(ExecResult::failure("lsh: fc: no matching history entry\n"));
        };
        match crate::parser::parse(&line) {
            Ok(node) => self.execute(&node, state, stdin).await,
            Err(e) => Ok(ExecResult::failure_with_code(format!("lsh: fc: {}\n", e), 2)),
        }
    }

    /// job-create/start/stop/list — delegates to the external job
    /// tracker when one is attached.
    async fn builtin_job_service(&self, name: &str, args: &[String]) -> ExecResult {
        let Some(service) = &self.job_service else {
            return ExecResult::failure(format!("lsh: {}: job service not attached\n", name));
        };
        match name {
            "job-create" => {
                let Some(job_name) = args.first() else {
                    return ExecResult::failure_with_code(
                        "lsh: job-create: usage: job-create name command...\n",
                        2,
                    );
                };
                let command = args[1..].join(" ");
                match service.create(job_name, &command).await {
                    Ok(id) => ExecResult::success(format!("{}\n", id)),
                    Err(e) => ExecResult::failure(format!("lsh: job-create: {}\n", e)),
                }
            }
            "job-start" | "job-stop" => {
                let Some(id) = args.first() else {
                    return ExecResult::failure_with_code(
                        format!("lsh: {}: job id required\n", name),
                        2,
                    );
                };
                let outcome = if name == "job-start" {
                    service.start(id).await
                } else {
                    service.stop(id).await
                };
                match outcome {
                    Ok(()) => ExecResult::ok(),
                    Err(e) => ExecResult::failure(format!("lsh: {}: {}\n", name, e)),
                }
            }
            _ => match service.list().await {
                Ok(records) => {
                    let mut out = String::new();
                    for record in records {
                        out.push_str(&format!("{}\t{}\t{}\n", record.id, record.name, record.status));
                    }
                    ExecResult::success(out)
                }
                Err(e) => ExecResult::failure(format!("lsh: job-list: {}\n", e)),
            },
        }
    }

    // =========================================================================
    // Word expansion orchestration
    // =========================================================================

    /// Public contract: expand one word to a single string (no field
    /// splitting, no pathname expansion).
    pub async fn expand(
        &self,
        state: &mut InterpreterState,
        word: &Word,
    ) -> Result<String, InterpreterError> {
        let mut ctx = ExpandCtx::default();
        let value = self.expand_word(state, word, &mut ctx).await?;
        self.run_procsub_feedback(state, &mut ctx).await;
        Ok(value)
    }

    /// Public contract: expand one word to fields, applying the full
    /// ordered sequence (substitution, brace, IFS split, pathname).
    pub async fn expand_to_fields(
        &self,
        state: &mut InterpreterState,
        word: &Word,
    ) -> Result<Vec<String>, InterpreterError> {
        let mut ctx = ExpandCtx::default();
        let fields = self.expand_word_to_fields(state, word, &mut ctx).await?;
        self.run_procsub_feedback(state, &mut ctx).await;
        Ok(fields)
    }

    /// Phase 1 only: variable/parameter and command substitution.
    async fn expand_word(
        &self,
        state: &mut InterpreterState,
        word: &Word,
        ctx: &mut ExpandCtx,
    ) -> Result<String, InterpreterError> {
        if word.single_quoted {
            return Ok(word.text.clone());
        }
        let (value, _) = self.substitute_segments(state, &word.text, ctx).await?;
        Ok(value)
    }

    /// Full expansion sequence for one word: substitution, then brace
    /// expansion, then field splitting (only when a substitution
    /// actually happened), then pathname expansion per field. Quoting
    /// disables everything past substitution; single quotes disable
    /// substitution too.
    async fn expand_word_to_fields(
        &self,
        state: &mut InterpreterState,
        word: &Word,
        ctx: &mut ExpandCtx,
    ) -> Result<Vec<String>, InterpreterError> {
        if word.single_quoted {
            return Ok(vec![word.text.clone()]);
        }

        let (value, substituted) = self.substitute_segments(state, &word.text, ctx).await?;
        if word.quoted {
            return Ok(vec![value]);
        }

        let braced = expand_braces(&value, self.limits.max_brace_expansions);

        let split: Vec<String> = if substituted {
            let ifs = state.ifs();
            braced
                .iter()
                .flat_map(|piece| split_fields(piece, &ifs))
                .collect()
        } else {
            braced
        };

        if state.options.noglob {
            return Ok(split);
        }
        Ok(split
            .iter()
            .flat_map(|field| expand_glob(field, &state.cwd))
            .collect())
    }

    /// Resolve the scanned segments of a word. Returns the value and
    /// whether any substitution was performed (which gates field
    /// splitting).
    async fn substitute_segments(
        &self,
        state: &mut InterpreterState,
        text: &str,
        ctx: &mut ExpandCtx,
    ) -> Result<(String, bool), InterpreterError> {
        let mut out = String::new();
        let mut substituted = false;

        for segment in scan_segments(text) {
            match segment {
                Segment::Literal(literal) => out.push_str(&literal),
                Segment::Variable(name) => {
                    substituted = true;
                    out.push_str(&resolve_variable(state, &name)?);
                }
                Segment::Parameter(param) => {
                    substituted = true;
                    out.push_str(&resolve_parameter(state, &param)?);
                }
                Segment::CommandSub(command) => {
                    substituted = true;
                    out.push_str(&self.run_command_substitution(state, &command, ctx).await);
                }
                Segment::ProcSubIn(command) => {
                    substituted = true;
                    let path = self.materialize_procsub_in(state, &command, ctx).await;
                    out.push_str(&path);
                }
                Segment::ProcSubOut(command) => {
                    substituted = true;
                    let path = self.prepare_procsub_out(&command, ctx);
                    out.push_str(&path);
                }
            }
        }
        Ok((out, substituted))
    }

    /// Run `$(command)` in an isolated state copy; stdout (with
    /// trailing newlines trimmed) becomes the substitution value,
    /// stderr is surfaced on the enclosing command. Malformed command
    /// text degrades to the literal.
    async fn run_command_substitution(
        &self,
        state: &mut InterpreterState,
        command: &str,
        ctx: &mut ExpandCtx,
    ) -> String {
        let node = match crate::parser::parse(command) {
            Ok(node) => node,
            Err(_) => return format!("$({})", command),
        };
        let mut sub = state.subshell_clone();
        let result = match self.execute(&node, &mut sub, "").await {
            Ok(result) => result,
            Err(e) => e.into_result(),
        };
        state.command_count = sub.command_count;
        state.update_exit_code(result.exit_code);
        ctx.stderr.push_str(&result.stderr);
        result.stdout.trim_end_matches('\n').to_string()
    }

    fn procsub_path(&self, state: &InterpreterState) -> PathBuf {
        let tag: u32 = rand::thread_rng().gen();
        std::env::temp_dir().join(format!("lsh-psub-{}-{:08x}", state.shell_pid, tag))
    }

    /// `<(command)`: run the command now, park its stdout in a
    /// transient file, substitute the file's path.
    async fn materialize_procsub_in(
        &self,
        state: &mut InterpreterState,
        command: &str,
        ctx: &mut ExpandCtx,
    ) -> String {
        let node = match crate::parser::parse(command) {
            Ok(node) => node,
            Err(_) => return format!("<({})", command),
        };
        let mut sub = state.subshell_clone();
        let result = match self.execute(&node, &mut sub, "").await {
            Ok(result) => result,
            Err(e) => e.into_result(),
        };
        ctx.stderr.push_str(&result.stderr);

        let path = self.procsub_path(state);
        if tokio::fs::write(&path, result.stdout.as_bytes()).await.is_err() {
            return format!("<({})", command);
        }
        let text = path.to_string_lossy().into_owned();
        ctx.artifacts.push(ProcSubArtifact::Cleanup(path));
        text
    }

    /// `>(command)`: substitute a transient path now; after the main
    /// command completes, feed whatever was written there to the
    /// captured command's stdin.
    fn prepare_procsub_out(&self, command: &str, ctx: &mut ExpandCtx) -> String {
        let tag: u32 = rand::thread_rng().gen();
        let path = std::env::temp_dir().join(format!("lsh-psub-out-{:08x}", tag));
        let text = path.to_string_lossy().into_owned();
        ctx.artifacts.push(ProcSubArtifact::FeedBack {
            path,
            command: command.to_string(),
        });
        text
    }

    /// Settle process-substitution artifacts after the command ran.
    async fn run_procsub_feedback(&self, state: &mut InterpreterState, ctx: &mut ExpandCtx) {
        for artifact in ctx.artifacts.drain(..) {
            match artifact {
                ProcSubArtifact::Cleanup(path) => {
                    let _ = tokio::fs::remove_file(&path).await;
                }
                ProcSubArtifact::FeedBack { path, command } => {
                    let content = tokio::fs::read_to_string(&path).await.unwrap_or_default();
                    if let Ok(node) = crate::parser::parse(&command) {
                        let mut sub = state.subshell_clone();
                        let outcome = self.execute(&node, &mut sub, &content).await;
                        if let Err(e) = outcome {
                            ctx.stderr.push_str(e.stderr());
                        }
                    }
                    let _ = tokio::fs::remove_file(&path).await;
                }
            }
        }
    }

    // =========================================================================
    // Redirections
    // =========================================================================

    /// Expand redirection targets and hand them to the redirect layer.
    /// Heredoc bodies undergo variable resolution unless the delimiter
    /// was quoted; file targets get the full single-string expansion.
    async fn prepare_redirections(
        &self,
        redirections: &[Redirection],
        state: &mut InterpreterState,
    ) -> Result<Result<PreparedRedirections, ExecResult>, InterpreterError> {
        let mut expanded = Vec::with_capacity(redirections.len());
        let mut ctx = ExpandCtx::default();
        for redirection in redirections {
            let target = match redirection.kind {
                RedirectKind::Heredoc | RedirectKind::HeredocStripTabs => {
                    if redirection.target.quoted {
                        redirection.target.text.clone()
                    } else {
                        resolve_word(state, &redirection.target.text)?
                    }
                }
                _ => self.expand_word(state, &redirection.target, &mut ctx).await?,
            };
            expanded.push((redirection.clone(), target));
        }
        self.run_procsub_feedback(state, &mut ctx).await;
        Ok(redirect::prepare(state, &expanded).await)
    }
}

fn is_assignment_word(text: &str) -> bool {
    let Some(eq) = text.find('=') else {
        return false;
    };
    let name = &text[..eq];
    if name.is_empty() {
        return false;
    }
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}
