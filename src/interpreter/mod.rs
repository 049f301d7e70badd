//! The interpreter: execution engine, state, builtins, expansion.
//!
//! `text → lexer → tokens → parser → AST → engine(AST, state) → result`,
//! with the state mutated as a side effect. One `InterpreterState` per
//! shell instance; subshells get isolated copies, command groups share.

pub mod builtins;
pub mod collaborators;
pub mod engine;
pub mod errors;
pub mod expansion;
pub mod external;
pub mod jobs;
pub mod redirect;
pub mod types;

pub use collaborators::{JobRecord, JobService, JobServiceError};
pub use engine::ExecutionEngine;
pub use errors::InterpreterError;
pub use jobs::{Job, JobStatus, JobTable, SharedJobTable};
pub use types::{ExecResult, ExecutionLimits, InterpreterState, ShellOptions};
