//! echo builtin.

use crate::interpreter::types::ExecResult;

/// echo [-n] args... — print arguments joined by spaces. `-n`
/// suppresses the trailing newline.
pub fn handle_echo(args: &[String]) -> ExecResult {
    let (newline, rest) = match args.first().map(String::as_str) {
        Some("-n") => (false, &args[1..]),
        _ => (true, args),
    };

    let mut out = rest.join(" ");
    if newline {
        out.push('\n');
    }
    ExecResult::success(out)
}
