//! printf builtin.
//!
//! Supports `%s`, `%d`, `%c`, `%x`, `%o`, `%%` and the standard
//! backslash escapes. Like the real utility, the format string is
//! reapplied until the arguments are exhausted.

use crate::interpreter::types::ExecResult;

/// printf format [args...]
pub fn handle_printf(args: &[String]) -> ExecResult {
    let Some(format) = args.first() else {
        return ExecResult::failure_with_code("lsh: printf: usage: printf format [arguments]\n", 2);
    };
    let mut rest: Vec<&String> = args[1..].iter().collect();

    let mut out = String::new();
    loop {
        let consumed = render_once(format, &mut rest, &mut out);
        if rest.is_empty() || consumed == 0 {
            break;
        }
    }
    ExecResult::success(out)
}

/// Apply the format once, consuming arguments. Returns how many
/// arguments were consumed this pass.
fn render_once(format: &str, args: &mut Vec<&String>, out: &mut String) -> usize {
    let mut consumed = 0;
    let mut chars = format.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '%' => match chars.next() {
                Some('%') => out.push('%'),
                Some('s') => {
                    out.push_str(next_arg(args, &mut consumed).unwrap_or_default().as_str());
                }
                Some('c') => {
                    if let Some(arg) = next_arg(args, &mut consumed) {
                        if let Some(first) = arg.chars().next() {
                            out.push(first);
                        }
                    }
                }
                Some('d') => {
                    let value = parse_int(next_arg(args, &mut consumed));
                    out.push_str(&value.to_string());
                }
                Some('x') => {
                    let value = parse_int(next_arg(args, &mut consumed));
                    out.push_str(&format!("{:x}", value));
                }
                Some('o') => {
                    let value = parse_int(next_arg(args, &mut consumed));
                    out.push_str(&format!("{:o}", value));
                }
                Some(other) => {
                    out.push('%');
                    out.push(other);
                }
                None => out.push('%'),
            },
            '\\' => match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some('r') => out.push('\r'),
                Some('\\') => out.push('\\'),
                Some('a') => out.push('\u{0007}'),
                Some('b') => out.push('\u{0008}'),
                Some('f') => out.push('\u{000C}'),
                Some('v') => out.push('\u{000B}'),
                Some('0') => out.push('\0'),
                Some(other) => {
                    out.push('\\');
                    out.push(other);
                }
                None => out.push('\\'),
            },
            other => out.push(other),
        }
    }
    consumed
}

fn next_arg(args: &mut Vec<&String>, consumed: &mut usize) -> Option<String> {
    if args.is_empty() {
        return None;
    }
    *consumed += 1;
    Some(args.remove(0).clone())
}

fn parse_int(arg: Option<String>) -> i64 {
    arg.and_then(|a| a.trim().parse::<i64>().ok()).unwrap_or(0)
}
