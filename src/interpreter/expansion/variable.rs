//! Variable and parameter expansion.
//!
//! Scans a word for substitutions and resolves them against the
//! interpreter state. The scanner is pure: it produces a segment list
//! (`Literal`, `Variable`, `Parameter`, `CommandSub`, process
//! substitutions) that the engine walks, so command substitution can
//! re-enter the executor without this module knowing about it.
//!
//! Special parameters: `$?` last exit code, `$$` shell pid, `$#`
//! positional count, `$@`/`$*` the argument list, `$0`..`$9`
//! positionals, `$!` last background pid, `$RANDOM`.

use rand::Rng;

use crate::interpreter::errors::InterpreterError;
use crate::interpreter::types::InterpreterState;

/// One scanned piece of a word.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    /// `$NAME` or a special parameter
    Variable(String),
    /// `${NAME...}` extended parameter form
    Parameter(ParamExpansion),
    /// `$(cmd)` or `` `cmd` ``
    CommandSub(String),
    /// `<(cmd)`
    ProcSubIn(String),
    /// `>(cmd)`
    ProcSubOut(String),
}

/// Extended parameter operators inside `${...}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamOp {
    /// `${VAR:-word}` use word when unset or empty
    DefaultValue,
    /// `${VAR:=word}` assign word when unset or empty
    AssignDefault,
    /// `${VAR:+word}` use word when set and non-empty
    AlternateValue,
    /// `${VAR:?word}` error when unset or empty
    ErrorIfUnset,
    /// `${#VAR}` length of value
    Length,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamExpansion {
    pub name: String,
    pub op: Option<ParamOp>,
    pub word: String,
}

fn is_name_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn is_special_param(c: char) -> bool {
    matches!(c, '?' | '$' | '#' | '@' | '*' | '!') || c.is_ascii_digit()
}

/// Scan a word into segments. Total: any malformed construct falls
/// back to literal text.
pub fn scan_segments(text: &str) -> Vec<Segment> {
    let chars: Vec<char> = text.chars().collect();
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut i = 0;

    let flush = |literal: &mut String, segments: &mut Vec<Segment>| {
        if !literal.is_empty() {
            segments.push(Segment::Literal(std::mem::take(literal)));
        }
    };

    while i < chars.len() {
        let c = chars[i];
        match c {
            '$' if i + 1 < chars.len() => {
                let next = chars[i + 1];
                if next == '{' {
                    if let Some((inner, end)) = capture_balanced(&chars, i + 1, '{', '}') {
                        flush(&mut literal, &mut segments);
                        segments.push(parse_parameter(&inner));
                        i = end;
                        continue;
                    }
                    literal.push(c);
                    i += 1;
                } else if next == '(' {
                    if let Some((inner, end)) = capture_balanced(&chars, i + 1, '(', ')') {
                        flush(&mut literal, &mut segments);
                        segments.push(Segment::CommandSub(inner));
                        i = end;
                        continue;
                    }
                    literal.push(c);
                    i += 1;
                } else if is_name_start(next) {
                    let mut j = i + 1;
                    while j < chars.len() && is_name_char(chars[j]) {
                        j += 1;
                    }
                    flush(&mut literal, &mut segments);
                    segments.push(Segment::Variable(chars[i + 1..j].iter().collect()));
                    i = j;
                } else if is_special_param(next) {
                    flush(&mut literal, &mut segments);
                    segments.push(Segment::Variable(next.to_string()));
                    i += 2;
                } else {
                    literal.push(c);
                    i += 1;
                }
            }
            '`' => {
                if let Some(close) = chars[i + 1..].iter().position(|&c| c == '`') {
                    flush(&mut literal, &mut segments);
                    let inner: String = chars[i + 1..i + 1 + close].iter().collect();
                    segments.push(Segment::CommandSub(inner));
                    i += close + 2;
                } else {
                    literal.push(c);
                    i += 1;
                }
            }
            '<' | '>' if chars.get(i + 1) == Some(&'(') => {
                if let Some((inner, end)) = capture_balanced(&chars, i + 1, '(', ')') {
                    flush(&mut literal, &mut segments);
                    if c == '<' {
                        segments.push(Segment::ProcSubIn(inner));
                    } else {
                        segments.push(Segment::ProcSubOut(inner));
                    }
                    i = end;
                    continue;
                }
                literal.push(c);
                i += 1;
            }
            _ => {
                literal.push(c);
                i += 1;
            }
        }
    }
    flush(&mut literal, &mut segments);
    segments
}

/// Capture balanced brackets starting at `open_idx` (which must hold
/// the opening character). Returns the inner text and the index just
/// past the closer.
fn capture_balanced(
    chars: &[char],
    open_idx: usize,
    open: char,
    close: char,
) -> Option<(String, usize)> {
    let mut depth = 0usize;
    for (offset, &c) in chars[open_idx..].iter().enumerate() {
        if c == open {
            depth += 1;
        } else if c == close {
            depth -= 1;
            if depth == 0 {
                let inner: String = chars[open_idx + 1..open_idx + offset].iter().collect();
                return Some((inner, open_idx + offset + 1));
            }
        }
    }
    None
}

/// Parse the inside of `${...}` into a parameter segment.
fn parse_parameter(inner: &str) -> Segment {
    if let Some(name) = inner.strip_prefix('#') {
        if !name.is_empty() {
            return Segment::Parameter(ParamExpansion {
                name: name.to_string(),
                op: Some(ParamOp::Length),
                word: String::new(),
            });
        }
    }

    for (marker, op) in [
        (":-", ParamOp::DefaultValue),
        (":=", ParamOp::AssignDefault),
        (":+", ParamOp::AlternateValue),
        (":?", ParamOp::ErrorIfUnset),
    ] {
        if let Some(idx) = inner.find(marker) {
            let name = &inner[..idx];
            let word = &inner[idx + marker.len()..];
            return Segment::Parameter(ParamExpansion {
                name: name.to_string(),
                op: Some(op),
                word: word.to_string(),
            });
        }
    }

    Segment::Parameter(ParamExpansion {
        name: inner.to_string(),
        op: None,
        word: String::new(),
    })
}

/// Look up a variable or special parameter. None means unset.
pub fn lookup_variable(state: &InterpreterState, name: &str) -> Option<String> {
    match name {
        "?" => Some(state.last_exit_code.to_string()),
        "$" => Some(state.shell_pid.to_string()),
        "#" => Some(state.positional.len().to_string()),
        "@" | "*" => Some(state.positional.join(" ")),
        "!" => {
            if state.last_background_pid == 0 {
                None
            } else {
                Some(state.last_background_pid.to_string())
            }
        }
        "0" => Some(
            state
                .get_var("0")
                .map(str::to_string)
                .unwrap_or_else(|| "lsh".to_string()),
        ),
        "RANDOM" => Some(rand::thread_rng().gen_range(0..32768).to_string()),
        _ => {
            if let Ok(n) = name.parse::<usize>() {
                return state.positional.get(n - 1).cloned();
            }
            state.variables.get(name).map(String::clone)
        }
    }
}

/// Resolve `$NAME`, honoring `nounset`.
pub fn resolve_variable(
    state: &InterpreterState,
    name: &str,
) -> Result<String, InterpreterError> {
    match lookup_variable(state, name) {
        Some(value) => Ok(value),
        None if state.options.nounset => Err(InterpreterError::nounset(name)),
        None => Ok(String::new()),
    }
}

/// Resolve a `${...}` parameter expansion. `:=` assigns into the
/// state; `:?` raises. The fallback word itself undergoes variable
/// resolution (but not command substitution).
pub fn resolve_parameter(
    state: &mut InterpreterState,
    param: &ParamExpansion,
) -> Result<String, InterpreterError> {
    let current = lookup_variable(state, &param.name);
    let set_and_nonempty = current.as_deref().map_or(false, |v| !v.is_empty());

    match param.op {
        None => match current {
            Some(value) => Ok(value),
            None if state.options.nounset => Err(InterpreterError::nounset(&param.name)),
            None => Ok(String::new()),
        },
        Some(ParamOp::Length) => Ok(current.unwrap_or_default().chars().count().to_string()),
        Some(ParamOp::DefaultValue) => {
            if set_and_nonempty {
                Ok(current.unwrap_or_default())
            } else {
                resolve_word(state, &param.word)
            }
        }
        Some(ParamOp::AssignDefault) => {
            if set_and_nonempty {
                Ok(current.unwrap_or_default())
            } else {
                let value = resolve_word(state, &param.word)?;
                let _ = state.set_var(&param.name, value.clone());
                Ok(value)
            }
        }
        Some(ParamOp::AlternateValue) => {
            if set_and_nonempty {
                resolve_word(state, &param.word)
            } else {
                Ok(String::new())
            }
        }
        Some(ParamOp::ErrorIfUnset) => {
            if set_and_nonempty {
                Ok(current.unwrap_or_default())
            } else {
                let message = if param.word.is_empty() {
                    "parameter null or not set".to_string()
                } else {
                    resolve_word(state, &param.word)?
                };
                Err(InterpreterError::Nounset {
                    name: param.name.clone(),
                    stdout: String::new(),
                    stderr: format!("lsh: {}: {}\n", param.name, message),
                })
            }
        }
    }
}

/// Variable-only resolution for fallback words and heredoc bodies:
/// command and process substitutions stay literal.
pub fn resolve_word(
    state: &mut InterpreterState,
    word: &str,
) -> Result<String, InterpreterError> {
    let mut out = String::new();
    for segment in scan_segments(word) {
        match segment {
            Segment::Literal(text) => out.push_str(&text),
            Segment::Variable(name) => out.push_str(&resolve_variable(state, &name)?),
            Segment::Parameter(param) => out.push_str(&resolve_parameter(state, &param)?),
            Segment::CommandSub(text) => {
                out.push_str("$(");
                out.push_str(&text);
                out.push(')');
            }
            Segment::ProcSubIn(text) => {
                out.push_str("<(");
                out.push_str(&text);
                out.push(')');
            }
            Segment::ProcSubOut(text) => {
                out.push_str(">(");
                out.push_str(&text);
                out.push(')');
            }
        }
    }
    Ok(out)
}
