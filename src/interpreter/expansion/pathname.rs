//! Pathname (glob) expansion.
//!
//! Replaces a field containing `*`, `?`, or `[...]` with the matching
//! filesystem paths, sorted. A field with no matches is left literal,
//! matching the default shell behavior.

use std::path::Path;

/// True when the field contains unescaped glob metacharacters.
pub fn has_glob_chars(field: &str) -> bool {
    let mut chars = field.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                chars.next();
            }
            '*' | '?' | '[' => return true,
            _ => {}
        }
    }
    false
}

/// Expand one field against the filesystem, relative to `cwd` for
/// relative patterns. Returns the matches in sorted order, or the
/// literal field when nothing matches or the pattern is malformed.
pub fn expand_glob(field: &str, cwd: &str) -> Vec<String> {
    if !has_glob_chars(field) {
        return vec![field.to_string()];
    }

    let absolute = field.starts_with('/');
    let pattern = if absolute {
        field.to_string()
    } else {
        format!("{}/{}", cwd.trim_end_matches('/'), field)
    };

    let entries = match glob::glob(&pattern) {
        Ok(paths) => paths,
        Err(_) => return vec![field.to_string()],
    };

    let prefix = format!("{}/", cwd.trim_end_matches('/'));
    let mut matches: Vec<String> = entries
        .filter_map(Result::ok)
        .map(|path| {
            let text = path.to_string_lossy().into_owned();
            if absolute {
                text
            } else {
                // Report matches the way the pattern was written
                text.strip_prefix(&prefix).map(str::to_string).unwrap_or(text)
            }
        })
        .collect();

    if matches.is_empty() {
        return vec![field.to_string()];
    }
    matches.sort();
    matches
}

/// Resolve a possibly relative path against the working directory.
pub fn resolve_path(cwd: &str, path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        let joined = Path::new(cwd).join(path);
        joined.to_string_lossy().into_owned()
    }
}
