//! Field splitting.
//!
//! Divides an expanded word into fields on the internal field
//! separator. IFS whitespace characters (space, tab, newline) collapse
//! into one delimiter and are trimmed at both ends; any other IFS
//! character delimits exactly one field per occurrence.

/// Split `value` into fields on the characters of `ifs`. An empty IFS
/// yields the whole value as a single field (no splitting).
pub fn split_fields(value: &str, ifs: &str) -> Vec<String> {
    if ifs.is_empty() {
        if value.is_empty() {
            return Vec::new();
        }
        return vec![value.to_string()];
    }

    let whitespace: Vec<char> = ifs.chars().filter(|c| c.is_whitespace()).collect();
    let hard: Vec<char> = ifs.chars().filter(|c| !c.is_whitespace()).collect();

    let mut fields = Vec::new();
    let mut current = String::new();
    let mut pending_field = false;

    for c in value.chars() {
        if whitespace.contains(&c) {
            if pending_field {
                fields.push(std::mem::take(&mut current));
                pending_field = false;
            }
        } else if hard.contains(&c) {
            // Each non-whitespace separator terminates a field, even an
            // empty one
            fields.push(std::mem::take(&mut current));
            pending_field = false;
        } else {
            current.push(c);
            pending_field = true;
        }
    }
    if pending_field {
        fields.push(current);
    }
    fields
}
