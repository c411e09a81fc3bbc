// ABOUTME: Env file rendering and quoted-heredoc file writes for remote shells.
// ABOUTME: The single-quoted terminator keeps the shell from expanding payload content.

use std::collections::BTreeMap;

pub const HEREDOC_TERMINATOR: &str = "STACKWRIGHT_EOF";

/// Quote a value for an env file when it contains anything beyond a
/// conservative set of plain characters.
pub fn escape_env_value(value: &str) -> String {
    let plain = value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || "-_./:@%+,=".contains(c));
    if plain {
        return value.to_string();
    }

    let mut escaped = String::with_capacity(value.len() + 2);
    escaped.push('"');
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            other => escaped.push(other),
        }
    }
    escaped.push('"');
    escaped
}

/// `KEY=value` lines in key order.
pub fn render_env_file(env: &BTreeMap<String, String>) -> String {
    env.iter()
        .map(|(k, v)| format!("{}={}\n", k, escape_env_value(v)))
        .collect()
}

pub(crate) fn contains_terminator(content: &str) -> bool {
    content.lines().any(|line| line.trim_end_matches('\r') == HEREDOC_TERMINATOR)
}

/// Shell command writing `content` to `path` verbatim.
///
/// `path` must already be validated; it is single-quoted here.
pub(crate) fn heredoc_write(path: &str, content: &str) -> String {
    let newline = if content.ends_with('\n') { "" } else { "\n" };
    format!(
        "cat > '{path}' <<'{term}'\n{content}{newline}{term}",
        path = path,
        term = HEREDOC_TERMINATOR,
        content = content,
        newline = newline,
    )
}
