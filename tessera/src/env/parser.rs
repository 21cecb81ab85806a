//! `.env` file parsing.
//!
//! One `KEY=VALUE` pair per line. Blank lines and `#` comments are skipped,
//! an `export ` prefix is accepted, lines without `=` are ignored. Values
//! lose one pair of matching surrounding quotes and have `${NAME}` tokens
//! substituted.

use super::process::ProcessEnv;
use std::collections::BTreeMap;

/// Parse `contents` into `vars`, overwriting existing keys.
///
/// `${NAME}` resolves against `vars` (including pairs earlier in the same
/// file), then the process environment. Unknown names stay verbatim.
pub(crate) fn parse_into(contents: &str, vars: &mut BTreeMap<String, String>, process: &dyn ProcessEnv) {
    for (key, raw) in pairs(contents) {
        let value = interpolate(raw, vars, process);
        vars.insert(key.to_string(), value);
    }
}

/// The raw value of the last `key=` line, quotes stripped, no interpolation.
pub(crate) fn find_raw<'a>(contents: &'a str, key: &str) -> Option<&'a str> {
    pairs(contents)
        .filter(|(candidate, _)| *candidate == key)
        .map(|(_, value)| value)
        .last()
}

fn pairs(contents: &str) -> impl Iterator<Item = (&str, &str)> {
    contents.lines().filter_map(|line| {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return None;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);
        let (key, value) = line.split_once('=')?;
        let key = key.trim();
        if key.is_empty() {
            return None;
        }
        Some((key, unquote(value.trim())))
    })
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

fn interpolate(value: &str, vars: &BTreeMap<String, String>, process: &dyn ProcessEnv) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            out.push_str(&rest[start..]);
            return out;
        };

        let name = &after[..end];
        match vars.get(name).cloned().or_else(|| process.var(name)) {
            Some(resolved) if !name.is_empty() => out.push_str(&resolved),
            _ => out.push_str(&rest[start..start + 2 + end + 1]),
        }
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    out
}
