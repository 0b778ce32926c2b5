//! String cleanup

use regex::Regex;

use super::{to_str, Group};
use crate::node::Node;

/// Remove a fixed prefix and/or suffix when present
pub fn trim_str(s: &str, start: Option<&str>, end: Option<&str>) -> String {
    let mut out = s;
    if let Some(prefix) = start {
        out = out.strip_prefix(prefix).unwrap_or(out);
    }
    if let Some(suffix) = end {
        out = out.strip_suffix(suffix).unwrap_or(out);
    }
    out.to_string()
}

/// First match of `pattern`. Without an explicit group the first capture
/// that participated wins, falling back to the whole match.
pub fn search(s: &str, pattern: &Regex, group: Option<&Group>) -> Option<String> {
    let caps = pattern.captures(s)?;
    let found = match group {
        Some(Group::Index(i)) => caps.get(*i),
        Some(Group::Name(name)) => caps.name(name),
        None => caps.iter().skip(1).flatten().next().or_else(|| caps.get(0)),
    }?;
    Some(found.as_str().to_string())
}

/// Join the non-empty scalars of a sequence
pub fn join_nonempty(node: &Node, delim: &str) -> Option<String> {
    let parts: Vec<String> = node
        .as_sequence()?
        .iter()
        .filter(|item| !item.is_empty())
        .filter_map(to_str)
        .collect();
    (!parts.is_empty()).then(|| parts.join(delim))
}
