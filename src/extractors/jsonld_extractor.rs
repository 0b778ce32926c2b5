//! JSON-LD extraction from HTML
//!
//! Reads every `<script type="application/ld+json">` block, flattens arrays
//! and `@graph` containers, and groups the objects by `@type`. Each type maps
//! to a sequence so paths can always use a wildcard or an index on it.

use scraper::{Html, Selector};
use serde_json::Value;
use tracing::debug;

use crate::node::{Mapping, Node};

/// JSON-LD objects keyed by type name, schema.org prefixes removed
pub fn extract_jsonld(document: &Html) -> Mapping {
    let mut result = Mapping::new();

    let selector = match Selector::parse(r#"script[type="application/ld+json"]"#) {
        Ok(s) => s,
        Err(_) => return result,
    };

    for element in document.select(&selector) {
        let content: String = element.text().collect();
        let trimmed = content.trim().trim_end_matches(';');
        if trimmed.is_empty() {
            continue;
        }

        match serde_json::from_str::<Value>(trimmed) {
            Ok(json) => collect_objects(json, &mut result),
            Err(err) => debug!(error = %err, "skipping malformed JSON-LD block"),
        }
    }

    result
}

fn collect_objects(value: Value, result: &mut Mapping) {
    match value {
        Value::Array(items) => {
            for item in items {
                collect_objects(item, result);
            }
        }
        Value::Object(mut obj) => {
            if let Some(graph) = obj.remove("@graph") {
                collect_objects(graph, result);
                // A @graph wrapper is only kept when it carries a type of its own
                if !obj.contains_key("@type") {
                    return;
                }
            }
            let types = type_names(obj.get("@type"));
            let node = Node::from(Value::Object(obj));
            for type_name in types {
                push_typed(result, type_name, node.clone());
            }
        }
        _ => {}
    }
}

fn type_names(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::String(s)) => vec![short_type(s)],
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(short_type)
            .collect(),
        _ => Vec::new(),
    }
}

/// `https://schema.org/Product` and `schema:Product` are both `Product`
pub(crate) fn short_type(type_name: &str) -> String {
    let name = type_name.rsplit(['/', '#']).next().unwrap_or(type_name);
    let name = name.strip_prefix("schema:").unwrap_or(name);
    name.to_string()
}

pub(crate) fn push_typed(result: &mut Mapping, type_name: String, item: Node) {
    match result
        .entry(type_name)
        .or_insert_with(|| Node::Sequence(Vec::new()))
    {
        Node::Sequence(items) => items.push(item),
        other => *other = Node::Sequence(vec![std::mem::take(other), item]),
    }
}
