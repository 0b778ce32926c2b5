//! Element-wise transforms
//!
//! Each transform takes one node and returns `Some(value)` or `None`. `None`
//! drops the value from the working set; it never aborts a query. The only
//! propagating failure is [`require`].

mod numeric;
mod text;
mod timestamp;
mod urls;

pub use numeric::*;
pub use text::*;
pub use timestamp::*;
pub use urls::*;

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use regex::Regex;
use scraper::Selector;
use url::Url;

use crate::error::ExtractError;
use crate::markup::{clean_text, ElementQuery, Markup};
use crate::node::{Mapping, Node, NodeKind};

type TransformFn = dyn Fn(&Node) -> Option<Node> + Send + Sync;

/// Caller supplied transform closure
#[derive(Clone)]
pub struct CustomTransform(Arc<TransformFn>);

impl CustomTransform {
    pub fn new(f: impl Fn(&Node) -> Option<Node> + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub fn call(&self, node: &Node) -> Option<Node> {
        (self.0)(node)
    }
}

impl fmt::Debug for CustomTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CustomTransform(..)")
    }
}

/// `value * invscale / scale`, e.g. `scale = 1000` turns milliseconds into seconds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scale {
    pub scale: f64,
    pub invscale: f64,
}

impl Default for Scale {
    fn default() -> Self {
        Self {
            scale: 1.0,
            invscale: 1.0,
        }
    }
}

impl Scale {
    pub fn is_identity(&self) -> bool {
        self.scale == 1.0 && self.invscale == 1.0
    }

    pub fn apply(&self, value: f64) -> f64 {
        value * self.invscale / self.scale
    }
}

/// Which capture of a `search` match to return
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Group {
    Index(usize),
    Name(String),
}

/// A compiled transform, ready to apply
#[derive(Debug, Clone)]
pub enum Transform {
    /// Keep the value only if it is of this kind
    Kind(NodeKind),
    ToInt(Scale),
    ToFloat(Scale),
    ToStr,
    ParseCount,
    ParseDuration,
    CleanHtml,
    Strip,
    TrimStr {
        start: Option<String>,
        end: Option<String>,
    },
    Lowercase,
    Uppercase,
    Search {
        pattern: Regex,
        group: Option<Group>,
    },
    Iso8601 {
        delimiter: char,
        tz_offset: i64,
    },
    UnifiedTimestamp {
        tz_offset: i64,
    },
    UnifiedStrdate,
    Url {
        base: Option<Url>,
    },
    FindElement(ElementQuery),
    FindElements(ElementQuery),
    Select(Selector),
    SelectAll(Selector),
    Attributes,
    Join {
        delim: String,
    },
    ParseJson,
    Custom(CustomTransform),
}

impl Transform {
    pub fn apply(&self, node: &Node) -> Option<Node> {
        match self {
            Transform::Kind(kind) => (node.kind() == *kind).then(|| node.clone()),
            Transform::ToInt(scale) => to_int(node, *scale),
            Transform::ToFloat(scale) => to_float(node, *scale),
            Transform::ToStr => to_str(node).map(Node::String),
            Transform::ParseCount => parse_count(node),
            Transform::ParseDuration => parse_duration(node),
            Transform::CleanHtml => match node {
                Node::String(s) => Some(Node::String(clean_text(s))),
                Node::Markup(markup) => Some(Node::String(markup.text())),
                _ => None,
            },
            Transform::Strip => string_op(node, |s| Some(s.trim().to_string())),
            Transform::TrimStr { start, end } => {
                string_op(node, |s| Some(trim_str(s, start.as_deref(), end.as_deref())))
            }
            Transform::Lowercase => string_op(node, |s| Some(s.to_lowercase())),
            Transform::Uppercase => string_op(node, |s| Some(s.to_uppercase())),
            Transform::Search { pattern, group } => {
                string_op(node, |s| search(s, pattern, group.as_ref()))
            }
            Transform::Iso8601 {
                delimiter,
                tz_offset,
            } => timestamp_op(node, |s| parse_iso8601(s, *delimiter, *tz_offset)),
            Transform::UnifiedTimestamp { tz_offset } => {
                timestamp_op(node, |s| unified_timestamp(s, *tz_offset))
            }
            Transform::UnifiedStrdate => string_op(node, unified_strdate),
            Transform::Url { base } => string_op(node, |s| normalize_url(s, base.as_ref())),
            Transform::FindElement(query) => {
                as_markup(node)?.find_first(query).map(Node::Markup)
            }
            Transform::FindElements(query) => Some(Node::Sequence(
                as_markup(node)?
                    .find_all(query)
                    .into_iter()
                    .map(Node::Markup)
                    .collect(),
            )),
            Transform::Select(selector) => {
                as_markup(node)?.select_first(selector).map(Node::Markup)
            }
            Transform::SelectAll(selector) => Some(Node::Sequence(
                as_markup(node)?
                    .select_all(selector)
                    .into_iter()
                    .map(Node::Markup)
                    .collect(),
            )),
            Transform::Attributes => {
                let attrs: Mapping = as_markup(node)?
                    .attributes()
                    .into_iter()
                    .map(|(name, value)| (name, Node::String(value)))
                    .collect();
                Some(Node::Mapping(attrs))
            }
            Transform::Join { delim } => join_nonempty(node, delim).map(Node::String),
            Transform::ParseJson => match node {
                Node::String(s) => serde_json::from_str::<serde_json::Value>(s)
                    .ok()
                    .map(Node::from),
                _ => None,
            },
            Transform::Custom(custom) => custom.call(node),
        }
    }
}

/// Convert absence into the missing-field error; presence passes through.
pub fn require(value: Option<Node>, label: &str) -> Result<Node, ExtractError> {
    match value {
        Some(node) if !node.is_null() => Ok(node),
        _ => Err(ExtractError::missing(label)),
    }
}

fn string_op(node: &Node, f: impl FnOnce(&str) -> Option<String>) -> Option<Node> {
    f(node.as_str()?).map(Node::String)
}

/// Timestamps already in numeric form pass through untouched
fn timestamp_op(node: &Node, f: impl FnOnce(&str) -> Option<i64>) -> Option<Node> {
    match node {
        Node::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|v| v.is_finite()).map(|v| v.trunc() as i64))
            .map(Node::from),
        Node::String(s) => f(s).map(Node::from),
        _ => None,
    }
}

/// HTML strings are treated as markup
fn as_markup(node: &Node) -> Option<Cow<'_, Markup>> {
    match node {
        Node::Markup(markup) => Some(Cow::Borrowed(markup)),
        Node::String(s) => Some(Cow::Owned(Markup::parse(s.as_str()))),
        _ => None,
    }
}
