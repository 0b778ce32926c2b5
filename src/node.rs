//! The value being queried
//!
//! A closed set of variants: JSON-like data plus parsed markup. Steps dispatch
//! on the variant instead of probing capabilities at runtime.

use std::borrow::Cow;

use indexmap::IndexMap;
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};
use serde_json::{Number, Value};

use crate::markup::Markup;

/// String keyed, insertion ordered mapping
pub type Mapping = IndexMap<String, Node>;

#[derive(Debug, Clone, PartialEq, Default)]
pub enum Node {
    #[default]
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    Sequence(Vec<Node>),
    Mapping(Mapping),
    /// Structured text (HTML) exposing attribute and element lookups
    Markup(Markup),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Null,
    Bool,
    Number,
    String,
    Sequence,
    Mapping,
    Markup,
}

impl Node {
    pub fn kind(&self) -> NodeKind {
        match self {
            Node::Null => NodeKind::Null,
            Node::Bool(_) => NodeKind::Bool,
            Node::Number(_) => NodeKind::Number,
            Node::String(_) => NodeKind::String,
            Node::Sequence(_) => NodeKind::Sequence,
            Node::Mapping(_) => NodeKind::Mapping,
            Node::Markup(_) => NodeKind::Markup,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Node::Null)
    }

    /// Null, empty string, empty container or blank markup.
    /// `false` and `0` are values, not empty.
    pub fn is_empty(&self) -> bool {
        match self {
            Node::Null => true,
            Node::String(s) => s.is_empty(),
            Node::Sequence(items) => items.is_empty(),
            Node::Mapping(map) => map.is_empty(),
            Node::Markup(markup) => markup.html().trim().is_empty(),
            Node::Bool(_) | Node::Number(_) => false,
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Node::Bool(b) => *b,
            Node::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
            other => !other.is_empty(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Node::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Node::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Node::Number(n) => n.as_i64(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Node::Number(n) => n.as_f64(),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&[Node]> {
        match self {
            Node::Sequence(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_mapping(&self) -> Option<&Mapping> {
        match self {
            Node::Mapping(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_markup(&self) -> Option<&Markup> {
        match self {
            Node::Markup(markup) => Some(markup),
            _ => None,
        }
    }

    /// Borrowing lookup of a mapping entry
    pub fn get(&self, key: &str) -> Option<&Node> {
        self.as_mapping()?.get(key)
    }

    /// Child by key: a mapping entry, or an attribute of a markup element.
    pub fn child(&self, key: &str) -> Option<Cow<'_, Node>> {
        match self {
            Node::Mapping(map) => map.get(key).map(Cow::Borrowed),
            Node::Markup(markup) => markup.attr(key).map(|v| Cow::Owned(Node::String(v))),
            _ => None,
        }
    }

    /// Child by position; negative indices count from the end.
    pub fn at(&self, index: i64) -> Option<Cow<'_, Node>> {
        match self {
            Node::Sequence(items) => resolve_index(items.len(), index)
                .and_then(|i| items.get(i))
                .map(Cow::Borrowed),
            Node::Markup(markup) => {
                let mut children = markup.children();
                let i = resolve_index(children.len(), index)?;
                Some(Cow::Owned(Node::Markup(children.swap_remove(i))))
            }
            _ => None,
        }
    }

    /// Every direct child, in source order: sequence items, mapping values,
    /// or child elements of markup.
    pub fn children(&self) -> Vec<Cow<'_, Node>> {
        match self {
            Node::Sequence(items) => items.iter().map(Cow::Borrowed).collect(),
            Node::Mapping(map) => map.values().map(Cow::Borrowed).collect(),
            Node::Markup(markup) => markup
                .children()
                .into_iter()
                .map(|child| Cow::Owned(Node::Markup(child)))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Python style slice over sequence items or markup children
    pub fn slice(&self, start: Option<i64>, end: Option<i64>, step: i64) -> Vec<Cow<'_, Node>> {
        match self {
            Node::Sequence(items) => slice_indices(items.len(), start, end, step)
                .into_iter()
                .map(|i| Cow::Borrowed(&items[i]))
                .collect(),
            Node::Markup(markup) => {
                let children = markup.children();
                slice_indices(children.len(), start, end, step)
                    .into_iter()
                    .map(|i| Cow::Owned(Node::Markup(children[i].clone())))
                    .collect()
            }
            _ => Vec::new(),
        }
    }

    /// Float node; NaN and infinities have no JSON form and become null
    pub fn from_f64(value: f64) -> Node {
        Number::from_f64(value).map_or(Node::Null, Node::Number)
    }

    pub fn to_json(&self) -> Value {
        match self {
            Node::Null => Value::Null,
            Node::Bool(b) => Value::Bool(*b),
            Node::Number(n) => Value::Number(n.clone()),
            Node::String(s) => Value::String(s.clone()),
            Node::Sequence(items) => Value::Array(items.iter().map(Node::to_json).collect()),
            Node::Mapping(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
            Node::Markup(markup) => Value::String(markup.html().to_string()),
        }
    }
}

fn resolve_index(len: usize, index: i64) -> Option<usize> {
    if index < 0 {
        len.checked_sub(index.unsigned_abs() as usize)
    } else {
        let i = index as usize;
        (i < len).then_some(i)
    }
}

fn slice_indices(len: usize, start: Option<i64>, end: Option<i64>, step: i64) -> Vec<usize> {
    let len = len as i64;
    let clamp = |idx: i64, lo: i64, hi: i64| {
        let idx = if idx < 0 { idx + len } else { idx };
        idx.clamp(lo, hi)
    };

    if step > 0 {
        let s = start.map_or(0, |i| clamp(i, 0, len));
        let e = end.map_or(len, |i| clamp(i, 0, len));
        (s..e).step_by(step as usize).map(|i| i as usize).collect()
    } else if step < 0 {
        let s = start.map_or(len - 1, |i| clamp(i, -1, len - 1));
        let e = end.map_or(-1, |i| clamp(i, -1, len - 1));
        let mut indices = Vec::new();
        let mut i = s;
        while i > e {
            indices.push(i as usize);
            i += step;
        }
        indices
    } else {
        Vec::new()
    }
}

impl Serialize for Node {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Node::Null => serializer.serialize_unit(),
            Node::Bool(b) => serializer.serialize_bool(*b),
            Node::Number(n) => n.serialize(serializer),
            Node::String(s) => serializer.serialize_str(s),
            Node::Sequence(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Node::Mapping(map) => {
                let mut out = serializer.serialize_map(Some(map.len()))?;
                for (k, v) in map {
                    out.serialize_entry(k, v)?;
                }
                out.end()
            }
            Node::Markup(markup) => serializer.serialize_str(markup.html()),
        }
    }
}

impl From<Value> for Node {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Node::Null,
            Value::Bool(b) => Node::Bool(b),
            Value::Number(n) => Node::Number(n),
            Value::String(s) => Node::String(s),
            Value::Array(items) => Node::Sequence(items.into_iter().map(Node::from).collect()),
            Value::Object(map) => {
                Node::Mapping(map.into_iter().map(|(k, v)| (k, Node::from(v))).collect())
            }
        }
    }
}

impl From<&Value> for Node {
    fn from(value: &Value) -> Self {
        Node::from(value.clone())
    }
}

impl From<&str> for Node {
    fn from(value: &str) -> Self {
        Node::String(value.to_string())
    }
}

impl From<String> for Node {
    fn from(value: String) -> Self {
        Node::String(value)
    }
}

impl From<bool> for Node {
    fn from(value: bool) -> Self {
        Node::Bool(value)
    }
}

impl From<i64> for Node {
    fn from(value: i64) -> Self {
        Node::Number(value.into())
    }
}

impl From<i32> for Node {
    fn from(value: i32) -> Self {
        Node::Number(value.into())
    }
}

impl From<u64> for Node {
    fn from(value: u64) -> Self {
        Node::Number(value.into())
    }
}

impl From<f64> for Node {
    fn from(value: f64) -> Self {
        Node::from_f64(value)
    }
}

impl From<Vec<Node>> for Node {
    fn from(value: Vec<Node>) -> Self {
        Node::Sequence(value)
    }
}

impl From<Mapping> for Node {
    fn from(value: Mapping) -> Self {
        Node::Mapping(value)
    }
}

impl From<Markup> for Node {
    fn from(value: Markup) -> Self {
        Node::Markup(value)
    }
}

impl<T: Into<Node>> From<Option<T>> for Node {
    fn from(value: Option<T>) -> Self {
        value.map_or(Node::Null, Into::into)
    }
}
