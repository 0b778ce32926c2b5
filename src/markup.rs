//! Parsed markup as a queryable node
//!
//! Markup keeps its HTML source and is parsed with scraper on demand, so it
//! stays `Send + Sync` and cheap to clone around a working set. Element
//! lookups return `None`/empty when nothing matches.

use std::borrow::Cow;
use std::sync::LazyLock;

use indexmap::IndexMap;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};

static DOCUMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*(?:<!doctype|<html)").expect("valid regex"));
static MARKUP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[A-Za-z!/]").expect("valid regex"));
static BREAK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<\s*br\s*/?\s*>|<\s*/\s*p\s*>\s*<\s*p[^>]*>").expect("valid regex")
});
static SPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));
static LEADING_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*<([A-Za-z][A-Za-z0-9]*)").expect("valid regex"));

/// An HTML document or fragment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Markup {
    source: String,
    document: bool,
}

impl Markup {
    /// A fragment: the first top-level element is the one attributes and
    /// children are read from.
    pub fn fragment(html: impl Into<String>) -> Self {
        Self {
            source: html.into(),
            document: false,
        }
    }

    /// A whole page rooted at `<html>`
    pub fn document(html: impl Into<String>) -> Self {
        Self {
            source: html.into(),
            document: true,
        }
    }

    /// Pick document or fragment parsing from the source itself
    pub fn parse(html: impl Into<String>) -> Self {
        let source = html.into();
        let document = DOCUMENT_RE.is_match(&source);
        Self { source, document }
    }

    pub fn html(&self) -> &str {
        &self.source
    }

    pub fn is_document(&self) -> bool {
        self.document
    }

    fn parsed(&self) -> Parsed {
        if self.document {
            return Parsed {
                html: Html::parse_document(&self.source),
                anchor: None,
                document: true,
            };
        }

        // The HTML parser drops table parts and document sections outside
        // their usual parents, so those fragments are parsed in context and
        // located again by tag name.
        let anchor = LEADING_TAG_RE
            .captures(&self.source)
            .map(|caps| caps[1].to_ascii_lowercase())
            .filter(|tag| is_section(tag) || table_context(tag).is_some());
        let html = match anchor.as_deref() {
            Some(tag) if is_section(tag) => Html::parse_document(&self.source),
            Some(tag) => {
                let (open, close) = table_context(tag).unwrap_or_default();
                Html::parse_fragment(&format!("{open}{}{close}", self.source))
            }
            None => Html::parse_fragment(&self.source),
        };
        Parsed {
            html,
            anchor,
            document: false,
        }
    }

    /// First descendant element matching `query`
    pub fn find_first(&self, query: &ElementQuery) -> Option<Markup> {
        let parsed = self.parsed();
        let found = parsed
            .elements()
            .into_iter()
            .find(|el| query.matches(el))
            .map(Markup::element);
        found
    }

    /// Every descendant element matching `query`, in document order
    pub fn find_all(&self, query: &ElementQuery) -> Vec<Markup> {
        let parsed = self.parsed();
        let found = parsed
            .elements()
            .into_iter()
            .filter(|el| query.matches(el))
            .map(Markup::element)
            .collect();
        found
    }

    pub fn select_first(&self, selector: &Selector) -> Option<Markup> {
        let parsed = self.parsed();
        let found = parsed.html.select(selector).next().map(Markup::element);
        found
    }

    pub fn select_all(&self, selector: &Selector) -> Vec<Markup> {
        let parsed = self.parsed();
        let found = parsed.html.select(selector).map(Markup::element).collect();
        found
    }

    /// Attributes of the top element, name to raw value, in source order
    pub fn attributes(&self) -> IndexMap<String, String> {
        let parsed = self.parsed();
        let attrs = parsed
            .top()
            .map(|el| {
                el.value()
                    .attrs()
                    .map(|(name, value)| (name.to_string(), value.to_string()))
                    .collect()
            })
            .unwrap_or_default();
        attrs
    }

    pub fn attr(&self, name: &str) -> Option<String> {
        let parsed = self.parsed();
        let value = parsed
            .top()
            .and_then(|el| el.value().attr(name).map(String::from));
        value
    }

    /// Child elements of the top element
    pub fn children(&self) -> Vec<Markup> {
        let parsed = self.parsed();
        let children = parsed
            .top()
            .map(|el| {
                el.children()
                    .filter_map(ElementRef::wrap)
                    .map(Markup::element)
                    .collect()
            })
            .unwrap_or_default();
        children
    }

    fn element(el: ElementRef<'_>) -> Markup {
        Markup::fragment(el.html())
    }

    /// Cleaned text content; always a string for present markup
    pub fn text(&self) -> String {
        clean_text(&self.source)
    }
}

fn is_section(tag: &str) -> bool {
    matches!(tag, "html" | "head" | "body")
}

/// Wrapper markup a table part needs to survive parsing
fn table_context(tag: &str) -> Option<(&'static str, &'static str)> {
    match tag {
        "tr" => Some(("<table><tbody>", "</tbody></table>")),
        "td" | "th" => Some(("<table><tbody><tr>", "</tr></tbody></table>")),
        "thead" | "tbody" | "tfoot" | "caption" | "colgroup" => Some(("<table>", "</table>")),
        "col" => Some(("<table><colgroup>", "</colgroup></table>")),
        _ => None,
    }
}

struct Parsed {
    html: Html,
    /// Tag of the top element when it is not simply the first parsed element
    anchor: Option<String>,
    document: bool,
}

impl Parsed {
    fn top(&self) -> Option<ElementRef<'_>> {
        let root = self.html.root_element();
        if let Some(tag) = &self.anchor {
            return root
                .descendants()
                .filter_map(ElementRef::wrap)
                .find(|el| el.value().name() == tag);
        }
        if self.document {
            Some(root)
        } else {
            root.children().find_map(ElementRef::wrap)
        }
    }

    /// Elements in document order. Fragment parsing wraps content in a
    /// synthetic `<html>` root which is skipped.
    fn elements(&self) -> Vec<ElementRef<'_>> {
        if self.anchor.is_some() {
            return self
                .top()
                .map(|top| top.descendants().filter_map(ElementRef::wrap).collect())
                .unwrap_or_default();
        }
        self.html
            .root_element()
            .descendants()
            .filter_map(ElementRef::wrap)
            .skip(usize::from(!self.document))
            .collect()
    }
}

/// Element lookup by tag, class tokens, id and attribute value
#[derive(Debug, Clone, Default)]
pub struct ElementQuery {
    pub tag: Option<String>,
    pub class: Option<String>,
    pub id: Option<String>,
    pub attr: Option<String>,
    pub value: Option<AttrValue>,
}

#[derive(Debug, Clone)]
pub enum AttrValue {
    Exact(String),
    Pattern(Regex),
}

impl ElementQuery {
    pub fn tag(name: impl Into<String>) -> Self {
        Self {
            tag: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn class(class: impl Into<String>) -> Self {
        Self {
            class: Some(class.into()),
            ..Self::default()
        }
    }

    pub fn with_class(mut self, class: impl Into<String>) -> Self {
        self.class = Some(class.into());
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attr = Some(name.into());
        self.value = Some(AttrValue::Exact(value.into()));
        self
    }

    pub fn with_attr_pattern(mut self, name: impl Into<String>, pattern: Regex) -> Self {
        self.attr = Some(name.into());
        self.value = Some(AttrValue::Pattern(pattern));
        self
    }

    pub fn matches(&self, el: &ElementRef<'_>) -> bool {
        let element = el.value();

        if let Some(tag) = &self.tag {
            if !element.name().eq_ignore_ascii_case(tag) {
                return false;
            }
        }

        // Every requested class token must be present
        if let Some(class) = &self.class {
            if !class
                .split_whitespace()
                .all(|wanted| element.classes().any(|have| have == wanted))
            {
                return false;
            }
        }

        if let Some(id) = &self.id {
            if element.id() != Some(id.as_str()) {
                return false;
            }
        }

        if let Some(attr) = &self.attr {
            let Some(actual) = element.attr(attr) else {
                return false;
            };
            match &self.value {
                Some(AttrValue::Exact(expected)) if actual != expected => return false,
                Some(AttrValue::Pattern(re)) if !re.is_match(actual) => return false,
                _ => {}
            }
        }

        true
    }
}

/// Strip tags, decode entities and collapse whitespace.
///
/// Line breaks come from `<br>` and paragraph boundaries; raw newlines in
/// markup source are layout and collapse like any other whitespace. Plain
/// text keeps its newlines.
///
/// Cleaning its own output is a no-op unless that output still holds
/// entity or markup syntax, which only happens when the input was escaped
/// twice (`AT&amp;amp;T`, `&lt;b&gt;`). Each pass decodes one level.
pub fn clean_text(input: &str) -> String {
    let source: Cow<'_, str> = if MARKUP_RE.is_match(input) {
        let collapsed = SPACE_RE.replace_all(input, " ");
        Cow::Owned(BREAK_RE.replace_all(&collapsed, "\n").into_owned())
    } else {
        Cow::Borrowed(input)
    };

    let fragment = Html::parse_fragment(&source);
    let text = visible_text(fragment.root_element());

    text.split('\n')
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

fn visible_text(root: ElementRef<'_>) -> String {
    root.descendants()
        .filter_map(|node| {
            let text = node.value().as_text()?;
            let hidden = node
                .parent()
                .and_then(|parent| parent.value().as_element().map(|el| el.name()))
                .is_some_and(|name| matches!(name, "script" | "style" | "template"));
            (!hidden).then_some(&**text)
        })
        .collect()
}
