//! Next.js page data
//!
//! Server-rendered Next.js pages embed their props as JSON in
//! `<script id="__NEXT_DATA__">`. Most of what a page shows lives under
//! `props.pageProps`.

use scraper::{Html, Selector};
use serde_json::Value;
use tracing::debug;

use crate::node::Node;

pub fn extract_nextjs(document: &Html) -> Option<Node> {
    let selector = Selector::parse("script#__NEXT_DATA__").ok()?;
    let element = document.select(&selector).next()?;

    let content: String = element.text().collect();
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return None;
    }

    match serde_json::from_str::<Value>(trimmed) {
        Ok(json) => Some(Node::from(json)),
        Err(err) => {
            debug!(error = %err, "malformed __NEXT_DATA__ payload");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_next_data() {
        let html = r#"
        <html><body>
            <div id="__next"></div>
            <script id="__NEXT_DATA__" type="application/json">
                {"props": {"pageProps": {"video": {"id": "abc", "title": "Clip"}}}, "page": "/v/[id]"}
            </script>
        </body></html>
        "#;

        let data = extract_nextjs(&Html::parse_document(html)).unwrap();
        let title = data
            .get("props")
            .and_then(|p| p.get("pageProps"))
            .and_then(|p| p.get("video"))
            .and_then(|v| v.get("title"));
        assert_eq!(title, Some(&Node::from("Clip")));
    }

    #[test]
    fn test_missing_or_broken_next_data() {
        let none = Html::parse_document("<html><body></body></html>");
        assert!(extract_nextjs(&none).is_none());

        let broken = Html::parse_document(r#"<script id="__NEXT_DATA__">{"props": </script>"#);
        assert!(extract_nextjs(&broken).is_none());
    }
}
