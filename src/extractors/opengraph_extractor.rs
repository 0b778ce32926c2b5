//! OpenGraph, Twitter Card and standard meta tags

use scraper::{Html, Selector};

use crate::node::{Mapping, Node};

/// Meta tag groups of one page
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetaTags {
    /// `og:*` plus the `article:`, `product:`, `video:` and `music:` namespaces
    pub og: Mapping,
    pub twitter: Mapping,
    /// Other named meta tags (lowercased names) and the canonical link
    pub meta: Mapping,
}

pub fn extract_meta_tags(document: &Html) -> MetaTags {
    let mut tags = MetaTags::default();

    let selector = match Selector::parse("meta") {
        Ok(s) => s,
        Err(_) => return tags,
    };

    for element in document.select(&selector) {
        let el = element.value();
        let content = el.attr("content").unwrap_or("").trim();
        if content.is_empty() {
            continue;
        }

        // Sites mix `property` and `name` for both vocabularies
        let Some(key) = el.attr("property").or_else(|| el.attr("name")) else {
            continue;
        };
        let key = key.trim();

        if let Some(og_key) = key.strip_prefix("og:") {
            insert_value(&mut tags.og, og_key, content);
        } else if ["article:", "product:", "video:", "music:"]
            .iter()
            .any(|ns| key.starts_with(ns))
        {
            insert_value(&mut tags.og, key, content);
        } else if let Some(twitter_key) = key.strip_prefix("twitter:") {
            insert_value(&mut tags.twitter, twitter_key, content);
        } else if el.attr("name").is_some() {
            tags.meta
                .entry(key.to_ascii_lowercase())
                .or_insert_with(|| Node::from(content));
        }
    }

    if let Ok(canonical) = Selector::parse(r#"link[rel="canonical"]"#) {
        let href = document
            .select(&canonical)
            .find_map(|el| el.value().attr("href"));
        if let Some(href) = href {
            tags.meta
                .insert("canonical".to_string(), Node::from(href.trim()));
        }
    }

    tags
}

/// Structured keys nest: `image:width` lands under `image`. A plain value
/// that later gains structure moves to `_value`; repeats become sequences.
fn insert_value(map: &mut Mapping, key: &str, value: &str) {
    if let Some((main_key, sub_key)) = key.split_once(':') {
        let nested = map
            .entry(main_key.to_string())
            .or_insert_with(|| Node::Mapping(Mapping::new()));

        match nested {
            Node::Mapping(fields) => {
                fields.insert(sub_key.to_string(), Node::from(value));
            }
            other => {
                let mut fields = Mapping::new();
                fields.insert("_value".to_string(), std::mem::take(other));
                fields.insert(sub_key.to_string(), Node::from(value));
                *other = Node::Mapping(fields);
            }
        }
        return;
    }

    match map.get_mut(key) {
        Some(Node::Sequence(values)) => values.push(Node::from(value)),
        Some(Node::Mapping(fields)) if !fields.contains_key("_value") => {
            fields.insert("_value".to_string(), Node::from(value));
        }
        Some(existing) => {
            *existing = Node::Sequence(vec![std::mem::take(existing), Node::from(value)]);
        }
        None => {
            map.insert(key.to_string(), Node::from(value));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <html>
        <head>
            <meta property="og:title" content="Test Page">
            <meta property="og:description" content="A test description">
            <meta property="og:image" content="https://example.com/image.jpg">
            <meta property="og:image:width" content="1200">
            <meta property="og:video" content="https://example.com/a.mp4">
            <meta property="og:video" content="https://example.com/b.mp4">
            <meta property="article:published_time" content="2023-01-02T10:00:00Z">
            <meta name="twitter:card" content="summary_large_image">
            <meta property="twitter:site" content="@example">
            <meta name="Description" content="Page description">
            <meta name="empty" content="">
            <link rel="canonical" href="https://example.com/page">
        </head>
        </html>
    "#;

    #[test]
    fn test_extract_opengraph() {
        let tags = extract_meta_tags(&Html::parse_document(PAGE));

        assert_eq!(tags.og.get("title"), Some(&Node::from("Test Page")));
        let image = tags.og.get("image").unwrap();
        assert_eq!(image.get("_value"), Some(&Node::from("https://example.com/image.jpg")));
        assert_eq!(image.get("width"), Some(&Node::from("1200")));
        assert_eq!(tags.og.get("video").unwrap().as_sequence().unwrap().len(), 2);
        assert!(tags.og.get("article").unwrap().get("published_time").is_some());
    }

    #[test]
    fn test_twitter_and_meta() {
        let tags = extract_meta_tags(&Html::parse_document(PAGE));

        assert_eq!(tags.twitter.get("card"), Some(&Node::from("summary_large_image")));
        assert_eq!(tags.twitter.get("site"), Some(&Node::from("@example")));
        assert_eq!(tags.meta.get("description"), Some(&Node::from("Page description")));
        assert_eq!(
            tags.meta.get("canonical"),
            Some(&Node::from("https://example.com/page"))
        );
        assert!(!tags.meta.contains_key("empty"));
    }
}
