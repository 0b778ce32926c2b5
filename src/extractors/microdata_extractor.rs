//! Microdata (schema.org HTML attributes) extraction
//!
//! Extracts microdata from itemscope/itemprop/itemtype attributes.
//! Reference: https://html.spec.whatwg.org/multipage/microdata.html

use scraper::{ElementRef, Html, Selector};

use super::jsonld_extractor::{push_typed, short_type};
use crate::node::{Mapping, Node};

/// Top-level microdata items keyed by itemtype, each type a sequence
pub fn extract_microdata(document: &Html) -> Mapping {
    let mut result = Mapping::new();

    let selector = match Selector::parse("[itemscope]") {
        Ok(s) => s,
        Err(_) => return result,
    };

    for element in document.select(&selector) {
        // Nested items are reached through their parent's itemprop
        let is_nested = element
            .ancestors()
            .filter_map(|n| n.value().as_element())
            .any(|el| el.attr("itemscope").is_some());
        if is_nested {
            continue;
        }

        let item = extract_item(&element);
        let type_name = item.get("@type").and_then(Node::as_str).map(String::from);
        if let Some(type_name) = type_name {
            push_typed(&mut result, type_name, Node::Mapping(item));
        }
    }

    result
}

fn extract_item(element: &ElementRef<'_>) -> Mapping {
    let mut item = Mapping::new();

    if let Some(itemtype) = element.value().attr("itemtype") {
        // itemtype may list several URLs; the first names the item
        if let Some(first) = itemtype.split_whitespace().next() {
            item.insert("@type".to_string(), Node::from(short_type(first)));
        }
    }
    if let Some(itemid) = element.value().attr("itemid") {
        item.insert("@id".to_string(), Node::from(itemid));
    }

    let prop_selector = match Selector::parse("[itemprop]") {
        Ok(s) => s,
        Err(_) => return item,
    };

    for prop_element in element.select(&prop_selector) {
        if !belongs_to(&prop_element, element) {
            continue;
        }
        let Some(names) = prop_element.value().attr("itemprop") else {
            continue;
        };

        let value = if prop_element.value().attr("itemscope").is_some() {
            Node::Mapping(extract_item(&prop_element))
        } else {
            Node::String(property_value(&prop_element))
        };

        for name in names.split_whitespace() {
            add_property(&mut item, name, value.clone());
        }
    }

    item
}

/// Whether the closest enclosing itemscope of `prop` is `scope` itself
fn belongs_to(prop: &ElementRef<'_>, scope: &ElementRef<'_>) -> bool {
    let mut current = prop.parent();
    while let Some(parent) = current {
        if parent.id() == scope.id() {
            return true;
        }
        if parent
            .value()
            .as_element()
            .is_some_and(|el| el.attr("itemscope").is_some())
        {
            return false;
        }
        current = parent.parent();
    }
    false
}

fn property_value(element: &ElementRef<'_>) -> String {
    let el = element.value();
    let attr = |name: &str| el.attr(name).unwrap_or("").trim().to_string();
    match el.name() {
        "meta" => attr("content"),
        "link" | "a" | "area" => attr("href"),
        "img" | "audio" | "video" | "source" | "iframe" | "embed" | "track" => attr("src"),
        "object" => attr("data"),
        "data" | "meter" => attr("value"),
        "time" => el
            .attr("datetime")
            .map(|s| s.trim().to_string())
            .unwrap_or_else(|| collapsed_text(element)),
        _ => collapsed_text(element),
    }
}

fn collapsed_text(element: &ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Repeated properties become sequences
fn add_property(item: &mut Mapping, name: &str, value: Node) {
    match item.get_mut(name) {
        Some(Node::Sequence(values)) => values.push(value),
        Some(existing) => *existing = Node::Sequence(vec![std::mem::take(existing), value]),
        None => {
            item.insert(name.to_string(), value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn first<'a>(result: &'a Mapping, type_name: &str) -> &'a Node {
        &result[type_name].as_sequence().unwrap()[0]
    }

    #[test]
    fn test_extract_simple_microdata() {
        let html = r#"
        <div itemscope itemtype="https://schema.org/Product">
            <span itemprop="name">Test   Product</span>
            <meta itemprop="gtin13" content="1234567890123">
            <span itemprop="price">19.99</span>
        </div>
        "#;

        let result = extract_microdata(&Html::parse_document(html));
        let product = first(&result, "Product");
        assert_eq!(product.get("name"), Some(&Node::from("Test Product")));
        assert_eq!(product.get("gtin13"), Some(&Node::from("1234567890123")));
    }

    #[test]
    fn test_nested_microdata() {
        let html = r#"
        <div itemscope itemtype="https://schema.org/Product">
            <span itemprop="name">Product</span>
            <div itemprop="offers" itemscope itemtype="https://schema.org/Offer">
                <span itemprop="price">19.99</span>
            </div>
        </div>
        "#;

        let result = extract_microdata(&Html::parse_document(html));
        assert!(!result.contains_key("Offer"));
        let product = first(&result, "Product");
        let offers = product.get("offers").unwrap();
        assert_eq!(offers.get("price"), Some(&Node::from("19.99")));
        // The nested price does not leak into the parent
        assert!(product.get("price").is_none());
    }

    #[test]
    fn test_repeated_properties_and_urls() {
        let html = r#"
        <div itemscope itemtype="https://schema.org/VideoObject">
            <a itemprop="url" href="/watch/1">watch</a>
            <span itemprop="keywords">one</span>
            <span itemprop="keywords">two</span>
            <time itemprop="uploadDate" datetime="2023-01-02">Jan 2</time>
        </div>
        "#;

        let result = extract_microdata(&Html::parse_document(html));
        let video = first(&result, "VideoObject");
        assert_eq!(video.get("url"), Some(&Node::from("/watch/1")));
        assert_eq!(
            video.get("keywords"),
            Some(&Node::Sequence(vec![Node::from("one"), Node::from("two")]))
        );
        assert_eq!(video.get("uploadDate"), Some(&Node::from("2023-01-02")));
    }
}
