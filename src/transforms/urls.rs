//! URL normalization

use url::Url;

/// Resolve `input` into an absolute http(s) URL.
///
/// Protocol-relative URLs take the base's scheme (https without a base).
/// Relative URLs need a base. Anything that ends up outside http(s) is `None`.
/// Absolute http(s) URLs come back exactly as given, only trimmed.
pub fn normalize_url(input: &str, base: Option<&Url>) -> Option<String> {
    let s = input.trim();
    if s.is_empty() {
        return None;
    }

    if let Some(rest) = s.strip_prefix("//") {
        let scheme = base
            .map(Url::scheme)
            .filter(|scheme| matches!(*scheme, "http" | "https"))
            .unwrap_or("https");
        return web_url(Url::parse(&format!("{scheme}://{rest}")).ok()?);
    }

    match Url::parse(s) {
        Ok(url) => is_web(&url).then(|| s.to_string()),
        Err(url::ParseError::RelativeUrlWithoutBase) => web_url(base?.join(s).ok()?),
        Err(_) => None,
    }
}

fn is_web(url: &Url) -> bool {
    matches!(url.scheme(), "http" | "https") && url.host().is_some()
}

fn web_url(url: Url) -> Option<String> {
    is_web(&url).then(|| url.to_string())
}
