//! Numeric coercion: integers, floats, counts and durations

use std::sync::LazyLock;

use regex::Regex;

use super::Scale;
use crate::node::Node;

static INT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[-+]?\d+(?:[,.\s']\d{3})*").expect("valid regex"));
static FLOAT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[-+]?(?:\d{1,3}(?:,\d{3})+|\d+)(?:\.\d+)?|[-+]?\.\d+").expect("valid regex")
});
static COUNT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\d[\d,]*(?:\.\d+)?)\s*(k|m|b|thousand|million|billion)?\b")
        .expect("valid regex")
});
static CLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:(?:(\d+):)?(\d+):)?(\d+(?:\.\d+)?)$").expect("valid regex")
});
static ISO_DURATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^P(?:(\d+(?:\.\d+)?)D)?(?:T(?:(\d+(?:\.\d+)?)H)?(?:(\d+(?:\.\d+)?)M)?(?:(\d+(?:\.\d+)?)S)?)?$",
    )
    .expect("valid regex")
});
static WORD_DURATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(?:(\d+(?:\.\d+)?)\s*(?:days?|d))?[\s,]*(?:(\d+(?:\.\d+)?)\s*(?:hours?|hrs?|h))?[\s,]*(?:(\d+(?:\.\d+)?)\s*(?:minutes?|mins?|m))?[\s,]*(?:(\d+(?:\.\d+)?)\s*(?:seconds?|secs?|s))?$",
    )
    .expect("valid regex")
});

/// Integer coercion, tolerant of surrounding text and thousands separators
pub fn to_int(node: &Node, scale: Scale) -> Option<Node> {
    let base = match node {
        Node::Number(n) => {
            if scale.is_identity() && n.is_i64() {
                return Some(node.clone());
            }
            n.as_i64()
                .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64))?
        }
        Node::String(s) => parse_int(s)?,
        _ => return None,
    };
    if scale.is_identity() {
        return Some(Node::from(base));
    }
    let scaled = scale.apply(base as f64).floor();
    scaled.is_finite().then(|| Node::from(scaled as i64))
}

/// Float coercion, tolerant of surrounding text and thousands separators
pub fn to_float(node: &Node, scale: Scale) -> Option<Node> {
    let base = match node {
        Node::Number(n) => n.as_f64()?,
        Node::String(s) => parse_float(s)?,
        _ => return None,
    };
    let value = scale.apply(base);
    value.is_finite().then(|| Node::from_f64(value))
}

/// Scalar to string; `None` for containers and markup
pub fn to_str(node: &Node) -> Option<String> {
    match node {
        Node::String(s) => Some(s.clone()),
        Node::Number(n) => Some(n.to_string()),
        Node::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

pub fn parse_int(input: &str) -> Option<i64> {
    let s = input.trim();
    if let Ok(v) = s.parse::<i64>() {
        return Some(v);
    }
    if let Some(v) = parse_finite(s) {
        return Some(v.trunc() as i64);
    }
    let found = INT_RE.find(s)?.as_str();
    let digits: String = found
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '-')
        .collect();
    digits.parse().ok()
}

pub fn parse_float(input: &str) -> Option<f64> {
    let s = input.trim();
    if let Some(v) = parse_finite(s) {
        return Some(v);
    }
    let found = FLOAT_RE.find(s)?.as_str().replace(',', "");
    parse_finite(&found)
}

/// Rust accepts "inf" and "NaN"; numbers in scraped text never mean those
fn parse_finite(s: &str) -> Option<f64> {
    s.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Abbreviated counts: `"1.2K"` is 1200, `"12,345 views"` is 12345
pub fn parse_count(node: &Node) -> Option<Node> {
    let s = match node {
        Node::Number(_) => return to_int(node, Scale::default()),
        Node::String(s) => s,
        _ => return None,
    };
    let caps = COUNT_RE.captures(s)?;
    let value = parse_finite(&caps[1].replace(',', ""))?;
    let multiplier = match caps.get(2).map(|m| m.as_str().to_ascii_lowercase()).as_deref() {
        Some("k" | "thousand") => 1e3,
        Some("m" | "million") => 1e6,
        Some("b" | "billion") => 1e9,
        _ => 1.0,
    };
    Some(Node::from((value * multiplier).round() as i64))
}

/// Duration in seconds from `"1:02:03"`, `"PT1H2M3S"` or `"1h 30m"`
pub fn parse_duration(node: &Node) -> Option<Node> {
    let s = match node {
        Node::Number(_) => return Some(node.clone()),
        Node::String(s) => s.trim(),
        _ => return None,
    };
    if s.is_empty() {
        return None;
    }
    duration_seconds(s).map(seconds_node)
}

fn duration_seconds(s: &str) -> Option<f64> {
    let part = |caps: &regex::Captures<'_>, i: usize| -> Option<f64> {
        caps.get(i).and_then(|m| m.as_str().parse::<f64>().ok())
    };

    if let Some(caps) = CLOCK_RE.captures(s) {
        let hours = part(&caps, 1).unwrap_or(0.0);
        let minutes = part(&caps, 2).unwrap_or(0.0);
        let seconds = part(&caps, 3)?;
        return Some(hours * 3600.0 + minutes * 60.0 + seconds);
    }

    for re in [&*ISO_DURATION_RE, &*WORD_DURATION_RE] {
        if let Some(caps) = re.captures(s) {
            let fields = [86400.0, 3600.0, 60.0, 1.0];
            let mut total = None;
            for (i, unit) in fields.iter().enumerate() {
                if let Some(v) = part(&caps, i + 1) {
                    total = Some(total.unwrap_or(0.0) + v * unit);
                }
            }
            if total.is_some() {
                return total;
            }
        }
    }
    None
}

/// Whole seconds stay integers
fn seconds_node(seconds: f64) -> Node {
    if seconds.fract() == 0.0 && seconds.abs() < i64::MAX as f64 {
        Node::from(seconds as i64)
    } else {
        Node::from_f64(seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(s: &str) -> Option<Node> {
        to_int(&Node::from(s), Scale::default())
    }

    #[test]
    fn test_to_int_tolerates_text_and_separators() {
        assert_eq!(int("1,234"), Some(Node::from(1234)));
        assert_eq!(int("  42 "), Some(Node::from(42)));
        assert_eq!(int("Views: 12,345 times"), Some(Node::from(12345)));
        assert_eq!(int("1.234.567"), Some(Node::from(1234567)));
        assert_eq!(int("-7"), Some(Node::from(-7)));
        assert_eq!(int("3.9"), Some(Node::from(3)));
        assert_eq!(int("none"), None);
        assert_eq!(to_int(&Node::from(true), Scale::default()), None);
    }

    #[test]
    fn test_to_int_is_idempotent() {
        let once = int("1,234").unwrap();
        assert_eq!(to_int(&once, Scale::default()), Some(once.clone()));
        assert_eq!(to_int(&Node::from(9.7), Scale::default()), Some(Node::from(9)));
    }

    #[test]
    fn test_scaling() {
        let millis = Scale {
            scale: 1000.0,
            invscale: 1.0,
        };
        assert_eq!(to_int(&Node::from(90500), millis), Some(Node::from(90)));
        assert_eq!(to_float(&Node::from("1500"), millis), Some(Node::from(1.5)));
    }

    #[test]
    fn test_to_float() {
        let f = |s: &str| to_float(&Node::from(s), Scale::default());
        assert_eq!(f("12.5"), Some(Node::from(12.5)));
        assert_eq!(f("€1,299.99"), Some(Node::from(1299.99)));
        assert_eq!(f("inf"), None);
        assert_eq!(f("rating: .5"), Some(Node::from(0.5)));
    }

    #[test]
    fn test_to_str() {
        assert_eq!(to_str(&Node::from(12)), Some("12".to_string()));
        assert_eq!(to_str(&Node::from(false)), Some("false".to_string()));
        assert_eq!(to_str(&Node::Sequence(vec![])), None);
    }

    #[test]
    fn test_parse_count() {
        let count = |s: &str| parse_count(&Node::from(s));
        assert_eq!(count("1.2K"), Some(Node::from(1200)));
        assert_eq!(count("3M views"), Some(Node::from(3_000_000)));
        assert_eq!(count("12,345 views"), Some(Node::from(12345)));
        assert_eq!(count("2 billion"), Some(Node::from(2_000_000_000)));
        assert_eq!(count("no digits"), None);
    }

    #[test]
    fn test_parse_duration() {
        let dur = |s: &str| parse_duration(&Node::from(s));
        assert_eq!(dur("1:02:03"), Some(Node::from(3723)));
        assert_eq!(dur("02:03"), Some(Node::from(123)));
        assert_eq!(dur("90"), Some(Node::from(90)));
        assert_eq!(dur("PT1H2M3S"), Some(Node::from(3723)));
        assert_eq!(dur("PT1.5S"), Some(Node::from(1.5)));
        assert_eq!(dur("1h 30m"), Some(Node::from(5400)));
        assert_eq!(dur("5 min"), Some(Node::from(300)));
        assert_eq!(dur("soon"), None);
    }
}
