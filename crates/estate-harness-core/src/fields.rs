//! Get-or-default access to a listing subtree.
//!
//! Feed trees carry no schema: any field may be missing, empty, a nested
//! object with attributes, or repeated. [`Fields`] gives the mappers one
//! accessor per shape they need and turns every oddity into `None`.

use serde_json::Value;

use crate::feed::{ATTRIBUTE_PREFIX, TEXT_KEY};

/// Read-only view over one record node of a parsed feed.
#[derive(Debug, Clone, Copy)]
pub struct Fields<'a> {
    node: &'a Value,
}

impl<'a> Fields<'a> {
    pub fn new(node: &'a Value) -> Self {
        Self { node }
    }

    pub fn get(&self, key: &str) -> Option<&'a Value> {
        self.node.get(key)
    }

    /// Trimmed, non-empty text of `key`.
    ///
    /// Objects contribute their `#text`; arrays contribute their first element.
    pub fn text(&self, key: &str) -> Option<String> {
        self.get(key).and_then(scalar_text)
    }

    pub fn text_or(&self, key: &str, default: &str) -> String {
        self.text(key).unwrap_or_else(|| default.to_string())
    }

    /// Leading decimal number of `key`, e.g. `"85 m²"` → `85.0`.
    pub fn float(&self, key: &str) -> Option<f64> {
        self.text(key).and_then(|s| leading_float(&s))
    }

    /// Leading number of `key`, truncated toward zero.
    pub fn int(&self, key: &str) -> Option<i64> {
        self.text(key).and_then(|s| leading_int(&s))
    }

    /// Photo locations under `key`, in document order.
    ///
    /// Every non-empty element text is kept as the feed wrote it, relative
    /// paths included. Attribute values only count on elements without text,
    /// and only when they look like a path (`<foto url="a/1.jpg" ordem="1"/>`
    /// yields `a/1.jpg`).
    pub fn urls(&self, key: &str) -> Vec<String> {
        let mut out = Vec::new();
        if let Some(v) = self.get(key) {
            collect_urls(v, &mut out);
        }
        out
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Object(map) => map.get(TEXT_KEY).and_then(scalar_text),
        Value::Array(items) => items.first().and_then(scalar_text),
        Value::Null => None,
    }
}

fn collect_urls(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(s) => {
            let s = s.trim();
            if !s.is_empty() {
                out.push(s.to_string());
            }
        }
        Value::Array(items) => items.iter().for_each(|v| collect_urls(v, out)),
        Value::Object(map) => {
            let has_text = map.get(TEXT_KEY).and_then(scalar_text).is_some();
            for (key, v) in map {
                match key.strip_prefix(ATTRIBUTE_PREFIX) {
                    None => collect_urls(v, out),
                    Some(_) if has_text => {}
                    Some(_) => {
                        if let Some(s) = v.as_str().map(str::trim).filter(|s| s.contains('/')) {
                            out.push(s.to_string());
                        }
                    }
                }
            }
        }
        _ => {}
    }
}

/// Parse the longest `[+-]digits[.digits]` prefix of `s`.
///
/// Leading whitespace is skipped; anything after the number is ignored.
/// Returns `None` when no digit is found before the first other character.
pub fn leading_float(s: &str) -> Option<f64> {
    let s = s.trim_start();
    let bytes = s.as_bytes();
    let mut end = 0;

    if matches!(bytes.first(), Some(b'+') | Some(b'-')) {
        end = 1;
    }
    let int_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    let mut digits = end - int_start;

    if end < bytes.len() && bytes[end] == b'.' {
        let frac_start = end + 1;
        let mut frac_end = frac_start;
        while frac_end < bytes.len() && bytes[frac_end].is_ascii_digit() {
            frac_end += 1;
        }
        if frac_end > frac_start {
            digits += frac_end - frac_start;
            end = frac_end;
        }
    }

    if digits == 0 {
        return None;
    }
    s[..end].parse::<f64>().ok().filter(|v| v.is_finite())
}

/// [`leading_float`] truncated toward zero: `"2.5"` → `2`.
pub fn leading_int(s: &str) -> Option<i64> {
    leading_float(s).map(|v| v.trunc() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_leading_float() {
        assert_eq!(leading_float("350000"), Some(350000.0));
        assert_eq!(leading_float("  85 m²"), Some(85.0));
        assert_eq!(leading_float("120.50"), Some(120.5));
        assert_eq!(leading_float("-3"), Some(-3.0));
        assert_eq!(leading_float("12."), Some(12.0));
        assert_eq!(leading_float(".5"), Some(0.5));
        assert_eq!(leading_float("abc"), None);
        assert_eq!(leading_float("-"), None);
        assert_eq!(leading_float(""), None);
    }

    #[test]
    fn test_leading_int_truncates() {
        assert_eq!(leading_int("2.5"), Some(2));
        assert_eq!(leading_int("3 quartos"), Some(3));
        assert_eq!(leading_int("0"), Some(0));
        assert_eq!(leading_int("n/a"), None);
    }

    #[test]
    fn test_text_handles_shapes() {
        let node = json!({
            "plain": "  Casa  ",
            "blank": "   ",
            "attr": { "@_moeda": "BRL", "#text": "900" },
            "attr_only": { "@_x": "1" },
            "repeated": ["first", "second"],
        });
        let f = Fields::new(&node);
        assert_eq!(f.text("plain").as_deref(), Some("Casa"));
        assert_eq!(f.text("blank"), None);
        assert_eq!(f.text("attr").as_deref(), Some("900"));
        assert_eq!(f.text("attr_only"), None);
        assert_eq!(f.text("repeated").as_deref(), Some("first"));
        assert_eq!(f.text("missing"), None);
        assert_eq!(f.text_or("missing", "dflt"), "dflt");
        assert_eq!(f.float("attr"), Some(900.0));
    }

    #[test]
    fn test_numeric_fields() {
        let node = json!({ "area": "85 m²", "quartos": "0", "vagas": "", "banheiros": "dois" });
        let f = Fields::new(&node);
        assert_eq!(f.float("area"), Some(85.0));
        assert_eq!(f.int("quartos"), Some(0));
        assert_eq!(f.int("vagas"), None);
        assert_eq!(f.int("banheiros"), None);
        assert_eq!(f.int("missing"), None);
    }

    #[test]
    fn test_urls_collects_nested_leaves() {
        let node = json!({
            "fotos": {
                "foto": [
                    "https://cdn.example.com/1.jpg",
                    { "@_url": "https://cdn.example.com/2.jpg", "@_ordem": "2" },
                    "/local/3.jpg",
                    "  "
                ]
            }
        });
        let f = Fields::new(&node);
        assert_eq!(
            f.urls("fotos"),
            vec![
                "https://cdn.example.com/1.jpg",
                "https://cdn.example.com/2.jpg",
                "/local/3.jpg"
            ]
        );
        assert!(f.urls("missing").is_empty());
    }

    #[test]
    fn test_urls_keep_relative_and_schemeless_paths() {
        let node = json!({
            "fotos": {
                "foto": [
                    "fotos/1.jpg",
                    "cdn.host/1.jpg",
                    { "@_legenda": "sala/cozinha", "#text": "img/2.jpg" }
                ]
            }
        });
        let f = Fields::new(&node);
        assert_eq!(
            f.urls("fotos"),
            vec!["fotos/1.jpg", "cdn.host/1.jpg", "img/2.jpg"]
        );
    }
}
