//! Selection of string values from a JSON document by a query path.
//!
//! The path grammar is deliberately small: dot-separated segments, where a
//! segment is an object key (`ranges`), a key with an array wildcard
//! (`ranges[*]`), or a bare wildcard (`[*]`). An absent path selects every
//! string leaf of the document. A path that selects nothing yields an empty
//! set; a path that lands on a non-string terminal node is an error, since
//! the caller must never build a partial result from a malformed document.

use serde_json::Value;

enum Segment<'a> {
    Key(&'a str),
    Wildcard,
}

fn parse_path(path: &str) -> Result<Vec<Segment<'_>>, String> {
    let mut segments = Vec::new();
    for raw in path.split('.') {
        if raw.is_empty() {
            return Err(format!("empty segment in query path '{path}'"));
        }
        if raw == "[*]" {
            segments.push(Segment::Wildcard);
        } else if let Some(key) = raw.strip_suffix("[*]") {
            segments.push(Segment::Key(key));
            segments.push(Segment::Wildcard);
        } else if raw.contains('[') || raw.contains(']') {
            return Err(format!("unsupported segment '{raw}' in query path"));
        } else {
            segments.push(Segment::Key(raw));
        }
    }
    Ok(segments)
}

/// Select the string nodes of `document` addressed by `path`.
///
/// `None` (or an empty path) selects every string leaf in the document.
pub fn select_strings<'a>(
    document: &'a Value,
    path: Option<&str>,
) -> Result<Vec<&'a str>, String> {
    let path = match path {
        Some(p) if !p.is_empty() => p,
        _ => {
            let mut leaves = Vec::new();
            collect_string_leaves(document, &mut leaves);
            return Ok(leaves);
        }
    };

    let mut frontier = vec![document];
    for segment in parse_path(path)? {
        let mut next = Vec::new();
        for node in frontier {
            match segment {
                // a missing key simply selects nothing on this branch
                Segment::Key(key) => {
                    if let Some(child) = node.get(key) {
                        next.push(child);
                    }
                }
                Segment::Wildcard => match node {
                    Value::Array(items) => next.extend(items.iter()),
                    Value::Object(map) => next.extend(map.values()),
                    _ => {}
                },
            }
        }
        frontier = next;
    }

    frontier
        .into_iter()
        .map(|node| {
            node.as_str()
                .ok_or_else(|| format!("query path '{path}' selected a non-string value"))
        })
        .collect()
}

fn collect_string_leaves<'a>(node: &'a Value, out: &mut Vec<&'a str>) {
    match node {
        Value::String(s) => out.push(s),
        Value::Array(items) => {
            for item in items {
                collect_string_leaves(item, out);
            }
        }
        Value::Object(map) => {
            for value in map.values() {
                collect_string_leaves(value, out);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_key_with_wildcard() {
        let doc = json!({"ranges": ["10.0.0.0/24", "192.168.1.0/24"], "note": 7});
        let selected = select_strings(&doc, Some("ranges[*]")).expect("selects");
        assert_eq!(selected, vec!["10.0.0.0/24", "192.168.1.0/24"]);
    }

    #[test]
    fn test_nested_path() {
        let doc = json!({"data": {"networks": {"trusted": ["10.1.0.0/16"]}}});
        let selected = select_strings(&doc, Some("data.networks.trusted[*]")).expect("selects");
        assert_eq!(selected, vec!["10.1.0.0/16"]);
    }

    #[test]
    fn test_root_array_wildcard() {
        let doc = json!(["10.0.0.0/8", "172.16.0.0/12"]);
        let selected = select_strings(&doc, Some("[*]")).expect("selects");
        assert_eq!(selected, vec!["10.0.0.0/8", "172.16.0.0/12"]);
    }

    #[test]
    fn test_absent_path_collects_all_string_leaves() {
        let doc = json!({"a": ["10.0.0.0/8"], "b": {"c": "192.168.0.0/16"}, "n": 42});
        let mut selected = select_strings(&doc, None).expect("selects");
        selected.sort();
        assert_eq!(selected, vec!["10.0.0.0/8", "192.168.0.0/16"]);
    }

    #[test]
    fn test_missing_key_selects_nothing() {
        let doc = json!({"ranges": ["10.0.0.0/8"]});
        let selected = select_strings(&doc, Some("other[*]")).expect("selects");
        assert!(selected.is_empty());
    }

    #[test]
    fn test_non_string_terminal_is_error() {
        let doc = json!({"ranges": ["10.0.0.0/8", 99]});
        assert!(select_strings(&doc, Some("ranges[*]")).is_err());

        let doc = json!({"ranges": {"nested": true}});
        assert!(select_strings(&doc, Some("ranges")).is_err());
    }

    #[test]
    fn test_malformed_path_is_error() {
        let doc = json!({});
        assert!(select_strings(&doc, Some("a..b")).is_err());
        assert!(select_strings(&doc, Some("a[0]")).is_err());
    }
}
