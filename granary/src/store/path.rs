//! JSON path tokenizer and text extraction for embedding.
//!
//! Index paths select the parts of a stored value that get embedded:
//! dotted fields (`metadata.title`), array positions (`authors[0].name`,
//! `revisions[-1].changes`), and wildcards that fan out over every element
//! (`chapters[*].content`). `$` selects the whole document.
//!
//! Parsing is strict and fails fast; extraction is lenient and returns
//! nothing for branches that do not exist.

use serde_json::Value;

use crate::error::StoreError;

/// One step of a tokenized index path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    /// Object field access by name.
    Field(String),
    /// Array access from the front, zero-based (`[0]`, `[2]`).
    Index(usize),
    /// Array access from the back, one-based (`[-1]` is the last element).
    NegIndex(usize),
    /// Fan out over every array element (`[*]`).
    Wildcard,
}

/// Tokenizes a path string into [`PathSegment`]s.
///
/// `$` (or the empty string) denotes the document root and tokenizes to an
/// empty segment list. Malformed paths (empty fields, unclosed or empty
/// brackets, non-integer indices, trailing dots) are rejected.
pub fn tokenize_path(path: &str) -> Result<Vec<PathSegment>, StoreError> {
    if path.is_empty() || path == "$" {
        return Ok(Vec::new());
    }
    let malformed = |detail: &str| {
        StoreError::Config(format!("malformed index path {:?}: {}", path, detail))
    };

    let mut segments = Vec::new();
    let bytes = path.as_bytes();
    let mut pos = 0;
    let mut expect_segment = true;
    let mut after_bracket = false;
    while pos < bytes.len() {
        match bytes[pos] {
            b'[' => {
                let close = path[pos..]
                    .find(']')
                    .map(|off| pos + off)
                    .ok_or_else(|| malformed("unclosed '['"))?;
                let inner = &path[pos + 1..close];
                if inner == "*" {
                    segments.push(PathSegment::Wildcard);
                } else if let Some(stripped) = inner.strip_prefix('-') {
                    let n: usize = stripped
                        .parse()
                        .map_err(|_| malformed("expected integer index"))?;
                    if n == 0 {
                        return Err(malformed("negative index cannot be zero"));
                    }
                    segments.push(PathSegment::NegIndex(n));
                } else {
                    let n: usize = inner
                        .parse()
                        .map_err(|_| malformed("expected integer index"))?;
                    segments.push(PathSegment::Index(n));
                }
                pos = close + 1;
                expect_segment = false;
                after_bracket = true;
            }
            b'.' => {
                if expect_segment {
                    return Err(malformed("empty field name"));
                }
                pos += 1;
                expect_segment = true;
                after_bracket = false;
            }
            _ => {
                if after_bracket {
                    return Err(malformed("expected '.' or '[' after ']'"));
                }
                let end = path[pos..]
                    .find(['.', '['])
                    .map(|off| pos + off)
                    .unwrap_or(path.len());
                let field = &path[pos..end];
                if field.is_empty() {
                    return Err(malformed("empty field name"));
                }
                segments.push(PathSegment::Field(field.to_string()));
                pos = end;
                expect_segment = false;
            }
        }
    }
    if expect_segment {
        return Err(malformed("trailing '.'"));
    }
    Ok(segments)
}

/// Collects the text values selected by `path` from `value`.
///
/// Evaluation is lazy and left-to-right: wildcards fan out, missing fields
/// and out-of-range indices contribute nothing, and non-string leaves are
/// rendered as their JSON text form.
pub fn get_text_at_path(value: &Value, path: &[PathSegment]) -> Vec<String> {
    let mut out = Vec::new();
    collect(value, path, &mut out);
    out
}

fn collect(value: &Value, path: &[PathSegment], out: &mut Vec<String>) {
    let (segment, rest) = match path.split_first() {
        None => {
            out.push(value_to_text(value));
            return;
        }
        Some(split) => split,
    };
    match segment {
        PathSegment::Field(name) => {
            if let Some(child) = value.get(name) {
                collect(child, rest, out);
            }
        }
        PathSegment::Index(i) => {
            if let Some(child) = value.as_array().and_then(|a| a.get(*i)) {
                collect(child, rest, out);
            }
        }
        PathSegment::NegIndex(n) => {
            if let Some(array) = value.as_array() {
                if *n <= array.len() {
                    collect(&array[array.len() - n], rest, out);
                }
            }
        }
        PathSegment::Wildcard => {
            if let Some(array) = value.as_array() {
                for child in array {
                    collect(child, rest, out);
                }
            }
        }
    }
}

fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn toks(path: &str) -> Vec<PathSegment> {
        tokenize_path(path).unwrap()
    }

    #[test]
    fn tokenize_root_and_fields() {
        assert!(toks("$").is_empty());
        assert!(toks("").is_empty());
        assert_eq!(
            toks("metadata.title"),
            vec![
                PathSegment::Field("metadata".into()),
                PathSegment::Field("title".into())
            ]
        );
    }

    #[test]
    fn tokenize_indices_and_wildcards() {
        assert_eq!(
            toks("chapters[*].content"),
            vec![
                PathSegment::Field("chapters".into()),
                PathSegment::Wildcard,
                PathSegment::Field("content".into())
            ]
        );
        assert_eq!(
            toks("authors[0].name"),
            vec![
                PathSegment::Field("authors".into()),
                PathSegment::Index(0),
                PathSegment::Field("name".into())
            ]
        );
        assert_eq!(
            toks("revisions[-1].changes"),
            vec![
                PathSegment::Field("revisions".into()),
                PathSegment::NegIndex(1),
                PathSegment::Field("changes".into())
            ]
        );
        assert_eq!(
            toks("sections[*].paragraphs[*].text").len(),
            5,
            "chained wildcards tokenize segment by segment"
        );
    }

    /// **Scenario**: malformed paths are rejected instead of being silently
    /// truncated.
    #[test]
    fn tokenize_rejects_malformed_paths() {
        for bad in [
            "a..b", ".a", "a.", "a[", "a[]", "a[x]", "a[1.5]", "a[-0]", "a[0]b",
        ] {
            assert!(
                matches!(tokenize_path(bad), Err(StoreError::Config(_))),
                "expected parse failure for {:?}",
                bad
            );
        }
    }

    /// **Scenario**: wildcard fan-out over an array of objects yields one
    /// string per element, in order.
    #[test]
    fn wildcard_extraction_fans_out() {
        let doc = json!({"chapters": [{"content": "x"}, {"content": "y"}]});
        let texts = get_text_at_path(&doc, &toks("chapters[*].content"));
        assert_eq!(texts, vec!["x", "y"]);
    }

    #[test]
    fn missing_branches_yield_nothing() {
        let doc = json!({"a": {"b": "hit"}});
        assert_eq!(get_text_at_path(&doc, &toks("a.b")), vec!["hit"]);
        assert!(get_text_at_path(&doc, &toks("a.c")).is_empty());
        assert!(get_text_at_path(&doc, &toks("a.b[0]")).is_empty());
        assert!(get_text_at_path(&doc, &toks("missing[*].x")).is_empty());
    }

    #[test]
    fn negative_index_counts_from_the_back() {
        let doc = json!({"revisions": [{"changes": "old"}, {"changes": "new"}]});
        assert_eq!(
            get_text_at_path(&doc, &toks("revisions[-1].changes")),
            vec!["new"]
        );
        assert!(get_text_at_path(&doc, &toks("revisions[-3].changes")).is_empty());
    }

    #[test]
    fn non_string_leaves_render_as_json() {
        let doc = json!({"n": 42, "flag": true, "nested": {"k": 1}});
        assert_eq!(get_text_at_path(&doc, &toks("n")), vec!["42"]);
        assert_eq!(get_text_at_path(&doc, &toks("flag")), vec!["true"]);
        assert_eq!(get_text_at_path(&doc, &toks("nested")), vec![r#"{"k":1}"#]);
        // Root path embeds the whole document.
        let root = get_text_at_path(&doc, &[]);
        assert_eq!(root.len(), 1);
        assert!(root[0].contains("\"n\":42"));
    }
}
