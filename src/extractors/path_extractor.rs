//! JSON path queries
//!
//! Dot/bracket notation with array flattening:
//! - `name` - a top-level key
//! - `game.id.objectId` - nested keys
//! - `images[0].url` - array index (negative counts from the end)
//! - `images[].url` or `images[*].url` - every element, flattened

use serde_json::Value;

use crate::error::{ExtractError, ExtractResult};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Step {
    Key(String),
    Index(isize),
    Flatten,
}

/// A parsed JSON path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonPath {
    steps: Vec<Step>,
}

impl JsonPath {
    pub fn parse(path: &str) -> ExtractResult<Self> {
        let invalid = || ExtractError::InvalidPath {
            path: path.to_string(),
        };

        let mut steps = Vec::new();
        let mut rest = path.trim();
        if rest.is_empty() {
            return Err(invalid());
        }

        let mut expect_key = true;
        while !rest.is_empty() {
            if let Some(after) = rest.strip_prefix('[') {
                let end = after.find(']').ok_or_else(invalid)?;
                let inner = after[..end].trim();
                if inner.is_empty() || inner == "*" {
                    steps.push(Step::Flatten);
                } else {
                    steps.push(Step::Index(inner.parse().map_err(|_| invalid())?));
                }
                rest = &after[end + 1..];
                expect_key = false;
            } else if let Some(after) = rest.strip_prefix('.') {
                if expect_key {
                    return Err(invalid());
                }
                rest = after;
                expect_key = true;
            } else {
                if !expect_key {
                    return Err(invalid());
                }
                let end = rest.find(['.', '[']).unwrap_or(rest.len());
                let key = rest[..end].trim();
                if key.is_empty() {
                    return Err(invalid());
                }
                steps.push(Step::Key(key.to_string()));
                rest = &rest[end..];
                expect_key = false;
            }
        }
        if expect_key {
            return Err(invalid());
        }

        Ok(Self { steps })
    }

    /// Every value the path reaches, in document order; nulls are dropped.
    pub fn evaluate<'v>(&self, root: &'v Value) -> Vec<&'v Value> {
        let mut current = vec![root];

        for step in &self.steps {
            current = match step {
                Step::Key(key) => current.into_iter().filter_map(|v| v.get(key)).collect(),
                Step::Index(idx) => current
                    .into_iter()
                    .filter_map(|v| {
                        let arr = v.as_array()?;
                        let pos = if *idx < 0 {
                            arr.len().checked_sub(idx.unsigned_abs())?
                        } else {
                            *idx as usize
                        };
                        arr.get(pos)
                    })
                    .collect(),
                Step::Flatten => current
                    .into_iter()
                    .filter_map(Value::as_array)
                    .flatten()
                    .collect(),
            };
        }

        current.into_iter().filter(|v| !v.is_null()).collect()
    }
}

/// Convenience wrapper: parse and evaluate in one go.
pub fn extract_path<'v>(root: &'v Value, path: &str) -> ExtractResult<Vec<&'v Value>> {
    Ok(JsonPath::parse(path)?.evaluate(root))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_nested_keys() {
        let data = json!({"game": {"id": {"objectId": "abc"}}, "user": null});
        assert_eq!(extract_path(&data, "game.id.objectId").unwrap(), vec![&json!("abc")]);
        assert!(extract_path(&data, "game.missing").unwrap().is_empty());
        assert!(extract_path(&data, "user").unwrap().is_empty());
    }

    #[test]
    fn test_flatten_and_index() {
        let data = json!({
            "images": [
                {"url": "a.png", "thumb": "a_t.png"},
                {"url": "b.png"},
                {"thumb": "c_t.png"}
            ]
        });
        assert_eq!(
            extract_path(&data, "images[].url").unwrap(),
            vec![&json!("a.png"), &json!("b.png")]
        );
        assert_eq!(
            extract_path(&data, "images[*].thumb").unwrap(),
            vec![&json!("a_t.png"), &json!("c_t.png")]
        );
        assert_eq!(extract_path(&data, "images[1].url").unwrap(), vec![&json!("b.png")]);
        assert_eq!(extract_path(&data, "images[-1].thumb").unwrap(), vec![&json!("c_t.png")]);
        assert!(extract_path(&data, "images[9].url").unwrap().is_empty());
    }

    #[test]
    fn test_invalid_paths() {
        for path in ["", "a..b", "a.", "images[", "images[x]", ".a", "a[]b"] {
            assert!(JsonPath::parse(path).is_err(), "{path} should not parse");
        }
    }
}
