//! Evidence and citation types
//!
//! Evidence chunks come back from retrieval; citations come back from the model.
//! Model output is not trusted to be well formed, so [`Citation`] deserializes
//! leniently: anything it cannot make sense of becomes a citation to the nil
//! chunk id, which no grounding set contains.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Maximum length of a citation quote, in characters
pub const MAX_QUOTE_CHARS: usize = 300;

static UUID_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(00000000-0000-0000-0000-000000000000|ffffffff-ffff-ffff-ffff-ffffffffffff|[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[1-8][0-9a-fA-F]{3}-[89abAB][0-9a-fA-F]{3}-[0-9a-fA-F]{12})",
    )
    .expect("uuid pattern is valid")
});

/// A unit of retrieved knowledge-base text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceChunk {
    pub id: Uuid,
    pub title: Option<String>,
    pub text: String,
    pub similarity: Option<f64>,
}

/// A (chunk id, quote) pair attached to a model-produced row
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Citation {
    pub chunk_id: Uuid,
    pub quote: String,
}

impl Citation {
    pub fn new(chunk_id: Uuid, quote: impl Into<String>) -> Self {
        Self {
            chunk_id,
            quote: quote.into(),
        }
    }

    /// Best-effort conversion of whatever the model returned into a citation
    pub fn coerce(value: &Value) -> Citation {
        match value {
            Value::Object(map) => {
                let chunk_id = map
                    .get("chunkId")
                    .or_else(|| map.get("chunk_id"))
                    .and_then(Value::as_str)
                    .and_then(extract_uuid)
                    .unwrap_or(Uuid::nil());

                let quote = ["quote", "text", "snippet"]
                    .iter()
                    .find_map(|key| map.get(*key).and_then(Value::as_str))
                    .map(str::trim)
                    .unwrap_or("");

                let quote = if quote.is_empty() {
                    truncate_quote(&value.to_string())
                } else {
                    truncate_quote(quote)
                };

                Citation { chunk_id, quote }
            }
            Value::String(text) => coerce_text(text),
            other => Citation {
                chunk_id: Uuid::nil(),
                quote: truncate_quote(&other.to_string()),
            },
        }
    }
}

impl<'de> Deserialize<'de> for Citation {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(Citation::coerce(&value))
    }
}

fn coerce_text(text: &str) -> Citation {
    let text = text.trim();

    // Models sometimes return a JSON object serialized as a string
    if text.starts_with('{') && text.ends_with('}') {
        if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(text) {
            return Citation::coerce(&value);
        }
    }

    let Some(found) = UUID_PATTERN.find(text) else {
        return Citation {
            chunk_id: Uuid::nil(),
            quote: truncate_quote(text),
        };
    };

    let chunk_id = Uuid::parse_str(found.as_str()).unwrap_or(Uuid::nil());
    let quote = text[found.end()..]
        .trim()
        .trim_start_matches([':', '-', '\u{2013}', '\u{2014}', ' '])
        .trim()
        .trim_start_matches(['\u{201C}', '"'])
        .trim_end_matches(['\u{201D}', '"'])
        .trim();

    let quote = if quote.is_empty() {
        truncate_quote(text)
    } else {
        truncate_quote(quote)
    };

    Citation { chunk_id, quote }
}

fn extract_uuid(raw: &str) -> Option<Uuid> {
    UUID_PATTERN
        .find(raw)
        .and_then(|m| Uuid::parse_str(m.as_str()).ok())
}

fn truncate_quote(quote: &str) -> String {
    quote.chars().take(MAX_QUOTE_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const CHUNK: &str = "3f0c2a9e-8b1d-4c7e-9a6f-2d5e8b1c4a7f";

    #[test]
    fn test_object_citation() {
        let c: Citation = serde_json::from_value(json!({
            "chunkId": CHUNK,
            "quote": "  measure before you build  "
        }))
        .unwrap();
        assert_eq!(c.chunk_id.to_string(), CHUNK);
        assert_eq!(c.quote, "measure before you build");
    }

    #[test]
    fn test_object_citation_with_text_field_and_snake_case_id() {
        let c: Citation = serde_json::from_value(json!({
            "chunk_id": CHUNK,
            "text": "ship small"
        }))
        .unwrap();
        assert_eq!(c.chunk_id.to_string(), CHUNK);
        assert_eq!(c.quote, "ship small");
    }

    #[test]
    fn test_string_citation_with_separator_and_quotes() {
        let c: Citation =
            serde_json::from_value(json!(format!("{CHUNK}: \u{201C}fail fast\u{201D}"))).unwrap();
        assert_eq!(c.chunk_id.to_string(), CHUNK);
        assert_eq!(c.quote, "fail fast");
    }

    #[test]
    fn test_json_object_inside_string() {
        let raw = format!("{{\"chunkId\":\"{CHUNK}\",\"quote\":\"q\"}}");
        let c: Citation = serde_json::from_value(json!(raw)).unwrap();
        assert_eq!(c.chunk_id.to_string(), CHUNK);
        assert_eq!(c.quote, "q");
    }

    #[test]
    fn test_unparseable_chunk_id_becomes_nil() {
        let c: Citation = serde_json::from_value(json!({
            "chunkId": "chunk-7",
            "quote": "something"
        }))
        .unwrap();
        assert!(c.chunk_id.is_nil());

        let c: Citation = serde_json::from_value(json!("no identifier here")).unwrap();
        assert!(c.chunk_id.is_nil());
        assert_eq!(c.quote, "no identifier here");

        let c: Citation = serde_json::from_value(json!(42)).unwrap();
        assert!(c.chunk_id.is_nil());
    }

    #[test]
    fn test_quote_is_truncated() {
        let long = "x".repeat(MAX_QUOTE_CHARS + 50);
        let c: Citation = serde_json::from_value(json!({ "chunkId": CHUNK, "quote": long })).unwrap();
        assert_eq!(c.quote.chars().count(), MAX_QUOTE_CHARS);
    }

    #[test]
    fn test_serializes_snake_case() {
        let c = Citation::new(Uuid::nil(), "q");
        let value = serde_json::to_value(&c).unwrap();
        assert_eq!(value["chunk_id"], json!(Uuid::nil()));
        assert_eq!(value["quote"], json!("q"));
    }
}
