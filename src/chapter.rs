use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::FetchError;

/// One chapter's ordered content, as published by the content source.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ChapterDocument {
    pub id: String,
    pub title: String,
    pub sections: Vec<Section>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SectionKind {
    ChapterTitle,
    Heading,
    Paragraph,
    Figure,
    Table,
    Code,
    List,
    DefinitionList,
    Aside,
    Callout,
    #[serde(other)]
    Other,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct Caption {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Section {
    #[serde(rename = "type")]
    pub kind: SectionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default)]
    pub raw_html: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<Caption>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TocEntry {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct BookMetadata {
    pub title: String,
    #[serde(default)]
    pub total_chapters: Option<u32>,
    pub table_of_contents: Vec<TocEntry>,
}

fn malformed(resource: &str, reason: impl Into<String>) -> FetchError {
    FetchError::MalformedPayload {
        resource: resource.to_string(),
        reason: reason.into(),
    }
}

fn non_empty_str<'a>(value: &'a Value, field: &str) -> Option<&'a str> {
    value
        .get(field)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
}

/// Parses and validates a chapter payload. `id`, `title`, and a `sections`
/// array are required; anything else is carried through.
pub fn parse_chapter_document(resource: &str, bytes: &[u8]) -> Result<ChapterDocument, FetchError> {
    let value: Value =
        serde_json::from_slice(bytes).map_err(|e| malformed(resource, e.to_string()))?;
    if non_empty_str(&value, "id").is_none() {
        return Err(malformed(resource, "missing id"));
    }
    if non_empty_str(&value, "title").is_none() {
        return Err(malformed(resource, "missing title"));
    }
    if !value.get("sections").is_some_and(Value::is_array) {
        return Err(malformed(resource, "sections is not an array"));
    }
    serde_json::from_value(value).map_err(|e| malformed(resource, e.to_string()))
}

pub fn parse_book_metadata(resource: &str, bytes: &[u8]) -> Result<BookMetadata, FetchError> {
    let value: Value =
        serde_json::from_slice(bytes).map_err(|e| malformed(resource, e.to_string()))?;
    if non_empty_str(&value, "title").is_none() {
        return Err(malformed(resource, "missing title"));
    }
    if !value.get("table_of_contents").is_some_and(Value::is_array) {
        return Err(malformed(resource, "table_of_contents is not an array"));
    }
    serde_json::from_value(value).map_err(|e| malformed(resource, e.to_string()))
}

/// `ch07` -> 7. Ids outside the `chNN` scheme have no number.
pub fn chapter_number(chapter_id: &str) -> Option<u32> {
    chapter_id.strip_prefix("ch")?.parse().ok()
}

pub fn chapter_id(number: u32) -> String {
    format!("ch{:02}", number)
}

/// Neighbors of `chapter_id` inside `1..=total`.
pub fn adjacent_chapter_ids(chapter_id: &str, total: u32) -> Vec<String> {
    let Some(number) = chapter_number(chapter_id) else {
        return Vec::new();
    };
    [number.checked_sub(1), number.checked_add(1)]
        .into_iter()
        .flatten()
        .filter(|n| (1..=total).contains(n))
        .map(self::chapter_id)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chapter_ids_round_trip_through_numbers() {
        assert_eq!(chapter_number("ch03"), Some(3));
        assert_eq!(chapter_number("ch10"), Some(10));
        assert_eq!(chapter_number("intro"), None);
        assert_eq!(chapter_id(4), "ch04");
    }

    #[test]
    fn adjacent_ids_stay_in_range() {
        assert_eq!(adjacent_chapter_ids("ch05", 10), vec!["ch04", "ch06"]);
        assert_eq!(adjacent_chapter_ids("ch01", 10), vec!["ch02"]);
        assert_eq!(adjacent_chapter_ids("ch10", 10), vec!["ch09"]);
        assert!(adjacent_chapter_ids("ch01", 1).is_empty());
        assert!(adjacent_chapter_ids("appendix", 10).is_empty());
    }

    #[test]
    fn unknown_section_types_are_kept() {
        let doc = parse_chapter_document(
            "ch01",
            br#"{"id":"ch01","title":"One","sections":[{"type":"sidebar","raw_html":"<p>x</p>","word_count":1}]}"#,
        )
        .unwrap();
        assert_eq!(doc.sections[0].kind, SectionKind::Other);
        assert_eq!(doc.sections[0].extra.get("word_count"), Some(&Value::from(1)));
    }

    #[test]
    fn missing_fields_are_malformed() {
        for raw in [
            r#"{"title":"One","sections":[]}"#,
            r#"{"id":"ch01","sections":[]}"#,
            r#"{"id":"ch01","title":"One","sections":{}}"#,
            "not json",
        ] {
            let err = parse_chapter_document("ch01", raw.as_bytes()).unwrap_err();
            assert!(matches!(err, FetchError::MalformedPayload { .. }), "{raw}");
        }
    }

    #[test]
    fn metadata_requires_table_of_contents() {
        let err = parse_book_metadata("meta", br#"{"title":"Book"}"#).unwrap_err();
        assert!(matches!(err, FetchError::MalformedPayload { .. }));
        let meta = parse_book_metadata(
            "meta",
            br#"{"title":"Book","total_chapters":10,"table_of_contents":[{"id":"ch01","title":"Intro"}]}"#,
        )
        .unwrap();
        assert_eq!(meta.total_chapters, Some(10));
        assert_eq!(meta.table_of_contents[0].title, "Intro");
    }
}
