//! Record-related models

use std::convert::Infallible;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// OSDU record. Members other than `id`, `kind` and `data` (acl, legal,
/// version, ...) are preserved as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One page of search results.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordPage {
    /// The kind or query that produced these results.
    pub kind: String,
    pub results: Vec<Record>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_count: Option<u64>,
    pub limit: u32,
    pub offset: u32,
}

/// Which record members the search API should return.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum FieldSelection {
    /// `id`, `kind` and the whole `data` block.
    #[default]
    Basic,
    /// Everything the API has.
    All,
    /// `id`, `kind` and a single data field.
    Field(String),
}

impl FieldSelection {
    /// The `returnedFields` list, `None` meaning no restriction. A field the
    /// entity does not declare falls back to the basic selection.
    pub fn returned_fields(&self, known_fields: &[String]) -> Option<Vec<String>> {
        let basic = || vec!["id".to_string(), "kind".to_string(), "data".to_string()];
        match self {
            FieldSelection::All => None,
            FieldSelection::Basic => Some(basic()),
            FieldSelection::Field(name) if known_fields.iter().any(|f| f == name) => Some(vec![
                "id".to_string(),
                "kind".to_string(),
                format!("data.{}", name),
            ]),
            FieldSelection::Field(_) => Some(basic()),
        }
    }
}

impl FromStr for FieldSelection {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim() {
            "" | "basic" => FieldSelection::Basic,
            "all" => FieldSelection::All,
            field => FieldSelection::Field(field.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields() -> Vec<String> {
        vec!["BasinName".to_string(), "Country".to_string()]
    }

    #[test]
    fn test_field_selection_parse() {
        assert_eq!("".parse::<FieldSelection>().unwrap(), FieldSelection::Basic);
        assert_eq!("basic".parse::<FieldSelection>().unwrap(), FieldSelection::Basic);
        assert_eq!("all".parse::<FieldSelection>().unwrap(), FieldSelection::All);
        assert_eq!(
            "Country".parse::<FieldSelection>().unwrap(),
            FieldSelection::Field("Country".to_string())
        );
    }

    #[test]
    fn test_returned_fields() {
        assert_eq!(FieldSelection::All.returned_fields(&fields()), None);
        assert_eq!(
            FieldSelection::Basic.returned_fields(&fields()).unwrap(),
            vec!["id", "kind", "data"]
        );
        assert_eq!(
            FieldSelection::Field("Country".to_string())
                .returned_fields(&fields())
                .unwrap(),
            vec!["id", "kind", "data.Country"]
        );
        assert_eq!(
            FieldSelection::Field("Unknown".to_string())
                .returned_fields(&fields())
                .unwrap(),
            vec!["id", "kind", "data"]
        );
    }

    #[test]
    fn test_record_keeps_unknown_members() {
        let raw = serde_json::json!({
            "id": "osdu:master-data--Basin:1",
            "kind": "osdu:wks:master-data--Basin:1.0.0",
            "data": {"BasinName": "Cuu Long"},
            "version": 1712345,
            "acl": {"viewers": ["data.default.viewers@osdu.example.com"]}
        });

        let record: Record = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(record.id, "osdu:master-data--Basin:1");
        assert_eq!(record.extra["version"], 1712345);
        assert_eq!(serde_json::to_value(&record).unwrap(), raw);
    }
}
