//! Search and storage API wire types

use serde::{Deserialize, Serialize};

use super::Record;

/// Body of `POST /api/search/v2/query`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    pub limit: u32,
    pub offset: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub returned_fields: Option<Vec<String>>,
}

impl SearchQuery {
    pub fn by_kind(kind: &str, limit: u32, offset: u32, returned_fields: Option<Vec<String>>) -> Self {
        Self {
            kind: Some(kind.to_string()),
            query: None,
            limit,
            offset,
            returned_fields,
        }
    }

    pub fn by_query(query: &str, limit: u32, offset: u32, returned_fields: Option<Vec<String>>) -> Self {
        Self {
            kind: None,
            query: Some(query.to_string()),
            limit,
            offset,
            returned_fields,
        }
    }

    /// What produced the results, for display.
    pub fn label(&self) -> &str {
        self.kind
            .as_deref()
            .or(self.query.as_deref())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    #[serde(default)]
    pub results: Vec<Record>,
    #[serde(default)]
    pub total_count: Option<u64>,
}

/// Body of `POST /api/storage/v2/query/records`.
#[derive(Debug, Clone, Serialize)]
pub struct RecordsQuery<'a> {
    pub records: Vec<&'a str>,
}

/// Body of `POST /api/storage/v2/records`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordIdsQuery<'a> {
    pub record_ids: Vec<&'a str>,
}

/// Answer of both storage batch endpoints.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordsResponse {
    #[serde(default)]
    pub records: Vec<Record>,
    #[serde(default)]
    pub invalid_records: Vec<String>,
    #[serde(default)]
    pub retry_records: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_query_serialization() {
        let query = SearchQuery::by_kind(
            "osdu:wks:master-data--Well:*",
            50,
            100,
            Some(vec!["id".to_string(), "kind".to_string()]),
        );
        assert_eq!(
            serde_json::to_value(&query).unwrap(),
            serde_json::json!({
                "kind": "osdu:wks:master-data--Well:*",
                "limit": 50,
                "offset": 100,
                "returnedFields": ["id", "kind"]
            })
        );
        assert_eq!(query.label(), "osdu:wks:master-data--Well:*");
    }

    #[test]
    fn test_text_query_omits_kind_and_fields() {
        let query = SearchQuery::by_query("*Well*", 10, 0, None);
        assert_eq!(
            serde_json::to_value(&query).unwrap(),
            serde_json::json!({"query": "*Well*", "limit": 10, "offset": 0})
        );
        assert_eq!(query.label(), "*Well*");
    }

    #[test]
    fn test_search_response_tolerates_missing_members() {
        let resp: SearchResponse = serde_json::from_str("{}").unwrap();
        assert!(resp.results.is_empty());
        assert!(resp.total_count.is_none());

        let resp: SearchResponse =
            serde_json::from_str(r#"{"results":[{"id":"a"}],"totalCount":42}"#).unwrap();
        assert_eq!(resp.results.len(), 1);
        assert_eq!(resp.total_count, Some(42));
    }
}
