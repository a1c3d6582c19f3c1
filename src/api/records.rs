//! Single record lookup

use super::client::SEARCH_PATH;
use super::{ApiError, OsduClient};
use crate::models::{Record, RecordIdsQuery, RecordsQuery, RecordsResponse, SearchQuery};

const RECORDS_PATH: &str = "/api/storage/v2/records";
const QUERY_RECORDS_PATH: &str = "/api/storage/v2/query/records";

/// Ways of looking up one record, in the order they are tried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum RecordStrategy {
    /// `GET /api/storage/v2/records/{id}`
    StorageGet,
    /// `POST /api/storage/v2/records` with `recordIds`
    StorageBatch,
    /// `POST /api/storage/v2/query/records` with `records`
    StorageQuery,
    /// Search for `id:"<id>"`
    IdSearch,
}

impl RecordStrategy {
    pub(super) const ALL: [RecordStrategy; 4] = [
        RecordStrategy::StorageGet,
        RecordStrategy::StorageBatch,
        RecordStrategy::StorageQuery,
        RecordStrategy::IdSearch,
    ];

    pub(super) fn name(self) -> &'static str {
        match self {
            RecordStrategy::StorageGet => "storage get",
            RecordStrategy::StorageBatch => "storage batch",
            RecordStrategy::StorageQuery => "storage query",
            RecordStrategy::IdSearch => "id search",
        }
    }

    pub(super) fn method(self) -> &'static str {
        match self {
            RecordStrategy::StorageGet => "GET",
            _ => "POST",
        }
    }

    pub(super) fn path(self) -> &'static str {
        match self {
            RecordStrategy::StorageGet | RecordStrategy::StorageBatch => RECORDS_PATH,
            RecordStrategy::StorageQuery => QUERY_RECORDS_PATH,
            RecordStrategy::IdSearch => SEARCH_PATH,
        }
    }
}

impl OsduClient {
    /// Fetch one record by id.
    ///
    /// Walks [`RecordStrategy::ALL`] until one yields the record.
    /// Authentication failures are returned as-is.
    pub async fn get_record(&self, id: &str) -> Result<Record, ApiError> {
        let id = id.trim();
        if id.is_empty() {
            return Err(ApiError::RecordNotFound(String::new()));
        }

        let mut not_found = false;
        let mut first_error = None;
        for strategy in RecordStrategy::ALL {
            match self.run_record_strategy(strategy, id).await {
                Ok(Some(record)) => return Ok(record),
                Ok(None) => {
                    tracing::debug!("Record {} not found via {}", id, strategy.name());
                    not_found = true;
                }
                Err(e) if e.is_auth_failure() => return Err(e),
                Err(e) => {
                    tracing::warn!("Record lookup for {} via {} failed: {}", id, strategy.name(), e);
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) if !not_found => Err(e),
            _ => Err(ApiError::RecordNotFound(id.to_string())),
        }
    }

    /// Run a single lookup. `Ok(None)` means the service answered that it
    /// has no such record.
    pub(super) async fn run_record_strategy(
        &self,
        strategy: RecordStrategy,
        id: &str,
    ) -> Result<Option<Record>, ApiError> {
        match strategy {
            RecordStrategy::StorageGet => {
                let url = self.url_with_segment(RECORDS_PATH, id)?;
                match self.get_json(&url).await {
                    Ok(record) => Ok(Some(record)),
                    Err(ApiError::Upstream { status: 404, .. }) => Ok(None),
                    Err(e) => Err(e),
                }
            }
            RecordStrategy::StorageBatch => {
                let url = self.url(RECORDS_PATH)?;
                let body = RecordIdsQuery { record_ids: vec![id] };
                let resp: RecordsResponse = self.post_json(&url, &body).await?;
                Ok(take_record(resp, id))
            }
            RecordStrategy::StorageQuery => {
                let url = self.url(QUERY_RECORDS_PATH)?;
                let body = RecordsQuery { records: vec![id] };
                let resp: RecordsResponse = self.post_json(&url, &body).await?;
                Ok(take_record(resp, id))
            }
            RecordStrategy::IdSearch => {
                let query = SearchQuery::by_query(&id_query(id), 1, 0, None);
                let resp = self.search(&query).await?;
                Ok(resp.results.into_iter().next())
            }
        }
    }
}

fn take_record(resp: RecordsResponse, id: &str) -> Option<Record> {
    if !resp.invalid_records.is_empty() {
        tracing::debug!("Storage reports invalid records: {:?}", resp.invalid_records);
    }
    if !resp.retry_records.is_empty() {
        tracing::warn!("Storage asks to retry records: {:?}", resp.retry_records);
    }
    resp.records.into_iter().find(|r| r.id == id)
}

/// Exact-match search on the record id.
fn id_query(id: &str) -> String {
    let escaped = id.replace('\\', "\\\\").replace('"', "\\\"");
    format!("id:\"{}\"", escaped)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::api::client::tests::client_for;
    use crate::auth::testing::ScriptedEndpoint;
    use httpmock::prelude::*;
    use serde_json::json;

    const ID: &str = "opendes:master-data--Well:1001";

    #[test]
    fn test_id_query_quotes_and_escapes() {
        assert_eq!(id_query(ID), r#"id:"opendes:master-data--Well:1001""#);
        assert_eq!(id_query(r#"a"b\c"#), r#"id:"a\"b\\c""#);
    }

    #[tokio::test]
    async fn test_get_record_direct() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path(format!("/api/storage/v2/records/{}", ID))
                .header("data-partition-id", "opendes");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({"id": ID, "kind": "osdu:wks:master-data--Well:1.0.0", "version": 3}));
        });

        let endpoint = Arc::new(ScriptedEndpoint::new());
        let client = client_for(&server, &endpoint);
        let record = client.get_record(ID).await.unwrap();

        mock.assert();
        assert_eq!(record.id, ID);
        assert_eq!(record.extra["version"], 3);
    }

    #[tokio::test]
    async fn test_get_record_falls_back_to_storage_query() {
        let server = MockServer::start();
        let direct = server.mock(|when, then| {
            when.method(GET).path(format!("/api/storage/v2/records/{}", ID));
            then.status(500).body("storage unavailable");
        });
        let query = server.mock(|when, then| {
            when.method(POST)
                .path("/api/storage/v2/query/records")
                .json_body(json!({"records": [ID]}));
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({"records": [{"id": ID}], "invalidRecords": []}));
        });

        let endpoint = Arc::new(ScriptedEndpoint::new());
        let client = client_for(&server, &endpoint);
        let record = client.get_record(ID).await.unwrap();

        direct.assert();
        query.assert();
        assert_eq!(record.id, ID);
    }

    #[tokio::test]
    async fn test_get_record_falls_back_to_storage_batch() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path(format!("/api/storage/v2/records/{}", ID));
            then.status(503);
        });
        let batch = server.mock(|when, then| {
            when.method(POST)
                .path("/api/storage/v2/records")
                .json_body(json!({"recordIds": [ID]}));
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({"records": [{"id": ID, "kind": "osdu:wks:master-data--Well:1.0.0"}]}));
        });
        let query = server.mock(|when, then| {
            when.method(POST).path("/api/storage/v2/query/records");
            then.status(200);
        });

        let endpoint = Arc::new(ScriptedEndpoint::new());
        let client = client_for(&server, &endpoint);
        let record = client.get_record(ID).await.unwrap();

        batch.assert();
        assert_eq!(query.calls(), 0);
        assert_eq!(record.kind.as_deref(), Some("osdu:wks:master-data--Well:1.0.0"));
    }

    #[tokio::test]
    async fn test_storage_query_skips_retry_records() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/api/storage/v2/query/records");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({"records": [], "retryRecords": [ID]}));
        });

        let endpoint = Arc::new(ScriptedEndpoint::new());
        let client = client_for(&server, &endpoint);
        let found = client
            .run_record_strategy(RecordStrategy::StorageQuery, ID)
            .await
            .unwrap();

        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_get_record_falls_back_to_search() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path(format!("/api/storage/v2/records/{}", ID));
            then.status(404);
        });
        server.mock(|when, then| {
            when.method(POST).path("/api/storage/v2/query/records");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({"records": [], "invalidRecords": [ID]}));
        });
        let search = server.mock(|when, then| {
            when.method(POST)
                .path("/api/search/v2/query")
                .json_body(json!({"query": format!("id:\"{}\"", ID), "limit": 1, "offset": 0}));
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({"results": [{"id": ID}], "totalCount": 1}));
        });

        let endpoint = Arc::new(ScriptedEndpoint::new());
        let client = client_for(&server, &endpoint);
        let record = client.get_record(ID).await.unwrap();

        search.assert();
        assert_eq!(record.id, ID);
    }

    #[tokio::test]
    async fn test_get_record_not_found() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path(format!("/api/storage/v2/records/{}", ID));
            then.status(404);
        });
        server.mock(|when, then| {
            when.method(POST).path("/api/storage/v2/query/records");
            then.status(200)
                .header("content-type", "application/json")
                .body(r#"{"records":[]}"#);
        });
        server.mock(|when, then| {
            when.method(POST).path("/api/search/v2/query");
            then.status(200)
                .header("content-type", "application/json")
                .body(r#"{"results":[]}"#);
        });

        let endpoint = Arc::new(ScriptedEndpoint::new());
        let client = client_for(&server, &endpoint);
        let err = client.get_record(ID).await.unwrap_err();

        assert!(matches!(err, ApiError::RecordNotFound(ref id) if id == ID), "{err:?}");
    }

    #[tokio::test]
    async fn test_get_record_reports_direct_failure_when_nothing_answers() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.any_request();
            then.status(502).body("gateway down");
        });

        let endpoint = Arc::new(ScriptedEndpoint::new());
        let client = client_for(&server, &endpoint);
        let err = client.get_record(ID).await.unwrap_err();

        match err {
            ApiError::Upstream { status, url, .. } => {
                assert_eq!(status, 502);
                assert!(url.ends_with("/api/storage/v2/records/opendes:master-data--Well:1001"));
            }
            other => panic!("expected Upstream, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_get_record_blank_id() {
        let server = MockServer::start();
        let endpoint = Arc::new(ScriptedEndpoint::new());
        let client = client_for(&server, &endpoint);

        let err = client.get_record("  ").await.unwrap_err();
        assert!(matches!(err, ApiError::RecordNotFound(_)));
        assert_eq!(endpoint.calls(), 0);
    }
}
