//! Per-strategy reports for search and record lookups
//!
//! Each strategy is run on its own, regardless of what the others return,
//! so the report shows which endpoints and kinds a platform supports.

use serde::Serialize;

use super::client::SEARCH_PATH;
use super::records::RecordStrategy;
use super::search::fallback_queries;
use super::{ApiError, OsduClient};
use crate::models::SearchQuery;

#[derive(Debug, Clone, Serialize)]
pub struct StrategyOutcome {
    pub name: &'static str,
    pub method: &'static str,
    pub path: &'static str,
    /// Kind or query for searches, record id for lookups.
    pub target: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct StrategySummary {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct StrategyReport {
    pub strategies: Vec<StrategyOutcome>,
    pub summary: StrategySummary,
}

impl StrategyReport {
    fn new(strategies: Vec<StrategyOutcome>) -> Self {
        let successful = strategies.iter().filter(|s| s.success).count();
        let summary = StrategySummary {
            total: strategies.len(),
            successful,
            failed: strategies.len() - successful,
        };
        Self {
            strategies,
            summary,
        }
    }
}

impl OsduClient {
    /// Run every search strategy for an entity with a one-record page, plus
    /// a general `*` query.
    ///
    /// Upstream failures are recorded in the report. A failure to obtain a
    /// token is returned, since no strategy could run without one.
    pub async fn diagnose_search(
        &self,
        domain: &str,
        entity: &str,
    ) -> Result<StrategyReport, ApiError> {
        let entity_def = self.resolve_entity(domain, entity)?;
        let returned = Some(vec!["id".to_string(), "kind".to_string()]);

        let mut queries = vec![(
            "primary kind",
            SearchQuery::by_kind(&entity_def.kind, 1, 0, returned.clone()),
        )];
        for query in fallback_queries(entity_def, 1, 0, &returned) {
            let name = if query.kind.is_some() {
                "alternative kind"
            } else {
                "text query"
            };
            queries.push((name, query));
        }
        queries.push(("general query", SearchQuery::by_query("*", 5, 0, None)));

        let mut outcomes = Vec::with_capacity(queries.len());
        for (name, query) in queries {
            let result = self.search(&query).await;
            let (success, error, count) = match result {
                Ok(resp) => (true, None, resp.results.len()),
                Err(e @ ApiError::Auth(_)) => return Err(e),
                Err(e) => (false, Some(e.to_string()), 0),
            };
            outcomes.push(StrategyOutcome {
                name,
                method: "POST",
                path: SEARCH_PATH,
                target: query.label().to_string(),
                success,
                error,
                count,
            });
        }

        let report = StrategyReport::new(outcomes);
        tracing::info!(
            "Search strategies for {}/{}: {} of {} succeeded",
            domain,
            entity,
            report.summary.successful,
            report.summary.total
        );
        Ok(report)
    }

    /// Run every record lookup strategy for `id`. A strategy that answers
    /// "no such record" counts as a success with a count of zero.
    pub async fn diagnose_record(&self, id: &str) -> Result<StrategyReport, ApiError> {
        let id = id.trim();
        if id.is_empty() {
            return Err(ApiError::RecordNotFound(String::new()));
        }

        let mut outcomes = Vec::with_capacity(RecordStrategy::ALL.len());
        for strategy in RecordStrategy::ALL {
            let (success, error, count) = match self.run_record_strategy(strategy, id).await {
                Ok(found) => (true, None, usize::from(found.is_some())),
                Err(e @ ApiError::Auth(_)) => return Err(e),
                Err(e) => (false, Some(e.to_string()), 0),
            };
            outcomes.push(StrategyOutcome {
                name: strategy.name(),
                method: strategy.method(),
                path: strategy.path(),
                target: id.to_string(),
                success,
                error,
                count,
            });
        }

        let report = StrategyReport::new(outcomes);
        tracing::info!(
            "Record strategies for {}: {} of {} succeeded",
            id,
            report.summary.successful,
            report.summary.total
        );
        Ok(report)
    }
}
