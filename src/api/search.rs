//! Record listing for catalog entities

use super::{ApiError, OsduClient};
use crate::catalog::Entity;
use crate::models::{FieldSelection, RecordPage, SearchQuery};

pub const DEFAULT_LIMIT: u32 = 50;
pub const MAX_LIMIT: u32 = 1000;

impl OsduClient {
    /// One page of records for a catalog entity.
    ///
    /// The entity's kind is tried first, then its alternative kinds, then
    /// free-text queries on the entity type. The first strategy that answers
    /// wins; if none does, the primary failure is returned. Authentication
    /// failures end the search immediately.
    pub async fn list_records(
        &self,
        domain: &str,
        entity: &str,
        limit: Option<u32>,
        offset: u32,
        fields: &FieldSelection,
    ) -> Result<RecordPage, ApiError> {
        let entity_def = self.resolve_entity(domain, entity)?;

        let limit = limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
        let returned = fields.returned_fields(&entity_def.fields);

        let primary = SearchQuery::by_kind(&entity_def.kind, limit, offset, returned.clone());
        let first_error = match self.search_page(&primary).await {
            Ok(page) => return Ok(page),
            Err(e) if e.is_auth_failure() => return Err(e),
            Err(e) => e,
        };
        tracing::warn!("Search for {} failed: {}", primary.label(), first_error);

        for query in fallback_queries(entity_def, limit, offset, &returned) {
            match self.search_page(&query).await {
                Ok(page) => {
                    tracing::info!("{}/{} answered by {}", domain, entity, query.label());
                    return Ok(page);
                }
                Err(e) if e.is_auth_failure() => return Err(e),
                Err(e) => tracing::warn!("Search for {} failed: {}", query.label(), e),
            }
        }

        Err(first_error)
    }

    pub(super) fn resolve_entity(&self, domain: &str, entity: &str) -> Result<&Entity, ApiError> {
        self.catalog()
            .domain(domain)
            .ok_or_else(|| ApiError::UnknownDomain(domain.to_string()))?
            .entity(entity)
            .ok_or_else(|| ApiError::UnknownEntity {
                domain: domain.to_string(),
                entity: entity.to_string(),
            })
    }

    async fn search_page(&self, query: &SearchQuery) -> Result<RecordPage, ApiError> {
        let resp = self.search(query).await?;
        Ok(RecordPage {
            kind: query.label().to_string(),
            results: resp.results,
            total_count: resp.total_count,
            limit: query.limit,
            offset: query.offset,
        })
    }
}

/// Alternative kinds, then `*Type*` and `kind:*Type*` queries.
pub(super) fn fallback_queries(
    entity: &Entity,
    limit: u32,
    offset: u32,
    returned: &Option<Vec<String>>,
) -> Vec<SearchQuery> {
    let mut queries: Vec<SearchQuery> = entity
        .candidate_kinds()
        .iter()
        .skip(1)
        .map(|kind| SearchQuery::by_kind(kind, limit, offset, returned.clone()))
        .collect();

    if let Some(type_name) = entity_type(&entity.kind) {
        queries.push(SearchQuery::by_query(
            &format!("*{}*", type_name),
            limit,
            offset,
            returned.clone(),
        ));
        queries.push(SearchQuery::by_query(
            &format!("kind:*{}*", type_name),
            limit,
            offset,
            returned.clone(),
        ));
    }
    queries
}

/// `Basin` from `osdu:wks:master-data--Basin:1.0.0`.
fn entity_type(kind: &str) -> Option<&str> {
    let (_, rest) = kind.rsplit_once("--")?;
    let name = rest.split(':').next().unwrap_or(rest);
    (!name.is_empty()).then_some(name)
}
