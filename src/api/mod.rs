//! API client module for the OSDU search and storage services

pub mod client;
mod diagnostics;
mod error;
mod records;
mod search;

use anyhow::Result;

pub use client::OsduClient;
pub use diagnostics::StrategyReport;
pub use error::ApiError;

use crate::catalog::Catalog;
use crate::models::{FieldSelection, Record};

/// List catalog domains and their entities (prints to stdout).
pub fn list_domains(catalog: &Catalog) {
    println!("\nDomains:");
    println!("{:-<60}", "");

    for domain in &catalog.domains {
        println!("{} ({} entities)", domain.name, domain.entities.len());
        for entity in &domain.entities {
            println!("  {:<30} {}", entity.name, entity.kind);
        }
        println!();
    }
}

/// List one page of records for an entity (prints to stdout).
pub async fn list_records(
    client: &OsduClient,
    domain: &str,
    entity: &str,
    limit: Option<u32>,
    offset: u32,
    fields: &FieldSelection,
    json: bool,
) -> Result<()> {
    let page = client
        .list_records(domain, entity, limit, offset, fields)
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&page)?);
        return Ok(());
    }

    println!("\n{} / {} ({})", domain, entity, page.kind);
    println!("{:-<60}", "");

    if page.results.is_empty() {
        println!("  (no records found)");
        return Ok(());
    }

    for record in &page.results {
        println!("{}", record.id);
        if let Some(summary) = summarize(record) {
            println!("  {}", summary);
        }
    }

    let shown = page.offset as usize + page.results.len();
    match page.total_count {
        Some(total) => println!("\nShowing {}-{} of {}", page.offset + 1, shown, total),
        None => println!("\nShowing {}-{}", page.offset + 1, shown),
    }
    Ok(())
}

/// Fetch a record and print it as JSON.
pub async fn show_record(client: &OsduClient, id: &str) -> Result<()> {
    let record = client.get_record(id).await?;
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}

/// First few scalar data members, `Name=value` style.
fn summarize(record: &Record) -> Option<String> {
    let data = record.data.as_ref()?.as_object()?;
    let parts: Vec<String> = data
        .iter()
        .filter_map(|(key, value)| match value {
            serde_json::Value::String(s) => Some(format!("{}={}", key, s)),
            serde_json::Value::Number(n) => Some(format!("{}={}", key, n)),
            serde_json::Value::Bool(b) => Some(format!("{}={}", key, b)),
            _ => None,
        })
        .take(4)
        .collect();
    (!parts.is_empty()).then(|| parts.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_summarize_keeps_scalars() {
        let record: Record = serde_json::from_value(json!({
            "id": "w-1",
            "data": {
                "FacilityName": "Volve F-11",
                "Depth": 3100.5,
                "Active": true,
                "Geo": {"lat": 58.4},
                "Tags": ["a"]
            }
        }))
        .unwrap();

        let summary = summarize(&record).unwrap();
        assert!(summary.contains("FacilityName=Volve F-11"));
        assert!(summary.contains("Depth=3100.5"));
        assert!(summary.contains("Active=true"));
        assert!(!summary.contains("Geo"));
    }

    #[test]
    fn test_summarize_without_data() {
        let record: Record = serde_json::from_value(json!({"id": "w-1"})).unwrap();
        assert!(summarize(&record).is_none());

        let record: Record =
            serde_json::from_value(json!({"id": "w-1", "data": {"Nested": {}}})).unwrap();
        assert!(summarize(&record).is_none());
    }
}
