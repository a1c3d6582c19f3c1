//! Domain and entity catalog
//!
//! Maps the names shown to users onto the OSDU kinds the search API
//! understands.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

const BUILTIN: &str = include_str!("builtin.toml");

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read catalog {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse catalog: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("catalog defines domain '{0}' more than once")]
    DuplicateDomain(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(rename = "domain", default)]
    pub domains: Vec<Domain>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Domain {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(rename = "entity", default)]
    pub entities: Vec<Entity>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub name: String,
    pub kind: String,
    /// Kinds tried, in order, when `kind` fails.
    #[serde(default)]
    pub kind_alternatives: Vec<String>,
    #[serde(default)]
    pub description: String,
    /// Data fields worth showing in a listing.
    #[serde(default)]
    pub fields: Vec<String>,
}

/// Entity hit from [`Catalog::search`].
#[derive(Debug, Clone, Serialize)]
pub struct EntityMatch<'a> {
    pub domain: &'a str,
    pub entity: &'a str,
    pub kind: &'a str,
    pub description: &'a str,
}

impl Catalog {
    pub fn builtin() -> Result<Self, CatalogError> {
        Self::parse(BUILTIN)
    }

    /// Load the catalog at `path`, or the built-in one.
    pub fn load(path: Option<&Path>) -> Result<Self, CatalogError> {
        match path {
            Some(path) => {
                let content = fs::read_to_string(path).map_err(|source| CatalogError::Io {
                    path: path.to_path_buf(),
                    source,
                })?;
                tracing::info!("Loaded catalog from {}", path.display());
                Self::parse(&content)
            }
            None => Self::builtin(),
        }
    }

    pub fn parse(content: &str) -> Result<Self, CatalogError> {
        let catalog: Catalog = toml::from_str(content)?;
        for (i, domain) in catalog.domains.iter().enumerate() {
            if catalog.domains[..i].iter().any(|d| d.name == domain.name) {
                return Err(CatalogError::DuplicateDomain(domain.name.clone()));
            }
        }
        Ok(catalog)
    }

    pub fn domain(&self, name: &str) -> Option<&Domain> {
        self.domains.iter().find(|d| d.name == name)
    }

    pub fn entity(&self, domain: &str, entity: &str) -> Option<&Entity> {
        self.domain(domain)?.entity(entity)
    }

    pub fn entity_count(&self) -> usize {
        self.domains.iter().map(|d| d.entities.len()).sum()
    }

    /// Case-insensitive match on entity names and descriptions.
    pub fn search(&self, term: &str) -> Vec<EntityMatch<'_>> {
        let needle = term.to_lowercase();
        self.domains
            .iter()
            .flat_map(|d| d.entities.iter().map(move |e| (d, e)))
            .filter(|(_, e)| {
                e.name.to_lowercase().contains(&needle)
                    || e.description.to_lowercase().contains(&needle)
            })
            .map(|(d, e)| EntityMatch {
                domain: &d.name,
                entity: &e.name,
                kind: &e.kind,
                description: &e.description,
            })
            .collect()
    }
}

impl Domain {
    pub fn entity(&self, name: &str) -> Option<&Entity> {
        self.entities.iter().find(|e| e.name == name)
    }
}

impl Entity {
    /// Kinds to search, primary first. Without explicit alternatives a
    /// well-known-schema kind falls back to its wellbore DDMS variant.
    pub fn candidate_kinds(&self) -> Vec<String> {
        let mut kinds = vec![self.kind.clone()];
        if self.kind_alternatives.is_empty() {
            if self.kind.contains(":wks:") {
                kinds.push(self.kind.replacen(":wks:", ":ddms-wellbore:", 1));
            }
        } else {
            kinds.extend(self.kind_alternatives.iter().cloned());
        }
        kinds
    }
}
