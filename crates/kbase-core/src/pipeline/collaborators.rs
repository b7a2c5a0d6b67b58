//! # Pipeline Collaborators
//!
//! External services the pipeline delegates to. Implementations report
//! their own failures as `ResolutionFailure`.

use crate::carrier::{KnowledgeCarrier, ParsingLevel};
use crate::{Bindings, KbError, Params, Pointer, Representation, ResourceId};
use std::sync::Arc;

/// Multi-language parser: moves carriers between parsing levels.
pub trait MultiParser: Send + Sync {
    /// Lift `carrier` up to `level`, optionally constrained to `accept`.
    fn lift(
        &self,
        carrier: &KnowledgeCarrier,
        level: ParsingLevel,
        accept: Option<&Representation>,
    ) -> Result<KnowledgeCarrier, KbError>;

    /// Lower `carrier` down to `level` (serialization).
    fn lower(
        &self,
        carrier: &KnowledgeCarrier,
        level: ParsingLevel,
        accept: Option<&Representation>,
    ) -> Result<KnowledgeCarrier, KbError> {
        let _ = (accept, level);
        Err(KbError::Unsupported(format!(
            "lowering artifact {}",
            carrier.asset_id
        )))
    }
}

/// Translates carriers between representation languages.
pub trait Translator: Send + Sync {
    fn transrepresent(
        &self,
        carrier: &KnowledgeCarrier,
        target: &Representation,
        params: &Params,
    ) -> Result<KnowledgeCarrier, KbError>;
}

/// Resolves data-shape bindings for a context carrier.
pub trait QueryResolver: Send + Sync {
    fn ask_query(
        &self,
        scope: &str,
        topic: &str,
        context: &KnowledgeCarrier,
        params: &Params,
    ) -> Result<Vec<Bindings>, KbError>;
}

/// Builds the pivot selection query over a set of vocabulary namespaces.
pub trait QueryLibrary: Send + Sync {
    fn pivot_query(&self, vocabularies: &[String]) -> Result<KnowledgeCarrier, KbError>;
}

/// One catalog listing: the asset pointer and its secondary identifiers.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogEntry {
    pub pointer: Pointer,
    pub secondary_ids: Vec<String>,
}

impl CatalogEntry {
    #[must_use]
    pub fn new(pointer: Pointer) -> Self {
        Self {
            pointer,
            secondary_ids: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_secondary_id(mut self, id: impl Into<String>) -> Self {
        self.secondary_ids.push(id.into());
        self
    }

    /// True when any secondary id lives under one of `namespaces`.
    #[must_use]
    pub fn in_namespaces(&self, namespaces: &[String]) -> bool {
        self.secondary_ids
            .iter()
            .any(|id| namespaces.iter().any(|ns| id.starts_with(ns.as_str())))
    }
}

/// Asset catalog.
pub trait Catalog: Send + Sync {
    fn list_assets_by_type(&self, asset_type: &str) -> Result<Vec<CatalogEntry>, KbError>;

    fn get_canonical_carrier(&self, asset_id: &ResourceId) -> Result<KnowledgeCarrier, KbError>;

    /// The composite rooted at `root_id`, as assembled by the catalog itself.
    fn get_composite(&self, root_id: &ResourceId) -> Result<KnowledgeCarrier, KbError> {
        Err(KbError::Unsupported(format!(
            "catalog composite for {root_id}"
        )))
    }

    /// Direct dependencies of `asset_id`.
    fn dependencies(&self, asset_id: &ResourceId) -> Result<Vec<ResourceId>, KbError> {
        Err(KbError::Unsupported(format!(
            "dependency listing for {asset_id}"
        )))
    }
}

/// The external services wired into one pipeline.
#[derive(Clone)]
pub struct Collaborators {
    pub parser: Arc<dyn MultiParser>,
    pub translator: Arc<dyn Translator>,
    pub resolver: Arc<dyn QueryResolver>,
    pub queries: Arc<dyn QueryLibrary>,
    pub catalog: Arc<dyn Catalog>,
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::DEFAULT_NAMESPACE;

    #[test]
    fn namespace_membership_uses_secondary_ids() {
        let entry = CatalogEntry::new(Pointer::to(ResourceId::random(DEFAULT_NAMESPACE, "1")))
            .with_secondary_id("http://snomed.info/id/123")
            .with_secondary_id("urn:local:9");

        assert!(entry.in_namespaces(&["http://snomed.info/".to_string()]));
        assert!(!entry.in_namespaces(&["http://loinc.org/".to_string()]));
        assert!(!entry.in_namespaces(&[]));
    }
}
