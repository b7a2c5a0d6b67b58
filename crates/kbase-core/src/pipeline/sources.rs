//! # Manifestation Sources
//!
//! How a pipeline obtains its initial composite. Three sources ship:
//!
//! - [`CallerComposite`]: the composite already stored under the caller's
//!   Knowledge Base
//! - [`CatalogComposite`]: a composite fetched from the catalog by root id
//! - [`DependencyAssembly`]: a composite built by walking the catalog's
//!   dependency graph from the root

use super::PipelineRequest;
use super::collaborators::Catalog;
use crate::carrier::{Aggregation, Composite, KnowledgeCarrier};
use crate::primitives::{
    COMPOSITE_LANGUAGE, INITIAL_VERSION, MAX_ASSEMBLED_COMPONENTS, STRUCTURE_LANGUAGE,
};
use crate::store::KnowledgeBaseStore;
use crate::{KbError, Representation, ResourceId, VersionKey};
use serde_json::json;
use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;

/// Produces the composite manifestation stage 0 starts from.
pub trait ManifestationSource: Send + Sync {
    fn acquire(
        &self,
        store: &KnowledgeBaseStore,
        request: &PipelineRequest,
    ) -> Result<KnowledgeCarrier, KbError>;
}

fn require_root(request: &PipelineRequest) -> Result<&ResourceId, KbError> {
    request
        .root_id
        .as_ref()
        .ok_or_else(|| KbError::NotFound("root asset id of pipeline request".into()))
}

// =============================================================================
// CALLER COMPOSITE
// =============================================================================

/// Reads the manifestation of the request's Knowledge Base.
#[derive(Debug, Clone, Copy, Default)]
pub struct CallerComposite;

impl ManifestationSource for CallerComposite {
    fn acquire(
        &self,
        store: &KnowledgeBaseStore,
        request: &PipelineRequest,
    ) -> Result<KnowledgeCarrier, KbError> {
        let kbase_id = request
            .kbase_id
            .as_ref()
            .ok_or_else(|| KbError::NotFound("knowledge base of pipeline request".into()))?;
        let manifestation = store.get_manifestation(kbase_id)?;
        manifestation.require_composite()?;
        Ok(manifestation.as_ref().clone())
    }
}

// =============================================================================
// CATALOG COMPOSITE
// =============================================================================

/// Fetches the composite rooted at the request's root id from a catalog.
#[derive(Clone)]
pub struct CatalogComposite {
    catalog: Arc<dyn Catalog>,
}

impl CatalogComposite {
    #[must_use]
    pub fn new(catalog: Arc<dyn Catalog>) -> Self {
        Self { catalog }
    }
}

impl ManifestationSource for CatalogComposite {
    fn acquire(
        &self,
        _store: &KnowledgeBaseStore,
        request: &PipelineRequest,
    ) -> Result<KnowledgeCarrier, KbError> {
        let root = require_root(request)?;
        let composite = self.catalog.get_composite(root)?;
        composite.require_composite()?;
        Ok(composite)
    }
}

// =============================================================================
// DEPENDENCY ASSEMBLY
// =============================================================================

/// Walks `Catalog::dependencies` breadth-first from the root, collecting each
/// asset's canonical carrier and recording every edge in a structure carrier.
#[derive(Clone)]
pub struct DependencyAssembly {
    catalog: Arc<dyn Catalog>,
}

impl DependencyAssembly {
    #[must_use]
    pub fn new(catalog: Arc<dyn Catalog>) -> Self {
        Self { catalog }
    }
}

impl ManifestationSource for DependencyAssembly {
    fn acquire(
        &self,
        _store: &KnowledgeBaseStore,
        request: &PipelineRequest,
    ) -> Result<KnowledgeCarrier, KbError> {
        let root = require_root(request)?;

        let mut seen: BTreeSet<VersionKey> = BTreeSet::new();
        let mut queue = VecDeque::new();
        let mut components = Vec::new();
        let mut edges = Vec::new();

        seen.insert(root.composite_key());
        queue.push_back(root.clone());

        while let Some(asset) = queue.pop_front() {
            if components.len() >= MAX_ASSEMBLED_COMPONENTS {
                return Err(KbError::ResolutionFailure(format!(
                    "dependency graph of {root} exceeds {MAX_ASSEMBLED_COMPONENTS} components"
                )));
            }
            components.push(self.catalog.get_canonical_carrier(&asset)?);

            for dependency in self.catalog.dependencies(&asset)? {
                edges.push(json!({
                    "from": asset.to_string(),
                    "to": dependency.to_string(),
                }));
                if seen.insert(dependency.composite_key()) {
                    queue.push_back(dependency);
                }
            }
        }

        tracing::debug!(
            root = %root,
            components = components.len(),
            edges = edges.len(),
            "assembled composite from dependency graph"
        );

        let structure = KnowledgeCarrier::from_parsed(
            ResourceId::random(root.namespace.clone(), INITIAL_VERSION),
            Representation::new(STRUCTURE_LANGUAGE),
            json!({ "root": root.to_string(), "edges": edges }),
        );

        Ok(KnowledgeCarrier::composite(
            ResourceId::random(root.namespace.clone(), INITIAL_VERSION),
            Representation::new(COMPOSITE_LANGUAGE),
            Composite::new(Aggregation::Mixed)
                .with_components(components)
                .with_structure(Some(structure))
                .with_root(Some(root.clone())),
        ))
    }
}
