//! # Knowledge Base Store
//!
//! Holds versioned Knowledge Bases in a concurrent map keyed by
//! (tag, version-tag).
//!
//! - A version is created once (`init`, `populate` on an empty version, or
//!   `next_version`) and its committed manifestation is never edited in place.
//! - `next_version` copies the manifestation by reference (`Arc`), so forks
//!   are cheap and share content until one of them commits a new carrier.
//! - Two callers forking the same base each get their own version tag: there
//!   is no compare-and-swap, lineages simply diverge.
//! - A series is every version sharing one tag; it is recovered by scanning.

use crate::carrier::{Aggregation, Composite, KnowledgeCarrier};
use crate::primitives::{DEFAULT_NAMESPACE, INITIAL_VERSION};
use crate::{KbError, Pointer, ResourceId, VersionKey};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;
use uuid::Uuid;

// =============================================================================
// CANONICAL ARTIFACT RESOLUTION
// =============================================================================

/// Resolves the canonical artifact of an asset, used by `init`.
pub trait ArtifactResolver: Send + Sync {
    fn resolve_canonical_artifact(
        &self,
        asset_id: &ResourceId,
        artifact_id: &ResourceId,
    ) -> Result<KnowledgeCarrier, KbError>;
}

// =============================================================================
// KNOWLEDGE BASE
// =============================================================================

/// One version of a Knowledge Base.
///
/// Remote when its manifestation carries a non-local locator; the endpoint
/// is then taken from that locator and the carrier is kept as well.
#[derive(Debug, Clone, PartialEq)]
pub struct KnowledgeBase {
    id: ResourceId,
    manifestation: Option<Arc<KnowledgeCarrier>>,
    endpoint: Option<String>,
}

impl KnowledgeBase {
    /// An empty, local Knowledge Base.
    #[must_use]
    pub fn new(id: ResourceId) -> Self {
        Self {
            id,
            manifestation: None,
            endpoint: None,
        }
    }

    /// Attach a manifestation, configuring the base as local or remote from
    /// the carrier's locator.
    #[must_use]
    pub fn with_manifestation(mut self, carrier: KnowledgeCarrier) -> Self {
        self.attach(carrier);
        self
    }

    fn attach(&mut self, carrier: KnowledgeCarrier) {
        self.endpoint = if carrier.is_local() {
            None
        } else {
            carrier.locator.clone()
        };
        self.manifestation = Some(Arc::new(carrier));
    }

    #[must_use]
    pub fn id(&self) -> &ResourceId {
        &self.id
    }

    #[must_use]
    pub fn manifestation(&self) -> Option<&KnowledgeCarrier> {
        self.manifestation.as_deref()
    }

    /// The manifestation, or `NotFound` when the version is empty.
    pub fn require_manifestation(&self) -> Result<&KnowledgeCarrier, KbError> {
        self.manifestation().ok_or_else(|| {
            KbError::NotFound(format!("manifestation of knowledge base {}", self.id))
        })
    }

    #[must_use]
    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref()
    }

    #[must_use]
    pub fn is_local(&self) -> bool {
        self.endpoint.is_none()
    }

    #[must_use]
    pub fn pointer(&self) -> Pointer {
        let pointer = Pointer::to(self.id.clone());
        match &self.endpoint {
            Some(endpoint) => pointer.with_href(endpoint.clone()),
            None => pointer,
        }
    }

    /// True when both bases share the very same manifestation allocation.
    #[must_use]
    pub fn shares_manifestation(&self, other: &KnowledgeBase) -> bool {
        match (&self.manifestation, &other.manifestation) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

// =============================================================================
// STORE
// =============================================================================

/// Thread-safe, in-memory versioned Knowledge Base store.
pub struct KnowledgeBaseStore {
    versions: DashMap<VersionKey, KnowledgeBase>,
    namespace: String,
    resolver: Option<Arc<dyn ArtifactResolver>>,
}

impl Default for KnowledgeBaseStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for KnowledgeBaseStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KnowledgeBaseStore")
            .field("namespace", &self.namespace)
            .field("versions", &self.versions.len())
            .field("resolver", &self.resolver.is_some())
            .finish()
    }
}

impl KnowledgeBaseStore {
    /// Create an empty store minting ids in the default namespace.
    #[must_use]
    pub fn new() -> Self {
        Self::with_namespace(DEFAULT_NAMESPACE)
    }

    #[must_use]
    pub fn with_namespace(namespace: impl Into<String>) -> Self {
        Self {
            versions: DashMap::new(),
            namespace: namespace.into(),
            resolver: None,
        }
    }

    /// Use `resolver` to fetch canonical artifacts during `init`.
    #[must_use]
    pub fn with_resolver(mut self, resolver: Arc<dyn ArtifactResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Identifier for `(tag, version)` in this store's namespace.
    #[must_use]
    pub fn id_for(&self, tag: Uuid, version: impl Into<String>) -> ResourceId {
        ResourceId::new(self.namespace.clone(), tag, version)
    }

    /// Number of stored versions across all series.
    #[must_use]
    pub fn len(&self) -> usize {
        self.versions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    // =========================================================================
    // CREATION
    // =========================================================================

    /// Create a Knowledge Base.
    ///
    /// Without a carrier: a random tag at version "0", empty.
    /// With a carrier: keyed by the carrier's asset id. If the carrier has no
    /// inline expression but names an artifact, the canonical artifact is
    /// resolved first; a failed resolution leaves the version empty.
    ///
    /// Resolution runs before the version is claimed, so the version only
    /// becomes visible together with its manifestation and no concurrent
    /// `populate` can land in between.
    pub fn init(&self, carrier: Option<KnowledgeCarrier>) -> Result<Pointer, KbError> {
        let Some(carrier) = carrier else {
            let id = ResourceId::random(self.namespace.clone(), INITIAL_VERSION);
            self.versions
                .insert(id.composite_key(), KnowledgeBase::new(id.clone()));
            tracing::debug!(kbase = %id, "initialized empty knowledge base");
            return Ok(Pointer::to(id));
        };

        let id = carrier.asset_id.clone();
        if self.versions.contains_key(&id.composite_key()) {
            return Err(KbError::AlreadyInitialized(id));
        }

        let manifestation = match (&carrier.artifact_id, &self.resolver) {
            (Some(artifact_id), Some(resolver)) if !carrier.has_expression() => {
                match resolver.resolve_canonical_artifact(&id, artifact_id) {
                    Ok(resolved) => Some(resolved),
                    Err(e) => {
                        tracing::warn!(
                            kbase = %id,
                            error = %e,
                            "canonical artifact resolution failed, keeping empty knowledge base"
                        );
                        None
                    }
                }
            }
            _ => Some(carrier),
        };

        let kb = match manifestation {
            Some(m) => KnowledgeBase::new(id.clone()).with_manifestation(m),
            None => KnowledgeBase::new(id.clone()),
        };
        match self.versions.entry(id.composite_key()) {
            Entry::Occupied(_) => Err(KbError::AlreadyInitialized(id)),
            Entry::Vacant(slot) => {
                let pointer = kb.pointer();
                slot.insert(kb);
                tracing::debug!(kbase = %id, "initialized knowledge base from carrier");
                Ok(pointer)
            }
        }
    }

    /// Add a carrier to an existing version.
    ///
    /// - empty version: the carrier becomes the manifestation
    /// - open composite (`Aggregation::None`): the carrier is appended
    /// - closed composite: `UnsupportedAggregation`
    /// - atomic manifestation: replaced by a uniform composite of both
    pub fn populate(&self, id: &ResourceId, carrier: KnowledgeCarrier) -> Result<Pointer, KbError> {
        let mut entry = self
            .versions
            .get_mut(&id.composite_key())
            .ok_or_else(|| KbError::missing_version(id))?;

        let next = match entry.manifestation() {
            None => carrier,
            Some(current) => match current.as_composite() {
                Some(composite) if composite.aggregation().accepts_components() => {
                    let mut extended = composite.clone();
                    extended.push(carrier)?;
                    current.with_composite(extended)
                }
                Some(composite) => {
                    return Err(KbError::UnsupportedAggregation(composite.aggregation()));
                }
                None => KnowledgeCarrier::composite(
                    ResourceId::random(self.namespace.clone(), INITIAL_VERSION),
                    current.representation.clone(),
                    Composite::new(Aggregation::Uniform)
                        .with_components(vec![current.clone(), carrier]),
                ),
            },
        };

        entry.attach(next);
        Ok(entry.pointer())
    }

    // =========================================================================
    // LOOKUP
    // =========================================================================

    pub fn get(&self, id: &ResourceId) -> Result<KnowledgeBase, KbError> {
        self.versions
            .get(&id.composite_key())
            .map(|kb| kb.value().clone())
            .ok_or_else(|| KbError::missing_version(id))
    }

    pub fn get_manifestation(&self, id: &ResourceId) -> Result<Arc<KnowledgeCarrier>, KbError> {
        let kb = self.get(id)?;
        kb.manifestation
            .ok_or_else(|| KbError::NotFound(format!("manifestation of knowledge base {}", id)))
    }

    /// The dependency structure of a composite manifestation.
    pub fn get_structure(&self, id: &ResourceId) -> Result<Option<KnowledgeCarrier>, KbError> {
        let manifestation = self.get_manifestation(id)?;
        Ok(manifestation.require_composite()?.structure().cloned())
    }

    /// Pointers to the asset ids of a composite manifestation's components.
    pub fn get_components(&self, id: &ResourceId) -> Result<Vec<Pointer>, KbError> {
        let manifestation = self.get_manifestation(id)?;
        Ok(manifestation
            .require_composite()?
            .components()
            .iter()
            .map(|c| Pointer::to(c.asset_id.clone()))
            .collect())
    }

    #[must_use]
    pub fn has_knowledge_base(&self, id: &ResourceId) -> bool {
        self.versions.contains_key(&id.composite_key())
    }

    /// Every version of the series `tag`, sorted by version tag.
    #[must_use]
    pub fn list_versions(&self, tag: Uuid) -> Vec<ResourceId> {
        let mut ids: Vec<ResourceId> = self
            .versions
            .iter()
            .filter(|entry| entry.key().tag == tag)
            .map(|entry| entry.value().id.clone())
            .collect();
        ids.sort_by(|a, b| a.version.cmp(&b.version));
        ids
    }

    // =========================================================================
    // VERSIONING
    // =========================================================================

    /// Replace a composite's structure and mark it as graph-aggregated.
    ///
    /// Atomic manifestations are left untouched.
    pub fn set_structure(
        &self,
        id: &ResourceId,
        structure: KnowledgeCarrier,
    ) -> Result<Pointer, KbError> {
        let mut entry = self
            .versions
            .get_mut(&id.composite_key())
            .ok_or_else(|| KbError::missing_version(id))?;

        let updated = match entry.manifestation().and_then(|m| {
            m.as_composite().map(|c| {
                m.with_composite(
                    c.clone()
                        .with_structure(Some(structure))
                        .with_aggregation(Aggregation::Graph),
                )
            })
        }) {
            Some(updated) => updated,
            None => return Ok(entry.pointer()),
        };

        entry.attach(updated);
        Ok(entry.pointer())
    }

    /// Fork `base` into a fresh version sharing its manifestation.
    pub fn next_version(&self, base: &ResourceId) -> Result<KnowledgeBase, KbError> {
        let current = self.get(base)?;
        let next = KnowledgeBase {
            id: base.with_version(Uuid::new_v4().to_string()),
            ..current
        };
        self.versions.insert(next.id.composite_key(), next.clone());
        tracing::debug!(base = %base, next = %next.id, "minted next version");
        Ok(next)
    }

    /// Set the manifestation of an existing version (commit).
    pub fn attach(&self, id: &ResourceId, carrier: KnowledgeCarrier) -> Result<Pointer, KbError> {
        let mut entry = self
            .versions
            .get_mut(&id.composite_key())
            .ok_or_else(|| KbError::missing_version(id))?;
        entry.attach(carrier);
        Ok(entry.pointer())
    }

    // =========================================================================
    // DELETION
    // =========================================================================

    /// Remove a version. Removing an absent version is a no-op.
    pub fn delete(&self, id: &ResourceId) {
        if self.versions.remove(&id.composite_key()).is_some() {
            tracing::debug!(kbase = %id, "deleted knowledge base version");
        }
    }

    /// Remove every version of the series `tag`. Returns how many were removed.
    pub fn delete_series(&self, tag: Uuid) -> usize {
        let before = self.versions.len();
        self.versions.retain(|key, _| key.tag != tag);
        let removed = before.saturating_sub(self.versions.len());
        tracing::debug!(%tag, removed, "deleted knowledge base series");
        removed
    }
}

// =============================================================================
// TESTS
// =============================================================================
