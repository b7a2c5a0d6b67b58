//! # Operator Dispatcher
//!
//! Copy-on-write versioning around operator invocation:
//!
//! 1. Resolve the operator (named dispatch fails with `Unsupported` before
//!    touching the store).
//! 2. Fork the base with [`KnowledgeBaseStore::next_version`].
//! 3. Invoke the operator against the fork.
//! 4. Commit the returned carrier as the fork's manifestation, or delete the
//!    fork and propagate the operator's error unchanged.
//!
//! The base version is never modified. After any call at most one new
//! version is observable, and only when the call succeeded.

use crate::carrier::KnowledgeCarrier;
use crate::registry::Registry;
use crate::store::{KnowledgeBase, KnowledgeBaseStore};
use crate::{Bindings, KbError, Params, Pointer, ResourceId};
use std::sync::Arc;
use uuid::Uuid;

// =============================================================================
// PENDING VERSION (rollback guard)
// =============================================================================

/// A freshly minted version that is deleted on drop unless committed.
///
/// Dropping covers both the error path and unwinding out of an operator.
struct PendingVersion<'a> {
    store: &'a KnowledgeBaseStore,
    id: ResourceId,
    committed: bool,
}

impl<'a> PendingVersion<'a> {
    fn new(store: &'a KnowledgeBaseStore, id: ResourceId) -> Self {
        Self {
            store,
            id,
            committed: false,
        }
    }

    fn commit(mut self, carrier: KnowledgeCarrier) -> Result<Pointer, KbError> {
        let outcome = self.store.attach(&self.id, carrier);
        self.committed = outcome.is_ok();
        if self.committed {
            tracing::debug!(kbase = %self.id, "committed operator result");
        }
        outcome
    }
}

impl Drop for PendingVersion<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.store.delete(&self.id);
            tracing::debug!(kbase = %self.id, "rolled back failed operator version");
        }
    }
}

// =============================================================================
// DISPATCHER
// =============================================================================

/// Runs registered operators against a store with commit/rollback semantics.
#[derive(Debug, Clone)]
pub struct OperatorDispatcher {
    store: Arc<KnowledgeBaseStore>,
    registry: Arc<Registry>,
}

impl OperatorDispatcher {
    #[must_use]
    pub fn new(store: Arc<KnowledgeBaseStore>, registry: Arc<Registry>) -> Self {
        Self { store, registry }
    }

    #[must_use]
    pub fn store(&self) -> &Arc<KnowledgeBaseStore> {
        &self.store
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Fork `base`, run `step` on the fork, then commit or roll back.
    ///
    /// The committed manifestation is exactly the carrier `step` returned.
    /// A carrier with a non-local locator also makes the fork remote, with
    /// its endpoint taken from the locator.
    pub fn apply_versioned<F>(&self, base: &ResourceId, step: F) -> Result<Pointer, KbError>
    where
        F: FnOnce(&KnowledgeBase) -> Result<KnowledgeCarrier, KbError>,
    {
        let next = self.store.next_version(base)?;
        let pending = PendingVersion::new(&self.store, next.id().clone());
        let carrier = step(&next)?;
        pending.commit(carrier)
    }

    // =========================================================================
    // WEAVE
    // =========================================================================

    pub fn named_weave(
        &self,
        base: &ResourceId,
        operator: &Uuid,
        aspects: &KnowledgeCarrier,
        params: &Params,
    ) -> Result<Pointer, KbError> {
        self.registry.weavers().named(operator, |weaver| {
            self.apply_versioned(base, |kb| weaver.weave(kb, aspects, params))
        })
    }

    pub fn weave(
        &self,
        base: &ResourceId,
        aspects: &KnowledgeCarrier,
        params: &Params,
    ) -> Result<Pointer, KbError> {
        self.registry
            .weavers()
            .any(|id, _| self.named_weave(base, id, aspects, params))
    }

    // =========================================================================
    // BIND
    // =========================================================================

    pub fn named_bind(
        &self,
        base: &ResourceId,
        operator: &Uuid,
        bindings: &[Bindings],
        params: &Params,
    ) -> Result<Pointer, KbError> {
        self.registry.binders().named(operator, |binder| {
            self.apply_versioned(base, |kb| binder.bind(kb, bindings, params))
        })
    }

    pub fn bind(
        &self,
        base: &ResourceId,
        bindings: &[Bindings],
        params: &Params,
    ) -> Result<Pointer, KbError> {
        self.registry
            .binders()
            .any(|id, _| self.named_bind(base, id, bindings, params))
    }

    // =========================================================================
    // SELECT
    // =========================================================================

    pub fn named_select(
        &self,
        base: &ResourceId,
        operator: &Uuid,
        selection: &KnowledgeCarrier,
        params: &Params,
    ) -> Result<Pointer, KbError> {
        self.registry.selectors().named(operator, |selector| {
            self.apply_versioned(base, |kb| selector.select(kb, selection, params))
        })
    }

    pub fn select(
        &self,
        base: &ResourceId,
        selection: &KnowledgeCarrier,
        params: &Params,
    ) -> Result<Pointer, KbError> {
        self.registry
            .selectors()
            .any(|id, _| self.named_select(base, id, selection, params))
    }

    // =========================================================================
    // FLATTEN
    // =========================================================================

    pub fn named_flatten(
        &self,
        base: &ResourceId,
        operator: &Uuid,
        root: &ResourceId,
        params: &Params,
    ) -> Result<Pointer, KbError> {
        self.registry.flatteners().named(operator, |flattener| {
            self.apply_versioned(base, |kb| {
                flattener.flatten(kb.require_manifestation()?, root, params)
            })
        })
    }

    pub fn flatten(
        &self,
        base: &ResourceId,
        root: &ResourceId,
        params: &Params,
    ) -> Result<Pointer, KbError> {
        self.registry
            .flatteners()
            .any(|id, _| self.named_flatten(base, id, root, params))
    }

    // =========================================================================
    // EXTRACT
    // =========================================================================

    pub fn named_extract(
        &self,
        base: &ResourceId,
        operator: &Uuid,
        root: &ResourceId,
        params: &Params,
    ) -> Result<Pointer, KbError> {
        self.registry.extractors().named(operator, |extractor| {
            self.apply_versioned(base, |kb| extractor.extract(kb, root, params))
        })
    }

    pub fn extract(
        &self,
        base: &ResourceId,
        root: &ResourceId,
        params: &Params,
    ) -> Result<Pointer, KbError> {
        self.registry
            .extractors()
            .any(|id, _| self.named_extract(base, id, root, params))
    }

    // =========================================================================
    // INTROSPECT
    // =========================================================================

    pub fn named_introspect(
        &self,
        base: &ResourceId,
        operator: &Uuid,
        root: &ResourceId,
        params: &Params,
    ) -> Result<Pointer, KbError> {
        self.registry.introspectors().named(operator, |introspector| {
            self.apply_versioned(base, |kb| introspector.introspect(kb, root, params))
        })
    }

    pub fn introspect(
        &self,
        base: &ResourceId,
        root: &ResourceId,
        params: &Params,
    ) -> Result<Pointer, KbError> {
        self.registry
            .introspectors()
            .any(|id, _| self.named_introspect(base, id, root, params))
    }

    // =========================================================================
    // TRANSFORM
    // =========================================================================

    pub fn named_transform(
        &self,
        base: &ResourceId,
        operator: &Uuid,
        params: &Params,
    ) -> Result<Pointer, KbError> {
        self.registry.transformers().named(operator, |transformer| {
            self.apply_versioned(base, |kb| transformer.transform(kb, params))
        })
    }

    pub fn transform(&self, base: &ResourceId, params: &Params) -> Result<Pointer, KbError> {
        self.registry
            .transformers()
            .any(|id, _| self.named_transform(base, id, params))
    }
}

// =============================================================================
// TESTS
// =============================================================================
