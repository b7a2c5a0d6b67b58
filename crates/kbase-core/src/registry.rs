//! # Operator Registry
//!
//! Capability-keyed maps of pluggable operators.
//!
//! Every operator exposes its own id through [`KnowledgeOperator::operator_id`];
//! registration keys off `operator_id().tag`. The same id may appear in two
//! different capability maps, never twice in the same one.
//!
//! [`CapabilityDispatcher`] is the one generic piece: an ordered candidate
//! list per capability with two dispatch shapes, named (fail if unknown) and
//! unnamed (first success wins, in registration order). It backs both the
//! versioned [`OperatorDispatcher`](crate::OperatorDispatcher) and the
//! store-less [`LocalOperators`](crate::LocalOperators).

use crate::carrier::KnowledgeCarrier;
use crate::store::KnowledgeBase;
use crate::{Bindings, KbError, Params, ResourceId};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

// =============================================================================
// CAPABILITIES
// =============================================================================

/// The seven operator capability kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Capability {
    Weave,
    Bind,
    Select,
    Flatten,
    Extract,
    Introspect,
    Transform,
}

impl Capability {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Capability::Weave => "weave",
            Capability::Bind => "bind",
            Capability::Select => "select",
            Capability::Flatten => "flatten",
            Capability::Extract => "extract",
            Capability::Introspect => "introspect",
            Capability::Transform => "transform",
        }
    }

    #[must_use]
    pub fn all() -> [Capability; 7] {
        [
            Capability::Weave,
            Capability::Bind,
            Capability::Select,
            Capability::Flatten,
            Capability::Extract,
            Capability::Introspect,
            Capability::Transform,
        ]
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Capability {
    type Err = KbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Capability::all()
            .into_iter()
            .find(|c| c.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| KbError::Unsupported(format!("unknown capability: {s}")))
    }
}

// =============================================================================
// OPERATOR TRAITS
// =============================================================================

/// Common identity of every pluggable operator.
pub trait KnowledgeOperator: Send + Sync {
    fn operator_id(&self) -> ResourceId;
}

/// Injects externally sourced enrichment (e.g. display labels).
pub trait Weaver: KnowledgeOperator {
    fn weave(
        &self,
        kbase: &KnowledgeBase,
        aspects: &KnowledgeCarrier,
        params: &Params,
    ) -> Result<KnowledgeCarrier, KbError>;
}

/// Injects resolved data-value bindings into placeholders.
pub trait Binder: KnowledgeOperator {
    fn bind(
        &self,
        kbase: &KnowledgeBase,
        bindings: &[Bindings],
        params: &Params,
    ) -> Result<KnowledgeCarrier, KbError>;
}

/// Extracts the subset of an artifact matched by a selection query.
pub trait Selector: KnowledgeOperator {
    fn select(
        &self,
        kbase: &KnowledgeBase,
        selection: &KnowledgeCarrier,
        params: &Params,
    ) -> Result<KnowledgeCarrier, KbError>;
}

/// Merges related artifacts into one rooted at `root`.
pub trait Flattener: KnowledgeOperator {
    fn flatten(
        &self,
        carrier: &KnowledgeCarrier,
        root: &ResourceId,
        params: &Params,
    ) -> Result<KnowledgeCarrier, KbError>;
}

/// Pulls a derived artifact out of a Knowledge Base.
pub trait Extractor: KnowledgeOperator {
    fn extract(
        &self,
        kbase: &KnowledgeBase,
        root: &ResourceId,
        params: &Params,
    ) -> Result<KnowledgeCarrier, KbError>;
}

/// Produces metadata describing a Knowledge Base's content.
pub trait Introspector: KnowledgeOperator {
    fn introspect(
        &self,
        kbase: &KnowledgeBase,
        root: &ResourceId,
        params: &Params,
    ) -> Result<KnowledgeCarrier, KbError>;
}

/// Free-form whole-base transformation.
pub trait Transformer: KnowledgeOperator {
    fn transform(&self, kbase: &KnowledgeBase, params: &Params)
    -> Result<KnowledgeCarrier, KbError>;
}

// =============================================================================
// CAPABILITY DISPATCHER
// =============================================================================

/// Ordered operators of one capability, keyed by operator UUID.
pub struct CapabilityDispatcher<O: ?Sized> {
    capability: Capability,
    operators: Vec<(Uuid, Arc<O>)>,
}

impl<O: ?Sized> fmt::Debug for CapabilityDispatcher<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapabilityDispatcher")
            .field("capability", &self.capability)
            .field("operators", &self.ids())
            .finish()
    }
}

impl<O: ?Sized + KnowledgeOperator> CapabilityDispatcher<O> {
    #[must_use]
    pub fn new(capability: Capability) -> Self {
        Self {
            capability,
            operators: Vec::new(),
        }
    }

    /// Append an operator. Fails if its UUID is already taken in this map.
    pub fn register(&mut self, operator: Arc<O>) -> Result<(), KbError> {
        let id = operator.operator_id().tag;
        if self.contains(&id) {
            return Err(KbError::Unsupported(format!(
                "{} operator {} registered twice",
                self.capability, id
            )));
        }
        self.operators.push((id, operator));
        Ok(())
    }
}

impl<O: ?Sized> CapabilityDispatcher<O> {
    #[must_use]
    pub fn capability(&self) -> Capability {
        self.capability
    }

    /// Registered ids, in registration order.
    #[must_use]
    pub fn ids(&self) -> Vec<Uuid> {
        self.operators.iter().map(|(id, _)| *id).collect()
    }

    #[must_use]
    pub fn contains(&self, id: &Uuid) -> bool {
        self.operators.iter().any(|(known, _)| known == id)
    }

    #[must_use]
    pub fn get(&self, id: &Uuid) -> Option<&Arc<O>> {
        self.operators
            .iter()
            .find(|(known, _)| known == id)
            .map(|(_, op)| op)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.operators.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operators.is_empty()
    }

    /// The operator registered as `id`, or `Unsupported`.
    pub fn require(&self, id: &Uuid) -> Result<&Arc<O>, KbError> {
        self.get(id).ok_or_else(|| {
            KbError::Unsupported(format!("no {} operator registered as {}", self.capability, id))
        })
    }

    /// Named dispatch: `invoke` runs only if `id` is registered.
    pub fn named<T, F>(&self, id: &Uuid, invoke: F) -> Result<T, KbError>
    where
        F: FnOnce(&O) -> Result<T, KbError>,
    {
        let operator = self.require(id)?;
        invoke(operator.as_ref())
    }

    /// Unnamed dispatch: try every operator in registration order and return
    /// the first success.
    ///
    /// When all fail, the last failure is returned; earlier ones are logged.
    pub fn any<T, F>(&self, mut invoke: F) -> Result<T, KbError>
    where
        F: FnMut(&Uuid, &O) -> Result<T, KbError>,
    {
        let mut last = None;
        for (id, operator) in &self.operators {
            match invoke(id, operator.as_ref()) {
                Ok(value) => return Ok(value),
                Err(e) => {
                    if let Some(discarded) = last.replace(e) {
                        tracing::warn!(
                            capability = %self.capability,
                            error = %discarded,
                            "operator failed during unnamed dispatch"
                        );
                    }
                    tracing::debug!(
                        capability = %self.capability,
                        operator = %id,
                        "operator declined, trying next candidate"
                    );
                }
            }
        }
        Err(last.unwrap_or_else(|| {
            KbError::Unsupported(format!("no {} operator registered", self.capability))
        }))
    }
}

// =============================================================================
// REGISTRY
// =============================================================================

/// Immutable-after-construction set of capability maps.
#[derive(Debug)]
pub struct Registry {
    weavers: CapabilityDispatcher<dyn Weaver>,
    binders: CapabilityDispatcher<dyn Binder>,
    selectors: CapabilityDispatcher<dyn Selector>,
    flatteners: CapabilityDispatcher<dyn Flattener>,
    extractors: CapabilityDispatcher<dyn Extractor>,
    introspectors: CapabilityDispatcher<dyn Introspector>,
    transformers: CapabilityDispatcher<dyn Transformer>,
}

impl Default for Registry {
    fn default() -> Self {
        Self {
            weavers: CapabilityDispatcher::new(Capability::Weave),
            binders: CapabilityDispatcher::new(Capability::Bind),
            selectors: CapabilityDispatcher::new(Capability::Select),
            flatteners: CapabilityDispatcher::new(Capability::Flatten),
            extractors: CapabilityDispatcher::new(Capability::Extract),
            introspectors: CapabilityDispatcher::new(Capability::Introspect),
            transformers: CapabilityDispatcher::new(Capability::Transform),
        }
    }
}

impl Registry {
    /// An empty registry (every dispatch returns `Unsupported`).
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    #[must_use]
    pub fn weavers(&self) -> &CapabilityDispatcher<dyn Weaver> {
        &self.weavers
    }

    #[must_use]
    pub fn binders(&self) -> &CapabilityDispatcher<dyn Binder> {
        &self.binders
    }

    #[must_use]
    pub fn selectors(&self) -> &CapabilityDispatcher<dyn Selector> {
        &self.selectors
    }

    #[must_use]
    pub fn flatteners(&self) -> &CapabilityDispatcher<dyn Flattener> {
        &self.flatteners
    }

    #[must_use]
    pub fn extractors(&self) -> &CapabilityDispatcher<dyn Extractor> {
        &self.extractors
    }

    #[must_use]
    pub fn introspectors(&self) -> &CapabilityDispatcher<dyn Introspector> {
        &self.introspectors
    }

    #[must_use]
    pub fn transformers(&self) -> &CapabilityDispatcher<dyn Transformer> {
        &self.transformers
    }

    /// Registered operator ids for `capability`, in registration order.
    #[must_use]
    pub fn operators(&self, capability: Capability) -> Vec<Uuid> {
        match capability {
            Capability::Weave => self.weavers.ids(),
            Capability::Bind => self.binders.ids(),
            Capability::Select => self.selectors.ids(),
            Capability::Flatten => self.flatteners.ids(),
            Capability::Extract => self.extractors.ids(),
            Capability::Introspect => self.introspectors.ids(),
            Capability::Transform => self.transformers.ids(),
        }
    }
}

/// Collects registrations; the first duplicate id is reported by `build`.
#[derive(Default)]
pub struct RegistryBuilder {
    registry: Registry,
    error: Option<KbError>,
}

impl RegistryBuilder {
    fn record(mut self, outcome: Result<(), KbError>) -> Self {
        if let Err(e) = outcome {
            self.error.get_or_insert(e);
        }
        self
    }

    #[must_use]
    pub fn with_named_weaver(mut self, operator: Arc<dyn Weaver>) -> Self {
        let outcome = self.registry.weavers.register(operator);
        self.record(outcome)
    }

    #[must_use]
    pub fn with_named_binder(mut self, operator: Arc<dyn Binder>) -> Self {
        let outcome = self.registry.binders.register(operator);
        self.record(outcome)
    }

    #[must_use]
    pub fn with_named_selector(mut self, operator: Arc<dyn Selector>) -> Self {
        let outcome = self.registry.selectors.register(operator);
        self.record(outcome)
    }

    #[must_use]
    pub fn with_named_flattener(mut self, operator: Arc<dyn Flattener>) -> Self {
        let outcome = self.registry.flatteners.register(operator);
        self.record(outcome)
    }

    #[must_use]
    pub fn with_named_extractor(mut self, operator: Arc<dyn Extractor>) -> Self {
        let outcome = self.registry.extractors.register(operator);
        self.record(outcome)
    }

    #[must_use]
    pub fn with_named_introspector(mut self, operator: Arc<dyn Introspector>) -> Self {
        let outcome = self.registry.introspectors.register(operator);
        self.record(outcome)
    }

    #[must_use]
    pub fn with_named_transformer(mut self, operator: Arc<dyn Transformer>) -> Self {
        let outcome = self.registry.transformers.register(operator);
        self.record(outcome)
    }

    pub fn build(self) -> Result<Registry, KbError> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.registry),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
