//! # Transformation Pipeline
//!
//! Turns a heterogeneous composite into one flattened artifact in a single
//! target representation, then enriches it with resolved data bindings and
//! lexicon labels.
//!
//! ## Stages
//!
//! 0. Acquire the initial composite through a [`ManifestationSource`]
//! 1. Lift every component to the abstract parsing level
//! 2. Flatten each decision-bearing component over the shared component list
//! 3. Translate every component into the target representation
//! 4. Flatten the composite into its root artifact
//! 5. Register the result, select, bind and weave, then return it
//!
//! Each stage runs under the dispatcher's commit/rollback discipline. Every
//! Knowledge Base the pipeline creates is released when `trigger` returns,
//! whether it succeeded or not.

pub mod collaborators;
pub mod config;
pub mod sources;
pub mod stage;

pub use collaborators::{
    Catalog, CatalogEntry, Collaborators, MultiParser, QueryLibrary, QueryResolver, Translator,
};
pub use config::{PipelineConfig, PipelineOperators};
pub use sources::{CallerComposite, CatalogComposite, DependencyAssembly, ManifestationSource};
pub use stage::PipelineStage;

use crate::carrier::{Aggregation, Composite, KnowledgeCarrier, ParsingLevel};
use crate::dispatch::OperatorDispatcher;
use crate::primitives::STAGE_COUNT;
use crate::registry::KnowledgeOperator;
use crate::store::KnowledgeBaseStore;
use crate::{KbError, Params, ResourceId};
use std::sync::Arc;
use uuid::Uuid;

/// Callback receiving the result of one stage.
pub type StageObserver = Arc<dyn Fn(&KnowledgeCarrier) + Send + Sync>;

// =============================================================================
// REQUEST
// =============================================================================

/// Input of one pipeline invocation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineRequest {
    /// The caller's Knowledge Base, read by [`CallerComposite`].
    pub kbase_id: Option<ResourceId>,
    /// Asset the final artifact is rooted at. Falls back to the composite's
    /// own root when absent.
    pub root_id: Option<ResourceId>,
    pub output_level: ParsingLevel,
    pub params: Params,
}

impl PipelineRequest {
    #[must_use]
    pub fn with_kbase(mut self, kbase_id: ResourceId) -> Self {
        self.kbase_id = Some(kbase_id);
        self
    }

    #[must_use]
    pub fn with_root(mut self, root_id: ResourceId) -> Self {
        self.root_id = Some(root_id);
        self
    }

    #[must_use]
    pub fn with_output_level(mut self, level: ParsingLevel) -> Self {
        self.output_level = level;
        self
    }

    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }
}

// =============================================================================
// WORKING SET
// =============================================================================

/// Knowledge Base series created by one invocation, deleted on drop.
struct WorkingSet<'a> {
    store: &'a KnowledgeBaseStore,
    tags: Vec<Uuid>,
}

impl<'a> WorkingSet<'a> {
    fn new(store: &'a KnowledgeBaseStore) -> Self {
        Self {
            store,
            tags: Vec::new(),
        }
    }

    fn track(&mut self, id: &ResourceId) {
        if !self.tags.contains(&id.tag) {
            self.tags.push(id.tag);
        }
    }
}

impl Drop for WorkingSet<'_> {
    fn drop(&mut self) {
        for tag in &self.tags {
            let removed = self.store.delete_series(*tag);
            tracing::debug!(%tag, removed, "released working knowledge base");
        }
    }
}

// =============================================================================
// PIPELINE
// =============================================================================

/// A six-stage transformation pipeline.
pub struct TransformationPipeline {
    id: ResourceId,
    config: PipelineConfig,
    dispatcher: OperatorDispatcher,
    source: Arc<dyn ManifestationSource>,
    collaborators: Collaborators,
    observers: [StageObserver; STAGE_COUNT],
}

impl std::fmt::Debug for TransformationPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransformationPipeline")
            .field("id", &self.id)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl KnowledgeOperator for TransformationPipeline {
    fn operator_id(&self) -> ResourceId {
        self.id.clone()
    }
}

impl TransformationPipeline {
    #[must_use]
    pub fn new(
        id: ResourceId,
        config: PipelineConfig,
        dispatcher: OperatorDispatcher,
        source: Arc<dyn ManifestationSource>,
        collaborators: Collaborators,
    ) -> Self {
        Self {
            id,
            config,
            dispatcher,
            source,
            collaborators,
            observers: std::array::from_fn(|_| {
                Arc::new(|_: &KnowledgeCarrier| {}) as StageObserver
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    #[must_use]
    pub fn dispatcher(&self) -> &OperatorDispatcher {
        &self.dispatcher
    }

    /// Install `observer` on stage `index` (0-5), replacing the no-op default.
    pub fn add_injector(&mut self, index: usize, observer: StageObserver) -> Result<(), KbError> {
        let stage = PipelineStage::from_index(index)?;
        self.observers[stage.index()] = observer;
        Ok(())
    }

    fn store(&self) -> &KnowledgeBaseStore {
        self.dispatcher.store()
    }

    fn operators(&self) -> &PipelineOperators {
        &self.config.operators
    }

    fn notify(&self, stage: PipelineStage, carrier: &KnowledgeCarrier) {
        tracing::debug!(pipeline = %self.id, stage = %stage, "stage finished");
        (self.observers[stage.index()])(carrier);
    }

    /// Notify the stage observer with the manifestation of `id`.
    fn finish(&self, stage: PipelineStage, id: &ResourceId) -> Result<ResourceId, KbError> {
        let manifestation = self.store().get_manifestation(id)?;
        self.notify(stage, &manifestation);
        Ok(id.clone())
    }

    /// Run all six stages and return the enriched artifact.
    pub fn trigger(&self, request: &PipelineRequest) -> Result<KnowledgeCarrier, KbError> {
        tracing::info!(pipeline = %self.id, root = ?request.root_id, "pipeline triggered");
        let mut working = WorkingSet::new(self.store());

        let (current, root) = self.acquire(request, &mut working)?;
        let current = self.parse(&current)?;
        let current = self.flatten_by_kind(&current, &request.params)?;
        let current = self.translate(&current, &request.params)?;
        let current = self.flatten_to_root(&current, &root, &request.params)?;
        let result = self.enrich(&current, request, &mut working)?;

        tracing::info!(pipeline = %self.id, artifact = %result.asset_id, "pipeline completed");
        Ok(result)
    }

    // =========================================================================
    // STAGE 0: ACQUIRE
    // =========================================================================

    fn acquire(
        &self,
        request: &PipelineRequest,
        working: &mut WorkingSet<'_>,
    ) -> Result<(ResourceId, ResourceId), KbError> {
        let initial = self.source.acquire(self.store(), request)?;
        let composite = initial.require_composite()?;

        let root = request
            .root_id
            .clone()
            .or_else(|| composite.root_id().cloned())
            .ok_or_else(|| KbError::NotFound(format!("root asset of {}", initial.asset_id)))?;

        let pointer = self.store().init(None)?;
        working.track(&pointer.id);
        self.store().populate(&pointer.id, initial)?;

        let id = self.finish(PipelineStage::Acquire, &pointer.id)?;
        Ok((id, root))
    }

    // =========================================================================
    // STAGE 1: PARSE
    // =========================================================================

    fn parse(&self, current: &ResourceId) -> Result<ResourceId, KbError> {
        let parser = &self.collaborators.parser;
        let pointer = self.dispatcher.apply_versioned(current, |kb| {
            kb.require_manifestation()?
                .try_map_components(|c| parser.lift(c, ParsingLevel::Abstract, None))
        })?;
        self.finish(PipelineStage::Parse, &pointer.id)
    }

    // =========================================================================
    // STAGE 2: FLATTEN-BY-KIND
    // =========================================================================

    fn flatten_by_kind(
        &self,
        current: &ResourceId,
        params: &Params,
    ) -> Result<ResourceId, KbError> {
        let flatteners = self.dispatcher.registry().flatteners();
        let flattener = self.operators().flattener;

        let pointer = self.dispatcher.apply_versioned(current, |kb| {
            let parsed = kb.require_manifestation()?;
            let shared = parsed.require_composite()?.components().to_vec();
            let mut result = parsed.clone();

            for component in parsed.components() {
                if !self.config.is_decision_bearing(&component.representation) {
                    continue;
                }
                let root = &component.asset_id;
                let merged = KnowledgeCarrier::anonymous_composite(
                    Composite::new(Aggregation::Mixed)
                        .with_components(shared.clone())
                        .with_root(Some(root.clone())),
                );
                let flat = flatteners.named(&flattener, |f| f.flatten(&merged, root, params))?;
                result = result.with_replaced_component(&root.composite_key(), flat)?;
            }
            Ok(result)
        })?;
        self.finish(PipelineStage::FlattenByKind, &pointer.id)
    }

    // =========================================================================
    // STAGE 3: TRANSLATE
    // =========================================================================

    fn translate(&self, current: &ResourceId, params: &Params) -> Result<ResourceId, KbError> {
        let translator = &self.collaborators.translator;
        let target = &self.config.target;

        let pointer = self.dispatcher.apply_versioned(current, |kb| {
            let translated = kb
                .require_manifestation()?
                .try_map_components(|c| translator.transrepresent(c, target, params))?;
            let uniform = translated
                .require_composite()?
                .clone()
                .with_aggregation(Aggregation::Uniform);
            Ok(translated.with_composite(uniform))
        })?;
        self.finish(PipelineStage::Translate, &pointer.id)
    }

    // =========================================================================
    // STAGE 4: FLATTEN-TO-ROOT
    // =========================================================================

    fn flatten_to_root(
        &self,
        current: &ResourceId,
        root: &ResourceId,
        params: &Params,
    ) -> Result<ResourceId, KbError> {
        let pointer =
            self.dispatcher
                .named_flatten(current, &self.operators().flattener, root, params)?;
        self.finish(PipelineStage::FlattenToRoot, &pointer.id)
    }

    // =========================================================================
    // STAGE 5: ENRICH
    // =========================================================================

    fn enrich(
        &self,
        current: &ResourceId,
        request: &PipelineRequest,
        working: &mut WorkingSet<'_>,
    ) -> Result<KnowledgeCarrier, KbError> {
        let params = &request.params;
        let ops = self.operators();
        let flat = self.store().get_manifestation(current)?;

        let enriched = self.store().init(None)?;
        working.track(&enriched.id);
        self.store().populate(&enriched.id, flat.as_ref().clone())?;

        let pivot = self
            .collaborators
            .queries
            .pivot_query(&self.config.pivot_vocabularies)?;
        let selected = self
            .dispatcher
            .named_select(&enriched.id, &ops.selector, &pivot, params)?;
        let selection = self.store().get_manifestation(&selected.id)?;

        let bindings = self.collaborators.resolver.ask_query(
            &self.config.query_scope,
            &self.config.query_topic,
            &selection,
            params,
        )?;
        let bound = self
            .dispatcher
            .named_bind(&enriched.id, &ops.binder, &bindings, params)?;

        let lexicon = self.assemble_lexicon(params)?;
        let woven = self
            .dispatcher
            .named_weave(&bound.id, &ops.weaver, &lexicon, params)?;

        let manifestation = self.store().get_manifestation(&woven.id)?;
        let result = if request.output_level < ParsingLevel::Abstract {
            self.collaborators.parser.lower(
                &manifestation,
                request.output_level,
                Some(&self.config.target),
            )?
        } else {
            manifestation.as_ref().clone()
        };

        self.notify(PipelineStage::Enrich, &result);
        Ok(result)
    }

    /// Canonical carriers of every lexicon asset under an annotation
    /// namespace, flattened into one code-system artifact.
    fn assemble_lexicon(&self, params: &Params) -> Result<KnowledgeCarrier, KbError> {
        let catalog = &self.collaborators.catalog;
        let entries = catalog.list_assets_by_type(&self.config.lexicon_asset_type)?;

        let lexica = entries
            .iter()
            .filter(|entry| entry.in_namespaces(&self.config.annotation_namespaces))
            .map(|entry| catalog.get_canonical_carrier(&entry.pointer.id))
            .collect::<Result<Vec<_>, _>>()?;

        let count = lexica.len();
        let composite = KnowledgeCarrier::anonymous_composite(
            Composite::new(Aggregation::Uniform).with_components(lexica),
        );
        tracing::debug!(pipeline = %self.id, lexica = count, "assembled lexicon");

        if count == 0 {
            return Ok(composite);
        }
        let root = composite.asset_id.clone();
        self.dispatcher
            .registry()
            .flatteners()
            .named(&self.operators().flattener, |f| {
                f.flatten(&composite, &root, params)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::DEFAULT_NAMESPACE;
    use crate::registry::Registry;

    #[test]
    fn request_builder() {
        let root = ResourceId::random(DEFAULT_NAMESPACE, "1");
        let request = PipelineRequest::default()
            .with_root(root.clone())
            .with_output_level(ParsingLevel::Serialized)
            .with_param("locale", "en");

        assert_eq!(request.root_id, Some(root));
        assert_eq!(request.output_level, ParsingLevel::Serialized);
        assert_eq!(request.params.get("locale").map(String::as_str), Some("en"));
        assert!(request.kbase_id.is_none());
    }

    #[test]
    fn working_set_releases_every_series() {
        let store = KnowledgeBaseStore::new();
        let keep = store.init(None).expect("init");
        {
            let mut working = WorkingSet::new(&store);
            let a = store.init(None).expect("init");
            working.track(&a.id);
            working.track(&a.id);
            store.next_version(&a.id).expect("next");
            let b = store.init(None).expect("init");
            working.track(&b.id);
            assert_eq!(store.len(), 4);
        }
        assert_eq!(store.len(), 1);
        assert!(store.has_knowledge_base(&keep.id));
    }

    #[test]
    fn injector_index_is_checked() {
        struct Nothing;
        impl MultiParser for Nothing {
            fn lift(
                &self,
                carrier: &KnowledgeCarrier,
                _level: ParsingLevel,
                _accept: Option<&crate::Representation>,
            ) -> Result<KnowledgeCarrier, KbError> {
                Ok(carrier.clone())
            }
        }
        impl Translator for Nothing {
            fn transrepresent(
                &self,
                carrier: &KnowledgeCarrier,
                _target: &crate::Representation,
                _params: &Params,
            ) -> Result<KnowledgeCarrier, KbError> {
                Ok(carrier.clone())
            }
        }
        impl QueryResolver for Nothing {
            fn ask_query(
                &self,
                _scope: &str,
                _topic: &str,
                _context: &KnowledgeCarrier,
                _params: &Params,
            ) -> Result<Vec<crate::Bindings>, KbError> {
                Ok(Vec::new())
            }
        }
        impl QueryLibrary for Nothing {
            fn pivot_query(&self, _vocabularies: &[String]) -> Result<KnowledgeCarrier, KbError> {
                Err(KbError::Unsupported("pivot".into()))
            }
        }
        impl Catalog for Nothing {
            fn list_assets_by_type(&self, _t: &str) -> Result<Vec<CatalogEntry>, KbError> {
                Ok(Vec::new())
            }
            fn get_canonical_carrier(&self, id: &ResourceId) -> Result<KnowledgeCarrier, KbError> {
                Err(KbError::NotFound(id.to_string()))
            }
        }

        let nothing = Arc::new(Nothing);
        let mut pipeline = TransformationPipeline::new(
            ResourceId::random(DEFAULT_NAMESPACE, "1"),
            PipelineConfig::default(),
            OperatorDispatcher::new(
                Arc::new(KnowledgeBaseStore::new()),
                Arc::new(Registry::empty()),
            ),
            Arc::new(CallerComposite),
            Collaborators {
                parser: nothing.clone(),
                translator: nothing.clone(),
                resolver: nothing.clone(),
                queries: nothing.clone(),
                catalog: nothing,
            },
        );

        assert!(pipeline.add_injector(5, Arc::new(|_: &KnowledgeCarrier| {})).is_ok());
        assert_eq!(
            pipeline.add_injector(6, Arc::new(|_: &KnowledgeCarrier| {})),
            Err(KbError::InvalidStage(6))
        );
    }
}
