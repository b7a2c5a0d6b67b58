//! # kbase-core
//!
//! Versioned Knowledge Base store with capability-based operator dispatch
//! and a six-stage transformation pipeline - THE STORE.
//!
//! ## Layout
//!
//! - `types` / `carrier`: identifiers, representations, knowledge carriers
//! - `store`: the copy-on-write versioned Knowledge Base store
//! - `registry`: operator capabilities and the generic capability dispatcher
//! - `dispatch`: next-version / invoke / commit-or-rollback around operators
//! - `local`: store-less weave and bind over a single Knowledge Base value
//! - `pipeline`: the transformation pipeline and its collaborator contracts
//!
//! ## Architectural Constraints
//!
//! - A committed manifestation is never mutated in place
//! - A failed operator never leaves a new version visible
//! - Registries are immutable once built
//! - Has NO async, NO network dependencies (pure Rust)

// =============================================================================
// MODULES
// =============================================================================

pub mod carrier;
pub mod dispatch;
pub mod local;
pub mod pipeline;
pub mod primitives;
pub mod registry;
pub mod store;
pub mod types;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{
    Bindings, ErrorKind, Format, KbError, Language, Params, Pointer, Representation, ResourceId,
    VersionKey,
};

pub use carrier::{Aggregation, Composite, KnowledgeCarrier, ParsingLevel, Payload};

// =============================================================================
// RE-EXPORTS: Store & Dispatch
// =============================================================================

pub use dispatch::OperatorDispatcher;
pub use local::LocalOperators;
pub use registry::{
    Binder, Capability, CapabilityDispatcher, Extractor, Flattener, Introspector,
    KnowledgeOperator, Registry, RegistryBuilder, Selector, Transformer, Weaver,
};
pub use store::{ArtifactResolver, KnowledgeBase, KnowledgeBaseStore};

// =============================================================================
// RE-EXPORTS: Pipeline
// =============================================================================

pub use pipeline::{
    CallerComposite, Catalog, CatalogComposite, CatalogEntry, Collaborators, DependencyAssembly,
    ManifestationSource, MultiParser, PipelineConfig, PipelineOperators, PipelineRequest,
    PipelineStage, QueryLibrary, QueryResolver, StageObserver, TransformationPipeline, Translator,
};
