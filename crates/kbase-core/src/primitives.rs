//! # Primitives
//!
//! Fixed constants for the Knowledge Base store and pipeline.

/// Namespace given to identifiers minted by the store.
pub const DEFAULT_NAMESPACE: &str = "https://kbase.local/kbs";

/// Path segment separating tag and version in the canonical identifier form.
pub const VERSIONS_SEGMENT: &str = "versions";

/// Version tag of a Knowledge Base created by `init` without a carrier.
pub const INITIAL_VERSION: &str = "0";

/// Host name treated as local when deciding where a manifestation lives.
pub const LOCAL_HOST: &str = "localhost";

/// Representation language of the dependency graph carried as a composite's
/// structure.
pub const STRUCTURE_LANGUAGE: &str = "DEPENDENCY_GRAPH";

/// Representation language of composites synthesized by the store.
pub const COMPOSITE_LANGUAGE: &str = "COMPOSITE";

/// Number of pipeline stages (observer hooks are indexed `0..STAGE_COUNT`).
pub const STAGE_COUNT: usize = 6;

// =============================================================================
// INPUT VALIDATION LIMITS
// =============================================================================

/// Maximum number of components assembled by walking a dependency graph.
///
/// Dependency walks stop with an error past this bound instead of running
/// away on a cyclic or oversized catalog.
pub const MAX_ASSEMBLED_COMPONENTS: usize = 1000;

/// Maximum composite nesting accepted at the service boundary.
pub const MAX_COMPOSITE_DEPTH: usize = 16;
