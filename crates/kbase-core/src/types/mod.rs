//! # Core Type Definitions
//!
//! This module contains the value types shared by the store, the registry and
//! the pipeline:
//! - Resource identifiers and their storage key (`ResourceId`, `VersionKey`)
//! - Representation descriptors (`Representation`, `Language`, `Format`)
//! - Handles returned by store operations (`Pointer`)
//! - Error types (`KbError`, `ErrorKind`)
//!
//! ## Identity Guarantees
//!
//! Storage never looks at the namespace of a `ResourceId`: two identifiers
//! with the same tag and version tag address the same Knowledge Base version.
//! `BTreeMap` is used for parameter maps so iteration order is stable.

use crate::carrier::Aggregation;
use crate::primitives::{DEFAULT_NAMESPACE, VERSIONS_SEGMENT};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Free-form operator parameters.
pub type Params = BTreeMap<String, String>;

/// One row of resolved data bindings (variable name -> value).
pub type Bindings = BTreeMap<String, serde_json::Value>;

// =============================================================================
// RESOURCE IDENTIFIERS
// =============================================================================

/// A (namespace, tag, version-tag) triple.
///
/// The canonical string form is `{namespace}/{tag}/versions/{version}`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResourceId {
    /// Namespace URI. Ignored by storage lookups.
    pub namespace: String,
    /// Series tag shared by every version of the resource.
    pub tag: Uuid,
    /// Version tag.
    pub version: String,
}

impl ResourceId {
    /// Create an identifier from its parts.
    #[must_use]
    pub fn new(namespace: impl Into<String>, tag: Uuid, version: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            tag,
            version: version.into(),
        }
    }

    /// Create an identifier in the default namespace.
    #[must_use]
    pub fn local(tag: Uuid, version: impl Into<String>) -> Self {
        Self::new(DEFAULT_NAMESPACE, tag, version)
    }

    /// Create an identifier with a fresh random tag.
    #[must_use]
    pub fn random(namespace: impl Into<String>, version: impl Into<String>) -> Self {
        Self::new(namespace, Uuid::new_v4(), version)
    }

    /// Same series, different version tag.
    #[must_use]
    pub fn with_version(&self, version: impl Into<String>) -> Self {
        Self {
            namespace: self.namespace.clone(),
            tag: self.tag,
            version: version.into(),
        }
    }

    /// The storage key: tag + version, namespace dropped.
    #[must_use]
    pub fn composite_key(&self) -> VersionKey {
        VersionKey {
            tag: self.tag,
            version: self.version.clone(),
        }
    }

    /// True when both identifiers address the same stored version.
    #[must_use]
    pub fn same_key(&self, other: &ResourceId) -> bool {
        self.tag == other.tag && self.version == other.version
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let namespace = self.namespace.trim_end_matches('/');
        if namespace.is_empty() {
            write!(f, "{}/{}/{}", self.tag, VERSIONS_SEGMENT, self.version)
        } else {
            write!(
                f,
                "{}/{}/{}/{}",
                namespace, self.tag, VERSIONS_SEGMENT, self.version
            )
        }
    }
}

impl FromStr for ResourceId {
    type Err = KbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || KbError::InvalidIdentifier(s.to_string());

        // version, "versions", tag, namespace (possibly absent)
        let mut parts = s.rsplitn(4, '/');
        let version = parts.next().filter(|v| !v.is_empty()).ok_or_else(invalid)?;
        if parts.next() != Some(VERSIONS_SEGMENT) {
            return Err(invalid());
        }
        let tag = parts
            .next()
            .and_then(|t| Uuid::parse_str(t).ok())
            .ok_or_else(invalid)?;
        let namespace = parts.next().unwrap_or_default();

        Ok(Self::new(namespace, tag, version))
    }
}

/// Storage key derived from a `ResourceId`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VersionKey {
    pub tag: Uuid,
    pub version: String,
}

// =============================================================================
// REPRESENTATION DESCRIPTOR
// =============================================================================

/// Representation language of an artifact (e.g. a decision-model dialect).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Language(pub String);

impl Language {
    #[must_use]
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Languages are compared by tag, ignoring ASCII case.
    #[must_use]
    pub fn is_equivalent(&self, other: &Language) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }
}

/// Serialization format of an artifact (e.g. XML, JSON).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Format(pub String);

impl Format {
    #[must_use]
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// How an artifact's bytes or objects are encoded.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Representation {
    pub language: Language,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<Format>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub charset: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
}

impl Representation {
    /// A descriptor naming only the language.
    #[must_use]
    pub fn new(language: impl Into<String>) -> Self {
        Self {
            language: Language::new(language),
            format: None,
            charset: None,
            encoding: None,
        }
    }

    #[must_use]
    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(Format::new(format));
        self
    }

    #[must_use]
    pub fn with_charset(mut self, charset: impl Into<String>) -> Self {
        self.charset = Some(charset.into());
        self
    }

    #[must_use]
    pub fn with_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.encoding = Some(encoding.into());
        self
    }

    /// Applicability check used by operators: only the language matters.
    #[must_use]
    pub fn same_language(&self, other: &Representation) -> bool {
        self.language.is_equivalent(&other.language)
    }
}

// =============================================================================
// POINTER
// =============================================================================

/// A lightweight handle to a stored resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pointer {
    pub id: ResourceId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

impl Pointer {
    #[must_use]
    pub fn to(id: ResourceId) -> Self {
        Self {
            id,
            name: None,
            href: None,
            mime_type: None,
        }
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_href(mut self, href: impl Into<String>) -> Self {
        self.href = Some(href.into());
        self
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Coarse failure classes surfaced across the service boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    AlreadyInitialized,
    Unsupported,
    OperatorFailure,
    ResolutionFailure,
    Other,
}

/// Errors that can occur in the Knowledge Base system.
///
/// - No silent failures
/// - Use `Result<T, KbError>` for fallible operations
/// - Dispatch and pipeline code propagate operator errors unchanged
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KbError {
    /// A Knowledge Base version, operator, or artifact does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The target (tag, version) pair is already present.
    #[error("Knowledge base already initialized: {0}")]
    AlreadyInitialized(ResourceId),

    /// Unregistered operator, or an operation the store does not support.
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// Appending to a composite that is no longer open for aggregation.
    #[error("Unsupported aggregation: cannot append to a {0:?} composite")]
    UnsupportedAggregation(Aggregation),

    /// The invoked operator reported failure.
    #[error("Operator {operator} failed: {reason}")]
    OperatorFailure { operator: Uuid, reason: String },

    /// An external collaborator (parser, translator, catalog...) failed.
    #[error("Resolution failure: {0}")]
    ResolutionFailure(String),

    /// A resource identifier could not be parsed.
    #[error("Invalid resource identifier: {0}")]
    InvalidIdentifier(String),

    /// Pipeline stage index outside 0..=5.
    #[error("Invalid pipeline stage index: {0}")]
    InvalidStage(usize),

    /// Configuration could not be loaded or is inconsistent.
    #[error("Configuration error: {0}")]
    Config(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(String),
}

impl KbError {
    /// Shorthand for an operator-reported failure.
    #[must_use]
    pub fn operator(operator: Uuid, reason: impl Into<String>) -> Self {
        Self::OperatorFailure {
            operator,
            reason: reason.into(),
        }
    }

    /// NotFound for a Knowledge Base version.
    #[must_use]
    pub fn missing_version(id: &ResourceId) -> Self {
        Self::NotFound(format!("knowledge base {}", id))
    }

    /// The taxonomy class of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::AlreadyInitialized(_) => ErrorKind::AlreadyInitialized,
            Self::Unsupported(_) | Self::UnsupportedAggregation(_) => ErrorKind::Unsupported,
            Self::OperatorFailure { .. } => ErrorKind::OperatorFailure,
            Self::ResolutionFailure(_) => ErrorKind::ResolutionFailure,
            Self::InvalidIdentifier(_) | Self::InvalidStage(_) | Self::Config(_) | Self::Io(_) => {
                ErrorKind::Other
            }
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
