//! # Knowledge Carriers
//!
//! The artifact container moved between the store, operators and pipeline.
//!
//! A `KnowledgeCarrier` is a plain value: editing one always produces a new
//! value. Knowledge Base versions hold their manifestation behind an `Arc`,
//! so a committed carrier is shared read-only by every version that copied
//! it and is never mutated in place.

use crate::primitives::{COMPOSITE_LANGUAGE, DEFAULT_NAMESPACE, INITIAL_VERSION, LOCAL_HOST};
use crate::{KbError, Representation, ResourceId, VersionKey};
use serde::{Deserialize, Serialize};

// =============================================================================
// AGGREGATION & LEVELS
// =============================================================================

/// How the components of a composite relate to each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregation {
    /// Independent components, no merge semantics yet. Open for appends.
    #[default]
    None,
    /// Components share one representation.
    Uniform,
    /// Components are heterogeneous.
    Mixed,
    /// Components are linked by an explicit dependency graph structure.
    Graph,
}

impl Aggregation {
    /// Only `None` composites accept further components.
    #[must_use]
    pub fn accepts_components(self) -> bool {
        matches!(self, Aggregation::None)
    }
}

/// Abstraction level of an artifact, from raw bytes up to a parsed model.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ParsingLevel {
    Encoded,
    Serialized,
    Concrete,
    #[default]
    Abstract,
}

// =============================================================================
// PAYLOAD
// =============================================================================

/// What a carrier actually holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Payload {
    /// Nothing yet (identity only).
    Empty,
    /// Raw, encoded bytes.
    Bytes(Vec<u8>),
    /// Parsed abstract form.
    Parsed(serde_json::Value),
    /// Inline expression text.
    Expression(String),
    /// A collection of carriers.
    Composite(Composite),
}

/// A named collection of carriers with an optional dependency structure.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Composite {
    components: Vec<KnowledgeCarrier>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    structure: Option<Box<KnowledgeCarrier>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    root_id: Option<ResourceId>,
    #[serde(default)]
    aggregation: Aggregation,
}

impl Composite {
    /// An empty composite with the given aggregation kind.
    #[must_use]
    pub fn new(aggregation: Aggregation) -> Self {
        Self {
            aggregation,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_components(mut self, components: Vec<KnowledgeCarrier>) -> Self {
        self.components = components;
        self
    }

    #[must_use]
    pub fn with_structure(mut self, structure: Option<KnowledgeCarrier>) -> Self {
        self.structure = structure.map(Box::new);
        self
    }

    #[must_use]
    pub fn with_root(mut self, root_id: Option<ResourceId>) -> Self {
        self.root_id = root_id;
        self
    }

    #[must_use]
    pub fn with_aggregation(mut self, aggregation: Aggregation) -> Self {
        self.aggregation = aggregation;
        self
    }

    #[must_use]
    pub fn components(&self) -> &[KnowledgeCarrier] {
        &self.components
    }

    #[must_use]
    pub fn structure(&self) -> Option<&KnowledgeCarrier> {
        self.structure.as_deref()
    }

    #[must_use]
    pub fn root_id(&self) -> Option<&ResourceId> {
        self.root_id.as_ref()
    }

    #[must_use]
    pub fn aggregation(&self) -> Aggregation {
        self.aggregation
    }

    /// Append a component. Only legal while aggregation is `None`.
    pub fn push(&mut self, component: KnowledgeCarrier) -> Result<(), KbError> {
        if !self.aggregation.accepts_components() {
            return Err(KbError::UnsupportedAggregation(self.aggregation));
        }
        self.components.push(component);
        Ok(())
    }

    /// Find a component by the composite key of its asset id.
    #[must_use]
    pub fn find(&self, key: &VersionKey) -> Option<&KnowledgeCarrier> {
        self.components
            .iter()
            .find(|c| c.asset_id.composite_key() == *key)
    }

    /// Swap the component whose asset id matches `key`.
    ///
    /// Matching is by identity, never by position.
    pub fn replace(
        &mut self,
        key: &VersionKey,
        component: KnowledgeCarrier,
    ) -> Result<(), KbError> {
        let slot = self
            .components
            .iter_mut()
            .find(|c| c.asset_id.composite_key() == *key)
            .ok_or_else(|| {
                KbError::NotFound(format!("component {}/{}", key.tag, key.version))
            })?;
        *slot = component;
        Ok(())
    }
}

// =============================================================================
// KNOWLEDGE CARRIER
// =============================================================================

/// An artifact: identity, representation, payload and optional locator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeCarrier {
    pub asset_id: ResourceId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_id: Option<ResourceId>,
    pub representation: Representation,
    pub payload: Payload,
    /// Remote URI the content can be fetched from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locator: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl KnowledgeCarrier {
    #[must_use]
    pub fn new(asset_id: ResourceId, representation: Representation, payload: Payload) -> Self {
        Self {
            asset_id,
            artifact_id: None,
            representation,
            payload,
            locator: None,
            label: None,
        }
    }

    #[must_use]
    pub fn from_bytes(
        asset_id: ResourceId,
        representation: Representation,
        bytes: Vec<u8>,
    ) -> Self {
        Self::new(asset_id, representation, Payload::Bytes(bytes))
    }

    #[must_use]
    pub fn from_parsed(
        asset_id: ResourceId,
        representation: Representation,
        value: serde_json::Value,
    ) -> Self {
        Self::new(asset_id, representation, Payload::Parsed(value))
    }

    #[must_use]
    pub fn from_expression(
        asset_id: ResourceId,
        representation: Representation,
        expression: impl Into<String>,
    ) -> Self {
        Self::new(asset_id, representation, Payload::Expression(expression.into()))
    }

    #[must_use]
    pub fn composite(
        asset_id: ResourceId,
        representation: Representation,
        composite: Composite,
    ) -> Self {
        Self::new(asset_id, representation, Payload::Composite(composite))
    }

    /// An anonymous composite in the default namespace.
    #[must_use]
    pub fn anonymous_composite(composite: Composite) -> Self {
        Self::composite(
            ResourceId::random(DEFAULT_NAMESPACE, INITIAL_VERSION),
            Representation::new(COMPOSITE_LANGUAGE),
            composite,
        )
    }

    #[must_use]
    pub fn with_artifact_id(mut self, artifact_id: ResourceId) -> Self {
        self.artifact_id = Some(artifact_id);
        self
    }

    #[must_use]
    pub fn with_locator(mut self, locator: impl Into<String>) -> Self {
        self.locator = Some(locator.into());
        self
    }

    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    #[must_use]
    pub fn is_composite(&self) -> bool {
        matches!(self.payload, Payload::Composite(_))
    }

    #[must_use]
    pub fn as_composite(&self) -> Option<&Composite> {
        match &self.payload {
            Payload::Composite(c) => Some(c),
            _ => None,
        }
    }

    /// The composite payload, or `Unsupported` for atomic carriers.
    pub fn require_composite(&self) -> Result<&Composite, KbError> {
        self.as_composite().ok_or_else(|| {
            KbError::Unsupported(format!("artifact {} is not a composite", self.asset_id))
        })
    }

    #[must_use]
    pub fn has_expression(&self) -> bool {
        matches!(self.payload, Payload::Expression(_))
    }

    /// Components of a composite (empty for atomic carriers).
    #[must_use]
    pub fn components(&self) -> &[KnowledgeCarrier] {
        self.as_composite().map(Composite::components).unwrap_or(&[])
    }

    /// Look up a component by the composite key of its asset id.
    #[must_use]
    pub fn component(&self, key: &VersionKey) -> Option<&KnowledgeCarrier> {
        self.as_composite().and_then(|c| c.find(key))
    }

    /// A copy of this composite with one component swapped by identity.
    pub fn with_replaced_component(
        &self,
        key: &VersionKey,
        component: KnowledgeCarrier,
    ) -> Result<KnowledgeCarrier, KbError> {
        let mut composite = self.require_composite()?.clone();
        composite.replace(key, component)?;
        Ok(self.with_composite(composite))
    }

    /// A copy of this composite with every component passed through `f`.
    pub fn try_map_components<F>(&self, mut f: F) -> Result<KnowledgeCarrier, KbError>
    where
        F: FnMut(&KnowledgeCarrier) -> Result<KnowledgeCarrier, KbError>,
    {
        let composite = self.require_composite()?;
        let components = composite
            .components()
            .iter()
            .map(&mut f)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(self.with_composite(composite.clone().with_components(components)))
    }

    /// Same identity and metadata, different composite payload.
    #[must_use]
    pub fn with_composite(&self, composite: Composite) -> KnowledgeCarrier {
        KnowledgeCarrier {
            payload: Payload::Composite(composite),
            ..self.clone()
        }
    }

    /// Local when the locator is absent, has no scheme, or names `localhost`.
    #[must_use]
    pub fn is_local(&self) -> bool {
        self.locator.as_deref().is_none_or(locator_is_local)
    }
}

/// Scheme/host inspection of a locator URI.
fn locator_is_local(locator: &str) -> bool {
    let Some((scheme, rest)) = locator.split_once(':') else {
        return true;
    };
    if scheme.is_empty() || scheme.contains('/') {
        return true;
    }
    let Some(authority) = rest.strip_prefix("//") else {
        return false;
    };
    let authority = authority.split(['/', '?', '#']).next().unwrap_or_default();
    let host_port = authority.rsplit('@').next().unwrap_or_default();
    let host = host_port.split(':').next().unwrap_or_default();
    host.eq_ignore_ascii_case(LOCAL_HOST)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn carrier(language: &str) -> KnowledgeCarrier {
        KnowledgeCarrier::from_parsed(
            ResourceId::random(DEFAULT_NAMESPACE, "1"),
            Representation::new(language),
            json!({ "lang": language }),
        )
    }

    #[test]
    fn locality_follows_locator() {
        let c = carrier("DMN_1_2");
        assert!(c.is_local());
        assert!(c.clone().with_locator("/relative/path").is_local());
        assert!(c.clone().with_locator("http://localhost:8080/kb").is_local());
        assert!(c.clone().with_locator("https://user@LOCALHOST/kb").is_local());
        assert!(!c.clone().with_locator("https://repo.example.org/kb").is_local());
        assert!(!c.with_locator("urn:uuid:1234").is_local());
    }

    #[test]
    fn push_only_while_open() {
        let mut open = Composite::new(Aggregation::None);
        assert!(open.push(carrier("A")).is_ok());
        assert_eq!(open.components().len(), 1);

        let mut closed = Composite::new(Aggregation::Uniform);
        assert_eq!(
            closed.push(carrier("A")),
            Err(KbError::UnsupportedAggregation(Aggregation::Uniform))
        );
    }

    #[test]
    fn replace_matches_by_identity_not_position() {
        let a = carrier("A");
        let b = carrier("B");
        let composite = KnowledgeCarrier::anonymous_composite(
            Composite::new(Aggregation::Mixed).with_components(vec![a.clone(), b.clone()]),
        );

        let replacement = KnowledgeCarrier::from_expression(
            b.asset_id.clone(),
            Representation::new("B"),
            "flat",
        );
        let updated = composite
            .with_replaced_component(&b.asset_id.composite_key(), replacement.clone())
            .expect("replace");

        assert_eq!(updated.components().len(), 2);
        assert_eq!(updated.components()[0], a);
        assert_eq!(updated.component(&b.asset_id.composite_key()), Some(&replacement));
        // Original value untouched
        assert_eq!(composite.components()[1], b);
    }

    #[test]
    fn replace_unknown_component_fails() {
        let composite = KnowledgeCarrier::anonymous_composite(
            Composite::new(Aggregation::Mixed).with_components(vec![carrier("A")]),
        );
        let stranger = carrier("Z");
        let key = stranger.asset_id.composite_key();
        let result = composite.with_replaced_component(&key, stranger);
        assert!(matches!(result, Err(KbError::NotFound(_))));
    }

    #[test]
    fn map_components_requires_composite() {
        let atomic = carrier("A");
        assert!(matches!(
            atomic.try_map_components(|c| Ok(c.clone())),
            Err(KbError::Unsupported(_))
        ));
    }

    #[test]
    fn payload_serializes_tagged() {
        let c = KnowledgeCarrier::from_expression(
            ResourceId::random(DEFAULT_NAMESPACE, "1"),
            Representation::new("CQL"),
            "age > 18",
        );
        let value = serde_json::to_value(&c).expect("serialize");
        assert_eq!(value["payload"]["kind"], "expression");
        assert_eq!(value["payload"]["value"], "age > 18");
    }
}
