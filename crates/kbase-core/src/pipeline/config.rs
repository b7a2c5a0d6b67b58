//! # Pipeline Configuration
//!
//! Deserialized from the `[pipeline]` table of the application config.

use crate::registry::{Capability, Registry};
use crate::Representation;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Operator ids the pipeline dispatches to by name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineOperators {
    pub flattener: Uuid,
    pub selector: Uuid,
    pub binder: Uuid,
    pub weaver: Uuid,
}

/// Settings for one transformation pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Representation languages flattened in stage 2.
    pub decision_languages: Vec<String>,
    /// Common representation every component is translated into.
    pub target: Representation,
    /// Vocabulary namespaces passed to the pivot query.
    pub pivot_vocabularies: Vec<String>,
    /// Namespaces a lexicon asset's secondary ids must fall under.
    pub annotation_namespaces: Vec<String>,
    /// Catalog asset type listed when assembling the lexicon.
    pub lexicon_asset_type: String,
    pub query_scope: String,
    pub query_topic: String,
    pub operators: PipelineOperators,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            decision_languages: vec!["DMN_1_2".to_string()],
            target: Representation::new("OWL_2"),
            pivot_vocabularies: Vec::new(),
            annotation_namespaces: Vec::new(),
            lexicon_asset_type: "Lexicon".to_string(),
            query_scope: "data-shapes".to_string(),
            query_topic: "concept-bindings".to_string(),
            operators: PipelineOperators::default(),
        }
    }
}

impl PipelineConfig {
    /// True when `representation` is one of the decision-bearing languages.
    #[must_use]
    pub fn is_decision_bearing(&self, representation: &Representation) -> bool {
        self.decision_languages
            .iter()
            .any(|lang| lang.eq_ignore_ascii_case(representation.language.as_str()))
    }

    /// Configured operator ids that `registry` does not provide, paired with
    /// the capability they were configured for. Nil ids count as unset.
    #[must_use]
    pub fn missing_operators(&self, registry: &Registry) -> Vec<(Capability, Uuid)> {
        let PipelineOperators {
            flattener,
            selector,
            binder,
            weaver,
        } = self.operators;
        [
            (Capability::Flatten, flattener),
            (Capability::Select, selector),
            (Capability::Bind, binder),
            (Capability::Weave, weaver),
        ]
        .into_iter()
        .filter(|(capability, id)| !id.is_nil() && !registry.operators(*capability).contains(id))
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decision_languages_match_case_insensitively() {
        let config = PipelineConfig::default();
        assert!(config.is_decision_bearing(&Representation::new("dmn_1_2")));
        assert!(!config.is_decision_bearing(&Representation::new("CQL")));
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config: PipelineConfig =
            serde_json::from_str(r#"{ "query_topic": "labs" }"#).expect("parse");
        assert_eq!(config.query_topic, "labs");
        assert_eq!(config.lexicon_asset_type, "Lexicon");
        assert_eq!(config.operators, PipelineOperators::default());
    }

    #[test]
    fn missing_operators_skip_unset_ids() {
        let registry = Registry::empty();
        assert!(PipelineConfig::default().missing_operators(&registry).is_empty());

        let mut config = PipelineConfig::default();
        config.operators.weaver = Uuid::new_v4();
        assert_eq!(
            config.missing_operators(&registry),
            vec![(Capability::Weave, config.operators.weaver)]
        );
    }
}
