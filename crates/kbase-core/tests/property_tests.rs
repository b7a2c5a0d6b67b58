//! # Property-Based Tests
//!
//! Versioning invariants checked over generated operator outcomes and
//! identifiers.

use kbase_core::primitives::DEFAULT_NAMESPACE;
use kbase_core::{
    KbError, KnowledgeBase, KnowledgeBaseStore, KnowledgeCarrier, KnowledgeOperator,
    OperatorDispatcher, Params, Registry, Representation, ResourceId, Transformer,
};
use proptest::collection::vec;
use proptest::prelude::*;
use std::sync::Arc;

/// Always succeeds or always fails.
struct Scripted {
    id: ResourceId,
    succeed: bool,
}

impl KnowledgeOperator for Scripted {
    fn operator_id(&self) -> ResourceId {
        self.id.clone()
    }
}

impl Transformer for Scripted {
    fn transform(
        &self,
        kbase: &KnowledgeBase,
        _params: &Params,
    ) -> Result<KnowledgeCarrier, KbError> {
        if self.succeed {
            Ok(KnowledgeCarrier::from_expression(
                kbase.id().clone(),
                Representation::new("TEXT"),
                kbase.id().version.clone(),
            ))
        } else {
            Err(KbError::operator(self.id.tag, "scripted failure"))
        }
    }
}

fn setup() -> (OperatorDispatcher, uuid::Uuid, uuid::Uuid, ResourceId) {
    let ok = Arc::new(Scripted {
        id: ResourceId::random(DEFAULT_NAMESPACE, "1"),
        succeed: true,
    });
    let broken = Arc::new(Scripted {
        id: ResourceId::random(DEFAULT_NAMESPACE, "1"),
        succeed: false,
    });
    let (ok_id, broken_id) = (ok.id.tag, broken.id.tag);
    let registry = Registry::builder()
        .with_named_transformer(ok)
        .with_named_transformer(broken)
        .build()
        .expect("registry");
    let store = Arc::new(KnowledgeBaseStore::new());
    let base = store
        .init(Some(KnowledgeCarrier::from_expression(
            ResourceId::random(DEFAULT_NAMESPACE, "0"),
            Representation::new("TEXT"),
            "base",
        )))
        .expect("init")
        .id;
    (
        OperatorDispatcher::new(store, Arc::new(registry)),
        ok_id,
        broken_id,
        base,
    )
}

// =============================================================================
// PROPERTY TESTS
// =============================================================================

proptest! {
    /// Only successful dispatches add versions, and the base never changes.
    #[test]
    fn versions_grow_by_successes_only(outcomes in vec(any::<bool>(), 1..30)) {
        let (dispatcher, ok, broken, base) = setup();
        let original = dispatcher.store().get_manifestation(&base).expect("get");

        for succeed in &outcomes {
            let operator = if *succeed { ok } else { broken };
            let result = dispatcher.named_transform(&base, &operator, &Params::new());
            prop_assert_eq!(result.is_ok(), *succeed);
        }

        let successes = outcomes.iter().filter(|s| **s).count();
        prop_assert_eq!(dispatcher.store().list_versions(base.tag).len(), successes + 1);
        prop_assert_eq!(dispatcher.store().get_manifestation(&base).expect("get"), original);
    }

    /// Each committed version holds exactly what its operator returned.
    #[test]
    fn committed_manifestation_matches_operator_output(rounds in 1usize..10) {
        let (dispatcher, ok, _, base) = setup();

        for _ in 0..rounds {
            let pointer = dispatcher
                .named_transform(&base, &ok, &Params::new())
                .expect("transform");
            let committed = dispatcher.store().get_manifestation(&pointer.id).expect("get");
            prop_assert_eq!(
                &committed.payload,
                &kbase_core::Payload::Expression(pointer.id.version.clone())
            );
        }
    }

    /// Deleting any identifier any number of times never disturbs other versions.
    #[test]
    fn delete_is_idempotent(repeats in 1usize..5, version in "[a-z0-9]{1,8}") {
        let store = KnowledgeBaseStore::new();
        let keep = store.init(None).expect("init");
        let target = ResourceId::random(DEFAULT_NAMESPACE, version);
        store.init(Some(KnowledgeCarrier::from_expression(
            target.clone(),
            Representation::new("TEXT"),
            "x",
        ))).expect("init");

        for _ in 0..repeats {
            store.delete(&target);
            prop_assert!(!store.has_knowledge_base(&target));
            prop_assert_eq!(store.len(), 1);
        }
        prop_assert!(store.has_knowledge_base(&keep.id));
    }

    /// The canonical identifier form parses back to the same identifier.
    #[test]
    fn identifier_text_form_roundtrips(version in "[A-Za-z0-9.-]{1,12}") {
        let id = ResourceId::random(DEFAULT_NAMESPACE, version);
        let parsed: ResourceId = id.to_string().parse().expect("parse");
        prop_assert_eq!(parsed, id);
    }
}
