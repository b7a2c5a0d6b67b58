//! # Local Operators
//!
//! Weave and bind dispatch over a single [`KnowledgeBase`] value, without a
//! versioned store. Results come back as a new value; the input is left as is.

use crate::carrier::KnowledgeCarrier;
use crate::registry::{Binder, Capability, CapabilityDispatcher, Weaver};
use crate::store::KnowledgeBase;
use crate::{Bindings, KbError, Params};
use std::sync::Arc;
use uuid::Uuid;

/// An ad hoc weaver/binder registry.
#[derive(Debug)]
pub struct LocalOperators {
    weavers: CapabilityDispatcher<dyn Weaver>,
    binders: CapabilityDispatcher<dyn Binder>,
}

impl Default for LocalOperators {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalOperators {
    #[must_use]
    pub fn new() -> Self {
        Self {
            weavers: CapabilityDispatcher::new(Capability::Weave),
            binders: CapabilityDispatcher::new(Capability::Bind),
        }
    }

    pub fn with_weaver(mut self, weaver: Arc<dyn Weaver>) -> Result<Self, KbError> {
        self.weavers.register(weaver)?;
        Ok(self)
    }

    pub fn with_binder(mut self, binder: Arc<dyn Binder>) -> Result<Self, KbError> {
        self.binders.register(binder)?;
        Ok(self)
    }

    #[must_use]
    pub fn weavers(&self) -> &CapabilityDispatcher<dyn Weaver> {
        &self.weavers
    }

    #[must_use]
    pub fn binders(&self) -> &CapabilityDispatcher<dyn Binder> {
        &self.binders
    }

    pub fn named_weave(
        &self,
        kbase: &KnowledgeBase,
        operator: &Uuid,
        aspects: &KnowledgeCarrier,
        params: &Params,
    ) -> Result<KnowledgeBase, KbError> {
        self.weavers.named(operator, |weaver| {
            let woven = weaver.weave(kbase, aspects, params)?;
            Ok(rebased(kbase, woven))
        })
    }

    pub fn weave(
        &self,
        kbase: &KnowledgeBase,
        aspects: &KnowledgeCarrier,
        params: &Params,
    ) -> Result<KnowledgeBase, KbError> {
        self.weavers
            .any(|id, _| self.named_weave(kbase, id, aspects, params))
    }

    pub fn named_bind(
        &self,
        kbase: &KnowledgeBase,
        operator: &Uuid,
        bindings: &[Bindings],
        params: &Params,
    ) -> Result<KnowledgeBase, KbError> {
        self.binders.named(operator, |binder| {
            let bound = binder.bind(kbase, bindings, params)?;
            Ok(rebased(kbase, bound))
        })
    }

    pub fn bind(
        &self,
        kbase: &KnowledgeBase,
        bindings: &[Bindings],
        params: &Params,
    ) -> Result<KnowledgeBase, KbError> {
        self.binders
            .any(|id, _| self.named_bind(kbase, id, bindings, params))
    }
}

fn rebased(kbase: &KnowledgeBase, manifestation: KnowledgeCarrier) -> KnowledgeBase {
    KnowledgeBase::new(kbase.id().clone()).with_manifestation(manifestation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::DEFAULT_NAMESPACE;
    use crate::registry::KnowledgeOperator;
    use crate::{Payload, Representation, ResourceId};
    use serde_json::json;

    struct Tagger {
        id: ResourceId,
    }

    impl KnowledgeOperator for Tagger {
        fn operator_id(&self) -> ResourceId {
            self.id.clone()
        }
    }

    impl Binder for Tagger {
        fn bind(
            &self,
            kbase: &KnowledgeBase,
            bindings: &[Bindings],
            _params: &Params,
        ) -> Result<KnowledgeCarrier, KbError> {
            Ok(KnowledgeCarrier::from_parsed(
                kbase.id().clone(),
                Representation::new("JSON"),
                json!({ "bound": bindings.len() }),
            ))
        }
    }

    fn kbase() -> KnowledgeBase {
        KnowledgeBase::new(ResourceId::random(DEFAULT_NAMESPACE, "0"))
    }

    #[test]
    fn named_bind_returns_new_value() {
        let tagger = Arc::new(Tagger {
            id: ResourceId::random(DEFAULT_NAMESPACE, "1"),
        });
        let operator = tagger.id.tag;
        let local = LocalOperators::new().with_binder(tagger).expect("register");
        let input = kbase();

        let out = local
            .named_bind(&input, &operator, &[Bindings::new()], &Params::new())
            .expect("bind");

        assert_eq!(out.id(), input.id());
        assert!(input.manifestation().is_none());
        assert_eq!(
            out.require_manifestation().expect("manifestation").payload,
            Payload::Parsed(json!({ "bound": 1 }))
        );
    }

    #[test]
    fn unknown_weaver_is_unsupported() {
        let local = LocalOperators::default();
        let aspects = KnowledgeCarrier::from_expression(
            ResourceId::random(DEFAULT_NAMESPACE, "1"),
            Representation::new("TEXT"),
            "labels",
        );

        let named = local.named_weave(&kbase(), &Uuid::new_v4(), &aspects, &Params::new());
        assert!(matches!(named, Err(KbError::Unsupported(_))));
        assert!(matches!(
            local.weave(&kbase(), &aspects, &Params::new()),
            Err(KbError::Unsupported(_))
        ));
    }
}
