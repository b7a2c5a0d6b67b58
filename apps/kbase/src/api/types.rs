//! # API Request/Response Types
//!
//! JSON structures for the HTTP API. Identifiers travel in their canonical
//! string form and raw bytes are base64 encoded.

use axum::{Json, http::StatusCode};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use kbase_core::primitives::{DEFAULT_NAMESPACE, INITIAL_VERSION, MAX_COMPOSITE_DEPTH};
use kbase_core::{
    Aggregation, Bindings, Composite, KbError, KnowledgeBase, KnowledgeCarrier, Params, Payload,
    Pointer, Representation, ResourceId,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

// =============================================================================
// HEALTH & STATUS
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Store status response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub namespace: String,
    pub versions: usize,
}

// =============================================================================
// ERRORS
// =============================================================================

/// Error body returned with every non-2xx status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: String,
}

/// Map a store error to its HTTP status and body.
pub fn error_response(error: &KbError) -> (StatusCode, Json<ErrorResponse>) {
    let status = match error {
        KbError::NotFound(_) => StatusCode::NOT_FOUND,
        KbError::AlreadyInitialized(_) => StatusCode::CONFLICT,
        KbError::Unsupported(_) | KbError::UnsupportedAggregation(_) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        KbError::InvalidIdentifier(_) | KbError::InvalidStage(_) => StatusCode::BAD_REQUEST,
        KbError::ResolutionFailure(_) => StatusCode::BAD_GATEWAY,
        KbError::OperatorFailure { .. } | KbError::Config(_) | KbError::Io(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
            kind: format!("{:?}", error.kind()),
        }),
    )
}

// =============================================================================
// POINTERS & KNOWLEDGE BASES
// =============================================================================

/// A stored version, as returned by init, populate and next-version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointerResponse {
    pub id: String,
    pub tag: Uuid,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
}

impl From<Pointer> for PointerResponse {
    fn from(pointer: Pointer) -> Self {
        Self {
            id: pointer.id.to_string(),
            tag: pointer.id.tag,
            version: pointer.id.version,
            href: pointer.href,
        }
    }
}

/// One Knowledge Base version with its manifestation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeBaseResponse {
    pub id: String,
    pub local: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifestation: Option<CarrierJson>,
}

impl From<&KnowledgeBase> for KnowledgeBaseResponse {
    fn from(kb: &KnowledgeBase) -> Self {
        Self {
            id: kb.id().to_string(),
            local: kb.is_local(),
            endpoint: kb.endpoint().map(str::to_string),
            manifestation: kb.manifestation().map(CarrierJson::from),
        }
    }
}

/// `POST /kbase` body. Without a carrier an empty version "0" is created.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InitRequest {
    #[serde(default)]
    pub carrier: Option<CarrierJson>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentsResponse {
    pub components: Vec<PointerResponse>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructureResponse {
    pub structure: Option<CarrierJson>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionsResponse {
    pub tag: Uuid,
    pub versions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteSeriesResponse {
    pub tag: Uuid,
    pub removed: usize,
}

// =============================================================================
// OPERATOR DISPATCH
// =============================================================================

/// `POST /kbase/{tag}/{version}/dispatch/{capability}` body.
///
/// With `operator` set the call is a named dispatch, otherwise every
/// registered operator of the capability is tried in order. Weave and select
/// need `carrier`; flatten, extract and introspect need `root_id`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operator: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub carrier: Option<CarrierJson>,
    pub bindings: Vec<Bindings>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root_id: Option<String>,
    pub params: Params,
}

/// Registered operator ids, keyed by capability name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperatorsResponse {
    pub operators: BTreeMap<String, Vec<Uuid>>,
}

// =============================================================================
// CARRIERS
// =============================================================================

/// Wire form of a carrier payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PayloadJson {
    Empty,
    Bytes {
        base64: String,
    },
    Parsed {
        value: serde_json::Value,
    },
    Expression {
        text: String,
    },
    Composite {
        components: Vec<CarrierJson>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        structure: Option<Box<CarrierJson>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        root_id: Option<String>,
        #[serde(default)]
        aggregation: Aggregation,
    },
}

/// Wire form of a knowledge carrier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CarrierJson {
    /// Canonical identifier. A fresh one is minted when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_id: Option<String>,
    pub representation: Representation,
    pub payload: PayloadJson,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locator: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl From<&KnowledgeCarrier> for CarrierJson {
    fn from(carrier: &KnowledgeCarrier) -> Self {
        let payload = match &carrier.payload {
            Payload::Empty => PayloadJson::Empty,
            Payload::Bytes(bytes) => PayloadJson::Bytes {
                base64: STANDARD.encode(bytes),
            },
            Payload::Parsed(value) => PayloadJson::Parsed {
                value: value.clone(),
            },
            Payload::Expression(text) => PayloadJson::Expression { text: text.clone() },
            Payload::Composite(composite) => PayloadJson::Composite {
                components: composite.components().iter().map(Self::from).collect(),
                structure: composite.structure().map(|s| Box::new(Self::from(s))),
                root_id: composite.root_id().map(ToString::to_string),
                aggregation: composite.aggregation(),
            },
        };
        Self {
            asset_id: Some(carrier.asset_id.to_string()),
            artifact_id: carrier.artifact_id.as_ref().map(ToString::to_string),
            representation: carrier.representation.clone(),
            payload,
            locator: carrier.locator.clone(),
            label: carrier.label.clone(),
        }
    }
}

fn parse_id(raw: &str) -> Result<ResourceId, KbError> {
    raw.parse()
}

impl CarrierJson {
    /// Validate and convert into a core carrier.
    pub fn into_carrier(self) -> Result<KnowledgeCarrier, KbError> {
        self.into_carrier_at(0)
    }

    fn into_carrier_at(self, depth: usize) -> Result<KnowledgeCarrier, KbError> {
        if depth > MAX_COMPOSITE_DEPTH {
            return Err(KbError::Unsupported(format!(
                "composite nesting deeper than {MAX_COMPOSITE_DEPTH}"
            )));
        }

        let payload = match self.payload {
            PayloadJson::Empty => Payload::Empty,
            PayloadJson::Bytes { base64 } => Payload::Bytes(
                STANDARD
                    .decode(base64)
                    .map_err(|e| KbError::InvalidIdentifier(format!("invalid base64: {e}")))?,
            ),
            PayloadJson::Parsed { value } => Payload::Parsed(value),
            PayloadJson::Expression { text } => Payload::Expression(text),
            PayloadJson::Composite {
                components,
                structure,
                root_id,
                aggregation,
            } => {
                let next = depth.saturating_add(1);
                let components = components
                    .into_iter()
                    .map(|c| c.into_carrier_at(next))
                    .collect::<Result<Vec<_>, _>>()?;
                let structure = structure.map(|s| s.into_carrier_at(next)).transpose()?;
                let root_id = root_id.as_deref().map(parse_id).transpose()?;
                Payload::Composite(
                    Composite::new(aggregation)
                        .with_components(components)
                        .with_structure(structure)
                        .with_root(root_id),
                )
            }
        };

        let asset_id = match self.asset_id.as_deref() {
            Some(raw) => parse_id(raw)?,
            None => ResourceId::random(DEFAULT_NAMESPACE, INITIAL_VERSION),
        };
        let mut carrier = KnowledgeCarrier::new(asset_id, self.representation, payload);
        carrier.artifact_id = self.artifact_id.as_deref().map(parse_id).transpose()?;
        carrier.locator = self.locator;
        carrier.label = self.label;
        Ok(carrier)
    }
}
