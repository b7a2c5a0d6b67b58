//! # API Endpoint Handlers
//!
//! Thin adapters from HTTP to `KnowledgeBaseStore` and the operator
//! dispatcher. Store operations are synchronous and lock-free at this level,
//! so handlers call them directly.

use super::{
    AppState,
    types::{
        CarrierJson, ComponentsResponse, DeleteSeriesResponse, DispatchRequest, ErrorResponse,
        HealthResponse, InitRequest, KnowledgeBaseResponse, OperatorsResponse, PointerResponse,
        StatusResponse, StructureResponse, VersionsResponse, error_response,
    },
};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use kbase_core::{Capability, KbError, OperatorDispatcher, Pointer, ResourceId};
use uuid::Uuid;

type ApiResult<T> = Result<(StatusCode, Json<T>), (StatusCode, Json<ErrorResponse>)>;

fn respond<T>(status: StatusCode, result: Result<T, KbError>) -> ApiResult<T> {
    match result {
        Ok(body) => Ok((status, Json(body))),
        Err(e) => {
            tracing::debug!(error = %e, "request failed");
            Err(error_response(&e))
        }
    }
}

fn version_id(state: &AppState, tag: Uuid, version: String) -> ResourceId {
    state.store.id_for(tag, version)
}

// =============================================================================
// HEALTH & STATUS
// =============================================================================

/// Health check endpoint.
pub async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse::default())
}

/// Store status.
pub async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    let response = StatusResponse {
        namespace: state.store.namespace().to_string(),
        versions: state.store.len(),
    };
    (StatusCode::OK, Json(response))
}

// =============================================================================
// CREATION
// =============================================================================

/// `POST /kbase`
pub async fn init_handler(
    State(state): State<AppState>,
    Json(request): Json<InitRequest>,
) -> ApiResult<PointerResponse> {
    let result = request
        .carrier
        .map(CarrierJson::into_carrier)
        .transpose()
        .and_then(|carrier| state.store.init(carrier))
        .map(PointerResponse::from);
    respond(StatusCode::CREATED, result)
}

/// `POST /kbase/{tag}/{version}/populate`
pub async fn populate_handler(
    State(state): State<AppState>,
    Path((tag, version)): Path<(Uuid, String)>,
    Json(carrier): Json<CarrierJson>,
) -> ApiResult<PointerResponse> {
    let id = version_id(&state, tag, version);
    let result = carrier
        .into_carrier()
        .and_then(|c| state.store.populate(&id, c))
        .map(PointerResponse::from);
    respond(StatusCode::OK, result)
}

/// `POST /kbase/{tag}/{version}/next`
pub async fn next_version_handler(
    State(state): State<AppState>,
    Path((tag, version)): Path<(Uuid, String)>,
) -> ApiResult<PointerResponse> {
    let id = version_id(&state, tag, version);
    let result = state
        .store
        .next_version(&id)
        .map(|kb| PointerResponse::from(kb.pointer()));
    respond(StatusCode::CREATED, result)
}

// =============================================================================
// LOOKUP
// =============================================================================

/// `GET /kbase/{tag}/{version}`
pub async fn get_handler(
    State(state): State<AppState>,
    Path((tag, version)): Path<(Uuid, String)>,
) -> ApiResult<KnowledgeBaseResponse> {
    let id = version_id(&state, tag, version);
    let result = state.store.get(&id).map(|kb| KnowledgeBaseResponse::from(&kb));
    respond(StatusCode::OK, result)
}

/// `GET /kbase/{tag}/{version}/components`
pub async fn components_handler(
    State(state): State<AppState>,
    Path((tag, version)): Path<(Uuid, String)>,
) -> ApiResult<ComponentsResponse> {
    let id = version_id(&state, tag, version);
    let result = state.store.get_components(&id).map(|pointers| ComponentsResponse {
        components: pointers.into_iter().map(PointerResponse::from).collect(),
    });
    respond(StatusCode::OK, result)
}

/// `GET /kbase/{tag}/{version}/structure`
pub async fn get_structure_handler(
    State(state): State<AppState>,
    Path((tag, version)): Path<(Uuid, String)>,
) -> ApiResult<StructureResponse> {
    let id = version_id(&state, tag, version);
    let result = state.store.get_structure(&id).map(|structure| StructureResponse {
        structure: structure.as_ref().map(CarrierJson::from),
    });
    respond(StatusCode::OK, result)
}

/// `PUT /kbase/{tag}/{version}/structure`
pub async fn set_structure_handler(
    State(state): State<AppState>,
    Path((tag, version)): Path<(Uuid, String)>,
    Json(structure): Json<CarrierJson>,
) -> ApiResult<PointerResponse> {
    let id = version_id(&state, tag, version);
    let result = structure
        .into_carrier()
        .and_then(|s| state.store.set_structure(&id, s))
        .map(PointerResponse::from);
    respond(StatusCode::OK, result)
}

/// `GET /kbase/{tag}/versions`
pub async fn versions_handler(
    State(state): State<AppState>,
    Path(tag): Path<Uuid>,
) -> ApiResult<VersionsResponse> {
    let versions = state
        .store
        .list_versions(tag)
        .into_iter()
        .map(|id| id.version)
        .collect();
    respond(StatusCode::OK, Ok(VersionsResponse { tag, versions }))
}

// =============================================================================
// DELETION
// =============================================================================

/// `DELETE /kbase/{tag}/{version}`. Absent versions are not an error.
pub async fn delete_handler(
    State(state): State<AppState>,
    Path((tag, version)): Path<(Uuid, String)>,
) -> impl IntoResponse {
    let id = version_id(&state, tag, version);
    state.store.delete(&id);
    StatusCode::NO_CONTENT
}

/// `DELETE /kbase/{tag}`
pub async fn delete_series_handler(
    State(state): State<AppState>,
    Path(tag): Path<Uuid>,
) -> ApiResult<DeleteSeriesResponse> {
    let removed = state.store.delete_series(tag);
    respond(StatusCode::OK, Ok(DeleteSeriesResponse { tag, removed }))
}

// =============================================================================
// OPERATOR DISPATCH
// =============================================================================

fn required<T>(value: Option<T>, capability: Capability, input: &str) -> Result<T, KbError> {
    value.ok_or_else(|| KbError::Unsupported(format!("{capability} dispatch requires `{input}`")))
}

fn dispatch(
    dispatcher: &OperatorDispatcher,
    base: &ResourceId,
    capability: Capability,
    request: DispatchRequest,
) -> Result<Pointer, KbError> {
    let DispatchRequest {
        operator,
        carrier,
        bindings,
        root_id,
        params,
    } = request;
    let carrier = carrier.map(CarrierJson::into_carrier).transpose()?;
    let root = root_id.as_deref().map(str::parse::<ResourceId>).transpose()?;

    match capability {
        Capability::Weave => {
            let aspects = required(carrier, capability, "carrier")?;
            match operator {
                Some(id) => dispatcher.named_weave(base, &id, &aspects, &params),
                None => dispatcher.weave(base, &aspects, &params),
            }
        }
        Capability::Bind => match operator {
            Some(id) => dispatcher.named_bind(base, &id, &bindings, &params),
            None => dispatcher.bind(base, &bindings, &params),
        },
        Capability::Select => {
            let selection = required(carrier, capability, "carrier")?;
            match operator {
                Some(id) => dispatcher.named_select(base, &id, &selection, &params),
                None => dispatcher.select(base, &selection, &params),
            }
        }
        Capability::Flatten => {
            let root = required(root, capability, "root_id")?;
            match operator {
                Some(id) => dispatcher.named_flatten(base, &id, &root, &params),
                None => dispatcher.flatten(base, &root, &params),
            }
        }
        Capability::Extract => {
            let root = required(root, capability, "root_id")?;
            match operator {
                Some(id) => dispatcher.named_extract(base, &id, &root, &params),
                None => dispatcher.extract(base, &root, &params),
            }
        }
        Capability::Introspect => {
            let root = required(root, capability, "root_id")?;
            match operator {
                Some(id) => dispatcher.named_introspect(base, &id, &root, &params),
                None => dispatcher.introspect(base, &root, &params),
            }
        }
        Capability::Transform => match operator {
            Some(id) => dispatcher.named_transform(base, &id, &params),
            None => dispatcher.transform(base, &params),
        },
    }
}

/// `POST /kbase/{tag}/{version}/dispatch/{capability}`
///
/// Runs one operator against a fresh version of the base. On failure the
/// fresh version is discarded and the base is left as it was.
pub async fn dispatch_handler(
    State(state): State<AppState>,
    Path((tag, version, capability)): Path<(Uuid, String, String)>,
    Json(request): Json<DispatchRequest>,
) -> ApiResult<PointerResponse> {
    let id = version_id(&state, tag, version);
    let result = capability
        .parse::<Capability>()
        .and_then(|capability| dispatch(&state.dispatcher, &id, capability, request))
        .map(PointerResponse::from);
    respond(StatusCode::CREATED, result)
}

/// `GET /operators`
pub async fn operators_handler(State(state): State<AppState>) -> ApiResult<OperatorsResponse> {
    let registry = state.dispatcher.registry();
    let operators = Capability::all()
        .into_iter()
        .map(|capability| (capability.name().to_string(), registry.operators(capability)))
        .collect();
    respond(StatusCode::OK, Ok(OperatorsResponse { operators }))
}
