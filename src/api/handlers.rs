use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::{ApiResult, AppState};
use crate::actions::{ActionOutcome, ContextualAction};
use crate::entity::{EntityReference, RelationshipType};
use crate::error::OpsgraphError;
use crate::graph::{EntityGraph, PathType, RelatedEntity, SortBy, TracePath};
use crate::links::{DeepLink, DeepLinkConfig, ResolvedLink};
use crate::navigation::{NavigationBreadcrumb, NavigationContext};

pub async fn health(State(state): State<AppState>) -> Json<Value> {
    let session = state.session.lock().await;
    Json(json!({
        "status": "ok",
        "service": "opsgraph",
        "version": env!("CARGO_PKG_VERSION"),
        "entities": session.store().entity_count(),
        "relationships": session.store().relationship_count(),
    }))
}

#[derive(Debug, Default, Deserialize)]
pub struct RelatedQuery {
    max_distance: Option<usize>,
    limit: Option<usize>,
    sort_by: Option<SortBy>,
    /// Comma-separated relationship types.
    types: Option<String>,
    include_indirect: Option<bool>,
}

fn parse_types(raw: &str) -> Result<Vec<RelationshipType>, OpsgraphError> {
    raw.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::parse)
        .collect()
}

pub async fn related(
    State(state): State<AppState>,
    Path((entity_type, entity_id)): Path<(String, String)>,
    Query(query): Query<RelatedQuery>,
) -> ApiResult<Vec<RelatedEntity>> {
    let session = state.session.lock().await;
    let origin = session.resolve_entity(&entity_type, &entity_id);

    let mut options = session.default_options();
    if let Some(max_distance) = query.max_distance {
        options = options.with_max_distance(max_distance);
    }
    if let Some(limit) = query.limit {
        options = options.with_limit(limit);
    }
    if let Some(sort_by) = query.sort_by {
        options = options.with_sort(sort_by);
    }
    if let Some(types) = query.types.as_deref() {
        options = options.with_types(parse_types(types)?);
    }
    if query.include_indirect == Some(false) {
        options = options.direct_only();
    }

    Ok(Json(session.related_entities(&origin, &options)?))
}

#[derive(Debug, Default, Deserialize)]
pub struct DistanceQuery {
    max_distance: Option<usize>,
}

pub async fn impact(
    State(state): State<AppState>,
    Path((entity_type, entity_id)): Path<(String, String)>,
    Query(query): Query<DistanceQuery>,
) -> ApiResult<Vec<RelatedEntity>> {
    let session = state.session.lock().await;
    let origin = session.resolve_entity(&entity_type, &entity_id);
    let max_distance = query.max_distance.unwrap_or(session.config().traversal.max_distance);
    Ok(Json(session.impact_analysis(&origin, max_distance)?))
}

pub async fn dependencies(
    State(state): State<AppState>,
    Path((entity_type, entity_id)): Path<(String, String)>,
    Query(query): Query<DistanceQuery>,
) -> ApiResult<Vec<RelatedEntity>> {
    let session = state.session.lock().await;
    let origin = session.resolve_entity(&entity_type, &entity_id);
    let max_distance = query.max_distance.unwrap_or(session.config().traversal.max_distance);
    Ok(Json(session.dependencies(&origin, max_distance)?))
}

#[derive(Debug, Default, Deserialize)]
pub struct PermissionsQuery {
    /// Comma-separated permission names.
    permissions: Option<String>,
}

fn split_permissions(raw: Option<&str>) -> Vec<String> {
    raw.unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(String::from)
        .collect()
}

pub async fn list_actions(
    State(state): State<AppState>,
    Path((entity_type, entity_id)): Path<(String, String)>,
    Query(query): Query<PermissionsQuery>,
) -> ApiResult<Vec<ContextualAction>> {
    let session = state.session.lock().await;
    let entity = session.resolve_entity(&entity_type, &entity_id);
    let permissions = split_permissions(query.permissions.as_deref());
    Ok(Json(session.contextual_actions(&entity, &permissions)))
}

#[derive(Debug, Default, Deserialize)]
pub struct ExecuteActionRequest {
    #[serde(default)]
    permissions: Vec<String>,
    #[serde(default)]
    payload: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct ExecuteActionResponse {
    outcome: ActionOutcome,
}

pub async fn execute_action(
    State(state): State<AppState>,
    Path((entity_type, entity_id, action_type)): Path<(String, String, String)>,
    Json(request): Json<ExecuteActionRequest>,
) -> ApiResult<ExecuteActionResponse> {
    // Release the session before any remote call.
    let (executor, entity, action) = {
        let session = state.session.lock().await;
        let entity = session.resolve_entity(&entity_type, &entity_id);
        let action = session
            .contextual_actions(&entity, &request.permissions)
            .into_iter()
            .find(|a| a.action_type == action_type)
            .ok_or_else(|| {
                OpsgraphError::NotFound(format!("action {} for {}", action_type, entity.key()))
            })?;
        (session.actions().clone(), entity, action)
    };

    let action = match request.payload {
        Some(payload) => action.with_payload(payload),
        None => action,
    };
    let outcome = executor.execute_contextual_action(&action, &entity).await?;
    Ok(Json(ExecuteActionResponse { outcome }))
}

#[derive(Debug, Deserialize)]
pub struct PathQuery {
    from: String,
    to: String,
    #[serde(default)]
    path_type: PathType,
}

fn parse_key(key: &str) -> Result<EntityReference, OpsgraphError> {
    EntityReference::from_key(key)
        .ok_or_else(|| OpsgraphError::InvalidInput(format!("expected type:id, got '{}'", key)))
}

pub async fn find_path(
    State(state): State<AppState>,
    Query(query): Query<PathQuery>,
) -> ApiResult<Vec<TracePath>> {
    let from = parse_key(&query.from)?;
    let to = parse_key(&query.to)?;
    let session = state.session.lock().await;
    let from = session.resolve_entity(&from.entity_type, &from.entity_id);
    let to = session.resolve_entity(&to.entity_type, &to.entity_id);
    Ok(Json(session.find_path(&from, &to, query.path_type)))
}

#[derive(Debug, Default, Deserialize)]
pub struct GraphQuery {
    depth: Option<usize>,
}

pub async fn build_graph(
    State(state): State<AppState>,
    Path((entity_type, entity_id)): Path<(String, String)>,
    Query(query): Query<GraphQuery>,
) -> ApiResult<EntityGraph> {
    let mut session = state.session.lock().await;
    let center = session.resolve_entity(&entity_type, &entity_id);
    Ok(Json(session.build_graph(&center, query.depth).clone()))
}

pub async fn expand_node(
    State(state): State<AppState>,
    Path(node_id): Path<String>,
) -> ApiResult<EntityGraph> {
    let mut session = state.session.lock().await;
    Ok(Json(session.expand_graph_node(&node_id)?.clone()))
}

pub async fn collapse_node(
    State(state): State<AppState>,
    Path(node_id): Path<String>,
) -> ApiResult<EntityGraph> {
    let mut session = state.session.lock().await;
    Ok(Json(session.collapse_graph_node(&node_id)?.clone()))
}

#[derive(Debug, Deserialize)]
pub struct HighlightRequest {
    from: String,
    to: String,
}

pub async fn highlight_path(
    State(state): State<AppState>,
    Json(request): Json<HighlightRequest>,
) -> ApiResult<Value> {
    let mut session = state.session.lock().await;
    let highlighted = session.highlight_path(&request.from, &request.to)?;
    Ok(Json(json!({ "highlighted": highlighted })))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigationState {
    context: NavigationContext,
    history: Vec<NavigationBreadcrumb>,
    history_index: Option<usize>,
    can_go_back: bool,
    can_go_forward: bool,
}

pub async fn navigation_state(State(state): State<AppState>) -> ApiResult<NavigationState> {
    let session = state.session.lock().await;
    let nav = session.navigation();
    Ok(Json(NavigationState {
        context: nav.context().clone(),
        history: nav.history().to_vec(),
        history_index: nav.history_index(),
        can_go_back: nav.can_go_back(),
        can_go_forward: nav.can_go_forward(),
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigateRequest {
    entity_type: String,
    entity_id: String,
    #[serde(default)]
    context: Option<Map<String, Value>>,
}

pub async fn navigate(
    State(state): State<AppState>,
    Json(request): Json<NavigateRequest>,
) -> ApiResult<NavigationBreadcrumb> {
    let mut session = state.session.lock().await;
    let entity = session.resolve_entity(&request.entity_type, &request.entity_id);
    let crumb = session
        .navigation_mut()
        .navigate_to_entity(entity, request.context)
        .clone();
    Ok(Json(crumb))
}

pub async fn go_back(State(state): State<AppState>) -> ApiResult<Value> {
    let mut session = state.session.lock().await;
    let entity = session.navigation_mut().go_back();
    Ok(Json(json!({ "entity": entity })))
}

pub async fn go_forward(State(state): State<AppState>) -> ApiResult<Value> {
    let mut session = state.session.lock().await;
    let entity = session.navigation_mut().go_forward();
    Ok(Json(json!({ "entity": entity })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkRequest {
    entity_type: String,
    entity_id: String,
    #[serde(flatten)]
    config: DeepLinkConfig,
}

pub async fn generate_link(
    State(state): State<AppState>,
    Json(request): Json<LinkRequest>,
) -> ApiResult<DeepLink> {
    let session = state.session.lock().await;
    let entity = session.resolve_entity(&request.entity_type, &request.entity_id);
    Ok(Json(session.links().generate_deep_link(&entity, &request.config)?))
}

#[derive(Debug, Deserialize)]
pub struct ResolveQuery {
    link: String,
}

pub async fn resolve_link(
    State(state): State<AppState>,
    Query(query): Query<ResolveQuery>,
) -> ApiResult<ResolvedLink> {
    let session = state.session.lock().await;
    let resolved = session
        .links()
        .resolve_deep_link(&query.link)
        .ok_or_else(|| OpsgraphError::InvalidDeepLink(query.link.clone()))?;
    Ok(Json(resolved))
}
