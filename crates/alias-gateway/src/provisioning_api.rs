//! HTTP provisioning API exposing the provisioner to trusted integrations.

use std::net::SocketAddr;
use std::sync::Arc;

use alias_provisioner::{DirectoryVisibility, Provisioner};
use anyhow::{Context, Result};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tracing::{debug, info};

mod auth_runtime;
mod types;

use auth_runtime::authorize_provisioning_request;
use types::{
    ActingUserQuery, AliasResponse, DirectoryVisibilityResponse, ProvisioningApiError,
    RoomAliasesResponse, UserPermissionsResponse,
};

/// Placeholder secret shipped in sample configs; never valid for serving.
pub const DEFAULT_SHARED_SECRET: &str = "CHANGE_ME";

const USER_PERMISSIONS_ENDPOINT: &str = "/api/v1/user/{user_id}";
const ROOM_ALIASES_ENDPOINT: &str = "/api/v1/rooms/{room_id}/aliases";
const ROOM_ALIAS_ENDPOINT: &str = "/api/v1/rooms/{room_id}/aliases/{alias}";
const DIRECTORY_VISIBILITY_ENDPOINT: &str = "/api/v1/rooms/{room_id}/directory_visibility";
const SET_DIRECTORY_VISIBILITY_ENDPOINT: &str =
    "/api/v1/rooms/{room_id}/directory_visibility/{visibility}";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
/// `[provisioning]` configuration table.
pub struct ProvisioningApiConfig {
    pub enabled: bool,
    pub bind: String,
    pub port: u16,
    pub shared_secret: String,
}

impl Default for ProvisioningApiConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind: "127.0.0.1".to_string(),
            port: 9000,
            shared_secret: DEFAULT_SHARED_SECRET.to_string(),
        }
    }
}

impl ProvisioningApiConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        let raw = format!("{}:{}", self.bind.trim(), self.port);
        raw.parse::<SocketAddr>()
            .with_context(|| format!("invalid provisioning bind address '{raw}'"))
    }
}

/// Shared state for provisioning handlers.
pub struct ProvisioningApiState {
    provisioner: Provisioner,
    shared_secret: String,
}

impl ProvisioningApiState {
    /// The secret is trimmed to match how bearer tokens are read.
    pub fn new(provisioner: Provisioner, shared_secret: impl Into<String>) -> Self {
        Self {
            provisioner,
            shared_secret: shared_secret.into().trim().to_string(),
        }
    }
}

/// Serves the provisioning API until ctrl-c.
pub async fn run_provisioning_api(
    config: ProvisioningApiConfig,
    provisioner: Provisioner,
) -> Result<()> {
    let bind_addr = config.socket_addr()?;
    let listener = TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("failed to bind provisioning api on {bind_addr}"))?;
    let local_addr = listener
        .local_addr()
        .context("failed to resolve bound provisioning api address")?;
    info!(addr = %local_addr, "provisioning api listening");

    let state = Arc::new(ProvisioningApiState::new(provisioner, config.shared_secret));
    let app = build_provisioning_api_router(state);
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("provisioning api server exited unexpectedly")
}

pub fn build_provisioning_api_router(state: Arc<ProvisioningApiState>) -> Router {
    Router::new()
        .route(USER_PERMISSIONS_ENDPOINT, get(handle_user_permissions))
        .route(ROOM_ALIASES_ENDPOINT, get(handle_room_aliases))
        .route(
            ROOM_ALIAS_ENDPOINT,
            put(handle_add_room_alias).delete(handle_remove_room_alias),
        )
        .route(
            DIRECTORY_VISIBILITY_ENDPOINT,
            get(handle_directory_visibility),
        )
        .route(
            SET_DIRECTORY_VISIBILITY_ENDPOINT,
            put(handle_set_directory_visibility),
        )
        .fallback(handle_unknown_route)
        .with_state(state)
}

fn log_request(method: &Method, uri: &Uri) {
    debug!(method = %method, uri = %uri, "incoming provisioning request");
}

async fn handle_unknown_route(method: Method, uri: Uri) -> ProvisioningApiError {
    log_request(&method, &uri);
    ProvisioningApiError::new(
        StatusCode::NOT_FOUND,
        alias_provisioner::ProvisionerErrorKind::UnknownError.errcode(),
        format!("Cannot {method} {}", uri.path()),
    )
}

async fn handle_user_permissions(
    State(state): State<Arc<ProvisioningApiState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    Path(user_id): Path<String>,
) -> Response {
    log_request(&method, &uri);
    if let Err(error) = authorize_provisioning_request(&state, &headers) {
        return error.into_response();
    }

    Json(UserPermissionsResponse {
        is_admin: state.provisioner.is_admin(&user_id),
        allowed_aliases: state.provisioner.get_allowed_aliases(&user_id),
    })
    .into_response()
}

async fn handle_room_aliases(
    State(state): State<Arc<ProvisioningApiState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    Path(room_id): Path<String>,
    Query(query): Query<ActingUserQuery>,
) -> Result<Json<RoomAliasesResponse>, ProvisioningApiError> {
    log_request(&method, &uri);
    authorize_provisioning_request(&state, &headers)?;
    let user_id = query.require_user_id()?;

    let aliases = state
        .provisioner
        .get_aliases_in_room(&room_id, &user_id)
        .await?;
    Ok(Json(RoomAliasesResponse { aliases }))
}

async fn handle_add_room_alias(
    State(state): State<Arc<ProvisioningApiState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    Path((room_id, alias)): Path<(String, String)>,
    Query(query): Query<ActingUserQuery>,
) -> Result<Json<AliasResponse>, ProvisioningApiError> {
    log_request(&method, &uri);
    authorize_provisioning_request(&state, &headers)?;
    let user_id = query.require_user_id()?;

    let alias = state
        .provisioner
        .add_alias(&room_id, &user_id, &format!("#{alias}"))
        .await?;
    Ok(Json(AliasResponse { alias }))
}

async fn handle_remove_room_alias(
    State(state): State<Arc<ProvisioningApiState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    Path((room_id, alias)): Path<(String, String)>,
    Query(query): Query<ActingUserQuery>,
) -> Result<Json<AliasResponse>, ProvisioningApiError> {
    log_request(&method, &uri);
    authorize_provisioning_request(&state, &headers)?;
    let user_id = query.require_user_id()?;

    let alias = state
        .provisioner
        .remove_alias(&room_id, &user_id, &format!("#{alias}"))
        .await?;
    Ok(Json(AliasResponse { alias }))
}

async fn handle_directory_visibility(
    State(state): State<Arc<ProvisioningApiState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    Path(room_id): Path<String>,
    Query(query): Query<ActingUserQuery>,
) -> Result<Json<DirectoryVisibilityResponse>, ProvisioningApiError> {
    log_request(&method, &uri);
    authorize_provisioning_request(&state, &headers)?;
    let user_id = query.require_user_id()?;

    let visibility = state
        .provisioner
        .get_room_directory_visibility(&room_id, &user_id)
        .await?;
    Ok(Json(DirectoryVisibilityResponse { visibility }))
}

async fn handle_set_directory_visibility(
    State(state): State<Arc<ProvisioningApiState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    Path((room_id, visibility)): Path<(String, String)>,
    Query(query): Query<ActingUserQuery>,
) -> Result<Json<DirectoryVisibilityResponse>, ProvisioningApiError> {
    log_request(&method, &uri);
    authorize_provisioning_request(&state, &headers)?;
    let Some(visibility) = DirectoryVisibility::parse(&visibility) else {
        return Err(ProvisioningApiError::bad_request(
            "Visibility must be 'public' or 'private'",
        ));
    };
    let user_id = query.require_user_id()?;

    match visibility {
        DirectoryVisibility::Public => {
            state
                .provisioner
                .list_room_in_directory(&room_id, &user_id)
                .await?
        }
        DirectoryVisibility::Private => {
            state
                .provisioner
                .remove_room_from_directory(&room_id, &user_id)
                .await?
        }
    }
    Ok(Json(DirectoryVisibilityResponse { visibility }))
}
