use alias_provisioner::{DirectoryVisibility, ProvisionerError, ProvisionerErrorKind};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;

pub(super) const INVALID_TOKEN_ERRCODE: &str = "T2B_INVALID_TOKEN";

#[derive(Debug, Clone, PartialEq, Eq)]
/// Error body returned by every provisioning route.
pub(super) struct ProvisioningApiError {
    pub(super) status: StatusCode,
    pub(super) errcode: &'static str,
    pub(super) message: String,
}

impl ProvisioningApiError {
    pub(super) fn new(status: StatusCode, errcode: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            errcode,
            message: message.into(),
        }
    }

    pub(super) fn unauthorized() -> Self {
        Self::new(
            StatusCode::UNAUTHORIZED,
            INVALID_TOKEN_ERRCODE,
            "Token incorrect or missing",
        )
    }

    pub(super) fn bad_request(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            ProvisionerErrorKind::UnknownError.errcode(),
            message,
        )
    }
}

pub(super) fn status_for_kind(kind: ProvisionerErrorKind) -> StatusCode {
    match kind {
        ProvisionerErrorKind::PermissionDenied
        | ProvisionerErrorKind::NotAllowed
        | ProvisionerErrorKind::CannotDelete => StatusCode::FORBIDDEN,
        ProvisionerErrorKind::Taken => StatusCode::CONFLICT,
        ProvisionerErrorKind::Invalid => StatusCode::BAD_REQUEST,
        ProvisionerErrorKind::NotFound => StatusCode::NOT_FOUND,
        ProvisionerErrorKind::UnknownError => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<ProvisionerError> for ProvisioningApiError {
    fn from(error: ProvisionerError) -> Self {
        Self::new(status_for_kind(error.kind), error.kind.errcode(), error.message)
    }
}

impl IntoResponse for ProvisioningApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(json!({
                "errcode": self.errcode,
                "error": self.message,
            })),
        )
            .into_response()
    }
}

#[derive(Debug, Default, Deserialize)]
pub(super) struct ActingUserQuery {
    #[serde(rename = "userId")]
    pub(super) user_id: Option<String>,
}

impl ActingUserQuery {
    pub(super) fn require_user_id(self) -> Result<String, ProvisioningApiError> {
        self.user_id
            .map(|user_id| user_id.trim().to_string())
            .filter(|user_id| !user_id.is_empty())
            .ok_or_else(|| ProvisioningApiError::bad_request("The userId query parameter is required"))
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct UserPermissionsResponse {
    pub(super) is_admin: bool,
    pub(super) allowed_aliases: Vec<String>,
}

#[derive(Debug, Serialize)]
pub(super) struct RoomAliasesResponse {
    pub(super) aliases: Vec<String>,
}

#[derive(Debug, Serialize)]
pub(super) struct AliasResponse {
    pub(super) alias: String,
}

#[derive(Debug, Serialize)]
pub(super) struct DirectoryVisibilityResponse {
    pub(super) visibility: DirectoryVisibility,
}
