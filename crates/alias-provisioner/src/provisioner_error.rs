use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::room_store::RoomStoreError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
/// Closed set of provisioning failure kinds.
pub enum ProvisionerErrorKind {
    PermissionDenied,
    NotAllowed,
    Taken,
    Invalid,
    NotFound,
    CannotDelete,
    UnknownError,
}

impl ProvisionerErrorKind {
    /// Stable wire code used by the provisioning API.
    pub fn errcode(self) -> &'static str {
        match self {
            Self::PermissionDenied => "T2B_ALIAS_PERMISSION_DENIED",
            Self::NotAllowed => "T2B_ALIAS_NOT_ALLOWED",
            Self::Taken => "T2B_ALIAS_TAKEN",
            Self::Invalid => "T2B_ALIAS_INVALID",
            Self::NotFound => "T2B_ALIAS_NOT_FOUND",
            Self::CannotDelete => "T2B_ALIAS_CANNOT_DELETE",
            Self::UnknownError => "T2B_ALIAS_UNKNOWN_ERROR",
        }
    }
}

#[derive(Debug, Error)]
#[error("{message}")]
/// Typed provisioning failure: a kind plus a human-readable message.
pub struct ProvisionerError {
    pub kind: ProvisionerErrorKind,
    pub message: String,
    #[source]
    pub source: Option<RoomStoreError>,
}

impl ProvisionerError {
    pub fn new(kind: ProvisionerErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        kind: ProvisionerErrorKind,
        message: impl Into<String>,
        source: RoomStoreError,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            source: Some(source),
        }
    }

    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::new(ProvisionerErrorKind::PermissionDenied, message)
    }

    pub fn unknown(message: impl Into<String>, source: RoomStoreError) -> Self {
        Self::with_source(ProvisionerErrorKind::UnknownError, message, source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_errcodes_are_distinct_and_prefixed() {
        let kinds = [
            ProvisionerErrorKind::PermissionDenied,
            ProvisionerErrorKind::NotAllowed,
            ProvisionerErrorKind::Taken,
            ProvisionerErrorKind::Invalid,
            ProvisionerErrorKind::NotFound,
            ProvisionerErrorKind::CannotDelete,
            ProvisionerErrorKind::UnknownError,
        ];
        let codes = kinds
            .iter()
            .map(|kind| kind.errcode())
            .collect::<std::collections::BTreeSet<_>>();
        assert_eq!(codes.len(), kinds.len());
        assert!(codes.iter().all(|code| code.starts_with("T2B_ALIAS_")));
    }

    #[test]
    fn unit_provisioner_error_displays_message_and_keeps_source() {
        let error = ProvisionerError::unknown(
            "An unknown error occurred while adding the alias",
            RoomStoreError::Transport("connection reset".to_string()),
        );
        assert_eq!(
            error.to_string(),
            "An unknown error occurred while adding the alias"
        );
        assert_eq!(error.kind, ProvisionerErrorKind::UnknownError);
        let source = std::error::Error::source(&error).map(ToString::to_string);
        assert_eq!(
            source.as_deref(),
            Some("room store transport failed: connection reset")
        );
    }
}
